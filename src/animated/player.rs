// SPDX-License-Identifier: MPL-2.0

//! Animated GIF player.
//!
//! This module provides [`AnimatedPlayer`], the owning handle of one decode
//! worker. Construction reads the header synchronously so that an unusable
//! source fails before any thread is started. Frames then flow through the
//! player's [`FrameStore`](crate::FrameStore) and notifications through the
//! supplied [`EventSink`].

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use cosmic_anim_config::PlayerConfig;
use tracing::{debug, error, info, warn};

use super::command::{self, Command, CommandSender, Delivery};
use super::decoder::FrameDecoder;
use super::events::EventSink;
use super::gif_decoder::GifDecoder;
use super::types::{AnimationHeader, Frame, FrameTiming};
use super::worker::{DecodeWorker, StateCell, WorkerParts, WorkerState};
use crate::error::{ConstructionError, DecodeError};
use crate::frame_store::{FrameStore, SharedFrameStore};

/// Name of every decode thread.
const THREAD_NAME: &str = "anim-decode";

/// Owning handle of an animation decoded on its own thread.
///
/// Dropping the player disposes the worker and joins its thread.
pub struct AnimatedPlayer {
    header: AnimationHeader,
    commands: CommandSender,
    store: SharedFrameStore,
    state: Arc<StateCell>,
    thread: Option<JoinHandle<()>>,
}

impl AnimatedPlayer {
    /// Open the GIF at `path` and start its decode worker.
    pub fn open(
        path: &Path,
        events: impl EventSink,
        config: &PlayerConfig,
    ) -> Result<Self, ConstructionError> {
        info!(path = %path.display(), "Loading animation");
        let decoder = GifDecoder::open_path(path)?;
        Self::spawn(decoder, events, config)
    }

    /// Read the header of `decoder` and hand it to a new decode thread.
    ///
    /// Nothing is spawned when the header cannot be read. When
    /// `config.autoplay` is set, playback starts right away.
    pub fn spawn<D>(
        mut decoder: D,
        events: impl EventSink,
        config: &PlayerConfig,
    ) -> Result<Self, ConstructionError>
    where
        D: FrameDecoder + 'static,
    {
        let header = decoder.open_header()?;
        debug!(
            width = header.width,
            height = header.height,
            frames = header.frame_count,
            loop_policy = ?header.loop_policy,
            "Animation header read"
        );

        let (commands, receiver) = command::channel(config.queue_capacity());
        let store = Arc::new(FrameStore::new());
        let state = Arc::new(StateCell::default());

        let mut worker = DecodeWorker::new(WorkerParts {
            decoder: Box::new(decoder),
            header,
            timing: FrameTiming::from_config(config),
            honor_loop_count: config.honor_loop_count,
            commands: receiver,
            store: Arc::clone(&store),
            events: Box::new(events),
            shared_state: Arc::clone(&state),
        });

        let thread = thread::Builder::new()
            .name(THREAD_NAME.to_owned())
            .spawn(move || {
                if let Err(panic) = panic::catch_unwind(AssertUnwindSafe(|| worker.run())) {
                    let message = panic_message(panic.as_ref());
                    error!(%message, "decode worker panicked");
                    worker.fail(DecodeError::WorkerPanicked(message));
                }
            })
            .map_err(ConstructionError::Spawn)?;

        let player = Self {
            header,
            commands,
            store,
            state,
            thread: Some(thread),
        };
        if config.autoplay {
            player.play();
        }
        Ok(player)
    }

    /// Enqueue `command` without blocking.
    pub fn send(&self, command: Command) -> Delivery {
        self.commands.send(command)
    }

    pub fn play(&self) -> Delivery {
        self.send(Command::Play)
    }

    pub fn pause(&self) -> Delivery {
        self.send(Command::Pause)
    }

    /// Ask the worker to stop. Returns immediately; see [`shutdown`](Self::shutdown)
    /// to also wait for the thread.
    pub fn dispose(&self) -> Delivery {
        self.send(Command::Dispose)
    }

    /// A sender for controlling the worker from other threads.
    #[must_use]
    pub fn commands(&self) -> CommandSender {
        self.commands.clone()
    }

    /// Current worker state.
    #[must_use]
    pub fn state(&self) -> WorkerState {
        self.state.load()
    }

    #[must_use]
    pub fn header(&self) -> AnimationHeader {
        self.header
    }

    /// The store frames are published to.
    #[must_use]
    pub fn frame_store(&self) -> SharedFrameStore {
        Arc::clone(&self.store)
    }

    /// Take the latest unconsumed frame. Never blocks.
    pub fn try_consume(&self) -> Option<Arc<Frame>> {
        self.store.try_consume()
    }

    /// Whether the decode thread has exited.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.thread.as_ref().is_none_or(JoinHandle::is_finished)
    }

    /// Dispose the worker and wait for its thread to exit.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        self.dispose();
        let Some(thread) = self.thread.take() else {
            return;
        };
        // Dropped from an event callback on the worker itself; it exits on its own.
        if thread.thread().id() == thread::current().id() {
            return;
        }
        if thread.join().is_err() {
            warn!("decode thread ended with a panic");
        }
    }
}

impl Drop for AnimatedPlayer {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for AnimatedPlayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnimatedPlayer")
            .field("header", &self.header)
            .field("state", &self.state())
            .field("store", &self.store.stats())
            .finish()
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    panic
        .downcast_ref::<&str>()
        .map(|s| (*s).to_owned())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_owned())
}
