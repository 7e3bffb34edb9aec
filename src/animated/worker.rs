// SPDX-License-Identifier: MPL-2.0

//! The decode worker: a dedicated thread that owns the decoder, decodes frames
//! into a private back buffer and publishes them through the frame store.
//!
//! ```text
//!            Play              Pause
//!   Idle ──────────▶ Running ◀──────▶ Paused
//!    ▲                  │      Play
//!    └── last loop ─────┘
//!
//!   Idle | Running | Paused ── Dispose / decode error ──▶ Disposed
//! ```
//!
//! Every wait is a `recv_timeout` on the command queue, so a command cuts a
//! frame delay short instead of waiting it out. The dispose flag is checked
//! right before and right after each decode; a frame decoded while a dispose
//! was requested is never published.

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::{Duration, Instant};

use tracing::{debug, debug_span, error, info, trace, warn};

use super::command::{Command, CommandReceiver, Wake};
use super::decoder::{DecodeStep, FrameDecoder};
use super::events::{EventSink, PlayerEvent};
use super::types::{AnimationHeader, Frame, FrameTiming, LoopPolicy};
use crate::error::DecodeError;
use crate::frame_store::SharedFrameStore;

/// Lifecycle state of a decode worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum WorkerState {
    /// Constructed, or finished its last loop. Holds the last frame.
    #[default]
    Idle = 0,
    Running = 1,
    Paused = 2,
    /// Terminal. The decoder has been released.
    Disposed = 3,
}

impl WorkerState {
    /// State after handling `command`. Repeating a command is a no-op and
    /// nothing leaves `Disposed`.
    #[must_use]
    pub fn on_command(self, command: Command) -> Self {
        match (self, command) {
            (Self::Disposed, _) | (_, Command::Dispose) => Self::Disposed,
            (Self::Idle | Self::Running | Self::Paused, Command::Play) => Self::Running,
            (Self::Running | Self::Paused, Command::Pause) => Self::Paused,
            (Self::Idle, Command::Pause) => Self::Idle,
        }
    }

    /// Whether the worker may move from `self` to `to` in one step.
    #[must_use]
    pub fn can_transition_to(self, to: Self) -> bool {
        matches!(
            (self, to),
            (Self::Idle, Self::Running)
                | (Self::Running, Self::Paused)
                | (Self::Paused, Self::Running)
                | (Self::Running, Self::Idle)
                | (Self::Idle | Self::Running | Self::Paused, Self::Disposed)
        )
    }

    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Idle,
            1 => Self::Running,
            2 => Self::Paused,
            _ => Self::Disposed,
        }
    }
}

impl std::fmt::Display for WorkerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Disposed => "disposed",
        })
    }
}

/// Worker state readable from any thread.
#[derive(Debug, Default)]
pub(crate) struct StateCell(AtomicU8);

impl StateCell {
    pub(crate) fn load(&self) -> WorkerState {
        WorkerState::from_u8(self.0.load(Ordering::Acquire))
    }

    fn store(&self, state: WorkerState) {
        self.0.store(state as u8, Ordering::Release);
    }
}

/// When the worker next decodes while running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NextFrame {
    Now,
    At(Instant),
    /// A still image that has been shown; only a command wakes the worker.
    Never,
}

/// Owned by the decode thread for its whole life.
pub(crate) struct DecodeWorker {
    decoder: Option<Box<dyn FrameDecoder>>,
    header: AnimationHeader,
    timing: FrameTiming,
    honor_loop_count: bool,
    commands: CommandReceiver,
    store: SharedFrameStore,
    events: Box<dyn EventSink>,
    state: WorkerState,
    shared_state: Arc<StateCell>,
    /// Displaced frame handed back by the store, reused when nobody holds it.
    spare: Option<Arc<Frame>>,
    sequence: u64,
    next_index: usize,
    plays: u32,
    next: NextFrame,
    paused_at: Option<Instant>,
    /// The last loop finished; `Play` starts over from the first frame.
    finished: bool,
    errored: bool,
}

pub(crate) struct WorkerParts {
    pub(crate) decoder: Box<dyn FrameDecoder>,
    pub(crate) header: AnimationHeader,
    pub(crate) timing: FrameTiming,
    pub(crate) honor_loop_count: bool,
    pub(crate) commands: CommandReceiver,
    pub(crate) store: SharedFrameStore,
    pub(crate) events: Box<dyn EventSink>,
    pub(crate) shared_state: Arc<StateCell>,
}

impl DecodeWorker {
    pub(crate) fn new(parts: WorkerParts) -> Self {
        parts.shared_state.store(WorkerState::Idle);
        Self {
            decoder: Some(parts.decoder),
            header: parts.header,
            timing: parts.timing,
            honor_loop_count: parts.honor_loop_count,
            commands: parts.commands,
            store: parts.store,
            events: parts.events,
            state: WorkerState::Idle,
            shared_state: parts.shared_state,
            spare: None,
            sequence: 0,
            next_index: 0,
            plays: 0,
            next: NextFrame::Now,
            paused_at: None,
            finished: false,
            errored: false,
        }
    }

    /// Run until disposed.
    pub(crate) fn run(&mut self) {
        let span = debug_span!(
            "decode_worker",
            width = self.header.width,
            height = self.header.height,
            frames = self.header.frame_count
        );
        let _enter = span.enter();
        debug!("decode worker started");

        loop {
            let wake = match self.state {
                WorkerState::Running => match self.next {
                    NextFrame::Now => self.commands.try_next().map_or(Wake::Timeout, Wake::Command),
                    NextFrame::At(deadline) => self.commands.wait(Some(deadline)),
                    NextFrame::Never => self.commands.wait(None),
                },
                WorkerState::Idle | WorkerState::Paused => self.commands.wait(None),
                WorkerState::Disposed => break,
            };

            match wake {
                Wake::Command(command) => self.handle(command),
                Wake::Timeout => self.step(),
            }
        }

        debug!(sequence = self.sequence, "decode worker stopped");
    }

    fn handle(&mut self, command: Command) {
        let from = self.state;
        let to = from.on_command(command);
        if from == to {
            trace!(?command, state = %from, "command has no effect");
            return;
        }

        let now = Instant::now();
        match (from, to) {
            (WorkerState::Idle, WorkerState::Running) if self.finished => {
                if let Err(err) = self.restart() {
                    self.fail(err);
                    return;
                }
            }
            (WorkerState::Running, WorkerState::Paused) => self.paused_at = Some(now),
            (WorkerState::Paused, WorkerState::Running) => {
                // Keep whatever was left of the frame's display time.
                if let (Some(paused_at), NextFrame::At(deadline)) = (self.paused_at.take(), self.next) {
                    self.next = NextFrame::At(deadline + now.duration_since(paused_at));
                }
            }
            _ => {}
        }

        self.set_state(to);
    }

    fn restart(&mut self) -> Result<(), DecodeError> {
        if let Some(decoder) = self.decoder.as_mut() {
            decoder.rewind()?;
        }
        self.finished = false;
        self.plays = 0;
        self.next_index = 0;
        self.next = NextFrame::Now;
        Ok(())
    }

    fn set_state(&mut self, to: WorkerState) {
        let from = self.state;
        debug_assert!(from.can_transition_to(to), "{from} -> {to}");
        self.state = to;
        self.shared_state.store(to);
        debug!(%from, %to, "worker state changed");

        if to == WorkerState::Disposed {
            self.release();
        }
        self.events.emit(PlayerEvent::StateChanged { from, to });
    }

    /// Close the store and drop the decoder. Called once, on entering `Disposed`.
    fn release(&mut self) {
        self.store.close();
        self.decoder = None;
        self.spare = None;
    }

    /// Decode and publish one frame, then schedule the next.
    fn step(&mut self) {
        if self.commands.dispose_requested() {
            self.handle(Command::Dispose);
            return;
        }

        let started = Instant::now();
        let mut target = self.back_buffer();
        let duration = match self.decode_into(&mut target) {
            Ok(Some(duration)) => duration,
            Ok(None) => {
                self.spare = Some(Arc::new(target));
                self.finish();
                return;
            }
            Err(err) => {
                self.fail(err);
                return;
            }
        };

        if self.commands.dispose_requested() {
            trace!("dispose requested during decode, dropping frame");
            self.handle(Command::Dispose);
            return;
        }

        let (sequence, index) = (target.sequence, target.index);
        match self.store.publish(Arc::new(target)) {
            Ok(displaced) => self.spare = displaced,
            Err(_rejected) => {
                warn!(sequence, "frame store closed, disposing worker");
                self.handle(Command::Dispose);
                return;
            }
        }
        self.events.emit(PlayerEvent::FrameChanged { sequence, index });

        let decode_time = started.elapsed();
        if decode_time > duration {
            trace!(?decode_time, ?duration, "decode slower than frame duration");
        }
        self.next = if self.header.is_animated() {
            // Decode time counts against the frame's display time.
            NextFrame::At(started + duration)
        } else {
            NextFrame::Never
        };
    }

    /// Reuse the displaced buffer if nobody else holds it, else allocate.
    fn back_buffer(&mut self) -> Frame {
        match self.spare.take().map(Arc::try_unwrap) {
            Some(Ok(frame)) => frame,
            Some(Err(_held)) => {
                trace!("displaced frame still held by the renderer, allocating");
                Frame::blank(&self.header)
            }
            None => Frame::blank(&self.header),
        }
    }

    /// Decode the next frame into `frame`. `Ok(None)` means the last loop
    /// has finished.
    fn decode_into(&mut self, frame: &mut Frame) -> Result<Option<Duration>, DecodeError> {
        let Some(decoder) = self.decoder.as_mut() else {
            return Ok(None);
        };

        let mut step = decoder.decode_next_frame(&mut frame.pixels)?;
        if step == DecodeStep::EndOfAnimation {
            if self.next_index == 0 {
                return Err(DecodeError::NoFrames);
            }
            self.plays = self.plays.saturating_add(1);
            let exhausted = match (self.honor_loop_count, self.header.loop_policy) {
                (true, LoopPolicy::Finite(total)) => self.plays >= u32::from(total),
                _ => false,
            };
            if exhausted {
                return Ok(None);
            }

            trace!(plays = self.plays, "looping animation");
            decoder.rewind()?;
            self.next_index = 0;
            step = decoder.decode_next_frame(&mut frame.pixels)?;
        }

        let DecodeStep::Frame { duration } = step else {
            return Err(DecodeError::NoFrames);
        };

        self.sequence += 1;
        frame.sequence = self.sequence;
        frame.index = self.next_index;
        frame.duration = self.timing.apply(duration);
        self.next_index += 1;
        Ok(Some(frame.duration))
    }

    /// The loop count is exhausted: keep the last frame and go idle.
    fn finish(&mut self) {
        info!(plays = self.plays, "animation finished");
        self.finished = true;
        self.set_state(WorkerState::Idle);
    }

    /// Stop for good after an unrecoverable error. Reports it at most once.
    pub(crate) fn fail(&mut self, err: DecodeError) {
        if self.errored {
            return;
        }
        self.errored = true;
        error!(%err, "decoding failed, disposing worker");

        if self.state != WorkerState::Disposed {
            self.set_state(WorkerState::Disposed);
        } else {
            self.release();
        }
        self.events.emit(PlayerEvent::Error(err));
    }
}
