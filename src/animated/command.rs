// SPDX-License-Identifier: MPL-2.0

//! Control channel from the owning thread to the decode worker.
//!
//! Sending never blocks: the queue is bounded and a full queue drops the
//! command. `Dispose` additionally raises a shared flag so it can never be
//! lost, and the worker polls that flag around every decode step.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError, TrySendError};
use tracing::{trace, warn};

/// A control instruction for the decode worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Start or resume playback.
    Play,
    /// Hold the current frame.
    Pause,
    /// Stop for good and release the decoder.
    Dispose,
}

/// What happened to a sent command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Queued for the worker.
    Queued,
    /// The queue was full; the command was dropped.
    Dropped,
    /// The worker is disposed (or disposing); the command was ignored.
    Ignored,
}

/// Create a command channel holding at most `capacity` pending commands.
pub(crate) fn channel(capacity: usize) -> (CommandSender, CommandReceiver) {
    let (tx, rx) = crossbeam_channel::bounded(capacity);
    let dispose = Arc::new(AtomicBool::new(false));
    (
        CommandSender {
            tx,
            dispose: Arc::clone(&dispose),
        },
        CommandReceiver { rx, dispose },
    )
}

/// Sending half, safe to clone and use from any thread.
#[derive(Debug, Clone)]
pub struct CommandSender {
    tx: Sender<Command>,
    dispose: Arc<AtomicBool>,
}

impl CommandSender {
    /// Enqueue `command` without blocking.
    pub fn send(&self, command: Command) -> Delivery {
        if command == Command::Dispose {
            if self.dispose.swap(true, Ordering::AcqRel) {
                return Delivery::Ignored;
            }
        } else if self.dispose.load(Ordering::Acquire) {
            trace!(?command, "ignoring command after dispose");
            return Delivery::Ignored;
        }

        match self.tx.try_send(command) {
            Ok(()) => Delivery::Queued,
            // The raised flag already carries a dispose request.
            Err(TrySendError::Full(Command::Dispose)) => Delivery::Queued,
            Err(TrySendError::Full(command)) => {
                warn!(?command, "command queue full, dropping command");
                Delivery::Dropped
            }
            Err(TrySendError::Disconnected(_)) => Delivery::Ignored,
        }
    }

    /// Whether `Dispose` has been sent.
    pub fn is_disposed(&self) -> bool {
        self.dispose.load(Ordering::Acquire)
    }
}

/// Result of waiting for the next command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Wake {
    Command(Command),
    /// The deadline passed with no command.
    Timeout,
}

/// Receiving half, owned by the decode worker.
#[derive(Debug)]
pub(crate) struct CommandReceiver {
    rx: Receiver<Command>,
    dispose: Arc<AtomicBool>,
}

impl CommandReceiver {
    /// Checkpoint: has a dispose been requested?
    pub(crate) fn dispose_requested(&self) -> bool {
        self.dispose.load(Ordering::Acquire)
    }

    /// Next queued command, without waiting.
    ///
    /// A raised dispose flag wins over anything still queued. A disconnected
    /// sender reads as `Dispose`.
    pub(crate) fn try_next(&self) -> Option<Command> {
        if self.dispose_requested() {
            return Some(Command::Dispose);
        }
        match self.rx.try_recv() {
            Ok(command) => Some(command),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => Some(Command::Dispose),
        }
    }

    /// Block until a command arrives or `deadline` passes. `None` waits
    /// without a deadline. Wakes as soon as a command is enqueued.
    pub(crate) fn wait(&self, deadline: Option<Instant>) -> Wake {
        if let Some(command) = self.try_next() {
            return Wake::Command(command);
        }

        let received = match deadline {
            Some(deadline) => self
                .rx
                .recv_timeout(deadline.saturating_duration_since(Instant::now())),
            None => self.rx.recv().map_err(|_| RecvTimeoutError::Disconnected),
        };

        match received {
            Ok(_) if self.dispose_requested() => Wake::Command(Command::Dispose),
            Ok(command) => Wake::Command(command),
            Err(RecvTimeoutError::Timeout) => Wake::Timeout,
            Err(RecvTimeoutError::Disconnected) => Wake::Command(Command::Dispose),
        }
    }
}
