// SPDX-License-Identifier: MPL-2.0

//! Notifications from the decode worker to its owner.
//!
//! Events never carry pixel data; a `FrameChanged` only tells the host to
//! schedule a render tick, which then pulls the frame from the
//! [`FrameStore`](crate::FrameStore).

use super::worker::WorkerState;
use crate::error::DecodeError;

/// Something the owner of an [`AnimatedPlayer`](crate::AnimatedPlayer) may react to.
#[derive(Debug, Clone)]
pub enum PlayerEvent {
    /// A new frame was published. Fired once per published frame.
    FrameChanged { sequence: u64, index: usize },
    /// The worker moved between states.
    StateChanged { from: WorkerState, to: WorkerState },
    /// Decoding failed; the worker is disposed. Fired at most once.
    Error(DecodeError),
}

/// Receives [`PlayerEvent`]s on the decode worker's thread.
///
/// Implementations must not block for long: the worker is waiting on them.
pub trait EventSink: Send + 'static {
    fn emit(&mut self, event: PlayerEvent);
}

impl<F> EventSink for F
where
    F: FnMut(PlayerEvent) + Send + 'static,
{
    fn emit(&mut self, event: PlayerEvent) {
        self(event);
    }
}

/// Forward events into a calloop event loop.
impl EventSink for calloop::channel::Sender<PlayerEvent> {
    fn emit(&mut self, event: PlayerEvent) {
        // The loop is gone; nobody is left to notify.
        let _ = self.send(event);
    }
}

impl EventSink for crossbeam_channel::Sender<PlayerEvent> {
    fn emit(&mut self, event: PlayerEvent) {
        let _ = self.send(event);
    }
}
