// SPDX-License-Identifier: MPL-2.0

//! Animated GIF playback on a dedicated decode thread.
//!
//! Frames are decoded off the render thread and handed over one at a time:
//! - **Decode worker** owns the decoder and a private back buffer, paces
//!   frames with interruptible waits and publishes each finished frame
//! - **Command channel** carries `Play`/`Pause`/`Dispose` to the worker
//!   without ever blocking the sender
//! - **Events** tell the owner a frame is ready, the state changed or
//!   decoding failed
//!
//! # Module Structure
//!
//! - [`types`]: Core types (Frame, AnimationHeader, LoopPolicy, FrameTiming)
//! - [`detection`]: File type detection utilities
//! - [`decoder`]: The [`FrameDecoder`] seam between worker and bitstream
//! - [`gif_decoder`]: GIF implementation of [`FrameDecoder`]
//! - [`command`]: Bounded, non-blocking control channel
//! - [`worker`]: The decode worker state machine
//! - [`player`]: [`AnimatedPlayer`], the owning handle
//!
//! # Pixel Format
//!
//! Every frame is 32-bit BGRA (`ARGB8888` in DRM terms), tightly packed,
//! with straight alpha.

mod command;
mod decoder;
mod detection;
mod events;
mod gif_decoder;
mod player;
mod types;
mod worker;

// Re-export public API
pub use command::{Command, CommandSender, Delivery};
pub use decoder::{DecodeStep, FrameDecoder};
pub use detection::{has_gif_signature, is_gif_file, sniff_gif};
pub use events::{EventSink, PlayerEvent};
pub use gif_decoder::GifDecoder;
pub use player::AnimatedPlayer;
pub use types::{AnimationHeader, BYTES_PER_PIXEL, Frame, FrameTiming, LoopPolicy};
pub use worker::WorkerState;

#[cfg(test)]
pub(crate) mod testing;
#[cfg(test)]
mod tests;
