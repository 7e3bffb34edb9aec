// SPDX-License-Identifier: MPL-2.0

//! Interface between the decode worker and a bitstream decoder.

use std::time::Duration;

use super::types::AnimationHeader;
use crate::error::DecodeError;

/// Outcome of decoding one step of the animation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeStep {
    /// A complete frame was written to the destination buffer.
    Frame {
        /// Display duration declared by the stream.
        duration: Duration,
    },
    /// The last frame has already been returned.
    EndOfAnimation,
}

/// A decoder that produces complete BGRA frames one at a time.
///
/// The worker calls [`open_header`](Self::open_header) exactly once on the
/// constructing thread, then moves the decoder to its own thread.
pub trait FrameDecoder: Send {
    /// Parse the stream header. Fails with [`DecodeError::NotSeekable`] when
    /// the underlying stream cannot be rewound.
    fn open_header(&mut self) -> Result<AnimationHeader, DecodeError>;

    /// Decode the next frame into `dest`, which holds exactly
    /// [`AnimationHeader::frame_len`] bytes.
    fn decode_next_frame(&mut self, dest: &mut [u8]) -> Result<DecodeStep, DecodeError>;

    /// Restart at the first frame.
    fn rewind(&mut self) -> Result<(), DecodeError>;
}

impl<D: FrameDecoder + ?Sized> FrameDecoder for Box<D> {
    fn open_header(&mut self) -> Result<AnimationHeader, DecodeError> {
        (**self).open_header()
    }

    fn decode_next_frame(&mut self, dest: &mut [u8]) -> Result<DecodeStep, DecodeError> {
        (**self).decode_next_frame(dest)
    }

    fn rewind(&mut self) -> Result<(), DecodeError> {
        (**self).rewind()
    }
}
