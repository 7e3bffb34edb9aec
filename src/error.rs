// SPDX-License-Identifier: MPL-2.0

//! Error types for the animation engine.
//!
//! - [`ConstructionError`]: the engine could not be built; no worker was started.
//! - [`DecodeError`]: the bitstream failed mid-stream; fatal to the worker only.
//! - [`ResourceError`]: a presentation surface could not be written this tick.

use std::{io, sync::Arc};

use thiserror::Error;

/// Failure to construct an [`AnimatedPlayer`](crate::AnimatedPlayer).
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ConstructionError {
    #[error("animation source is not seekable")]
    NotSeekable,

    #[error("failed to open animation source: {0}")]
    Source(#[source] io::Error),

    #[error("not a supported animation: {0}")]
    Unsupported(String),

    #[error("failed to read animation header")]
    Header(#[source] DecodeError),

    #[error("failed to spawn decode worker")]
    Spawn(#[source] io::Error),
}

impl From<DecodeError> for ConstructionError {
    fn from(err: DecodeError) -> Self {
        match err {
            DecodeError::NotSeekable => Self::NotSeekable,
            err => Self::Header(err),
        }
    }
}

/// Failure of the bitstream decoder.
///
/// Cloneable so it can travel inside [`PlayerEvent::Error`](crate::PlayerEvent).
#[derive(Error, Debug, Clone)]
#[non_exhaustive]
pub enum DecodeError {
    #[error("stream does not support seeking")]
    NotSeekable,

    #[error("I/O error while decoding")]
    Io(#[source] Arc<io::Error>),

    #[error("malformed animation data: {0}")]
    Malformed(String),

    #[error("animation has no frames")]
    NoFrames,

    #[error("frame buffer holds {actual} bytes, expected {expected}")]
    BufferSize { expected: usize, actual: usize },

    #[error("decode worker panicked: {0}")]
    WorkerPanicked(String),
}

impl From<io::Error> for DecodeError {
    fn from(err: io::Error) -> Self {
        Self::Io(Arc::new(err))
    }
}

impl From<gif::DecodingError> for DecodeError {
    fn from(err: gif::DecodingError) -> Self {
        match err {
            gif::DecodingError::Io(err) => Self::Io(Arc::new(err)),
            err => Self::Malformed(err.to_string()),
        }
    }
}

/// Failure to write a frame into a presentation surface.
///
/// Recovered by skipping the render tick; never fatal.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ResourceError {
    #[error("surface is busy")]
    Busy,

    #[error("surface lock failed: {0}")]
    Lock(String),

    #[error("failed to allocate a {width}x{height} surface")]
    Allocation { width: u32, height: u32 },

    #[error("unsupported surface format {0}")]
    UnsupportedFormat(String),

    #[error("stride {stride} is too small for width {width}")]
    Stride { stride: usize, width: u32 },

    #[error("frame is {frame:?} but surface is {surface:?}")]
    DimensionMismatch {
        frame: (u32, u32),
        surface: (u32, u32),
    },
}
