// SPDX-License-Identifier: MPL-2.0

//! Core types for animation playback.

use std::time::Duration;

use cosmic_anim_config::PlayerConfig;

/// Bytes per pixel of every frame buffer (BGRA).
pub const BYTES_PER_PIXEL: usize = 4;

/// How many times an animation plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoopPolicy {
    /// Loop forever.
    #[default]
    Infinite,
    /// Play the given number of times in total.
    Finite(u16),
}

/// Stream-level metadata, read once when the source is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnimationHeader {
    pub width: u32,
    pub height: u32,
    pub frame_count: usize,
    pub loop_policy: LoopPolicy,
}

impl AnimationHeader {
    /// Size in bytes of one BGRA frame of this animation.
    #[must_use]
    pub fn frame_len(&self) -> usize {
        self.width as usize * self.height as usize * BYTES_PER_PIXEL
    }

    #[must_use]
    pub fn is_animated(&self) -> bool {
        self.frame_count > 1
    }
}

/// A decoded frame with timing information.
///
/// Once published through the [`FrameStore`](crate::FrameStore) a frame is only
/// reachable behind an `Arc` and is never written again.
#[derive(Clone, PartialEq, Eq)]
pub struct Frame {
    /// BGRA pixels, tightly packed (`width * 4` bytes per row).
    pub pixels: Vec<u8>,
    pub width: u32,
    pub height: u32,
    /// How long this frame should be displayed.
    pub duration: Duration,
    /// Position of this frame in the animation.
    pub index: usize,
    /// Publication order across loops; strictly increasing.
    pub sequence: u64,
}

impl Frame {
    /// An empty (transparent) frame sized for `header`.
    #[must_use]
    pub fn blank(header: &AnimationHeader) -> Self {
        Self {
            pixels: vec![0; header.frame_len()],
            width: header.width,
            height: header.height,
            duration: Duration::ZERO,
            index: 0,
            sequence: 0,
        }
    }

    #[must_use]
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Bytes per row.
    #[must_use]
    pub fn stride(&self) -> usize {
        self.width as usize * BYTES_PER_PIXEL
    }
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("duration", &self.duration)
            .field("index", &self.index)
            .field("sequence", &self.sequence)
            .field("pixels", &format_args!("{} bytes", self.pixels.len()))
            .finish()
    }
}

/// Clamps the display durations declared by a decoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameTiming {
    pub min: Duration,
    pub default: Duration,
}

impl FrameTiming {
    pub fn from_config(config: &PlayerConfig) -> Self {
        Self {
            min: config.min_frame_duration(),
            default: config.default_frame_duration(),
        }
    }

    /// Duration a frame is actually shown for.
    #[must_use]
    pub fn apply(&self, declared: Duration) -> Duration {
        if declared.is_zero() {
            self.default.max(self.min)
        } else {
            declared.max(self.min)
        }
    }
}
