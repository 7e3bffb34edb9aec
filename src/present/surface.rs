// SPDX-License-Identifier: MPL-2.0

//! Writable pixel surfaces the bridge presents into.

use drm_fourcc::DrmFourcc;
use image::RgbaImage;

use crate::animated::BYTES_PER_PIXEL;
use crate::error::ResourceError;

/// A host-owned 32-bit pixel surface.
pub trait Surface: Send {
    /// Pixel layout. The bridge accepts `Argb8888` and `Xrgb8888`, both BGRA
    /// in memory.
    fn format(&self) -> DrmFourcc;

    fn dimensions(&self) -> (u32, u32);

    /// Reallocate for a new source size.
    fn resize(&mut self, width: u32, height: u32) -> Result<(), ResourceError>;

    /// Lock the pixel memory for writing. The lock is released when the
    /// returned guard drops.
    fn lock(&mut self) -> Result<SurfaceLock<'_>, ResourceError>;
}

/// Scoped write access to a surface's pixels.
pub struct SurfaceLock<'a> {
    pixels: &'a mut [u8],
    stride: usize,
    width: u32,
    height: u32,
    on_release: Option<Box<dyn FnOnce() + 'a>>,
}

impl<'a> SurfaceLock<'a> {
    /// Wrap locked memory of `height` rows, `stride` bytes apart.
    pub fn new(
        pixels: &'a mut [u8],
        stride: usize,
        width: u32,
        height: u32,
    ) -> Result<Self, ResourceError> {
        let row = width as usize * BYTES_PER_PIXEL;
        if stride < row {
            return Err(ResourceError::Stride { stride, width });
        }
        let needed = match height as usize {
            0 => 0,
            rows => stride * (rows - 1) + row,
        };
        if pixels.len() < needed {
            return Err(ResourceError::Lock(format!(
                "locked region holds {} bytes, {needed} needed",
                pixels.len()
            )));
        }

        Ok(Self {
            pixels,
            stride,
            width,
            height,
            on_release: None,
        })
    }

    /// Run `release` when the lock is dropped, whether or not the write succeeded.
    #[must_use]
    pub fn on_release(mut self, release: impl FnOnce() + 'a) -> Self {
        self.on_release = Some(Box::new(release));
        self
    }

    /// Bytes between the starts of two rows.
    pub fn stride(&self) -> usize {
        self.stride
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn pixels_mut(&mut self) -> &mut [u8] {
        &mut *self.pixels
    }
}

impl Drop for SurfaceLock<'_> {
    fn drop(&mut self) {
        if let Some(release) = self.on_release.take() {
            release();
        }
    }
}

impl std::fmt::Debug for SurfaceLock<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SurfaceLock")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("stride", &self.stride)
            .finish_non_exhaustive()
    }
}

/// A surface in ordinary memory, with optional row padding.
#[derive(Debug)]
pub struct MemorySurface {
    pixels: Vec<u8>,
    width: u32,
    height: u32,
    stride: usize,
    row_padding: usize,
    format: DrmFourcc,
    locked: bool,
    locks: u64,
    failing_locks: u32,
}

impl MemorySurface {
    pub fn new(width: u32, height: u32) -> Self {
        Self::with_row_padding(width, height, 0)
    }

    /// Rows are `width * 4 + row_padding` bytes apart.
    pub fn with_row_padding(width: u32, height: u32, row_padding: usize) -> Self {
        let stride = width as usize * BYTES_PER_PIXEL + row_padding;
        Self {
            pixels: vec![0; stride * height as usize],
            width,
            height,
            stride,
            row_padding,
            format: DrmFourcc::Argb8888,
            locked: false,
            locks: 0,
            failing_locks: 0,
        }
    }

    #[must_use]
    pub fn with_format(mut self, format: DrmFourcc) -> Self {
        self.format = format;
        self
    }

    /// Make the next `count` lock attempts fail as busy.
    pub fn fail_next_locks(&mut self, count: u32) {
        self.failing_locks = count;
    }

    pub fn stride(&self) -> usize {
        self.stride
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// Whether a [`SurfaceLock`] is currently held.
    pub fn is_locked(&self) -> bool {
        self.locked
    }

    /// Number of successful locks so far.
    pub fn lock_count(&self) -> u64 {
        self.locks
    }

    /// Copy the visible pixels into an RGBA image, dropping row padding.
    pub fn snapshot(&self) -> RgbaImage {
        RgbaImage::from_fn(self.width, self.height, |x, y| {
            let at = y as usize * self.stride + x as usize * BYTES_PER_PIXEL;
            let [b, g, r, a] = [
                self.pixels[at],
                self.pixels[at + 1],
                self.pixels[at + 2],
                self.pixels[at + 3],
            ];
            let a = if self.format == DrmFourcc::Xrgb8888 { 255 } else { a };
            image::Rgba([r, g, b, a])
        })
    }
}

impl Surface for MemorySurface {
    fn format(&self) -> DrmFourcc {
        self.format
    }

    fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn resize(&mut self, width: u32, height: u32) -> Result<(), ResourceError> {
        let stride = width as usize * BYTES_PER_PIXEL + self.row_padding;
        let len = stride
            .checked_mul(height as usize)
            .ok_or(ResourceError::Allocation { width, height })?;

        let mut pixels = Vec::new();
        pixels
            .try_reserve_exact(len)
            .map_err(|_| ResourceError::Allocation { width, height })?;
        pixels.resize(len, 0);

        self.pixels = pixels;
        self.width = width;
        self.height = height;
        self.stride = stride;
        Ok(())
    }

    fn lock(&mut self) -> Result<SurfaceLock<'_>, ResourceError> {
        if self.failing_locks > 0 {
            self.failing_locks -= 1;
            return Err(ResourceError::Busy);
        }
        if self.locked {
            return Err(ResourceError::Busy);
        }

        let Self {
            pixels,
            width,
            height,
            stride,
            locked,
            locks,
            ..
        } = self;
        let lock = SurfaceLock::new(pixels, *stride, *width, *height)?;
        *locks += 1;
        *locked = true;
        Ok(lock.on_release(move || *locked = false))
    }
}
