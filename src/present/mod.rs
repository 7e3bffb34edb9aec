// SPDX-License-Identifier: MPL-2.0

//! Presentation: moving published frames into a host surface.
//!
//! The host calls [`PresentationBridge::render_tick`] on its UI thread,
//! typically in response to a [`PlayerEvent::FrameChanged`](crate::PlayerEvent).
//! A tick takes the latest unconsumed frame, locks the surface, copies the
//! pixels row by row honoring the surface stride, and then asks the host to
//! redraw.
//!
//! # Key Guarantees
//!
//! - **Never blocks on the decoder**: frames are taken with
//!   [`FrameStore::try_consume`](crate::FrameStore::try_consume)
//! - **Surface lock is scoped**: it is released when the tick ends, even if
//!   the copy fails
//! - **Failed ticks are retried**: a frame that could not be written stays
//!   pending unless a newer frame replaces it

mod host;
mod surface;

use std::sync::{Arc, Mutex, PoisonError};

use drm_fourcc::DrmFourcc;
use tracing::{debug, trace, warn};

pub use host::{CalloopScheduler, HostScheduler, HostTask, InlineScheduler};
pub use surface::{MemorySurface, Surface, SurfaceLock};

use crate::animated::{AnimationHeader, Frame};
use crate::error::ResourceError;
use crate::frame_store::SharedFrameStore;

/// Serializes surface writes across all bridges in the process.
static PRESENT_LOCK: Mutex<()> = Mutex::new(());

/// What one render tick did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderOutcome {
    /// A frame was written and a redraw scheduled.
    Presented { sequence: u64, index: usize },
    /// No new frame since the last tick.
    Unchanged,
    /// The surface could not be written this tick.
    Skipped(ResourceError),
}

type Redraw = Arc<dyn Fn() + Send + Sync>;

/// Copies frames from a [`FrameStore`](crate::FrameStore) into a [`Surface`].
pub struct PresentationBridge<S> {
    store: SharedFrameStore,
    header: AnimationHeader,
    surface: S,
    scheduler: Arc<dyn HostScheduler>,
    redraw: Redraw,
    /// A frame whose write failed, retried on the next tick.
    pending: Option<Arc<Frame>>,
    last_sequence: Option<u64>,
}

impl<S: Surface> PresentationBridge<S> {
    /// Create a bridge and size `surface` for `header`.
    ///
    /// `redraw` is run through `scheduler` after every presented frame.
    pub fn new(
        store: SharedFrameStore,
        header: AnimationHeader,
        mut surface: S,
        scheduler: Arc<dyn HostScheduler>,
        redraw: impl Fn() + Send + Sync + 'static,
    ) -> Result<Self, ResourceError> {
        fit_surface(&mut surface, &header)?;
        Ok(Self {
            store,
            header,
            surface,
            scheduler,
            redraw: Arc::new(redraw),
            pending: None,
            last_sequence: None,
        })
    }

    /// Switch to another frame store, resizing the surface before any of its
    /// frames is copied.
    pub fn set_source(
        &mut self,
        store: SharedFrameStore,
        header: AnimationHeader,
    ) -> Result<(), ResourceError> {
        fit_surface(&mut self.surface, &header)?;
        debug!(width = header.width, height = header.height, "presentation source changed");
        self.store = store;
        self.header = header;
        self.pending = None;
        self.last_sequence = None;
        Ok(())
    }

    /// Present the latest frame, if there is one.
    pub fn render_tick(&mut self) -> RenderOutcome {
        // A newer frame supersedes one that failed to present.
        let newer = self.store.try_consume();
        let Some(frame) = newer.or_else(|| self.pending.take()) else {
            return RenderOutcome::Unchanged;
        };
        self.pending = None;

        let surface_size = self.surface.dimensions();
        if frame.dimensions() != surface_size {
            let err = ResourceError::DimensionMismatch {
                frame: frame.dimensions(),
                surface: surface_size,
            };
            warn!(%err, "dropping frame that does not fit the surface");
            return RenderOutcome::Skipped(err);
        }

        let written = {
            let _serial = PRESENT_LOCK.lock().unwrap_or_else(PoisonError::into_inner);
            write_frame(&mut self.surface, &frame)
        };

        match written {
            Ok(()) => {
                let (sequence, index) = (frame.sequence, frame.index);
                trace!(sequence, index, "frame presented");
                self.last_sequence = Some(sequence);
                let redraw = Arc::clone(&self.redraw);
                self.scheduler.schedule(Box::new(move || redraw()));
                RenderOutcome::Presented { sequence, index }
            }
            Err(err) => {
                warn!(%err, sequence = frame.sequence, "failed to present frame, retrying next tick");
                self.pending = Some(frame);
                RenderOutcome::Skipped(err)
            }
        }
    }

    /// Sequence number of the last frame written to the surface.
    pub fn last_presented(&self) -> Option<u64> {
        self.last_sequence
    }

    /// Whether a frame is waiting to be retried.
    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    pub fn header(&self) -> AnimationHeader {
        self.header
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    pub fn surface_mut(&mut self) -> &mut S {
        &mut self.surface
    }
}

impl<S> std::fmt::Debug for PresentationBridge<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PresentationBridge")
            .field("header", &self.header)
            .field("pending", &self.pending.as_ref().map(|frame| frame.sequence))
            .field("last_sequence", &self.last_sequence)
            .finish_non_exhaustive()
    }
}

fn fit_surface(surface: &mut impl Surface, header: &AnimationHeader) -> Result<(), ResourceError> {
    if surface.dimensions() != (header.width, header.height) {
        surface.resize(header.width, header.height)?;
    }
    Ok(())
}

/// Copy `frame` into `surface` under a scoped lock.
fn write_frame(surface: &mut impl Surface, frame: &Frame) -> Result<(), ResourceError> {
    let format = surface.format();
    if !matches!(format, DrmFourcc::Argb8888 | DrmFourcc::Xrgb8888) {
        return Err(ResourceError::UnsupportedFormat(format!("{format:?}")));
    }

    let mut lock = surface.lock()?;
    if lock.dimensions() != frame.dimensions() {
        return Err(ResourceError::DimensionMismatch {
            frame: frame.dimensions(),
            surface: lock.dimensions(),
        });
    }
    let stride = lock.stride();
    copy_rows(&frame.pixels, frame.stride(), lock.pixels_mut(), stride, frame.height);
    Ok(())
}

/// Copy `rows` rows of `src_stride` bytes into a destination whose rows are
/// `dst_stride` bytes apart. Destination padding is left untouched.
fn copy_rows(src: &[u8], src_stride: usize, dst: &mut [u8], dst_stride: usize, rows: u32) {
    if src_stride == dst_stride {
        let len = src_stride * rows as usize;
        dst[..len].copy_from_slice(&src[..len]);
        return;
    }

    for (src_row, dst_row) in src
        .chunks_exact(src_stride)
        .zip(dst.chunks_mut(dst_stride))
        .take(rows as usize)
    {
        dst_row[..src_stride].copy_from_slice(src_row);
    }
}
