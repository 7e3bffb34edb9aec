// SPDX-License-Identifier: MPL-2.0

//! Animated GIF playback for UI hosts.
//!
//! A [`AnimatedPlayer`] decodes on its own thread and publishes each finished
//! frame to a [`FrameStore`]. The host's UI thread pulls frames out with a
//! [`PresentationBridge`], which copies them into a locked [`Surface`] and
//! schedules a redraw through a [`HostScheduler`].

pub mod animated;
pub mod error;
pub mod frame_store;
pub mod present;

pub use animated::{
    AnimatedPlayer, AnimationHeader, Command, CommandSender, Delivery, EventSink, Frame,
    FrameDecoder, GifDecoder, LoopPolicy, PlayerEvent, WorkerState,
};
pub use cosmic_anim_config::PlayerConfig;
pub use error::{ConstructionError, DecodeError, ResourceError};
pub use frame_store::{FrameStore, SharedFrameStore, StoreStats};
pub use present::{
    CalloopScheduler, HostScheduler, InlineScheduler, MemorySurface, PresentationBridge,
    RenderOutcome, Surface, SurfaceLock,
};
