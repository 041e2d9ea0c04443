//! Core of the upscale bridge: lets a host engine hand over a low-resolution
//! colour texture and have it upscaled on the GPU once per frame.
//!
//! The host talks to the bridge from two threads. The flow is:
//!
//! ```text
//!   script thread                      render thread
//!   ─────────────                      ─────────────
//!   publish(src, dst) ──▶ TextureRegistry ──▶ render_event(1)
//!                         (atomic snapshot)        │
//!                                                  ├─ dst present ─▶ SpatialUpscaler ─▶ copy into dst
//!                                                  └─ dst absent  ─▶ plasma fill of src
//!
//!   device events ──▶ DeviceLifecycle ──▶ GraphicsBackend (one per device)
//! ```
//!
//! [`BridgeContext`] owns all of it; the C ABI in the `plugin` crate keeps a
//! single context alive between load and unload.

pub mod backend;
pub mod bridge;
pub mod convert;
pub mod fallback;
pub mod gpu;
pub mod lifecycle;
pub mod pipeline;
pub mod registry;
pub mod types;

pub use backend::{create_backend, BackendFactory, GraphicsBackend, TextureWrite, WgpuBackend};
pub use bridge::{
    BridgeContext, BridgeSettings, FrameCounts, FrameOutcome, SkipReason, TEXTURE_UPDATE_EVENT,
};
pub use convert::{image_from_texture, texture_from_image, ConvertError};
pub use fallback::{FillError, DEFAULT_PATTERN_TIME};
pub use gpu::{DeviceRequestError, GpuDevice, HostGraphics};
pub use lifecycle::DeviceLifecycle;
pub use pipeline::{ScalerDescriptor, SessionKey, SpatialUpscaler, UpscaleError};
pub use registry::{TextureBinding, TextureRegistry, TextureSnapshot};
pub use types::{ColorProcessingMode, DeviceEvent, NativeTexture, RendererKind};
