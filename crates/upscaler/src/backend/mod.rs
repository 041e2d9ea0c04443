//! Graphics-backend adapters selected by the host's renderer kind.
//!
//! One adapter lives per device: it is built by a [`BackendFactory`] when the
//! host reports `Initialize` and dropped after `Shutdown`. The capability set
//! is deliberately small:
//! - device events are forwarded verbatim,
//! - `begin_texture_write`/`end_texture_write` bracket a CPU write into a host
//!   texture through a padded staging buffer,
//! - `gpu()` exposes the device for the upscale path when the family has one.

mod wgpu_backend;

use std::sync::Arc;

use crate::gpu::{GpuDevice, HostGraphics};
use crate::types::{DeviceEvent, NativeTexture, RendererKind};

pub use wgpu_backend::{resolve_texture, WgpuBackend};

/// A CPU-visible image of a host texture, handed out by
/// [`GraphicsBackend::begin_texture_write`].
///
/// Rows start every `row_pitch` bytes; the pitch may exceed `width * 4`.
#[derive(Debug)]
pub struct TextureWrite {
    texture: NativeTexture,
    width: u32,
    height: u32,
    row_pitch: u32,
    data: Vec<u8>,
}

impl TextureWrite {
    pub fn new(texture: NativeTexture, width: u32, height: u32, row_pitch: u32) -> Self {
        Self {
            texture,
            width,
            height,
            row_pitch,
            data: vec![0; row_pitch as usize * height as usize],
        }
    }

    pub fn texture(&self) -> NativeTexture {
        self.texture
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn row_pitch(&self) -> u32 {
        self.row_pitch
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }
}

/// Adapter over one GPU API family.
pub trait GraphicsBackend: Send {
    fn kind(&self) -> RendererKind;

    /// Reacts to a host device event. Called on the render thread only.
    fn process_device_event(&mut self, event: DeviceEvent, host: &dyn HostGraphics);

    /// Maps `texture` for CPU writes, or `None` when it cannot be written.
    fn begin_texture_write(
        &mut self,
        texture: NativeTexture,
        width: u32,
        height: u32,
    ) -> Option<TextureWrite>;

    /// Pushes the written bytes back into the texture.
    fn end_texture_write(&mut self, write: TextureWrite);

    /// Device used for GPU work. Backends returning `Some` promise that every
    /// [`NativeTexture`] published to them points at a `wgpu::Texture`.
    fn gpu(&self) -> Option<&GpuDevice>;
}

/// Builds the adapter for a renderer kind, or `None` if it is unsupported.
pub type BackendFactory =
    Arc<dyn Fn(RendererKind) -> Option<Box<dyn GraphicsBackend>> + Send + Sync>;

/// Maps a host renderer kind onto the wgpu backend that drives the same API.
pub fn wgpu_family(kind: RendererKind) -> Option<wgpu::Backend> {
    match kind {
        RendererKind::Metal => Some(wgpu::Backend::Metal),
        RendererKind::Vulkan => Some(wgpu::Backend::Vulkan),
        RendererKind::D3D12 => Some(wgpu::Backend::Dx12),
        RendererKind::OpenGLCore | RendererKind::OpenGLES30 => Some(wgpu::Backend::Gl),
        RendererKind::D3D11 | RendererKind::Null | RendererKind::Unknown(_) => None,
    }
}

pub fn create_backend(kind: RendererKind) -> Option<Box<dyn GraphicsBackend>> {
    let family = wgpu_family(kind)?;
    Some(Box::new(WgpuBackend::new(kind, family)))
}

pub fn default_factory() -> BackendFactory {
    Arc::new(create_backend)
}
