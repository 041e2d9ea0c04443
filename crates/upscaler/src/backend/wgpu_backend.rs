use tracing::{debug, warn};

use super::{GraphicsBackend, TextureWrite};
use crate::gpu::{GpuDevice, HostGraphics};
use crate::types::{aligned_row_pitch, is_rgba8_family, DeviceEvent, NativeTexture, RendererKind};

/// Adapter for every renderer kind wgpu can drive natively.
///
/// The device itself belongs to the host; this adapter clones its handles on
/// `Initialize` and lets go of them on `Shutdown`.
pub struct WgpuBackend {
    kind: RendererKind,
    family: wgpu::Backend,
    gpu: Option<GpuDevice>,
}

impl WgpuBackend {
    pub fn new(kind: RendererKind, family: wgpu::Backend) -> Self {
        Self {
            kind,
            family,
            gpu: None,
        }
    }

    fn drain(&self, reason: &'static str) {
        if let Some(gpu) = &self.gpu {
            if let Err(err) = gpu.wait_idle() {
                warn!(error = %err, reason, "failed to drain GPU queue");
            }
        }
    }
}

impl GraphicsBackend for WgpuBackend {
    fn kind(&self) -> RendererKind {
        self.kind
    }

    fn process_device_event(&mut self, event: DeviceEvent, host: &dyn HostGraphics) {
        match event {
            DeviceEvent::Initialize => {
                let Some(gpu) = host.device() else {
                    warn!(renderer = %self.kind, "host exposes no device; GPU upscaling disabled");
                    return;
                };
                if gpu.backend != self.family {
                    warn!(
                        renderer = %self.kind,
                        expected = ?self.family,
                        actual = ?gpu.backend,
                        "host device runs on a different backend than reported"
                    );
                }
                debug!(renderer = %self.kind, backend = ?gpu.backend, "acquired host device");
                self.gpu = Some(gpu);
            }
            DeviceEvent::Shutdown => {
                self.drain("shutdown");
                self.gpu = None;
                debug!(renderer = %self.kind, "released host device");
            }
            DeviceEvent::BeforeReset => self.drain("reset"),
            DeviceEvent::AfterReset => debug!(renderer = %self.kind, "device reset complete"),
        }
    }

    fn begin_texture_write(
        &mut self,
        texture: NativeTexture,
        width: u32,
        height: u32,
    ) -> Option<TextureWrite> {
        self.gpu.as_ref()?;
        // SAFETY: a backend with a device only receives wgpu texture handles,
        // and this runs inside the render callback that keeps them alive.
        let target = unsafe { resolve_texture(texture) };

        if !is_rgba8_family(target.format()) {
            warn!(format = ?target.format(), "texture format is not writable from the CPU path");
            return None;
        }
        if !target.usage().contains(wgpu::TextureUsages::COPY_DST) {
            warn!("texture was not created with COPY_DST usage");
            return None;
        }

        let size = target.size();
        let width = width.min(size.width);
        let height = height.min(size.height);
        if width == 0 || height == 0 {
            return None;
        }

        Some(TextureWrite::new(
            texture,
            width,
            height,
            aligned_row_pitch(width),
        ))
    }

    fn end_texture_write(&mut self, write: TextureWrite) {
        let Some(gpu) = &self.gpu else {
            return;
        };
        // SAFETY: same contract as in `begin_texture_write`.
        let target = unsafe { resolve_texture(write.texture()) };

        gpu.queue.write_texture(
            target.as_image_copy(),
            write.data(),
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(write.row_pitch()),
                rows_per_image: Some(write.height()),
            },
            wgpu::Extent3d {
                width: write.width(),
                height: write.height(),
                depth_or_array_layers: 1,
            },
        );
        gpu.queue.submit(std::iter::empty());
    }

    fn gpu(&self) -> Option<&GpuDevice> {
        self.gpu.as_ref()
    }
}

/// Reinterprets a host handle as the `wgpu::Texture` it points at.
///
/// # Safety
///
/// `handle` must have been produced by [`NativeTexture::from_wgpu`] and the
/// texture must outlive `'a`.
pub unsafe fn resolve_texture<'a>(handle: NativeTexture) -> &'a wgpu::Texture {
    &*handle.as_ptr().cast::<wgpu::Texture>()
}
