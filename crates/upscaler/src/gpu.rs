use crate::types::RendererKind;

/// Reference-counted handles to a GPU device and its submission queue.
///
/// On the plugin path the host owns the device; the bridge only clones these
/// handles on `Initialize` and drops them on `Shutdown`.
#[derive(Clone, Debug)]
pub struct GpuDevice {
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    pub backend: wgpu::Backend,
}

#[derive(Debug, thiserror::Error)]
pub enum DeviceRequestError {
    #[error("no suitable GPU adapter: {0}")]
    Adapter(#[from] wgpu::RequestAdapterError),
    #[error("failed to create GPU device: {0}")]
    Device(#[from] wgpu::RequestDeviceError),
}

impl GpuDevice {
    pub fn new(device: wgpu::Device, queue: wgpu::Queue, backend: wgpu::Backend) -> Self {
        Self {
            device,
            queue,
            backend,
        }
    }

    /// Creates a device with no surface, preferring hardware and falling back
    /// to a software adapter when the platform offers one.
    pub fn request_headless(label: &str) -> Result<Self, DeviceRequestError> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let adapter = match pollster::block_on(instance.request_adapter(
            &wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            },
        )) {
            Ok(adapter) => adapter,
            Err(err) => {
                tracing::debug!(error = %err, "no hardware adapter; trying fallback adapter");
                pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
                    power_preference: wgpu::PowerPreference::LowPower,
                    compatible_surface: None,
                    force_fallback_adapter: true,
                }))?
            }
        };

        let info = adapter.get_info();
        tracing::debug!(
            name = %info.name,
            backend = ?info.backend,
            device_type = ?info.device_type,
            "selected headless GPU adapter"
        );

        let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
            label: Some(label),
            required_features: wgpu::Features::empty(),
            required_limits: adapter.limits(),
            memory_hints: wgpu::MemoryHints::MemoryUsage,
            trace: wgpu::Trace::default(),
        }))?;

        Ok(Self::new(device, queue, info.backend))
    }

    /// Blocks until every submitted command buffer has finished.
    pub fn wait_idle(&self) -> Result<(), wgpu::PollError> {
        self.device.poll(wgpu::PollType::Wait).map(|_| ())
    }
}

/// Headless device for GPU-backed tests; `None` skips the test on machines
/// without any adapter.
#[cfg(test)]
pub(crate) fn test_device() -> Option<GpuDevice> {
    match GpuDevice::request_headless("upscaler tests") {
        Ok(gpu) => Some(gpu),
        Err(err) => {
            eprintln!("skipping GPU test: {err}");
            None
        }
    }
}

/// What the bridge needs from the host engine's graphics subsystem.
pub trait HostGraphics: Send + Sync {
    /// The graphics API the host is currently rendering with.
    fn renderer(&self) -> RendererKind;
    /// The host's device, if the active renderer exposes one to plugins.
    fn device(&self) -> Option<GpuDevice>;
}
