use std::thread::{self, ThreadId};

use tracing::{debug, info, warn};

use crate::backend::{BackendFactory, GraphicsBackend};
use crate::gpu::HostGraphics;
use crate::pipeline::SpatialUpscaler;
use crate::types::{DeviceEvent, RendererKind};

/// Backend instance plus the GPU state derived from it.
///
/// Everything here is torn down together when the host shuts the device down,
/// so nothing created against an old device survives into the next one.
pub struct ActiveDevice {
    pub(crate) backend: Box<dyn GraphicsBackend>,
    pub(crate) upscaler: Option<SpatialUpscaler>,
    pub(crate) generation: u64,
    pub(crate) last_mismatch: Option<((u32, u32), (u32, u32))>,
}

impl ActiveDevice {
    pub fn backend(&self) -> &dyn GraphicsBackend {
        self.backend.as_ref()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn upscaler(&self) -> Option<&SpatialUpscaler> {
        self.upscaler.as_ref()
    }
}

/// Tracks the host device through `Initialize → (reset)* → Shutdown` cycles.
pub struct DeviceLifecycle {
    factory: BackendFactory,
    active: Option<ActiveDevice>,
    renderer: RendererKind,
    render_thread: Option<ThreadId>,
    generation: u64,
}

impl DeviceLifecycle {
    pub fn new(factory: BackendFactory) -> Self {
        Self {
            factory,
            active: None,
            renderer: RendererKind::Null,
            render_thread: None,
            generation: 0,
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.active.is_some()
    }

    /// Renderer reported by the host at the last `Initialize`, `Null` otherwise.
    pub fn renderer(&self) -> RendererKind {
        self.renderer
    }

    /// Number of backend instances created so far.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn active(&self) -> Option<&ActiveDevice> {
        self.active.as_ref()
    }

    pub fn active_mut(&mut self) -> Option<&mut ActiveDevice> {
        self.active.as_mut()
    }

    /// Applies one host device event.
    ///
    /// # Panics
    ///
    /// A second `Initialize` without an intervening `Shutdown` means the host
    /// broke its contract; this panics rather than leak the live backend.
    pub fn handle_event(&mut self, event: DeviceEvent, host: &dyn HostGraphics) {
        self.note_thread(event);

        match event {
            DeviceEvent::Initialize => self.initialize(host),
            DeviceEvent::Shutdown => self.shutdown(host),
            DeviceEvent::BeforeReset | DeviceEvent::AfterReset => {
                match self.active.as_mut() {
                    Some(active) => {
                        if event == DeviceEvent::BeforeReset {
                            // The scaler's textures belong to the device being reset.
                            active.upscaler = None;
                            active.last_mismatch = None;
                        }
                        active.backend.process_device_event(event, host);
                    }
                    None => debug!(?event, "ignoring device event with no active backend"),
                }
            }
        }
    }

    fn initialize(&mut self, host: &dyn HostGraphics) {
        assert!(
            self.active.is_none(),
            "device Initialize received while a backend is already active"
        );

        let renderer = host.renderer();
        self.renderer = renderer;

        let Some(mut backend) = (self.factory)(renderer) else {
            warn!(%renderer, "unsupported renderer; plugin stays inactive");
            return;
        };

        self.generation += 1;
        backend.process_device_event(DeviceEvent::Initialize, host);
        info!(%renderer, generation = self.generation, "graphics backend initialised");

        self.active = Some(ActiveDevice {
            backend,
            upscaler: None,
            generation: self.generation,
            last_mismatch: None,
        });
    }

    fn shutdown(&mut self, host: &dyn HostGraphics) {
        match self.active.take() {
            Some(mut active) => {
                active.upscaler = None;
                active.backend.process_device_event(DeviceEvent::Shutdown, host);
                info!(
                    renderer = %self.renderer,
                    generation = active.generation,
                    "graphics backend shut down"
                );
            }
            None => debug!("shutdown received with no active backend"),
        }
        self.renderer = RendererKind::Null;
        self.render_thread = None;
    }

    fn note_thread(&mut self, event: DeviceEvent) {
        let current = thread::current().id();
        match self.render_thread {
            Some(expected) if expected != current => {
                warn!(?event, "device event delivered off the render thread");
            }
            Some(_) => {}
            None if event == DeviceEvent::Initialize => self.render_thread = Some(current),
            None => {}
        }
    }
}
