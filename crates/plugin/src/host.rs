use std::ffi::c_void;

use upscaler::{GpuDevice, HostGraphics, RendererKind};

/// Callback the host invokes with a raw device-event code.
pub type DeviceEventCallback = extern "C" fn(event: i32);

/// Function table the host passes to `PluginLoad`.
///
/// `get_device` returns a pointer to a host-owned [`GpuDevice`], or null when
/// the active renderer has none to share.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct HostInterfaces {
    pub get_renderer: unsafe extern "C" fn() -> i32,
    pub get_device: unsafe extern "C" fn() -> *const c_void,
    pub register_device_event_callback: unsafe extern "C" fn(DeviceEventCallback),
    pub unregister_device_event_callback: unsafe extern "C" fn(DeviceEventCallback),
}

pub(crate) struct FfiHost {
    interfaces: HostInterfaces,
}

impl FfiHost {
    pub fn new(interfaces: HostInterfaces) -> Self {
        Self { interfaces }
    }
}

impl HostGraphics for FfiHost {
    fn renderer(&self) -> RendererKind {
        // SAFETY: the host guarantees its table stays callable until unload.
        RendererKind::from_raw(unsafe { (self.interfaces.get_renderer)() })
    }

    fn device(&self) -> Option<GpuDevice> {
        // SAFETY: as above; a non-null result points at a live `GpuDevice`.
        let raw = unsafe { (self.interfaces.get_device)() };
        let device = unsafe { raw.cast::<GpuDevice>().as_ref() }?;
        Some(device.clone())
    }
}
