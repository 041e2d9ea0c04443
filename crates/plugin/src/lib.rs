//! C ABI of the upscale bridge.
//!
//! The host loads the library, calls [`PluginLoad`] with its function table,
//! registers textures from script code and triggers the per-frame work by
//! invoking the callback returned from [`GetRenderEventFunc`] on its render
//! thread. [`PluginUnload`] tears everything down again.

#![allow(non_snake_case)]

mod host;
mod logging;

use std::ffi::c_void;
use std::sync::{Arc, OnceLock};

use anyhow::Context as _;
use arc_swap::ArcSwapOption;
use bridgeconfig::{BridgeConfig, ColorProcessing};
use tracing::{debug, error, info, warn};
use upscaler::{BridgeContext, BridgeSettings, ColorProcessingMode, DeviceEvent, NativeTexture};

pub use host::{DeviceEventCallback, HostInterfaces};
pub use logging::{HostLogLayer, LogCallback};

/// Per-frame callback handed to the host.
pub type RenderEventCallback = extern "C" fn(event_id: i32);

struct Plugin {
    bridge: Arc<BridgeContext>,
    interfaces: HostInterfaces,
}

fn slot() -> &'static ArcSwapOption<Plugin> {
    static SLOT: OnceLock<ArcSwapOption<Plugin>> = OnceLock::new();
    SLOT.get_or_init(ArcSwapOption::default)
}

/// The live bridge, if the plugin is loaded.
pub fn bridge() -> Option<Arc<BridgeContext>> {
    slot()
        .load_full()
        .map(|plugin| Arc::clone(&plugin.bridge))
}

fn load_config() -> anyhow::Result<BridgeConfig> {
    let (config, path) =
        BridgeConfig::discover().context("failed to load bridge configuration")?;
    if let Some(path) = path {
        debug!(path = %path.display(), "loaded bridge configuration");
    }
    Ok(config)
}

fn settings_from(config: &BridgeConfig) -> BridgeSettings {
    BridgeSettings {
        scale: config.upscale.scale,
        color_processing: match config.upscale.color_processing {
            ColorProcessing::Perceptual => ColorProcessingMode::Perceptual,
            ColorProcessing::Linear => ColorProcessingMode::Linear,
            ColorProcessing::Hdr => ColorProcessingMode::Hdr,
        },
        wait_for_completion: config.upscale.wait_for_completion,
        pattern_time: config.fallback.time,
    }
}

/// Creates the bridge, subscribes to device events and initialises against
/// the device the host already has.
///
/// # Safety
///
/// `interfaces` must be null or point at a table whose functions stay
/// callable until [`PluginUnload`] returns.
#[no_mangle]
pub unsafe extern "C" fn PluginLoad(interfaces: *const HostInterfaces) {
    let config = load_config();
    logging::install(&config.as_ref().map(|c| c.logging.clone()).unwrap_or_default());
    let config = config.unwrap_or_else(|err| {
        error!("{err:#}; falling back to default configuration");
        BridgeConfig::default()
    });

    // SAFETY: caller contract above.
    let Some(interfaces) = (unsafe { interfaces.as_ref() }).copied() else {
        error!("PluginLoad called without host interfaces");
        return;
    };
    if slot().load().is_some() {
        warn!("PluginLoad called while already loaded; ignoring");
        return;
    }

    let host = Arc::new(host::FfiHost::new(interfaces));
    let bridge = Arc::new(BridgeContext::new(host, settings_from(&config)));
    slot().store(Some(Arc::new(Plugin {
        bridge: Arc::clone(&bridge),
        interfaces,
    })));

    // SAFETY: caller contract above.
    unsafe { (interfaces.register_device_event_callback)(on_graphics_device_event) };
    // The host's device already exists when plugins load, so no Initialize
    // event will arrive on its own.
    bridge.process_device_event(DeviceEvent::Initialize);
    info!(
        scale = config.upscale.scale,
        mode = ?config.upscale.color_processing,
        "upscale bridge loaded"
    );
}

#[no_mangle]
pub extern "C" fn PluginUnload() {
    let Some(plugin) = slot().swap(None) else {
        return;
    };
    // SAFETY: the table is valid until this function returns.
    unsafe { (plugin.interfaces.unregister_device_event_callback)(on_graphics_device_event) };
    plugin.bridge.shutdown();
    info!("upscale bridge unloaded");
}

/// Registers the source texture and the destination for its upscaled image.
/// A null destination selects the fallback pattern; a null source clears the
/// registration.
#[no_mangle]
pub extern "C" fn SetTexture(
    source: *mut c_void,
    width: i32,
    height: i32,
    destination: *mut c_void,
    dest_width: i32,
    dest_height: i32,
) {
    match bridge() {
        Some(bridge) => bridge.publish(
            NativeTexture::new(source),
            width,
            height,
            NativeTexture::new(destination),
            dest_width,
            dest_height,
        ),
        None => debug!("SetTexture called before PluginLoad"),
    }
}

/// Registers only a source texture, which then receives the fallback pattern.
#[no_mangle]
pub extern "C" fn SetSourceTexture(source: *mut c_void, width: i32, height: i32) {
    match bridge() {
        Some(bridge) => bridge.publish_source(NativeTexture::new(source), width, height),
        None => debug!("SetSourceTexture called before PluginLoad"),
    }
}

#[no_mangle]
pub extern "C" fn GetRenderEventFunc() -> RenderEventCallback {
    on_render_event
}

/// Installs the host's log sinks. Null clears a sink.
#[no_mangle]
pub extern "C" fn SetLogCallback(log: Option<LogCallback>, log_error: Option<LogCallback>) {
    logging::set_host_sinks(log, log_error);
}

extern "C" fn on_render_event(event_id: i32) {
    if let Some(bridge) = bridge() {
        bridge.render_event(event_id);
    }
}

extern "C" fn on_graphics_device_event(event: i32) {
    let Some(bridge) = bridge() else {
        return;
    };
    match DeviceEvent::from_raw(event) {
        Some(event) => bridge.process_device_event(event),
        None => debug!(event, "ignoring unknown device event"),
    }
}
