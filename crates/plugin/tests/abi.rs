use std::ffi::c_void;
use std::ptr;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::{Mutex, MutexGuard, OnceLock, PoisonError};

use image::RgbaImage;
use rendering_plugin::{
    bridge, DeviceEventCallback, GetRenderEventFunc, HostInterfaces, PluginLoad, PluginUnload,
    SetSourceTexture, SetTexture,
};
use upscaler::fallback::plasma_value;
use upscaler::{
    image_from_texture, texture_from_image, FrameCounts, GpuDevice, RendererKind,
};

/// The plugin keeps process-wide state, so these tests take turns.
static SERIAL: Mutex<()> = Mutex::new(());
static RENDERER: AtomicI32 = AtomicI32::new(4);
static DEVICE: OnceLock<Option<GpuDevice>> = OnceLock::new();
static CALLBACK: Mutex<Option<DeviceEventCallback>> = Mutex::new(None);

fn serial() -> MutexGuard<'static, ()> {
    SERIAL.lock().unwrap_or_else(PoisonError::into_inner)
}

unsafe extern "C" fn get_renderer() -> i32 {
    RENDERER.load(Ordering::SeqCst)
}

unsafe extern "C" fn get_device() -> *const c_void {
    if RENDERER.load(Ordering::SeqCst) == RendererKind::Null.as_raw() {
        return ptr::null();
    }
    match DEVICE.get() {
        Some(Some(gpu)) => (gpu as *const GpuDevice).cast(),
        _ => ptr::null(),
    }
}

unsafe extern "C" fn register_callback(callback: DeviceEventCallback) {
    *CALLBACK.lock().unwrap() = Some(callback);
}

unsafe extern "C" fn unregister_callback(_callback: DeviceEventCallback) {
    *CALLBACK.lock().unwrap() = None;
}

const INTERFACES: HostInterfaces = HostInterfaces {
    get_renderer,
    get_device,
    register_device_event_callback: register_callback,
    unregister_device_event_callback: unregister_callback,
};

fn fire_device_event(event: i32) {
    let callback = CALLBACK.lock().unwrap().expect("callback registered");
    callback(event);
}

fn shared_device() -> Option<(&'static GpuDevice, RendererKind)> {
    let gpu = DEVICE
        .get_or_init(|| match GpuDevice::request_headless("plugin tests") {
            Ok(gpu) => Some(gpu),
            Err(err) => {
                eprintln!("skipping GPU test: {err}");
                None
            }
        })
        .as_ref()?;
    let renderer = match gpu.backend {
        wgpu::Backend::Vulkan => RendererKind::Vulkan,
        wgpu::Backend::Metal => RendererKind::Metal,
        wgpu::Backend::Dx12 => RendererKind::D3D12,
        wgpu::Backend::Gl => RendererKind::OpenGLCore,
        _ => return None,
    };
    Some((gpu, renderer))
}

fn texture(gpu: &GpuDevice, width: u32, height: u32) -> wgpu::Texture {
    gpu.device.create_texture(&wgpu::TextureDescriptor {
        label: Some("host texture"),
        size: wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: wgpu::TextureFormat::Rgba8Unorm,
        usage: wgpu::TextureUsages::COPY_DST
            | wgpu::TextureUsages::COPY_SRC
            | wgpu::TextureUsages::TEXTURE_BINDING,
        view_formats: &[],
    })
}

fn as_handle(texture: &wgpu::Texture) -> *mut c_void {
    texture as *const wgpu::Texture as *mut c_void
}

#[test]
fn exports_are_safe_before_load() {
    let _guard = serial();
    assert!(bridge().is_none());

    SetTexture(ptr::null_mut(), 64, 64, ptr::null_mut(), 128, 128);
    SetSourceTexture(ptr::null_mut(), 0, 0);
    GetRenderEventFunc()(1);
    PluginUnload();

    unsafe { PluginLoad(ptr::null()) };
    assert!(bridge().is_none());
}

#[test]
fn unsupported_renderer_loads_but_stays_idle() {
    let _guard = serial();
    RENDERER.store(RendererKind::Null.as_raw(), Ordering::SeqCst);

    unsafe { PluginLoad(&INTERFACES) };
    let bridge = bridge().expect("plugin loaded");
    assert!(!bridge.is_initialized());
    assert!(CALLBACK.lock().unwrap().is_some());

    SetSourceTexture(ptr::null_mut(), 8, 8);
    GetRenderEventFunc()(1);
    GetRenderEventFunc()(0);
    assert_eq!(
        bridge.stats(),
        FrameCounts {
            skipped: 2,
            ..FrameCounts::default()
        }
    );

    PluginUnload();
    assert!(rendering_plugin::bridge().is_none());
    assert!(CALLBACK.lock().unwrap().is_none());
}

#[test]
fn device_events_drive_the_lifecycle() {
    let _guard = serial();
    RENDERER.store(RendererKind::Null.as_raw(), Ordering::SeqCst);
    unsafe { PluginLoad(&INTERFACES) };
    let bridge = bridge().expect("plugin loaded");

    // Renderer switches to one with a backend, as after a device reset.
    RENDERER.store(RendererKind::Metal.as_raw(), Ordering::SeqCst);
    fire_device_event(1);
    fire_device_event(0);
    assert!(bridge.is_initialized());
    assert_eq!(bridge.generation(), 1);

    fire_device_event(2);
    fire_device_event(3);
    fire_device_event(42);
    assert!(bridge.is_initialized());

    fire_device_event(1);
    assert!(!bridge.is_initialized());

    PluginUnload();
    RENDERER.store(RendererKind::Null.as_raw(), Ordering::SeqCst);
}

#[test]
fn six_parameter_registration_upscales() {
    let _guard = serial();
    let Some((gpu, renderer)) = shared_device() else { return };
    RENDERER.store(renderer.as_raw(), Ordering::SeqCst);

    unsafe { PluginLoad(&INTERFACES) };
    let bridge = bridge().expect("plugin loaded");
    assert!(bridge.is_initialized());

    let source = texture_from_image(
        gpu,
        &RgbaImage::from_fn(64, 64, |x, y| image::Rgba([(x * 4) as u8, (y * 4) as u8, 90, 255])),
        "source",
    );
    let destination = texture(gpu, 128, 128);
    SetTexture(as_handle(&source), 64, 64, as_handle(&destination), 128, 128);
    GetRenderEventFunc()(1);

    assert_eq!(bridge.stats().upscaled, 1);
    let image = image_from_texture(gpu, &destination).unwrap();
    assert_eq!(image.dimensions(), (128, 128));
    assert!(image.pixels().any(|pixel| pixel.0 != [0, 0, 0, 0]));

    PluginUnload();
    RENDERER.store(RendererKind::Null.as_raw(), Ordering::SeqCst);
}

#[test]
fn legacy_registration_fills_the_pattern() {
    let _guard = serial();
    let Some((gpu, renderer)) = shared_device() else { return };
    RENDERER.store(renderer.as_raw(), Ordering::SeqCst);

    unsafe { PluginLoad(&INTERFACES) };
    let bridge = bridge().expect("plugin loaded");

    let source = texture(gpu, 33, 9);
    SetSourceTexture(as_handle(&source), 33, 9);
    GetRenderEventFunc()(1);
    assert_eq!(bridge.stats().filled, 1);

    let image = image_from_texture(gpu, &source).unwrap();
    let time = bridge.settings().pattern_time;
    for (x, y, pixel) in image.enumerate_pixels() {
        assert_eq!(pixel.0, [plasma_value(x, y, time); 4]);
    }

    SetSourceTexture(ptr::null_mut(), 33, 9);
    GetRenderEventFunc()(1);
    assert_eq!(bridge.stats().filled, 1);

    PluginUnload();
    RENDERER.store(RendererKind::Null.as_raw(), Ordering::SeqCst);
}
