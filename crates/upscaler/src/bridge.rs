use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{trace, warn};

use crate::backend::{default_factory, resolve_texture, BackendFactory};
use crate::fallback::{self, DEFAULT_PATTERN_TIME};
use crate::gpu::HostGraphics;
use crate::lifecycle::{ActiveDevice, DeviceLifecycle};
use crate::pipeline::{ScalerDescriptor, SpatialUpscaler};
use crate::registry::{TextureBinding, TextureRegistry};
use crate::types::{ColorProcessingMode, DeviceEvent, NativeTexture};

/// Render-event id that requests the per-frame texture update. Every other id
/// is reserved and ignored.
pub const TEXTURE_UPDATE_EVENT: i32 = 1;

#[derive(Clone, Debug, PartialEq)]
pub struct BridgeSettings {
    pub scale: f32,
    pub color_processing: ColorProcessingMode,
    /// Block the render thread until the upscale has finished on the GPU.
    pub wait_for_completion: bool,
    pub pattern_time: f32,
}

impl Default for BridgeSettings {
    fn default() -> Self {
        Self {
            scale: 2.0,
            color_processing: ColorProcessingMode::Perceptual,
            wait_for_completion: true,
            pattern_time: DEFAULT_PATTERN_TIME,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SkipReason {
    ReservedEvent,
    NoBackend,
    NoTexture,
    NoDevice,
    Unwritable,
    IncompatibleDestination,
    Failed,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameOutcome {
    Upscaled,
    Filled,
    Skipped(SkipReason),
}

#[derive(Default)]
pub struct FrameStats {
    upscaled: AtomicU64,
    filled: AtomicU64,
    skipped: AtomicU64,
    failed: AtomicU64,
}

/// Point-in-time copy of [`FrameStats`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FrameCounts {
    pub upscaled: u64,
    pub filled: u64,
    /// Frames skipped for any reason, including failures.
    pub skipped: u64,
    pub failed: u64,
}

impl FrameStats {
    fn record(&self, outcome: FrameOutcome) {
        let counter = match outcome {
            FrameOutcome::Upscaled => &self.upscaled,
            FrameOutcome::Filled => &self.filled,
            FrameOutcome::Skipped(reason) => {
                if reason == SkipReason::Failed {
                    self.failed.fetch_add(1, Ordering::Relaxed);
                }
                &self.skipped
            }
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> FrameCounts {
        FrameCounts {
            upscaled: self.upscaled.load(Ordering::Relaxed),
            filled: self.filled.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}

/// Everything one loaded plugin instance owns.
///
/// Texture registration may come from any thread. Device and render events
/// are expected on the host's render thread.
pub struct BridgeContext {
    host: Arc<dyn HostGraphics>,
    settings: BridgeSettings,
    registry: TextureRegistry,
    lifecycle: Mutex<DeviceLifecycle>,
    stats: FrameStats,
}

impl BridgeContext {
    pub fn new(host: Arc<dyn HostGraphics>, settings: BridgeSettings) -> Self {
        Self::with_factory(host, settings, default_factory())
    }

    pub fn with_factory(
        host: Arc<dyn HostGraphics>,
        settings: BridgeSettings,
        factory: BackendFactory,
    ) -> Self {
        Self {
            host,
            settings,
            registry: TextureRegistry::new(),
            lifecycle: Mutex::new(DeviceLifecycle::new(factory)),
            stats: FrameStats::default(),
        }
    }

    pub fn settings(&self) -> &BridgeSettings {
        &self.settings
    }

    pub fn registry(&self) -> &TextureRegistry {
        &self.registry
    }

    pub fn publish(
        &self,
        source: Option<NativeTexture>,
        width: i32,
        height: i32,
        destination: Option<NativeTexture>,
        dest_width: i32,
        dest_height: i32,
    ) {
        self.registry
            .publish(source, width, height, destination, dest_width, dest_height);
    }

    pub fn publish_source(&self, source: Option<NativeTexture>, width: i32, height: i32) {
        self.registry.publish_source(source, width, height);
    }

    pub fn process_device_event(&self, event: DeviceEvent) {
        self.lock_lifecycle().handle_event(event, self.host.as_ref());
    }

    pub fn is_initialized(&self) -> bool {
        self.lock_lifecycle().is_initialized()
    }

    /// Number of backends created so far; bumps on every successful Initialize.
    pub fn generation(&self) -> u64 {
        self.lock_lifecycle().generation()
    }

    /// Descriptor of the live upscale session, if a frame has built one on
    /// the current device.
    pub fn scaler_descriptor(&self) -> Option<ScalerDescriptor> {
        self.lock_lifecycle()
            .active()
            .and_then(|active| active.upscaler())
            .and_then(SpatialUpscaler::descriptor)
    }

    pub fn stats(&self) -> FrameCounts {
        self.stats.snapshot()
    }

    /// Shuts the backend down if it is still alive and forgets the textures.
    pub fn shutdown(&self) {
        let mut lifecycle = self.lock_lifecycle();
        if lifecycle.is_initialized() {
            lifecycle.handle_event(DeviceEvent::Shutdown, self.host.as_ref());
        }
        drop(lifecycle);
        self.registry.clear();
    }

    /// Runs the per-frame work for `event_id`.
    pub fn render_event(&self, event_id: i32) -> FrameOutcome {
        let outcome = self.run_frame(event_id);
        trace!(event_id, ?outcome, "render event");
        self.stats.record(outcome);
        outcome
    }

    fn run_frame(&self, event_id: i32) -> FrameOutcome {
        if event_id != TEXTURE_UPDATE_EVENT {
            return FrameOutcome::Skipped(SkipReason::ReservedEvent);
        }

        let mut lifecycle = self.lock_lifecycle();
        let Some(active) = lifecycle.active_mut() else {
            return FrameOutcome::Skipped(SkipReason::NoBackend);
        };
        let Some(snapshot) = self.registry.current_snapshot() else {
            return FrameOutcome::Skipped(SkipReason::NoTexture);
        };
        if snapshot.source.is_empty() {
            return FrameOutcome::Skipped(SkipReason::NoTexture);
        }

        match snapshot.destination {
            Some(destination) if destination.is_empty() => {
                FrameOutcome::Skipped(SkipReason::NoTexture)
            }
            Some(destination) => self.upscale_frame(active, snapshot.source, destination),
            None => self.fill_frame(active, snapshot.source),
        }
    }

    fn upscale_frame(
        &self,
        active: &mut ActiveDevice,
        source: TextureBinding,
        destination: TextureBinding,
    ) -> FrameOutcome {
        let Some(gpu) = active.backend.gpu().cloned() else {
            return FrameOutcome::Skipped(SkipReason::NoDevice);
        };
        // SAFETY: the backend holds a wgpu device, so published handles are
        // wgpu textures that the host keeps alive for this callback.
        let (input, target) = unsafe {
            (
                resolve_texture(source.handle),
                resolve_texture(destination.handle),
            )
        };

        if input.format().remove_srgb_suffix() != target.format().remove_srgb_suffix()
            || !target.usage().contains(wgpu::TextureUsages::COPY_DST)
            || target.sample_count() != 1
        {
            warn!(
                source = ?input.format(),
                destination = ?target.format(),
                "destination cannot receive the upscaled image; skipping frame"
            );
            return FrameOutcome::Skipped(SkipReason::IncompatibleDestination);
        }

        let mode = self.settings.color_processing;
        let upscaler = active
            .upscaler
            .get_or_insert_with(|| SpatialUpscaler::new(gpu.clone(), mode));

        let mut encoder = gpu
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("upscale frame encoder"),
            });
        let output = match upscaler.upscale(&mut encoder, input, self.settings.scale) {
            Ok(output) => output,
            Err(err) => {
                warn!(error = %err, "upscale failed; skipping frame");
                return FrameOutcome::Skipped(SkipReason::Failed);
            }
        };

        let produced = (output.width(), output.height());
        let expected = (target.width(), target.height());
        if produced != expected && active.last_mismatch != Some((produced, expected)) {
            warn!(
                ?produced,
                ?expected,
                "upscaled size differs from destination; copying the overlap"
            );
            active.last_mismatch = Some((produced, expected));
        }

        encoder.copy_texture_to_texture(
            output.as_image_copy(),
            target.as_image_copy(),
            wgpu::Extent3d {
                width: produced.0.min(expected.0),
                height: produced.1.min(expected.1),
                depth_or_array_layers: 1,
            },
        );
        let submission = gpu.queue.submit(Some(encoder.finish()));

        if self.settings.wait_for_completion {
            if let Err(err) = gpu
                .device
                .poll(wgpu::PollType::WaitForSubmissionIndex(submission))
            {
                warn!(error = %err, "failed to wait for upscale completion");
            }
        }
        FrameOutcome::Upscaled
    }

    fn fill_frame(&self, active: &mut ActiveDevice, source: TextureBinding) -> FrameOutcome {
        let Some(mut write) =
            active
                .backend
                .begin_texture_write(source.handle, source.width, source.height)
        else {
            return FrameOutcome::Skipped(SkipReason::Unwritable);
        };

        let (width, height, row_pitch) = (write.width(), write.height(), write.row_pitch());
        if let Err(err) = fallback::fill_with_time(
            write.data_mut(),
            width,
            height,
            row_pitch as usize,
            self.settings.pattern_time,
        ) {
            warn!(error = %err, "fallback pattern did not fit the texture buffer");
            return FrameOutcome::Skipped(SkipReason::Failed);
        }
        active.backend.end_texture_write(write);
        FrameOutcome::Filled
    }

    fn lock_lifecycle(&self) -> MutexGuard<'_, DeviceLifecycle> {
        self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::backend::testing::{recording_factory, Recorder, StubHost};
    use crate::fallback::plasma_value;
    use crate::types::RendererKind;

    fn context(kind: RendererKind) -> (BridgeContext, Arc<Mutex<Recorder>>) {
        let recorder = Arc::new(Mutex::new(Recorder::default()));
        let bridge = BridgeContext::with_factory(
            Arc::new(StubHost(kind)),
            BridgeSettings::default(),
            recording_factory(Arc::clone(&recorder)),
        );
        (bridge, recorder)
    }

    fn handle(addr: usize) -> NativeTexture {
        NativeTexture::new(addr as *mut std::ffi::c_void).unwrap()
    }

    #[test]
    fn reserved_event_ids_do_nothing() {
        let (bridge, recorder) = context(RendererKind::Metal);
        bridge.process_device_event(DeviceEvent::Initialize);
        bridge.publish_source(Some(handle(0x40)), 4, 4);

        for id in [0, 2, -1, 99] {
            assert_eq!(
                bridge.render_event(id),
                FrameOutcome::Skipped(SkipReason::ReservedEvent)
            );
        }
        assert!(recorder.lock().unwrap().uploads.is_empty());
    }

    #[test]
    fn render_before_initialise_is_a_no_op() {
        let (bridge, _recorder) = context(RendererKind::Metal);
        bridge.publish_source(Some(handle(0x40)), 4, 4);
        assert_eq!(
            bridge.render_event(TEXTURE_UPDATE_EVENT),
            FrameOutcome::Skipped(SkipReason::NoBackend)
        );
    }

    #[test]
    fn unsupported_renderer_never_renders() {
        let (bridge, _recorder) = context(RendererKind::Null);
        bridge.process_device_event(DeviceEvent::Initialize);
        bridge.publish_source(Some(handle(0x40)), 4, 4);
        assert!(!bridge.is_initialized());
        assert_eq!(
            bridge.render_event(TEXTURE_UPDATE_EVENT),
            FrameOutcome::Skipped(SkipReason::NoBackend)
        );
    }

    #[test]
    fn null_or_empty_source_is_skipped() {
        let (bridge, recorder) = context(RendererKind::Vulkan);
        bridge.process_device_event(DeviceEvent::Initialize);

        assert_eq!(
            bridge.render_event(TEXTURE_UPDATE_EVENT),
            FrameOutcome::Skipped(SkipReason::NoTexture)
        );
        bridge.publish(None, 64, 64, Some(handle(0x80)), 128, 128);
        assert_eq!(
            bridge.render_event(TEXTURE_UPDATE_EVENT),
            FrameOutcome::Skipped(SkipReason::NoTexture)
        );
        bridge.publish_source(Some(handle(0x40)), 0, 16);
        assert_eq!(
            bridge.render_event(TEXTURE_UPDATE_EVENT),
            FrameOutcome::Skipped(SkipReason::NoTexture)
        );
        assert!(recorder.lock().unwrap().uploads.is_empty());
    }

    #[test]
    fn source_without_destination_gets_the_fallback_pattern() {
        let (bridge, recorder) = context(RendererKind::Metal);
        bridge.process_device_event(DeviceEvent::Initialize);
        bridge.publish_source(Some(handle(0x40)), 5, 3);

        assert_eq!(bridge.render_event(TEXTURE_UPDATE_EVENT), FrameOutcome::Filled);

        let recorder = recorder.lock().unwrap();
        let (width, height, pitch, data) = recorder.uploads.get(&0x40).unwrap();
        assert_eq!((*width, *height), (5, 3));
        for y in 0..*height {
            for x in 0..*width {
                let offset = (y * pitch + x * 4) as usize;
                let value = plasma_value(x, y, DEFAULT_PATTERN_TIME);
                assert_eq!(&data[offset..offset + 4], &[value; 4]);
            }
            let padding = (y * pitch + width * 4) as usize..((y + 1) * pitch) as usize;
            assert!(data[padding].iter().all(|&byte| byte == 0));
        }
    }

    #[test]
    fn destination_without_device_is_skipped() {
        let (bridge, _recorder) = context(RendererKind::Metal);
        bridge.process_device_event(DeviceEvent::Initialize);
        bridge.publish(Some(handle(0x40)), 64, 64, Some(handle(0x80)), 128, 128);
        assert_eq!(
            bridge.render_event(TEXTURE_UPDATE_EVENT),
            FrameOutcome::Skipped(SkipReason::NoDevice)
        );
    }

    #[test]
    fn stats_count_every_outcome() {
        let (bridge, _recorder) = context(RendererKind::Metal);
        bridge.render_event(TEXTURE_UPDATE_EVENT);
        bridge.process_device_event(DeviceEvent::Initialize);
        bridge.publish_source(Some(handle(0x40)), 2, 2);
        bridge.render_event(TEXTURE_UPDATE_EVENT);
        bridge.render_event(TEXTURE_UPDATE_EVENT);
        bridge.render_event(7);

        assert_eq!(
            bridge.stats(),
            FrameCounts {
                upscaled: 0,
                filled: 2,
                skipped: 2,
                failed: 0,
            }
        );
    }

    #[test]
    fn shutdown_tears_down_backend_and_registry() {
        let (bridge, recorder) = context(RendererKind::D3D12);
        bridge.process_device_event(DeviceEvent::Initialize);
        bridge.publish_source(Some(handle(0x40)), 2, 2);

        bridge.shutdown();

        assert!(!bridge.is_initialized());
        assert!(bridge.registry().current_snapshot().is_none());
        assert_eq!(recorder.lock().unwrap().dropped, vec![1]);

        bridge.process_device_event(DeviceEvent::Initialize);
        assert_eq!(bridge.generation(), 2);
    }
}
