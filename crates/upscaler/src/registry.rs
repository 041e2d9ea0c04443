use std::sync::Arc;

use arc_swap::ArcSwapOption;

use crate::types::NativeTexture;

/// A texture handle together with the size the host reported for it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TextureBinding {
    pub handle: NativeTexture,
    pub width: u32,
    pub height: u32,
}

impl TextureBinding {
    /// Negative host sizes are treated as empty.
    pub fn new(handle: NativeTexture, width: i32, height: i32) -> Self {
        Self {
            handle,
            width: width.max(0) as u32,
            height: height.max(0) as u32,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// Everything the render thread needs for one frame, published as a unit so
/// it never observes a source from one call and a destination from another.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TextureSnapshot {
    pub source: TextureBinding,
    pub destination: Option<TextureBinding>,
}

/// Latest-wins handoff of texture registrations from the script thread to the
/// render thread. Publishing never blocks a reader.
#[derive(Default)]
pub struct TextureRegistry {
    current: ArcSwapOption<TextureSnapshot>,
}

impl TextureRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the registration. A null source clears it.
    pub fn publish(
        &self,
        source: Option<NativeTexture>,
        width: i32,
        height: i32,
        destination: Option<NativeTexture>,
        dest_width: i32,
        dest_height: i32,
    ) {
        let snapshot = source.map(|handle| TextureSnapshot {
            source: TextureBinding::new(handle, width, height),
            destination: destination
                .map(|handle| TextureBinding::new(handle, dest_width, dest_height)),
        });
        self.current.store(snapshot.map(Arc::new));
    }

    /// Registers a source without a destination.
    pub fn publish_source(&self, source: Option<NativeTexture>, width: i32, height: i32) {
        self.publish(source, width, height, None, 0, 0);
    }

    pub fn current_snapshot(&self) -> Option<Arc<TextureSnapshot>> {
        self.current.load_full()
    }

    pub fn clear(&self) {
        self.current.store(None);
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;

    fn handle(addr: usize) -> NativeTexture {
        NativeTexture::new(addr as *mut std::ffi::c_void).unwrap()
    }

    #[test]
    fn starts_empty() {
        assert!(TextureRegistry::new().current_snapshot().is_none());
    }

    #[test]
    fn latest_publish_wins() {
        let registry = TextureRegistry::new();
        registry.publish(Some(handle(0x10)), 64, 32, Some(handle(0x20)), 128, 64);
        registry.publish_source(Some(handle(0x30)), 8, 8);

        let snapshot = registry.current_snapshot().unwrap();
        assert_eq!(snapshot.source.handle, handle(0x30));
        assert_eq!((snapshot.source.width, snapshot.source.height), (8, 8));
        assert!(snapshot.destination.is_none());
    }

    #[test]
    fn null_source_clears_registration() {
        let registry = TextureRegistry::new();
        registry.publish_source(Some(handle(0x10)), 4, 4);
        registry.publish(None, 4, 4, Some(handle(0x20)), 8, 8);
        assert!(registry.current_snapshot().is_none());
    }

    #[test]
    fn negative_sizes_become_empty() {
        let registry = TextureRegistry::new();
        registry.publish(Some(handle(0x10)), -5, 12, Some(handle(0x20)), 3, -1);
        let snapshot = registry.current_snapshot().unwrap();
        assert_eq!(snapshot.source.width, 0);
        assert!(snapshot.source.is_empty());
        assert!(snapshot.destination.unwrap().is_empty());
    }

    #[test]
    fn readers_see_whole_snapshots() {
        let registry = Arc::new(TextureRegistry::new());
        let writer = {
            let registry = Arc::clone(&registry);
            thread::spawn(move || {
                for i in 1..=500usize {
                    let size = i as i32;
                    registry.publish(
                        Some(handle(i)),
                        size,
                        size,
                        Some(handle(i + 0x10000)),
                        size * 2,
                        size * 2,
                    );
                }
            })
        };

        for _ in 0..500 {
            if let Some(snapshot) = registry.current_snapshot() {
                let dest = snapshot.destination.unwrap();
                let id = snapshot.source.handle.as_ptr() as usize;
                assert_eq!(snapshot.source.width as usize, id);
                assert_eq!(dest.handle.as_ptr() as usize, id + 0x10000);
                assert_eq!(dest.width, snapshot.source.width * 2);
            }
        }
        writer.join().unwrap();
    }
}
