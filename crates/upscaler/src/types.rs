use std::ffi::c_void;
use std::ptr::NonNull;

/// Graphics API family reported by the host when its device comes up.
///
/// The numeric values are the ones the host hands across the plugin ABI.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RendererKind {
    D3D11,
    Null,
    OpenGLES30,
    Metal,
    OpenGLCore,
    D3D12,
    Vulkan,
    Unknown(i32),
}

impl RendererKind {
    pub fn from_raw(raw: i32) -> Self {
        match raw {
            2 => Self::D3D11,
            4 => Self::Null,
            11 => Self::OpenGLES30,
            16 => Self::Metal,
            17 => Self::OpenGLCore,
            18 => Self::D3D12,
            21 => Self::Vulkan,
            other => Self::Unknown(other),
        }
    }

    pub fn as_raw(self) -> i32 {
        match self {
            Self::D3D11 => 2,
            Self::Null => 4,
            Self::OpenGLES30 => 11,
            Self::Metal => 16,
            Self::OpenGLCore => 17,
            Self::D3D12 => 18,
            Self::Vulkan => 21,
            Self::Unknown(raw) => raw,
        }
    }
}

impl std::fmt::Display for RendererKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RendererKind::D3D11 => f.write_str("d3d11"),
            RendererKind::Null => f.write_str("null"),
            RendererKind::OpenGLES30 => f.write_str("gles3"),
            RendererKind::Metal => f.write_str("metal"),
            RendererKind::OpenGLCore => f.write_str("glcore"),
            RendererKind::D3D12 => f.write_str("d3d12"),
            RendererKind::Vulkan => f.write_str("vulkan"),
            RendererKind::Unknown(raw) => write!(f, "unknown({raw})"),
        }
    }
}

/// Lifecycle notification the host delivers about its GPU device.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DeviceEvent {
    Initialize,
    Shutdown,
    BeforeReset,
    AfterReset,
}

impl DeviceEvent {
    pub fn from_raw(raw: i32) -> Option<Self> {
        match raw {
            0 => Some(Self::Initialize),
            1 => Some(Self::Shutdown),
            2 => Some(Self::BeforeReset),
            3 => Some(Self::AfterReset),
            _ => None,
        }
    }

    pub fn as_raw(self) -> i32 {
        match self {
            Self::Initialize => 0,
            Self::Shutdown => 1,
            Self::BeforeReset => 2,
            Self::AfterReset => 3,
        }
    }
}

/// Opaque, non-null pointer to a texture owned by the host.
///
/// The bridge never frees what it points at. For backends that expose a
/// [`GpuDevice`](crate::GpuDevice) the pointee is a `wgpu::Texture`; it is only
/// guaranteed to be alive during the render-thread callback that follows the
/// registration.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct NativeTexture(NonNull<c_void>);

// The handle is an address; dereferencing it is gated behind `unsafe` and the
// render-thread contract.
unsafe impl Send for NativeTexture {}
unsafe impl Sync for NativeTexture {}

impl NativeTexture {
    /// Wraps a raw host pointer, mapping null to `None`.
    pub fn new(raw: *mut c_void) -> Option<Self> {
        NonNull::new(raw).map(Self)
    }

    /// Produces the handle a Rust host passes for one of its own textures.
    pub fn from_wgpu(texture: &wgpu::Texture) -> Self {
        Self(NonNull::from(texture).cast())
    }

    pub fn as_ptr(self) -> *mut c_void {
        self.0.as_ptr()
    }
}

/// Colour working space used while the scaler reconstructs pixels.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum ColorProcessingMode {
    /// Filter gamma-encoded values, weighting error the way vision does.
    #[default]
    Perceptual,
    /// Filter stored values as linear light.
    Linear,
    /// Wrap the filter in a reversible tonemap for values above one.
    Hdr,
}

/// Bytes per pixel for the only layout the CPU write path understands.
pub const BYTES_PER_PIXEL: u32 = 4;

/// True for the 8-bit, four-channel formats the CPU paths can address directly.
pub fn is_rgba8_family(format: wgpu::TextureFormat) -> bool {
    matches!(
        format,
        wgpu::TextureFormat::Rgba8Unorm
            | wgpu::TextureFormat::Rgba8UnormSrgb
            | wgpu::TextureFormat::Bgra8Unorm
            | wgpu::TextureFormat::Bgra8UnormSrgb
    )
}

/// Rounds a tightly packed row up to the copy alignment wgpu requires.
pub fn aligned_row_pitch(width: u32) -> u32 {
    let unpadded = width * BYTES_PER_PIXEL;
    let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
    unpadded.div_ceil(align) * align
}
