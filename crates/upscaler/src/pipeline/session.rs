use bytemuck::{Pod, Zeroable};

use crate::types::ColorProcessingMode;

/// Identity of an upscale session. Any change forces a rebuild.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SessionKey {
    pub input_width: u32,
    pub input_height: u32,
    pub input_format: wgpu::TextureFormat,
    pub output_width: u32,
    pub output_height: u32,
    pub output_format: wgpu::TextureFormat,
}

impl SessionKey {
    /// Output is `floor(input * scale)` per axis, never smaller than one texel.
    pub fn for_input(width: u32, height: u32, format: wgpu::TextureFormat, scale: f32) -> Self {
        Self {
            input_width: width,
            input_height: height,
            input_format: format,
            output_width: scaled_extent(width, scale),
            output_height: scaled_extent(height, scale),
            output_format: format,
        }
    }
}

/// Multiplies in `f32` like the host does when it sizes the destination, so
/// `1000 * 1.3` lands on 1300 rather than one texel short.
fn scaled_extent(extent: u32, scale: f32) -> u32 {
    ((extent as f32 * scale).floor() as u32).max(1)
}

/// Public view of the configured scaler.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ScalerDescriptor {
    pub input_width: u32,
    pub input_height: u32,
    pub output_width: u32,
    pub output_height: u32,
    pub color_texture_format: wgpu::TextureFormat,
    pub output_texture_format: wgpu::TextureFormat,
    pub color_processing: ColorProcessingMode,
}

impl ScalerDescriptor {
    pub(crate) fn new(key: &SessionKey, color_processing: ColorProcessingMode) -> Self {
        Self {
            input_width: key.input_width,
            input_height: key.input_height,
            output_width: key.output_width,
            output_height: key.output_height,
            color_texture_format: key.input_format,
            output_texture_format: key.output_format,
            color_processing,
        }
    }
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub(crate) struct ScalerUniforms {
    pub input_size: [f32; 2],
    pub output_size: [f32; 2],
    pub transfer: u32,
    pub _padding: [u32; 3],
}

pub(crate) const TRANSFER_NONE: u32 = 0;
pub(crate) const TRANSFER_GAMMA: u32 = 1;
pub(crate) const TRANSFER_TONEMAP: u32 = 3;

impl ScalerUniforms {
    pub fn new(key: &SessionKey, mode: ColorProcessingMode) -> Self {
        Self {
            input_size: [key.input_width as f32, key.input_height as f32],
            output_size: [key.output_width as f32, key.output_height as f32],
            transfer: transfer_for(mode, key.input_format),
            _padding: [0; 3],
        }
    }
}

/// Working space for the filter. sRGB views decode on load, so perceptual
/// filtering re-encodes them; other formats already hold encoded values.
pub(crate) fn transfer_for(mode: ColorProcessingMode, format: wgpu::TextureFormat) -> u32 {
    match mode {
        ColorProcessingMode::Perceptual if format.is_srgb() => TRANSFER_GAMMA,
        ColorProcessingMode::Perceptual | ColorProcessingMode::Linear => TRANSFER_NONE,
        ColorProcessingMode::Hdr => TRANSFER_TONEMAP,
    }
}

/// GPU objects tied to one [`SessionKey`].
pub(crate) struct UpscaleSession {
    pub key: SessionKey,
    pub output: wgpu::Texture,
    pub output_view: wgpu::TextureView,
    pub uniforms: wgpu::Buffer,
    pub pipeline: wgpu::RenderPipeline,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_extent_floors_scaled_input() {
        let key = SessionKey::for_input(64, 48, wgpu::TextureFormat::Rgba8Unorm, 1.5);
        assert_eq!((key.output_width, key.output_height), (96, 72));

        let key = SessionKey::for_input(101, 33, wgpu::TextureFormat::Rgba8Unorm, 2.0);
        assert_eq!((key.output_width, key.output_height), (202, 66));

        let key = SessionKey::for_input(5, 3, wgpu::TextureFormat::Rgba8Unorm, 0.5);
        assert_eq!((key.output_width, key.output_height), (2, 1));

        let key = SessionKey::for_input(1000, 1000, wgpu::TextureFormat::Rgba8Unorm, 1.3);
        assert_eq!((key.output_width, key.output_height), (1300, 1300));

        let key = SessionKey::for_input(10, 10, wgpu::TextureFormat::Rgba8Unorm, 0.7);
        assert_eq!((key.output_width, key.output_height), (7, 7));
    }

    #[test]
    fn output_extent_never_collapses_to_zero() {
        let key = SessionKey::for_input(3, 3, wgpu::TextureFormat::Rgba8Unorm, 0.01);
        assert_eq!((key.output_width, key.output_height), (1, 1));
    }

    #[test]
    fn keys_differ_by_input_size() {
        let a = SessionKey::for_input(64, 64, wgpu::TextureFormat::Rgba8Unorm, 2.0);
        let b = SessionKey::for_input(32, 64, wgpu::TextureFormat::Rgba8Unorm, 2.0);
        assert_ne!(a, b);
    }

    #[test]
    fn keys_differ_by_format() {
        let a = SessionKey::for_input(64, 64, wgpu::TextureFormat::Rgba8Unorm, 2.0);
        let b = SessionKey::for_input(64, 64, wgpu::TextureFormat::Rgba8UnormSrgb, 2.0);
        assert_ne!(a, b);
        assert_eq!(b.output_format, wgpu::TextureFormat::Rgba8UnormSrgb);
    }

    #[test]
    fn uniforms_match_wgsl_layout() {
        assert_eq!(std::mem::size_of::<ScalerUniforms>(), 32);
    }

    #[test]
    fn perceptual_reencodes_only_srgb_formats() {
        assert_eq!(
            transfer_for(ColorProcessingMode::Perceptual, wgpu::TextureFormat::Rgba8UnormSrgb),
            TRANSFER_GAMMA
        );
        assert_eq!(
            transfer_for(ColorProcessingMode::Perceptual, wgpu::TextureFormat::Rgba8Unorm),
            TRANSFER_NONE
        );
        assert_eq!(
            transfer_for(ColorProcessingMode::Linear, wgpu::TextureFormat::Bgra8UnormSrgb),
            TRANSFER_NONE
        );
        assert_eq!(
            transfer_for(ColorProcessingMode::Hdr, wgpu::TextureFormat::Rgba16Float),
            TRANSFER_TONEMAP
        );
    }
}
