//! Moves pixels between `image` buffers and GPU textures.
//!
//! Not used on the render path; harnesses and tests use these to feed the
//! upscaler and inspect its output.

use image::RgbaImage;
use wgpu::util::{DeviceExt, TextureDataOrder};

use crate::gpu::GpuDevice;
use crate::types::{aligned_row_pitch, is_rgba8_family, BYTES_PER_PIXEL};

#[derive(Debug, thiserror::Error)]
pub enum ConvertError {
    #[error("texture format {0:?} cannot be read back as RGBA8")]
    UnsupportedFormat(wgpu::TextureFormat),
    #[error("texture was not created with COPY_SRC usage")]
    NotCopySource,
    #[error("failed to wait for GPU readback: {0}")]
    Poll(#[from] wgpu::PollError),
    #[error("failed to map readback buffer: {0}")]
    Map(#[from] wgpu::BufferAsyncError),
    #[error("readback completion channel closed")]
    MapChannelClosed,
    #[error("readback produced {actual} bytes for a {width}x{height} image")]
    Size { width: u32, height: u32, actual: usize },
}

/// Uploads `image` into a new `Rgba8Unorm` texture usable as upscaler input.
pub fn texture_from_image(gpu: &GpuDevice, image: &RgbaImage, label: &str) -> wgpu::Texture {
    let (width, height) = image.dimensions();
    gpu.device.create_texture_with_data(
        &gpu.queue,
        &wgpu::TextureDescriptor {
            label: Some(label),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8Unorm,
            usage: wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::COPY_DST
                | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        },
        TextureDataOrder::LayerMajor,
        image.as_raw(),
    )
}

/// Copies `texture` back to the CPU, blocking until the GPU is done.
pub fn image_from_texture(gpu: &GpuDevice, texture: &wgpu::Texture) -> Result<RgbaImage, ConvertError> {
    let format = texture.format();
    if !is_rgba8_family(format) {
        return Err(ConvertError::UnsupportedFormat(format));
    }
    if !texture.usage().contains(wgpu::TextureUsages::COPY_SRC) {
        return Err(ConvertError::NotCopySource);
    }

    let (width, height) = (texture.width(), texture.height());
    let padded_bpr = aligned_row_pitch(width);
    let unpadded_bpr = width * BYTES_PER_PIXEL;

    let readback = gpu.device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("texture readback buffer"),
        size: u64::from(padded_bpr) * u64::from(height),
        usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
        mapped_at_creation: false,
    });

    let mut encoder = gpu
        .device
        .create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("texture readback encoder"),
        });
    encoder.copy_texture_to_buffer(
        texture.as_image_copy(),
        wgpu::TexelCopyBufferInfo {
            buffer: &readback,
            layout: wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(padded_bpr),
                rows_per_image: Some(height),
            },
        },
        wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        },
    );
    gpu.queue.submit(Some(encoder.finish()));

    let slice = readback.slice(..);
    let (sender, receiver) = crossbeam_channel::bounded(1);
    slice.map_async(wgpu::MapMode::Read, move |res| {
        sender.send(res).ok();
    });
    gpu.device.poll(wgpu::PollType::Wait)?;

    match receiver.recv() {
        Ok(Ok(())) => {}
        Ok(Err(err)) => return Err(err.into()),
        Err(_) => return Err(ConvertError::MapChannelClosed),
    }

    let mapped = slice.get_mapped_range();
    let mut rgba = vec![0u8; unpadded_bpr as usize * height as usize];
    for (dst, src) in rgba
        .chunks_exact_mut(unpadded_bpr as usize)
        .zip(mapped.chunks(padded_bpr as usize))
    {
        dst.copy_from_slice(&src[..unpadded_bpr as usize]);
    }
    drop(mapped);
    readback.unmap();

    if matches!(
        format,
        wgpu::TextureFormat::Bgra8Unorm | wgpu::TextureFormat::Bgra8UnormSrgb
    ) {
        for pixel in rgba.chunks_exact_mut(BYTES_PER_PIXEL as usize) {
            pixel.swap(0, 2);
        }
    }

    let actual = rgba.len();
    RgbaImage::from_raw(width, height, rgba).ok_or(ConvertError::Size {
        width,
        height,
        actual,
    })
}
