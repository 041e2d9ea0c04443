//! Spatial upscaling of a colour texture into a larger render target.
//!
//! The upscaler owns at most one [`session`] at a time. A session is built on
//! the first call and reused for as long as the input size, format and scale
//! stay the same; any change rebuilds it. Render pipelines are cached per
//! output format so a rebuild at a new size does not recompile the shader.

mod session;

use std::collections::HashMap;

use tracing::debug;
use wgpu::util::DeviceExt;

use crate::gpu::GpuDevice;
use crate::types::ColorProcessingMode;

pub use session::{ScalerDescriptor, SessionKey};
use session::{ScalerUniforms, UpscaleSession};

#[derive(Debug, thiserror::Error)]
pub enum UpscaleError {
    #[error("scale must be a positive finite number, got {0}")]
    InvalidScale(f32),
    #[error("unsupported input texture: {0}")]
    UnsupportedInput(&'static str),
    #[error("texture format {0:?} cannot be upscaled")]
    UnsupportedFormat(wgpu::TextureFormat),
    #[error("output {width}x{height} exceeds the device limit of {limit}")]
    OutputTooLarge { width: u32, height: u32, limit: u32 },
    #[error("out of GPU memory while creating the {0}")]
    OutOfMemory(&'static str),
    #[error("failed to create the {what}: {message}")]
    Allocation { what: &'static str, message: String },
}

pub struct SpatialUpscaler {
    gpu: GpuDevice,
    mode: ColorProcessingMode,
    bind_group_layout: wgpu::BindGroupLayout,
    pipeline_layout: wgpu::PipelineLayout,
    shader: wgpu::ShaderModule,
    pipelines: HashMap<wgpu::TextureFormat, wgpu::RenderPipeline>,
    session: Option<UpscaleSession>,
    sessions_built: u64,
}

impl SpatialUpscaler {
    pub fn new(gpu: GpuDevice, mode: ColorProcessingMode) -> Self {
        let device = &gpu.device;
        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("spatial upscale layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: false },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
            ],
        });
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("spatial upscale pipeline layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("spatial upscale shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("spatial.wgsl").into()),
        });

        Self {
            gpu,
            mode,
            bind_group_layout,
            pipeline_layout,
            shader,
            pipelines: HashMap::new(),
            session: None,
            sessions_built: 0,
        }
    }

    pub fn color_processing(&self) -> ColorProcessingMode {
        self.mode
    }

    /// Descriptor of the live session, if one has been built.
    pub fn descriptor(&self) -> Option<ScalerDescriptor> {
        self.session
            .as_ref()
            .map(|session| ScalerDescriptor::new(&session.key, self.mode))
    }

    /// Number of sessions created over the upscaler's lifetime.
    pub fn sessions_built(&self) -> u64 {
        self.sessions_built
    }

    /// Drops the session; the next call rebuilds it.
    pub fn reset(&mut self) {
        self.session = None;
    }

    /// Encodes an upscale of `input` into `encoder` and returns the output
    /// texture. Nothing is submitted; the output is valid once the caller has
    /// submitted the encoder and the work has completed.
    pub fn upscale(
        &mut self,
        encoder: &mut wgpu::CommandEncoder,
        input: &wgpu::Texture,
        scale: f32,
    ) -> Result<&wgpu::Texture, UpscaleError> {
        let key = self.session_key(input, scale)?;

        let session = match self.session.take() {
            Some(session) if session.key == key => session,
            previous => {
                if let Some(previous) = previous {
                    debug!(from = ?previous.key, to = ?key, "upscale session invalidated");
                }
                self.build_session(key)?
            }
        };
        let session = self.session.insert(session);

        let input_view = input.create_view(&wgpu::TextureViewDescriptor::default());
        let bind_group = self
            .gpu
            .device
            .create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("spatial upscale bind group"),
                layout: &self.bind_group_layout,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: session.uniforms.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: wgpu::BindingResource::TextureView(&input_view),
                    },
                ],
            });

        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("spatial upscale pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &session.output_view,
                    depth_slice: None,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            pass.set_pipeline(&session.pipeline);
            pass.set_bind_group(0, &bind_group, &[]);
            pass.draw(0..3, 0..1);
        }

        Ok(&session.output)
    }

    fn session_key(&self, input: &wgpu::Texture, scale: f32) -> Result<SessionKey, UpscaleError> {
        if !scale.is_finite() || scale <= 0.0 {
            return Err(UpscaleError::InvalidScale(scale));
        }
        if input.dimension() != wgpu::TextureDimension::D2 || input.depth_or_array_layers() != 1 {
            return Err(UpscaleError::UnsupportedInput("texture must be a single 2D layer"));
        }
        if input.sample_count() != 1 {
            return Err(UpscaleError::UnsupportedInput("multisampled textures cannot be read"));
        }
        if !input.usage().contains(wgpu::TextureUsages::TEXTURE_BINDING) {
            return Err(UpscaleError::UnsupportedInput(
                "texture was not created with TEXTURE_BINDING usage",
            ));
        }

        let format = input.format();
        let features = self.gpu.device.features();
        let sampleable = matches!(
            format.sample_type(None, Some(features)),
            Some(wgpu::TextureSampleType::Float { .. })
        );
        let renderable = format
            .guaranteed_format_features(features)
            .allowed_usages
            .contains(wgpu::TextureUsages::RENDER_ATTACHMENT);
        if !sampleable || !renderable {
            return Err(UpscaleError::UnsupportedFormat(format));
        }

        let key = SessionKey::for_input(input.width(), input.height(), format, scale);
        let limit = self.gpu.device.limits().max_texture_dimension_2d;
        if key.output_width > limit || key.output_height > limit {
            return Err(UpscaleError::OutputTooLarge {
                width: key.output_width,
                height: key.output_height,
                limit,
            });
        }
        Ok(key)
    }

    fn build_session(&mut self, key: SessionKey) -> Result<UpscaleSession, UpscaleError> {
        let pipeline = self.pipeline_for(key.output_format)?;
        let device = &self.gpu.device;

        let output = scoped(device, "output texture", |device| {
            device.create_texture(&wgpu::TextureDescriptor {
                label: Some("spatial upscale output"),
                size: wgpu::Extent3d {
                    width: key.output_width,
                    height: key.output_height,
                    depth_or_array_layers: 1,
                },
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: key.output_format,
                usage: wgpu::TextureUsages::RENDER_ATTACHMENT
                    | wgpu::TextureUsages::TEXTURE_BINDING
                    | wgpu::TextureUsages::COPY_SRC,
                view_formats: &[],
            })
        })?;
        let output_view = output.create_view(&wgpu::TextureViewDescriptor::default());

        let uniforms = ScalerUniforms::new(&key, self.mode);
        let uniforms = scoped(device, "uniform buffer", |device| {
            device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("spatial upscale uniforms"),
                contents: bytemuck::bytes_of(&uniforms),
                usage: wgpu::BufferUsages::UNIFORM,
            })
        })?;

        self.sessions_built += 1;
        debug!(
            input = ?(key.input_width, key.input_height),
            output = ?(key.output_width, key.output_height),
            format = ?key.output_format,
            mode = ?self.mode,
            "built upscale session"
        );

        Ok(UpscaleSession {
            key,
            output,
            output_view,
            uniforms,
            pipeline,
        })
    }

    fn pipeline_for(
        &mut self,
        format: wgpu::TextureFormat,
    ) -> Result<wgpu::RenderPipeline, UpscaleError> {
        if let Some(pipeline) = self.pipelines.get(&format) {
            return Ok(pipeline.clone());
        }

        let pipeline = scoped(&self.gpu.device, "render pipeline", |device| {
            device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some("spatial upscale pipeline"),
                layout: Some(&self.pipeline_layout),
                vertex: wgpu::VertexState {
                    module: &self.shader,
                    entry_point: Some("vs_main"),
                    buffers: &[],
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                },
                primitive: wgpu::PrimitiveState {
                    topology: wgpu::PrimitiveTopology::TriangleList,
                    strip_index_format: None,
                    front_face: wgpu::FrontFace::Ccw,
                    cull_mode: None,
                    polygon_mode: wgpu::PolygonMode::Fill,
                    unclipped_depth: false,
                    conservative: false,
                },
                depth_stencil: None,
                multisample: wgpu::MultisampleState::default(),
                fragment: Some(wgpu::FragmentState {
                    module: &self.shader,
                    entry_point: Some("fs_main"),
                    targets: &[Some(wgpu::ColorTargetState {
                        format,
                        blend: None,
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                }),
                multiview: None,
                cache: None,
            })
        })?;

        self.pipelines.insert(format, pipeline.clone());
        Ok(pipeline)
    }
}

/// Runs `build` inside out-of-memory and validation error scopes.
fn scoped<T>(
    device: &wgpu::Device,
    what: &'static str,
    build: impl FnOnce(&wgpu::Device) -> T,
) -> Result<T, UpscaleError> {
    device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
    device.push_error_scope(wgpu::ErrorFilter::Validation);
    let value = build(device);
    let validation = pollster::block_on(device.pop_error_scope());
    let out_of_memory = pollster::block_on(device.pop_error_scope());

    if out_of_memory.is_some() {
        return Err(UpscaleError::OutOfMemory(what));
    }
    if let Some(err) = validation {
        return Err(UpscaleError::Allocation {
            what,
            message: err.to_string(),
        });
    }
    Ok(value)
}
