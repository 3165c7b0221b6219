use std::sync::{Arc, Mutex};

use anyhow::Context;

use crate::error::{EngineError, Result};
use crate::handle::HandleTable;
use crate::paint::Color;

use super::surface::{create_depth_view, DEPTH_FORMAT};
use super::types::{
    BatchDraw, BufferDesc, BufferId, BufferUsage, ImageDesc, ImageId, PassSettings, ProgramId,
    ShaderStage, StageId, VertexFormatDesc, VertexFormatId, VertexLayout,
};
use super::{Gpu, GpuDevice, GpuFrame, SurfaceErrorAction};

const SPRITE_SHADER: &str = include_str!("shaders/sprite.wgsl");

const SPRITE_VERTEX_ATTRS: [wgpu::VertexAttribute; 2] =
    wgpu::vertex_attr_array![0 => Float32x3, 1 => Float32x2];

const SPRITE_INSTANCE_ATTRS: [wgpu::VertexAttribute; 4] = wgpu::vertex_attr_array![
    2 => Float32x4,
    3 => Float32x4,
    4 => Float32x4,
    5 => Float32x4
];

fn vertex_buffer_layouts(layout: VertexLayout) -> [wgpu::VertexBufferLayout<'static>; 2] {
    match layout {
        VertexLayout::Sprite => [
            wgpu::VertexBufferLayout {
                array_stride: layout.vertex_stride(),
                step_mode: wgpu::VertexStepMode::Vertex,
                attributes: &SPRITE_VERTEX_ATTRS,
            },
            wgpu::VertexBufferLayout {
                array_stride: layout.instance_stride(),
                step_mode: wgpu::VertexStepMode::Instance,
                attributes: &SPRITE_INSTANCE_ATTRS,
            },
        ],
    }
}

fn buffer_usages(usage: BufferUsage) -> wgpu::BufferUsages {
    let copy = wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::COPY_SRC;
    match usage {
        BufferUsage::Vertex | BufferUsage::Instance => wgpu::BufferUsages::VERTEX | copy,
        BufferUsage::Index => wgpu::BufferUsages::INDEX | copy,
        BufferUsage::Indirect => wgpu::BufferUsages::INDIRECT | copy,
    }
}

struct GpuTexture {
    _texture: wgpu::Texture,
    bind_group: wgpu::BindGroup,
}

struct CompiledStage {
    stage: ShaderStage,
    module: wgpu::ShaderModule,
}

struct LinkedProgram {
    pipeline: wgpu::RenderPipeline,
    depth_pipeline: wgpu::RenderPipeline,
}

/// `GpuDevice` backed by wgpu and a window surface.
///
/// Every program shares one pipeline layout:
/// - group 0: camera uniform (`mat4x4<f32>` view-projection)
/// - group 1: RGBA texture + filtering sampler
///
/// Validation errors raised by wgpu are collected in an error sink and turned
/// into creation failures for the call that caused them.
pub struct WgpuDevice {
    gpu: Gpu,
    errors: Arc<Mutex<Vec<String>>>,
    multi_draw: bool,

    camera_buffer: wgpu::Buffer,
    camera_group: wgpu::BindGroup,
    image_layout: wgpu::BindGroupLayout,
    pipeline_layout: wgpu::PipelineLayout,
    sampler: wgpu::Sampler,
    depth_view: wgpu::TextureView,

    buffers: HandleTable<wgpu::Buffer>,
    formats: HandleTable<VertexFormatDesc>,
    images: HandleTable<GpuTexture>,
    stages: HandleTable<CompiledStage>,
    programs: HandleTable<LinkedProgram>,

    default_image: Option<ImageId>,
    default_program: Option<ProgramId>,

    frame: Option<GpuFrame>,
}

impl WgpuDevice {
    /// Wraps a GPU context and creates the shared layouts plus the built-in
    /// white image and sprite program.
    pub fn new(gpu: Gpu) -> anyhow::Result<Self> {
        let errors: Arc<Mutex<Vec<String>>> = Arc::default();
        let sink = Arc::clone(&errors);
        gpu.device().on_uncaptured_error(Arc::new(move |e: wgpu::Error| {
            log::error!("wgpu error: {e}");
            if let Ok(mut errors) = sink.lock() {
                errors.push(e.to_string());
            }
        }));

        let multi_draw = gpu.features().contains(wgpu::Features::INDIRECT_FIRST_INSTANCE);
        if !multi_draw {
            log::warn!("INDIRECT_FIRST_INSTANCE unavailable; batches draw one entity per call");
        }

        let device = gpu.device();

        let camera_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("kestrel camera bgl"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: wgpu::BufferSize::new(64),
                },
                count: None,
            }],
        });

        let image_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("kestrel image bgl"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("kestrel pipeline layout"),
            bind_group_layouts: &[&camera_layout, &image_layout],
            immediate_size: 0,
        });

        let camera_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("kestrel camera ubo"),
            size: 64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let camera_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("kestrel camera bind group"),
            layout: &camera_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: camera_buffer.as_entire_binding(),
            }],
        });

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("kestrel sprite sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Nearest,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::MipmapFilterMode::Nearest,
            ..Default::default()
        });

        let (width, height) = gpu.size();
        let depth_view = create_depth_view(device, width, height);

        let mut this = Self {
            gpu,
            errors,
            multi_draw,
            camera_buffer,
            camera_group,
            image_layout,
            pipeline_layout,
            sampler,
            depth_view,
            buffers: HandleTable::new("buffer"),
            formats: HandleTable::new("vertex format"),
            images: HandleTable::new("image"),
            stages: HandleTable::new("shader stage"),
            programs: HandleTable::new("program"),
            default_image: None,
            default_program: None,
            frame: None,
        };

        let white = [255u8; 4];
        let image = this
            .create_image(&ImageDesc { width: 1, height: 1, pixels: &white })
            .context("failed to create default image")?;
        this.default_image = Some(image);

        let vs = this.compile_stage(ShaderStage::Vertex, SPRITE_SHADER)?;
        let fs = this.compile_stage(ShaderStage::Fragment, SPRITE_SHADER)?;
        let program = this.link_program(vs, fs)?;
        this.destroy_stage(vs);
        this.destroy_stage(fs);
        this.default_program = Some(program);

        log::info!("wgpu device ready ({:?})", this.gpu.surface_format());
        Ok(this)
    }

    pub fn gpu(&self) -> &Gpu {
        &self.gpu
    }

    pub fn set_vsync(&mut self, vsync: bool) {
        self.gpu.set_vsync(vsync);
    }

    /// Takes every error reported by wgpu since the last call.
    fn take_errors(&self) -> Vec<String> {
        match self.errors.lock() {
            Ok(mut errors) => std::mem::take(&mut *errors),
            Err(_) => Vec::new(),
        }
    }

    fn create_pipeline(
        &self,
        vs: &wgpu::ShaderModule,
        fs: &wgpu::ShaderModule,
        depth_test: bool,
    ) -> wgpu::RenderPipeline {
        let buffers = vertex_buffer_layouts(VertexLayout::Sprite);

        self.gpu.device().create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some(if depth_test { "kestrel depth pipeline" } else { "kestrel pipeline" }),
            layout: Some(&self.pipeline_layout),

            vertex: wgpu::VertexState {
                module: vs,
                entry_point: Some(ShaderStage::Vertex.entry_point()),
                compilation_options: Default::default(),
                buffers: &buffers,
            },

            fragment: Some(wgpu::FragmentState {
                module: fs,
                entry_point: Some(ShaderStage::Fragment.entry_point()),
                compilation_options: Default::default(),
                targets: &[Some(wgpu::ColorTargetState {
                    format: self.gpu.surface_format(),
                    blend: Some(wgpu::BlendState::ALPHA_BLENDING),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
            }),

            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                strip_index_format: None,
                front_face: wgpu::FrontFace::Ccw,
                cull_mode: None,
                polygon_mode: wgpu::PolygonMode::Fill,
                unclipped_depth: false,
                conservative: false,
            },

            depth_stencil: Some(wgpu::DepthStencilState {
                format: DEPTH_FORMAT,
                depth_write_enabled: depth_test,
                depth_compare: if depth_test {
                    wgpu::CompareFunction::Less
                } else {
                    wgpu::CompareFunction::Always
                },
                stencil: wgpu::StencilState::default(),
                bias: wgpu::DepthBiasState::default(),
            }),
            multisample: wgpu::MultisampleState::default(),
            multiview_mask: None,
            cache: None,
        })
    }
}

impl GpuDevice for WgpuDevice {
    fn create_buffer(&mut self, desc: &BufferDesc) -> Option<BufferId> {
        let buffer = self.gpu.device().create_buffer(&wgpu::BufferDescriptor {
            label: Some(desc.usage.label()),
            size: desc.size,
            usage: buffer_usages(desc.usage),
            mapped_at_creation: false,
        });

        let errors = self.take_errors();
        if !errors.is_empty() {
            log::error!("buffer creation failed: {}", errors.join("; "));
            return None;
        }
        self.buffers.insert(buffer).ok().map(|h| h.cast())
    }

    fn write_buffer(&mut self, buffer: BufferId, offset: u64, data: &[u8]) {
        match self.buffers.get(buffer.cast()) {
            Ok(b) => self.gpu.queue().write_buffer(b, offset, data),
            Err(e) => log::warn!("write_buffer: {e}"),
        }
    }

    fn copy_buffer(&mut self, src: BufferId, dst: BufferId, size: u64) {
        let (Ok(src), Ok(dst)) = (self.buffers.get(src.cast()), self.buffers.get(dst.cast())) else {
            log::warn!("copy_buffer: unknown buffer");
            return;
        };

        let mut encoder = self
            .gpu
            .device()
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("kestrel copy encoder"),
            });
        encoder.copy_buffer_to_buffer(src, 0, dst, 0, size);
        self.gpu.queue().submit(std::iter::once(encoder.finish()));
    }

    fn destroy_buffer(&mut self, buffer: BufferId) {
        if let Err(e) = self.buffers.remove(buffer.cast()) {
            log::warn!("destroy_buffer: {e}");
        }
    }

    fn create_vertex_format(&mut self, desc: &VertexFormatDesc) -> Option<VertexFormatId> {
        let bound = [desc.vertices, desc.instances, desc.indices];
        if bound.iter().any(|b| !self.buffers.contains(b.cast())) {
            return None;
        }
        self.formats.insert(*desc).ok().map(|h| h.cast())
    }

    fn destroy_vertex_format(&mut self, format: VertexFormatId) {
        if let Err(e) = self.formats.remove(format.cast()) {
            log::warn!("destroy_vertex_format: {e}");
        }
    }

    fn create_image(&mut self, desc: &ImageDesc<'_>) -> Option<ImageId> {
        let expected = desc.width as usize * desc.height as usize * 4;
        if desc.width == 0 || desc.height == 0 || desc.pixels.len() != expected {
            return None;
        }

        let device = self.gpu.device();
        let size = wgpu::Extent3d {
            width: desc.width,
            height: desc.height,
            depth_or_array_layers: 1,
        };

        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("kestrel texture"),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8UnormSrgb,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });

        self.gpu.queue().write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            desc.pixels,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(4 * desc.width),
                rows_per_image: Some(desc.height),
            },
            size,
        );

        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("kestrel texture bind group"),
            layout: &self.image_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(&self.sampler),
                },
            ],
        });

        let errors = self.take_errors();
        if !errors.is_empty() {
            log::error!("image creation failed: {}", errors.join("; "));
            return None;
        }

        let image = GpuTexture {
            _texture: texture,
            bind_group,
        };
        self.images.insert(image).ok().map(|h| h.cast())
    }

    fn destroy_image(&mut self, image: ImageId) {
        if let Err(e) = self.images.remove(image.cast()) {
            log::warn!("destroy_image: {e}");
        }
    }

    fn compile_stage(&mut self, stage: ShaderStage, source: &str) -> Result<StageId> {
        let entry = stage.entry_point();
        if !source.contains(&format!("fn {entry}")) {
            return Err(EngineError::ShaderCompile {
                stage,
                log: format!("missing entry point `{entry}`"),
            });
        }

        self.take_errors();
        let module = self
            .gpu
            .device()
            .create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(match stage {
                    ShaderStage::Vertex => "kestrel vertex stage",
                    ShaderStage::Fragment => "kestrel fragment stage",
                }),
                source: wgpu::ShaderSource::Wgsl(source.into()),
            });

        let info = pollster::block_on(module.get_compilation_info());
        let mut log: Vec<String> = info
            .messages
            .iter()
            .filter(|m| matches!(m.message_type, wgpu::CompilationMessageType::Error))
            .map(|m| m.message.clone())
            .collect();
        log.extend(self.take_errors());

        if !log.is_empty() {
            return Err(EngineError::ShaderCompile {
                stage,
                log: log.join("\n"),
            });
        }

        let id = self.stages.insert(CompiledStage { stage, module })?;
        Ok(id.cast())
    }

    fn destroy_stage(&mut self, stage: StageId) {
        if let Err(e) = self.stages.remove(stage.cast()) {
            log::warn!("destroy_stage: {e}");
        }
    }

    fn link_program(&mut self, vertex: StageId, fragment: StageId) -> Result<ProgramId> {
        let vs = self.stages.get(vertex.cast())?;
        let fs = self.stages.get(fragment.cast())?;
        if vs.stage != ShaderStage::Vertex || fs.stage != ShaderStage::Fragment {
            return Err(EngineError::ShaderLink(format!(
                "stages {vertex} and {fragment} are not a vertex/fragment pair"
            )));
        }

        self.take_errors();
        let pipeline = self.create_pipeline(&vs.module, &fs.module, false);
        let depth_pipeline = self.create_pipeline(&vs.module, &fs.module, true);

        let errors = self.take_errors();
        if !errors.is_empty() {
            return Err(EngineError::ShaderLink(errors.join("\n")));
        }

        let id = self.programs.insert(LinkedProgram {
            pipeline,
            depth_pipeline,
        })?;
        Ok(id.cast())
    }

    fn destroy_program(&mut self, program: ProgramId) {
        if let Err(e) = self.programs.remove(program.cast()) {
            log::warn!("destroy_program: {e}");
        }
    }

    fn begin_frame(&mut self, clear: Color) {
        if self.frame.is_some() {
            self.end_frame();
        }

        let mut frame = match self.gpu.begin_frame() {
            Ok(frame) => frame,
            Err(err) => {
                match self.gpu.handle_surface_error(err) {
                    SurfaceErrorAction::Fatal => log::error!("surface lost: out of memory"),
                    action => log::debug!("frame skipped: {action:?}"),
                }
                return;
            }
        };

        let clear_pass = frame.encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("kestrel clear pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: &frame.view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(clear.into()),
                    store: wgpu::StoreOp::Store,
                },
                depth_slice: None,
            })],
            depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                view: &self.depth_view,
                depth_ops: Some(wgpu::Operations {
                    load: wgpu::LoadOp::Clear(1.0),
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops: None,
            }),
            timestamp_writes: None,
            occlusion_query_set: None,
            multiview_mask: None,
        });
        drop(clear_pass);

        self.frame = Some(frame);
    }

    fn draw(&mut self, pass: &PassSettings, draws: &[BatchDraw<'_>]) {
        let Some(frame) = self.frame.as_mut() else { return };

        let (width, height) = self.gpu.size();
        let (x, y, w, h) = pass.viewport.to_pixels(width, height);
        if w < 1.0 || h < 1.0 {
            return;
        }

        self.gpu.queue().write_buffer(
            &self.camera_buffer,
            0,
            bytemuck::cast_slice(&pass.view_projection.to_cols_array()),
        );

        let mut rpass = frame.encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("kestrel batch pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: &frame.view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Load,
                    store: wgpu::StoreOp::Store,
                },
                depth_slice: None,
            })],
            depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                view: &self.depth_view,
                depth_ops: Some(wgpu::Operations {
                    load: wgpu::LoadOp::Load,
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops: None,
            }),
            timestamp_writes: None,
            occlusion_query_set: None,
            multiview_mask: None,
        });

        rpass.set_viewport(x, y, w, h, 0.0, 1.0);
        rpass.set_bind_group(0, &self.camera_group, &[]);

        for draw in draws {
            let Some(program) = draw.program.or(self.default_program) else { continue };
            let Some(image) = draw.image.or(self.default_image) else { continue };

            let (Ok(program), Ok(image), Ok(format)) = (
                self.programs.get(program.cast()),
                self.images.get(image.cast()),
                self.formats.get(draw.format.cast()),
            ) else {
                log::warn!("draw skipped: stale program, image or vertex format");
                continue;
            };

            let (Ok(vertices), Ok(instances), Ok(indices), Ok(indirect)) = (
                self.buffers.get(format.vertices.cast()),
                self.buffers.get(format.instances.cast()),
                self.buffers.get(format.indices.cast()),
                self.buffers.get(draw.indirect.cast()),
            ) else {
                log::warn!("draw skipped: stale buffer");
                continue;
            };

            rpass.set_pipeline(if pass.depth_test {
                &program.depth_pipeline
            } else {
                &program.pipeline
            });
            rpass.set_bind_group(1, &image.bind_group, &[]);
            rpass.set_vertex_buffer(0, vertices.slice(..));
            rpass.set_vertex_buffer(1, instances.slice(..));
            rpass.set_index_buffer(indices.slice(..), wgpu::IndexFormat::Uint32);

            if self.multi_draw {
                rpass.multi_draw_indexed_indirect(indirect, 0, draw.commands.len() as u32);
            } else {
                for c in draw.commands {
                    rpass.draw_indexed(
                        c.first_index..c.first_index + c.index_count,
                        c.base_vertex,
                        c.first_instance..c.first_instance + c.instance_count,
                    );
                }
            }
        }
    }

    fn end_frame(&mut self) {
        if let Some(frame) = self.frame.take() {
            self.gpu.submit(frame);
        }
    }

    fn resize(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }
        // The acquired texture belongs to the old configuration.
        self.end_frame();
        self.gpu.resize(width, height);
        self.depth_view = create_depth_view(self.gpu.device(), width, height);
    }

    fn surface_size(&self) -> (u32, u32) {
        self.gpu.size()
    }
}
