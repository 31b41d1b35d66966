use std::borrow::Cow;

use image::RgbaImage;
use tracing::{debug, trace};

use crate::context::{
    AttributeBinding, ContextStats, FramebufferId, ProgramId, RenderContext, ShaderId,
    TextureFilter, TextureId, UniformLocation,
};
use crate::error::{ContextError, FilterError};
use crate::shader::{AttributeDecl, ShaderSource, ShaderStage, UniformValue, QUAD_STRIDE};

use super::compile::{diagnose, naga_stage, wrap_source};
use super::readback::read_texture;
use super::uniforms::UniformBlock;
use super::{
    FRAGMENT_UNIFORM_BINDING, SAMPLER_BINDING, TEXTURE_BINDING, TEXTURE_FORMAT,
    VERTEX_UNIFORM_BINDING,
};

const FLOAT_SIZE: u64 = std::mem::size_of::<f32>() as u64;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum GpuPower {
    Low,
    #[default]
    High,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct GpuOptions {
    pub power: GpuPower,
    pub force_fallback_adapter: bool,
}

struct GpuShader {
    source: ShaderSource,
    module: wgpu::ShaderModule,
}

struct GpuTexture {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    sampler: wgpu::Sampler,
    filter: TextureFilter,
}

#[derive(Clone, Copy, Debug)]
enum UniformSlot {
    Vertex(usize),
    Fragment(usize),
}

struct GpuProgram {
    label: &'static str,
    pipeline: wgpu::RenderPipeline,
    bind_group_layout: wgpu::BindGroupLayout,
    vertex_uniforms: UniformBlock,
    fragment_uniforms: Option<UniformBlock>,
    attributes: &'static [AttributeDecl],
    slots: Vec<(&'static str, UniformSlot)>,
}

/// A headless wgpu device rendering into offscreen RGBA8 textures.
pub struct GpuContext {
    _instance: wgpu::Instance,
    device: wgpu::Device,
    queue: wgpu::Queue,
    adapter_name: String,
    limits: wgpu::Limits,
    shaders: Vec<GpuShader>,
    programs: Vec<GpuProgram>,
    textures: Vec<Option<GpuTexture>>,
    framebuffers: Vec<Option<TextureId>>,
    quad: Option<wgpu::Buffer>,
    surface: Option<GpuTexture>,
    current_program: Option<ProgramId>,
    bound_texture: Option<TextureId>,
    bound_framebuffer: Option<FramebufferId>,
    stats: ContextStats,
}

impl GpuContext {
    pub fn headless() -> Result<Self, FilterError> {
        Self::new(GpuOptions::default())
    }

    pub fn new(options: GpuOptions) -> Result<Self, FilterError> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            flags: wgpu::InstanceFlags::default(),
            memory_budget_thresholds: wgpu::MemoryBudgetThresholds::default(),
            backend_options: wgpu::BackendOptions::default(),
        });

        let power_preference = match options.power {
            GpuPower::Low => wgpu::PowerPreference::LowPower,
            GpuPower::High => wgpu::PowerPreference::HighPerformance,
        };
        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference,
            compatible_surface: None,
            force_fallback_adapter: options.force_fallback_adapter,
        }))
        .map_err(|err| FilterError::ContextUnavailable(format!("no suitable GPU adapter: {err}")))?;

        let info = adapter.get_info();
        debug!(
            name = %info.name,
            backend = ?info.backend,
            device_type = ?info.device_type,
            "selected GPU adapter"
        );

        let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
            label: Some("filterchain device"),
            required_features: wgpu::Features::empty(),
            required_limits: adapter.limits(),
            memory_hints: wgpu::MemoryHints::Performance,
            trace: wgpu::Trace::default(),
        }))
        .map_err(|err| {
            FilterError::ContextUnavailable(format!("failed to create GPU device: {err}"))
        })?;

        let limits = device.limits();
        debug!(
            max_texture_dimension_2d = limits.max_texture_dimension_2d,
            "created GPU device"
        );

        Ok(Self {
            _instance: instance,
            device,
            queue,
            adapter_name: info.name,
            limits,
            shaders: Vec::new(),
            programs: Vec::new(),
            textures: Vec::new(),
            framebuffers: Vec::new(),
            quad: None,
            surface: None,
            current_program: None,
            bound_texture: None,
            bound_framebuffer: None,
            stats: ContextStats::default(),
        })
    }

    pub fn adapter_name(&self) -> &str {
        &self.adapter_name
    }

    /// Largest width or height a texture, and so an input image, may have.
    pub fn max_texture_dimension(&self) -> u32 {
        self.limits.max_texture_dimension_2d
    }

    fn make_texture(
        &self,
        label: &str,
        width: u32,
        height: u32,
        filter: TextureFilter,
    ) -> Result<GpuTexture, ContextError> {
        if width == 0 || height == 0 {
            return Err(ContextError::Device(format!(
                "cannot create a {width}x{height} texture"
            )));
        }
        let max_dimension = self.limits.max_texture_dimension_2d;
        if width > max_dimension || height > max_dimension {
            return Err(ContextError::Device(format!(
                "{label} of {width}x{height} exceeds max_texture_dimension_2d {max_dimension}"
            )));
        }
        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: TEXTURE_FORMAT,
            usage: wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::RENDER_ATTACHMENT
                | wgpu::TextureUsages::COPY_DST
                | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let filter_mode = match filter {
            TextureFilter::Nearest => wgpu::FilterMode::Nearest,
            TextureFilter::Linear => wgpu::FilterMode::Linear,
        };
        let sampler = self.device.create_sampler(&wgpu::SamplerDescriptor {
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: filter_mode,
            min_filter: filter_mode,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });
        Ok(GpuTexture {
            texture,
            view,
            sampler,
            filter,
        })
    }

    fn write_image(&self, texture: &wgpu::Texture, image: &RgbaImage) {
        let (width, height) = image.dimensions();
        self.queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            image.as_raw(),
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(width * 4),
                rows_per_image: Some(height),
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );
    }

    fn texture(&self, texture: TextureId) -> Result<&GpuTexture, ContextError> {
        self.textures
            .get(texture.index())
            .and_then(Option::as_ref)
            .ok_or_else(|| ContextError::Device(format!("texture {texture:?} does not exist")))
    }

    fn program(&self, program: ProgramId) -> Result<&GpuProgram, ContextError> {
        self.programs
            .get(program.index())
            .ok_or_else(|| ContextError::Device(format!("program {program:?} does not exist")))
    }

    fn target_view(&self, source: TextureId) -> Result<&wgpu::TextureView, ContextError> {
        match self.bound_framebuffer {
            Some(framebuffer) => {
                let texture = self
                    .framebuffers
                    .get(framebuffer.index())
                    .copied()
                    .flatten()
                    .ok_or_else(|| {
                        ContextError::Device(format!("framebuffer {framebuffer:?} does not exist"))
                    })?;
                if texture == source {
                    return Err(ContextError::Device(format!(
                        "texture {source:?} is both source and destination"
                    )));
                }
                Ok(&self.texture(texture)?.view)
            }
            None => self
                .surface
                .as_ref()
                .map(|surface| &surface.view)
                .ok_or_else(|| ContextError::Device("surface is not configured".into())),
        }
    }
}

fn vertex_format(components: u32) -> wgpu::VertexFormat {
    match components {
        1 => wgpu::VertexFormat::Float32,
        2 => wgpu::VertexFormat::Float32x2,
        3 => wgpu::VertexFormat::Float32x3,
        _ => wgpu::VertexFormat::Float32x4,
    }
}

fn uniform_entry(binding: u32, visibility: wgpu::ShaderStages) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

impl RenderContext for GpuContext {
    fn compile_shader(&mut self, source: &ShaderSource) -> Result<ShaderId, ContextError> {
        let wrapped = wrap_source(source);
        diagnose(&wrapped, source.stage).map_err(ContextError::Compile)?;

        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let module = self.device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(source.label),
            source: wgpu::ShaderSource::Glsl {
                shader: Cow::Owned(wrapped),
                stage: naga_stage(source.stage),
                defines: &[],
            },
        });
        if let Some(error) = pollster::block_on(self.device.pop_error_scope()) {
            return Err(ContextError::Compile(error.to_string()));
        }

        debug!(shader = source.label, stage = %source.stage, "compiled shader");
        self.shaders.push(GpuShader {
            source: *source,
            module,
        });
        self.stats.shaders_compiled += 1;
        Ok(ShaderId(self.shaders.len() as u32 - 1))
    }

    fn link_program(
        &mut self,
        vertex: ShaderId,
        fragment: ShaderId,
    ) -> Result<ProgramId, ContextError> {
        let (Some(vertex), Some(fragment)) = (
            self.shaders.get(vertex.index()),
            self.shaders.get(fragment.index()),
        ) else {
            return Err(ContextError::Link("unknown shader handle".into()));
        };
        if vertex.source.stage != ShaderStage::Vertex
            || fragment.source.stage != ShaderStage::Fragment
        {
            return Err(ContextError::Link(format!(
                "expected a vertex and a fragment shader, got {} and {}",
                vertex.source.stage, fragment.source.stage
            )));
        }

        let label = fragment.source.label;
        let has_fragment_uniforms = !fragment.source.uniforms.is_empty();
        let mut layout_entries = vec![uniform_entry(
            VERTEX_UNIFORM_BINDING,
            wgpu::ShaderStages::VERTEX,
        )];
        if has_fragment_uniforms {
            layout_entries.push(uniform_entry(
                FRAGMENT_UNIFORM_BINDING,
                wgpu::ShaderStages::FRAGMENT,
            ));
        }
        layout_entries.push(wgpu::BindGroupLayoutEntry {
            binding: TEXTURE_BINDING,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Texture {
                sample_type: wgpu::TextureSampleType::Float { filterable: true },
                view_dimension: wgpu::TextureViewDimension::D2,
                multisampled: false,
            },
            count: None,
        });
        layout_entries.push(wgpu::BindGroupLayoutEntry {
            binding: SAMPLER_BINDING,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
            count: None,
        });

        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let bind_group_layout =
            self.device
                .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                    label: Some(label),
                    entries: &layout_entries,
                });
        let pipeline_layout = self
            .device
            .create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some(label),
                bind_group_layouts: &[&bind_group_layout],
                push_constant_ranges: &[],
            });
        let vertex_attributes: Vec<wgpu::VertexAttribute> = vertex
            .source
            .attributes
            .iter()
            .map(|attribute| wgpu::VertexAttribute {
                format: vertex_format(attribute.components),
                offset: u64::from(attribute.offset) * FLOAT_SIZE,
                shader_location: attribute.location,
            })
            .collect();
        let pipeline = self
            .device
            .create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some(label),
                layout: Some(&pipeline_layout),
                vertex: wgpu::VertexState {
                    module: &vertex.module,
                    entry_point: Some("main"),
                    buffers: &[wgpu::VertexBufferLayout {
                        array_stride: u64::from(QUAD_STRIDE) * FLOAT_SIZE,
                        step_mode: wgpu::VertexStepMode::Vertex,
                        attributes: &vertex_attributes,
                    }],
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
                    module: &fragment.module,
                    entry_point: Some("main"),
                    targets: &[Some(wgpu::ColorTargetState {
                        format: TEXTURE_FORMAT,
                        blend: None,
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                }),
                multiview: None,
                cache: None,
            });
        if let Some(error) = pollster::block_on(self.device.pop_error_scope()) {
            return Err(ContextError::Link(error.to_string()));
        }

        let vertex_uniforms =
            UniformBlock::new(&self.device, "vertex uniforms", vertex.source.uniforms);
        let fragment_uniforms = has_fragment_uniforms.then(|| {
            UniformBlock::new(&self.device, "fragment uniforms", fragment.source.uniforms)
        });
        let slots = vertex
            .source
            .uniforms
            .iter()
            .enumerate()
            .map(|(index, decl)| (decl.name, UniformSlot::Vertex(index)))
            .chain(
                fragment
                    .source
                    .uniforms
                    .iter()
                    .enumerate()
                    .map(|(index, decl)| (decl.name, UniformSlot::Fragment(index))),
            )
            .collect();
        let attributes = vertex.source.attributes;

        debug!(program = label, "linked render pipeline");
        self.programs.push(GpuProgram {
            label,
            pipeline,
            bind_group_layout,
            vertex_uniforms,
            fragment_uniforms,
            attributes,
            slots,
        });
        self.stats.programs_linked += 1;
        Ok(ProgramId(self.programs.len() as u32 - 1))
    }

    fn use_program(&mut self, program: ProgramId) {
        self.current_program = Some(program);
        self.stats.program_binds += 1;
    }

    fn attribute_location(&self, program: ProgramId, name: &str) -> Option<u32> {
        self.programs
            .get(program.index())?
            .attributes
            .iter()
            .find(|decl| decl.name == name)
            .map(|decl| decl.location)
    }

    fn uniform_location(&self, program: ProgramId, name: &str) -> Option<UniformLocation> {
        self.programs
            .get(program.index())?
            .slots
            .iter()
            .position(|(slot_name, _)| *slot_name == name)
            .map(|index| UniformLocation(index as u32))
    }

    /// The vertex layout is baked into the pipeline at link time; this only
    /// checks that the requested binding agrees with it.
    fn bind_attribute(
        &mut self,
        program: ProgramId,
        binding: AttributeBinding,
    ) -> Result<(), ContextError> {
        let program = self.program(program)?;
        let baked = program
            .attributes
            .iter()
            .find(|decl| decl.location == binding.location);
        match baked {
            Some(decl)
                if decl.components == binding.components
                    && decl.offset == binding.offset
                    && binding.stride == QUAD_STRIDE =>
            {
                Ok(())
            }
            _ => Err(ContextError::Device(format!(
                "program '{}' cannot rebind attribute location {} to {binding:?}",
                program.label, binding.location
            ))),
        }
    }

    fn set_uniform(
        &mut self,
        location: UniformLocation,
        value: UniformValue<'_>,
    ) -> Result<(), ContextError> {
        let program = self
            .current_program
            .and_then(|id| self.programs.get_mut(id.index()))
            .ok_or_else(|| ContextError::Device("no program in use".into()))?;
        let (_, slot) = *program.slots.get(location.index()).ok_or_else(|| {
            ContextError::Device(format!("invalid uniform location {}", location.index()))
        })?;
        match slot {
            UniformSlot::Vertex(field) => program.vertex_uniforms.write(field, value),
            UniformSlot::Fragment(field) => program
                .fragment_uniforms
                .as_mut()
                .ok_or_else(|| ContextError::Device("program has no fragment uniforms".into()))?
                .write(field, value),
        }
    }

    fn create_texture(
        &mut self,
        width: u32,
        height: u32,
        filter: TextureFilter,
    ) -> Result<TextureId, ContextError> {
        let texture = self.make_texture("filter texture", width, height, filter)?;
        self.textures.push(Some(texture));
        self.stats.textures_created += 1;
        Ok(TextureId(self.textures.len() as u32 - 1))
    }

    fn upload_texture(
        &mut self,
        texture: TextureId,
        image: &RgbaImage,
    ) -> Result<(), ContextError> {
        let current = self.texture(texture)?;
        if (current.texture.width(), current.texture.height()) != image.dimensions() {
            let (width, height) = image.dimensions();
            let replacement = self.make_texture("filter texture", width, height, current.filter)?;
            self.textures[texture.index()] = Some(replacement);
        }
        self.write_image(&self.texture(texture)?.texture, image);
        self.stats.full_uploads += 1;
        Ok(())
    }

    fn update_texture(
        &mut self,
        texture: TextureId,
        image: &RgbaImage,
    ) -> Result<(), ContextError> {
        let current = self.texture(texture)?;
        let size = (current.texture.width(), current.texture.height());
        if size != image.dimensions() {
            return Err(ContextError::Device(format!(
                "sub-image update of {:?} into a {size:?} texture",
                image.dimensions()
            )));
        }
        self.write_image(&current.texture, image);
        self.stats.partial_uploads += 1;
        Ok(())
    }

    fn release_texture(&mut self, texture: TextureId) {
        if let Some(slot) = self.textures.get_mut(texture.index()) {
            if let Some(released) = slot.take() {
                released.texture.destroy();
                self.stats.textures_released += 1;
            }
        }
    }

    fn create_framebuffer(&mut self, texture: TextureId) -> Result<FramebufferId, ContextError> {
        self.texture(texture)?;
        self.framebuffers.push(Some(texture));
        self.stats.framebuffers_created += 1;
        Ok(FramebufferId(self.framebuffers.len() as u32 - 1))
    }

    fn release_framebuffer(&mut self, framebuffer: FramebufferId) {
        if let Some(slot) = self.framebuffers.get_mut(framebuffer.index()) {
            if slot.take().is_some() {
                self.stats.framebuffers_released += 1;
            }
        }
    }

    fn bind_texture(&mut self, texture: Option<TextureId>) {
        self.bound_texture = texture;
    }

    fn bind_framebuffer(&mut self, framebuffer: Option<FramebufferId>) {
        self.bound_framebuffer = framebuffer;
    }

    fn create_quad_buffer(&mut self, vertices: &[f32]) -> Result<(), ContextError> {
        let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("quad vertices"),
            size: std::mem::size_of_val(vertices) as u64,
            usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        self.queue
            .write_buffer(&buffer, 0, bytemuck::cast_slice(vertices));
        self.quad = Some(buffer);
        Ok(())
    }

    fn configure_surface(&mut self, width: u32, height: u32) -> Result<(), ContextError> {
        let surface = self.make_texture("visible surface", width, height, TextureFilter::Linear)?;
        debug!(width, height, "configured offscreen surface");
        if let Some(previous) = self.surface.replace(surface) {
            previous.texture.destroy();
        }
        self.stats.surface_configurations += 1;
        Ok(())
    }

    fn draw_triangles(&mut self, vertex_count: u32) -> Result<(), ContextError> {
        let program_id = self
            .current_program
            .ok_or_else(|| ContextError::Device("draw without a program".into()))?;
        let source_id = self
            .bound_texture
            .ok_or_else(|| ContextError::Device("draw without a bound texture".into()))?;
        let program = self.program(program_id)?;
        let source = self.texture(source_id)?;
        let target = self.target_view(source_id)?;
        let quad = self
            .quad
            .as_ref()
            .ok_or_else(|| ContextError::Device("quad buffer was never created".into()))?;

        program.vertex_uniforms.flush(&self.queue);
        let mut entries = vec![wgpu::BindGroupEntry {
            binding: VERTEX_UNIFORM_BINDING,
            resource: program.vertex_uniforms.buffer.as_entire_binding(),
        }];
        if let Some(block) = &program.fragment_uniforms {
            block.flush(&self.queue);
            entries.push(wgpu::BindGroupEntry {
                binding: FRAGMENT_UNIFORM_BINDING,
                resource: block.buffer.as_entire_binding(),
            });
        }
        entries.push(wgpu::BindGroupEntry {
            binding: TEXTURE_BINDING,
            resource: wgpu::BindingResource::TextureView(&source.view),
        });
        entries.push(wgpu::BindGroupEntry {
            binding: SAMPLER_BINDING,
            resource: wgpu::BindingResource::Sampler(&source.sampler),
        });
        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(program.label),
            layout: &program.bind_group_layout,
            entries: &entries,
        });

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("filter pass encoder"),
            });
        {
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some(program.label),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: target,
                    depth_slice: None,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                occlusion_query_set: None,
                timestamp_writes: None,
            });
            render_pass.set_pipeline(&program.pipeline);
            render_pass.set_bind_group(0, &bind_group, &[]);
            render_pass.set_vertex_buffer(0, quad.slice(..));
            render_pass.draw(0..vertex_count, 0..1);
        }
        self.queue.submit(Some(encoder.finish()));
        trace!(
            program = program.label,
            ?source_id,
            target = ?self.bound_framebuffer,
            "gpu draw"
        );

        self.stats.draws += 1;
        Ok(())
    }

    fn read_surface(&mut self) -> Result<RgbaImage, ContextError> {
        let surface = self
            .surface
            .as_ref()
            .ok_or_else(|| ContextError::Device("surface is not configured".into()))?;
        read_texture(&self.device, &self.queue, &surface.texture)
    }

    fn stats(&self) -> ContextStats {
        self.stats
    }
}
