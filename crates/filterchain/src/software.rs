//! CPU reference backend.
//!
//! Follows GL conventions exactly: texture row 0 is `t = 0`, framebuffer row
//! 0 is the bottom of the viewport, and reading the surface back returns the
//! rows top first. Fragment shaders run through their reference kernels.
use std::collections::HashMap;

use image::{imageops, Rgba, RgbaImage};
use tracing::{debug, trace};

use crate::context::{
    AttributeBinding, ContextStats, FramebufferId, ProgramId, RenderContext, ShaderId,
    TextureFilter, TextureId, UniformLocation,
};
use crate::error::ContextError;
use crate::shader::{
    AttributeDecl, Fragment, ReferenceKernel, Sampler, ShaderSource, ShaderStage, UniformDecl,
    UniformKind, UniformValue, FLIP_Y_UNIFORM,
};

/// One recorded draw call.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DrawRecord {
    pub program: &'static str,
    pub source: TextureId,
    /// `None` when the draw went to the visible surface.
    pub target: Option<FramebufferId>,
    pub flip_y: f32,
}

struct SoftTexture {
    image: RgbaImage,
    filter: TextureFilter,
}

struct SoftProgram {
    label: &'static str,
    kernel: ReferenceKernel,
    attributes: &'static [AttributeDecl],
    bindings: HashMap<u32, AttributeBinding>,
    uniforms: Vec<UniformDecl>,
    values: Vec<Vec<f32>>,
}

impl SoftProgram {
    fn uniform_value(&self, name: &str) -> f32 {
        self.uniforms
            .iter()
            .position(|decl| decl.name == name)
            .and_then(|index| self.values[index].first().copied())
            .unwrap_or(0.0)
    }

    fn binding(&self, name: &str) -> Result<AttributeBinding, ContextError> {
        self.attributes
            .iter()
            .find(|decl| decl.name == name)
            .and_then(|decl| self.bindings.get(&decl.location))
            .copied()
            .ok_or_else(|| {
                ContextError::Device(format!(
                    "attribute '{name}' of program '{}' is not bound",
                    self.label
                ))
            })
    }
}

#[derive(Default)]
pub struct SoftwareContext {
    shaders: Vec<ShaderSource>,
    programs: Vec<SoftProgram>,
    textures: Vec<Option<SoftTexture>>,
    framebuffers: Vec<Option<TextureId>>,
    quad: Vec<f32>,
    surface: RgbaImage,
    current_program: Option<ProgramId>,
    bound_texture: Option<TextureId>,
    bound_framebuffer: Option<FramebufferId>,
    draws: Vec<DrawRecord>,
    stats: ContextStats,
    max_texture_dimension: Option<u32>,
}

impl SoftwareContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rejects textures and surfaces wider or taller than `limit`, as a
    /// device with that `max_texture_dimension_2d` would.
    pub fn with_max_texture_dimension(limit: u32) -> Self {
        Self {
            max_texture_dimension: Some(limit),
            ..Self::default()
        }
    }

    fn check_size(&self, width: u32, height: u32) -> Result<(), ContextError> {
        match self.max_texture_dimension {
            Some(limit) if width > limit || height > limit => Err(ContextError::Device(format!(
                "{width}x{height} exceeds max_texture_dimension_2d {limit}"
            ))),
            _ => Ok(()),
        }
    }

    pub fn draws(&self) -> &[DrawRecord] {
        &self.draws
    }

    pub fn clear_draws(&mut self) {
        self.draws.clear();
    }

    /// Raw storage of a live texture, row 0 first.
    pub fn texture_image(&self, texture: TextureId) -> Option<&RgbaImage> {
        self.texture(texture).ok().map(|texture| &texture.image)
    }

    pub fn framebuffer_texture(&self, framebuffer: FramebufferId) -> Option<TextureId> {
        self.framebuffers.get(framebuffer.index()).copied().flatten()
    }

    fn texture(&self, texture: TextureId) -> Result<&SoftTexture, ContextError> {
        self.textures
            .get(texture.index())
            .and_then(Option::as_ref)
            .ok_or_else(|| ContextError::Device(format!("texture {texture:?} does not exist")))
    }

    fn texture_mut(&mut self, texture: TextureId) -> Result<&mut SoftTexture, ContextError> {
        self.textures
            .get_mut(texture.index())
            .and_then(Option::as_mut)
            .ok_or_else(|| ContextError::Device(format!("texture {texture:?} does not exist")))
    }

    fn program(&self, program: ProgramId) -> Option<&SoftProgram> {
        self.programs.get(program.index())
    }

    fn target_texture(&self) -> Result<Option<TextureId>, ContextError> {
        match self.bound_framebuffer {
            None => Ok(None),
            Some(framebuffer) => self
                .framebuffer_texture(framebuffer)
                .map(Some)
                .ok_or_else(|| {
                    ContextError::Device(format!("framebuffer {framebuffer:?} does not exist"))
                }),
        }
    }

    fn vertices(&self, program: &SoftProgram, count: u32) -> Result<Vec<Vertex>, ContextError> {
        let pos = program.binding("pos")?;
        let uv = program.binding("uv")?;
        let flip_y = program.uniform_value(FLIP_Y_UNIFORM);
        let read = |binding: AttributeBinding, vertex: usize| -> Result<[f32; 2], ContextError> {
            let start = vertex * binding.stride as usize + binding.offset as usize;
            match self.quad.get(start..start + 2) {
                Some(&[a, b]) => Ok([a, b]),
                _ => Err(ContextError::Device(format!(
                    "vertex {vertex} is outside the quad buffer"
                ))),
            }
        };

        (0..count as usize)
            .map(|vertex| {
                let [x, y] = read(pos, vertex)?;
                Ok(Vertex {
                    clip: [x, y * flip_y],
                    uv: read(uv, vertex)?,
                })
            })
            .collect()
    }
}

#[derive(Clone, Copy, Debug)]
struct Vertex {
    clip: [f32; 2],
    uv: [f32; 2],
}

struct TextureSampler<'a> {
    image: &'a RgbaImage,
    filter: TextureFilter,
}

impl TextureSampler<'_> {
    fn texel(&self, x: i64, y: i64) -> [f32; 4] {
        let max_x = i64::from(self.image.width()) - 1;
        let max_y = i64::from(self.image.height()) - 1;
        let Rgba(pixel) = *self
            .image
            .get_pixel(x.clamp(0, max_x) as u32, y.clamp(0, max_y) as u32);
        pixel.map(|channel| f32::from(channel) / 255.0)
    }
}

impl Sampler for TextureSampler<'_> {
    fn sample(&self, [u, v]: [f32; 2]) -> [f32; 4] {
        if self.image.width() == 0 || self.image.height() == 0 {
            return [0.0; 4];
        }
        let width = self.image.width() as f32;
        let height = self.image.height() as f32;
        match self.filter {
            TextureFilter::Nearest => {
                self.texel((u * width).floor() as i64, (v * height).floor() as i64)
            }
            TextureFilter::Linear => {
                let x = u * width - 0.5;
                let y = v * height - 0.5;
                let (x0, y0) = (x.floor(), y.floor());
                let (fx, fy) = (x - x0, y - y0);
                let (x0, y0) = (x0 as i64, y0 as i64);
                let top = lerp(self.texel(x0, y0), self.texel(x0 + 1, y0), fx);
                let bottom = lerp(self.texel(x0, y0 + 1), self.texel(x0 + 1, y0 + 1), fx);
                lerp(top, bottom, fy)
            }
        }
    }
}

fn lerp(a: [f32; 4], b: [f32; 4], t: f32) -> [f32; 4] {
    std::array::from_fn(|index| a[index] + (b[index] - a[index]) * t)
}

fn to_unorm(value: f32) -> u8 {
    if value.is_nan() {
        0
    } else {
        (value.clamp(0.0, 1.0) * 255.0).round() as u8
    }
}

fn edge(a: [f32; 2], b: [f32; 2], p: [f32; 2]) -> f32 {
    (b[0] - a[0]) * (p[1] - a[1]) - (b[1] - a[1]) * (p[0] - a[0])
}

fn rasterize(
    triangle: [Vertex; 3],
    output: &mut RgbaImage,
    shade: &dyn Fn([f32; 2]) -> [f32; 4],
) {
    let width = output.width() as f32;
    let height = output.height() as f32;
    let window = triangle.map(|vertex| {
        [
            (vertex.clip[0] + 1.0) * 0.5 * width,
            (vertex.clip[1] + 1.0) * 0.5 * height,
        ]
    });
    let area = edge(window[0], window[1], window[2]);
    if area == 0.0 {
        return;
    }

    let min_x = window.iter().map(|p| p[0]).fold(f32::INFINITY, f32::min);
    let max_x = window.iter().map(|p| p[0]).fold(f32::NEG_INFINITY, f32::max);
    let min_y = window.iter().map(|p| p[1]).fold(f32::INFINITY, f32::min);
    let max_y = window.iter().map(|p| p[1]).fold(f32::NEG_INFINITY, f32::max);
    let x_range = (min_x.floor().max(0.0) as u32)..(max_x.ceil().min(width) as u32);
    let y_range = (min_y.floor().max(0.0) as u32)..(max_y.ceil().min(height) as u32);

    for row in y_range {
        for column in x_range.clone() {
            let center = [column as f32 + 0.5, row as f32 + 0.5];
            let weights = [
                edge(window[1], window[2], center) / area,
                edge(window[2], window[0], center) / area,
                edge(window[0], window[1], center) / area,
            ];
            if weights.iter().any(|weight| *weight < 0.0) {
                continue;
            }
            let uv = std::array::from_fn(|axis| {
                weights
                    .iter()
                    .zip(&triangle)
                    .map(|(weight, vertex)| weight * vertex.uv[axis])
                    .sum::<f32>()
            });
            let color = shade(uv);
            output.put_pixel(column, row, Rgba(color.map(to_unorm)));
        }
    }
}

impl RenderContext for SoftwareContext {
    fn compile_shader(&mut self, source: &ShaderSource) -> Result<ShaderId, ContextError> {
        if source.stage == ShaderStage::Fragment && source.reference.is_none() {
            return Err(ContextError::Compile(format!(
                "no reference kernel for fragment shader '{}'",
                source.label
            )));
        }
        self.shaders.push(*source);
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
        if vertex.stage != ShaderStage::Vertex || fragment.stage != ShaderStage::Fragment {
            return Err(ContextError::Link(format!(
                "expected a vertex and a fragment shader, got {} and {}",
                vertex.stage, fragment.stage
            )));
        }
        let Some(kernel) = fragment.reference else {
            return Err(ContextError::Link(format!(
                "fragment shader '{}' has no reference kernel",
                fragment.label
            )));
        };

        let uniforms: Vec<UniformDecl> = vertex
            .uniforms
            .iter()
            .chain(fragment.uniforms)
            .copied()
            .collect();
        let values = uniforms
            .iter()
            .map(|decl| match decl.kind {
                UniformKind::Float => vec![0.0],
                UniformKind::Vec2 => vec![0.0; 2],
                UniformKind::FloatArray(len) => vec![0.0; len],
            })
            .collect();
        self.programs.push(SoftProgram {
            label: fragment.label,
            kernel,
            attributes: vertex.attributes,
            bindings: HashMap::new(),
            uniforms,
            values,
        });
        self.stats.programs_linked += 1;
        Ok(ProgramId(self.programs.len() as u32 - 1))
    }

    fn use_program(&mut self, program: ProgramId) {
        self.current_program = Some(program);
        self.stats.program_binds += 1;
    }

    fn attribute_location(&self, program: ProgramId, name: &str) -> Option<u32> {
        self.program(program)?
            .attributes
            .iter()
            .find(|decl| decl.name == name)
            .map(|decl| decl.location)
    }

    fn uniform_location(&self, program: ProgramId, name: &str) -> Option<UniformLocation> {
        self.program(program)?
            .uniforms
            .iter()
            .position(|decl| decl.name == name)
            .map(|index| UniformLocation(index as u32))
    }

    fn bind_attribute(
        &mut self,
        program: ProgramId,
        binding: AttributeBinding,
    ) -> Result<(), ContextError> {
        let program = self
            .programs
            .get_mut(program.index())
            .ok_or_else(|| ContextError::Device(format!("program {program:?} does not exist")))?;
        program.bindings.insert(binding.location, binding);
        Ok(())
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
        let index = location.index();
        let decl = program
            .uniforms
            .get(index)
            .ok_or_else(|| ContextError::Device(format!("invalid uniform location {index}")))?;
        if !value.matches(decl.kind) {
            return Err(ContextError::Device(format!(
                "uniform '{}' of program '{}' is {:?}, got {value:?}",
                decl.name, program.label, decl.kind
            )));
        }
        let values = value.as_slice();
        program.values[index][..values.len()].copy_from_slice(values);
        Ok(())
    }

    fn create_texture(
        &mut self,
        width: u32,
        height: u32,
        filter: TextureFilter,
    ) -> Result<TextureId, ContextError> {
        self.check_size(width, height)?;
        self.textures.push(Some(SoftTexture {
            image: RgbaImage::new(width, height),
            filter,
        }));
        self.stats.textures_created += 1;
        Ok(TextureId(self.textures.len() as u32 - 1))
    }

    fn upload_texture(
        &mut self,
        texture: TextureId,
        image: &RgbaImage,
    ) -> Result<(), ContextError> {
        let (width, height) = image.dimensions();
        self.check_size(width, height)?;
        self.texture_mut(texture)?.image = image.clone();
        self.stats.full_uploads += 1;
        Ok(())
    }

    fn update_texture(
        &mut self,
        texture: TextureId,
        image: &RgbaImage,
    ) -> Result<(), ContextError> {
        let target = self.texture_mut(texture)?;
        if target.image.dimensions() != image.dimensions() {
            return Err(ContextError::Device(format!(
                "sub-image update of {:?} into a {:?} texture",
                image.dimensions(),
                target.image.dimensions()
            )));
        }
        target.image.copy_from_slice(image.as_raw());
        self.stats.partial_uploads += 1;
        Ok(())
    }

    fn release_texture(&mut self, texture: TextureId) {
        if let Some(slot) = self.textures.get_mut(texture.index()) {
            if slot.take().is_some() {
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
        self.quad = vertices.to_vec();
        Ok(())
    }

    fn configure_surface(&mut self, width: u32, height: u32) -> Result<(), ContextError> {
        self.check_size(width, height)?;
        debug!(width, height, "configuring software surface");
        self.surface = RgbaImage::new(width, height);
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
        let target_id = self.target_texture()?;
        if target_id == Some(source_id) {
            return Err(ContextError::Device(format!(
                "texture {source_id:?} is both source and destination"
            )));
        }

        let mut output = match target_id {
            Some(id) => std::mem::take(&mut self.texture_mut(id)?.image),
            None => std::mem::take(&mut self.surface),
        };
        let result = self.shade_into(program_id, source_id, vertex_count, &mut output);
        match target_id {
            Some(id) => self.texture_mut(id)?.image = output,
            None => self.surface = output,
        }
        let flip_y = result?;

        let program = self
            .program(program_id)
            .map_or("<unknown>", |program| program.label);
        trace!(program, ?source_id, ?target_id, flip_y, "software draw");
        self.draws.push(DrawRecord {
            program,
            source: source_id,
            target: self.bound_framebuffer,
            flip_y,
        });
        self.stats.draws += 1;
        Ok(())
    }

    fn read_surface(&mut self) -> Result<RgbaImage, ContextError> {
        Ok(imageops::flip_vertical(&self.surface))
    }

    fn stats(&self) -> ContextStats {
        self.stats
    }
}

impl SoftwareContext {
    /// Runs the program over `output`; returns the `flipY` it drew with.
    fn shade_into(
        &self,
        program: ProgramId,
        source: TextureId,
        vertex_count: u32,
        output: &mut RgbaImage,
    ) -> Result<f32, ContextError> {
        let program = self
            .program(program)
            .ok_or_else(|| ContextError::Device(format!("program {program:?} does not exist")))?;
        let texture = self.texture(source)?;
        let sampler = TextureSampler {
            image: &texture.image,
            filter: texture.filter,
        };
        let vertices = self.vertices(program, vertex_count)?;
        let shade = |uv: [f32; 2]| {
            let fragment = Fragment::new(uv, &sampler, &program.uniforms, &program.values);
            (program.kernel)(&fragment)
        };
        for triangle in vertices.chunks_exact(3) {
            rasterize([triangle[0], triangle[1], triangle[2]], output, &shade);
        }
        Ok(program.uniform_value(FLIP_Y_UNIFORM))
    }
}
