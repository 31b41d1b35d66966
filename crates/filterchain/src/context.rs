//! The rendering-context seam.
//!
//! [`RenderContext`] is the GL-shaped command surface the pipeline drives.
//! Handles are opaque ids owned by the context; the pipeline never touches
//! backend objects directly. Two implementations ship with the crate:
//! [`crate::GpuContext`] on wgpu and [`crate::SoftwareContext`] on the CPU.
use image::RgbaImage;
use serde::Serialize;

use crate::error::ContextError;
use crate::shader::{ShaderSource, UniformValue};

macro_rules! handle {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub(crate) u32);

        impl $name {
            pub fn index(self) -> usize {
                self.0 as usize
            }
        }
    };
}

handle!(ShaderId);
handle!(ProgramId);
handle!(TextureId);
handle!(FramebufferId);
handle!(
    /// Only meaningful for the program it was resolved from.
    UniformLocation
);

/// Minification and magnification filter; wrapping is always clamp-to-edge.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TextureFilter {
    Nearest,
    Linear,
}

/// Where an attribute reads from the interleaved quad buffer, in floats.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AttributeBinding {
    pub location: u32,
    pub components: u32,
    pub stride: u32,
    pub offset: u32,
}

/// Instrumentation counters kept by every backend.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ContextStats {
    pub shaders_compiled: u32,
    pub programs_linked: u32,
    pub program_binds: u32,
    pub textures_created: u32,
    pub textures_released: u32,
    pub framebuffers_created: u32,
    pub framebuffers_released: u32,
    pub full_uploads: u32,
    pub partial_uploads: u32,
    pub surface_configurations: u32,
    pub draws: u32,
}

impl ContextStats {
    pub fn live_textures(&self) -> u32 {
        self.textures_created - self.textures_released
    }
}

pub trait RenderContext {
    fn compile_shader(&mut self, source: &ShaderSource) -> Result<ShaderId, ContextError>;

    fn link_program(
        &mut self,
        vertex: ShaderId,
        fragment: ShaderId,
    ) -> Result<ProgramId, ContextError>;

    fn use_program(&mut self, program: ProgramId);

    fn attribute_location(&self, program: ProgramId, name: &str) -> Option<u32>;

    fn uniform_location(&self, program: ProgramId, name: &str) -> Option<UniformLocation>;

    fn bind_attribute(
        &mut self,
        program: ProgramId,
        binding: AttributeBinding,
    ) -> Result<(), ContextError>;

    /// Sets a uniform on the current program.
    fn set_uniform(
        &mut self,
        location: UniformLocation,
        value: UniformValue<'_>,
    ) -> Result<(), ContextError>;

    fn create_texture(
        &mut self,
        width: u32,
        height: u32,
        filter: TextureFilter,
    ) -> Result<TextureId, ContextError>;

    /// Replaces storage and contents; the texture takes the image's size.
    fn upload_texture(&mut self, texture: TextureId, image: &RgbaImage)
        -> Result<(), ContextError>;

    /// Overwrites contents in place; the image must match the texture's size.
    fn update_texture(&mut self, texture: TextureId, image: &RgbaImage)
        -> Result<(), ContextError>;

    fn release_texture(&mut self, texture: TextureId);

    fn create_framebuffer(&mut self, texture: TextureId) -> Result<FramebufferId, ContextError>;

    fn release_framebuffer(&mut self, framebuffer: FramebufferId);

    fn bind_texture(&mut self, texture: Option<TextureId>);

    /// `None` selects the visible surface.
    fn bind_framebuffer(&mut self, framebuffer: Option<FramebufferId>);

    fn create_quad_buffer(&mut self, vertices: &[f32]) -> Result<(), ContextError>;

    /// Resizes the visible surface and sets the viewport to match.
    fn configure_surface(&mut self, width: u32, height: u32) -> Result<(), ContextError>;

    fn draw_triangles(&mut self, vertex_count: u32) -> Result<(), ContextError>;

    /// Reads the visible surface back, top row first.
    fn read_surface(&mut self) -> Result<RgbaImage, ContextError>;

    fn stats(&self) -> ContextStats;
}
