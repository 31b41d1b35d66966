//! Headless wgpu backend.
mod compile;
mod context;
mod readback;
mod uniforms;

pub use context::{GpuContext, GpuOptions, GpuPower};

pub(crate) const VERTEX_UNIFORM_BINDING: u32 = 0;
pub(crate) const FRAGMENT_UNIFORM_BINDING: u32 = 1;
pub(crate) const TEXTURE_BINDING: u32 = 2;
pub(crate) const SAMPLER_BINDING: u32 = 3;

/// Every texture, the surface included, is plain 8-bit RGBA.
pub(crate) const TEXTURE_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;
