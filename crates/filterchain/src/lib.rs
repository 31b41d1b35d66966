//! Ping-pong image filter chains.
//!
//! A [`FilterChain`] owns one [`RenderContext`] and an ordered list of
//! [`Effect`]s. Calling [`FilterChain::apply`] uploads an image, runs every
//! effect as one or more full-screen draws alternating between two
//! off-screen targets, and sends the final draw to the visible surface with
//! the vertical flip that matches the number of draws issued.
//!
//! ```no_run
//! use filterchain::{Effect, FilterChain, GpuContext};
//!
//! # fn main() -> Result<(), filterchain::FilterError> {
//! let image = image::RgbaImage::new(64, 64);
//! let mut chain = FilterChain::new(GpuContext::headless()?)?;
//! chain.add_effect(Effect::Blur { radius: 4.0 });
//! chain.add_named("brightness", &[0.1])?;
//! let pixels = chain.apply(&image)?.read_pixels()?;
//! # let _ = pixels;
//! # Ok(())
//! # }
//! ```
mod chain;
mod context;
pub mod effects;
mod error;
mod gpu;
mod pass;
mod program;
pub mod shader;
mod software;
mod targets;

pub use chain::{ChainEntry, FilterChain, RenderedSurface};
pub use context::{
    AttributeBinding, ContextStats, FramebufferId, ProgramId, RenderContext, ShaderId,
    TextureFilter, TextureId, UniformLocation,
};
pub use effects::{Effect, EffectCatalog, EffectSpec, PassCount, Recipe};
pub use error::{ContextError, FilterError, Result};
pub use gpu::{GpuContext, GpuOptions, GpuPower};
pub use pass::{DrawMode, PassContext, PassTarget, PipelineState};
pub use program::{CompiledProgram, ProgramCache, ProgramHandle};
pub use software::{DrawRecord, SoftwareContext};
pub use targets::{RenderTarget, RenderTargetPool, QUAD_VERTEX_COUNT, QUAD_VERTICES};
