//! The pass executor.
//!
//! A [`PassContext`] is what an effect sees while it runs: it can select a
//! shader, set that shader's uniforms and draw. Routing between the source
//! image, the two pool targets and the visible surface is decided here from
//! the [`PipelineState`] of the current `apply`.
use tracing::trace;

use crate::context::{RenderContext, TextureId};
use crate::error::{FilterError, Result};
use crate::program::{ProgramCache, ProgramHandle};
use crate::shader::{ShaderSource, UniformValue, FLIP_Y_UNIFORM};
use crate::targets::{RenderTargetPool, QUAD_VERTEX_COUNT};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DrawMode {
    #[default]
    Default,
    /// Always render off-screen, even from the last entry.
    Intermediate,
}

/// Per-apply routing state. Created fresh by every `apply`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PipelineState {
    pub draw_count: u32,
    /// Pool slot holding the latest result; `None` before the first
    /// off-screen draw and after the final one.
    pub current_index: Option<usize>,
    pub last_in_chain: bool,
    finished: bool,
}

impl PipelineState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn finished(&self) -> bool {
        self.finished
    }
}

/// Where a draw was routed.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum PassTarget {
    Pool(usize),
    Surface { flip_y: f32 },
}

pub struct PassContext<'a, C: RenderContext> {
    context: &'a mut C,
    programs: &'a mut ProgramCache,
    targets: &'a mut RenderTargetPool,
    state: &'a mut PipelineState,
    source: TextureId,
    program: Option<ProgramHandle>,
}

impl<'a, C: RenderContext> PassContext<'a, C> {
    pub fn new(
        context: &'a mut C,
        programs: &'a mut ProgramCache,
        targets: &'a mut RenderTargetPool,
        state: &'a mut PipelineState,
        source: TextureId,
    ) -> Self {
        Self {
            context,
            programs,
            targets,
            state,
            source,
            program: None,
        }
    }

    pub fn state(&self) -> &PipelineState {
        self.state
    }

    pub(crate) fn state_mut(&mut self) -> &mut PipelineState {
        self.state
    }

    /// Makes `fragment` the current program for the following draws.
    pub fn select(&mut self, fragment: &ShaderSource) -> Result<()> {
        self.program = None;
        let handle = self.programs.select(self.context, fragment)?;
        self.program = Some(handle);
        Ok(())
    }

    pub fn set_uniform(&mut self, name: &str, value: UniformValue<'_>) -> Result<()> {
        let program = self.program.as_ref().ok_or(FilterError::NoProgram)?;
        let location = program
            .uniform(name)
            .ok_or_else(|| FilterError::UnknownUniform {
                program: program.label.to_string(),
                name: name.to_string(),
            })?;
        self.context.set_uniform(location, value)?;
        Ok(())
    }

    pub fn set_float(&mut self, name: &str, value: f32) -> Result<()> {
        self.set_uniform(name, UniformValue::Float(value))
    }

    pub fn set_vec2(&mut self, name: &str, value: [f32; 2]) -> Result<()> {
        self.set_uniform(name, UniformValue::Vec2(value))
    }

    pub fn set_floats(&mut self, name: &str, values: &[f32]) -> Result<()> {
        self.set_uniform(name, UniformValue::FloatArray(values))
    }

    /// Draws the full-screen quad with the current program.
    pub fn draw_pass(&mut self, mode: DrawMode) -> Result<PassTarget> {
        if self.state.finished {
            return Err(FilterError::PassAfterFinal);
        }
        if self.program.is_none() {
            return Err(FilterError::NoProgram);
        }

        let source = if self.state.draw_count == 0 {
            self.source
        } else {
            let index = self.state.current_index.ok_or(FilterError::PassAfterFinal)?;
            self.targets.get(self.context, index)?.texture
        };
        self.state.draw_count += 1;

        let (framebuffer, destination, target) =
            if self.state.last_in_chain && mode != DrawMode::Intermediate {
                let flip_y = if self.state.draw_count % 2 == 0 { -1.0 } else { 1.0 };
                self.state.current_index = None;
                self.state.finished = true;
                (None, None, PassTarget::Surface { flip_y })
            } else {
                let next = self.state.current_index.map_or(0, |index| (index + 1) % 2);
                let render_target = self.targets.get(self.context, next)?;
                self.state.current_index = Some(next);
                (
                    Some(render_target.framebuffer),
                    Some(render_target.texture),
                    PassTarget::Pool(next),
                )
            };
        debug_assert_ne!(Some(source), destination, "pass reads and writes one target");

        let flip_y = match target {
            PassTarget::Surface { flip_y } => flip_y,
            PassTarget::Pool(_) => 1.0,
        };
        trace!(
            draw = self.state.draw_count,
            ?source,
            ?target,
            "drawing pass"
        );

        self.context.bind_texture(Some(source));
        self.context.bind_framebuffer(framebuffer);
        self.set_float(FLIP_Y_UNIFORM, flip_y)?;
        self.context.draw_triangles(QUAD_VERTEX_COUNT)?;
        Ok(target)
    }
}
