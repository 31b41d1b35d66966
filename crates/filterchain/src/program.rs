use std::collections::HashMap;
use std::ops::Deref;
use std::sync::Arc;

use tracing::{debug, trace, warn};

use crate::context::{AttributeBinding, ProgramId, RenderContext, ShaderId, UniformLocation};
use crate::error::{ContextError, FilterError, Result};
use crate::shader::{ShaderSource, QUAD_STRIDE, VERTEX_SHADER};

/// A linked program with every declared name resolved to a handle.
#[derive(Debug)]
pub struct CompiledProgram {
    pub id: ProgramId,
    pub label: &'static str,
    attributes: HashMap<&'static str, u32>,
    uniforms: HashMap<&'static str, UniformLocation>,
}

impl CompiledProgram {
    pub fn attribute(&self, name: &str) -> Option<u32> {
        self.attributes.get(name).copied()
    }

    pub fn uniform(&self, name: &str) -> Option<UniformLocation> {
        self.uniforms.get(name).copied()
    }
}

#[derive(Clone, Debug)]
pub struct ProgramHandle(Arc<CompiledProgram>);

impl ProgramHandle {
    fn new(program: CompiledProgram) -> Self {
        Self(Arc::new(program))
    }

    pub fn ptr_eq(&self, other: &ProgramHandle) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Deref for ProgramHandle {
    type Target = CompiledProgram;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// Programs keyed by fragment body text, compiled at most once per chain.
#[derive(Debug, Default)]
pub struct ProgramCache {
    vertex: Option<ShaderId>,
    entries: HashMap<&'static str, ProgramHandle>,
    current: Option<ProgramHandle>,
}

impl ProgramCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn current(&self) -> Option<&ProgramHandle> {
        self.current.as_ref()
    }

    /// Makes the program for `fragment` current, building it on first use.
    pub fn select<C: RenderContext>(
        &mut self,
        context: &mut C,
        fragment: &ShaderSource,
    ) -> Result<ProgramHandle> {
        if let Some(handle) = self.entries.get(fragment.glsl) {
            trace!(program = handle.label, "program cache hit");
            context.use_program(handle.id);
            self.current = Some(handle.clone());
            return Ok(handle.clone());
        }

        self.current = None;
        let handle = ProgramHandle::new(self.build(context, fragment)?);
        context.use_program(handle.id);
        self.entries.insert(fragment.glsl, handle.clone());
        self.current = Some(handle.clone());
        Ok(handle)
    }

    fn build<C: RenderContext>(
        &mut self,
        context: &mut C,
        fragment: &ShaderSource,
    ) -> Result<CompiledProgram> {
        let vertex = match self.vertex {
            Some(id) => id,
            None => {
                let id = context
                    .compile_shader(&VERTEX_SHADER)
                    .map_err(|err| compile_error(&VERTEX_SHADER, err))?;
                self.vertex = Some(id);
                id
            }
        };
        let fragment_id = context
            .compile_shader(fragment)
            .map_err(|err| compile_error(fragment, err))?;
        let id = context
            .link_program(vertex, fragment_id)
            .map_err(|err| match err {
                ContextError::Link(log) | ContextError::Compile(log) => FilterError::Link {
                    label: fragment.label.to_string(),
                    log,
                },
                other => other.into(),
            })?;
        debug!(program = fragment.label, ?id, "linked program");

        let mut attributes = HashMap::new();
        for decl in VERTEX_SHADER.attributes {
            let Some(location) = context.attribute_location(id, decl.name) else {
                warn!(program = fragment.label, attribute = decl.name, "attribute not active");
                continue;
            };
            context.bind_attribute(
                id,
                AttributeBinding {
                    location,
                    components: decl.components,
                    stride: QUAD_STRIDE,
                    offset: decl.offset,
                },
            )?;
            attributes.insert(decl.name, location);
        }

        let mut uniforms = HashMap::new();
        for decl in VERTEX_SHADER.uniforms.iter().chain(fragment.uniforms) {
            match context.uniform_location(id, decl.name) {
                Some(location) => {
                    uniforms.insert(decl.name, location);
                }
                None => warn!(program = fragment.label, uniform = decl.name, "uniform not active"),
            }
        }

        Ok(CompiledProgram {
            id,
            label: fragment.label,
            attributes,
            uniforms,
        })
    }
}

fn compile_error(source: &ShaderSource, err: ContextError) -> FilterError {
    match err {
        ContextError::Compile(log) => FilterError::Compile {
            label: source.label.to_string(),
            stage: source.stage,
            log,
        },
        other => other.into(),
    }
}
