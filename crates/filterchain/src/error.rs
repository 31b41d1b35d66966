use crate::shader::ShaderStage;

/// Failures surfaced by the rendering backend itself.
///
/// Backends only know about driver-level diagnostics; [`crate::ProgramCache`]
/// attaches the shader label and stage when turning these into a
/// [`FilterError`].
#[derive(Debug, thiserror::Error)]
pub enum ContextError {
    #[error("{0}")]
    Compile(String),
    #[error("{0}")]
    Link(String),
    #[error("rendering device error: {0}")]
    Device(String),
}

#[derive(Debug, thiserror::Error)]
pub enum FilterError {
    #[error("failed to compile {stage} shader '{label}':\n{log}")]
    Compile {
        label: String,
        stage: ShaderStage,
        log: String,
    },
    #[error("failed to link program '{label}':\n{log}")]
    Link { label: String, log: String },
    #[error("unknown effect '{0}'")]
    UnknownEffect(String),
    #[error("effect '{effect}' {message}")]
    InvalidArguments { effect: String, message: String },
    #[error("effect '{name}' registered by both '{first}' and '{second}'")]
    DuplicateEffect {
        name: String,
        first: &'static str,
        second: &'static str,
    },
    #[error("program '{program}' has no uniform named '{name}'")]
    UnknownUniform { program: String, name: String },
    #[error("rendering context unavailable: {0}")]
    ContextUnavailable(String),
    #[error("image must have non-zero dimensions (got {width}x{height})")]
    EmptyImage { width: u32, height: u32 },
    #[error("no program is bound; select a shader before drawing")]
    NoProgram,
    #[error("a pass was requested after the final pass reached the surface")]
    PassAfterFinal,
    #[error(transparent)]
    Device(#[from] ContextError),
}

pub type Result<T, E = FilterError> = std::result::Result<T, E>;
