//! Engine error taxonomy.
//!
//! - [`ShaderError`]: fatal; the program cannot render without a valid pipeline.
//! - [`ContractError`]: programmer error raised at the offending call site.
//! - [`RenderError`]: failure while executing a pass (missing bindings, lost surface).
//! - [`EngineError`]: any of the above, for constructors that compile and allocate.

use thiserror::Error;

use crate::device::SurfaceErrorAction;
use crate::shader::{Stage, UniformType};

/// Shader compilation or link failure.
#[derive(Debug, Clone, Error)]
pub enum ShaderError {
    #[error("{stage} shader failed to compile:\n{log}")]
    Parse { stage: Stage, log: String },

    #[error("{stage} shader failed validation:\n{log}")]
    Validation { stage: Stage, log: String },

    #[error("{stage} shader has no {stage} entry point")]
    MissingEntryPoint { stage: Stage },

    #[error("could not initialize shader program: {0}")]
    Link(String),

    /// A declaration disagrees with the compiled program's interface.
    #[error("shader interface mismatch for `{name}`: {detail}")]
    Interface { name: String, detail: String },

    #[error("uniform `{name}` has a type that cannot be bound as bool/int/float/vec2/vec3/vec4/mat4")]
    UnsupportedUniform { name: String },
}

/// Violation of a typed-binding or registry contract.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ContractError {
    #[error("`{name}` expects {expected} components, got {got}")]
    Arity {
        name: String,
        expected: usize,
        got: usize,
    },

    #[error("`{name}` is declared {expected:?}, got {got:?}")]
    TypeMismatch {
        name: String,
        expected: UniformType,
        got: UniformType,
    },

    #[error("`{name}` is an int uniform, got {value}")]
    NotIntegral { name: String, value: f32 },

    #[error("unknown {kind} `{name}`")]
    UnknownName { kind: &'static str, name: String },

    #[error("{kind} `{name}` is already registered")]
    DuplicateName { kind: &'static str, name: String },

    #[error("attribute `{name}` has dimension {dimension}; expected 1..=4")]
    InvalidDimension { name: String, dimension: u32 },

    #[error("pixel data holds {got} bytes, expected {expected}")]
    PixelData { expected: usize, got: usize },

    #[error("invalid camera: {0}")]
    InvalidCamera(&'static str),

    #[error("render target has no offscreen destination")]
    NoOffscreenTarget,

    #[error("indexed draw requested but the program has no indexed attribute")]
    NoIndexData,

    #[error("{0} must have a non-zero size")]
    ZeroSize(&'static str),

    #[error("color attachment is {color:?} but depth buffer is {depth:?}")]
    AttachmentMismatch { color: (u32, u32), depth: (u32, u32) },
}

/// Failure while recording or submitting a pass.
#[derive(Debug, Clone, Error)]
pub enum RenderError {
    #[error("draw issued with no program bound")]
    NoProgram,

    #[error("no vertex buffer bound at location {location}")]
    MissingAttribute { location: u32 },

    #[error("indexed draw issued with no index buffer bound")]
    MissingIndexBuffer,

    #[error("no texture bound at binding {binding}")]
    MissingTexture { binding: u32 },

    #[error("texture bound at binding {binding} does not match the shader's texture dimension")]
    TextureKindMismatch { binding: u32 },

    #[error("surface unavailable ({0:?})")]
    Surface(SurfaceErrorAction),

    #[error(transparent)]
    Contract(#[from] ContractError),
}

impl RenderError {
    /// Returns `true` when rendering cannot continue (the surface is gone for good).
    pub fn is_fatal(&self) -> bool {
        matches!(self, RenderError::Surface(SurfaceErrorAction::Fatal))
    }
}

/// Error from an operation that compiles shaders and allocates resources.
#[derive(Debug, Clone, Error)]
pub enum EngineError {
    #[error(transparent)]
    Shader(#[from] ShaderError),

    #[error(transparent)]
    Contract(#[from] ContractError),

    #[error(transparent)]
    Render(#[from] RenderError),
}
