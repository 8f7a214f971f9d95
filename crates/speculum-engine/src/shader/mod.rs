//! Shader programs and typed bindings.
//!
//! - [`reflect`]: WGSL parse/validate and interface reflection (`naga`)
//! - [`ShaderProgram`]: declared attribute/uniform/texture slots resolved against
//!   the compiled program, with upload rules for each kind
//! - [`UniformValue`]: tagged uniform data

mod program;
mod reflect;
mod value;

pub use program::{ShaderProgram, ShaderProgramBuilder};
pub use reflect::{
    compile_stage, link, InterfaceVar, LinkedProgram, Resource, ResourceKind, Stage,
    StageInterface,
};
pub use value::{UniformType, UniformValue};
