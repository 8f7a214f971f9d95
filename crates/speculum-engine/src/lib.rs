//! Speculum engine crate.
//!
//! Cube-map reflection rendering core: cameras, a six-face capture rig, typed
//! shader bindings, render targets and an animated scene, on top of a small
//! graphics [`Backend`](device::Backend) with a wgpu and a headless implementation.

pub mod camera;
pub mod core;
pub mod cube;
pub mod device;
pub mod error;
pub mod logging;
pub mod render;
pub mod scene;
pub mod shader;
pub mod transform;
pub mod window;

pub use camera::Camera;
pub use error::{ContractError, EngineError, RenderError, ShaderError};
pub use transform::Transform;
