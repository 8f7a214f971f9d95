//! Render passes.
//!
//! A [`RenderTarget`] is one shader program with fixed draw parameters, rendered
//! on screen or into an offscreen texture. Bind state changes made by a pass are
//! scoped with [`BindScope`].

mod bind;
mod color;
mod target;

pub use bind::BindScope;
pub use color::ClearColor;
pub use target::{Destination, FrameOptions, RenderTarget};
