//! Cube-map capture.
//!
//! [`CubeFace`] fixes the face order (`x+, x-, y+, y-, z+, z-`) shared by cube
//! texture layers, capture cameras and face image sets. [`CubeCapture`] renders a
//! scene from one point into all six faces of a cube texture.

mod capture;
mod face;

pub use capture::{CaptureFace, CubeCapture, CAPTURE_FAR_PLANE, CAPTURE_FOV};
pub use face::{CubeFace, CubeFaces};
