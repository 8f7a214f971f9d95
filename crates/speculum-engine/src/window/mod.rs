//! Window + event loop.
//!
//! Owns the `winit` EventLoop and the single window, and hands the window's
//! [`WgpuBackend`](crate::device::WgpuBackend) to the application.

mod runtime;

pub use runtime::{Runtime, RuntimeConfig};
