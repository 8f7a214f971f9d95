//! Graphics context.
//!
//! This module is responsible for:
//! - the [`Backend`] contract: global bind state plus resource creation
//! - [`WgpuBackend`]: wgpu device/queue and the window surface
//! - [`HeadlessBackend`]: in-memory implementation for tests and tooling

mod backend;
mod error;
mod gpu;
mod headless;
mod init;
mod surface;

pub use backend::{
    Backend, BufferId, BufferUsage, ColorAttachment, DrawCall, FramebufferId, ProgramId,
    RenderbufferId, TextureDesc, TextureId, TextureKind, Topology,
};
pub use error::SurfaceErrorAction;
pub use gpu::WgpuBackend;
pub use headless::{Command, DrawRecord, HeadlessBackend};
pub use init::GpuInit;
