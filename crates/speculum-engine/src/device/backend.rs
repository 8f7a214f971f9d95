use crate::cube::CubeFace;
use crate::error::{ContractError, RenderError, ShaderError};
use crate::render::ClearColor;
use crate::shader::{LinkedProgram, UniformValue};

macro_rules! resource_id {
    ($($(#[$meta:meta])* $name:ident),* $(,)?) => {
        $(
            $(#[$meta])*
            #[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, PartialOrd, Ord)]
            pub struct $name(pub(crate) u32);

            impl $name {
                #[inline]
                pub const fn index(self) -> usize {
                    self.0 as usize
                }
            }
        )*
    };
}

resource_id!(
    /// Linked shader program.
    ProgramId,
    /// Vertex or index buffer.
    BufferId,
    /// 2D or cube texture.
    TextureId,
    /// Depth buffer.
    RenderbufferId,
    /// Color + depth attachment pair.
    FramebufferId,
);

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum BufferUsage {
    Vertex,
    Index,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum TextureKind {
    D2,
    Cube,
}

impl TextureKind {
    #[inline]
    pub const fn layers(self) -> u32 {
        match self {
            TextureKind::D2 => 1,
            TextureKind::Cube => 6,
        }
    }
}

/// RGBA8 texture description.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct TextureDesc {
    pub kind: TextureKind,
    pub width: u32,
    pub height: u32,
    /// Request a mip chain. Backends without mip generation sample level 0.
    pub mipmapped: bool,
}

impl TextureDesc {
    /// Byte length of one RGBA8 layer.
    #[inline]
    pub fn layer_len(&self) -> usize {
        self.width as usize * self.height as usize * 4
    }
}

/// Color attachment of a framebuffer.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum ColorAttachment {
    Texture(TextureId),
    CubeFace(TextureId, CubeFace),
}

impl ColorAttachment {
    #[inline]
    pub fn texture(self) -> TextureId {
        match self {
            ColorAttachment::Texture(t) | ColorAttachment::CubeFace(t, _) => t,
        }
    }

    #[inline]
    pub fn layer(self) -> u32 {
        match self {
            ColorAttachment::Texture(_) => 0,
            ColorAttachment::CubeFace(_, face) => face.layer(),
        }
    }
}

/// Primitive topology of a draw.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Default)]
pub enum Topology {
    Points,
    Lines,
    LineStrip,
    Triangles,
    #[default]
    TriangleStrip,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct DrawCall {
    pub topology: Topology,
    /// Vertex count, or index count when `indexed`.
    pub count: u32,
    pub indexed: bool,
}

/// Graphics context with global bind state.
///
/// Bindings (program, framebuffer, attributes, textures) persist until replaced.
/// Callers must re-bind what they need instead of assuming earlier state.
pub trait Backend {
    /// Drawable size of the default (on-screen) target in physical pixels.
    fn surface_size(&self) -> (u32, u32);

    fn create_program(&mut self, program: &LinkedProgram) -> Result<ProgramId, ShaderError>;
    fn use_program(&mut self, program: Option<ProgramId>);
    fn current_program(&self) -> Option<ProgramId>;

    fn create_buffer(&mut self, usage: BufferUsage) -> BufferId;
    /// Replaces the whole contents of `buffer`.
    fn buffer_data(&mut self, buffer: BufferId, data: &[u8]);
    fn bind_attribute(&mut self, location: u32, buffer: BufferId, dimension: u32);
    fn bind_index_buffer(&mut self, buffer: BufferId);

    /// Sets a uniform of the current program.
    fn set_uniform(&mut self, binding: u32, value: &UniformValue);
    fn bind_texture(&mut self, binding: u32, texture: TextureId);

    fn create_texture(&mut self, desc: &TextureDesc) -> TextureId;
    /// Uploads one RGBA8 layer (cube faces are layers 0..6).
    fn write_texture(&mut self, texture: TextureId, layer: u32, rgba: &[u8]) -> Result<(), ContractError>;

    fn create_renderbuffer(&mut self, width: u32, height: u32) -> RenderbufferId;
    /// Pairs a color attachment with a depth buffer of the same size.
    fn create_framebuffer(
        &mut self,
        color: ColorAttachment,
        depth: RenderbufferId,
    ) -> Result<FramebufferId, ContractError>;
    /// `None` binds the default target.
    fn bind_framebuffer(&mut self, framebuffer: Option<FramebufferId>);
    fn current_framebuffer(&self) -> Option<FramebufferId>;

    fn viewport(&mut self, width: u32, height: u32);
    /// Clears color and depth of the bound target.
    fn clear(&mut self, color: ClearColor) -> Result<(), RenderError>;
    fn draw(&mut self, call: DrawCall) -> Result<(), RenderError>;
    /// Presents the default target if anything was drawn to it.
    fn present(&mut self) -> Result<(), RenderError>;
}
