//! Deterministic in-memory backend.
//!
//! Keeps RGBA8 texels for every texture and for the default surface, fills them on
//! `clear`, and records every state change and draw. Draws are not rasterized; the
//! [`DrawRecord`] log captures what the GPU would have received.

use std::collections::{BTreeMap, HashMap};

use crate::error::{ContractError, RenderError, ShaderError};
use crate::render::ClearColor;
use crate::shader::{LinkedProgram, ResourceKind, UniformValue};

use super::{
    Backend, BufferId, BufferUsage, ColorAttachment, DrawCall, FramebufferId, ProgramId,
    RenderbufferId, TextureDesc, TextureId,
};

/// State-changing operation observed by the backend, in call order.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    UseProgram(Option<ProgramId>),
    BindFramebuffer(Option<FramebufferId>),
    Viewport(u32, u32),
    BufferData { buffer: BufferId, len: usize },
    Clear { framebuffer: Option<FramebufferId>, color: ClearColor },
    Draw { framebuffer: Option<FramebufferId>, call: DrawCall },
    Present,
}

/// Snapshot of the bind state at one draw.
#[derive(Debug, Clone, PartialEq)]
pub struct DrawRecord {
    pub program: ProgramId,
    pub framebuffer: Option<FramebufferId>,
    pub viewport: (u32, u32),
    pub call: DrawCall,
    pub uniforms: BTreeMap<u32, UniformValue>,
    pub textures: BTreeMap<u32, TextureId>,
    pub attributes: BTreeMap<u32, (BufferId, u32)>,
    pub index_buffer: Option<BufferId>,
}

struct BufferEntry {
    usage: BufferUsage,
    data: Vec<u8>,
    uploads: u32,
}

struct TextureEntry {
    desc: TextureDesc,
    layers: Vec<Vec<u8>>,
}

#[derive(Default)]
pub struct HeadlessBackend {
    size: (u32, u32),
    surface: Vec<u8>,

    programs: Vec<LinkedProgram>,
    buffers: Vec<BufferEntry>,
    textures: Vec<TextureEntry>,
    renderbuffers: Vec<(u32, u32)>,
    framebuffers: Vec<(ColorAttachment, RenderbufferId)>,

    program: Option<ProgramId>,
    framebuffer: Option<FramebufferId>,
    viewport: (u32, u32),
    attributes: BTreeMap<u32, (BufferId, u32)>,
    index_buffer: Option<BufferId>,
    bound_textures: BTreeMap<u32, TextureId>,
    uniforms: HashMap<ProgramId, BTreeMap<u32, UniformValue>>,

    commands: Vec<Command>,
    draws: Vec<DrawRecord>,
    presents: u32,
}

impl HeadlessBackend {
    /// Creates a backend whose default surface is `width x height`, cleared to zero.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            size: (width, height),
            surface: vec![0; width as usize * height as usize * 4],
            viewport: (width, height),
            ..Self::default()
        }
    }

    /// Ordered state changes since creation (or the last [`take_commands`](Self::take_commands)).
    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    pub fn take_commands(&mut self) -> Vec<Command> {
        std::mem::take(&mut self.commands)
    }

    pub fn draws(&self) -> &[DrawRecord] {
        &self.draws
    }

    pub fn present_count(&self) -> u32 {
        self.presents
    }

    /// Number of `buffer_data` calls received by `buffer`.
    pub fn upload_count(&self, buffer: BufferId) -> u32 {
        self.buffers.get(buffer.index()).map_or(0, |b| b.uploads)
    }

    pub fn buffer_contents(&self, buffer: BufferId) -> Option<&[u8]> {
        self.buffers.get(buffer.index()).map(|b| b.data.as_slice())
    }

    pub fn buffer_usage(&self, buffer: BufferId) -> Option<BufferUsage> {
        self.buffers.get(buffer.index()).map(|b| b.usage)
    }

    pub fn texture_desc(&self, texture: TextureId) -> Option<TextureDesc> {
        self.textures.get(texture.index()).map(|t| t.desc)
    }

    /// RGBA8 texels of one texture layer.
    pub fn read_texture(&self, texture: TextureId, layer: u32) -> Option<&[u8]> {
        self.textures
            .get(texture.index())
            .and_then(|t| t.layers.get(layer as usize))
            .map(|l| l.as_slice())
    }

    pub fn surface_pixels(&self) -> &[u8] {
        &self.surface
    }

    pub fn framebuffer_attachments(
        &self,
        framebuffer: FramebufferId,
    ) -> Option<(ColorAttachment, RenderbufferId)> {
        self.framebuffers.get(framebuffer.index()).copied()
    }

    pub fn renderbuffer_size(&self, renderbuffer: RenderbufferId) -> Option<(u32, u32)> {
        self.renderbuffers.get(renderbuffer.index()).copied()
    }

    /// Resizes the default surface, discarding its contents.
    pub fn resize(&mut self, width: u32, height: u32) {
        self.size = (width, height);
        self.surface = vec![0; width as usize * height as usize * 4];
    }

    fn bound_pixels(&mut self) -> Option<&mut Vec<u8>> {
        let Some(fb) = self.framebuffer else {
            return Some(&mut self.surface);
        };
        let (color, _) = *self.framebuffers.get(fb.index())?;
        self.textures
            .get_mut(color.texture().index())?
            .layers
            .get_mut(color.layer() as usize)
    }
}

impl Backend for HeadlessBackend {
    fn surface_size(&self) -> (u32, u32) {
        self.size
    }

    fn create_program(&mut self, program: &LinkedProgram) -> Result<ProgramId, ShaderError> {
        let id = ProgramId(self.programs.len() as u32);
        self.programs.push(program.clone());
        Ok(id)
    }

    fn use_program(&mut self, program: Option<ProgramId>) {
        self.program = program;
        self.commands.push(Command::UseProgram(program));
    }

    fn current_program(&self) -> Option<ProgramId> {
        self.program
    }

    fn create_buffer(&mut self, usage: BufferUsage) -> BufferId {
        let id = BufferId(self.buffers.len() as u32);
        self.buffers.push(BufferEntry {
            usage,
            data: Vec::new(),
            uploads: 0,
        });
        id
    }

    fn buffer_data(&mut self, buffer: BufferId, data: &[u8]) {
        let Some(entry) = self.buffers.get_mut(buffer.index()) else {
            log::warn!("buffer_data on unknown buffer {buffer:?}");
            return;
        };
        entry.data.clear();
        entry.data.extend_from_slice(data);
        entry.uploads += 1;
        self.commands.push(Command::BufferData {
            buffer,
            len: data.len(),
        });
    }

    fn bind_attribute(&mut self, location: u32, buffer: BufferId, dimension: u32) {
        self.attributes.insert(location, (buffer, dimension));
    }

    fn bind_index_buffer(&mut self, buffer: BufferId) {
        self.index_buffer = Some(buffer);
    }

    fn set_uniform(&mut self, binding: u32, value: &UniformValue) {
        let Some(program) = self.program else {
            log::warn!("set_uniform({binding}) with no program bound; ignored");
            return;
        };
        self.uniforms.entry(program).or_default().insert(binding, *value);
    }

    fn bind_texture(&mut self, binding: u32, texture: TextureId) {
        self.bound_textures.insert(binding, texture);
    }

    fn create_texture(&mut self, desc: &TextureDesc) -> TextureId {
        let id = TextureId(self.textures.len() as u32);
        self.textures.push(TextureEntry {
            desc: *desc,
            layers: vec![vec![0; desc.layer_len()]; desc.kind.layers() as usize],
        });
        id
    }

    fn write_texture(&mut self, texture: TextureId, layer: u32, rgba: &[u8]) -> Result<(), ContractError> {
        let entry = self
            .textures
            .get_mut(texture.index())
            .ok_or_else(|| ContractError::UnknownName {
                kind: "texture",
                name: format!("{texture:?}"),
            })?;

        let expected = entry.desc.layer_len();
        if rgba.len() != expected {
            return Err(ContractError::PixelData {
                expected,
                got: rgba.len(),
            });
        }

        let Some(dst) = entry.layers.get_mut(layer as usize) else {
            return Err(ContractError::UnknownName {
                kind: "texture layer",
                name: layer.to_string(),
            });
        };
        dst.copy_from_slice(rgba);
        Ok(())
    }

    fn create_renderbuffer(&mut self, width: u32, height: u32) -> RenderbufferId {
        let id = RenderbufferId(self.renderbuffers.len() as u32);
        self.renderbuffers.push((width, height));
        id
    }

    fn create_framebuffer(
        &mut self,
        color: ColorAttachment,
        depth: RenderbufferId,
    ) -> Result<FramebufferId, ContractError> {
        let desc = self
            .texture_desc(color.texture())
            .ok_or_else(|| ContractError::UnknownName {
                kind: "texture",
                name: format!("{:?}", color.texture()),
            })?;
        if color.layer() >= desc.kind.layers() {
            return Err(ContractError::UnknownName {
                kind: "texture layer",
                name: color.layer().to_string(),
            });
        }
        let depth_size = self
            .renderbuffer_size(depth)
            .ok_or_else(|| ContractError::UnknownName {
                kind: "renderbuffer",
                name: format!("{depth:?}"),
            })?;
        if depth_size != (desc.width, desc.height) {
            return Err(ContractError::AttachmentMismatch {
                color: (desc.width, desc.height),
                depth: depth_size,
            });
        }

        let id = FramebufferId(self.framebuffers.len() as u32);
        self.framebuffers.push((color, depth));
        Ok(id)
    }

    fn bind_framebuffer(&mut self, framebuffer: Option<FramebufferId>) {
        self.framebuffer = framebuffer;
        self.commands.push(Command::BindFramebuffer(framebuffer));
    }

    fn current_framebuffer(&self) -> Option<FramebufferId> {
        self.framebuffer
    }

    fn viewport(&mut self, width: u32, height: u32) {
        self.viewport = (width, height);
        self.commands.push(Command::Viewport(width, height));
    }

    fn clear(&mut self, color: ClearColor) -> Result<(), RenderError> {
        let framebuffer = self.framebuffer;
        let texel = color.to_rgba8();

        if let Some(pixels) = self.bound_pixels() {
            for px in pixels.chunks_exact_mut(4) {
                px.copy_from_slice(&texel);
            }
        }

        self.commands.push(Command::Clear { framebuffer, color });
        Ok(())
    }

    fn draw(&mut self, call: DrawCall) -> Result<(), RenderError> {
        let program = self.program.ok_or(RenderError::NoProgram)?;
        let linked = self
            .programs
            .get(program.index())
            .ok_or(RenderError::NoProgram)?;

        for input in &linked.vertex.inputs {
            if !self.attributes.contains_key(&input.location) {
                return Err(RenderError::MissingAttribute {
                    location: input.location,
                });
            }
        }
        for r in &linked.resources {
            let ResourceKind::Texture(kind) = r.kind else { continue };
            let texture = self
                .bound_textures
                .get(&r.binding)
                .and_then(|t| self.textures.get(t.index()))
                .ok_or(RenderError::MissingTexture { binding: r.binding })?;
            if texture.desc.kind != kind {
                return Err(RenderError::TextureKindMismatch { binding: r.binding });
            }
        }
        if call.indexed && self.index_buffer.is_none() {
            return Err(RenderError::MissingIndexBuffer);
        }

        self.draws.push(DrawRecord {
            program,
            framebuffer: self.framebuffer,
            viewport: self.viewport,
            call,
            uniforms: self.uniforms.get(&program).cloned().unwrap_or_default(),
            textures: self.bound_textures.clone(),
            attributes: self.attributes.clone(),
            index_buffer: self.index_buffer,
        });
        self.commands.push(Command::Draw {
            framebuffer: self.framebuffer,
            call,
        });
        Ok(())
    }

    fn present(&mut self) -> Result<(), RenderError> {
        self.presents += 1;
        self.commands.push(Command::Present);
        Ok(())
    }
}
