use crate::device::{
    Backend, ColorAttachment, DrawCall, FramebufferId, RenderbufferId, TextureDesc, TextureId,
    TextureKind, Topology,
};
use crate::error::{ContractError, EngineError, RenderError};
use crate::shader::ShaderProgram;

use super::{BindScope, ClearColor};

/// Fixed draw parameters of a [`RenderTarget`].
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct FrameOptions {
    pub topology: Topology,
    /// Vertex count, or index count when `indexed`.
    pub count: u32,
    pub indexed: bool,
    pub clear_before_render: bool,
    pub clear_color: ClearColor,
    /// Allocate an owned color texture + depth buffer at the target's size.
    pub offscreen: bool,
}

impl Default for FrameOptions {
    fn default() -> Self {
        Self {
            topology: Topology::TriangleStrip,
            count: 0,
            indexed: false,
            clear_before_render: true,
            clear_color: ClearColor::black(),
            offscreen: false,
        }
    }
}

/// Where a render pass writes.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Destination {
    /// The default (on-screen) target, viewport = the target's size.
    Canvas,
    /// The target's own offscreen set.
    Offscreen,
    /// An externally owned framebuffer, e.g. one cube capture face.
    Framebuffer {
        id: FramebufferId,
        width: u32,
        height: u32,
    },
}

#[derive(Debug, Copy, Clone)]
struct OffscreenSet {
    framebuffer: FramebufferId,
    renderbuffer: RenderbufferId,
    texture: TextureId,
    width: u32,
    height: u32,
}

/// A shader program bound to fixed draw parameters ("frame").
///
/// Every resource is allocated by [`new`](Self::new); rendering only binds,
/// uploads and draws.
#[derive(Debug)]
pub struct RenderTarget {
    width: u32,
    height: u32,
    program: ShaderProgram,
    options: FrameOptions,
    offscreen: Option<OffscreenSet>,
}

impl RenderTarget {
    /// Compiles `program` and allocates the offscreen set when requested.
    pub fn new<B: Backend + ?Sized>(
        backend: &mut B,
        width: u32,
        height: u32,
        mut program: ShaderProgram,
        options: FrameOptions,
    ) -> Result<Self, EngineError> {
        if width == 0 || height == 0 {
            return Err(ContractError::ZeroSize("render target").into());
        }

        program.compile(backend)?;
        if options.indexed && !program.has_index_data() {
            return Err(ContractError::NoIndexData.into());
        }

        let offscreen = if options.offscreen {
            let texture = backend.create_texture(&TextureDesc {
                kind: TextureKind::D2,
                width,
                height,
                mipmapped: false,
            });
            let renderbuffer = backend.create_renderbuffer(width, height);
            let framebuffer = backend.create_framebuffer(ColorAttachment::Texture(texture), renderbuffer)?;
            log::debug!("render target offscreen set {width}x{height} -> {framebuffer:?}");
            Some(OffscreenSet {
                framebuffer,
                renderbuffer,
                texture,
                width,
                height,
            })
        } else {
            None
        };

        Ok(Self {
            width,
            height,
            program,
            options,
            offscreen,
        })
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Changes the on-screen viewport, e.g. after a window resize.
    ///
    /// The offscreen set keeps the size it was allocated with.
    pub fn set_size(&mut self, width: u32, height: u32) -> Result<(), ContractError> {
        if width == 0 || height == 0 {
            return Err(ContractError::ZeroSize("render target"));
        }
        self.width = width;
        self.height = height;
        Ok(())
    }

    #[inline]
    pub fn options(&self) -> &FrameOptions {
        &self.options
    }

    pub fn program(&self) -> &ShaderProgram {
        &self.program
    }

    pub fn program_mut(&mut self) -> &mut ShaderProgram {
        &mut self.program
    }

    /// Color texture of the offscreen set.
    pub fn texture(&self) -> Option<TextureId> {
        self.offscreen.map(|o| o.texture)
    }

    pub fn framebuffer(&self) -> Option<FramebufferId> {
        self.offscreen.map(|o| o.framebuffer)
    }

    pub fn renderbuffer(&self) -> Option<RenderbufferId> {
        self.offscreen.map(|o| o.renderbuffer)
    }

    /// Renders to the offscreen set when the target owns one, otherwise on screen.
    pub fn render<B: Backend + ?Sized>(&mut self, backend: &mut B, first_render: bool) -> Result<(), RenderError> {
        let destination = if self.offscreen.is_some() {
            Destination::Offscreen
        } else {
            Destination::Canvas
        };
        self.render_into(backend, destination, first_render)
    }

    pub fn render_to_canvas<B: Backend + ?Sized>(&mut self, backend: &mut B, first_render: bool) -> Result<(), RenderError> {
        self.render_into(backend, Destination::Canvas, first_render)
    }

    pub fn render_to_texture<B: Backend + ?Sized>(&mut self, backend: &mut B, first_render: bool) -> Result<(), RenderError> {
        self.render_into(backend, Destination::Offscreen, first_render)
    }

    /// Runs one pass into `destination`.
    ///
    /// Order: program, framebuffer, optional clear, viewport, attributes and
    /// uniforms, draw. The previous framebuffer and program are restored on
    /// return, including on error.
    pub fn render_into<B: Backend + ?Sized>(
        &mut self,
        backend: &mut B,
        destination: Destination,
        first_render: bool,
    ) -> Result<(), RenderError> {
        let (framebuffer, width, height) = match destination {
            Destination::Canvas => (None, self.width, self.height),
            Destination::Offscreen => {
                let set = self.offscreen.ok_or(ContractError::NoOffscreenTarget)?;
                (Some(set.framebuffer), set.width, set.height)
            }
            Destination::Framebuffer { id, width, height } => (Some(id), width, height),
        };
        let program = self.program.program_id().ok_or(RenderError::NoProgram)?;
        if self.options.indexed && !self.program.has_index_data() {
            return Err(ContractError::NoIndexData.into());
        }

        let mut scope = BindScope::new(backend);
        scope.use_program(Some(program));
        scope.bind_framebuffer(framebuffer);
        if self.options.clear_before_render {
            scope.clear(self.options.clear_color)?;
        }
        scope.viewport(width, height);

        self.program.send_attributes(&mut *scope, first_render);
        self.program.send_uniforms(&mut *scope);

        scope.draw(DrawCall {
            topology: self.options.topology,
            count: self.options.count,
            indexed: self.options.indexed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::Camera;
    use crate::device::{Command, HeadlessBackend};
    use crate::shader::{UniformType, UniformValue};

    const SKYBOX_VS: &str = r#"
@group(0) @binding(0) var<uniform> u_projection: mat4x4<f32>;
@group(0) @binding(1) var<uniform> u_view: mat4x4<f32>;

struct VsOut {
    @builtin(position) clip: vec4<f32>,
    @location(0) dir: vec3<f32>,
};

@vertex
fn vs_main(@location(0) a_position: vec3<f32>) -> VsOut {
    var out: VsOut;
    out.clip = u_projection * u_view * vec4<f32>(a_position, 1.0);
    out.dir = a_position;
    return out;
}
"#;

    const SKYBOX_FS: &str = r#"
@group(0) @binding(2) var t_sky: texture_cube<f32>;
@group(0) @binding(3) var s_sky: sampler;

@fragment
fn fs_main(@location(0) dir: vec3<f32>) -> @location(0) vec4<f32> {
    return textureSample(t_sky, s_sky, dir);
}
"#;

    const FLAT_VS: &str = r#"
@vertex
fn vs_main(@location(0) a_position: vec2<f32>) -> @builtin(position) vec4<f32> {
    return vec4<f32>(a_position, 0.0, 1.0);
}
"#;

    const FLAT_FS: &str = r#"
@group(0) @binding(0) var<uniform> u_color: vec4<f32>;

@fragment
fn fs_main() -> @location(0) vec4<f32> {
    return u_color;
}
"#;

    fn cube_corners() -> (Vec<f32>, Vec<u16>) {
        let mut positions = Vec::with_capacity(24);
        for i in 0..8u16 {
            for bit in [1, 2, 4] {
                positions.push(if i & bit == 0 { -1.0 } else { 1.0 });
            }
        }
        let indices: Vec<u16> = (0..36).map(|i| (i % 8) as u16).collect();
        (positions, indices)
    }

    fn position(commands: &[Command], wanted: impl Fn(&Command) -> bool) -> usize {
        commands.iter().position(|c| wanted(c)).unwrap()
    }

    fn sky_texture(backend: &mut HeadlessBackend) -> TextureId {
        backend.create_texture(&TextureDesc {
            kind: TextureKind::Cube,
            width: 1,
            height: 1,
            mipmapped: false,
        })
    }

    fn skybox(backend: &mut HeadlessBackend, camera: &Camera) -> RenderTarget {
        let (positions, indices) = cube_corners();
        let program = ShaderProgram::builder(SKYBOX_VS, SKYBOX_FS)
            .indexed_attribute("position", "a_position", 3, &positions, &indices)
            .uniform(
                "projection",
                "u_projection",
                UniformType::Mat4,
                Some(&camera.projection_matrix().to_cols_array()),
            )
            .uniform("view", "u_view", UniformType::Mat4, Some(&camera.view_matrix().to_cols_array()))
            .texture("sky", "t_sky")
            .build()
            .unwrap();

        let sky = sky_texture(backend);
        let mut target = RenderTarget::new(
            backend,
            64,
            48,
            program,
            FrameOptions {
                topology: Topology::Triangles,
                count: 36,
                indexed: true,
                ..FrameOptions::default()
            },
        )
        .unwrap();
        target.program_mut().set_texture("sky", sky).unwrap();
        target
    }

    fn flat(backend: &mut HeadlessBackend, options: FrameOptions) -> RenderTarget {
        let program = ShaderProgram::builder(FLAT_VS, FLAT_FS)
            .attribute("position", "a_position", 2, &[-1.0, -1.0, 1.0, -1.0, -1.0, 1.0, 1.0, 1.0])
            .uniform("color", "u_color", UniformType::Vec4, Some(&[1.0, 0.0, 0.0, 1.0]))
            .build()
            .unwrap();
        RenderTarget::new(
            backend,
            8,
            8,
            program,
            FrameOptions {
                count: 4,
                ..options
            },
        )
        .unwrap()
    }

    // ── canvas ────────────────────────────────────────────────────────────

    #[test]
    fn skybox_renders_one_clear_and_one_draw_with_camera_uniforms() {
        let mut backend = HeadlessBackend::new(64, 48);
        let camera = Camera::default();
        let mut target = skybox(&mut backend, &camera);
        backend.take_commands();

        target.render(&mut backend, true).unwrap();

        let passes: Vec<&Command> = backend
            .commands()
            .iter()
            .filter(|c| matches!(c, Command::Clear { .. } | Command::Draw { .. }))
            .collect();
        assert_eq!(passes.len(), 2);
        assert!(matches!(passes[0], Command::Clear { framebuffer: None, .. }));
        assert!(matches!(
            passes[1],
            Command::Draw {
                framebuffer: None,
                call: DrawCall {
                    topology: Topology::Triangles,
                    count: 36,
                    indexed: true,
                },
            }
        ));

        let draw = &backend.draws()[0];
        assert_eq!(draw.viewport, (64, 48));
        assert_eq!(
            draw.uniforms.get(&0),
            Some(&UniformValue::from(camera.projection_matrix()))
        );
        assert_eq!(draw.uniforms.get(&1), Some(&UniformValue::from(camera.view_matrix())));
    }

    #[test]
    fn steps_run_in_order() {
        let mut backend = HeadlessBackend::new(64, 48);
        let mut target = skybox(&mut backend, &Camera::default());
        let program = target.program().program_id();
        backend.take_commands();

        target.render(&mut backend, true).unwrap();

        let commands = backend.take_commands();
        let use_program = position(&commands, |c| *c == Command::UseProgram(program));
        let clear = position(&commands, |c| matches!(c, Command::Clear { .. }));
        let viewport = position(&commands, |c| *c == Command::Viewport(64, 48));
        let upload = position(&commands, |c| matches!(c, Command::BufferData { .. }));
        let draw = position(&commands, |c| matches!(c, Command::Draw { .. }));
        assert!(use_program < clear && clear < viewport && viewport < upload && upload < draw);
    }

    #[test]
    fn later_frames_skip_geometry_upload() {
        let mut backend = HeadlessBackend::new(64, 48);
        let mut target = skybox(&mut backend, &Camera::default());

        target.render(&mut backend, true).unwrap();
        for _ in 0..10 {
            target.render(&mut backend, false).unwrap();
        }

        let uploads = backend
            .commands()
            .iter()
            .filter(|c| matches!(c, Command::BufferData { .. }))
            .count();
        assert_eq!(uploads, 2);
        assert_eq!(backend.draws().len(), 11);
    }

    #[test]
    fn clear_can_be_disabled() {
        let mut backend = HeadlessBackend::new(8, 8);
        let mut target = flat(
            &mut backend,
            FrameOptions {
                clear_before_render: false,
                ..FrameOptions::default()
            },
        );
        target.render(&mut backend, true).unwrap();
        assert!(!backend.commands().iter().any(|c| matches!(c, Command::Clear { .. })));
        assert_eq!(backend.draws()[0].call.topology, Topology::TriangleStrip);
    }

    // ── offscreen ─────────────────────────────────────────────────────────

    #[test]
    fn offscreen_target_clears_its_own_texture_and_restores_default() {
        let mut backend = HeadlessBackend::new(8, 8);
        let mut target = flat(
            &mut backend,
            FrameOptions {
                offscreen: true,
                clear_color: ClearColor::new(0.0, 1.0, 0.0, 1.0),
                ..FrameOptions::default()
            },
        );
        let texture = target.texture().unwrap();

        target.render(&mut backend, true).unwrap();

        let texels = backend.read_texture(texture, 0).unwrap();
        assert!(texels.chunks_exact(4).all(|px| px == [0, 255, 0, 255]));
        assert!(backend.surface_pixels().iter().all(|&b| b == 0));
        assert_eq!(backend.draws()[0].framebuffer, target.framebuffer());
        assert_eq!(backend.current_framebuffer(), None);
        assert_eq!(backend.current_program(), None);
    }

    #[test]
    fn render_to_texture_without_offscreen_set_is_a_contract_error() {
        let mut backend = HeadlessBackend::new(8, 8);
        let mut target = flat(&mut backend, FrameOptions::default());
        let err = target.render_to_texture(&mut backend, true).unwrap_err();
        assert!(matches!(err, RenderError::Contract(ContractError::NoOffscreenTarget)));
        assert!(backend.draws().is_empty());
    }

    #[test]
    fn external_framebuffer_sets_its_own_viewport() {
        let mut backend = HeadlessBackend::new(8, 8);
        let tex = backend.create_texture(&TextureDesc {
            kind: TextureKind::D2,
            width: 16,
            height: 16,
            mipmapped: false,
        });
        let depth = backend.create_renderbuffer(16, 16);
        let fb = backend
            .create_framebuffer(ColorAttachment::Texture(tex), depth)
            .unwrap();

        let mut target = flat(&mut backend, FrameOptions::default());
        target
            .render_into(
                &mut backend,
                Destination::Framebuffer {
                    id: fb,
                    width: 16,
                    height: 16,
                },
                true,
            )
            .unwrap();
        assert_eq!(backend.draws()[0].viewport, (16, 16));
        assert_eq!(backend.draws()[0].framebuffer, Some(fb));
    }

    #[test]
    fn resizing_moves_the_canvas_viewport_only() {
        let mut backend = HeadlessBackend::new(8, 8);
        let mut target = flat(
            &mut backend,
            FrameOptions {
                offscreen: true,
                ..FrameOptions::default()
            },
        );
        target.set_size(32, 16).unwrap();
        assert_eq!(target.set_size(0, 16), Err(ContractError::ZeroSize("render target")));

        target.render_to_canvas(&mut backend, true).unwrap();
        target.render_to_texture(&mut backend, false).unwrap();

        assert_eq!(backend.draws()[0].viewport, (32, 16));
        assert_eq!(backend.draws()[1].viewport, (8, 8));
    }

    // ── errors ────────────────────────────────────────────────────────────

    #[test]
    fn failed_draw_still_restores_bind_state() {
        let mut backend = HeadlessBackend::new(64, 48);
        let (positions, indices) = cube_corners();
        let program = ShaderProgram::builder(SKYBOX_VS, SKYBOX_FS)
            .indexed_attribute("position", "a_position", 3, &positions, &indices)
            .build()
            .unwrap();
        let mut target = RenderTarget::new(
            &mut backend,
            64,
            48,
            program,
            FrameOptions {
                offscreen: true,
                count: 36,
                indexed: true,
                ..FrameOptions::default()
            },
        )
        .unwrap();

        let err = target.render(&mut backend, true).unwrap_err();
        assert!(matches!(err, RenderError::MissingTexture { binding: 2 }));
        assert_eq!(backend.current_framebuffer(), None);
        assert_eq!(backend.current_program(), None);
    }

    #[test]
    fn indexed_target_without_index_data_is_rejected() {
        let mut backend = HeadlessBackend::new(8, 8);
        let program = ShaderProgram::builder(FLAT_VS, FLAT_FS)
            .attribute("position", "a_position", 2, &[-1.0, -1.0, 1.0, -1.0, -1.0, 1.0])
            .uniform("color", "u_color", UniformType::Vec4, Some(&[1.0, 0.0, 0.0, 1.0]))
            .build()
            .unwrap();
        let err = RenderTarget::new(
            &mut backend,
            8,
            8,
            program,
            FrameOptions {
                count: 3,
                indexed: true,
                ..FrameOptions::default()
            },
        )
        .unwrap_err();
        assert!(matches!(err, EngineError::Contract(ContractError::NoIndexData)));
    }

    #[test]
    fn indexed_draw_never_reuses_another_programs_index_buffer() {
        let mut backend = HeadlessBackend::new(64, 48);
        let mut sky = skybox(&mut backend, &Camera::default());
        sky.render(&mut backend, true).unwrap();

        // Swap in a compiled program that carries no indices.
        let mut target = skybox(&mut backend, &Camera::default());
        let mut plain = ShaderProgram::builder(FLAT_VS, FLAT_FS)
            .attribute("position", "a_position", 2, &[-1.0, -1.0, 1.0, -1.0, -1.0, 1.0])
            .uniform("color", "u_color", UniformType::Vec4, Some(&[1.0, 0.0, 0.0, 1.0]))
            .build()
            .unwrap();
        plain.compile(&mut backend).unwrap();
        *target.program_mut() = plain;

        let err = target.render(&mut backend, true).unwrap_err();
        assert!(matches!(err, RenderError::Contract(ContractError::NoIndexData)));
        assert_eq!(backend.draws().len(), 1);
        assert_eq!(backend.current_program(), None);
    }

    #[test]
    fn zero_size_is_rejected() {
        let mut backend = HeadlessBackend::new(8, 8);
        let program = ShaderProgram::builder(FLAT_VS, FLAT_FS).build().unwrap();
        let err = RenderTarget::new(&mut backend, 0, 8, program, FrameOptions::default()).unwrap_err();
        assert!(matches!(err, EngineError::Contract(ContractError::ZeroSize(_))));
    }
}
