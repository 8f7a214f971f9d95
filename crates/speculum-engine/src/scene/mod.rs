//! Scene orchestration.
//!
//! A [`Scene`] owns the graphics backend, the named render targets and textures,
//! and the animation [`FrameScheduler`]. The host forwards its frame callbacks to
//! [`Scene::on_host_frame`]; the scene decides whether the draw callback runs.

mod registry;
mod scheduler;

use std::time::{Duration, Instant};

use crate::cube::CubeFaces;
use crate::device::{Backend, TextureDesc, TextureId, TextureKind};
use crate::error::{ContractError, EngineError, RenderError};
use crate::render::RenderTarget;

pub use registry::{Handle, Registry};
pub use scheduler::{FrameScheduler, SchedulerState, ThrottlePolicy, TickDecision, DEFAULT_FRAME_RATE};

pub type TargetHandle = Handle<RenderTarget>;
pub type TextureHandle = Handle<TextureId>;

/// Scene configuration.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct SceneConfig {
    /// Draw-rate ceiling while animating, in Hz.
    pub frame_rate: u32,
    pub throttle: ThrottlePolicy,
}

impl Default for SceneConfig {
    fn default() -> Self {
        Self {
            frame_rate: DEFAULT_FRAME_RATE,
            throttle: ThrottlePolicy::default(),
        }
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum RenderMode {
    /// Draw exactly once, synchronously.
    Once,
    /// Draw on host frame callbacks until animation is toggled off.
    Animate,
}

/// Passed to the draw callback. Valid for one call.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct DrawContext {
    /// Set only on the very first executed draw; gates one-time uploads.
    pub first_render: bool,
    pub animate: bool,
    /// Time since the first draw started.
    pub elapsed: Duration,
    /// Number of draws finished before this one.
    pub frame_index: u64,
}

/// Draw callback stored by [`Scene::render`].
pub type DrawFn<B> = Box<dyn FnMut(&mut SceneContext<B>, &DrawContext) -> Result<(), RenderError>>;

/// Backend plus the named resources registered with the scene.
pub struct SceneContext<B: Backend> {
    backend: B,
    targets: Registry<RenderTarget>,
    textures: Registry<TextureId>,
}

impl<B: Backend> SceneContext<B> {
    #[inline]
    pub fn backend(&self) -> &B {
        &self.backend
    }

    #[inline]
    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn register_target(&mut self, name: &str, target: RenderTarget) -> Result<TargetHandle, ContractError> {
        self.targets.register(name, target)
    }

    /// Handle of the target registered under `name`.
    pub fn target_handle(&self, name: &str) -> Result<TargetHandle, ContractError> {
        self.targets.lookup(name)
    }

    pub fn target(&self, name: &str) -> Result<&RenderTarget, ContractError> {
        self.targets.by_name(name)
    }

    pub fn target_mut(&mut self, name: &str) -> Result<&mut RenderTarget, ContractError> {
        self.targets.by_name_mut(name)
    }

    pub fn target_by_handle(&mut self, handle: TargetHandle) -> Result<&mut RenderTarget, ContractError> {
        self.targets
            .get_mut(handle)
            .ok_or_else(|| ContractError::UnknownName {
                kind: "target",
                name: format!("{handle:?}"),
            })
    }

    pub fn register_texture(&mut self, name: &str, texture: TextureId) -> Result<TextureHandle, ContractError> {
        self.textures.register(name, texture)
    }

    pub fn texture_handle(&self, name: &str) -> Result<TextureHandle, ContractError> {
        self.textures.lookup(name)
    }

    pub fn texture(&self, name: &str) -> Result<TextureId, ContractError> {
        self.textures.by_name(name).copied()
    }

    pub fn texture_by_handle(&self, handle: TextureHandle) -> Option<TextureId> {
        self.textures.get(handle).copied()
    }

    /// Creates and registers an RGBA8 2D texture. Power-of-two sizes request mipmaps.
    pub fn create_texture_2d(
        &mut self,
        name: &str,
        width: u32,
        height: u32,
        rgba: &[u8],
    ) -> Result<TextureHandle, EngineError> {
        self.textures.ensure_vacant(name)?;
        if width == 0 || height == 0 {
            return Err(ContractError::ZeroSize("texture").into());
        }
        let desc = TextureDesc {
            kind: TextureKind::D2,
            width,
            height,
            mipmapped: width.is_power_of_two() && height.is_power_of_two(),
        };
        check_pixels(&desc, rgba)?;

        let texture = self.backend.create_texture(&desc);
        self.backend.write_texture(texture, 0, rgba)?;
        Ok(self.textures.register(name, texture)?)
    }

    /// Creates and registers a cube texture from six `size x size` RGBA8 images.
    ///
    /// Faces are uploaded in `x+, x-, y+, y-, z+, z-` order and must already follow
    /// the cube-map orientation; nothing is flipped.
    pub fn create_cube_texture<P: AsRef<[u8]>>(
        &mut self,
        name: &str,
        size: u32,
        faces: &CubeFaces<P>,
    ) -> Result<TextureHandle, EngineError> {
        self.textures.ensure_vacant(name)?;
        if size == 0 {
            return Err(ContractError::ZeroSize("cube texture").into());
        }
        let desc = TextureDesc {
            kind: TextureKind::Cube,
            width: size,
            height: size,
            mipmapped: false,
        };
        for (_, pixels) in faces.iter() {
            check_pixels(&desc, pixels.as_ref())?;
        }

        let texture = self.backend.create_texture(&desc);
        for (face, pixels) in faces.iter() {
            self.backend.write_texture(texture, face.layer(), pixels.as_ref())?;
        }
        Ok(self.textures.register(name, texture)?)
    }

    /// Renders the target registered under `name`.
    pub fn render_target(&mut self, name: &str, first_render: bool) -> Result<(), RenderError> {
        let target = self.targets.by_name_mut(name)?;
        target.render(&mut self.backend, first_render)
    }

    /// Split borrow for render paths that need a target and the backend at once.
    pub fn parts_mut(&mut self) -> (&mut B, &mut Registry<RenderTarget>, &Registry<TextureId>) {
        (&mut self.backend, &mut self.targets, &self.textures)
    }
}

fn check_pixels(desc: &TextureDesc, rgba: &[u8]) -> Result<(), ContractError> {
    let expected = desc.layer_len();
    if rgba.len() != expected {
        return Err(ContractError::PixelData {
            expected,
            got: rgba.len(),
        });
    }
    Ok(())
}

/// Graphics context, named resources and animation scheduler.
pub struct Scene<B: Backend> {
    ctx: SceneContext<B>,
    scheduler: FrameScheduler,
    draw: Option<DrawFn<B>>,
}

impl<B: Backend> Scene<B> {
    pub fn new(backend: B, config: SceneConfig) -> Self {
        Self {
            ctx: SceneContext {
                backend,
                targets: Registry::new("target"),
                textures: Registry::new("texture"),
            },
            scheduler: FrameScheduler::new(config.frame_rate, config.throttle),
            draw: None,
        }
    }

    #[inline]
    pub fn context(&self) -> &SceneContext<B> {
        &self.ctx
    }

    #[inline]
    pub fn context_mut(&mut self) -> &mut SceneContext<B> {
        &mut self.ctx
    }

    #[inline]
    pub fn backend(&self) -> &B {
        &self.ctx.backend
    }

    #[inline]
    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.ctx.backend
    }

    pub fn register_target(&mut self, name: &str, target: RenderTarget) -> Result<TargetHandle, ContractError> {
        self.ctx.register_target(name, target)
    }

    pub fn target(&self, name: &str) -> Result<&RenderTarget, ContractError> {
        self.ctx.target(name)
    }

    pub fn register_texture(&mut self, name: &str, texture: TextureId) -> Result<TextureHandle, ContractError> {
        self.ctx.register_texture(name, texture)
    }

    pub fn texture(&self, name: &str) -> Result<TextureId, ContractError> {
        self.ctx.texture(name)
    }

    #[inline]
    pub fn scheduler(&self) -> &FrameScheduler {
        &self.scheduler
    }

    /// Installs `draw` and starts rendering.
    ///
    /// [`RenderMode::Once`] runs `draw` exactly once before returning and leaves
    /// the scene idle. [`RenderMode::Animate`] requests host frames; `draw` then
    /// runs from [`on_host_frame`](Self::on_host_frame).
    pub fn render<F>(&mut self, mode: RenderMode, now: Instant, draw: F) -> Result<(), RenderError>
    where
        F: FnMut(&mut SceneContext<B>, &DrawContext) -> Result<(), RenderError> + 'static,
    {
        self.draw = Some(Box::new(draw));
        match mode {
            RenderMode::Once => {
                self.scheduler.stop();
                match self.scheduler.poll_immediate(now) {
                    TickDecision::Draw { first_render } => self.execute(now, first_render),
                    decision => {
                        log::warn!("render(Once) skipped: {decision:?}");
                        Ok(())
                    }
                }
            }
            RenderMode::Animate => {
                self.scheduler.start();
                Ok(())
            }
        }
    }

    /// Host frame callback; runs the draw when the scheduler allows it.
    ///
    /// Before [`render`](Self::render) has installed a draw callback the tick is
    /// ignored and the scheduler is left untouched.
    pub fn on_host_frame(&mut self, now: Instant) -> Result<TickDecision, RenderError> {
        if self.draw.is_none() {
            return Ok(TickDecision::Idle);
        }
        let decision = self.scheduler.poll(now);
        if let TickDecision::Draw { first_render } = decision {
            self.execute(now, first_render)?;
        }
        Ok(decision)
    }

    /// Flips animation on or off; returns `true` when now animating.
    ///
    /// Turning it off cancels the pending frame request.
    pub fn toggle_animation(&mut self) -> bool {
        let animating = self.scheduler.toggle();
        log::info!("animation {}", if animating { "started" } else { "stopped" });
        animating
    }

    #[inline]
    pub fn is_animating(&self) -> bool {
        self.scheduler.is_animating()
    }

    /// Whether the host should schedule a frame callback.
    #[inline]
    pub fn frame_requested(&self) -> bool {
        self.scheduler.frame_requested()
    }

    /// Time since the first draw; zero when not animating.
    pub fn time_since_first_render(&self, now: Instant) -> Duration {
        if !self.is_animating() {
            return Duration::ZERO;
        }
        self.scheduler.since_first_draw(now)
    }

    fn execute(&mut self, now: Instant, first_render: bool) -> Result<(), RenderError> {
        let info = DrawContext {
            first_render,
            animate: self.scheduler.is_animating(),
            elapsed: self.scheduler.since_first_draw(now),
            frame_index: self.scheduler.frames(),
        };

        let result = match self.draw.as_mut() {
            Some(draw) => draw(&mut self.ctx, &info),
            None => Ok(()),
        };
        // The draw cannot end before it started, even under a synthetic clock.
        self.scheduler.finish(Instant::now().max(now));

        result?;
        self.ctx.backend.present()
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;
    use crate::camera::Camera;
    use crate::cube::CubeFace;
    use crate::device::{Command, HeadlessBackend, Topology};
    use crate::render::FrameOptions;
    use crate::shader::{ShaderProgram, UniformType};

    const VS: &str = r#"
@group(0) @binding(0) var<uniform> u_view_projection: mat4x4<f32>;

@vertex
fn vs_main(@location(0) a_position: vec3<f32>) -> @builtin(position) vec4<f32> {
    return u_view_projection * vec4<f32>(a_position, 1.0);
}
"#;

    const FS: &str = r#"
@fragment
fn fs_main() -> @location(0) vec4<f32> {
    return vec4<f32>(1.0, 1.0, 1.0, 1.0);
}
"#;

    fn scene() -> Scene<HeadlessBackend> {
        Scene::new(HeadlessBackend::new(16, 16), SceneConfig::default())
    }

    fn triangle(backend: &mut HeadlessBackend) -> RenderTarget {
        let program = ShaderProgram::builder(VS, FS)
            .attribute("position", "a_position", 3, &[0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0])
            .uniform(
                "view_projection",
                "u_view_projection",
                UniformType::Mat4,
                Some(&Camera::default().view_projection().to_cols_array()),
            )
            .build()
            .unwrap();
        RenderTarget::new(
            backend,
            16,
            16,
            program,
            FrameOptions {
                topology: Topology::Triangles,
                count: 3,
                ..FrameOptions::default()
            },
        )
        .unwrap()
    }

    fn recorder() -> (Rc<RefCell<Vec<DrawContext>>>, impl FnMut(&mut SceneContext<HeadlessBackend>, &DrawContext) -> Result<(), RenderError> + 'static) {
        let log = Rc::new(RefCell::new(Vec::new()));
        let sink = log.clone();
        let draw = move |ctx: &mut SceneContext<HeadlessBackend>, info: &DrawContext| {
            sink.borrow_mut().push(*info);
            ctx.render_target("triangle", info.first_render)
        };
        (log, draw)
    }

    fn with_triangle(mut scene: Scene<HeadlessBackend>) -> Scene<HeadlessBackend> {
        let target = triangle(scene.backend_mut());
        scene.register_target("triangle", target).unwrap();
        scene
    }

    // ── registry ──────────────────────────────────────────────────────────

    #[test]
    fn duplicate_target_name_is_rejected() {
        let mut scene = with_triangle(scene());
        let again = triangle(scene.backend_mut());
        assert!(matches!(
            scene.register_target("triangle", again),
            Err(ContractError::DuplicateName { kind: "target", .. })
        ));
    }

    #[test]
    fn unknown_names_are_contract_errors() {
        let mut scene = scene();
        assert!(matches!(scene.texture("sky"), Err(ContractError::UnknownName { kind: "texture", .. })));
        assert!(matches!(
            scene.context_mut().render_target("nope", true),
            Err(RenderError::Contract(ContractError::UnknownName { kind: "target", .. }))
        ));
    }

    #[test]
    fn texture_2d_is_uploaded_and_registered() {
        let mut scene = scene();
        let pixels = vec![200u8; 4 * 4 * 4];
        let handle = scene.context_mut().create_texture_2d("floor", 4, 4, &pixels).unwrap();

        let texture = scene.texture("floor").unwrap();
        assert_eq!(scene.context().texture_by_handle(handle), Some(texture));
        assert_eq!(scene.backend().read_texture(texture, 0), Some(pixels.as_slice()));
        assert!(scene.backend().texture_desc(texture).unwrap().mipmapped);
    }

    #[test]
    fn texture_with_wrong_pixel_count_allocates_nothing() {
        let mut scene = scene();
        let err = scene.context_mut().create_texture_2d("floor", 3, 3, &[0; 10]).unwrap_err();
        assert!(matches!(err, EngineError::Contract(ContractError::PixelData { expected: 36, got: 10 })));
        assert!(scene.texture("floor").is_err());
        assert_eq!(scene.backend().texture_desc(TextureId(0)), None);
    }

    #[test]
    fn cube_texture_faces_land_on_their_layers() {
        let mut scene = scene();
        let faces = CubeFaces::from_fn(|f| vec![f.layer() as u8 * 40; 2 * 2 * 4]);
        scene.context_mut().create_cube_texture("sky", 2, &faces).unwrap();

        let texture = scene.texture("sky").unwrap();
        for face in CubeFace::ALL {
            let texels = scene.backend().read_texture(texture, face.layer()).unwrap();
            assert!(texels.iter().all(|&b| b == face.layer() as u8 * 40));
        }
    }

    // ── rendering ─────────────────────────────────────────────────────────

    #[test]
    fn render_once_draws_exactly_once() {
        let mut scene = with_triangle(scene());
        let (log, draw) = recorder();

        scene.render(RenderMode::Once, Instant::now(), draw).unwrap();

        assert_eq!(log.borrow().len(), 1);
        assert!(log.borrow()[0].first_render);
        assert!(!log.borrow()[0].animate);
        assert!(!scene.frame_requested());
        assert_eq!(scene.backend().present_count(), 1);
        assert_eq!(scene.on_host_frame(Instant::now()).unwrap(), TickDecision::Idle);
        assert_eq!(log.borrow().len(), 1);
    }

    #[test]
    fn animation_runs_from_host_frames_and_throttles() {
        let mut scene = with_triangle(scene());
        let (log, draw) = recorder();
        let t0 = Instant::now();

        scene.render(RenderMode::Animate, t0, draw).unwrap();
        assert!(log.borrow().is_empty());
        assert!(scene.frame_requested());

        for k in 0..240u64 {
            scene
                .on_host_frame(t0 + Duration::from_nanos(k * 1_000_000_000 / 240))
                .unwrap();
        }

        let draws = log.borrow().len();
        assert!((59..=61).contains(&draws), "{draws}");
        let firsts = log.borrow().iter().filter(|d| d.first_render).count();
        assert_eq!(firsts, 1);
        assert!(log.borrow().iter().all(|d| d.animate));
        assert_eq!(scene.backend().draws().len(), draws);
    }

    #[test]
    fn geometry_is_uploaded_once_across_animated_frames() {
        let mut scene = with_triangle(scene());
        let (_, draw) = recorder();
        let t0 = Instant::now();
        scene.render(RenderMode::Animate, t0, draw).unwrap();
        for k in 0..10u64 {
            scene.on_host_frame(t0 + Duration::from_millis(k * 20)).unwrap();
        }

        let uploads = scene
            .backend()
            .commands()
            .iter()
            .filter(|c| matches!(c, Command::BufferData { .. }))
            .count();
        assert_eq!(uploads, 1);
    }

    #[test]
    fn toggling_off_cancels_pending_frames() {
        let mut scene = with_triangle(scene());
        let (log, draw) = recorder();
        let t0 = Instant::now();
        scene.render(RenderMode::Animate, t0, draw).unwrap();
        scene.on_host_frame(t0).unwrap();

        assert!(!scene.toggle_animation());
        assert!(!scene.frame_requested());
        assert_eq!(
            scene.on_host_frame(t0 + Duration::from_secs(1)).unwrap(),
            TickDecision::Idle
        );
        assert_eq!(log.borrow().len(), 1);

        assert!(scene.toggle_animation());
        assert!(matches!(
            scene.on_host_frame(t0 + Duration::from_secs(2)).unwrap(),
            TickDecision::Draw { first_render: false }
        ));
    }

    #[test]
    fn time_since_first_render_is_zero_when_idle() {
        let mut scene = with_triangle(scene());
        let (_, draw) = recorder();
        let t0 = Instant::now();
        scene.render(RenderMode::Animate, t0, draw).unwrap();
        scene.on_host_frame(t0).unwrap();

        let later = t0 + Duration::from_millis(500);
        assert_eq!(scene.time_since_first_render(later), Duration::from_millis(500));
        scene.toggle_animation();
        assert_eq!(scene.time_since_first_render(later), Duration::ZERO);
    }

    #[test]
    fn ticks_before_a_draw_is_installed_leave_first_render_intact() {
        let mut scene = with_triangle(scene());
        let t0 = Instant::now();

        assert!(scene.toggle_animation());
        assert_eq!(scene.on_host_frame(t0).unwrap(), TickDecision::Idle);
        assert_eq!(scene.scheduler().frames(), 0);

        let (log, draw) = recorder();
        let t1 = t0 + Duration::from_secs(1);
        scene.render(RenderMode::Animate, t1, draw).unwrap();
        scene.on_host_frame(t1).unwrap();

        assert_eq!(log.borrow().len(), 1);
        assert!(log.borrow()[0].first_render);
        assert_eq!(log.borrow()[0].elapsed, Duration::ZERO);
    }

    #[test]
    fn since_last_draw_throttle_counts_from_the_end_of_the_draw() {
        let mut scene = Scene::new(
            HeadlessBackend::new(16, 16),
            SceneConfig {
                frame_rate: 60,
                throttle: ThrottlePolicy::SinceLastDraw,
            },
        );
        let t0 = Instant::now();
        scene
            .render(RenderMode::Animate, t0, |_: &mut SceneContext<HeadlessBackend>, _: &DrawContext| {
                std::thread::sleep(Duration::from_millis(30));
                Ok(())
            })
            .unwrap();

        assert!(matches!(scene.on_host_frame(t0).unwrap(), TickDecision::Draw { .. }));
        // One interval after the draw started, but not after it finished.
        assert_eq!(
            scene.on_host_frame(t0 + Duration::from_millis(20)).unwrap(),
            TickDecision::Throttled
        );
    }

    #[test]
    fn draw_error_is_returned_and_animation_continues() {
        let mut scene = scene();
        let t0 = Instant::now();
        scene
            .render(RenderMode::Animate, t0, |ctx: &mut SceneContext<HeadlessBackend>, _: &DrawContext| {
                ctx.render_target("missing", false)
            })
            .unwrap();

        assert!(scene.on_host_frame(t0).is_err());
        assert!(scene.frame_requested());
        assert_eq!(scene.backend().present_count(), 0);
    }
}
