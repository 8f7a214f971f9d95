mod mesh;
mod sky;

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Instant;

use anyhow::{Context, Result};
use glam::{Mat3, Mat4, Quat, Vec3};
use winit::dpi::PhysicalSize;
use winit::event::{ElementState, WindowEvent};
use winit::keyboard::{Key, NamedKey};

use speculum_engine::core::{App, AppControl};
use speculum_engine::cube::CubeCapture;
use speculum_engine::device::{Backend, GpuInit, Topology, WgpuBackend};
use speculum_engine::logging::{init_logging, LoggingConfig};
use speculum_engine::render::{Destination, FrameOptions, RenderTarget};
use speculum_engine::scene::{RenderMode, Scene, SceneConfig};
use speculum_engine::shader::{ShaderProgram, UniformType};
use speculum_engine::window::{Runtime, RuntimeConfig};
use speculum_engine::{Camera, ContractError, RenderError, Transform};

const SKY: &str = "sky";
const MIRROR: &str = "mirror";
const SATELLITE: &str = "satellite";
const ENVIRONMENT: &str = "environment";

const ENVIRONMENT_SIZE: u32 = 512;
const CAPTURE_SIZE: u32 = 256;

const ORBIT_RADIUS: f32 = 6.0;
const ORBIT_SPEED: f32 = 0.25;
const SATELLITE_RADIUS: f32 = 3.0;
const SATELLITE_SCALE: f32 = 0.4;

const SKY_VERTEX: &str = include_str!("shaders/sky.vert.wgsl");
const SKY_FRAGMENT: &str = include_str!("shaders/sky.frag.wgsl");
const SURFACE_VERTEX: &str = include_str!("shaders/surface.vert.wgsl");
const SURFACE_FRAGMENT: &str = include_str!("shaders/surface.frag.wgsl");

fn main() -> Result<()> {
    init_logging(LoggingConfig::default());
    log::info!("space: toggle animation, r: toggle reflection, esc: quit");

    Runtime::run(RuntimeConfig::default(), GpuInit::default(), |backend| {
        Demo::new(backend, Instant::now())
    })
}

struct Demo {
    scene: Scene<WgpuBackend>,
    /// Shared with the draw callback, which moves the eye every frame.
    camera: Rc<RefCell<Camera>>,
    show_reflection: bool,
}

impl Demo {
    fn new(backend: WgpuBackend, now: Instant) -> Result<Self> {
        let mut scene = Scene::new(backend, SceneConfig::default());
        let (width, height) = scene.backend().surface_size();

        scene
            .context_mut()
            .create_cube_texture(ENVIRONMENT, ENVIRONMENT_SIZE, &sky::environment(ENVIRONMENT_SIZE))
            .context("failed to upload the environment")?;
        let environment = scene.texture(ENVIRONMENT)?;

        let rig = CubeCapture::new(scene.backend_mut(), Vec3::ZERO, CAPTURE_SIZE)
            .context("failed to allocate the cube capture")?;

        let mut sky = RenderTarget::new(
            scene.backend_mut(),
            width,
            height,
            sky_program()?,
            FrameOptions {
                topology: Topology::Triangles,
                count: mesh::INDICES.len() as u32,
                indexed: true,
                ..FrameOptions::default()
            },
        )
        .context("failed to build the sky target")?;
        sky.program_mut().set_texture(ENVIRONMENT, environment)?;

        let surface_options = FrameOptions {
            topology: Topology::Triangles,
            count: mesh::INDICES.len() as u32,
            indexed: true,
            clear_before_render: false,
            ..FrameOptions::default()
        };

        let mut mirror = RenderTarget::new(
            scene.backend_mut(),
            width,
            height,
            surface_program([0.82, 0.86, 0.9, 1.0], 0.85)?,
            surface_options,
        )
        .context("failed to build the mirror target")?;
        mirror.program_mut().set_texture(ENVIRONMENT, rig.texture())?;

        // The satellite shows up in the capture, so it samples the static sky instead.
        let mut satellite = RenderTarget::new(
            scene.backend_mut(),
            width,
            height,
            surface_program([0.95, 0.45, 0.15, 1.0], 0.0)?,
            surface_options,
        )
        .context("failed to build the satellite target")?;
        let program = satellite.program_mut();
        program.set_texture(ENVIRONMENT, environment)?;
        program.set_uniform("show_reflection", false)?;

        scene.register_target(SKY, sky)?;
        scene.register_target(MIRROR, mirror)?;
        scene.register_target(SATELLITE, satellite)?;

        let mut camera = Camera::default();
        camera.set_aspect(width.max(1) as f32 / height.max(1) as f32)?;
        let camera = Rc::new(RefCell::new(camera));
        let shared_camera = camera.clone();
        let mut mirror_transform = Transform::default();
        let mut satellite_transform = Transform::default();
        satellite_transform.scale = Vec3::splat(SATELLITE_SCALE);

        scene.render(RenderMode::Animate, now, move |ctx, frame| {
            let t = frame.elapsed.as_secs_f32();
            let mut camera = shared_camera.borrow_mut();
            camera.set_eye(orbit(t * ORBIT_SPEED));
            mirror_transform.rotation = Quat::from_rotation_y(t * 0.3);
            satellite_transform.position = Vec3::new(
                SATELLITE_RADIUS * t.cos(),
                0.5 * (2.0 * t).sin(),
                SATELLITE_RADIUS * t.sin(),
            );
            satellite_transform.rotation = Quat::from_rotation_y(t * 1.5);

            let (gpu, targets, _) = ctx.parts_mut();

            rig.render_texture(&mut *gpu, |gpu, face| {
                let destination = face.destination();
                draw_sky(targets.by_name_mut(SKY)?, gpu, face.camera, destination, frame.first_render)?;
                draw_surface(
                    targets.by_name_mut(SATELLITE)?,
                    gpu,
                    face.camera,
                    &satellite_transform,
                    destination,
                    frame.first_render,
                )
            })?;

            draw_sky(targets.by_name_mut(SKY)?, gpu, &camera, Destination::Canvas, frame.first_render)?;
            draw_surface(
                targets.by_name_mut(SATELLITE)?,
                gpu,
                &camera,
                &satellite_transform,
                Destination::Canvas,
                frame.first_render,
            )?;
            draw_surface(
                targets.by_name_mut(MIRROR)?,
                gpu,
                &camera,
                &mirror_transform,
                Destination::Canvas,
                frame.first_render,
            )
        })?;

        Ok(Self {
            scene,
            camera,
            show_reflection: true,
        })
    }

    /// Matches the on-screen viewports and the projection to a new window size.
    fn fit_to(&mut self, width: u32, height: u32) -> Result<(), ContractError> {
        self.camera.borrow_mut().set_aspect(width as f32 / height as f32)?;
        let ctx = self.scene.context_mut();
        for name in [SKY, MIRROR, SATELLITE] {
            ctx.target_mut(name)?.set_size(width, height)?;
        }
        Ok(())
    }

    fn toggle_reflection(&mut self) {
        self.show_reflection = !self.show_reflection;
        let show = self.show_reflection;
        let result = self
            .scene
            .context_mut()
            .target_mut(MIRROR)
            .and_then(|target| target.program_mut().set_uniform("show_reflection", show));
        match result {
            Ok(()) => log::info!("reflection {}", if show { "on" } else { "off" }),
            Err(e) => log::error!("toggle reflection: {e}"),
        }
    }
}

impl App for Demo {
    fn on_window_event(&mut self, event: &WindowEvent) -> AppControl {
        let WindowEvent::KeyboardInput { event, .. } = event else {
            return AppControl::Continue;
        };
        if event.state != ElementState::Pressed || event.repeat {
            return AppControl::Continue;
        }

        match &event.logical_key {
            Key::Named(NamedKey::Escape) => return AppControl::Exit,
            Key::Named(NamedKey::Space) => {
                self.scene.toggle_animation();
            }
            Key::Character(c) if c.eq_ignore_ascii_case("r") => self.toggle_reflection(),
            _ => {}
        }
        AppControl::Continue
    }

    fn on_resize(&mut self, size: PhysicalSize<u32>) {
        self.scene.backend_mut().resize(size);
        // Minimized; keep the last layout until a real size comes back.
        if size.width == 0 || size.height == 0 {
            return;
        }
        if let Err(e) = self.fit_to(size.width, size.height) {
            log::error!("resize to {}x{}: {e}", size.width, size.height);
        }
    }

    fn on_frame(&mut self, now: Instant) -> AppControl {
        match self.scene.on_host_frame(now) {
            Ok(_) => AppControl::Continue,
            Err(e) if e.is_fatal() => {
                log::error!("rendering stopped: {e:#}");
                AppControl::Exit
            }
            Err(RenderError::Surface(action)) => {
                log::warn!("frame skipped: {action:?}");
                AppControl::Continue
            }
            Err(e) => {
                log::error!("draw failed: {e:#}");
                AppControl::Continue
            }
        }
    }

    fn wants_frame(&self) -> bool {
        self.scene.frame_requested()
    }
}

fn sky_program() -> Result<ShaderProgram, ContractError> {
    ShaderProgram::builder(SKY_VERTEX, SKY_FRAGMENT)
        .indexed_attribute("position", "a_position", 3, &mesh::POSITIONS, &mesh::INDICES)
        .uniform("projection", "u_projection", UniformType::Mat4, None)
        .uniform("view", "u_view", UniformType::Mat4, None)
        .texture(ENVIRONMENT, "t_environment")
        .build()
}

fn surface_program(tint: [f32; 4], reflectivity: f32) -> Result<ShaderProgram, ContractError> {
    ShaderProgram::builder(SURFACE_VERTEX, SURFACE_FRAGMENT)
        .indexed_attribute("position", "a_position", 3, &mesh::POSITIONS, &mesh::INDICES)
        .attribute("normal", "a_normal", 3, &mesh::NORMALS)
        .uniform("projection", "u_projection", UniformType::Mat4, None)
        .uniform("view", "u_view", UniformType::Mat4, None)
        .uniform("model", "u_model", UniformType::Mat4, None)
        .uniform("normal_matrix", "u_normal_matrix", UniformType::Mat4, None)
        .uniform("eye", "u_eye", UniformType::Vec3, None)
        .uniform("tint", "u_tint", UniformType::Vec4, Some(&tint))
        .uniform("reflectivity", "u_reflectivity", UniformType::Float, Some(&[reflectivity]))
        .uniform("show_reflection", "u_show_reflection", UniformType::Bool, Some(&[1.0]))
        .texture(ENVIRONMENT, "t_environment")
        .build()
}

/// Eye position on a horizontal circle around the origin.
fn orbit(angle: f32) -> Vec3 {
    Vec3::new(ORBIT_RADIUS * angle.cos(), 1.5, ORBIT_RADIUS * angle.sin())
}

fn draw_sky<B: Backend + ?Sized>(
    target: &mut RenderTarget,
    gpu: &mut B,
    camera: &Camera,
    destination: Destination,
    first_render: bool,
) -> Result<(), RenderError> {
    // Rotation only: the box follows the eye.
    let view = Mat4::from_mat3(Mat3::from_mat4(camera.view_matrix()));

    let program = target.program_mut();
    program.set_uniform("projection", camera.projection_matrix())?;
    program.set_uniform("view", view)?;
    target.render_into(gpu, destination, first_render)
}

fn draw_surface<B: Backend + ?Sized>(
    target: &mut RenderTarget,
    gpu: &mut B,
    camera: &Camera,
    transform: &Transform,
    destination: Destination,
    first_render: bool,
) -> Result<(), RenderError> {
    let program = target.program_mut();
    program.set_uniform("projection", camera.projection_matrix())?;
    program.set_uniform("view", camera.view_matrix())?;
    program.set_uniform("model", transform.model_matrix())?;
    program.set_uniform("normal_matrix", transform.normal_matrix())?;
    program.set_uniform("eye", camera.eye())?;
    target.render_into(gpu, destination, first_render)
}
