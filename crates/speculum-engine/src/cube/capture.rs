use glam::Vec3;

use crate::camera::{Camera, DEFAULT_NEAR_PLANE};
use crate::device::{
    Backend, ColorAttachment, FramebufferId, RenderbufferId, TextureDesc, TextureId, TextureKind,
};
use crate::error::{ContractError, EngineError, RenderError};
use crate::render::{BindScope, ClearColor, Destination};

use super::{CubeFace, CubeFaces};

/// Field of view of every capture camera: one face spans 90°.
pub const CAPTURE_FOV: f32 = std::f32::consts::FRAC_PI_2;
pub const CAPTURE_FAR_PLANE: f32 = 21.0;

#[derive(Debug, Clone)]
struct FaceTarget {
    framebuffer: FramebufferId,
    renderbuffer: RenderbufferId,
    camera: Camera,
}

/// What a capture callback receives for one face.
#[derive(Debug, Copy, Clone)]
pub struct CaptureFace<'a> {
    pub face: CubeFace,
    pub framebuffer: FramebufferId,
    pub renderbuffer: RenderbufferId,
    pub camera: &'a Camera,
    /// Edge length of the face in pixels.
    pub size: u32,
}

impl CaptureFace<'_> {
    /// Render destination for drawing into this face.
    pub fn destination(&self) -> Destination {
        Destination::Framebuffer {
            id: self.framebuffer,
            width: self.size,
            height: self.size,
        }
    }
}

/// Six cameras sharing one eye, each rendering into one face of a cube texture.
///
/// All GPU resources are allocated by [`new`](Self::new). Look directions are
/// fixed; [`translate`](Self::translate) only moves the shared eye.
#[derive(Debug, Clone)]
pub struct CubeCapture {
    position: Vec3,
    size: u32,
    texture: TextureId,
    faces: CubeFaces<FaceTarget>,
    clear_color: ClearColor,
}

impl CubeCapture {
    /// Allocates a `size x size` cube texture plus one framebuffer and depth
    /// buffer per face. Power-of-two sizes request a mip chain.
    pub fn new<B: Backend + ?Sized>(
        backend: &mut B,
        position: impl Into<Vec3>,
        size: u32,
    ) -> Result<Self, EngineError> {
        if size == 0 {
            return Err(ContractError::ZeroSize("cube capture").into());
        }
        let position = position.into();

        let texture = backend.create_texture(&TextureDesc {
            kind: TextureKind::Cube,
            width: size,
            height: size,
            mipmapped: size.is_power_of_two(),
        });

        let faces = CubeFaces::try_from_fn(|face| -> Result<FaceTarget, EngineError> {
            let renderbuffer = backend.create_renderbuffer(size, size);
            let framebuffer = backend.create_framebuffer(ColorAttachment::CubeFace(texture, face), renderbuffer)?;
            Ok(FaceTarget {
                framebuffer,
                renderbuffer,
                camera: face_camera(position, face)?,
            })
        })?;

        log::debug!("cube capture {size}x{size} at {position} -> {texture:?}");

        Ok(Self {
            position,
            size,
            texture,
            faces,
            clear_color: ClearColor::black(),
        })
    }

    #[inline]
    pub fn position(&self) -> Vec3 {
        self.position
    }

    #[inline]
    pub fn size(&self) -> u32 {
        self.size
    }

    /// The cube texture the faces render into.
    #[inline]
    pub fn texture(&self) -> TextureId {
        self.texture
    }

    pub fn camera(&self, face: CubeFace) -> &Camera {
        &self.faces[face].camera
    }

    pub fn framebuffer(&self, face: CubeFace) -> FramebufferId {
        self.faces[face].framebuffer
    }

    pub fn renderbuffer(&self, face: CubeFace) -> RenderbufferId {
        self.faces[face].renderbuffer
    }

    pub fn set_clear_color(&mut self, color: ClearColor) {
        self.clear_color = color;
    }

    /// Moves the shared eye of all six cameras by `delta`.
    pub fn translate(&mut self, delta: impl Into<Vec3>) {
        self.position += delta.into();
        let position = self.position;
        for (face, target) in self.faces.iter_mut() {
            target.camera.set_eye(position);
            target.camera.set_at(position + face.direction());
        }
    }

    /// Captures all six faces in [`CubeFace::ALL`] order.
    ///
    /// Each face is bound, sized and cleared before `draw` runs; `draw` does the
    /// actual scene rendering with the supplied camera and destination. The bind
    /// state in effect before the call is restored afterwards.
    pub fn render_texture<B, F>(&self, backend: &mut B, mut draw: F) -> Result<(), RenderError>
    where
        B: Backend + ?Sized,
        F: FnMut(&mut B, CaptureFace<'_>) -> Result<(), RenderError>,
    {
        for (face, target) in self.faces.iter() {
            let mut scope = BindScope::new(&mut *backend);
            scope.bind_framebuffer(Some(target.framebuffer));
            scope.viewport(self.size, self.size);
            scope.clear(self.clear_color)?;

            draw(
                &mut *scope,
                CaptureFace {
                    face,
                    framebuffer: target.framebuffer,
                    renderbuffer: target.renderbuffer,
                    camera: &target.camera,
                    size: self.size,
                },
            )?;
        }
        Ok(())
    }
}

fn face_camera(position: Vec3, face: CubeFace) -> Result<Camera, ContractError> {
    let mut camera = Camera::new(position, position + face.direction(), face.up());
    camera.set_fov(CAPTURE_FOV)?;
    camera.set_planes(DEFAULT_NEAR_PLANE, CAPTURE_FAR_PLANE)?;
    camera.set_flip_y(true);
    Ok(camera)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{Command, HeadlessBackend};

    fn face_color(face: CubeFace) -> ClearColor {
        match face {
            CubeFace::PosX => ClearColor::new(1.0, 0.0, 0.0, 1.0),
            CubeFace::NegX => ClearColor::new(0.0, 1.0, 0.0, 1.0),
            CubeFace::PosY => ClearColor::new(0.0, 0.0, 1.0, 1.0),
            CubeFace::NegY => ClearColor::new(1.0, 1.0, 0.0, 1.0),
            CubeFace::PosZ => ClearColor::new(0.0, 1.0, 1.0, 1.0),
            CubeFace::NegZ => ClearColor::new(1.0, 0.0, 1.0, 1.0),
        }
    }

    // ── geometry ──────────────────────────────────────────────────────────

    #[test]
    fn cameras_look_along_their_axis() {
        let mut backend = HeadlessBackend::new(4, 4);
        let rig = CubeCapture::new(&mut backend, Vec3::ZERO, 16).unwrap();
        for face in CubeFace::ALL {
            let camera = rig.camera(face);
            camera.validate().unwrap();
            let ahead = camera.view_matrix().transform_point3(face.direction() * 5.0);
            assert!(ahead.abs_diff_eq(Vec3::new(0.0, 0.0, -5.0), 1e-5), "{face}: {ahead:?}");
            assert_eq!(camera.fov(), CAPTURE_FOV);
            assert_eq!(camera.far(), CAPTURE_FAR_PLANE);
        }
    }

    #[test]
    fn translate_moves_every_eye_and_keeps_directions() {
        let mut backend = HeadlessBackend::new(4, 4);
        let start = Vec3::new(1.0, 2.0, 3.0);
        let delta = Vec3::new(-0.5, 4.0, 2.0);
        let mut rig = CubeCapture::new(&mut backend, start, 16).unwrap();

        rig.translate(delta);
        rig.translate((0.0, 0.0, 0.0));

        assert_eq!(rig.position(), start + delta);
        for face in CubeFace::ALL {
            let camera = rig.camera(face);
            assert_eq!(camera.eye(), start + delta);
            let dir = (camera.at() - camera.eye()).normalize();
            assert!(dir.abs_diff_eq(face.direction(), 1e-6));
            assert_eq!(camera.up(), face.up());
        }
    }

    // ── resources ─────────────────────────────────────────────────────────

    #[test]
    fn faces_target_distinct_layers_of_one_texture() {
        let mut backend = HeadlessBackend::new(4, 4);
        let rig = CubeCapture::new(&mut backend, Vec3::ZERO, 32).unwrap();

        let desc = backend.texture_desc(rig.texture()).unwrap();
        assert_eq!(desc.kind, TextureKind::Cube);
        assert!(desc.mipmapped);

        for face in CubeFace::ALL {
            let (color, depth) = backend.framebuffer_attachments(rig.framebuffer(face)).unwrap();
            assert_eq!(color, ColorAttachment::CubeFace(rig.texture(), face));
            assert_eq!(depth, rig.renderbuffer(face));
            assert_eq!(backend.renderbuffer_size(depth), Some((32, 32)));
        }
    }

    #[test]
    fn non_power_of_two_size_skips_mipmaps() {
        let mut backend = HeadlessBackend::new(4, 4);
        let rig = CubeCapture::new(&mut backend, Vec3::ZERO, 100).unwrap();
        assert!(!backend.texture_desc(rig.texture()).unwrap().mipmapped);
    }

    #[test]
    fn zero_size_is_rejected() {
        let mut backend = HeadlessBackend::new(4, 4);
        assert!(matches!(
            CubeCapture::new(&mut backend, Vec3::ZERO, 0),
            Err(EngineError::Contract(ContractError::ZeroSize(_)))
        ));
    }

    // ── capture ───────────────────────────────────────────────────────────

    #[test]
    fn each_face_receives_its_own_color() {
        let mut backend = HeadlessBackend::new(4, 4);
        let rig = CubeCapture::new(&mut backend, Vec3::ZERO, 128).unwrap();

        rig.render_texture(&mut backend, |gpu, capture| {
            assert_eq!(gpu.current_framebuffer(), Some(capture.framebuffer));
            gpu.clear(face_color(capture.face))
        })
        .unwrap();

        for face in CubeFace::ALL {
            let texels = backend.read_texture(rig.texture(), face.layer()).unwrap();
            assert_eq!(texels.len(), 128 * 128 * 4);
            let expected = face_color(face).to_rgba8();
            assert!(texels.chunks_exact(4).all(|px| px == expected), "bleed on {face}");
        }
        assert_eq!(backend.current_framebuffer(), None);
    }

    #[test]
    fn faces_are_visited_in_fixed_order() {
        let mut backend = HeadlessBackend::new(4, 4);
        let rig = CubeCapture::new(&mut backend, Vec3::ZERO, 8).unwrap();

        for _ in 0..2 {
            let mut order = Vec::new();
            rig.render_texture(&mut backend, |_, capture| {
                order.push(capture.face);
                Ok(())
            })
            .unwrap();
            assert_eq!(order, CubeFace::ALL.to_vec());
        }
    }

    #[test]
    fn each_face_is_cleared_before_the_callback() {
        let mut backend = HeadlessBackend::new(4, 4);
        let rig = CubeCapture::new(&mut backend, Vec3::ZERO, 8).unwrap();
        backend.take_commands();

        rig.render_texture(&mut backend, |gpu, capture| {
            assert_eq!(
                gpu.commands().last(),
                Some(&Command::Clear {
                    framebuffer: Some(capture.framebuffer),
                    color: ClearColor::black(),
                })
            );
            assert_eq!(
                capture.destination(),
                Destination::Framebuffer {
                    id: capture.framebuffer,
                    width: 8,
                    height: 8,
                }
            );
            Ok(())
        })
        .unwrap();

        let clears = backend
            .commands()
            .iter()
            .filter(|c| matches!(c, Command::Clear { .. }))
            .count();
        assert_eq!(clears, 6);
    }

    #[test]
    fn callback_error_stops_the_capture() {
        let mut backend = HeadlessBackend::new(4, 4);
        let rig = CubeCapture::new(&mut backend, Vec3::ZERO, 8).unwrap();

        let mut visited = 0;
        let err = rig
            .render_texture(&mut backend, |_, capture| {
                visited += 1;
                if capture.face == CubeFace::NegX {
                    Err(RenderError::NoProgram)
                } else {
                    Ok(())
                }
            })
            .unwrap_err();

        assert!(matches!(err, RenderError::NoProgram));
        assert_eq!(visited, 2);
        assert_eq!(backend.current_framebuffer(), None);
    }
}
