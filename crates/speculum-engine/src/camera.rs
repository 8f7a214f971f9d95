//! Perspective camera.
//!
//! Plain value holder; matrices are derived on demand.

use glam::{Mat4, Vec3};

use crate::error::ContractError;

pub const DEFAULT_EYE: Vec3 = Vec3::new(0.0, 0.0, 6.0);
pub const DEFAULT_AT: Vec3 = Vec3::ZERO;
pub const DEFAULT_UP: Vec3 = Vec3::Y;
pub const DEFAULT_FOV: f32 = std::f32::consts::FRAC_PI_3;
pub const DEFAULT_ASPECT_RATIO: f32 = 1.0;
pub const DEFAULT_NEAR_PLANE: f32 = 1.0;
pub const DEFAULT_FAR_PLANE: f32 = 1e6;

/// Right-handed look-at camera with a perspective projection (depth in `[0, 1]`).
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Camera {
    eye: Vec3,
    at: Vec3,
    up: Vec3,
    fov: f32,
    aspect: f32,
    near: f32,
    far: f32,
    flip_y: bool,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            eye: DEFAULT_EYE,
            at: DEFAULT_AT,
            up: DEFAULT_UP,
            fov: DEFAULT_FOV,
            aspect: DEFAULT_ASPECT_RATIO,
            near: DEFAULT_NEAR_PLANE,
            far: DEFAULT_FAR_PLANE,
            flip_y: false,
        }
    }
}

impl Camera {
    /// Camera at `eye` looking at `at`, other parameters default.
    pub fn new(eye: impl Into<Vec3>, at: impl Into<Vec3>, up: impl Into<Vec3>) -> Self {
        Self {
            eye: eye.into(),
            at: at.into(),
            up: up.into(),
            ..Self::default()
        }
    }

    #[inline]
    pub fn eye(&self) -> Vec3 {
        self.eye
    }

    #[inline]
    pub fn at(&self) -> Vec3 {
        self.at
    }

    #[inline]
    pub fn up(&self) -> Vec3 {
        self.up
    }

    #[inline]
    pub fn fov(&self) -> f32 {
        self.fov
    }

    #[inline]
    pub fn aspect(&self) -> f32 {
        self.aspect
    }

    #[inline]
    pub fn near(&self) -> f32 {
        self.near
    }

    #[inline]
    pub fn far(&self) -> f32 {
        self.far
    }

    /// Accepts a `Vec3`, `[f32; 3]` or `(x, y, z)`.
    pub fn set_eye(&mut self, eye: impl Into<Vec3>) {
        self.eye = eye.into();
    }

    pub fn set_at(&mut self, at: impl Into<Vec3>) {
        self.at = at.into();
    }

    pub fn set_up(&mut self, up: impl Into<Vec3>) {
        self.up = up.into();
    }

    pub fn set_aspect(&mut self, aspect: f32) -> Result<(), ContractError> {
        if !(aspect.is_finite() && aspect > 0.0) {
            return Err(ContractError::InvalidCamera("aspect ratio must be positive"));
        }
        self.aspect = aspect;
        Ok(())
    }

    pub fn set_fov(&mut self, fov: f32) -> Result<(), ContractError> {
        if !(fov > 0.0 && fov < std::f32::consts::PI) {
            return Err(ContractError::InvalidCamera("field of view must be in (0, pi)"));
        }
        self.fov = fov;
        Ok(())
    }

    /// Sets near/far planes; requires `0 < near < far`.
    pub fn set_planes(&mut self, near: f32, far: f32) -> Result<(), ContractError> {
        if !(near > 0.0 && near < far) {
            return Err(ContractError::InvalidCamera("planes must satisfy 0 < near < far"));
        }
        self.near = near;
        self.far = far;
        Ok(())
    }

    /// Mirrors clip-space Y.
    ///
    /// Cube-face captures render with this set so image rows match the cube-map
    /// face layout sampled by the shading stage.
    pub fn set_flip_y(&mut self, flip: bool) {
        self.flip_y = flip;
    }

    /// Checks the view invariants: `eye != at` and `up` not parallel to the view direction.
    pub fn validate(&self) -> Result<(), ContractError> {
        let forward = self.at - self.eye;
        if forward.length_squared() <= f32::EPSILON {
            return Err(ContractError::InvalidCamera("eye and at coincide"));
        }
        if forward.cross(self.up).length_squared() <= f32::EPSILON * forward.length_squared() {
            return Err(ContractError::InvalidCamera("up is parallel to the view direction"));
        }
        Ok(())
    }

    #[inline]
    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_at_rh(self.eye, self.at, self.up)
    }

    pub fn projection_matrix(&self) -> Mat4 {
        let proj = Mat4::perspective_rh(self.fov, self.aspect, self.near, self.far);
        if self.flip_y {
            Mat4::from_scale(Vec3::new(1.0, -1.0, 1.0)) * proj
        } else {
            proj
        }
    }

    #[inline]
    pub fn view_projection(&self) -> Mat4 {
        self.projection_matrix() * self.view_matrix()
    }
}
