use glam::{Mat4, Quat, Vec3};

/// Model placement: translation · rotation · scale.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Transform {
    pub position: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            scale: Vec3::ONE,
        }
    }
}

impl Transform {
    #[inline]
    pub fn from_position(position: impl Into<Vec3>) -> Self {
        Self {
            position: position.into(),
            ..Self::default()
        }
    }

    pub fn translate(&mut self, delta: impl Into<Vec3>) {
        self.position += delta.into();
    }

    /// Applies a rotation of `angle` radians about `axis` after the current one.
    pub fn rotate(&mut self, axis: Vec3, angle: f32) {
        self.rotation = (Quat::from_axis_angle(axis.normalize_or_zero(), angle) * self.rotation).normalize();
    }

    #[inline]
    pub fn model_matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.rotation, self.position)
    }

    /// Inverse-transpose of the model matrix, for transforming normals.
    #[inline]
    pub fn normal_matrix(&self) -> Mat4 {
        self.model_matrix().inverse().transpose()
    }
}
