use glam::{Mat4, Vec2, Vec3, Vec4};

use crate::error::ContractError;

/// Type tag of a uniform slot. Fixed at registration.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum UniformType {
    Bool,
    Int,
    Float,
    Vec2,
    Vec3,
    Vec4,
    Mat4,
}

impl UniformType {
    /// Number of scalar components a value of this type carries.
    #[inline]
    pub const fn arity(self) -> usize {
        match self {
            UniformType::Bool | UniformType::Int | UniformType::Float => 1,
            UniformType::Vec2 => 2,
            UniformType::Vec3 => 3,
            UniformType::Vec4 => 4,
            UniformType::Mat4 => 16,
        }
    }

    /// Size of the uniform buffer backing one value (16-byte aligned).
    #[inline]
    pub const fn buffer_size(self) -> u64 {
        match self {
            UniformType::Mat4 => 64,
            _ => 16,
        }
    }
}

/// A uniform value tagged with its type.
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum UniformValue {
    Bool(bool),
    Int(i32),
    Float(f32),
    Vec2([f32; 2]),
    Vec3([f32; 3]),
    Vec4([f32; 4]),
    /// Column-major.
    Mat4([f32; 16]),
}

impl UniformValue {
    /// All-zero value of `ty`.
    pub const fn zero(ty: UniformType) -> Self {
        match ty {
            UniformType::Bool => UniformValue::Bool(false),
            UniformType::Int => UniformValue::Int(0),
            UniformType::Float => UniformValue::Float(0.0),
            UniformType::Vec2 => UniformValue::Vec2([0.0; 2]),
            UniformType::Vec3 => UniformValue::Vec3([0.0; 3]),
            UniformType::Vec4 => UniformValue::Vec4([0.0; 4]),
            UniformType::Mat4 => UniformValue::Mat4([0.0; 16]),
        }
    }

    /// Builds a value of type `ty` from flat data.
    ///
    /// `data.len()` must equal the arity of `ty`; nothing is truncated or padded.
    /// `Int` data must be a whole number in `i32` range.
    pub fn from_slice(name: &str, ty: UniformType, data: &[f32]) -> Result<Self, ContractError> {
        if data.len() != ty.arity() {
            return Err(ContractError::Arity {
                name: name.to_string(),
                expected: ty.arity(),
                got: data.len(),
            });
        }

        let value = match ty {
            UniformType::Bool => UniformValue::Bool(data[0] != 0.0),
            UniformType::Int => {
                let v = data[0];
                if v.fract() != 0.0 || !(i32::MIN as f32..=i32::MAX as f32).contains(&v) {
                    return Err(ContractError::NotIntegral {
                        name: name.to_string(),
                        value: v,
                    });
                }
                UniformValue::Int(v as i32)
            }
            UniformType::Float => UniformValue::Float(data[0]),
            UniformType::Vec2 => UniformValue::Vec2([data[0], data[1]]),
            UniformType::Vec3 => UniformValue::Vec3([data[0], data[1], data[2]]),
            UniformType::Vec4 => UniformValue::Vec4([data[0], data[1], data[2], data[3]]),
            UniformType::Mat4 => {
                let mut m = [0.0; 16];
                m.copy_from_slice(data);
                UniformValue::Mat4(m)
            }
        };
        Ok(value)
    }

    #[inline]
    pub const fn ty(&self) -> UniformType {
        match self {
            UniformValue::Bool(_) => UniformType::Bool,
            UniformValue::Int(_) => UniformType::Int,
            UniformValue::Float(_) => UniformType::Float,
            UniformValue::Vec2(_) => UniformType::Vec2,
            UniformValue::Vec3(_) => UniformType::Vec3,
            UniformValue::Vec4(_) => UniformType::Vec4,
            UniformValue::Mat4(_) => UniformType::Mat4,
        }
    }

    /// Host-shareable byte encoding. `bool` is widened to a `u32`.
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            UniformValue::Bool(b) => u32::from(*b).to_ne_bytes().to_vec(),
            UniformValue::Int(i) => i.to_ne_bytes().to_vec(),
            UniformValue::Float(f) => f.to_ne_bytes().to_vec(),
            UniformValue::Vec2(v) => bytemuck::cast_slice(v).to_vec(),
            UniformValue::Vec3(v) => bytemuck::cast_slice(v).to_vec(),
            UniformValue::Vec4(v) => bytemuck::cast_slice(v).to_vec(),
            UniformValue::Mat4(m) => bytemuck::cast_slice(m).to_vec(),
        }
    }

    /// Returns the matrix as a `Mat4` when this is a `Mat4` value.
    pub fn as_mat4(&self) -> Option<Mat4> {
        match self {
            UniformValue::Mat4(m) => Some(Mat4::from_cols_array(m)),
            _ => None,
        }
    }
}

impl From<bool> for UniformValue {
    fn from(v: bool) -> Self {
        UniformValue::Bool(v)
    }
}

impl From<i32> for UniformValue {
    fn from(v: i32) -> Self {
        UniformValue::Int(v)
    }
}

impl From<f32> for UniformValue {
    fn from(v: f32) -> Self {
        UniformValue::Float(v)
    }
}

impl From<Vec2> for UniformValue {
    fn from(v: Vec2) -> Self {
        UniformValue::Vec2(v.to_array())
    }
}

impl From<Vec3> for UniformValue {
    fn from(v: Vec3) -> Self {
        UniformValue::Vec3(v.to_array())
    }
}

impl From<Vec4> for UniformValue {
    fn from(v: Vec4) -> Self {
        UniformValue::Vec4(v.to_array())
    }
}

impl From<Mat4> for UniformValue {
    fn from(m: Mat4) -> Self {
        UniformValue::Mat4(m.to_cols_array())
    }
}
