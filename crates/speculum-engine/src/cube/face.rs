use std::fmt;
use std::ops::{Index, IndexMut};

use glam::Vec3;

/// One face of a cube texture, keyed by the axis it looks along.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub enum CubeFace {
    PosX,
    NegX,
    PosY,
    NegY,
    PosZ,
    NegZ,
}

impl CubeFace {
    /// Iteration order; also the array-layer order of cube textures.
    pub const ALL: [CubeFace; 6] = [
        CubeFace::PosX,
        CubeFace::NegX,
        CubeFace::PosY,
        CubeFace::NegY,
        CubeFace::PosZ,
        CubeFace::NegZ,
    ];

    #[inline]
    pub const fn layer(self) -> u32 {
        self as u32
    }

    /// Look direction of the capture camera for this face.
    pub const fn direction(self) -> Vec3 {
        match self {
            CubeFace::PosX => Vec3::X,
            CubeFace::NegX => Vec3::NEG_X,
            CubeFace::PosY => Vec3::Y,
            CubeFace::NegY => Vec3::NEG_Y,
            CubeFace::PosZ => Vec3::Z,
            CubeFace::NegZ => Vec3::NEG_Z,
        }
    }

    /// Up vector of the capture camera for this face (cube-map orientation).
    pub const fn up(self) -> Vec3 {
        match self {
            CubeFace::PosY => Vec3::Z,
            CubeFace::NegY => Vec3::NEG_Z,
            _ => Vec3::NEG_Y,
        }
    }

    /// Face key as written in asset manifests (`x+`, `x-`, ...).
    pub const fn key(self) -> &'static str {
        match self {
            CubeFace::PosX => "x+",
            CubeFace::NegX => "x-",
            CubeFace::PosY => "y+",
            CubeFace::NegY => "y-",
            CubeFace::PosZ => "z+",
            CubeFace::NegZ => "z-",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        CubeFace::ALL.into_iter().find(|f| f.key() == key)
    }
}

impl fmt::Display for CubeFace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// One value per cube face, stored in [`CubeFace::ALL`] order.
#[derive(Debug, Clone, PartialEq)]
pub struct CubeFaces<T>([T; 6]);

impl<T> CubeFaces<T> {
    /// Builds the set by calling `f` once per face, in face order.
    pub fn from_fn(mut f: impl FnMut(CubeFace) -> T) -> Self {
        Self(CubeFace::ALL.map(&mut f))
    }

    /// Like [`from_fn`](Self::from_fn), stopping at the first error.
    pub fn try_from_fn<E>(mut f: impl FnMut(CubeFace) -> Result<T, E>) -> Result<Self, E> {
        let [px, nx, py, ny, pz, nz] = CubeFace::ALL;
        Ok(Self([f(px)?, f(nx)?, f(py)?, f(ny)?, f(pz)?, f(nz)?]))
    }

    pub fn iter(&self) -> impl Iterator<Item = (CubeFace, &T)> {
        CubeFace::ALL.into_iter().zip(self.0.iter())
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (CubeFace, &mut T)> {
        CubeFace::ALL.into_iter().zip(self.0.iter_mut())
    }

    pub fn map<U>(self, mut f: impl FnMut(CubeFace, T) -> U) -> CubeFaces<U> {
        let [px, nx, py, ny, pz, nz] = self.0;
        CubeFaces([
            f(CubeFace::PosX, px),
            f(CubeFace::NegX, nx),
            f(CubeFace::PosY, py),
            f(CubeFace::NegY, ny),
            f(CubeFace::PosZ, pz),
            f(CubeFace::NegZ, nz),
        ])
    }
}

impl<T> Index<CubeFace> for CubeFaces<T> {
    type Output = T;

    #[inline]
    fn index(&self, face: CubeFace) -> &T {
        &self.0[face.layer() as usize]
    }
}

impl<T> IndexMut<CubeFace> for CubeFaces<T> {
    #[inline]
    fn index_mut(&mut self, face: CubeFace) -> &mut T {
        &mut self.0[face.layer() as usize]
    }
}
