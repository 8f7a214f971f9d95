//! Procedural environment: a sky gradient over a checkered ground plane.

use glam::{Vec2, Vec3};
use speculum_engine::cube::{CubeFace, CubeFaces};

const ZENITH: Vec3 = Vec3::new(0.12, 0.32, 0.72);
const HORIZON: Vec3 = Vec3::new(0.78, 0.86, 0.95);
const GROUND_LIGHT: Vec3 = Vec3::new(0.55, 0.45, 0.32);
const GROUND_DARK: Vec3 = Vec3::new(0.30, 0.24, 0.17);

/// RGBA8 pixels for all six faces, `size x size` each.
pub fn environment(size: u32) -> CubeFaces<Vec<u8>> {
    CubeFaces::from_fn(|face| {
        let mut pixels = Vec::with_capacity((size * size * 4) as usize);
        for y in 0..size {
            for x in 0..size {
                let s = (x as f32 + 0.5) / size as f32 * 2.0 - 1.0;
                let t = (y as f32 + 0.5) / size as f32 * 2.0 - 1.0;
                pixels.extend_from_slice(&texel(face_direction(face, s, t)));
            }
        }
        pixels
    })
}

/// Direction through texel `(s, t)` in `[-1, 1]` of `face`, following the
/// cube-map addressing used by the sampler.
fn face_direction(face: CubeFace, s: f32, t: f32) -> Vec3 {
    match face {
        CubeFace::PosX => Vec3::new(1.0, -t, -s),
        CubeFace::NegX => Vec3::new(-1.0, -t, s),
        CubeFace::PosY => Vec3::new(s, 1.0, t),
        CubeFace::NegY => Vec3::new(s, -1.0, -t),
        CubeFace::PosZ => Vec3::new(s, -t, 1.0),
        CubeFace::NegZ => Vec3::new(-s, -t, -1.0),
    }
}

fn texel(direction: Vec3) -> [u8; 4] {
    let d = direction.normalize();
    let color = if d.y >= 0.0 {
        HORIZON.lerp(ZENITH, d.y.sqrt())
    } else {
        // Project onto the ground plane one unit below the eye.
        let ground = Vec2::new(d.x, d.z) / -d.y;
        let checker = ((ground.x.floor() + ground.y.floor()) as i64).rem_euclid(2) == 0;
        let base = if checker { GROUND_LIGHT } else { GROUND_DARK };
        base.lerp(HORIZON, (1.0 + d.y).powi(8))
    };
    let c = (color.clamp(Vec3::ZERO, Vec3::ONE) * 255.0).round();
    [c.x as u8, c.y as u8, c.z as u8, 255]
}
