//! Light types for the scene

use bytemuck::{Pod, Zeroable};
use glam::{Vec3, Vec4};

/// Directional light (like the sun).
#[derive(Debug, Clone)]
pub struct DirectionalLight {
    pub direction: Vec3,
    pub color: Vec3,
    pub intensity: f32,
}

impl Default for DirectionalLight {
    fn default() -> Self {
        Self {
            direction: Vec3::new(-0.5, -1.0, -0.5).normalize(),
            color: Vec3::ONE,
            intensity: 1.0,
        }
    }
}

impl DirectionalLight {
    pub fn new(direction: Vec3, color: Vec3, intensity: f32) -> Self {
        Self {
            direction: direction.normalize(),
            color,
            intensity,
        }
    }

    /// Pack for a 32-byte uniform block.
    pub fn to_uniform(&self) -> LightUniforms {
        LightUniforms {
            direction: self.direction.extend(0.0),
            color: self.color.extend(self.intensity),
        }
    }
}

/// GPU-friendly directional light block.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct LightUniforms {
    /// xyz = direction, w unused
    pub direction: Vec4,
    /// rgb = color, a = intensity
    pub color: Vec4,
}
