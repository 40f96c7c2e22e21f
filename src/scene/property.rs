//! Surface properties keyed by name in the property table.

use glam::Vec3;

/// Optical surface description attached to meshes through the mesh map.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Property {
    pub color: Vec3,
    pub density: f32,
    pub gloss: f32,
    pub emission: f32,
    /// Index of refraction.
    pub ior: f32,
}

/// Fallback for meshes whose property reference does not resolve.
pub const DEFAULT_PROPERTY: Property = Property {
    color: Vec3::new(0.8, 0.8, 0.8),
    density: 0.5,
    gloss: 0.2,
    emission: 0.0,
    ior: 1.0,
};

impl Default for Property {
    fn default() -> Self {
        DEFAULT_PROPERTY
    }
}
