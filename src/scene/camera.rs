//! Camera state as it travels with the scene.
//!
//! This is the *packed* camera (position, focus and lens parameters),
//! not the interactive rig; the master's event translator owns azimuth,
//! elevation and scale and rewrites `pos`/`focus` from them.

use glam::Vec3;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraState {
    pub pos: Vec3,
    pub focus: Vec3,
    /// Roll around the view axis, degrees.
    pub tilt: f32,
    /// Vertical field of view, degrees.
    pub fov: f32,
    /// Depth of field; 0 disables the lens model.
    pub dof: f32,
}

impl Default for CameraState {
    fn default() -> Self {
        Self {
            pos: Vec3::new(10.0, 10.0, 10.0),
            focus: Vec3::ZERO,
            tilt: 0.0,
            fov: 25.0,
            dof: 0.0,
        }
    }
}
