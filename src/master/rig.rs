//! Interactive camera rig.
//!
//! The master owns the camera as spherical-interaction state: position,
//! azimuth/elevation, a motion scale, and the probe bookkeeping (shot ray,
//! last hits, center of rotation). The focus point is always derived:
//! `focus = pos + dir(azimuth, elevation)`.

use glam::Vec3;

use crate::config::Profile;
use crate::scene::{CameraState, RenderMode};

/// Unit view direction for an azimuth/elevation pair in degrees.
pub fn azel_dir(azimuth: f32, elevation: f32) -> Vec3 {
    let az = azimuth.to_radians();
    let el = elevation.to_radians();
    Vec3::new(az.cos() * el.cos(), az.sin() * el.cos(), el.sin())
}

/// Which shading mode the next frame requests. Payload-carrying modes are
/// filled from rig state when the per-frame slave data is composed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModeKey {
    Flat,
    Normal,
    Phong,
    Depth,
    Grid,
    Component,
    Path,
    Plane,
    Spall,
}

impl ModeKey {
    pub fn from_render_mode(mode: &RenderMode) -> Self {
        match mode {
            RenderMode::Flat => Self::Flat,
            RenderMode::Normal => Self::Normal,
            RenderMode::Phong => Self::Phong,
            RenderMode::Depth => Self::Depth,
            RenderMode::Grid => Self::Grid,
            RenderMode::Component => Self::Component,
            RenderMode::Path { .. } => Self::Path,
            RenderMode::Plane { .. } => Self::Plane,
            RenderMode::Spall { .. } => Self::Spall,
        }
    }
}

/// Mutable camera/interaction state, guarded by the master's update mutex.
#[derive(Debug, Clone)]
pub struct CameraRig {
    pub pos: Vec3,
    pub focus: Vec3,
    /// Degrees, kept in [0, 360).
    pub azimuth: f32,
    /// Degrees; clamped or wrapped per [`Profile`].
    pub elevation: f32,
    /// Motion scale; wheel steps multiply it.
    pub scale: f32,
    /// Center of rotation for orbit drags, set by the last probe.
    pub cor: Vec3,
    pub shot_pos: Vec3,
    pub shot_dir: Vec3,
    pub in_hit: Vec3,
    pub out_hit: Vec3,
    /// Half-angle of the spall cone, degrees.
    pub spall_angle: f32,
    pub mode: ModeKey,
    pub path_samples: u32,
    pub mouse_grab: bool,
    pub shift: bool,
}

impl CameraRig {
    /// Seed from the loaded scene camera; orientation starts at the
    /// canonical 45°/35° oblique and the focus is rederived from it.
    pub fn new(camera: &CameraState, mode: &RenderMode) -> Self {
        let path_samples = match *mode {
            RenderMode::Path { samples } => samples,
            _ => 32,
        };
        let mut rig = Self {
            pos: camera.pos,
            focus: camera.pos,
            azimuth: 45.0,
            elevation: 35.0,
            scale: 0.01,
            cor: Vec3::ZERO,
            shot_pos: Vec3::ZERO,
            shot_dir: Vec3::X,
            in_hit: Vec3::ZERO,
            out_hit: Vec3::ZERO,
            spall_angle: 10.0,
            mode: ModeKey::from_render_mode(mode),
            path_samples,
            mouse_grab: false,
            shift: false,
        };
        rig.update_focus();
        rig
    }

    pub fn view_dir(&self) -> Vec3 {
        azel_dir(self.azimuth, self.elevation)
    }

    pub fn update_focus(&mut self) {
        self.focus = self.pos + self.view_dir();
    }

    /// Keep azimuth in [0, 360) and elevation inside the profile's range.
    pub fn normalize(&mut self, profile: Profile) {
        self.azimuth = self.azimuth.rem_euclid(360.0);
        self.elevation = match profile {
            Profile::Interactive => self.elevation.clamp(-90.0, 90.0),
            Profile::Tabletop => self.elevation.rem_euclid(360.0),
        };
    }

    /// Record a probe's hit pair and move the center of rotation to its
    /// midpoint.
    pub fn record_hits(&mut self, in_hit: Vec3, out_hit: Vec3) {
        self.in_hit = in_hit;
        self.out_hit = out_hit;
        self.cor = (in_hit + out_hit) * 0.5;
    }

    /// Place the camera at `radius` from the center of rotation along the
    /// given orientation, looking back at it.
    pub fn snap_to(&mut self, azimuth: f32, elevation: f32) {
        let radius = (self.pos - self.cor).length();
        self.azimuth = azimuth;
        self.elevation = elevation;
        self.pos = self.cor - radius * self.view_dir();
    }

    /// The concrete render mode for the next frame, with payload-carrying
    /// variants filled from the current shot state.
    pub fn compose_render_mode(&self) -> RenderMode {
        match self.mode {
            ModeKey::Flat => RenderMode::Flat,
            ModeKey::Normal => RenderMode::Normal,
            ModeKey::Phong => RenderMode::Phong,
            ModeKey::Depth => RenderMode::Depth,
            ModeKey::Grid => RenderMode::Grid,
            ModeKey::Component => RenderMode::Component,
            ModeKey::Path => RenderMode::Path {
                samples: self.path_samples,
            },
            ModeKey::Plane => RenderMode::Plane {
                ray_pos: self.shot_pos,
                ray_dir: self.shot_dir,
            },
            ModeKey::Spall => RenderMode::Spall {
                ray_pos: self.in_hit,
                ray_dir: self.shot_dir,
                angle: self.spall_angle,
            },
        }
    }
}
