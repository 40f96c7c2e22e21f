//! Event Translation
//!
//! Turns an observer's uploaded event batch into camera-rig mutations,
//! probe requests and session control. The translator is pure over the
//! rig; the caller holds the update mutex, applies the returned
//! [`Outcome`], and composes the next frame's slave data from the mutated
//! rig.

use glam::Vec3;

use super::rig::{CameraRig, ModeKey};
use crate::config::Profile;
use crate::protocol::{ButtonMask, EventKind, WireEvent, buttons, keys};

/// A probe the translator wants dispatched ahead of the tile backlog.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ProbeRequest {
    Shotline { pos: Vec3, dir: Vec3 },
    SpallCone { pos: Vec3, dir: Vec3, angle: f32 },
}

/// Side effects of one event batch.
#[derive(Debug, Default, PartialEq)]
pub struct Outcome {
    pub probes: Vec<ProbeRequest>,
    /// Controller requested master shutdown (F12).
    pub shutdown: bool,
    /// The issuing session asked to detach (`d`).
    pub detach: bool,
}

/// Drag sensitivity in degrees per pixel.
const DRAG_DEG_PER_PX: f32 = 0.035;

/// Keyboard dolly/strafe step relative to the motion scale.
const KEY_STEP: f32 = 10.0;

/// Translate a batch. `controller` gates shutdown and render-mode changes.
pub fn translate_batch(
    rig: &mut CameraRig,
    events: &[WireEvent],
    controller: bool,
    profile: Profile,
) -> Outcome {
    let mut out = Outcome::default();
    for ev in events {
        let updated = match ev.kind {
            EventKind::KeyDown => key_down(rig, ev.keysym, controller, &mut out),
            EventKind::KeyUp => {
                if matches!(ev.keysym, keys::LSHIFT | keys::RSHIFT) {
                    rig.shift = false;
                }
                false
            }
            EventKind::ButtonDown => {
                match ev.button {
                    buttons::WHEEL_UP => rig.scale *= 1.25,
                    buttons::WHEEL_DOWN => rig.scale *= 0.8,
                    _ => {}
                }
                true
            }
            EventKind::ButtonUp => false,
            EventKind::Motion => motion(rig, ev),
        };

        if updated {
            rig.normalize(profile);
            rig.update_focus();
        }
    }
    out
}

fn key_down(rig: &mut CameraRig, keysym: u16, controller: bool, out: &mut Outcome) -> bool {
    match keysym {
        keys::LSHIFT | keys::RSHIFT => {
            rig.shift = true;
        }

        // Render-mode hotkeys; controller only.
        keys::K_1 if controller => rig.mode = ModeKey::Phong,
        keys::K_2 if controller => rig.mode = ModeKey::Plane,
        keys::K_3 if controller => rig.mode = ModeKey::Spall,
        keys::K_4 if controller => rig.mode = ModeKey::Component,
        keys::K_8 if controller => rig.mode = ModeKey::Depth,
        keys::K_9 if controller => rig.mode = ModeKey::Grid,
        keys::K_0 if controller => rig.mode = ModeKey::Normal,

        keys::UP => {
            let step = (rig.focus - rig.pos) * (rig.scale * KEY_STEP);
            rig.pos += step;
        }
        keys::DOWN => {
            let step = (rig.focus - rig.pos) * (rig.scale * KEY_STEP);
            rig.pos -= step;
        }
        keys::LEFT => {
            rig.pos += strafe_step(rig, KEY_STEP);
        }
        keys::RIGHT => {
            rig.pos -= strafe_step(rig, KEY_STEP);
        }

        keys::F12 if controller => out.shutdown = true,
        keys::K_D => out.detach = true,
        keys::K_G => rig.mouse_grab = !rig.mouse_grab,

        // Numpad axis snaps: radius to the cor is preserved, shift picks
        // the opposite side. Vertical snaps back off the pole slightly so
        // the azimuth stays meaningful.
        keys::KP_1 => {
            let az = if rig.shift { 180.0 } else { 0.0 };
            rig.snap_to(az, 0.0);
        }
        keys::KP_3 => {
            let az = if rig.shift { 270.0 } else { 90.0 };
            rig.snap_to(az, 0.0);
        }
        keys::KP_7 => {
            let el = if rig.shift { -89.99 } else { 89.99 };
            rig.snap_to(0.0, el);
        }

        // Jump to the last shotline and aim along it.
        keys::KP_0 => {
            let dir = rig.shot_dir.normalize_or(Vec3::X);
            rig.pos = rig.shot_pos;
            rig.azimuth = dir.y.atan2(dir.x).to_degrees().rem_euclid(360.0);
            rig.elevation = dir.z.clamp(-1.0, 1.0).asin().to_degrees();
        }

        keys::KP_DIVIDE => {
            let dir = (rig.focus - rig.pos).normalize_or(Vec3::X);
            rig.shot_pos = rig.pos;
            rig.shot_dir = dir;
            out.probes.push(ProbeRequest::Shotline { pos: rig.pos, dir });
        }
        keys::KP_MULTIPLY => {
            let dir = (rig.focus - rig.pos).normalize_or(Vec3::X);
            rig.shot_pos = rig.pos;
            rig.shot_dir = dir;
            out.probes.push(ProbeRequest::SpallCone {
                pos: rig.pos,
                dir,
                angle: rig.spall_angle,
            });
        }

        _ => return false,
    }
    true
}

fn strafe_step(rig: &CameraRig, factor: f32) -> Vec3 {
    let view = rig.focus - rig.pos;
    Vec3::Z.cross(view) * (rig.scale * factor)
}

fn motion(rig: &mut CameraRig, ev: &WireEvent) -> bool {
    let held = ButtonMask::from_bits_truncate(ev.motion_state);
    if held.is_empty() || !rig.mouse_grab {
        return false;
    }

    // Inverted drag: pulling the mouse drags the world.
    let dx = f32::from(-ev.motion_xrel);
    let dy = f32::from(-ev.motion_yrel);

    if held.contains(ButtonMask::LEFT) {
        // Dolly along the view vector.
        let step = (rig.focus - rig.pos) * (rig.scale * dy);
        rig.pos += step;
    } else if held.contains(ButtonMask::RIGHT) {
        if rig.shift {
            // Orbit around the center of rotation at constant horizontal
            // radius, tracking azimuth with the swing.
            let offset = rig.cor - rig.pos;
            let radius = offset.truncate().length();
            if radius > f32::EPSILON {
                let mut theta = offset.y.atan2(offset.x).to_degrees();
                theta -= DRAG_DEG_PER_PX * dx;
                let theta = theta.to_radians();
                rig.pos.x = rig.cor.x - radius * theta.cos();
                rig.pos.y = rig.cor.y - radius * theta.sin();
            }
            rig.azimuth -= DRAG_DEG_PER_PX * dx;
        } else {
            // Free look.
            rig.azimuth += DRAG_DEG_PER_PX * dx;
            rig.elevation -= DRAG_DEG_PER_PX * dy;
        }
    } else if held.contains(ButtonMask::MIDDLE) {
        // Lift in Z, pan in screen X.
        rig.pos.z += rig.scale * dy;
        let step = strafe_step(rig, dx);
        rig.pos += step;
    }
    true
}

// ============================================================================
// Tests
// ============================================================================
