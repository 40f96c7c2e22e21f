//! Observer Console Bridge
//!
//! `OP_MESG` hands an observer's console line to whatever scripting
//! backend the master was launched with. The trait passes the camera rig
//! through the call so backends can read and steer the camera without
//! holding a reference into the master; the session thread already owns
//! the update mutex when it evaluates.

use super::rig::CameraRig;

/// Pluggable console backend.
pub trait ScriptingBridge: Send {
    /// Evaluate one console line and produce the reply text.
    fn eval(&mut self, code: &str, rig: &mut CameraRig) -> String;
}

/// Backend that rejects everything; useful when no console is wanted.
#[derive(Debug, Default)]
pub struct NullBridge;

impl ScriptingBridge for NullBridge {
    fn eval(&mut self, _code: &str, _rig: &mut CameraRig) -> String {
        "console disabled".to_string()
    }
}

/// Built-in camera console: the getter/setter surface observers expect.
///
/// ```text
/// get_camera_position            -> "x y z"
/// set_camera_position x y z
/// get_camera_ae                  -> "azimuth elevation"
/// set_camera_ae az el
/// ```
#[derive(Debug, Default)]
pub struct CameraConsole;

impl ScriptingBridge for CameraConsole {
    fn eval(&mut self, code: &str, rig: &mut CameraRig) -> String {
        let tokens: Vec<&str> = code.split_whitespace().collect();
        match tokens.as_slice() {
            ["get_camera_position"] => {
                format!("{} {} {}", rig.pos.x, rig.pos.y, rig.pos.z)
            }
            ["set_camera_position", x, y, z] => {
                match (x.parse(), y.parse(), z.parse()) {
                    (Ok(x), Ok(y), Ok(z)) => {
                        rig.pos = glam::Vec3::new(x, y, z);
                        rig.update_focus();
                        String::from("ok")
                    }
                    _ => String::from("error: expected three numbers"),
                }
            }
            ["get_camera_ae"] => format!("{} {}", rig.azimuth, rig.elevation),
            ["set_camera_ae", az, el] => match (az.parse(), el.parse()) {
                (Ok(az), Ok(el)) => {
                    rig.azimuth = az;
                    rig.elevation = el;
                    rig.update_focus();
                    String::from("ok")
                }
                _ => String::from("error: expected two numbers"),
            },
            [] => String::new(),
            _ => format!("error: unknown command '{}'", tokens[0]),
        }
    }
}
