//! Shared Wire Protocol
//!
//! Op codes and fixed-layout records spoken on both the slave and the
//! observer channels. Everything here encodes through the [`wire`]
//! cursors so a single flip flag, fixed at handshake time, covers every
//! scalar on a connection.
//!
//! [`wire`]: crate::wire

use glam::Vec3;

use crate::errors::{RaynetError, Result};
use crate::wire::{ByteReader, ByteWriter};

/// Protocol version key exchanged right after the scene push; a mismatch
/// closes the connection.
pub const VERSION_KEY: u32 = 0x5259_4E03;

/// Default TCP port slaves connect to.
pub const DEFAULT_SLAVE_PORT: u16 = 1982;

/// Default TCP port observers connect to.
pub const DEFAULT_OBSERVER_PORT: u16 = 1984;

/// Upper bound on events per `OP_FRAME` upload.
pub const MAX_EVENT_BATCH: usize = 64;

// ============================================================================
// Op codes
// ============================================================================

/// One-byte ops on the observer channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ObserverOp {
    Init = 1,
    Frame = 2,
    Mesg = 3,
    Quit = 4,
    /// Flow control: proceed with the frame exchange.
    Nop = 5,
    /// Flow control: a shot broadcast precedes the frame exchange.
    Shot = 6,
}

impl ObserverOp {
    pub fn from_u8(v: u8) -> Result<Self> {
        Ok(match v {
            1 => Self::Init,
            2 => Self::Frame,
            3 => Self::Mesg,
            4 => Self::Quit,
            5 => Self::Nop,
            6 => Self::Shot,
            other => return Err(RaynetError::UnexpectedOp(other)),
        })
    }
}

/// First byte of every slave-data blob.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SlaveOp {
    Render = 0x10,
    Shot = 0x11,
    Spall = 0x12,
}

impl SlaveOp {
    pub fn from_u8(v: u8) -> Result<Self> {
        Ok(match v {
            0x10 => Self::Render,
            0x11 => Self::Shot,
            0x12 => Self::Spall,
            other => return Err(RaynetError::UnexpectedOp(other)),
        })
    }
}

// ============================================================================
// Work unit header
// ============================================================================

/// Serialized size of [`WorkHeader`]: four `u32` plus the format byte.
pub const WORK_HEADER_BYTES: usize = 17;

/// Fixed header of every work unit and every result.
///
/// `size_x == 0 && size_y == 0` marks a probe (shotline or spall cone),
/// never a pixel tile; pixel tiles carry the tile dimensions and a grid
/// origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WorkHeader {
    pub orig_x: u32,
    pub orig_y: u32,
    pub size_x: u32,
    pub size_y: u32,
    pub format: u8,
}

impl WorkHeader {
    pub fn tile(orig_x: u32, orig_y: u32, size_x: u32, size_y: u32) -> Self {
        Self {
            orig_x,
            orig_y,
            size_x,
            size_y,
            format: 0,
        }
    }

    pub fn probe() -> Self {
        Self::default()
    }

    pub fn is_probe(&self) -> bool {
        self.size_x == 0 && self.size_y == 0
    }

    /// RGB payload size of a pixel-tile result.
    pub fn pixel_bytes(&self) -> usize {
        3 * self.size_x as usize * self.size_y as usize
    }

    pub fn encode(&self, w: &mut ByteWriter) {
        w.write_u32(self.orig_x);
        w.write_u32(self.orig_y);
        w.write_u32(self.size_x);
        w.write_u32(self.size_y);
        w.write_u8(self.format);
    }

    pub fn decode(r: &mut ByteReader<'_>) -> Result<Self> {
        Ok(Self {
            orig_x: r.read_u32()?,
            orig_y: r.read_u32()?,
            size_x: r.read_u32()?,
            size_y: r.read_u32()?,
            format: r.read_u8()?,
        })
    }
}

// ============================================================================
// Input events
// ============================================================================

/// Serialized size of [`WireEvent`].
pub const EVENT_BYTES: usize = 9;

/// Event record kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum EventKind {
    KeyDown = 0,
    KeyUp = 1,
    ButtonDown = 2,
    ButtonUp = 3,
    Motion = 4,
}

impl EventKind {
    pub fn from_u8(v: u8) -> Result<Self> {
        Ok(match v {
            0 => Self::KeyDown,
            1 => Self::KeyUp,
            2 => Self::ButtonDown,
            3 => Self::ButtonUp,
            4 => Self::Motion,
            other => return Err(RaynetError::UnexpectedOp(other)),
        })
    }
}

bitflags::bitflags! {
    /// Which mouse buttons are held during a motion event.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ButtonMask: u8 {
        const LEFT   = 1 << 0;
        const MIDDLE = 1 << 1;
        const RIGHT  = 1 << 2;
    }
}

/// Mouse button numbers carried in [`WireEvent::button`]. Wheel steps
/// arrive as button presses.
pub mod buttons {
    pub const LEFT: u8 = 1;
    pub const MIDDLE: u8 = 2;
    pub const RIGHT: u8 = 3;
    pub const WHEEL_UP: u8 = 4;
    pub const WHEEL_DOWN: u8 = 5;

    /// Mask bit for a holdable button, empty for wheel steps.
    pub fn mask(button: u8) -> super::ButtonMask {
        super::ButtonMask::from_bits_truncate(match button {
            LEFT => 1 << 0,
            MIDDLE => 1 << 1,
            RIGHT => 1 << 2,
            _ => 0,
        })
    }
}

/// Architecture-neutral key codes (classic keysym values).
pub mod keys {
    pub const BACKQUOTE: u16 = 96;
    pub const K_0: u16 = 48;
    pub const K_1: u16 = 49;
    pub const K_2: u16 = 50;
    pub const K_3: u16 = 51;
    pub const K_4: u16 = 52;
    pub const K_8: u16 = 56;
    pub const K_9: u16 = 57;
    pub const K_D: u16 = 100;
    pub const K_E: u16 = 101;
    pub const K_F: u16 = 102;
    pub const K_G: u16 = 103;
    pub const KP_0: u16 = 256;
    pub const KP_1: u16 = 257;
    pub const KP_3: u16 = 259;
    pub const KP_7: u16 = 263;
    pub const KP_DIVIDE: u16 = 267;
    pub const KP_MULTIPLY: u16 = 268;
    pub const UP: u16 = 273;
    pub const DOWN: u16 = 274;
    pub const RIGHT: u16 = 275;
    pub const LEFT: u16 = 276;
    pub const F1: u16 = 282;
    pub const F2: u16 = 283;
    pub const F11: u16 = 292;
    pub const F12: u16 = 293;
    pub const RSHIFT: u16 = 303;
    pub const LSHIFT: u16 = 304;
}

/// Fixed-layout input event, identical on every architecture. The sender
/// converts scalars to the master's byte order via its stream flip flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WireEvent {
    pub kind: EventKind,
    pub keysym: u16,
    pub button: u8,
    pub motion_state: u8,
    pub motion_xrel: i16,
    pub motion_yrel: i16,
}

impl WireEvent {
    pub fn key_down(keysym: u16) -> Self {
        Self {
            kind: EventKind::KeyDown,
            keysym,
            button: 0,
            motion_state: 0,
            motion_xrel: 0,
            motion_yrel: 0,
        }
    }

    pub fn key_up(keysym: u16) -> Self {
        Self {
            kind: EventKind::KeyUp,
            ..Self::key_down(keysym)
        }
    }

    pub fn button_down(button: u8) -> Self {
        Self {
            kind: EventKind::ButtonDown,
            keysym: 0,
            button,
            motion_state: 0,
            motion_xrel: 0,
            motion_yrel: 0,
        }
    }

    pub fn motion(state: ButtonMask, button: u8, xrel: i16, yrel: i16) -> Self {
        Self {
            kind: EventKind::Motion,
            keysym: 0,
            button,
            motion_state: state.bits(),
            motion_xrel: xrel,
            motion_yrel: yrel,
        }
    }

    pub fn encode(&self, w: &mut ByteWriter) {
        w.write_u8(self.kind as u8);
        w.write_u16(self.keysym);
        w.write_u8(self.button);
        w.write_u8(self.motion_state);
        w.write_i16(self.motion_xrel);
        w.write_i16(self.motion_yrel);
    }

    pub fn decode(r: &mut ByteReader<'_>) -> Result<Self> {
        Ok(Self {
            kind: EventKind::from_u8(r.read_u8()?)?,
            keysym: r.read_u16()?,
            button: r.read_u8()?,
            motion_state: r.read_u8()?,
            motion_xrel: r.read_i16()?,
            motion_yrel: r.read_i16()?,
        })
    }
}

// ============================================================================
// Overlay
// ============================================================================

/// Serialized size of [`Overlay`].
pub const OVERLAY_BYTES: usize = 11 * 4 + 12 + 1 + 2 + 4;

/// Fixed-layout HUD telemetry sent with every frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Overlay {
    pub camera_pos: Vec3,
    pub azimuth: f32,
    pub elevation: f32,
    pub in_hit: Vec3,
    pub out_hit: Vec3,
    /// Zero-padded `"WxH"` string.
    pub resolution: [u8; 12],
    pub controller: bool,
    pub compute_nodes: u16,
    pub scale: f32,
}

impl Overlay {
    /// Format `"WxH"` into the fixed 12-byte field.
    pub fn resolution_field(w: u32, h: u32) -> [u8; 12] {
        let mut out = [0u8; 12];
        let s = format!("{w}x{h}");
        let n = s.len().min(11);
        out[..n].copy_from_slice(&s.as_bytes()[..n]);
        out
    }

    pub fn resolution_str(&self) -> &str {
        let end = self
            .resolution
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(self.resolution.len());
        std::str::from_utf8(&self.resolution[..end]).unwrap_or("")
    }

    pub fn encode(&self, w: &mut ByteWriter) {
        w.write_vec3(self.camera_pos);
        w.write_f32(self.azimuth);
        w.write_f32(self.elevation);
        w.write_vec3(self.in_hit);
        w.write_vec3(self.out_hit);
        w.write_bytes(&self.resolution);
        w.write_u8(u8::from(self.controller));
        w.write_u16(self.compute_nodes);
        w.write_f32(self.scale);
    }

    pub fn decode(r: &mut ByteReader<'_>) -> Result<Self> {
        let camera_pos = r.read_vec3()?;
        let azimuth = r.read_f32()?;
        let elevation = r.read_f32()?;
        let in_hit = r.read_vec3()?;
        let out_hit = r.read_vec3()?;
        let mut resolution = [0u8; 12];
        resolution.copy_from_slice(r.read_bytes(12)?);
        let controller = r.read_u8()? != 0;
        let compute_nodes = r.read_u16()?;
        let scale = r.read_f32()?;
        Ok(Self {
            camera_pos,
            azimuth,
            elevation,
            in_hit,
            out_hit,
            resolution,
            controller,
            compute_nodes,
            scale,
        })
    }
}

// ============================================================================
// Slave data
// ============================================================================

/// Decoded slave-data blob: the variable-length suffix of every work unit.
///
/// Render payloads carry the frame tag and the camera that was current
/// when the dispatcher composed the frame; probe payloads carry the ray.
#[derive(Debug, Clone, PartialEq)]
pub enum SlaveData {
    Render {
        frame: u16,
        pos: Vec3,
        focus: Vec3,
        mode: crate::scene::RenderMode,
    },
    Shot {
        pos: Vec3,
        dir: Vec3,
    },
    Spall {
        pos: Vec3,
        dir: Vec3,
        angle: f32,
    },
}

impl SlaveData {
    pub fn encode(&self, w: &mut ByteWriter) {
        match *self {
            Self::Render {
                frame,
                pos,
                focus,
                ref mode,
            } => {
                w.write_u8(SlaveOp::Render as u8);
                w.write_u16(frame);
                w.write_vec3(pos);
                w.write_vec3(focus);
                w.write_u8(mode.wire_id() as u8);
                mode.encode_tail(w);
            }
            Self::Shot { pos, dir } => {
                w.write_u8(SlaveOp::Shot as u8);
                w.write_vec3(pos);
                w.write_vec3(dir);
            }
            Self::Spall { pos, dir, angle } => {
                w.write_u8(SlaveOp::Spall as u8);
                w.write_vec3(pos);
                w.write_vec3(dir);
                w.write_f32(angle);
            }
        }
    }

    pub fn decode(r: &mut ByteReader<'_>) -> Result<Self> {
        match SlaveOp::from_u8(r.read_u8()?)? {
            SlaveOp::Render => {
                let frame = r.read_u16()?;
                let pos = r.read_vec3()?;
                let focus = r.read_vec3()?;
                let mode_id = u32::from(r.read_u8()?);
                let mode = crate::scene::RenderMode::decode(mode_id, r)?;
                Ok(Self::Render {
                    frame,
                    pos,
                    focus,
                    mode,
                })
            }
            SlaveOp::Shot => Ok(Self::Shot {
                pos: r.read_vec3()?,
                dir: r.read_vec3()?,
            }),
            SlaveOp::Spall => Ok(Self::Spall {
                pos: r.read_vec3()?,
                dir: r.read_vec3()?,
                angle: r.read_f32()?,
            }),
        }
    }

    pub fn to_vec(&self) -> Vec<u8> {
        let mut w = ByteWriter::new();
        self.encode(&mut w);
        w.into_vec()
    }
}

// ============================================================================
// Probe results
// ============================================================================

/// Payload of a shotline or spall-cone result: entry and exit hit points
/// plus the names of every component the ray passed through. The same
/// encoding doubles as the `OP_SHOT` broadcast body on the observer
/// channel.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ProbeReport {
    pub in_hit: Vec3,
    pub out_hit: Vec3,
    pub names: Vec<String>,
}

impl ProbeReport {
    pub fn encode(&self, w: &mut ByteWriter) {
        w.write_vec3(self.in_hit);
        w.write_vec3(self.out_hit);
        w.write_u32(self.names.len() as u32);
        for name in &self.names {
            w.write_name(name);
        }
    }

    pub fn decode(r: &mut ByteReader<'_>) -> Result<Self> {
        let in_hit = r.read_vec3()?;
        let out_hit = r.read_vec3()?;
        let num = r.read_u32()?;
        if num as usize > r.remaining() {
            return Err(RaynetError::MalformedProbe("component count"));
        }
        let mut names = Vec::with_capacity(num as usize);
        for _ in 0..num {
            names.push(r.read_name()?);
        }
        Ok(Self {
            in_hit,
            out_hit,
            names,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn work_header_round_trip() {
        let hdr = WorkHeader::tile(64, 32, 32, 32);
        let mut w = ByteWriter::new();
        hdr.encode(&mut w);
        let buf = w.into_vec();
        assert_eq!(buf.len(), WORK_HEADER_BYTES);

        let mut r = ByteReader::new(&buf, false);
        assert_eq!(WorkHeader::decode(&mut r).unwrap(), hdr);
        assert!(!hdr.is_probe());
        assert_eq!(hdr.pixel_bytes(), 3 * 32 * 32);
    }

    #[test]
    fn probe_header_is_probe() {
        assert!(WorkHeader::probe().is_probe());
    }

    #[test]
    fn event_round_trip_both_orders() {
        let ev = WireEvent::motion(ButtonMask::LEFT | ButtonMask::RIGHT, buttons::RIGHT, -12, 7);
        for swap in [false, true] {
            let mut w = if swap {
                ByteWriter::swapped()
            } else {
                ByteWriter::new()
            };
            ev.encode(&mut w);
            let buf = w.into_vec();
            assert_eq!(buf.len(), EVENT_BYTES);
            let mut r = ByteReader::new(&buf, swap);
            assert_eq!(WireEvent::decode(&mut r).unwrap(), ev);
        }
    }

    #[test]
    fn overlay_round_trip() {
        let overlay = Overlay {
            camera_pos: Vec3::new(1.0, 2.0, 3.0),
            azimuth: 45.0,
            elevation: -10.0,
            in_hit: Vec3::X,
            out_hit: Vec3::new(3.0, 0.0, 0.0),
            resolution: Overlay::resolution_field(640, 480),
            controller: true,
            compute_nodes: 12,
            scale: 0.01,
        };
        let mut w = ByteWriter::new();
        overlay.encode(&mut w);
        let buf = w.into_vec();
        assert_eq!(buf.len(), OVERLAY_BYTES);

        let mut r = ByteReader::new(&buf, false);
        let back = Overlay::decode(&mut r).unwrap();
        assert_eq!(back, overlay);
        assert_eq!(back.resolution_str(), "640x480");
    }

    #[test]
    fn probe_report_round_trip() {
        let report = ProbeReport {
            in_hit: Vec3::new(1.0, 0.0, 0.0),
            out_hit: Vec3::new(3.0, 0.0, 0.0),
            names: vec!["hull".into(), "wing".into()],
        };
        let mut w = ByteWriter::new();
        report.encode(&mut w);
        let buf = w.into_vec();
        let mut r = ByteReader::new(&buf, false);
        assert_eq!(ProbeReport::decode(&mut r).unwrap(), report);
    }

    #[test]
    fn probe_report_rejects_absurd_count() {
        let mut w = ByteWriter::new();
        w.write_vec3(Vec3::ZERO);
        w.write_vec3(Vec3::ZERO);
        w.write_u32(u32::MAX);
        let buf = w.into_vec();
        let mut r = ByteReader::new(&buf, false);
        assert!(ProbeReport::decode(&mut r).is_err());
    }

    #[test]
    fn wheel_buttons_have_no_mask_bit() {
        assert!(buttons::mask(buttons::WHEEL_UP).is_empty());
        assert_eq!(buttons::mask(buttons::LEFT), ButtonMask::LEFT);
    }

    #[test]
    fn slave_data_round_trips() {
        use crate::scene::RenderMode;
        let cases = [
            SlaveData::Render {
                frame: 1,
                pos: Vec3::new(10.0, 10.0, 10.0),
                focus: Vec3::new(9.0, 9.5, 9.25),
                mode: RenderMode::Spall {
                    ray_pos: Vec3::X,
                    ray_dir: Vec3::Y,
                    angle: 10.0,
                },
            },
            SlaveData::Shot {
                pos: Vec3::ZERO,
                dir: Vec3::X,
            },
            SlaveData::Spall {
                pos: Vec3::ZERO,
                dir: Vec3::NEG_Z,
                angle: 12.5,
            },
        ];
        for data in cases {
            let bytes = data.to_vec();
            let mut r = ByteReader::new(&bytes, false);
            assert_eq!(SlaveData::decode(&mut r).unwrap(), data);
        }
    }
}
