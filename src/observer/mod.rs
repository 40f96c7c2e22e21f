//! Observer Client Loop
//!
//! Init handshake, then repeat: request a frame, forward queued input,
//! download the frame (inflating when the session runs compressed), read
//! the overlay, hand everything to the display. Keys the observer itself
//! consumes (magnify, fullscreen, screenshot, console) never reach the
//! master.

pub mod display;

pub use display::{Display, HeadlessDisplay};

use std::io::Read;
use std::net::TcpStream;

use flate2::read::ZlibDecoder;
use log::{debug, info};

use crate::config::ObserverConfig;
use crate::errors::{RaynetError, Result};
use crate::protocol::{
    EVENT_BYTES, MAX_EVENT_BATCH, OVERLAY_BYTES, ObserverOp, Overlay, ProbeReport, WireEvent, keys,
};
use crate::wire::{ByteReader, ByteWriter, WireStream, flip_from_probe};

/// Result of one frame request.
#[derive(Debug)]
pub enum FrameReply {
    /// Frame bytes are in the client's buffer; overlay attached.
    Frame(Overlay),
    /// The master told us to go away.
    Quit,
}

/// Keys handled locally (display concerns) and never forwarded.
pub fn observer_consumes(keysym: u16) -> bool {
    matches!(
        keysym,
        keys::F1 | keys::F2 | keys::F11 | keys::K_E | keys::BACKQUOTE
    )
}

/// Connected observer session.
pub struct ObserverClient {
    ws: WireStream<TcpStream>,
    pub width: u32,
    pub height: u32,
    compress: bool,
    /// Frame pixels from the most recent successful request.
    pub frame: Vec<u8>,
    /// Shot broadcast most recently received from the master.
    pub last_shot: Option<ProbeReport>,
    queued: Vec<WireEvent>,
}

impl ObserverClient {
    /// Connect and run the INIT handshake; after it, the flip flag is
    /// settled and the image size known.
    pub fn connect(cfg: &ObserverConfig) -> Result<Self> {
        let stream = TcpStream::connect((cfg.master_host.as_str(), cfg.master_port))?;
        stream.set_nodelay(true)?;
        let mut ws = WireStream::new(stream, false);

        ws.send_u8(ObserverOp::Init as u8)?;
        let flip = flip_from_probe(ws.recv_u16()?)?;
        ws.set_flip(flip);
        let width = ws.recv_u32()?;
        let height = ws.recv_u32()?;
        info!("observer attached: {width}x{height}, flip {flip}");

        Ok(Self {
            ws,
            width,
            height,
            compress: cfg.compress,
            frame: vec![0; 3 * width as usize * height as usize],
            last_shot: None,
            queued: Vec::new(),
        })
    }

    /// Queue an event for the next frame request; the batch is capped and
    /// overflow is dropped oldest-first like any stale motion.
    pub fn queue_event(&mut self, ev: WireEvent) {
        if self.queued.len() == MAX_EVENT_BATCH {
            self.queued.remove(0);
        }
        self.queued.push(ev);
    }

    /// One full frame exchange.
    pub fn request_frame(&mut self) -> Result<FrameReply> {
        self.ws.send_u8(ObserverOp::Frame as u8)?;

        // Flow control: shot broadcasts may precede the continue byte.
        loop {
            match ObserverOp::from_u8(self.ws.recv_u8()?)? {
                ObserverOp::Nop => break,
                ObserverOp::Quit => {
                    debug!("observer detached from master");
                    return Ok(FrameReply::Quit);
                }
                ObserverOp::Shot => {
                    let len = self.ws.recv_u16()? as usize;
                    let payload = self.ws.recv_vec(len)?;
                    let mut r = ByteReader::new(&payload, self.ws.flips());
                    self.last_shot = Some(ProbeReport::decode(&mut r)?);
                }
                other => return Err(RaynetError::UnexpectedOp(other as u8)),
            }
        }

        // Upload the queued events in the master's byte order.
        let events = std::mem::take(&mut self.queued);
        let mut w = if self.ws.flips() {
            ByteWriter::swapped()
        } else {
            ByteWriter::new()
        };
        w.write_u8(events.len() as u8);
        for ev in &events {
            ev.encode(&mut w);
        }
        debug_assert_eq!(w.len(), 1 + events.len() * EVENT_BYTES);
        self.ws.send_bytes(&w.into_vec())?;

        // Frame download.
        if self.compress {
            let comp_len = self.ws.recv_u32()? as usize;
            let compressed = self.ws.recv_vec(comp_len)?;
            let mut decoder = ZlibDecoder::new(&compressed[..]);
            let mut out = Vec::with_capacity(self.frame.len());
            decoder
                .read_to_end(&mut out)
                .map_err(|e| RaynetError::Compression(e.to_string()))?;
            if out.len() != self.frame.len() {
                return Err(RaynetError::Compression(format!(
                    "inflated {} bytes, expected {}",
                    out.len(),
                    self.frame.len()
                )));
            }
            self.frame = out;
        } else {
            let len = self.frame.len();
            let mut buf = std::mem::take(&mut self.frame);
            self.ws.recv_exact(&mut buf[..len])?;
            self.frame = buf;
        }

        // Overlay.
        let raw = self.ws.recv_vec(OVERLAY_BYTES)?;
        let overlay = Overlay::decode(&mut ByteReader::new(&raw, self.ws.flips()))?;
        Ok(FrameReply::Frame(overlay))
    }

    /// Console round trip through the master's scripting bridge.
    pub fn send_console(&mut self, code: &str) -> Result<String> {
        self.ws.send_u8(ObserverOp::Mesg as u8)?;
        let bytes = code.as_bytes();
        let n = bytes.len().min(255);
        self.ws.send_u8(n as u8)?;
        self.ws.send_bytes(&bytes[..n])?;

        let len = self.ws.recv_u8()? as usize;
        let reply = self.ws.recv_vec(len)?;
        Ok(String::from_utf8_lossy(&reply).into_owned())
    }

    /// Polite detach.
    pub fn quit(&mut self) {
        let _ = self.ws.send_u8(ObserverOp::Quit as u8);
        let _ = self.ws.recv_u8();
    }
}

/// Format the HUD text the way the frontends print it.
pub fn hud_lines(overlay: &Overlay, shot: Option<&ProbeReport>) -> Vec<String> {
    let mut lines = vec![
        format!(
            "position: {:.3} {:.3} {:.3}",
            overlay.camera_pos.x, overlay.camera_pos.y, overlay.camera_pos.z
        ),
        format!(
            "camera_ae: {:.3} {:.3}",
            overlay.azimuth, overlay.elevation
        ),
        format!(
            "in_hit: {:.3} {:.3} {:.3}  out_hit: {:.3} {:.3} {:.3}",
            overlay.in_hit.x,
            overlay.in_hit.y,
            overlay.in_hit.z,
            overlay.out_hit.x,
            overlay.out_hit.y,
            overlay.out_hit.z
        ),
        format!("nodes: {}", overlay.compute_nodes),
        format!("scale: {:.3}", overlay.scale * 100.0),
        format!("res: {}", overlay.resolution_str()),
        format!(
            "controller: {}",
            if overlay.controller { "yes" } else { "no" }
        ),
    ];
    if let Some(shot) = shot {
        lines.push(format!("components: {}", shot.names.join(", ")));
    }
    lines
}

/// Full client loop against a display frontend.
pub fn run(cfg: &ObserverConfig, display: &mut dyn Display) -> Result<()> {
    let mut client = ObserverClient::connect(cfg)?;
    display.init(client.width, client.height)?;

    loop {
        for ev in display.poll_events() {
            let local = matches!(
                ev.kind,
                crate::protocol::EventKind::KeyDown | crate::protocol::EventKind::KeyUp
            ) && observer_consumes(ev.keysym);
            if !local {
                client.queue_event(ev);
            }
        }

        match client.request_frame()? {
            FrameReply::Quit => return Ok(()),
            FrameReply::Frame(overlay) => {
                display.blit(&client.frame)?;
                let hud = hud_lines(&overlay, client.last_shot.as_ref());
                display.draw_overlay(&overlay, &hud);
                display.flip();
            }
        }
    }
}
