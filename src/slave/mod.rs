//! Slave Worker Loop
//!
//! Connects to the master, receives the scene exactly once, preps the
//! engine, then loops: receive a work unit, render or probe, return the
//! result. Every error past the handshake is fatal for the slave: it
//! disconnects and the master re-queues whatever it was holding.

pub mod engine;

pub use engine::{Engine, ProbeKind, SolidEngine};

use std::net::TcpStream;

use log::{debug, info};

use crate::config::SlaveConfig;
use crate::errors::{RaynetError, Result};
use crate::protocol::{SlaveData, VERSION_KEY, WORK_HEADER_BYTES, WorkHeader};
use crate::scene::codec;
use crate::wire::{ByteReader, ByteWriter, WireStream, flip_from_probe};

/// Connect to the master and serve until it hangs up.
pub fn run(cfg: &SlaveConfig, engine: &mut dyn Engine) -> Result<()> {
    let stream = TcpStream::connect((cfg.master_host.as_str(), cfg.master_port))?;
    info!("connected to master {}:{}", cfg.master_host, cfg.master_port);
    serve(stream, engine)
}

/// Handshake and work loop over an established connection.
pub fn serve(stream: TcpStream, engine: &mut dyn Engine) -> Result<()> {
    stream.set_nodelay(true)?;
    let mut ws = WireStream::new(stream, false);

    // Endian probe first; every scalar after it honors the flip flag.
    let flip = flip_from_probe(ws.recv_u16()?)?;
    ws.set_flip(flip);

    // Scene push, then the version key; a mismatch ends the connection.
    let scene_len = ws.recv_u32()? as usize;
    let blob = ws.recv_vec(scene_len)?;
    let key = ws.recv_u32()?;
    if key != VERSION_KEY {
        return Err(RaynetError::VersionMismatch {
            expected: VERSION_KEY,
            got: key,
        });
    }

    let scene = codec::unpack_scene(&blob)?;
    info!(
        "scene unpacked: {} meshes, {} triangles",
        scene.meshes.len(),
        scene.total_tri_num()
    );
    engine.prep(&scene)?;

    loop {
        // The master closing between units is the normal way out.
        let hdr_bytes = match ws.recv_vec(WORK_HEADER_BYTES) {
            Ok(bytes) => bytes,
            Err(RaynetError::Io(e)) => {
                debug!("master hung up: {e}");
                return Ok(());
            }
            Err(e) => return Err(e),
        };
        let header = WorkHeader::decode(&mut ByteReader::new(&hdr_bytes, flip))?;

        let data_len = ws.recv_u16()? as usize;
        let data = ws.recv_vec(data_len)?;
        let slave_data = SlaveData::decode(&mut ByteReader::new(&data, flip))?;

        let mut reply = if flip {
            ByteWriter::swapped()
        } else {
            ByteWriter::new()
        };

        match slave_data {
            SlaveData::Render {
                frame,
                pos,
                focus,
                mode,
            } => {
                let pixels = engine.render(&header, pos, focus, &mode)?;
                if pixels.len() != header.pixel_bytes() {
                    return Err(RaynetError::FieldOutOfBounds {
                        context: "engine tile size",
                        value: pixels.len() as u64,
                    });
                }
                header.encode(&mut reply);
                reply.write_bytes(&pixels);
                reply.write_u16(frame);
            }
            SlaveData::Shot { pos, dir } => {
                let report = engine.probe(pos, dir, ProbeKind::Shotline)?;
                encode_probe_reply(&mut reply, &header, &report, flip);
            }
            SlaveData::Spall { pos, dir, angle } => {
                let report = engine.probe(pos, dir, ProbeKind::Spall { angle })?;
                encode_probe_reply(&mut reply, &header, &report, flip);
            }
        }

        ws.send_bytes(&reply.into_vec())?;
    }
}

/// Probe replies carry an explicit payload length after the echoed header;
/// tile replies are sized from the header itself.
fn encode_probe_reply(
    reply: &mut ByteWriter,
    header: &WorkHeader,
    report: &crate::protocol::ProbeReport,
    flip: bool,
) {
    header.encode(reply);
    let mut payload = if flip {
        ByteWriter::swapped()
    } else {
        ByteWriter::new()
    };
    report.encode(&mut payload);
    let payload = payload.into_vec();
    reply.write_u32(payload.len() as u32);
    reply.write_bytes(&payload);
}
