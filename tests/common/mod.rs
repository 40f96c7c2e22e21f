//! Shared harness for the end-to-end tests: an in-process master plus a
//! scripted slave that speaks the wire protocol directly, so tests control
//! exactly when tiles and probe results come back.

#![allow(dead_code)]

use std::net::{SocketAddr, TcpStream};

use glam::Vec3;

use raynet::master::{self, CameraConsole, MasterHandle};
use raynet::protocol::{ProbeReport, SlaveData, VERSION_KEY, WORK_HEADER_BYTES, WorkHeader};
use raynet::scene::{Environment, FaceIndices, Mesh, SceneDb};
use raynet::wire::{ByteReader, ByteWriter, ENDIAN_PROBE, WireStream};
use raynet::{MasterConfig, Profile};

/// Small scene with one box mesh so probes have something to hit.
pub fn test_scene(img_w: u32, img_h: u32, tile_w: u32, tile_h: u32) -> SceneDb {
    let mut db = SceneDb::default();
    db.env = Environment {
        img_w,
        img_h,
        tile_w,
        tile_h,
        ..Environment::default()
    };
    db.meshes.push(Mesh::new(
        "wing",
        vec![
            Vec3::new(2.0, -1.0, -1.0),
            Vec3::new(3.0, -1.0, -1.0),
            Vec3::new(3.0, 1.0, 1.0),
            Vec3::new(2.0, 1.0, 1.0),
        ],
        FaceIndices::U16(vec![[0, 1, 2], [0, 2, 3]]),
    ));
    db.mesh_map.push(("wing".into(), "default".into()));
    db
}

/// Launch a master on ephemeral ports.
pub fn launch_master(db: &SceneDb, compress: bool) -> MasterHandle {
    let cfg = MasterConfig {
        slave_port: 0,
        observer_port: 0,
        compress,
        profile: Profile::Interactive,
        ..MasterConfig::default()
    };
    master::launch(cfg, db, Box::new(CameraConsole)).expect("master launch")
}

/// Protocol-level slave under test control.
pub struct ScriptSlave {
    ws: WireStream<TcpStream>,
    pub scene_len: usize,
}

impl ScriptSlave {
    /// Connect and run the whole handshake; panics on any deviation.
    pub fn connect(addr: SocketAddr) -> Self {
        let stream = TcpStream::connect(addr).expect("connect to master");
        stream.set_nodelay(true).unwrap();
        let mut ws = WireStream::new(stream, false);

        assert_eq!(ws.recv_u16().unwrap(), ENDIAN_PROBE);
        let scene_len = ws.recv_u32().unwrap() as usize;
        let blob = ws.recv_vec(scene_len).unwrap();
        assert!(raynet::scene::codec::unpack_scene(&blob).is_ok());
        assert_eq!(ws.recv_u32().unwrap(), VERSION_KEY);

        Self { ws, scene_len }
    }

    /// Receive the next work unit.
    pub fn recv_unit(&mut self) -> (WorkHeader, SlaveData) {
        self.try_recv_unit().expect("master closed the connection")
    }

    /// Receive the next work unit, or `None` once the master hangs up.
    pub fn try_recv_unit(&mut self) -> Option<(WorkHeader, SlaveData)> {
        let hdr = self.ws.recv_vec(WORK_HEADER_BYTES).ok()?;
        let header = WorkHeader::decode(&mut ByteReader::new(&hdr, false)).unwrap();
        let dlen = self.ws.recv_u16().unwrap() as usize;
        let data = self.ws.recv_vec(dlen).unwrap();
        let slave_data = SlaveData::decode(&mut ByteReader::new(&data, false)).unwrap();
        Some((header, slave_data))
    }

    /// Keep answering whatever arrives until the master closes the
    /// connection; used to let a shutdown drain cleanly.
    pub fn drain(mut self, rgb: [u8; 3]) {
        while let Some((header, data)) = self.try_recv_unit() {
            match data {
                SlaveData::Render { frame, .. } => self.reply_tile(&header, frame, rgb),
                _ => self.reply_probe(&header, &ProbeReport::default()),
            }
        }
    }

    /// Return a solid-color tile for a render unit.
    pub fn reply_tile(&mut self, header: &WorkHeader, frame: u16, rgb: [u8; 3]) {
        let mut w = ByteWriter::new();
        header.encode(&mut w);
        let pixels: Vec<u8> = rgb.iter().copied().cycle().take(header.pixel_bytes()).collect();
        w.write_bytes(&pixels);
        w.write_u16(frame);
        self.ws.send_bytes(&w.into_vec()).unwrap();
    }

    /// Return a probe report for a probe unit.
    pub fn reply_probe(&mut self, header: &WorkHeader, report: &ProbeReport) {
        let mut payload = ByteWriter::new();
        report.encode(&mut payload);
        let payload = payload.into_vec();

        let mut w = ByteWriter::new();
        header.encode(&mut w);
        w.write_u32(payload.len() as u32);
        w.write_bytes(&payload);
        self.ws.send_bytes(&w.into_vec()).unwrap();
    }

    /// Serve `n` render units with a solid color, returning each unit's
    /// frame tag in arrival order. Panics if a probe shows up.
    pub fn serve_tiles(&mut self, n: usize, rgb: [u8; 3]) -> Vec<u16> {
        let mut tags = Vec::with_capacity(n);
        for _ in 0..n {
            let (header, data) = self.recv_unit();
            match data {
                SlaveData::Render { frame, .. } => {
                    assert!(!header.is_probe());
                    self.reply_tile(&header, frame, rgb);
                    tags.push(frame);
                }
                other => panic!("expected render unit, got {other:?}"),
            }
        }
        tags
    }
}
