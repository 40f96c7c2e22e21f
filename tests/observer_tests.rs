//! Observer Protocol Tests
//!
//! Tests for:
//! - endian-mismatch handshake arithmetic (foreign observer simulation)
//! - compressed vs raw frame parity
//! - console round trips through the scripting bridge
//! - controller gating of shutdown
//! - session detach

mod common;

use std::io::{Read, Write};
use std::net::TcpStream;

use common::{ScriptSlave, launch_master, test_scene};
use raynet::observer::FrameReply;
use raynet::protocol::{ObserverOp, SlaveData, WireEvent, keys};
use raynet::wire::flip_from_probe;
use raynet::{ObserverClient, ObserverConfig};

fn observer_for(handle: &raynet::MasterHandle, compress: bool) -> ObserverClient {
    ObserverClient::connect(&ObserverConfig {
        master_host: "127.0.0.1".into(),
        master_port: handle.observer_addr.port(),
        compress,
    })
    .expect("observer connect")
}

fn expect_frame(observer: &mut ObserverClient) -> raynet::Overlay {
    match observer.request_frame().expect("frame exchange") {
        FrameReply::Frame(overlay) => overlay,
        FrameReply::Quit => panic!("unexpected quit"),
    }
}

fn expect_quit(observer: &mut ObserverClient) {
    match observer.request_frame().expect("frame exchange") {
        FrameReply::Quit => {}
        FrameReply::Frame(_) => panic!("expected quit"),
    }
}

/// Per-tile color keyed on the grid origin, so assembly mistakes show.
fn tile_color(orig_x: u32, orig_y: u32) -> [u8; 3] {
    [(orig_x / 32) as u8 * 100 + 10, (orig_y / 32) as u8 * 100 + 20, 77]
}

fn serve_one_frame_patterned(slave: &mut ScriptSlave) {
    for _ in 0..4 {
        let (header, data) = slave.recv_unit();
        let SlaveData::Render { frame, .. } = data else {
            panic!("expected render unit");
        };
        slave.reply_tile(&header, frame, tile_color(header.orig_x, header.orig_y));
    }
}

/// Expected full frame for the patterned serving above.
fn patterned_frame() -> Vec<u8> {
    let mut out = vec![0u8; 3 * 64 * 64];
    for y in 0..64u32 {
        for x in 0..64u32 {
            let c = tile_color(x / 32 * 32, y / 32 * 32);
            let off = 3 * (y as usize * 64 + x as usize);
            out[off..off + 3].copy_from_slice(&c);
        }
    }
    out
}

// ============================================================================
// S3: endian-mismatch handshake
// ============================================================================

#[test]
fn init_handshake_flips_for_foreign_observer() {
    let db = test_scene(64, 64, 32, 32);
    let handle = launch_master(&db, false);

    // Speak the raw protocol and interpret every scalar the way an
    // opposite-endian host would load it.
    let foreign16 = |b: [u8; 2]| u16::from_ne_bytes(b).swap_bytes();
    let foreign32 = |b: [u8; 4]| u32::from_ne_bytes(b).swap_bytes();

    let mut stream = TcpStream::connect(handle.observer_addr).unwrap();
    stream.write_all(&[ObserverOp::Init as u8]).unwrap();

    let mut probe = [0u8; 2];
    stream.read_exact(&mut probe).unwrap();
    let probe_as_seen = foreign16(probe);
    assert_eq!(probe_as_seen, 0x0100);
    let flip = flip_from_probe(probe_as_seen).unwrap();
    assert!(flip);

    let mut w_bytes = [0u8; 4];
    stream.read_exact(&mut w_bytes).unwrap();
    let w_as_seen = foreign32(w_bytes);
    // On the wire the width reads as 0x40000000 to the mismatched host...
    assert_eq!(w_as_seen, 0x4000_0000);
    // ...and flipping recovers W = 64.
    assert_eq!(if flip { w_as_seen.swap_bytes() } else { w_as_seen }, 64);

    let mut h_bytes = [0u8; 4];
    stream.read_exact(&mut h_bytes).unwrap();
    assert_eq!(foreign32(h_bytes).swap_bytes(), 64);

    drop(stream);
    handle.shutdown();
    handle.wait().unwrap();
}

// ============================================================================
// S6: compressed and raw downloads are bit-identical
// ============================================================================

#[test]
fn compressed_and_raw_frames_match() {
    let expected = patterned_frame();

    // Raw session.
    let db = test_scene(64, 64, 32, 32);
    let raw_handle = launch_master(&db, false);
    let mut raw_slave = ScriptSlave::connect(raw_handle.slave_addr);
    let mut raw_observer = observer_for(&raw_handle, false);
    serve_one_frame_patterned(&mut raw_slave);
    expect_frame(&mut raw_observer);
    let raw_frame = raw_observer.frame.clone();

    raw_handle.shutdown();
    raw_slave.drain([0, 0, 0]);
    raw_handle.wait().unwrap();

    // Compressed session over the same scene and tile pattern.
    let comp_handle = launch_master(&db, true);
    let mut comp_slave = ScriptSlave::connect(comp_handle.slave_addr);
    let mut comp_observer = observer_for(&comp_handle, true);
    serve_one_frame_patterned(&mut comp_slave);
    expect_frame(&mut comp_observer);
    let comp_frame = comp_observer.frame.clone();

    comp_handle.shutdown();
    comp_slave.drain([0, 0, 0]);
    comp_handle.wait().unwrap();

    assert_eq!(raw_frame, expected);
    assert_eq!(comp_frame, expected);
    assert_eq!(raw_frame, comp_frame);
}

// ============================================================================
// Console messages
// ============================================================================

#[test]
fn console_reaches_the_camera() {
    let db = test_scene(64, 64, 32, 32);
    let handle = launch_master(&db, false);
    let mut observer = observer_for(&handle, false);

    assert_eq!(
        observer.send_console("set_camera_ae 90 0").unwrap(),
        "ok"
    );
    let rig = handle.rig_snapshot();
    assert_eq!(rig.azimuth, 90.0);
    assert_eq!(rig.elevation, 0.0);

    assert_eq!(observer.send_console("get_camera_ae").unwrap(), "90 0");
    assert!(
        observer
            .send_console("warp 9")
            .unwrap()
            .starts_with("error")
    );

    observer.quit();
    handle.shutdown();
    handle.wait().unwrap();
}

// ============================================================================
// Controller semantics
// ============================================================================

#[test]
fn only_the_controller_shuts_down() {
    let db = test_scene(64, 64, 32, 32);
    let handle = launch_master(&db, false);

    let mut slave = ScriptSlave::connect(handle.slave_addr);
    let mut first = observer_for(&handle, false);
    let mut second = observer_for(&handle, false);

    slave.serve_tiles(4, [5, 5, 5]); // frame 0
    let overlay_a = expect_frame(&mut first);
    let overlay_b = expect_frame(&mut second);
    assert!(overlay_a.controller);
    assert!(!overlay_b.controller);

    // The non-controller's F12 is ignored.
    slave.serve_tiles(4, [5, 5, 5]); // frame 1
    second.queue_event(WireEvent::key_down(keys::F12));
    expect_frame(&mut second);
    assert!(handle.is_alive());

    // The controller's F12 stops the master.
    expect_frame(&mut first);
    slave.serve_tiles(4, [5, 5, 5]); // frame 2
    first.queue_event(WireEvent::key_down(keys::F12));
    expect_frame(&mut first);
    assert!(!handle.is_alive());

    expect_quit(&mut first);
    expect_quit(&mut second);

    slave.drain([5, 5, 5]);
    handle.wait().unwrap();
}

// ============================================================================
// Detach
// ============================================================================

#[test]
fn detach_closes_only_that_session() {
    let db = test_scene(64, 64, 32, 32);
    let handle = launch_master(&db, false);

    let mut slave = ScriptSlave::connect(handle.slave_addr);
    let mut observer = observer_for(&handle, false);

    slave.serve_tiles(4, [9, 9, 9]);
    observer.queue_event(WireEvent::key_down(keys::K_D));
    expect_frame(&mut observer);

    // The detach wakes the session; the next exchange says goodbye.
    expect_quit(&mut observer);
    assert!(handle.is_alive());

    handle.shutdown();
    slave.drain([9, 9, 9]);
    handle.wait().unwrap();
}
