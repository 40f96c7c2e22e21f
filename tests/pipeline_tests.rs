//! Distributed Pipeline Tests
//!
//! Tests for:
//! - single-slave single-frame assembly and download
//! - mid-frame slave drop with work re-queue
//! - probe dispatch, center-of-rotation update and shot broadcast
//! - at-most-one-ahead frame pacing under a slow slave
//! - cooperative shutdown drain

mod common;

use std::thread;
use std::time::Duration;

use glam::Vec3;

use common::{ScriptSlave, launch_master, test_scene};
use raynet::observer::FrameReply;
use raynet::protocol::{ProbeReport, SlaveData, WireEvent, keys};
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

// ============================================================================
// S1: single slave, single frame
// ============================================================================

#[test]
fn single_slave_single_frame() {
    let db = test_scene(64, 64, 32, 32);
    let handle = launch_master(&db, false);

    let mut slave = ScriptSlave::connect(handle.slave_addr);
    assert!(slave.scene_len > 0);

    // Attach the observer first so frame completion wakes it.
    let mut observer = observer_for(&handle, false);
    assert_eq!(observer.width, 64);
    assert_eq!(observer.height, 64);

    // Frame 0 is four tiles, all tagged 0.
    let tags = slave.serve_tiles(4, [255, 0, 0]);
    assert_eq!(tags, vec![0, 0, 0, 0]);

    let overlay = expect_frame(&mut observer);
    assert_eq!(observer.frame.len(), 3 * 64 * 64);
    assert!(observer.frame.chunks(3).all(|px| px == [255, 0, 0]));
    assert_eq!(overlay.resolution_str(), "64x64");
    assert!(overlay.controller);
    assert_eq!(overlay.compute_nodes, 1);

    // Completion reset both slot counters; frame 1's tiles are queued but
    // none have come back yet.
    assert_eq!(handle.tile_counts(), (0, 0));

    handle.shutdown();
    slave.drain([255, 0, 0]);
    handle.wait().unwrap();
}

// ============================================================================
// S2: mid-frame slave drop re-queues the outstanding tile
// ============================================================================

#[test]
fn slave_drop_requeues_outstanding_work() {
    let db = test_scene(64, 64, 32, 32);
    let handle = launch_master(&db, false);

    // First slave takes one tile and dies without answering.
    let dropped_origin = {
        let mut quitter = ScriptSlave::connect(handle.slave_addr);
        let (header, _) = quitter.recv_unit();
        (header.orig_x, header.orig_y)
        // socket drops here
    };

    // Give the master a moment to notice and re-queue.
    thread::sleep(Duration::from_millis(50));

    // Second slave completes the frame, including the re-queued tile; the
    // observer attaches first so the completion wakes it.
    let mut observer = observer_for(&handle, false);
    let mut worker = ScriptSlave::connect(handle.slave_addr);
    let mut origins = Vec::new();
    for _ in 0..4 {
        let (header, data) = worker.recv_unit();
        let SlaveData::Render { frame, .. } = data else {
            panic!("expected render unit");
        };
        origins.push((header.orig_x, header.orig_y));
        worker.reply_tile(&header, frame, [0, 255, 0]);
    }
    assert!(origins.contains(&dropped_origin));
    origins.sort_unstable();
    assert_eq!(origins, vec![(0, 0), (0, 32), (32, 0), (32, 32)]);

    expect_frame(&mut observer);
    assert!(observer.frame.chunks(3).all(|px| px == [0, 255, 0]));

    handle.shutdown();
    worker.drain([0, 255, 0]);
    handle.wait().unwrap();
}

// ============================================================================
// S4: probe updates the center of rotation and reaches every observer
// ============================================================================

#[test]
fn probe_sets_cor_and_broadcasts() {
    let db = test_scene(64, 64, 32, 32);
    let handle = launch_master(&db, false);

    let mut slave = ScriptSlave::connect(handle.slave_addr);
    let mut observer = observer_for(&handle, false);

    slave.serve_tiles(4, [10, 10, 10]); // frame 0
    expect_frame(&mut observer);

    slave.serve_tiles(4, [10, 10, 10]); // frame 1

    // Upload the shotline key with the second exchange.
    observer.queue_event(WireEvent::key_down(keys::KP_DIVIDE));
    expect_frame(&mut observer);

    // The probe jumped the queue; at most the one in-flight tile precedes
    // it on this slave's socket.
    let (header, data) = loop {
        let (header, data) = slave.recv_unit();
        match data {
            SlaveData::Render { frame, .. } => slave.reply_tile(&header, frame, [10, 10, 10]),
            probe => break (header, probe),
        }
    };
    assert!(header.is_probe());
    match data {
        SlaveData::Shot { pos, dir } => {
            let rig = handle.rig_snapshot();
            assert!((pos - rig.shot_pos).length() < 1e-5);
            assert!((dir - rig.shot_dir).length() < 1e-5);
            assert!((dir.length() - 1.0).abs() < 1e-5);
        }
        other => panic!("expected shotline, got {other:?}"),
    }
    slave.reply_probe(
        &header,
        &ProbeReport {
            in_hit: Vec3::new(1.0, 0.0, 0.0),
            out_hit: Vec3::new(3.0, 0.0, 0.0),
            names: vec!["wing".into()],
        },
    );

    // The broadcast wakes the gated observer even without a new frame.
    let overlay = expect_frame(&mut observer);
    assert_eq!(overlay.in_hit, Vec3::new(1.0, 0.0, 0.0));
    assert_eq!(overlay.out_hit, Vec3::new(3.0, 0.0, 0.0));
    let shot = observer.last_shot.as_ref().expect("shot broadcast");
    assert_eq!(shot.names, vec!["wing".to_string()]);
    assert_eq!(shot.in_hit, Vec3::new(1.0, 0.0, 0.0));

    // cor is the hit midpoint.
    assert_eq!(handle.rig_snapshot().cor, Vec3::new(2.0, 0.0, 0.0));

    handle.shutdown();
    slave.drain([10, 10, 10]);
    handle.wait().unwrap();
}

// ============================================================================
// S5: the dispatcher never runs more than one frame ahead
// ============================================================================

#[test]
fn at_most_one_frame_ahead() {
    let db = test_scene(64, 64, 32, 32);
    let handle = launch_master(&db, false);

    let mut slave = ScriptSlave::connect(handle.slave_addr);

    // A deliberately slow slave: if the dispatcher could run ahead, tags
    // from frame k+1 would interleave before frame k finished.
    let mut tags = Vec::new();
    for _ in 0..12 {
        let (header, data) = slave.recv_unit();
        let SlaveData::Render { frame, .. } = data else {
            panic!("expected render unit");
        };
        thread::sleep(Duration::from_millis(10));
        slave.reply_tile(&header, frame, [1, 2, 3]);
        tags.push(frame);
    }

    // Three full frames, strictly in blocks: 0000 1111 0000.
    assert_eq!(tags, vec![0, 0, 0, 0, 1, 1, 1, 1, 0, 0, 0, 0]);

    handle.shutdown();
    slave.drain([1, 2, 3]);
    handle.wait().unwrap();
}

// ============================================================================
// Cooperative shutdown drains in-flight work
// ============================================================================

#[test]
fn shutdown_drains_and_joins() {
    let db = test_scene(64, 64, 32, 32);
    let handle = launch_master(&db, false);

    let mut slave = ScriptSlave::connect(handle.slave_addr);

    // Take a unit, then trigger shutdown while it is outstanding.
    let (header, data) = slave.recv_unit();
    let SlaveData::Render { frame, .. } = data else {
        panic!("expected render unit");
    };
    handle.shutdown();
    slave.reply_tile(&header, frame, [0, 0, 0]);

    // The master drains the remaining frame-0 tiles, then hangs up.
    slave.drain([0, 0, 0]);
    handle.wait().unwrap();
}
