//! Master Process
//!
//! Owns the scene, the camera rig and the two frame slots; fans tile work
//! out to the slave pool and serves assembled frames to observers.
//!
//! # Threads
//!
//! - the dispatch loop (spawned by [`launch`]) gates on the double-buffer
//!   governor and fills the work queue one frame at a time;
//! - one service thread per connected slave reads results and feeds the
//!   aggregator;
//! - one service thread per observer session runs the request cycle and
//!   may mutate the camera through the event translator.
//!
//! Shared state lives in [`MasterContext`]; the camera rig is guarded by
//! the update mutex, the frame slots by theirs, and the observer-facing
//! frame buffer by a third so a frame copy never blocks tile placement
//! longer than the copy itself.

pub mod aggregator;
pub mod dispatcher;
pub mod events;
pub mod observer_srv;
pub mod rig;
pub mod script;
pub mod slave_pool;
pub mod telemetry;

pub use rig::{CameraRig, ModeKey, azel_dir};
pub use script::{CameraConsole, NullBridge, ScriptingBridge};

use std::net::SocketAddr;
use std::process::Command;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::thread::{self, JoinHandle};

use log::{info, warn};
use parking_lot::Mutex;

use aggregator::FrameAssembler;
use dispatcher::WorkUnit;
use observer_srv::ObserverShared;
use telemetry::Telemetry;

use crate::config::MasterConfig;
use crate::errors::Result;
use crate::protocol::{ProbeReport, WorkHeader};
use crate::scene::{Environment, SceneDb, codec};
use crate::sync::{Semaphore, WorkQueue};
use crate::wire::ByteReader;

/// Everything the master's threads share.
pub struct MasterContext {
    pub cfg: MasterConfig,
    pub env: Environment,
    /// Scene packed once at startup, pushed verbatim to every slave.
    pub scene_blob: Vec<u8>,
    /// Camera/interaction state; the update mutex of the pipeline.
    pub rig: Mutex<CameraRig>,
    /// Double-buffered in-flight frame slots.
    pub frames: Mutex<FrameAssembler>,
    /// Last completed frame, as observers download it.
    pub observer_frame: Mutex<Vec<u8>>,
    /// Double-buffer governor: at most one frame ahead.
    pub governor: Semaphore,
    pub queue: WorkQueue<WorkUnit>,
    pub observers: Mutex<Vec<Arc<ObserverShared>>>,
    pub alive: AtomicBool,
    pub active_slaves: AtomicUsize,
    pub telemetry: Mutex<Telemetry>,
    pub bridge: Mutex<Box<dyn ScriptingBridge>>,
    observer_ids: AtomicU64,
}

impl MasterContext {
    pub(crate) fn next_observer_id(&self) -> u64 {
        self.observer_ids.fetch_add(1, Ordering::SeqCst)
    }
}

/// Stop the pipeline: the dispatch loop finishes its drain, gated observer
/// sessions wake to send their quit byte.
pub fn request_shutdown(ctx: &MasterContext) {
    if ctx.alive.swap(false, Ordering::SeqCst) {
        ctx.governor.post();
        for obs in ctx.observers.lock().iter() {
            obs.frame_sem.post_if_clear();
        }
    }
}

// ============================================================================
// Result handling (C6 wiring)
// ============================================================================

/// A probe result came back: update hits and the center of rotation,
/// report components to telemetry, queue the shot broadcast for every
/// observer.
pub fn handle_probe_result(ctx: &MasterContext, payload: &[u8]) -> Result<()> {
    let report = ProbeReport::decode(&mut ByteReader::new(payload, false))?;
    info!(
        "shotline: in {:?} out {:?}, {} components",
        report.in_hit,
        report.out_hit,
        report.names.len()
    );

    ctx.rig.lock().record_hits(report.in_hit, report.out_hit);

    {
        let mut telemetry = ctx.telemetry.lock();
        telemetry.reset();
        for name in &report.names {
            telemetry.update(name, 1);
        }
    }

    for obs in ctx.observers.lock().iter() {
        obs.pending_shots.lock().push(report.clone());
        obs.frame_sem.post_if_clear();
    }
    Ok(())
}

/// A pixel tile came back: place it, and on frame completion publish the
/// frame, release the governor and wake the observers.
pub fn handle_tile_result(
    ctx: &MasterContext,
    header: &WorkHeader,
    frame: u16,
    pixels: &[u8],
) -> Result<()> {
    let completed = {
        let mut frames = ctx.frames.lock();
        match frames.place_tile(header, frame, pixels)? {
            Some(finished) => {
                ctx.observer_frame.lock().copy_from_slice(finished);
                true
            }
            None => false,
        }
    };

    if completed {
        ctx.governor.post();
        for obs in ctx.observers.lock().iter() {
            obs.frame_sem.post_if_clear();
        }
    }
    Ok(())
}

// ============================================================================
// Lifecycle
// ============================================================================

/// A launched master: bound addresses plus the join handles.
pub struct MasterHandle {
    ctx: Arc<MasterContext>,
    pub slave_addr: SocketAddr,
    pub observer_addr: SocketAddr,
    threads: Vec<JoinHandle<()>>,
}

impl MasterHandle {
    pub fn shutdown(&self) {
        request_shutdown(&self.ctx);
    }

    pub fn is_alive(&self) -> bool {
        self.ctx.alive.load(Ordering::SeqCst)
    }

    pub fn active_slaves(&self) -> usize {
        self.ctx.active_slaves.load(Ordering::SeqCst)
    }

    /// Copy of the camera rig for inspection.
    pub fn rig_snapshot(&self) -> CameraRig {
        self.ctx.rig.lock().clone()
    }

    /// Tiles received so far for each frame slot.
    pub fn tile_counts(&self) -> (u32, u32) {
        let frames = self.ctx.frames.lock();
        (frames.count(0), frames.count(1))
    }

    /// Block until the dispatch loop and the listeners exit.
    pub fn wait(self) -> Result<()> {
        for handle in self.threads {
            if handle.join().is_err() {
                warn!("master worker thread panicked");
            }
        }
        Ok(())
    }
}

/// Validate the scene, pack it, bind both listeners and start the
/// dispatch loop.
pub fn launch(
    cfg: MasterConfig,
    db: &SceneDb,
    bridge: Box<dyn ScriptingBridge>,
) -> Result<MasterHandle> {
    db.env.validate_tiling()?;

    info!("packing scene...");
    let scene_blob = codec::pack_scene(db);
    info!(
        "scene packed: {} bytes, {} tiles per frame",
        scene_blob.len(),
        db.env.tile_total()
    );

    let telemetry = match &cfg.comp_host {
        Some(host) => Telemetry::connect(host)?,
        None => Telemetry::disconnected(),
    };

    let frame_bytes = 3 * db.env.img_w as usize * db.env.img_h as usize;
    let ctx = Arc::new(MasterContext {
        env: db.env.clone(),
        scene_blob,
        rig: Mutex::new(CameraRig::new(&db.camera, &db.env.render_mode)),
        frames: Mutex::new(FrameAssembler::new(&db.env)),
        observer_frame: Mutex::new(vec![0; frame_bytes]),
        governor: Semaphore::new(1),
        queue: WorkQueue::new(),
        observers: Mutex::new(Vec::new()),
        alive: AtomicBool::new(true),
        active_slaves: AtomicUsize::new(0),
        telemetry: Mutex::new(telemetry),
        bridge: Mutex::new(bridge),
        observer_ids: AtomicU64::new(0),
        cfg,
    });

    let (slave_thread, slave_addr) = slave_pool::spawn_listener(Arc::clone(&ctx))?;
    let (observer_thread, observer_addr) = observer_srv::spawn_listener(Arc::clone(&ctx))?;

    if let Some(list) = &ctx.cfg.list {
        info!("compute node list: {}", list.display());
    }
    if let Some(exec) = &ctx.cfg.exec {
        let command = format!("{exec} {}", slave_addr.port());
        info!("spawning slave bootstrap: {command}");
        if let Err(e) = Command::new("/bin/sh").arg("-c").arg(&command).spawn() {
            warn!("slave bootstrap failed to start: {e}");
        }
    }

    let dispatch_ctx = Arc::clone(&ctx);
    let dispatch_thread = thread::Builder::new()
        .name("dispatch".into())
        .spawn(move || dispatch_loop(&dispatch_ctx))
        .expect("spawn dispatch loop");

    Ok(MasterHandle {
        ctx,
        slave_addr,
        observer_addr,
        threads: vec![dispatch_thread, slave_thread, observer_thread],
    })
}

/// Convenience wrapper: launch and block until shutdown.
pub fn run(cfg: MasterConfig, db: &SceneDb, bridge: Box<dyn ScriptingBridge>) -> Result<()> {
    launch(cfg, db, bridge)?.wait()
}

/// The governor loop: one frame of tiles per grant, alternating the
/// 1-bit frame tag, then a cooperative drain on shutdown.
fn dispatch_loop(ctx: &Arc<MasterContext>) {
    let mut frame: u16 = 0;
    while ctx.alive.load(Ordering::SeqCst) {
        ctx.governor.wait();
        if !ctx.alive.load(Ordering::SeqCst) {
            break;
        }

        let slave_data = {
            let rig = ctx.rig.lock();
            dispatcher::compose_render_data(&rig, frame)
        };
        dispatcher::generate_frame(&ctx.queue, &ctx.env, &slave_data);
        frame ^= 1;
    }

    // Let connected slaves finish what is queued and in flight, then let
    // gated observer sessions notice the shutdown. With an empty pool the
    // backlog is dropped instead of waited on.
    ctx.queue.close();
    ctx.queue
        .wait_idle_or_abandon(|| ctx.active_slaves.load(Ordering::SeqCst) == 0);
    for obs in ctx.observers.lock().iter() {
        obs.frame_sem.post_if_clear();
    }
    info!("dispatch loop drained");
}
