//! Observer Transport
//!
//! Accepts observer connections and services each one: the INIT handshake,
//! the per-frame request cycle (flow control, event upload, frame
//! download, overlay), console messages and quits. The per-observer frame
//! semaphore gates each frame send, so observers run at the pipeline's
//! pace while the other sessions keep being serviced.

use std::io::Write;
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use flate2::Compression;
use flate2::write::ZlibEncoder;
use log::{debug, info, warn};
use parking_lot::Mutex;
use smallvec::SmallVec;

use super::dispatcher::probe_unit;
use super::events::translate_batch;
use super::{MasterContext, request_shutdown};
use crate::errors::{RaynetError, Result};
use crate::protocol::{
    EVENT_BYTES, MAX_EVENT_BATCH, ObserverOp, Overlay, ProbeReport, WireEvent,
};
use crate::wire::{ByteReader, ByteWriter, ENDIAN_PROBE, WireStream};

const ACCEPT_POLL: Duration = Duration::from_millis(25);

/// Per-session state shared with the aggregator: the frame semaphore it
/// posts and the shot broadcasts waiting to be flushed.
#[derive(Debug)]
pub struct ObserverShared {
    pub id: u64,
    /// First session in the pool; may shut the master down and switch
    /// render modes.
    pub controller: bool,
    pub frame_sem: crate::sync::Semaphore,
    pub active: AtomicBool,
    pub pending_shots: Mutex<Vec<ProbeReport>>,
}

/// Bind the observer listener and spawn its accept loop.
pub fn spawn_listener(ctx: Arc<MasterContext>) -> Result<(JoinHandle<()>, SocketAddr)> {
    let listener = TcpListener::bind(("0.0.0.0", ctx.cfg.observer_port))?;
    let addr = listener.local_addr()?;
    listener.set_nonblocking(true)?;
    info!("observer listener on {addr}");

    let handle = thread::Builder::new()
        .name("observer-listener".into())
        .spawn(move || accept_loop(&ctx, &listener))
        .expect("spawn observer listener");
    Ok((handle, addr))
}

fn accept_loop(ctx: &Arc<MasterContext>, listener: &TcpListener) {
    while ctx.alive.load(Ordering::SeqCst) {
        match listener.accept() {
            Ok((stream, peer)) => {
                let shared = register(ctx);
                info!(
                    "observer {} connected from {peer} (controller: {})",
                    shared.id, shared.controller
                );
                let ctx = Arc::clone(ctx);
                let spawned = thread::Builder::new()
                    .name(format!("observer-{}", shared.id))
                    .spawn(move || {
                        let id = shared.id;
                        if let Err(e) = serve_observer(&ctx, stream, &shared) {
                            debug!("observer {id} closed: {e}");
                        }
                        unregister(&ctx, id);
                        info!("observer {id} removed");
                    });
                if let Err(e) = spawned {
                    warn!("could not spawn observer thread: {e}");
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                thread::sleep(ACCEPT_POLL);
            }
            Err(e) => {
                warn!("observer accept failed: {e}");
                thread::sleep(ACCEPT_POLL);
            }
        }
    }
}

fn register(ctx: &Arc<MasterContext>) -> Arc<ObserverShared> {
    let mut observers = ctx.observers.lock();
    let shared = Arc::new(ObserverShared {
        id: ctx.next_observer_id(),
        controller: observers.is_empty(),
        frame_sem: crate::sync::Semaphore::new(0),
        active: AtomicBool::new(true),
        pending_shots: Mutex::new(Vec::new()),
    });
    observers.push(Arc::clone(&shared));
    shared
}

fn unregister(ctx: &Arc<MasterContext>, id: u64) {
    ctx.observers.lock().retain(|o| o.id != id);
}

fn serve_observer(
    ctx: &Arc<MasterContext>,
    stream: TcpStream,
    shared: &Arc<ObserverShared>,
) -> Result<()> {
    stream.set_nodelay(true)?;
    let mut ws = WireStream::new(stream, false);

    loop {
        let op = ObserverOp::from_u8(ws.recv_u8()?)?;

        if !ctx.alive.load(Ordering::SeqCst) || !shared.active.load(Ordering::SeqCst) {
            ws.send_u8(ObserverOp::Quit as u8)?;
            return Ok(());
        }

        match op {
            ObserverOp::Init => {
                ws.send_u16(ENDIAN_PROBE)?;
                ws.send_u32(ctx.env.img_w)?;
                ws.send_u32(ctx.env.img_h)?;
            }
            ObserverOp::Frame => {
                if !serve_frame(ctx, &mut ws, shared)? {
                    return Ok(());
                }
            }
            ObserverOp::Mesg => {
                let len = ws.recv_u8()? as usize;
                let code = String::from_utf8_lossy(&ws.recv_vec(len)?).into_owned();
                let reply = {
                    let mut rig = ctx.rig.lock();
                    ctx.bridge.lock().eval(&code, &mut rig)
                };
                let bytes = reply.as_bytes();
                let n = bytes.len().min(255);
                ws.send_u8(n as u8)?;
                ws.send_bytes(&bytes[..n])?;
            }
            ObserverOp::Quit => {
                ws.send_u8(ObserverOp::Quit as u8).ok();
                return Ok(());
            }
            other => return Err(RaynetError::UnexpectedOp(other as u8)),
        }
    }
}

/// One frame exchange. Returns `false` when the session should close.
fn serve_frame(
    ctx: &Arc<MasterContext>,
    ws: &mut WireStream<TcpStream>,
    shared: &Arc<ObserverShared>,
) -> Result<bool> {
    // Gate on the next completed frame.
    shared.frame_sem.wait();

    // Flush queued shot broadcasts ahead of the flow byte.
    let shots = std::mem::take(&mut *shared.pending_shots.lock());
    for report in shots {
        let mut w = ByteWriter::new();
        report.encode(&mut w);
        let payload = w.into_vec();
        ws.send_u8(ObserverOp::Shot as u8)?;
        ws.send_u16(payload.len() as u16)?;
        ws.send_bytes(&payload)?;
    }

    // The wait may have been cut short by shutdown or a detach.
    if !ctx.alive.load(Ordering::SeqCst) || !shared.active.load(Ordering::SeqCst) {
        ws.send_u8(ObserverOp::Quit as u8)?;
        return Ok(false);
    }
    ws.send_u8(ObserverOp::Nop as u8)?;

    // Event queue upload.
    let count = ws.recv_u8()? as usize;
    let mut events: SmallVec<[WireEvent; 16]> = SmallVec::new();
    if count > 0 {
        let raw = ws.recv_vec(count * EVENT_BYTES)?;
        let mut r = ByteReader::new(&raw, false);
        for _ in 0..count.min(MAX_EVENT_BATCH) {
            events.push(WireEvent::decode(&mut r)?);
        }
    }

    // Translate under the update mutex so a half-updated camera can never
    // be composed into slave data.
    let outcome = {
        let mut rig = ctx.rig.lock();
        translate_batch(&mut rig, &events, shared.controller, ctx.cfg.profile)
    };
    for probe in &outcome.probes {
        ctx.queue.push_front(probe_unit(probe));
    }
    if outcome.detach {
        shared.active.store(false, Ordering::SeqCst);
        shared.frame_sem.post_if_clear();
    }
    if outcome.shutdown {
        info!("controller observer requested shutdown");
        request_shutdown(ctx);
    }

    // Frame download, compressed or raw. The frame mutex covers only the
    // copy-out; the socket write happens unlocked so a slow observer never
    // stalls tile aggregation.
    let payload = {
        let frame = ctx.observer_frame.lock();
        if ctx.cfg.compress {
            let mut enc = ZlibEncoder::new(
                Vec::with_capacity(frame.len() / 4),
                Compression::default(),
            );
            enc.write_all(&frame)
                .and_then(|()| enc.finish())
                .map_err(|e| RaynetError::Compression(e.to_string()))?
        } else {
            frame.clone()
        }
    };
    if ctx.cfg.compress {
        ws.send_u32(payload.len() as u32)?;
    }
    ws.send_bytes(&payload)?;

    // Overlay telemetry.
    let overlay = {
        let rig = ctx.rig.lock();
        Overlay {
            camera_pos: rig.pos,
            azimuth: rig.azimuth,
            elevation: rig.elevation,
            in_hit: rig.in_hit,
            out_hit: rig.out_hit,
            resolution: Overlay::resolution_field(ctx.env.img_w, ctx.env.img_h),
            controller: shared.controller,
            compute_nodes: ctx.active_slaves.load(Ordering::SeqCst) as u16,
            scale: rig.scale,
        }
    };
    let mut w = ByteWriter::new();
    overlay.encode(&mut w);
    ws.send_bytes(&w.into_vec())?;

    Ok(true)
}
