//! Slave Transport
//!
//! Listens for compute slaves, pushes each one the packed scene and the
//! version key, then services it: pop a work unit, send it, read back the
//! result, hand the result to the aggregator. A slave that errors in
//! either direction is dropped from the pool and its outstanding unit goes
//! back to the head of the queue for the next idle slave.

use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::{debug, info, warn};

use super::dispatcher::WorkUnit;
use super::{MasterContext, handle_probe_result, handle_tile_result};
use crate::errors::Result;
use crate::protocol::{VERSION_KEY, WORK_HEADER_BYTES, WorkHeader};
use crate::wire::{ByteReader, ByteWriter, ENDIAN_PROBE, WireStream};

/// Accept-loop poll interval; the listener wakes this often to notice
/// shutdown.
const ACCEPT_POLL: Duration = Duration::from_millis(25);

/// Bind the slave listener and spawn its accept loop. Returns the join
/// handle and the actually bound address (useful with port 0).
pub fn spawn_listener(ctx: Arc<MasterContext>) -> Result<(JoinHandle<()>, SocketAddr)> {
    let listener = TcpListener::bind(("0.0.0.0", ctx.cfg.slave_port))?;
    let addr = listener.local_addr()?;
    listener.set_nonblocking(true)?;
    info!("slave listener on {addr}");

    let handle = thread::Builder::new()
        .name("slave-listener".into())
        .spawn(move || accept_loop(&ctx, &listener))
        .expect("spawn slave listener");
    Ok((handle, addr))
}

fn accept_loop(ctx: &Arc<MasterContext>, listener: &TcpListener) {
    while ctx.alive.load(Ordering::SeqCst) {
        match listener.accept() {
            Ok((stream, peer)) => {
                info!("slave connected from {peer}");
                let ctx = Arc::clone(ctx);
                let spawned = thread::Builder::new()
                    .name(format!("slave-{peer}"))
                    .spawn(move || {
                        if let Err(e) = serve_slave(&ctx, stream) {
                            debug!("slave {peer} closed: {e}");
                        }
                        ctx.active_slaves.fetch_sub(1, Ordering::SeqCst);
                        info!("slave {peer} left the pool");
                    });
                if let Err(e) = spawned {
                    warn!("could not spawn slave thread: {e}");
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                thread::sleep(ACCEPT_POLL);
            }
            Err(e) => {
                warn!("slave accept failed: {e}");
                thread::sleep(ACCEPT_POLL);
            }
        }
    }
}

/// Handshake then the dispatch/result loop for one slave.
fn serve_slave(ctx: &Arc<MasterContext>, stream: TcpStream) -> Result<()> {
    stream.set_nodelay(true)?;
    let mut ws = WireStream::new(stream, false);

    // Handshake: endian probe, scene push, version key.
    ws.send_u16(ENDIAN_PROBE)?;
    ws.send_u32(ctx.scene_blob.len() as u32)?;
    ws.send_bytes(&ctx.scene_blob)?;
    ws.send_u32(VERSION_KEY)?;

    ctx.active_slaves.fetch_add(1, Ordering::SeqCst);

    while let Some(unit) = ctx.queue.pop() {
        match service_unit(ctx, &mut ws, &unit) {
            Ok(()) => ctx.queue.complete(),
            Err(e) => {
                // Drop this slave; its unit goes to the next idle one.
                warn!("slave errored mid-unit, re-queuing tile: {e}");
                ctx.queue.requeue_front(unit);
                return Err(e);
            }
        }
    }
    Ok(())
}

/// One round trip: work unit out, result in, result aggregated.
fn service_unit(
    ctx: &Arc<MasterContext>,
    ws: &mut WireStream<TcpStream>,
    unit: &WorkUnit,
) -> Result<()> {
    let mut w = ByteWriter::new();
    unit.header.encode(&mut w);
    w.write_u16(unit.data.len() as u16);
    w.write_bytes(&unit.data);
    ws.send_bytes(&w.into_vec())?;

    // Fixed result header, then a payload sized from it.
    let hdr_bytes = ws.recv_vec(WORK_HEADER_BYTES)?;
    let header = WorkHeader::decode(&mut ByteReader::new(&hdr_bytes, false))?;

    if header.is_probe() {
        let len = ws.recv_u32()? as usize;
        let payload = ws.recv_vec(len)?;
        // A malformed probe is discarded, not fatal for the slave.
        if let Err(e) = handle_probe_result(ctx, &payload) {
            warn!("discarding malformed probe result: {e}");
        }
    } else {
        let pixels = ws.recv_vec(header.pixel_bytes())?;
        let frame = ws.recv_u16()?;
        if let Err(e) = handle_tile_result(ctx, &header, frame, &pixels) {
            warn!("discarding bad tile result: {e}");
        }
    }
    Ok(())
}
