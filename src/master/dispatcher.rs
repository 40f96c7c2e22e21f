//! Work Dispatcher
//!
//! Generates one work unit per tile for the current frame, row-major over
//! the tile grid, every unit carrying the same slave-data blob composed
//! under the update mutex. Generation only fills the queue; results arrive
//! asynchronously through the slave pool.

use super::events::ProbeRequest;
use super::rig::CameraRig;
use crate::protocol::{SlaveData, WorkHeader};
use crate::scene::Environment;
use crate::sync::WorkQueue;

/// One queued tile or probe request: the fixed header plus the encoded
/// slave-data suffix that travels with it.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkUnit {
    pub header: WorkHeader,
    pub data: Vec<u8>,
}

/// Compose the per-frame slave data from the current rig: op code, frame
/// tag, camera vectors and the render-mode payload.
pub fn compose_render_data(rig: &CameraRig, frame: u16) -> Vec<u8> {
    SlaveData::Render {
        frame,
        pos: rig.pos,
        focus: rig.focus,
        mode: rig.compose_render_mode(),
    }
    .to_vec()
}

/// Emit the frame's tile grid into the queue in row-major order.
pub fn generate_frame(queue: &WorkQueue<WorkUnit>, env: &Environment, slave_data: &[u8]) {
    let mut orig_y = 0;
    while orig_y < env.img_h {
        let mut orig_x = 0;
        while orig_x < env.img_w {
            queue.push_back(WorkUnit {
                header: WorkHeader::tile(orig_x, orig_y, env.tile_w, env.tile_h),
                data: slave_data.to_vec(),
            });
            orig_x += env.tile_w;
        }
        orig_y += env.tile_h;
    }
}

/// Build the zero-sized work unit for a probe request.
pub fn probe_unit(request: &ProbeRequest) -> WorkUnit {
    let data = match *request {
        ProbeRequest::Shotline { pos, dir } => SlaveData::Shot { pos, dir },
        ProbeRequest::SpallCone { pos, dir, angle } => SlaveData::Spall { pos, dir, angle },
    }
    .to_vec();
    WorkUnit {
        header: WorkHeader::probe(),
        data,
    }
}
