//! Result Aggregation
//!
//! Reassembles returned pixel tiles into the double-buffered frame slots
//! and detects completion. Each slot tracks which grid cells it has seen,
//! so a retried tile after a slave drop overwrites its predecessor without
//! advancing the completion counter.

use crate::errors::{RaynetError, Result};
use crate::protocol::WorkHeader;
use crate::scene::Environment;

/// The two in-flight frame slots.
#[derive(Debug)]
pub struct FrameAssembler {
    img_w: u32,
    img_h: u32,
    tile_w: u32,
    tile_h: u32,
    tile_total: u32,
    slots: [Slot; 2],
}

#[derive(Debug)]
struct Slot {
    rgb: Vec<u8>,
    received: Vec<bool>,
    count: u32,
}

impl Slot {
    fn new(pixels: usize, tiles: usize) -> Self {
        Self {
            rgb: vec![0; 3 * pixels],
            received: vec![false; tiles],
            count: 0,
        }
    }
}

impl FrameAssembler {
    pub fn new(env: &Environment) -> Self {
        let pixels = (env.img_w * env.img_h) as usize;
        let tiles = env.tile_total() as usize;
        Self {
            img_w: env.img_w,
            img_h: env.img_h,
            tile_w: env.tile_w,
            tile_h: env.tile_h,
            tile_total: env.tile_total(),
            slots: [Slot::new(pixels, tiles), Slot::new(pixels, tiles)],
        }
    }

    pub fn tile_total(&self) -> u32 {
        self.tile_total
    }

    /// Tiles received so far for a slot.
    pub fn count(&self, frame: u16) -> u32 {
        self.slots[(frame & 1) as usize].count
    }

    /// Place one returned tile. Returns the finished frame's pixels when
    /// this tile was the last one of its slot; the slot resets for reuse.
    pub fn place_tile(
        &mut self,
        header: &WorkHeader,
        frame: u16,
        pixels: &[u8],
    ) -> Result<Option<&[u8]>> {
        self.validate(header, pixels)?;

        let slot = &mut self.slots[(frame & 1) as usize];
        let grid_w = self.img_w / self.tile_w;
        let tile_index = ((header.orig_y / self.tile_h) * grid_w + header.orig_x / self.tile_w)
            as usize;

        // A retry after a slave drop may deliver the same cell twice; the
        // counter only moves on the first arrival.
        if !slot.received[tile_index] {
            slot.received[tile_index] = true;
            slot.count += 1;
        }

        // Row-by-row copy into the frame; rows are 3 * size_x bytes.
        let row_bytes = 3 * header.size_x as usize;
        for row in 0..header.size_y as usize {
            let src = row * row_bytes;
            let dst = 3 * ((header.orig_y as usize + row) * self.img_w as usize
                + header.orig_x as usize);
            slot.rgb[dst..dst + row_bytes].copy_from_slice(&pixels[src..src + row_bytes]);
        }

        if slot.count == self.tile_total {
            slot.count = 0;
            slot.received.fill(false);
            Ok(Some(&slot.rgb))
        } else {
            Ok(None)
        }
    }

    fn validate(&self, header: &WorkHeader, pixels: &[u8]) -> Result<()> {
        let on_grid = header.size_x == self.tile_w
            && header.size_y == self.tile_h
            && header.orig_x % self.tile_w == 0
            && header.orig_y % self.tile_h == 0
            && header.orig_x + header.size_x <= self.img_w
            && header.orig_y + header.size_y <= self.img_h;
        if !on_grid {
            return Err(RaynetError::InvalidTiling {
                img_w: self.img_w,
                img_h: self.img_h,
                tile_w: header.size_x,
                tile_h: header.size_y,
            });
        }
        if pixels.len() != header.pixel_bytes() {
            return Err(RaynetError::FieldOutOfBounds {
                context: "tile pixel payload",
                value: pixels.len() as u64,
            });
        }
        Ok(())
    }
}
