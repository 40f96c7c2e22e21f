//! Display Interface
//!
//! Window, blit, glyph overlay and local input live behind this trait so
//! the client loop stays free of any particular toolkit. The headless
//! implementation backs the tests and doubles as a frame sink for
//! unattended observers.

use crate::errors::Result;
use crate::protocol::{Overlay, WireEvent};

/// What the observer loop needs from a frontend.
pub trait Display: Send {
    /// The master's image size is known; open the surface.
    fn init(&mut self, width: u32, height: u32) -> Result<()>;

    /// Copy a full `3 * width * height` RGB frame onto the surface.
    fn blit(&mut self, frame: &[u8]) -> Result<()>;

    /// Draw the HUD for this frame; `hud` is pre-formatted text lines.
    fn draw_overlay(&mut self, overlay: &Overlay, hud: &[String]);

    /// Present the composed surface.
    fn flip(&mut self);

    /// Drain locally collected input events since the last call.
    fn poll_events(&mut self) -> Vec<WireEvent>;
}

/// Frame sink with scripted input; no window anywhere.
#[derive(Debug, Default)]
pub struct HeadlessDisplay {
    pub width: u32,
    pub height: u32,
    /// Events handed out by the next `poll_events` call.
    pub scripted: Vec<WireEvent>,
    /// Most recent frame, kept for inspection.
    pub last_frame: Vec<u8>,
    pub last_hud: Vec<String>,
    pub frames_presented: u64,
}

impl Display for HeadlessDisplay {
    fn init(&mut self, width: u32, height: u32) -> Result<()> {
        self.width = width;
        self.height = height;
        Ok(())
    }

    fn blit(&mut self, frame: &[u8]) -> Result<()> {
        self.last_frame.clear();
        self.last_frame.extend_from_slice(frame);
        Ok(())
    }

    fn draw_overlay(&mut self, _overlay: &Overlay, hud: &[String]) {
        self.last_hud = hud.to_vec();
    }

    fn flip(&mut self) {
        self.frames_presented += 1;
    }

    fn poll_events(&mut self) -> Vec<WireEvent> {
        std::mem::take(&mut self.scripted)
    }
}
