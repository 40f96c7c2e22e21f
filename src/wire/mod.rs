//! Wire Framing
//!
//! Blocking, all-or-error TCP transfer primitives plus the typed byte
//! cursors every protocol layer parses with.
//!
//! Byte order is settled once per connection: the sending master always
//! writes its native order, and the receiving side learns whether to flip
//! from a single `u16` endian probe exchanged at handshake time. After the
//! handshake the flip flag is baked into a [`WireStream`] or a
//! [`ByteReader`] and never threaded through individual calls again.

mod cursor;
mod stream;

pub use cursor::{ByteReader, ByteWriter};
pub use stream::{WireStream, recv_all, send_all};

use crate::errors::{RaynetError, Result};

/// Value sent as the endian probe. A peer on matching hardware reads `1`;
/// a mismatched peer reads `0x0100` and enables flipping.
pub const ENDIAN_PROBE: u16 = 1;

/// Interpret a received endian probe.
pub fn flip_from_probe(probe: u16) -> Result<bool> {
    if probe == ENDIAN_PROBE {
        Ok(false)
    } else if probe.swap_bytes() == ENDIAN_PROBE {
        Ok(true)
    } else {
        Err(RaynetError::FieldOutOfBounds {
            context: "endian probe",
            value: u64::from(probe),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn probe_same_order() {
        assert!(!flip_from_probe(1).unwrap());
    }

    #[test]
    fn probe_swapped_order() {
        assert!(flip_from_probe(0x0100).unwrap());
    }

    #[test]
    fn probe_garbage_rejected() {
        assert!(flip_from_probe(7).is_err());
    }
}
