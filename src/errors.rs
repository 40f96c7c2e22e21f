//! Error Types
//!
//! This module defines the error types used throughout the service.
//!
//! # Overview
//!
//! The main error type [`RaynetError`] covers all failure modes including:
//! - Socket-level I/O and peer disconnects
//! - Wire protocol and version-key mismatches
//! - Scene packing/unpacking errors
//! - Project file loading errors
//!
//! All public APIs return [`Result<T>`] which is an alias for
//! `std::result::Result<T, RaynetError>`.

use thiserror::Error;

/// The main error type for the raynet service.
#[derive(Error, Debug)]
pub enum RaynetError {
    // ========================================================================
    // Networking
    // ========================================================================
    /// Socket-level I/O error. A closed peer surfaces here as
    /// `UnexpectedEof` and is treated as a disconnect by the transports.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The peer announced a protocol version key we do not speak.
    #[error("version key mismatch: expected {expected:#010x}, got {got:#010x}")]
    VersionMismatch {
        /// The key this build was compiled with
        expected: u32,
        /// The key received from the peer
        got: u32,
    },

    /// An unknown op code arrived where a known one was required.
    #[error("unexpected op code {0:#04x}")]
    UnexpectedOp(u8),

    // ========================================================================
    // Scene codec
    // ========================================================================
    /// The scene stream ended before a read completed.
    #[error("scene stream truncated: needed {needed} bytes, {remaining} remain")]
    Truncated {
        /// Bytes the current read required
        needed: usize,
        /// Bytes left in the stream
        remaining: usize,
    },

    /// The scene stream's leading version word matched in neither byte order.
    #[error("unrecognized scene stream version {0:#06x}")]
    BadSceneVersion(u16),

    /// A length or count field exceeds what the enclosing section allows.
    #[error("scene field out of bounds: {context} = {value}")]
    FieldOutOfBounds {
        /// Which field was being validated
        context: &'static str,
        /// The offending value
        value: u64,
    },

    /// A render-mode discriminant we do not know.
    #[error("unknown render mode {0}")]
    UnknownRenderMode(u32),

    /// A texture-kind discriminant we do not know.
    #[error("unknown texture kind {0:#06x}")]
    UnknownTextureKind(u16),

    /// A texture layer arrived before any stack was opened.
    #[error("texture layer outside of a stack")]
    OrphanTextureLayer,

    // ========================================================================
    // Project loading
    // ========================================================================
    /// A project, properties, textures, geometry or map file was unreadable
    /// or malformed.
    #[error("project load error in {file}: {reason}")]
    ProjectLoad {
        /// The file being read
        file: String,
        /// What went wrong
        reason: String,
    },

    /// The image/tile geometry is inconsistent (`W*H` not divisible by
    /// `tw*th`, or a tile origin off the grid).
    #[error("invalid tiling: image {img_w}x{img_h}, tile {tile_w}x{tile_h}")]
    InvalidTiling {
        img_w: u32,
        img_h: u32,
        tile_w: u32,
        tile_h: u32,
    },

    // ========================================================================
    // Results
    // ========================================================================
    /// A probe result could not be parsed; the caller discards it.
    #[error("malformed probe result: {0}")]
    MalformedProbe(&'static str),

    /// zlib inflate/deflate failure; treated like a peer disconnect.
    #[error("compression error: {0}")]
    Compression(String),
}

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, RaynetError>;
