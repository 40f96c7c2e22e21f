//! Service Configuration
//!
//! The original deployments differed in interaction details; those
//! differences are a [`Profile`] here rather than separate builds.

use std::path::PathBuf;

use crate::protocol::{DEFAULT_OBSERVER_PORT, DEFAULT_SLAVE_PORT};

/// Interaction profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Profile {
    /// Walkthrough navigation: elevation clamped to [-90°, +90°].
    #[default]
    Interactive,
    /// Turntable navigation: elevation wraps modulo 360°.
    Tabletop,
}

/// Master-side configuration.
///
/// `compress` must match the observers' setting; the frame download format
/// is fixed per session, not negotiated.
#[derive(Debug, Clone)]
pub struct MasterConfig {
    /// Port slaves connect to; 0 picks an ephemeral port.
    pub slave_port: u16,
    /// Port observers connect to; 0 picks an ephemeral port.
    pub observer_port: u16,
    /// Auxiliary telemetry host, `None` disables reporting.
    pub comp_host: Option<String>,
    /// Command spawned once at startup to boot slaves; the slave port is
    /// appended as its last argument.
    pub exec: Option<String>,
    /// File listing compute hosts; recorded for the operator, slaves still
    /// connect inbound.
    pub list: Option<PathBuf>,
    /// zlib-compress observer frame downloads.
    pub compress: bool,
    pub profile: Profile,
}

impl Default for MasterConfig {
    fn default() -> Self {
        Self {
            slave_port: DEFAULT_SLAVE_PORT,
            observer_port: DEFAULT_OBSERVER_PORT,
            comp_host: None,
            exec: None,
            list: None,
            compress: false,
            profile: Profile::Interactive,
        }
    }
}

/// Slave-side configuration.
#[derive(Debug, Clone)]
pub struct SlaveConfig {
    pub master_host: String,
    pub master_port: u16,
}

/// Observer-side configuration.
#[derive(Debug, Clone)]
pub struct ObserverConfig {
    pub master_host: String,
    pub master_port: u16,
    /// Must match the master's `compress` flag.
    pub compress: bool,
}
