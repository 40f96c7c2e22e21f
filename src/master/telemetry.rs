//! Component Telemetry
//!
//! Optional side channel reporting which components the latest shotline
//! passed through to an auxiliary collector. The interface is two
//! messages, `reset` and `update name status`; a null destination is
//! tolerated and turns both into no-ops. Write failures drop the
//! connection and reporting goes quiet rather than disturbing rendering.

use std::io::Write;
use std::net::TcpStream;

use log::{info, warn};

use crate::errors::Result;

/// Default collector port.
pub const TELEMETRY_PORT: u16 = 1986;

/// Message bytes of the collector's tiny protocol.
const SET_STATE: u8 = 8;
const RESET: u8 = 9;
const TERM: u8 = 128;

/// Connection to the component collector, possibly absent.
#[derive(Debug, Default)]
pub struct Telemetry {
    stream: Option<TcpStream>,
}

impl Telemetry {
    /// No-op reporter.
    pub fn disconnected() -> Self {
        Self::default()
    }

    /// Connect to `host` (host or `host:port`); a connect failure is an
    /// error at startup like any other socket failure.
    pub fn connect(host: &str) -> Result<Self> {
        let addr = if host.contains(':') {
            host.to_string()
        } else {
            format!("{host}:{TELEMETRY_PORT}")
        };
        let stream = TcpStream::connect(&addr)?;
        info!("component telemetry connected to {addr}");
        Ok(Self {
            stream: Some(stream),
        })
    }

    pub fn is_active(&self) -> bool {
        self.stream.is_some()
    }

    /// Collapse all component fields ahead of a fresh shot report.
    pub fn reset(&mut self) {
        self.send(&[RESET]);
    }

    /// Report one component's status.
    pub fn update(&mut self, name: &str, status: u8) {
        let mut msg = Vec::with_capacity(name.len() + 8);
        msg.push(SET_STATE);
        msg.extend_from_slice(name.as_bytes());
        msg.extend_from_slice(format!(",{status}").as_bytes());
        msg.push(TERM);
        self.send(&msg);
    }

    fn send(&mut self, msg: &[u8]) {
        let Some(stream) = self.stream.as_mut() else {
            return;
        };
        if let Err(e) = stream.write_all(msg) {
            warn!("component telemetry dropped: {e}");
            self.stream = None;
        }
    }
}
