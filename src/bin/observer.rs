//! Observer binary: attach to a master and stream frames into a headless
//! display sink. Interactive frontends implement [`raynet::Display`] on
//! top of their toolkit and reuse the same loop.

use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;

use raynet::observer::{self, HeadlessDisplay};
use raynet::ObserverConfig;

#[derive(Parser, Debug)]
#[command(name = "raynet-observer", version, about = "Distributed ray-tracing observer")]
struct Args {
    /// Master host name.
    host: String,

    /// Master observer port.
    #[arg(default_value_t = raynet::protocol::DEFAULT_OBSERVER_PORT)]
    port: u16,

    /// Expect zlib-compressed frames (must match the master).
    #[arg(long)]
    compress: bool,
}

fn main() -> ExitCode {
    env_logger::init();
    let args = Args::parse();
    let cfg = ObserverConfig {
        master_host: args.host,
        master_port: args.port,
        compress: args.compress,
    };

    let mut display = HeadlessDisplay::default();
    match observer::run(&cfg, &mut display).context("observer failed") {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}
