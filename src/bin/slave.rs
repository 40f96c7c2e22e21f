//! Slave binary: attach the built-in engine to a master and trace until
//! the master hangs up.

use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;

use raynet::slave::{self, SolidEngine};
use raynet::SlaveConfig;

#[derive(Parser, Debug)]
#[command(name = "raynet-slave", version, about = "Distributed ray-tracing compute slave")]
struct Args {
    /// Master host name.
    host: String,

    /// Master slave port.
    #[arg(default_value_t = raynet::protocol::DEFAULT_SLAVE_PORT)]
    port: u16,
}

fn main() -> ExitCode {
    env_logger::init();
    let args = Args::parse();
    let cfg = SlaveConfig {
        master_host: args.host,
        master_port: args.port,
    };

    let mut engine = SolidEngine::new([96, 96, 112]);
    match slave::run(&cfg, &mut engine).context("slave failed") {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}
