//! Master binary: load the project, bind both listeners, run until a
//! controller observer shuts the session down.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;

use raynet::master::{self, CameraConsole};
use raynet::scene::project;
use raynet::{MasterConfig, Profile};

#[derive(Parser, Debug)]
#[command(name = "raynet-master", version, about = "Distributed ray-tracing master")]
struct Args {
    /// Project environment file.
    project: PathBuf,

    /// Port compute slaves connect to.
    #[arg(short = 'p', long, default_value_t = raynet::protocol::DEFAULT_SLAVE_PORT)]
    port: u16,

    /// Port observers connect to.
    #[arg(short = 'o', long = "obs_port", default_value_t = raynet::protocol::DEFAULT_OBSERVER_PORT)]
    obs_port: u16,

    /// Component telemetry host (host or host:port).
    #[arg(short = 'c', long = "comp_host")]
    comp_host: Option<String>,

    /// Command run once at startup to boot slaves; the slave port is
    /// appended.
    #[arg(short = 'e', long)]
    exec: Option<String>,

    /// File listing compute hosts.
    #[arg(short = 'l', long)]
    list: Option<PathBuf>,

    /// zlib-compress observer frame downloads (observers must match).
    #[arg(long)]
    compress: bool,

    /// Wrap elevation instead of clamping it.
    #[arg(long)]
    tabletop: bool,
}

fn main() -> ExitCode {
    env_logger::init();
    match run(Args::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> anyhow::Result<()> {
    let db = project::load_project(&args.project)
        .with_context(|| format!("loading {}", args.project.display()))?;

    let cfg = MasterConfig {
        slave_port: args.port,
        observer_port: args.obs_port,
        comp_host: args.comp_host,
        exec: args.exec,
        list: args.list,
        compress: args.compress,
        profile: if args.tabletop {
            Profile::Tabletop
        } else {
            Profile::Interactive
        },
    };

    master::run(cfg, &db, Box::new(CameraConsole)).context("master failed")?;
    Ok(())
}
