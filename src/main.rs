//! nio-echo: a line-delimited echo service on a hand-rolled reactor
//!
//! One binary, two roles:
//! - `server`: a single thread multiplexes the listener and every client
//!   connection, echoing each complete line back prefixed with `echo:`
//! - `client`: a single reactor thread drives the server connection while a
//!   console feeder thread turns typed lines into frames
//!
//! Features:
//! - Fixed-capacity receive/send buffers with compaction
//! - Sentinel-driven close on both sides
//! - Configuration via CLI arguments or TOML file

mod config;
mod protocols;
mod runtime;

use config::{Config, Role};
use runtime::SessionEnd;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::load()?;

    // Initialize logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match config.role {
        Role::Server => run_server(&config),
        Role::Client => run_client(&config),
    }
}

fn run_server(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    info!(listen = %config.listen, "Starting nio-echo server");
    runtime::run_server(config).map_err(|e| {
        error!(error = %e, "Server failed");
        e
    })?;
    Ok(())
}

fn run_client(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    info!(connect = %config.connect, "Starting nio-echo client");
    let end = runtime::run_client(config).map_err(|e| {
        error!(error = %e, "Client failed");
        e
    })?;

    match end {
        SessionEnd::Failed(e) => Err(e.into()),
        SessionEnd::Sentinel | SessionEnd::ServerClosed => Ok(()),
    }
}
