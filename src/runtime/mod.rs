//! Hand-rolled readiness runtime.
//!
//! Shared building blocks:
//! - `FrameBuffer`: fixed-capacity buffers with compaction
//! - `Connection`: per-socket framing and echo state machine
//! - `token`: readiness token layout
//!
//! The `mio` module holds the server and client reactors built on them.

mod buffer;
mod connection;
mod error;
mod mio;
mod protocol;
mod token;

pub use error::ReactorError;
pub use self::mio::{EchoClient, EchoServer, SessionEnd};

use crate::config::Config;
use std::io::{self, BufReader};
use std::net::{SocketAddr, ToSocketAddrs};
use tracing::info;

/// Run the echo server until the poll instance fails.
pub fn run_server(config: &Config) -> Result<(), ReactorError> {
    let addr = resolve(&config.listen)?;
    let server = EchoServer::bind(addr)?;
    server.run()
}

/// Run an interactive client session on stdin/stdout.
pub fn run_client(config: &Config) -> Result<SessionEnd, ReactorError> {
    let (mut client, feeder) = EchoClient::connect(&config.connect)?;
    feeder.spawn(BufReader::new(io::stdin()))?;

    let end = client.run(&mut io::stdout())?;
    info!(?end, "Session ended");
    Ok(end)
}

fn resolve(addr: &str) -> Result<SocketAddr, ReactorError> {
    addr.to_socket_addrs()
        .map_err(|e| ReactorError::Resolve(addr.to_string(), e))?
        .next()
        .ok_or_else(|| {
            ReactorError::Resolve(
                addr.to_string(),
                io::Error::new(io::ErrorKind::NotFound, "no addresses"),
            )
        })
}
