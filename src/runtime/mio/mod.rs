//! mio-based reactors.
//!
//! Readiness-based I/O using mio (epoll on Linux, kqueue on macOS).
//! The server reactor multiplexes a listener and any number of connections;
//! the client reactor drives one connection fed by the console feeder.

mod client;
mod event_loop;
mod feeder;

pub use client::{EchoClient, SessionEnd};
pub use event_loop::EchoServer;
