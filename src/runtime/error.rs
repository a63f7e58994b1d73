//! Reactor error types.
//!
//! `ReactorError` is process-fatal: it stops a loop before or while it
//! runs. `ConnectionError` is scoped to one socket and is resolved by
//! closing that socket.

use crate::runtime::buffer::BufferError;
use std::fmt;
use std::io;
use std::net::SocketAddr;

/// Errors that abort a reactor.
#[derive(Debug)]
pub enum ReactorError {
    /// Address did not resolve to a socket address.
    Resolve(String, io::Error),
    /// Could not bind the listening socket.
    Bind(SocketAddr, io::Error),
    /// Could not connect to the server.
    Connect(String, io::Error),
    /// Could not create or wait on the multiplexer.
    Poll(io::Error),
    /// Could not register a startup handle with the multiplexer.
    Register(io::Error),
    /// Could not start the console feeder thread.
    Spawn(io::Error),
}

impl fmt::Display for ReactorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReactorError::Resolve(addr, e) => write!(f, "Failed to resolve '{}': {}", addr, e),
            ReactorError::Bind(addr, e) => write!(f, "Failed to bind {}: {}", addr, e),
            ReactorError::Connect(addr, e) => write!(f, "Failed to connect to {}: {}", addr, e),
            ReactorError::Poll(e) => write!(f, "Poll failed: {}", e),
            ReactorError::Register(e) => write!(f, "Registration failed: {}", e),
            ReactorError::Spawn(e) => write!(f, "Failed to start console feeder: {}", e),
        }
    }
}

impl std::error::Error for ReactorError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ReactorError::Resolve(_, e)
            | ReactorError::Bind(_, e)
            | ReactorError::Connect(_, e)
            | ReactorError::Poll(e)
            | ReactorError::Register(e)
            | ReactorError::Spawn(e) => Some(e),
        }
    }
}

/// Errors that close a single connection.
#[derive(Debug)]
pub enum ConnectionError {
    /// Socket read, write or registration failed.
    Io(io::Error),
    /// Data did not fit a fixed-capacity buffer.
    Buffer(BufferError),
}

impl fmt::Display for ConnectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionError::Io(e) => write!(f, "I/O error: {}", e),
            ConnectionError::Buffer(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for ConnectionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConnectionError::Io(e) => Some(e),
            ConnectionError::Buffer(e) => Some(e),
        }
    }
}

impl From<io::Error> for ConnectionError {
    fn from(e: io::Error) -> Self {
        ConnectionError::Io(e)
    }
}

impl From<BufferError> for ConnectionError {
    fn from(e: BufferError) -> Self {
        ConnectionError::Buffer(e)
    }
}
