//! Connection state machine for managing TCP connections.
//!
//! Each connection owns its socket, a receive buffer and a send buffer.
//! Reads only accumulate bytes; frames are resolved on the write side, so
//! an echo goes out once a full frame is buffered *and* the socket is
//! writable.

use crate::runtime::buffer::{BufferError, FrameBuffer, BUFFER_SIZE, READ_CHUNK};
use crate::runtime::error::ConnectionError;
use crate::runtime::protocol::{process_echo, ProcessResult};
use slab::Slab;
use std::io::{self, Read, Write};
use tracing::trace;

/// Current state of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnState {
    /// Bytes buffered, but no complete frame yet.
    Accumulating,
    /// At least one complete frame is waiting for a writable socket.
    FrameReady,
    /// Close sentinel handled. Closes once the send buffer drains.
    Closing,
}

/// What a read pass observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiveOutcome {
    Open,
    /// The peer closed its side.
    Closed,
}

/// What the reactor should do with a connection after an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Keep,
    Close(CloseReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// The close sentinel was echoed and flushed.
    Sentinel,
    /// The peer closed the socket.
    PeerClosed,
}

/// A single connection.
#[derive(Debug)]
pub struct Connection<S> {
    stream: S,
    recv: FrameBuffer,
    send: FrameBuffer,
    state: ConnState,
    /// Last known writability. Cleared when a write would block.
    writable: bool,
    /// Reading stopped because the receive buffer is full of frames.
    read_paused: bool,
    /// The peer shut down its write side. Owed replies still go out.
    peer_closed: bool,
}

impl<S: Read + Write> Connection<S> {
    /// Create a new connection with empty buffers.
    pub fn new(stream: S) -> Self {
        Self {
            stream,
            recv: FrameBuffer::new(BUFFER_SIZE),
            send: FrameBuffer::new(BUFFER_SIZE),
            state: ConnState::Accumulating,
            writable: false,
            read_paused: false,
            peer_closed: false,
        }
    }

    pub fn stream_mut(&mut self) -> &mut S {
        &mut self.stream
    }

    pub fn state(&self) -> ConnState {
        self.state
    }

    pub fn is_writable(&self) -> bool {
        self.writable
    }

    pub fn set_writable(&mut self) {
        self.writable = true;
    }

    pub fn read_paused(&self) -> bool {
        self.read_paused
    }

    /// Bytes received but not yet resolved into a frame.
    pub fn buffered(&self) -> &[u8] {
        self.recv.filled()
    }

    /// Bytes queued but not yet written.
    pub fn pending_output(&self) -> usize {
        self.send.len()
    }

    /// Free space in the send buffer.
    pub fn send_remaining(&self) -> usize {
        self.send.remaining()
    }

    pub fn send_capacity(&self) -> usize {
        self.send.capacity()
    }

    /// True once the close sentinel's reply has been flushed.
    pub fn should_close(&self) -> bool {
        self.state == ConnState::Closing && self.send.is_empty()
    }

    /// Read everything the socket has into the receive buffer.
    ///
    /// Reads go through a small transient buffer until the socket would
    /// block. Nothing is parsed or acted upon here.
    pub fn receive(&mut self) -> Result<ReceiveOutcome, ConnectionError> {
        self.read_paused = false;
        let mut chunk = [0u8; READ_CHUNK];

        let outcome = loop {
            let room = self.recv.remaining();
            if room == 0 && self.recv.has_frame() {
                // Leave the rest in the kernel until frames are consumed
                self.read_paused = true;
                break ReceiveOutcome::Open;
            }

            // A full buffer without a frame still reads, so append reports
            // the overflow instead of stalling.
            let want = if room == 0 { READ_CHUNK } else { room.min(READ_CHUNK) };
            match self.stream.read(&mut chunk[..want]) {
                Ok(0) => break ReceiveOutcome::Closed,
                Ok(n) => self.recv.append(&chunk[..n])?,
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => {
                    break ReceiveOutcome::Open
                }
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        };

        self.update_state();
        Ok(outcome)
    }

    /// Echo every complete buffered frame and flush the replies.
    ///
    /// Stops extracting when the send buffer is full and the socket would
    /// block, or after the close sentinel. Frames left behind are picked up
    /// on the next writable event.
    pub fn send(&mut self) -> Result<(), ConnectionError> {
        loop {
            if self.state == ConnState::FrameReady {
                match process_echo(self.recv.filled(), self.send.spare_mut()) {
                    ProcessResult::Response {
                        consumed,
                        response_len,
                    } => {
                        trace!(bytes = consumed, "Echoing frame");
                        self.send.commit(response_len);
                        self.recv.consume(consumed);
                        self.update_state();
                        continue;
                    }
                    ProcessResult::Quit {
                        consumed,
                        response_len,
                    } => {
                        trace!("Echoing close sentinel");
                        self.send.commit(response_len);
                        self.recv.consume(consumed);
                        self.state = ConnState::Closing;
                    }
                    ProcessResult::NoRoom { response_len } => {
                        if response_len > self.send.capacity() {
                            return Err(BufferError::Overflow {
                                capacity: self.send.capacity(),
                                filled: self.send.len(),
                                incoming: response_len,
                            }
                            .into());
                        }
                    }
                    ProcessResult::NeedData => self.update_state(),
                }
            }

            let flushed = self.flush()?;
            if flushed == 0 || self.state != ConnState::FrameReady {
                break;
            }
        }

        Ok(())
    }

    /// Run one readiness event through the receive and send paths.
    ///
    /// After the peer shuts down its write side, reading stops but frames
    /// already received are still echoed. The connection closes once
    /// nothing is owed.
    pub fn handle_ready(
        &mut self,
        readable: bool,
        writable: bool,
    ) -> Result<Disposition, ConnectionError> {
        if writable {
            self.writable = true;
        }

        if (readable || self.read_paused) && self.can_read() {
            self.read_socket()?;
        }

        loop {
            if self.writable {
                self.send()?;
            }
            // Sending may have made room for a paused read
            if !self.read_paused || self.recv.remaining() == 0 || !self.can_read() {
                break;
            }
            self.read_socket()?;
        }

        if self.should_close() {
            Ok(Disposition::Close(CloseReason::Sentinel))
        } else if self.peer_closed && self.drained() {
            Ok(Disposition::Close(CloseReason::PeerClosed))
        } else {
            Ok(Disposition::Keep)
        }
    }

    fn can_read(&self) -> bool {
        !self.peer_closed && self.state != ConnState::Closing
    }

    fn read_socket(&mut self) -> Result<(), ConnectionError> {
        if self.receive()? == ReceiveOutcome::Closed {
            trace!(owed = self.send.len(), "Peer closed its write side");
            self.peer_closed = true;
            self.read_paused = false;
        }
        Ok(())
    }

    /// No complete frame is waiting and every reply has been written.
    fn drained(&self) -> bool {
        !self.recv.has_frame() && self.send.is_empty()
    }

    /// Queue bytes for transmission.
    pub fn queue(&mut self, data: &[u8]) -> Result<(), BufferError> {
        self.send.append(data)
    }

    /// Write queued bytes until the buffer is empty or the socket would block.
    ///
    /// Returns the number of bytes written. The send buffer is compacted by
    /// exactly that amount.
    pub fn flush(&mut self) -> Result<usize, ConnectionError> {
        let mut written = 0;
        while !self.send.is_empty() {
            match self.stream.write(self.send.filled()) {
                Ok(0) => {
                    return Err(io::Error::new(io::ErrorKind::WriteZero, "write returned 0").into());
                }
                Ok(n) => {
                    self.send.consume(n);
                    written += n;
                }
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => {
                    self.writable = false;
                    break;
                }
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Ok(written)
    }

    /// Remove the next complete line from the receive buffer.
    pub fn next_line(&mut self) -> Option<Vec<u8>> {
        let line = self.recv.take_frame();
        self.update_state();
        line
    }

    fn update_state(&mut self) {
        if self.state == ConnState::Closing {
            return;
        }
        self.state = if self.recv.has_frame() {
            ConnState::FrameReady
        } else {
            ConnState::Accumulating
        };
    }
}

/// Registry of active connections using slab allocation.
///
/// Provides O(1) insert, lookup, and remove operations. Slab keys double as
/// readiness tokens.
pub struct ConnectionRegistry<S> {
    connections: Slab<Connection<S>>,
}

impl<S> ConnectionRegistry<S> {
    pub fn new() -> Self {
        Self {
            connections: Slab::new(),
        }
    }

    /// Insert a new connection into the registry.
    pub fn insert(&mut self, conn: Connection<S>) -> usize {
        self.connections.insert(conn)
    }

    /// Get a mutable reference to a connection.
    pub fn get_mut(&mut self, id: usize) -> Option<&mut Connection<S>> {
        self.connections.get_mut(id)
    }

    /// Remove a connection from the registry.
    pub fn remove(&mut self, id: usize) -> Option<Connection<S>> {
        self.connections.try_remove(id)
    }

    /// Number of active connections.
    pub fn len(&self) -> usize {
        self.connections.len()
    }
}

impl<S> Default for ConnectionRegistry<S> {
    fn default() -> Self {
        Self::new()
    }
}
