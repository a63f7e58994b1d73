//! Client reactor.
//!
//! Drives the single server connection on one thread. Outbound frames come
//! from the console feeder over a bounded channel; the feeder's waker gets
//! the reactor out of `poll` when new frames are queued.

use crate::protocols::echo::parser::{self, SESSION_END};
use crate::runtime::buffer::BufferError;
use crate::runtime::connection::{Connection, ReceiveOutcome};
use crate::runtime::error::{ConnectionError, ReactorError};
use crate::runtime::mio::feeder::{Feeder, FEEDER_QUEUE};
use crate::runtime::token::{SESSION, WAKER};
use bytes::Bytes;
use crossbeam_channel::Receiver;
use mio::net::TcpStream;
use mio::{Events, Interest, Poll, Waker};
use std::io::{self, Write};
use std::sync::Arc;
use tracing::{debug, info, trace, warn};

const EVENTS_CAPACITY: usize = 16;

/// How a client session ended.
#[derive(Debug)]
pub enum SessionEnd {
    /// The server echoed the session-ending line.
    Sentinel,
    /// The server closed the connection.
    ServerClosed,
    /// The connection failed.
    Failed(ConnectionError),
}

/// Echo client connected to a server.
pub struct EchoClient {
    poll: Poll,
    events: Events,
    conn: Connection<TcpStream>,
    outbound: Receiver<Bytes>,
    /// Frame taken off the channel that did not fit the send buffer yet.
    held: Option<Bytes>,
}

impl EchoClient {
    /// Connect to `addr` and set up the reactor.
    ///
    /// The connect itself blocks; the socket is switched to non-blocking
    /// before it is registered. Returns the feeder that produces frames for
    /// this client.
    pub fn connect(addr: &str) -> Result<(Self, Feeder), ReactorError> {
        let stream = std::net::TcpStream::connect(addr)
            .map_err(|e| ReactorError::Connect(addr.to_string(), e))?;
        stream
            .set_nonblocking(true)
            .map_err(|e| ReactorError::Connect(addr.to_string(), e))?;
        let peer = stream
            .peer_addr()
            .map_err(|e| ReactorError::Connect(addr.to_string(), e))?;

        let poll = Poll::new().map_err(ReactorError::Poll)?;
        let mut stream = TcpStream::from_std(stream);
        poll.registry()
            .register(&mut stream, SESSION, Interest::READABLE | Interest::WRITABLE)
            .map_err(ReactorError::Register)?;
        let waker = Arc::new(Waker::new(poll.registry(), WAKER).map_err(ReactorError::Register)?);

        let (tx, rx) = crossbeam_channel::bounded(FEEDER_QUEUE);

        info!(peer = %peer, "Connected to server");

        let client = Self {
            poll,
            events: Events::with_capacity(EVENTS_CAPACITY),
            conn: Connection::new(stream),
            outbound: rx,
            held: None,
        };
        Ok((client, Feeder::new(tx, waker)))
    }

    /// Run the session, printing every line the server sends to `output`.
    pub fn run<W: Write>(&mut self, output: &mut W) -> Result<SessionEnd, ReactorError> {
        loop {
            if let Err(e) = self.poll.poll(&mut self.events, None) {
                if e.kind() == io::ErrorKind::Interrupted {
                    continue;
                }
                return Err(ReactorError::Poll(e));
            }

            let mut readable = false;
            let mut writable = false;
            for event in self.events.iter() {
                match event.token() {
                    SESSION => {
                        readable |=
                            event.is_readable() || event.is_read_closed() || event.is_error();
                        writable |= event.is_writable();
                    }
                    WAKER => trace!("Woken by console feeder"),
                    _ => {}
                }
            }

            match self.turn(readable, writable, output) {
                Ok(Some(end)) => return Ok(end),
                Ok(None) => {}
                Err(e) => {
                    warn!(error = %e, "Connection error");
                    return Ok(SessionEnd::Failed(e));
                }
            }
        }
    }

    fn turn<W: Write>(
        &mut self,
        readable: bool,
        writable: bool,
        output: &mut W,
    ) -> Result<Option<SessionEnd>, ConnectionError> {
        if writable {
            self.conn.set_writable();
        }

        if readable {
            loop {
                let outcome = self.conn.receive()?;
                while let Some(line) = self.conn.next_line() {
                    print_line(output, &line)?;
                    if line == SESSION_END {
                        info!("Closing connection to server");
                        return Ok(Some(SessionEnd::Sentinel));
                    }
                }
                if outcome == ReceiveOutcome::Closed {
                    info!("Server closed the connection");
                    return Ok(Some(SessionEnd::ServerClosed));
                }
                if !self.conn.read_paused() {
                    break;
                }
            }
        }

        self.pump_outbound()?;
        Ok(None)
    }

    /// Move queued frames into the send buffer and flush while possible.
    fn pump_outbound(&mut self) -> Result<(), ConnectionError> {
        loop {
            self.fill_send_buffer()?;
            if !self.conn.is_writable() || self.conn.flush()? == 0 {
                break;
            }
        }
        Ok(())
    }

    fn fill_send_buffer(&mut self) -> Result<(), ConnectionError> {
        loop {
            let frame = match self.held.take() {
                Some(frame) => frame,
                None => match self.outbound.try_recv() {
                    Ok(frame) => frame,
                    Err(_) => break,
                },
            };

            if frame.len() > self.conn.send_remaining() {
                if self.conn.pending_output() == 0 {
                    return Err(BufferError::Overflow {
                        capacity: self.conn.send_capacity(),
                        filled: 0,
                        incoming: frame.len(),
                    }
                    .into());
                }
                self.held = Some(frame);
                break;
            }

            debug!(bytes = frame.len(), "Queued frame");
            self.conn.queue(&frame)?;
        }
        Ok(())
    }
}

/// Print a received line without its line ending.
fn print_line<W: Write>(output: &mut W, line: &[u8]) -> io::Result<()> {
    let text = parser::decode(line);
    writeln!(output, "{}", text.trim_end_matches(&['\r', '\n'][..]))?;
    output.flush()
}
