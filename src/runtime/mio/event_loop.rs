//! Server reactor.
//!
//! Readiness-based model: poll tells us when sockets are ready,
//! then we perform non-blocking read/write syscalls.
//! Uses epoll on Linux, kqueue on macOS.
//!
//! One thread owns the poll instance, the listener and every connection.
//! A failure on one connection closes that connection only.

use crate::runtime::connection::{CloseReason, Connection, ConnectionRegistry, Disposition};
use crate::runtime::error::{ConnectionError, ReactorError};
use crate::runtime::token::{connection_id, connection_token, LISTENER};
use mio::event::Event;
use mio::net::{TcpListener, TcpStream};
use mio::{Events, Interest, Poll};
use std::io;
use std::net::SocketAddr;
use tracing::{debug, error, info, trace, warn};

const EVENTS_CAPACITY: usize = 1024;
const LISTEN_BACKLOG: i32 = 1024;

/// Echo server bound to a listening socket.
pub struct EchoServer {
    poll: Poll,
    events: Events,
    listener: TcpListener,
    connections: ConnectionRegistry<TcpStream>,
    local_addr: SocketAddr,
}

impl EchoServer {
    /// Bind the listener and register it with a fresh poll instance.
    pub fn bind(addr: SocketAddr) -> Result<Self, ReactorError> {
        let poll = Poll::new().map_err(ReactorError::Poll)?;

        let listener = create_listener(addr).map_err(|e| ReactorError::Bind(addr, e))?;
        let mut listener = TcpListener::from_std(listener);
        poll.registry()
            .register(&mut listener, LISTENER, Interest::READABLE)
            .map_err(ReactorError::Register)?;

        let local_addr = listener
            .local_addr()
            .map_err(|e| ReactorError::Bind(addr, e))?;

        info!(addr = %local_addr, "Server listening");

        Ok(Self {
            poll,
            events: Events::with_capacity(EVENTS_CAPACITY),
            listener,
            connections: ConnectionRegistry::new(),
            local_addr,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Run the reactor. Only returns if the poll instance itself fails.
    pub fn run(self) -> Result<(), ReactorError> {
        let Self {
            mut poll,
            mut events,
            listener,
            mut connections,
            ..
        } = self;

        loop {
            if let Err(e) = poll.poll(&mut events, None) {
                if e.kind() == io::ErrorKind::Interrupted {
                    continue;
                }
                return Err(ReactorError::Poll(e));
            }

            for event in events.iter() {
                match event.token() {
                    LISTENER => accept_connections(&listener, &poll, &mut connections),
                    token => {
                        let Some(conn_id) = connection_id(token) else {
                            continue;
                        };
                        match handle_connection_event(conn_id, event, &mut connections) {
                            Ok(Disposition::Keep) => {}
                            Ok(Disposition::Close(reason)) => {
                                close_connection(&poll, &mut connections, conn_id, reason);
                            }
                            Err(e) => {
                                match e {
                                    ConnectionError::Buffer(_) => {
                                        warn!(conn_id, error = %e, "Connection error")
                                    }
                                    ConnectionError::Io(_) => {
                                        debug!(conn_id, error = %e, "Connection error")
                                    }
                                }
                                close_connection(
                                    &poll,
                                    &mut connections,
                                    conn_id,
                                    CloseReason::PeerClosed,
                                );
                            }
                        }
                    }
                }
            }
        }
    }
}

/// Accept every pending connection.
///
/// The listener is edge-triggered, so one event can stand for several
/// queued connections.
fn accept_connections(
    listener: &TcpListener,
    poll: &Poll,
    connections: &mut ConnectionRegistry<TcpStream>,
) {
    loop {
        match listener.accept() {
            Ok((stream, peer_addr)) => {
                let conn_id = connections.insert(Connection::new(stream));

                // Re-borrow after insert
                let Some(conn) = connections.get_mut(conn_id) else {
                    continue;
                };
                if let Err(e) = poll.registry().register(
                    conn.stream_mut(),
                    connection_token(conn_id),
                    Interest::READABLE | Interest::WRITABLE,
                ) {
                    warn!(conn_id, peer = %peer_addr, error = %e, "Failed to register connection");
                    connections.remove(conn_id);
                    continue;
                }

                info!(
                    conn_id,
                    peer = %peer_addr,
                    active = connections.len(),
                    "Accepted connection"
                );
            }
            Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => break,
            Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                // Edge-triggered: connections still queued behind this error
                // wait until the next one arrives and re-arms the listener.
                error!(error = %e, "Accept error");
                break;
            }
        }
    }
}

fn handle_connection_event(
    conn_id: usize,
    event: &Event,
    connections: &mut ConnectionRegistry<TcpStream>,
) -> Result<Disposition, ConnectionError> {
    let Some(conn) = connections.get_mut(conn_id) else {
        return Ok(Disposition::Keep);
    };

    // Errors and hang-ups surface through the next read
    let readable = event.is_readable() || event.is_read_closed() || event.is_error();
    let writable = event.is_writable();
    let disposition = conn.handle_ready(readable, writable)?;
    trace!(conn_id, readable, writable, state = ?conn.state(), "Connection event");
    Ok(disposition)
}

fn close_connection(
    poll: &Poll,
    connections: &mut ConnectionRegistry<TcpStream>,
    conn_id: usize,
    reason: CloseReason,
) {
    if let Some(mut conn) = connections.remove(conn_id) {
        let _ = poll.registry().deregister(conn.stream_mut());

        match reason {
            CloseReason::Sentinel => info!(conn_id, "Closing connection on client request"),
            CloseReason::PeerClosed => {
                debug!(conn_id, unprocessed = conn.buffered().len(), "Connection closed")
            }
        }
    }
}

/// Create a non-blocking listening socket.
///
/// `SO_REUSEADDR` lets a restarted server rebind the port right away.
fn create_listener(addr: SocketAddr) -> io::Result<std::net::TcpListener> {
    let socket = socket2::Socket::new(
        match addr {
            SocketAddr::V4(_) => socket2::Domain::IPV4,
            SocketAddr::V6(_) => socket2::Domain::IPV6,
        },
        socket2::Type::STREAM,
        Some(socket2::Protocol::TCP),
    )?;

    socket.set_reuse_address(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;
    socket.listen(LISTEN_BACKLOG)?;

    Ok(socket.into())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::net::TcpStream as StdTcpStream;
    use std::thread;
    use std::time::Duration;

    /// Start a server on an ephemeral port and return its address.
    pub(crate) fn start_server() -> SocketAddr {
        let server = EchoServer::bind("127.0.0.1:0".parse().unwrap()).unwrap();
        let addr = server.local_addr();
        thread::spawn(move || {
            let _ = server.run();
        });
        addr
    }

    fn connect(addr: SocketAddr) -> StdTcpStream {
        let stream = StdTcpStream::connect(addr).unwrap();
        stream
            .set_read_timeout(Some(Duration::from_secs(5)))
            .unwrap();
        stream
    }

    fn read_n(stream: &mut StdTcpStream, n: usize) -> Vec<u8> {
        let mut buf = vec![0u8; n];
        stream.read_exact(&mut buf).unwrap();
        buf
    }

    #[test]
    fn test_echo_hello() {
        let addr = start_server();
        let mut client = connect(addr);

        client.write_all(b"hello\r\n").unwrap();
        assert_eq!(read_n(&mut client, 12), b"echo:hello\r\n");
    }

    #[test]
    fn test_no_reply_before_delimiter() {
        let addr = start_server();
        let mut client = connect(addr);

        client.write_all(b"hel").unwrap();
        client
            .set_read_timeout(Some(Duration::from_millis(200)))
            .unwrap();
        let mut buf = [0u8; 16];
        let err = client.read(&mut buf).unwrap_err();
        assert!(matches!(
            err.kind(),
            io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
        ));

        client
            .set_read_timeout(Some(Duration::from_secs(5)))
            .unwrap();
        client.write_all(b"lo\r\n").unwrap();
        assert_eq!(read_n(&mut client, 12), b"echo:hello\r\n");
    }

    #[test]
    fn test_two_frames_in_one_write() {
        let addr = start_server();
        let mut client = connect(addr);

        client.write_all(b"a\r\nb\r\n").unwrap();
        assert_eq!(read_n(&mut client, 16), b"echo:a\r\necho:b\r\n");
    }

    #[test]
    fn test_bye_closes_connection() {
        let addr = start_server();
        let mut client = connect(addr);

        client.write_all(b"Bye\r\n").unwrap();
        let mut reply = Vec::new();
        client.read_to_end(&mut reply).unwrap();
        assert_eq!(reply, b"echo:Bye\r\n");
    }

    #[test]
    fn test_half_close_still_gets_every_echo() {
        let addr = start_server();
        let mut client = connect(addr);

        let mut sent = Vec::new();
        let mut expected = Vec::new();
        for i in 0..2000 {
            let frame = format!("line {i}\r\n");
            sent.extend_from_slice(frame.as_bytes());
            expected.extend_from_slice(b"echo:");
            expected.extend_from_slice(frame.as_bytes());
        }

        let mut writer = client.try_clone().unwrap();
        let handle = thread::spawn(move || {
            writer.write_all(&sent).unwrap();
            writer.shutdown(std::net::Shutdown::Write).unwrap();
        });

        let mut reply = Vec::new();
        client.read_to_end(&mut reply).unwrap();
        handle.join().unwrap();
        assert_eq!(reply, expected);
    }

    #[test]
    fn test_clients_are_independent() {
        let addr = start_server();
        let mut first = connect(addr);
        let mut second = connect(addr);

        first.write_all(b"one").unwrap();
        second.write_all(b"two\r\n").unwrap();
        assert_eq!(read_n(&mut second, 10), b"echo:two\r\n");

        first.write_all(b"\r\n").unwrap();
        assert_eq!(read_n(&mut first, 10), b"echo:one\r\n");
    }

    #[test]
    fn test_overflow_closes_only_that_connection() {
        let addr = start_server();
        let mut flooder = connect(addr);
        let mut bystander = connect(addr);

        flooder.write_all(&[b'x'; 2048]).unwrap();
        let mut buf = Vec::new();
        // Closed either cleanly or with a reset
        let _ = flooder.read_to_end(&mut buf);
        assert!(buf.is_empty());

        bystander.write_all(b"still here\r\n").unwrap();
        assert_eq!(read_n(&mut bystander, 17), b"echo:still here\r\n");
    }

    #[test]
    fn test_large_burst_is_fully_echoed() {
        let addr = start_server();
        let mut client = connect(addr);

        let mut sent = Vec::new();
        let mut expected = Vec::new();
        for i in 0..500 {
            let frame = format!("frame number {i}\r\n");
            sent.extend_from_slice(frame.as_bytes());
            expected.extend_from_slice(b"echo:");
            expected.extend_from_slice(frame.as_bytes());
        }

        let mut writer = client.try_clone().unwrap();
        let handle = thread::spawn(move || writer.write_all(&sent).unwrap());

        assert_eq!(read_n(&mut client, expected.len()), expected);
        handle.join().unwrap();
    }

    #[test]
    fn test_bind_conflict_is_fatal() {
        let taken = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = taken.local_addr().unwrap();

        match EchoServer::bind(addr) {
            Err(ReactorError::Bind(failed, _)) => assert_eq!(failed, addr),
            Err(e) => panic!("unexpected error: {e}"),
            Ok(_) => panic!("bind should fail"),
        }
    }
}
