//! Readiness token layout.
//!
//! Connection tokens are slab keys handed out by the connection registry.
//! The top of the token space is reserved for the fixed handles each
//! reactor owns.

use mio::Token;

/// Listening socket (server).
pub const LISTENER: Token = Token(usize::MAX);

/// Console feeder wake-ups (client).
pub const WAKER: Token = Token(usize::MAX - 1);

/// The single server connection (client).
pub const SESSION: Token = Token(0);

/// Token for the connection stored under `conn_id`.
pub fn connection_token(conn_id: usize) -> Token {
    Token(conn_id)
}

/// Connection id for a token, if it is not one of the reserved handles.
pub fn connection_id(token: Token) -> Option<usize> {
    match token {
        LISTENER | WAKER => None,
        Token(id) => Some(id),
    }
}
