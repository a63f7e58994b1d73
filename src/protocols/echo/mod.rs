//! Echo protocol implementation.
//!
//! A line-delimited text echo service:
//! - Client sends: `<text>\r\n`
//! - Server replies: `echo:<text>\r\n`
//!
//! ## Protocol Format
//!
//! ```text
//! Request:  hello\r\n
//! Response: echo:hello\r\n
//! ```
//!
//! A frame is everything up to and including the first `\n`. Nothing is
//! acted upon until that delimiter has arrived.
//!
//! ## Sentinels
//!
//! Three literals end things, and they are deliberately not the same:
//! - `Bye\r\n` received by the server: reply, then close the connection.
//! - `bye` typed on the client console: stop reading console input.
//! - `echo:bye\r\n` received by the client: end the client session.
//!
//! Typing `bye` on the client sends `bye\r\n`, which the server echoes as
//! a normal frame. That reply matches `echo:bye\r\n`, so it is the client
//! that hangs up, not the server.

pub mod parser;
