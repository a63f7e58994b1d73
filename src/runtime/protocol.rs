//! Protocol processing for the reactor.
//!
//! Provides synchronous frame handling that works with raw byte buffers
//! (no async runtime required).

use crate::protocols::echo::parser::{self, Command, ParseResult};

/// Result of processing a buffer.
#[derive(Debug, PartialEq, Eq)]
pub enum ProcessResult {
    /// No complete frame in the input yet.
    NeedData,
    /// One frame processed, reply written to the output buffer.
    Response {
        consumed: usize,
        response_len: usize,
    },
    /// Close sentinel processed. The reply is written and the connection
    /// should close once it is flushed.
    Quit {
        consumed: usize,
        response_len: usize,
    },
    /// A complete frame is buffered but its reply does not fit in `output`.
    /// Nothing was consumed.
    NoRoom { response_len: usize },
}

/// Process one echo frame.
///
/// Parses the first frame from `input` and writes `echo:<frame>` to
/// `output`. Returns the number of bytes consumed from input and written
/// to output.
pub fn process_echo(input: &[u8], output: &mut [u8]) -> ProcessResult {
    let command = match parser::parse(input) {
        ParseResult::Complete(command) => command,
        ParseResult::Incomplete => return ProcessResult::NeedData,
    };

    let consumed = command.frame_len();
    let frame = &input[..consumed];
    let response_len = match parser::write_reply(frame, output) {
        Some(len) => len,
        None => {
            return ProcessResult::NoRoom {
                response_len: parser::reply_len(consumed),
            }
        }
    };

    match command {
        Command::Echo { .. } => ProcessResult::Response {
            consumed,
            response_len,
        },
        Command::Bye { .. } => ProcessResult::Quit {
            consumed,
            response_len,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_process_echo() {
        let mut out = [0u8; 64];
        let result = process_echo(b"hello\r\n", &mut out);
        assert_eq!(
            result,
            ProcessResult::Response {
                consumed: 7,
                response_len: 12
            }
        );
        assert_eq!(&out[..12], b"echo:hello\r\n");
    }

    #[test]
    fn test_process_echo_first_frame_only() {
        let mut out = [0u8; 64];
        let result = process_echo(b"a\r\nb\r\n", &mut out);
        assert_eq!(
            result,
            ProcessResult::Response {
                consumed: 3,
                response_len: 8
            }
        );
        assert_eq!(&out[..8], b"echo:a\r\n");
    }

    #[test]
    fn test_process_echo_need_data() {
        let mut out = [0u8; 64];
        assert_eq!(process_echo(b"partial", &mut out), ProcessResult::NeedData);
    }

    #[test]
    fn test_process_echo_quit() {
        let mut out = [0u8; 64];
        let result = process_echo(b"Bye\r\n", &mut out);
        assert_eq!(
            result,
            ProcessResult::Quit {
                consumed: 5,
                response_len: 10
            }
        );
        assert_eq!(&out[..10], b"echo:Bye\r\n");
    }

    #[test]
    fn test_process_echo_no_room() {
        let mut out = [0u8; 4];
        assert_eq!(
            process_echo(b"hi\r\n", &mut out),
            ProcessResult::NoRoom { response_len: 9 }
        );
    }
}
