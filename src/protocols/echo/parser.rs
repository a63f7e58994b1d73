//! Echo protocol parser and frame codec.

use bytes::{BufMut, Bytes, BytesMut};
use std::borrow::Cow;

/// Byte that terminates every frame.
pub const DELIMITER: u8 = b'\n';

/// Line ending appended to console input before it goes on the wire.
pub const LINE_ENDING: &str = "\r\n";

/// Prefix the server puts in front of every echoed frame.
pub const REPLY_PREFIX: &[u8] = b"echo:";

/// Frame that makes the server close the connection after replying.
pub const CLOSE_SENTINEL: &[u8] = b"Bye\r\n";

/// Console line that stops the client's input feeder.
pub const STOP_INPUT: &str = "bye";

/// Reply line that ends the client session.
pub const SESSION_END: &[u8] = b"echo:bye\r\n";

/// Parsed echo command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Echo one frame back.
    Echo {
        /// Bytes in the frame, delimiter included.
        frame_len: usize,
    },
    /// Echo the close sentinel, then close the connection.
    Bye {
        /// Bytes in the frame, delimiter included.
        frame_len: usize,
    },
}

impl Command {
    /// Length of the frame this command was parsed from.
    pub fn frame_len(&self) -> usize {
        match self {
            Command::Echo { frame_len } | Command::Bye { frame_len } => *frame_len,
        }
    }
}

/// Parse result.
#[derive(Debug, PartialEq, Eq)]
pub enum ParseResult {
    /// A complete frame sits at the front of the input.
    Complete(Command),
    /// No delimiter yet.
    Incomplete,
}

/// Parse the first frame in the input buffer.
pub fn parse(input: &[u8]) -> ParseResult {
    let frame_len = match find_frame(input) {
        Some(len) => len,
        None => return ParseResult::Incomplete,
    };

    if &input[..frame_len] == CLOSE_SENTINEL {
        ParseResult::Complete(Command::Bye { frame_len })
    } else {
        ParseResult::Complete(Command::Echo { frame_len })
    }
}

/// Length of the first complete frame, delimiter included.
///
/// Framing works on raw bytes: `\n` never occurs inside a multi-byte UTF-8
/// sequence, so a frame boundary can't split a character.
pub fn find_frame(input: &[u8]) -> Option<usize> {
    input.iter().position(|&b| b == DELIMITER).map(|pos| pos + 1)
}

/// Encode text as UTF-8 bytes.
pub fn encode(text: &str) -> Bytes {
    Bytes::copy_from_slice(text.as_bytes())
}

/// Encode a console line as a wire frame.
pub fn encode_line(text: &str) -> Bytes {
    let mut frame = BytesMut::with_capacity(text.len() + LINE_ENDING.len());
    frame.put(encode(text));
    frame.put_slice(LINE_ENDING.as_bytes());
    frame.freeze()
}

/// Decode bytes as UTF-8 text, replacing invalid sequences.
pub fn decode(bytes: &[u8]) -> Cow<'_, str> {
    String::from_utf8_lossy(bytes)
}

/// Size of the reply to a frame of `frame_len` bytes.
pub fn reply_len(frame_len: usize) -> usize {
    REPLY_PREFIX.len() + frame_len
}

/// Write `echo:<frame>` into `output`.
///
/// Returns `None` if `output` is too small to hold the whole reply.
pub fn write_reply(frame: &[u8], output: &mut [u8]) -> Option<usize> {
    let len = reply_len(frame.len());
    if output.len() < len {
        return None;
    }
    output[..REPLY_PREFIX.len()].copy_from_slice(REPLY_PREFIX);
    output[REPLY_PREFIX.len()..len].copy_from_slice(frame);
    Some(len)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_echo() {
        match parse(b"hello\r\n") {
            ParseResult::Complete(Command::Echo { frame_len }) => assert_eq!(frame_len, 7),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_parse_bye() {
        assert_eq!(
            parse(b"Bye\r\nmore"),
            ParseResult::Complete(Command::Bye { frame_len: 5 })
        );
    }

    #[test]
    fn test_lowercase_bye_is_plain_echo() {
        assert_eq!(
            parse(b"bye\r\n"),
            ParseResult::Complete(Command::Echo { frame_len: 5 })
        );
    }

    #[test]
    fn test_bye_without_carriage_return_is_plain_echo() {
        assert_eq!(
            parse(b"Bye\n"),
            ParseResult::Complete(Command::Echo { frame_len: 4 })
        );
    }

    #[test]
    fn test_incomplete() {
        assert_eq!(parse(b"hello"), ParseResult::Incomplete);
        assert_eq!(parse(b"hello\r"), ParseResult::Incomplete);
        assert_eq!(parse(b""), ParseResult::Incomplete);
    }

    #[test]
    fn test_find_frame_stops_at_first_delimiter() {
        assert_eq!(find_frame(b"a\r\nb\r\n"), Some(3));
        assert_eq!(find_frame(b"\n"), Some(1));
    }

    #[test]
    fn test_frame_boundary_inside_multibyte_text() {
        let text = "héllo wörld\r\nrest";
        let len = find_frame(text.as_bytes()).unwrap();
        assert_eq!(decode(&text.as_bytes()[..len]), "héllo wörld\r\n");
    }

    #[test]
    fn test_decode_partial_sequence_is_lossy() {
        let bytes = "é".as_bytes();
        assert_eq!(decode(&bytes[..1]), "\u{FFFD}");
    }

    #[test]
    fn test_encode_line() {
        assert_eq!(&encode_line("hello")[..], b"hello\r\n");
        assert_eq!(&encode_line("")[..], b"\r\n");
        assert_eq!(&encode("hé")[..], "hé".as_bytes());
    }

    #[test]
    fn test_write_reply() {
        let mut buf = [0u8; 20];
        let len = write_reply(b"hello\r\n", &mut buf).unwrap();
        assert_eq!(&buf[..len], b"echo:hello\r\n");
    }

    #[test]
    fn test_write_reply_no_room() {
        let mut buf = [0u8; 8];
        assert_eq!(write_reply(b"hello\r\n", &mut buf), None);
    }
}
