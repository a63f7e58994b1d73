//! Console feeder.
//!
//! Runs on its own thread and is the only place the client blocks: it reads
//! console lines and hands encoded frames to the reactor through a bounded
//! channel, then wakes the poll. A full channel blocks the feeder until the
//! reactor catches up.

use crate::protocols::echo::parser::{self, STOP_INPUT};
use crate::runtime::buffer::BUFFER_SIZE;
use crate::runtime::error::ReactorError;
use bytes::Bytes;
use crossbeam_channel::Sender;
use mio::Waker;
use std::io::BufRead;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, warn};

/// Frames the feeder may queue ahead of the reactor.
pub const FEEDER_QUEUE: usize = 16;

/// Longest frame whose echo still fits a server send buffer.
const MAX_FRAME: usize = BUFFER_SIZE - parser::REPLY_PREFIX.len();

/// Why the feeder stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeederExit {
    /// The stop line was typed.
    StopInput,
    /// Console input ended or failed.
    EndOfInput,
    /// The reactor dropped its end of the channel.
    ReactorGone,
}

/// Producer half of the console to reactor hand-off.
pub struct Feeder {
    tx: Sender<Bytes>,
    waker: Arc<Waker>,
}

impl Feeder {
    pub(crate) fn new(tx: Sender<Bytes>, waker: Arc<Waker>) -> Self {
        Self { tx, waker }
    }

    /// Run the feeder on a dedicated thread.
    pub fn spawn<R>(self, input: R) -> Result<JoinHandle<FeederExit>, ReactorError>
    where
        R: BufRead + Send + 'static,
    {
        thread::Builder::new()
            .name("console-feeder".to_string())
            .spawn(move || self.run(input))
            .map_err(ReactorError::Spawn)
    }

    /// Read lines until the stop line, end of input, or the reactor is gone.
    ///
    /// Stopping never touches the socket; the session stays up until the
    /// server side ends it.
    pub fn run<R: BufRead>(self, input: R) -> FeederExit {
        for line in input.lines() {
            let line = match line {
                Ok(line) => line,
                Err(e) => {
                    warn!(error = %e, "Console read failed");
                    return FeederExit::EndOfInput;
                }
            };

            let frame = parser::encode_line(&line);
            if frame.len() > MAX_FRAME {
                warn!(len = frame.len(), max = MAX_FRAME, "Line too long, dropped");
                continue;
            }

            if self.tx.send(frame).is_err() {
                return FeederExit::ReactorGone;
            }
            if let Err(e) = self.waker.wake() {
                warn!(error = %e, "Failed to wake reactor");
                return FeederExit::ReactorGone;
            }

            if line == STOP_INPUT {
                debug!("Console input stopped");
                return FeederExit::StopInput;
            }
        }

        debug!("Console input ended");
        FeederExit::EndOfInput
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::token::WAKER;
    use crossbeam_channel::bounded;
    use mio::Poll;
    use std::io::Cursor;
    use std::time::Duration;

    fn feeder() -> (Feeder, crossbeam_channel::Receiver<Bytes>, Poll) {
        let poll = Poll::new().unwrap();
        let waker = Arc::new(Waker::new(poll.registry(), WAKER).unwrap());
        let (tx, rx) = bounded(FEEDER_QUEUE);
        (Feeder::new(tx, waker), rx, poll)
    }

    #[test]
    fn test_stops_on_bye() {
        let (feeder, rx, _poll) = feeder();
        let exit = feeder.run(Cursor::new("hello\nbye\nafter\n"));

        assert_eq!(exit, FeederExit::StopInput);
        let frames: Vec<Bytes> = rx.try_iter().collect();
        assert_eq!(frames, vec![Bytes::from("hello\r\n"), Bytes::from("bye\r\n")]);
    }

    #[test]
    fn test_only_exact_bye_stops() {
        let (feeder, rx, _poll) = feeder();
        let exit = feeder.run(Cursor::new("Bye\nbye \n"));

        assert_eq!(exit, FeederExit::EndOfInput);
        assert_eq!(rx.try_iter().count(), 2);
    }

    #[test]
    fn test_crlf_input_is_normalised() {
        let (feeder, rx, _poll) = feeder();
        feeder.run(Cursor::new("hi\r\n"));

        assert_eq!(rx.try_recv().unwrap(), Bytes::from("hi\r\n"));
    }

    #[test]
    fn test_long_line_dropped() {
        let (feeder, rx, _poll) = feeder();
        let input = format!("{}\n{}\n", "x".repeat(MAX_FRAME - 1), "y".repeat(MAX_FRAME - 2));
        feeder.run(Cursor::new(input));

        let frames: Vec<Bytes> = rx.try_iter().collect();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].len(), MAX_FRAME);
    }

    #[test]
    fn test_reactor_gone() {
        let (feeder, rx, _poll) = feeder();
        drop(rx);

        assert_eq!(feeder.run(Cursor::new("hello\n")), FeederExit::ReactorGone);
    }

    #[test]
    fn test_full_channel_blocks_feeder() {
        let (feeder, rx, _poll) = feeder();
        let input: String = (0..FEEDER_QUEUE + 4).map(|i| format!("line {i}\n")).collect();

        let handle = feeder.spawn(Cursor::new(input)).unwrap();
        std::thread::sleep(Duration::from_millis(200));
        assert!(!handle.is_finished());
        assert_eq!(rx.len(), FEEDER_QUEUE);

        let mut received = 0;
        while received < FEEDER_QUEUE + 4 {
            rx.recv_timeout(Duration::from_secs(5)).unwrap();
            received += 1;
        }
        assert_eq!(handle.join().unwrap(), FeederExit::EndOfInput);
    }
}
