//! Newline-delimited JSON command stream reader.
//!
//! The stream may arrive in two shapes: as the whole text received so far on
//! a connection (HTTP long-poll bodies), or as plain increments (sockets).
//! Both feed the same pending buffer, so every complete record is decoded
//! exactly once and in order, no matter how the text was chunked.

use log::{debug, error};
use thiserror::Error;

mod command;
pub use self::command::{Command, ManualControl, MonitorEvent};

/// Record separator.
const SEPARATOR: char = '\n';

/// How much of a broken record ends up in the log.
const LOGGED_RECORD_LEN: usize = 200;

pub type ParserResult<T> = Result<T, ParserError>;

/// Reasons a single record could not be decoded.
#[derive(Error, Debug)]
pub enum ParserError {
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("record has no command type")]
    MissingCommand,
    #[error("bad argument for {command}: {reason}")]
    BadArgument { command: String, reason: String },
}

/// Command buffer and stream framer.
pub struct CommandParser {
    /// Commands framed by the last delivery, in arrival order.
    pub cmds: Vec<Command>,
    /// Bytes of the current connection's text already scanned.
    consumed: usize,
    /// Trailing partial record carried over to the next delivery.
    pending: String,
    /// Records that failed to decode since the last reset.
    failures: usize,
}

impl Default for CommandParser {
    fn default() -> CommandParser {
        CommandParser::new()
    }
}

impl CommandParser {
    pub fn new() -> CommandParser {
        CommandParser {
            cmds: vec![],
            consumed: 0,
            pending: String::new(),
            failures: 0,
        }
    }

    /// Take the full text received so far on the current connection.
    ///
    /// Only the part beyond what was already scanned is read. If `total` is
    /// shorter than that, or the scanned length does not fall on a character
    /// boundary of `total`, it is treated as a new connection: the pending
    /// partial record is dropped and `total` is read from the start.
    pub fn take_total(&mut self, total: &str) -> &[Command] {
        self.cmds.clear();

        let fresh = match total.get(self.consumed..) {
            Some(fresh) => fresh,
            None => {
                debug!(
                    "[parser] Stream length went from {} to {}, starting over",
                    self.consumed,
                    total.len()
                );
                self.pending.clear();
                total
            }
        };
        self.consumed = total.len();
        self.pending.push_str(fresh);
        self.frame();
        &self.cmds
    }

    /// Take the next increment of the stream.
    pub fn take_chunk(&mut self, data: &str) -> &[Command] {
        self.cmds.clear();
        self.consumed += data.len();
        self.pending.push_str(data);
        self.frame();
        &self.cmds
    }

    /// The connection ended. Whatever partial record is left is lost.
    pub fn finish(&mut self) {
        if !self.pending.is_empty() {
            debug!("[parser] Dropping {} byte partial record", self.pending.len());
        }
        self.pending.clear();
        self.consumed = 0;
    }

    /// Forget everything, including framed commands nobody took yet.
    pub fn reset(&mut self) {
        self.finish();
        self.cmds.clear();
        self.failures = 0;
    }

    /// Length of the partial record waiting for its separator.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Bytes of the current connection accounted for.
    pub fn consumed(&self) -> usize {
        self.consumed
    }

    pub fn failures(&self) -> usize {
        self.failures
    }

    /// Split the pending buffer into complete records and decode them.
    fn frame(&mut self) {
        let complete = match self.pending.rfind(SEPARATOR) {
            Some(end) => end + 1,
            // No separator yet, keep waiting.
            None => return,
        };

        let rest = self.pending.split_off(complete);
        let records = std::mem::replace(&mut self.pending, rest);

        for line in records.split(SEPARATOR) {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match Command::decode(line) {
                Ok(cmd) => self.cmds.push(cmd),
                Err(err) => {
                    self.failures += 1;
                    error!("[parser] Failed to decode record: {} ({})", err, truncated(line));
                }
            }
        }
    }
}

fn truncated(line: &str) -> &str {
    match line.char_indices().nth(LOGGED_RECORD_LEN) {
        Some((end, _)) => &line[..end],
        None => line,
    }
}
