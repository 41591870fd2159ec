//! Sources of the command stream.
//!
//! A transport runs on its own thread with a tokio runtime and forwards what
//! it reads to the session loop. Every message carries the id of the epoch the
//! connection was opened under, so the session can drop traffic from a
//! connection that belongs to an earlier epoch.

use std::io;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::Sender;
use log::{error, info};
use thiserror::Error;
use tokio::runtime::Runtime;
use tokio::sync::watch;

use crate::config::{Monitor, Transport};
use crate::output::status::{self, StatusMessage};

mod poll;
mod socket;

/// One connection epoch: everything between two session resets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Epoch {
    pub id: u64,
    /// Random client token; the server keys its per-client queue on it.
    pub token: String,
}

/// Message formats passed from a transport to the session loop.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamMessage {
    /// Full text received so far on the current connection.
    Delivery { epoch: u64, total: String },
    /// Text received since the previous message.
    Chunk { epoch: u64, data: String },
    /// The connection ended normally. A new one follows right away.
    Completed { epoch: u64 },
    /// The connection was lost or could not be opened.
    Disconnected { epoch: u64 },
}

impl StreamMessage {
    pub fn epoch(&self) -> u64 {
        match self {
            StreamMessage::Delivery { epoch, .. }
            | StreamMessage::Chunk { epoch, .. }
            | StreamMessage::Completed { epoch }
            | StreamMessage::Disconnected { epoch } => *epoch,
        }
    }
}

pub type TransportResult<T> = Result<T, TransportError>;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("unexpected HTTP status {0}")]
    Status(u16),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    /// The session loop is gone.
    #[error("session closed")]
    Closed,
}

/// Hand a message to the session loop.
fn forward(sender: &Sender<StreamMessage>, message: StreamMessage) -> TransportResult<()> {
    sender.send(message).map_err(|_| TransportError::Closed)
}

/// Wait until the session has moved past `epoch`. Returns false once the session is gone.
async fn next_epoch(epochs: &mut watch::Receiver<Epoch>, epoch: u64) -> bool {
    loop {
        if epochs.borrow().id != epoch {
            return true;
        }
        if epochs.changed().await.is_err() {
            return false;
        }
    }
}

/// Length of `bytes` minus a trailing incomplete character.
///
/// A multi-byte character split across two reads is held back until the rest
/// arrives. Bytes that can never become valid count as read and are replaced
/// when decoded, so the decoded prefix never changes once handed out.
fn valid_utf8_len(bytes: &[u8]) -> usize {
    let mut start = 0;
    loop {
        match std::str::from_utf8(&bytes[start..]) {
            Ok(_) => return bytes.len(),
            Err(err) => match err.error_len() {
                Some(invalid) => start += err.valid_up_to() + invalid,
                None => return start + err.valid_up_to(),
            },
        }
    }
}

/// Decoded text of the complete part of `bytes`.
fn decode_prefix(bytes: &[u8]) -> (usize, String) {
    let valid = valid_utf8_len(bytes);
    (valid, String::from_utf8_lossy(&bytes[..valid]).into_owned())
}

/// Start a thread that reads the configured stream and messages it
/// to the session's event loop.
pub fn start_transport_thread(
    config: &Monitor,
    sender: Sender<StreamMessage>,
    epochs: watch::Receiver<Epoch>,
    status: watch::Receiver<StatusMessage>,
) -> JoinHandle<()> {
    let config = config.clone();

    thread::spawn(move || {
        let runtime = match Runtime::new() {
            Ok(runtime) => runtime,
            Err(err) => {
                error!("[transport] Unable to start runtime: {}", err);
                return;
            }
        };

        if config.status_interval_secs > 0 {
            let interval = Duration::from_secs(config.status_interval_secs);
            runtime.spawn(status::log_status(status, interval));
        }

        let retry_delay = Duration::from_millis(config.retry_delay_ms);
        runtime.block_on(async {
            match &config.transport {
                Transport::Poll { url } => {
                    info!("[poll] Polling {}", url);
                    let timeout = Duration::from_secs(config.poll_timeout_secs);
                    poll::run(url, timeout, retry_delay, sender, epochs).await
                }
                Transport::Socket { addr } => {
                    info!("[socket] Reading from {}", addr);
                    socket::run(addr, retry_delay, sender, epochs).await
                }
            }
        });
        info!("[transport] Session closed, stopping.");
    })
}
