//! Persistent TCP connection to the lighting server's network port.

use std::time::Duration;

use crossbeam_channel::Sender;
use log::{info, warn};
use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;
use tokio::sync::watch;

use super::{decode_prefix, forward, next_epoch, Epoch, StreamMessage, TransportError, TransportResult};

const READ_BUFFER_SIZE: usize = 8192;

/// Keep a connection to `addr` open, reconnecting whenever it drops.
pub async fn run(
    addr: &str,
    retry_delay: Duration,
    sender: Sender<StreamMessage>,
    mut epochs: watch::Receiver<Epoch>,
) {
    loop {
        let epoch = epochs.borrow_and_update().clone();

        let stream = match TcpStream::connect(addr).await {
            Ok(stream) => stream,
            Err(err) => {
                warn!("[socket] Unable to connect to {}: {}", addr, err);
                if forward(&sender, StreamMessage::Disconnected { epoch: epoch.id }).is_err() {
                    return;
                }
                tokio::time::sleep(retry_delay).await;
                if !next_epoch(&mut epochs, epoch.id).await {
                    return;
                }
                continue;
            }
        };
        info!("[socket] Connected to {}", addr);

        match read_stream(stream, &epoch, &sender).await {
            Err(TransportError::Closed) => return,
            Err(err) => warn!("[socket] Connection lost: {}", err),
            Ok(()) => info!("[socket] Server closed the connection."),
        }

        if forward(&sender, StreamMessage::Disconnected { epoch: epoch.id }).is_err() {
            return;
        }
        if !next_epoch(&mut epochs, epoch.id).await {
            return;
        }
    }
}

/// Forward everything read from `stream` until it closes.
async fn read_stream(
    mut stream: TcpStream,
    epoch: &Epoch,
    sender: &Sender<StreamMessage>,
) -> TransportResult<()> {
    let mut buf = [0; READ_BUFFER_SIZE];
    let mut carry: Vec<u8> = vec![];

    loop {
        let len = stream.read(&mut buf).await?;
        if len == 0 {
            return Ok(());
        }

        carry.extend_from_slice(&buf[..len]);
        let (valid, data) = decode_prefix(&carry);
        carry.drain(..valid);

        if !data.is_empty() {
            forward(
                sender,
                StreamMessage::Chunk {
                    epoch: epoch.id,
                    data,
                },
            )?;
        }
    }
}
