//! HTTP long-poll support.
//!
//! Each request streams newline-delimited records for up to a few seconds and
//! then completes; the next one is opened straight away under the same token.

use std::time::Duration;

use crossbeam_channel::Sender;
use log::{debug, warn};
use tokio::sync::watch;

use super::{decode_prefix, forward, next_epoch, Epoch, StreamMessage, TransportError, TransportResult};

/// Poll `{url}/api/poll/{token}` until the session goes away.
pub async fn run(
    url: &str,
    timeout: Duration,
    retry_delay: Duration,
    sender: Sender<StreamMessage>,
    mut epochs: watch::Receiver<Epoch>,
) {
    let client = match reqwest::Client::builder().timeout(timeout).build() {
        Ok(client) => client,
        Err(err) => {
            warn!("[poll] Unable to create HTTP client: {}", err);
            return;
        }
    };

    loop {
        let epoch = epochs.borrow_and_update().clone();
        let result = poll_once(&client, url, &epoch, &sender).await;

        let message = match result {
            Ok(()) => StreamMessage::Completed { epoch: epoch.id },
            Err(TransportError::Closed) => return,
            Err(err) => {
                warn!("[poll] Poll failed: {}", err);
                StreamMessage::Disconnected { epoch: epoch.id }
            }
        };
        let reconnect = matches!(message, StreamMessage::Disconnected { .. });
        if forward(&sender, message).is_err() {
            return;
        }

        if reconnect {
            tokio::time::sleep(retry_delay).await;
            if !next_epoch(&mut epochs, epoch.id).await {
                return;
            }
        }
    }
}

/// One request. Every chunk is forwarded as the whole body received so far.
async fn poll_once(
    client: &reqwest::Client,
    url: &str,
    epoch: &Epoch,
    sender: &Sender<StreamMessage>,
) -> TransportResult<()> {
    let url = format!("{}/api/poll/{}", url.trim_end_matches('/'), epoch.token);
    debug!("[poll] GET {}", url);

    let mut response = client.get(&url).send().await?;
    if !response.status().is_success() {
        return Err(TransportError::Status(response.status().as_u16()));
    }

    let mut received: Vec<u8> = vec![];
    while let Some(chunk) = response.chunk().await? {
        received.extend_from_slice(&chunk);
        let (_, total) = decode_prefix(&received);
        forward(
            sender,
            StreamMessage::Delivery {
                epoch: epoch.id,
                total,
            },
        )?;
    }
    Ok(())
}
