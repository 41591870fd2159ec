//! Sends operator commands to the lighting server.

use std::io::{self, Write};
use std::net::TcpStream;

use log::debug;
use serde_json::{json, Map, Value};
use thiserror::Error;

use crate::config::Control;

pub type ClientResult<T> = Result<T, ClientError>;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("server answered with status {0}")]
    Status(u16),
}

enum Target {
    /// Lighting server's network port, one JSON record per line.
    Socket(TcpStream),
    /// Web GUI send endpoint.
    Http {
        client: reqwest::blocking::Client,
        url: String,
    },
}

/// Sends commands to the lighting server.
pub struct ControlClient {
    target: Target,
}

/// A command record as the server reads it.
pub fn record(command: &str, args: &[Value], kwargs: &Map<String, Value>) -> Value {
    json!({
        "command": command,
        "args": args,
        "kwargs": kwargs,
    })
}

impl ControlClient {
    /// Connect to the configured destination.
    pub fn from_config(config: &Control) -> ClientResult<ControlClient> {
        let target = match config {
            Control::Socket { addr } => Target::Socket(TcpStream::connect(addr)?),
            Control::Http { url } => Target::Http {
                client: reqwest::blocking::Client::new(),
                url: format!("{}/api/send", url.trim_end_matches('/')),
            },
        };
        Ok(ControlClient { target })
    }

    /// Send one command.
    pub fn send(&mut self, command: &str, args: &[Value], kwargs: &Map<String, Value>) -> ClientResult<()> {
        let value = record(command, args, kwargs);
        debug!("[client] Sending {}", value);

        match &mut self.target {
            Target::Socket(stream) => {
                let line = serde_json::to_string(&value)?;
                stream.write_all(line.as_bytes())?;
                stream.write_all(b"\n")?;
                stream.flush()?;
            }
            Target::Http { client, url } => {
                let response = client.post(url.as_str()).json(&value).send()?;
                if !response.status().is_success() {
                    return Err(ClientError::Status(response.status().as_u16()));
                }
            }
        }
        Ok(())
    }
}
