use std::path::Path;
use std::{fs, io};

use log::error;
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Root {
    /// Live monitor configuration.
    pub monitor: Monitor,
    /// Where operator commands go, if anywhere.
    #[serde(default)]
    pub control: Option<Control>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Monitor {
    /// Source of the command stream.
    pub transport: Transport,
    /// Pause before retrying a connection that could not be opened.
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    /// Upper bound for a single long-poll request.
    #[serde(default = "default_poll_timeout_secs")]
    pub poll_timeout_secs: u64,
    /// Interval of the status summary in the log. Zero turns it off.
    #[serde(default = "default_status_interval_secs")]
    pub status_interval_secs: u64,
}

fn default_retry_delay_ms() -> u64 {
    1000
}

fn default_poll_timeout_secs() -> u64 {
    30
}

fn default_status_interval_secs() -> u64 {
    5
}

/// Command stream source.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase", tag = "type")]
pub enum Transport {
    /// Web GUI long-poll endpoint.
    Poll {
        /// Base URL, e.g. `http://localhost:5000`.
        url: String,
    },
    /// Lighting server's network port.
    Socket {
        /// Target address, e.g. `localhost:37737`.
        addr: String,
    },
}

/// Operator command destination.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase", tag = "type")]
pub enum Control {
    /// Web GUI send endpoint.
    Http {
        /// Base URL.
        url: String,
    },
    /// Lighting server's network port.
    Socket {
        addr: String,
    },
}

fn invalid(message: String) -> io::Error {
    error!("Invalid configuration: {}", message);
    io::Error::new(io::ErrorKind::InvalidData, message)
}

fn check_url(url: &str) -> io::Result<()> {
    if !(url.starts_with("http://") || url.starts_with("https://")) {
        return Err(invalid(format!("not an HTTP URL: {:?}", url)));
    }
    Ok(())
}

fn check_addr(addr: &str) -> io::Result<()> {
    if addr.trim().is_empty() {
        return Err(invalid("empty address".to_string()));
    }
    Ok(())
}

/// Quick sanity check for the configuration.
fn check(root: &Root) -> io::Result<()> {
    match &root.monitor.transport {
        Transport::Poll { url } => check_url(url)?,
        Transport::Socket { addr } => check_addr(addr)?,
    }
    match &root.control {
        Some(Control::Http { url }) => check_url(url)?,
        Some(Control::Socket { addr }) => check_addr(addr)?,
        None => {}
    }
    Ok(())
}

pub fn read_config_json<T: AsRef<Path>>(path: T) -> io::Result<Root> {
    let file = fs::File::open(path)?;
    let reader = io::BufReader::new(file);
    let root: Root = serde_json::from_reader(reader).map_err(|err| {
        error!("Error reading config file: {:?}", err);
        io::Error::from(io::ErrorKind::InvalidData)
    })?;
    check(&root)?;
    Ok(root)
}

pub fn read_config_yaml<T: AsRef<Path>>(path: T) -> io::Result<Root> {
    let file = fs::File::open(path)?;
    let reader = io::BufReader::new(file);
    let root: Root = serde_yaml::from_reader(reader).map_err(|err| {
        error!("Error reading config file: {:?}", err);
        io::Error::from(io::ErrorKind::InvalidData)
    })?;
    check(&root)?;
    Ok(root)
}
