//! Send one operator command, e.g. `effectctl config.yaml C_SELECT '"mh1"'`.

use std::io;

use log::error;
use serde_json::{Map, Value};

use effectmonitor_rs::client::ControlClient;
use effectmonitor_rs::config;

fn usage() -> io::Error {
    eprintln!("usage: effectctl <config> <command> [args...]");
    io::Error::from(io::ErrorKind::InvalidInput)
}

fn main() -> io::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let mut args = std::env::args().skip(1);
    let path = args.next().ok_or_else(usage)?;
    let command = args.next().ok_or_else(usage)?;
    // Anything that isn't JSON is sent as a string.
    let command_args: Vec<Value> = args
        .map(|arg| serde_json::from_str(&arg).unwrap_or(Value::String(arg)))
        .collect();

    let config_root = if path.ends_with(".json") {
        config::read_config_json(&path)?
    } else {
        config::read_config_yaml(&path)?
    };
    let control = config_root.control.ok_or_else(|| {
        error!("No control destination configured.");
        io::Error::from(io::ErrorKind::InvalidData)
    })?;

    let mut client = ControlClient::from_config(&control).map_err(|err| {
        error!("Unable to reach the server: {}", err);
        io::Error::from(io::ErrorKind::Other)
    })?;
    client
        .send(&command, &command_args, &Map::new())
        .map_err(|err| {
            error!("Sending {} failed: {}", command, err);
            io::Error::from(io::ErrorKind::Other)
        })
}
