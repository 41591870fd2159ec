use std::io;

use effectmonitor_rs::{config, dispatcher::Dispatcher, output::LogSink, session};

fn main() -> io::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let path = std::env::args().nth(1).unwrap_or_else(|| "./config.yaml".to_string());
    let config_root = if path.ends_with(".json") {
        config::read_config_json(&path)?
    } else {
        config::read_config_yaml(&path)?
    };

    let dispatcher = Dispatcher::new(Box::new(LogSink));
    session::run(&config_root, dispatcher)
}
