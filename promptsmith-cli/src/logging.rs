//! Tracing subscriber setup. Logs always go to stderr (or an explicit
//! `LOG_FILE`), never stdout — stdout carries the stdio MCP transport.

use std::fs::OpenOptions;

use tracing_subscriber::{fmt, prelude::*, registry, EnvFilter};

use promptsmith_config::Settings;

pub fn init(settings: &Settings) {
    let filter = EnvFilter::try_new(format!("rmcp=warn,{}", settings.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    match &settings.log_file {
        Some(path) => match OpenOptions::new().create(true).append(true).open(path) {
            Ok(file) => {
                registry()
                    .with(filter)
                    .with(fmt::layer().with_writer(file).with_ansi(false))
                    .init();
            }
            Err(e) => {
                eprintln!("could not open log file '{path}': {e}, falling back to stderr");
                registry().with(filter).with(fmt::layer().with_writer(std::io::stderr)).init();
            }
        },
        None => {
            registry().with(filter).with(fmt::layer().with_writer(std::io::stderr)).init();
        }
    }
}
