use tracing_subscriber::{EnvFilter, fmt, prelude::*};

pub mod formatter;
mod writer;

pub use formatter::EventFormatter;
use writer::LogFileWriter;

use crate::config::Config;

pub fn init(config: &Config) {
    let log_level = config
        .logging
        .as_ref()
        .and_then(|l| l.level.as_deref())
        .unwrap_or("info");

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    let stdout_layer = fmt::layer()
        .event_format(EventFormatter::new(true))
        .with_ansi(true);

    let file_prefix = config
        .logging
        .as_ref()
        .and_then(|l| l.file_prefix.as_deref());

    let file_layer = file_prefix.and_then(|prefix| match LogFileWriter::create(prefix) {
        Ok((writer, path)) => {
            eprintln!("logging to {}", path.display());
            Some(
                fmt::layer()
                    .with_writer(writer)
                    .event_format(EventFormatter::new(false))
                    .with_ansi(false),
            )
        }
        Err(e) => {
            eprintln!("failed to create log file: {}", e);
            None
        }
    });

    tracing_subscriber::registry()
        .with(env_filter)
        .with(stdout_layer)
        .with(file_layer)
        .init();
}
