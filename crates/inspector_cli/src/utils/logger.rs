use std::fs::OpenOptions;
use std::sync::Arc;

use inspector_config::logger::{LogLevel, LoggerConfig, LoggerFormat};
use tracing_subscriber::{EnvFilter, fmt::writer::BoxMakeWriter};

const WHITELISTED_CRATES: &[&str] = &["inspector_cli", "inspector_bridge", "inspector_config"];

pub(crate) fn default_env_filter(level: LogLevel) -> String {
    let mut filters: Vec<String> = WHITELISTED_CRATES
        .iter()
        .map(|crate_name| format!("{crate_name}={}", level.as_str()))
        .collect();

    // Everything else only reports problems
    filters.insert(0, "warn".to_string());

    filters.join(",")
}

/// Effective level after applying `-q` / `-v` on top of the configured one.
pub(crate) fn effective_level(cfg: &LoggerConfig, quiet: bool, verbose: u8) -> LogLevel {
    if quiet {
        LogLevel::Error
    } else {
        cfg.level.shifted(i8::try_from(verbose).unwrap_or(i8::MAX))
    }
}

pub(crate) fn init_logger(cfg: &LoggerConfig, quiet: bool, verbose: u8) {
    if !cfg.enabled && verbose == 0 {
        return;
    }

    let level = effective_level(cfg, quiet, verbose);
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_env_filter(level)));

    let writer = match &cfg.file {
        Some(path) => match OpenOptions::new().create(true).append(true).open(path) {
            Ok(file) => BoxMakeWriter::new(Arc::new(file)),
            Err(e) => {
                eprintln!("inspector-bridge: Failed opening log file {path}: {e}");
                BoxMakeWriter::new(std::io::stderr)
            }
        },
        None => BoxMakeWriter::new(std::io::stderr),
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(cfg.colors && cfg.file.is_none());

    let result = match cfg.format {
        LoggerFormat::Compact => builder.compact().try_init(),
        LoggerFormat::Pretty => builder.pretty().try_init(),
        LoggerFormat::Json => builder.json().try_init(),
    };

    if let Err(e) = result {
        eprintln!("inspector-bridge: Failed initializing logger: {e}");
    }
}
