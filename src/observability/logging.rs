//! Structured logging.
//!
//! # Responsibilities
//! - Initialize the tracing subscriber
//! - Configure log level from config, overridable by `RUST_LOG`
//! - Write to stdout, or append to a file under the log directory
//!
//! # Design Decisions
//! - JSON format for production, pretty format for development

use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::Path;
use std::sync::Mutex;
use tracing_subscriber::{
    fmt::writer::BoxMakeWriter, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter,
};

use crate::config::{LogFormat, ObservabilityConfig};

/// File name used inside the log directory.
pub const LOG_FILE_NAME: &str = "tsdb-relay.log";

/// Open the log file under `dir` for appending, creating both if missing.
pub fn open_log_file(dir: &Path) -> io::Result<File> {
    fs::create_dir_all(dir)?;
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(dir.join(LOG_FILE_NAME))
}

/// Install the global subscriber. Call once, before anything logs.
pub fn init(config: &ObservabilityConfig, verbose: bool) -> io::Result<()> {
    let default_directive = if verbose {
        format!("tsdb_relay={},tower_http=debug", config.log_level)
    } else {
        format!("tsdb_relay={}", config.log_level)
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));

    // No colour codes in files.
    let (writer, ansi) = match &config.log_dir {
        Some(dir) => (BoxMakeWriter::new(Mutex::new(open_log_file(dir)?)), false),
        None => (BoxMakeWriter::new(io::stdout), true),
    };

    let registry = tracing_subscriber::registry().with(filter);
    match config.log_format {
        LogFormat::Json => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_current_span(false)
                    .with_writer(writer),
            )
            .init(),
        LogFormat::Pretty => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_ansi(ansi)
                    .with_writer(writer),
            )
            .init(),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_log_file_is_created_and_appended() {
        let root = tempfile::tempdir().unwrap();
        let dir = root.path().join("logs").join("relay");

        writeln!(open_log_file(&dir).unwrap(), "first").unwrap();
        writeln!(open_log_file(&dir).unwrap(), "second").unwrap();

        let contents = fs::read_to_string(dir.join(LOG_FILE_NAME)).unwrap();
        assert_eq!(contents, "first\nsecond\n");
    }
}
