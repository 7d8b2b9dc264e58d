//! Configuration file watcher for hot reload.
//!
//! The parent directory is watched rather than the file, so editors that
//! save by writing a temporary file and renaming it over the original are
//! still seen.

use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::mpsc;

use crate::config::loader::parse_config;
use crate::config::schema::RelayConfig;

/// Watches one configuration file and emits every valid new version.
pub struct ConfigWatcher {
    path: PathBuf,
    update_tx: mpsc::UnboundedSender<RelayConfig>,
}

/// True if `event` changed the file at `path`.
fn touches(event: &Event, path: &Path) -> bool {
    let relevant_kind = matches!(
        event.kind,
        EventKind::Modify(_) | EventKind::Create(_)
    );
    let file_name = path.file_name();
    relevant_kind
        && event
            .paths
            .iter()
            .any(|p| p == path || (file_name.is_some() && p.file_name() == file_name))
}

impl ConfigWatcher {
    /// Returns the watcher and a receiver for validated configuration updates.
    pub fn new(path: &Path) -> (Self, mpsc::UnboundedReceiver<RelayConfig>) {
        let (update_tx, update_rx) = mpsc::unbounded_channel();
        let watcher = Self {
            path: path.to_path_buf(),
            update_tx,
        };
        (watcher, update_rx)
    }

    /// Start watching. The returned handle must be kept alive.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let Self { path, update_tx } = self;
        let dir = match path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
            _ => PathBuf::from("."),
        };

        // One save usually fires several events; identical contents are applied once.
        let last_applied = Mutex::new(std::fs::read_to_string(&path).ok());
        let file = path.clone();

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| {
                let event = match res {
                    Ok(event) => event,
                    Err(e) => {
                        tracing::error!(error = %e, "Config watch error");
                        return;
                    }
                };
                if !touches(&event, &file) {
                    return;
                }

                let contents = match std::fs::read_to_string(&file) {
                    Ok(contents) => contents,
                    Err(e) => {
                        tracing::debug!(error = %e, "Config file not readable yet");
                        return;
                    }
                };
                let mut last = last_applied
                    .lock()
                    .unwrap_or_else(std::sync::PoisonError::into_inner);
                if last.as_deref() == Some(contents.as_str()) {
                    return;
                }

                tracing::info!(path = ?file, "Config file change detected, reloading");
                match parse_config(&contents) {
                    Ok(config) => {
                        *last = Some(contents);
                        let _ = update_tx.send(config);
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "Invalid configuration, keeping current");
                    }
                }
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;

        watcher.watch(&dir, RecursiveMode::NonRecursive)?;

        tracing::info!(path = ?path, "Config watcher started");
        Ok(watcher)
    }
}
