//! Config file polling.
//!
//! Only `[connections]` is live: service definitions are read once at
//! startup, while edits to the connections table reach conf-based maps
//! through the shared `watch` channel.

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use anyhow::{Context, Result};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use waypoint_discovery::ServiceConnections;

use crate::config::CliConfig;

/// Re-reads the config file whenever its modification time changes.
pub struct ConfigReloader {
    path: PathBuf,
    modified: Option<SystemTime>,
    connections: watch::Sender<ServiceConnections>,
}

impl ConfigReloader {
    /// A reloader for `path` that considers the file's current contents
    /// already applied.
    pub async fn new(path: PathBuf, connections: watch::Sender<ServiceConnections>) -> Self {
        let modified = modified(&path).await.ok();
        Self {
            path,
            modified,
            connections,
        }
    }

    /// Check the file once. Returns `true` if new connections were published.
    pub async fn poll(&mut self) -> Result<bool> {
        let modified = modified(&self.path).await?;
        if self.modified == Some(modified) {
            return Ok(false);
        }
        self.modified = Some(modified);

        let content = tokio::fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("failed to read {}", self.path.display()))?;
        let config = CliConfig::from_toml(&content)
            .with_context(|| format!("failed to parse {}", self.path.display()))?;

        let changed = self.connections.send_if_modified(|current| {
            if *current == config.connections {
                return false;
            }
            *current = config.connections;
            true
        });

        if changed {
            info!(path = %self.path.display(), "service connections reloaded");
        } else {
            debug!(path = %self.path.display(), "config touched, connections unchanged");
        }
        Ok(changed)
    }

    /// Poll every `interval` until the task is aborted.
    ///
    /// A file that fails to read or parse keeps the last good connections.
    pub fn spawn(mut self, interval: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if let Err(e) = self.poll().await {
                    warn!(path = %self.path.display(), "config reload failed: {e:#}");
                }
            }
        })
    }
}

async fn modified(path: &Path) -> Result<SystemTime> {
    let metadata = tokio::fs::metadata(path)
        .await
        .with_context(|| format!("failed to stat {}", path.display()))?;
    Ok(metadata.modified()?)
}
