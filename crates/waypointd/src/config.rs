//! TOML configuration for the Waypoint daemon.
//!
//! ```toml
//! [log]
//! level = "info"
//!
//! [watch]
//! poll_interval_ms = 1000
//!
//! [services.searcher]
//! url = "http://searcher-0:3181 http://searcher-1:3181"
//!
//! [services.indexed-search]
//! url = "docker-compose"
//! replicas = 3
//! port = "6070"
//! protocol = "http://"
//!
//! [services.gitserver]
//! url = "conf-based"
//!
//! [connections]
//! gitserver = ["gitserver-0:3178", "gitserver-1:3178"]
//! ```

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Deserializer};
use waypoint_discovery::{CONF_BASED, ServiceConnections};

/// Top-level configuration, parsed from TOML.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    /// Logging configuration.
    pub log: LogSection,
    /// Config file watching.
    pub watch: WatchSection,
    /// Endpoint maps, keyed by service name.
    pub services: BTreeMap<String, ServiceSection>,
    /// Shared service connections feeding `conf-based` services.
    pub connections: ServiceConnections,
}

/// `[services.<name>]` section.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ServiceSection {
    /// URL specifier, deployment mode (with `replicas`), or `"conf-based"`.
    pub url: String,
    /// Replica count. Accepts a number or a string.
    #[serde(deserialize_with = "replica_count")]
    pub replicas: String,
    /// Port used when generating replica endpoints.
    pub port: String,
    /// Prefix put in front of generated replica endpoints.
    pub protocol: String,
}

impl ServiceSection {
    /// Whether this service takes its endpoints from `[connections]`.
    pub fn is_conf_based(&self) -> bool {
        self.url == CONF_BASED && self.replicas.is_empty()
    }
}

/// `[watch]` section.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct WatchSection {
    /// How often to check the config file for changes.
    pub poll_interval_ms: u64,
}

impl Default for WatchSection {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1000,
        }
    }
}

/// `[log]` section.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct LogSection {
    /// Log level filter (e.g. `"info"`, `"debug"`, `"warn"`).
    pub level: String,
}

impl Default for LogSection {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
        }
    }
}

impl CliConfig {
    /// Load config from a TOML file, or use defaults if no path given.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        match path {
            Some(p) => {
                let content = std::fs::read_to_string(p)?;
                Self::from_toml(&content)
            }
            None => Ok(Self::default()),
        }
    }

    /// Parse config from a TOML string.
    pub fn from_toml(s: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(s)?)
    }

    /// Effective config poll interval.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.watch.poll_interval_ms.max(10))
    }
}

/// Accept `replicas = 3` as well as `replicas = "3"`.
fn replica_count<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Count {
        Number(i64),
        Text(String),
    }

    Ok(match Count::deserialize(deserializer)? {
        Count::Number(n) => n.to_string(),
        Count::Text(s) => s,
    })
}
