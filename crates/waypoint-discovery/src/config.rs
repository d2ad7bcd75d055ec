//! Discovery driven by shared service-connection configuration.
//!
//! The process keeps one [`ServiceConnections`] value in a tokio `watch`
//! channel. A [`ConfigSource`] projects it into an endpoint list once at
//! start and again every time the value changes.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::debug;

use crate::source::{DiscoverySource, Snapshot, SnapshotSender};

/// Service name reported by configuration sources that were not given one.
pub const CONF_BASED: &str = "conf-based";

/// Addresses of every service the process talks to, keyed by service name.
///
/// Deserializes from a plain table, e.g.
///
/// ```toml
/// gitserver = ["gitserver-0:3178", "gitserver-1:3178"]
/// searcher = ["http://searcher-0:3181"]
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ServiceConnections(BTreeMap<String, Vec<String>>);

impl ServiceConnections {
    /// Create an empty set of connections.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, service: impl Into<String>, endpoints: Vec<String>) -> Self {
        self.insert(service, endpoints);
        self
    }

    /// Set the endpoints of `service`, replacing any previous value.
    pub fn insert(&mut self, service: impl Into<String>, endpoints: Vec<String>) {
        self.0.insert(service.into(), endpoints);
    }

    /// Endpoints configured for `service`; empty if it is not configured.
    pub fn endpoints(&self, service: &str) -> &[String] {
        self.0.get(service).map(Vec::as_slice).unwrap_or_default()
    }

    /// Names of all configured services.
    pub fn services(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }
}

/// Caller-supplied projection from configuration to an endpoint list.
pub type Projection = Arc<dyn Fn(&ServiceConnections) -> Vec<String> + Send + Sync>;

/// Re-derives a snapshot from [`ServiceConnections`] on every change.
pub struct ConfigSource {
    service: String,
    rx: watch::Receiver<ServiceConnections>,
    projection: Projection,
}

impl ConfigSource {
    /// Watch `rx`, reporting snapshots as [`CONF_BASED`].
    pub fn new<F>(rx: watch::Receiver<ServiceConnections>, projection: F) -> Self
    where
        F: Fn(&ServiceConnections) -> Vec<String> + Send + Sync + 'static,
    {
        Self::named(CONF_BASED, rx, projection)
    }

    /// Watch `rx`, reporting snapshots under `service`.
    pub fn named<F>(
        service: impl Into<String>,
        rx: watch::Receiver<ServiceConnections>,
        projection: F,
    ) -> Self
    where
        F: Fn(&ServiceConnections) -> Vec<String> + Send + Sync + 'static,
    {
        Self {
            service: service.into(),
            rx,
            projection: Arc::new(projection),
        }
    }
}

impl fmt::Debug for ConfigSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfigSource")
            .field("service", &self.service)
            .finish_non_exhaustive()
    }
}

#[async_trait::async_trait]
impl DiscoverySource for ConfigSource {
    fn service(&self) -> &str {
        &self.service
    }

    async fn run(self: Box<Self>, tx: SnapshotSender) {
        let mut this = *self;
        loop {
            let endpoints = {
                let connections = this.rx.borrow_and_update();
                (this.projection)(&connections)
            };

            if tx
                .send(Snapshot::new(this.service.clone(), endpoints))
                .await
                .is_err()
            {
                return;
            }

            if this.rx.changed().await.is_err() {
                debug!(service = %this.service, "configuration sender dropped");
                return;
            }
        }
    }
}
