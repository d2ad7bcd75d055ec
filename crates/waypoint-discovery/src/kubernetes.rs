//! Kubernetes-backed discovery.
//!
//! The Kubernetes API client itself lives outside this crate and is plugged
//! in through [`EndpointWatcher`]. This module owns the `k8s+` specifier
//! format and turns raw pod hosts into the URLs callers asked for.
//!
//! Specifier format:
//!
//! ```text
//! k8s+{scheme}://{service}[.{namespace}][:{port}][/{path}][?kind={deploy|sts}]
//! ```
//!
//! Examples: `k8s+http://searcher`, `k8s+rpc://indexed-search?kind=sts`,
//! `k8s+http://symbols.prod:3184/api`.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::debug;

use crate::error::DiscoveryError;
use crate::source::{DiscoverySource, Snapshot, SnapshotSender};

/// Prefix that marks a specifier as Kubernetes-backed.
pub const K8S_PREFIX: &str = "k8s+";

/// Queue capacity between a watcher and its [`KubernetesSource`].
const WATCH_QUEUE_CAPACITY: usize = 16;

/// Workload type backing a service.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum WorkloadKind {
    /// Pods are interchangeable; hosts are used as reported.
    #[default]
    Deployment,
    /// Pods have stable DNS names under the governing service.
    StatefulSet,
}

/// What an [`EndpointWatcher`] should watch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchTarget {
    /// Service name.
    pub service: String,
    /// Namespace; `None` means the watcher's own namespace.
    pub namespace: Option<String>,
    /// Workload kind behind the service.
    pub kind: WorkloadKind,
}

/// A parsed `k8s+` specifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KubernetesSpec {
    /// URL scheme put in front of every discovered host.
    pub scheme: String,
    /// Service name.
    pub service: String,
    /// Optional namespace.
    pub namespace: Option<String>,
    /// Optional port appended to every host.
    pub port: Option<u16>,
    /// Path appended after the port, including the leading `/`.
    pub path: String,
    /// Workload kind, from the `kind` query parameter.
    pub kind: WorkloadKind,
}

impl KubernetesSpec {
    /// Parse a `k8s+` specifier.
    pub fn parse(spec: &str) -> Result<Self, DiscoveryError> {
        let invalid = |reason: &str| DiscoveryError::InvalidSpec {
            spec: spec.to_string(),
            reason: reason.to_string(),
        };

        let rest = spec
            .strip_prefix(K8S_PREFIX)
            .ok_or_else(|| invalid("missing k8s+ prefix"))?;
        let (scheme, rest) = rest
            .split_once("://")
            .ok_or_else(|| invalid("missing scheme"))?;
        if scheme.is_empty() {
            return Err(invalid("missing scheme"));
        }

        let (rest, query) = match rest.split_once('?') {
            Some((rest, query)) => (rest, Some(query)),
            None => (rest, None),
        };
        let (authority, path) = match rest.find('/') {
            Some(idx) => rest.split_at(idx),
            None => (rest, ""),
        };
        let (host, port) = match authority.split_once(':') {
            Some((host, port)) => {
                let port = port.parse::<u16>().map_err(|_| invalid("invalid port"))?;
                (host, Some(port))
            }
            None => (authority, None),
        };
        let (service, namespace) = match host.split_once('.') {
            Some((service, namespace)) => {
                if namespace.is_empty() || namespace.contains('.') {
                    return Err(invalid("invalid namespace"));
                }
                (service, Some(namespace.to_string()))
            }
            None => (host, None),
        };
        if service.is_empty() {
            return Err(invalid("missing service name"));
        }

        let mut kind = WorkloadKind::default();
        for pair in query.unwrap_or_default().split('&') {
            if let Some(("kind", value)) = pair.split_once('=') {
                kind = match value {
                    "deploy" | "deployment" => WorkloadKind::Deployment,
                    "sts" | "statefulset" => WorkloadKind::StatefulSet,
                    _ => return Err(invalid("unknown kind")),
                };
            }
        }

        Ok(Self {
            scheme: scheme.to_string(),
            service: service.to_string(),
            namespace,
            port,
            path: path.to_string(),
            kind,
        })
    }

    /// The watch this specifier asks for.
    pub fn target(&self) -> WatchTarget {
        WatchTarget {
            service: self.service.clone(),
            namespace: self.namespace.clone(),
            kind: self.kind,
        }
    }

    /// Build the URL callers receive for a discovered pod host.
    ///
    /// Stateful set pods are addressed through their stable DNS name
    /// `{host}.{service}`.
    pub fn endpoint_url(&self, host: &str) -> String {
        let mut url = format!("{}://{host}", self.scheme);
        if self.kind == WorkloadKind::StatefulSet {
            url.push('.');
            url.push_str(&self.service);
        }
        if let Some(port) = self.port {
            url.push(':');
            url.push_str(&port.to_string());
        }
        url.push_str(&self.path);
        url
    }
}

impl FromStr for KubernetesSpec {
    type Err = DiscoveryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for KubernetesSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{K8S_PREFIX}{}://{}", self.scheme, self.service)?;
        if let Some(ns) = &self.namespace {
            write!(f, ".{ns}")?;
        }
        if let Some(port) = self.port {
            write!(f, ":{port}")?;
        }
        f.write_str(&self.path)?;
        if self.kind == WorkloadKind::StatefulSet {
            f.write_str("?kind=sts")?;
        }
        Ok(())
    }
}

/// Watches a service's endpoint objects in a Kubernetes cluster.
///
/// Implementations report the full list of ready pod hosts (hostnames for
/// stateful sets, IPs otherwise) on every membership change, or an error
/// when the watch fails. They handle their own reconnects and should return
/// once `tx` is closed.
#[async_trait::async_trait]
pub trait EndpointWatcher: Send + Sync + 'static {
    /// Watch `target` until `tx` is closed.
    async fn watch(
        &self,
        target: WatchTarget,
        tx: mpsc::Sender<Result<Vec<String>, DiscoveryError>>,
    );
}

/// [`DiscoverySource`] over a Kubernetes service.
pub struct KubernetesSource {
    spec: KubernetesSpec,
    watcher: Arc<dyn EndpointWatcher>,
}

impl KubernetesSource {
    /// Create a source for `spec` backed by `watcher`.
    pub fn new(spec: KubernetesSpec, watcher: Arc<dyn EndpointWatcher>) -> Self {
        Self { spec, watcher }
    }

    /// The parsed specifier.
    pub fn spec(&self) -> &KubernetesSpec {
        &self.spec
    }

    fn snapshot(&self, update: Result<Vec<String>, DiscoveryError>) -> Snapshot {
        match update {
            Ok(hosts) => Snapshot::new(
                self.spec.service.clone(),
                hosts.iter().map(|h| self.spec.endpoint_url(h)).collect(),
            ),
            Err(e) => Snapshot::failed(self.spec.service.clone(), e),
        }
    }
}

impl fmt::Debug for KubernetesSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KubernetesSource")
            .field("spec", &self.spec)
            .finish_non_exhaustive()
    }
}

#[async_trait::async_trait]
impl DiscoverySource for KubernetesSource {
    fn service(&self) -> &str {
        &self.spec.service
    }

    async fn run(self: Box<Self>, tx: SnapshotSender) {
        let (hosts_tx, mut hosts_rx) = mpsc::channel(WATCH_QUEUE_CAPACITY);
        let watch = self.watcher.watch(self.spec.target(), hosts_tx);

        let this = &*self;
        let tx = &tx;
        let forward = async move {
            while let Some(update) = hosts_rx.recv().await {
                if tx.send(this.snapshot(update)).await.is_err() {
                    return;
                }
            }
        };

        // Dropping `hosts_rx` when forwarding stops tells the watcher to quit.
        tokio::join!(watch, forward);
        debug!(spec = %self.spec, "kubernetes watch ended");
    }
}
