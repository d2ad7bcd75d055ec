//! The discovery source contract: snapshots and the queue they travel on.

use tokio::sync::mpsc;

use crate::error::DiscoveryError;

/// Capacity of the queue between a source and the map consuming it.
pub const SNAPSHOT_QUEUE_CAPACITY: usize = 16;

/// A complete report of a service's endpoint set, or an error.
///
/// Sources never emit partial lists: every snapshot replaces the previous
/// one wholesale. When `error` is set it wins over `endpoints`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    /// Name of the service this snapshot describes.
    pub service: String,
    /// Every address currently registered for the service.
    pub endpoints: Vec<String>,
    /// Set when the source could not determine the endpoint set.
    pub error: Option<DiscoveryError>,
}

impl Snapshot {
    /// A successful snapshot.
    pub fn new(service: impl Into<String>, endpoints: Vec<String>) -> Self {
        Self {
            service: service.into(),
            endpoints,
            error: None,
        }
    }

    /// A snapshot reporting a failure.
    pub fn failed(service: impl Into<String>, error: DiscoveryError) -> Self {
        Self {
            service: service.into(),
            endpoints: Vec::new(),
            error: Some(error),
        }
    }
}

/// Producer half of the single-consumer snapshot queue.
#[derive(Debug, Clone)]
pub struct SnapshotSender {
    tx: mpsc::Sender<Snapshot>,
}

impl SnapshotSender {
    /// Deliver a snapshot, waiting for queue space.
    ///
    /// Fails with [`DiscoveryError::Closed`] once the consumer is gone; a
    /// source should return from [`DiscoverySource::run`] when that happens.
    pub async fn send(&self, snapshot: Snapshot) -> Result<(), DiscoveryError> {
        self.tx
            .send(snapshot)
            .await
            .map_err(|_| DiscoveryError::Closed)
    }

    /// Whether the consumer has gone away.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Create a snapshot queue.
pub fn queue() -> (SnapshotSender, mpsc::Receiver<Snapshot>) {
    let (tx, rx) = mpsc::channel(SNAPSHOT_QUEUE_CAPACITY);
    (SnapshotSender { tx }, rx)
}

/// Asynchronous producer of [`Snapshot`]s for one named service.
///
/// `run` is spawned once per subscription and is expected to keep pushing
/// snapshots for as long as the consumer exists, in the order membership
/// changed. Reconnection and backoff are the source's own business; the
/// consumer mirrors whatever it is told, errors included.
#[async_trait::async_trait]
pub trait DiscoverySource: Send + 'static {
    /// Name of the service being watched.
    fn service(&self) -> &str;

    /// Push snapshots into `tx` until the consumer goes away.
    async fn run(self: Box<Self>, tx: SnapshotSender);
}
