//! Discovery source fed by hand.
//!
//! [`channel`] splits into a [`SnapshotPublisher`] that anyone can push
//! snapshots through and a [`ChannelSource`] that forwards them verbatim to
//! the map it is attached to. Useful for embedders running their own watch
//! loop and for tests.

use tokio::sync::mpsc;
use tracing::debug;

use crate::error::DiscoveryError;
use crate::source::{DiscoverySource, Snapshot, SnapshotSender};

/// Create a publisher/source pair for `service`.
pub fn channel(service: impl Into<String>) -> (SnapshotPublisher, ChannelSource) {
    let service = service.into();
    let (tx, rx) = mpsc::unbounded_channel();
    (
        SnapshotPublisher {
            service: service.clone(),
            tx,
        },
        ChannelSource { service, rx },
    )
}

/// Sending half of [`channel`].
#[derive(Debug, Clone)]
pub struct SnapshotPublisher {
    service: String,
    tx: mpsc::UnboundedSender<Snapshot>,
}

impl SnapshotPublisher {
    /// Publish a full endpoint set.
    pub fn publish(&self, endpoints: Vec<String>) -> Result<(), DiscoveryError> {
        self.publish_snapshot(Snapshot::new(self.service.clone(), endpoints))
    }

    /// Publish a discovery failure.
    pub fn publish_error(&self, error: DiscoveryError) -> Result<(), DiscoveryError> {
        self.publish_snapshot(Snapshot::failed(self.service.clone(), error))
    }

    /// Publish an arbitrary snapshot.
    pub fn publish_snapshot(&self, snapshot: Snapshot) -> Result<(), DiscoveryError> {
        self.tx.send(snapshot).map_err(|_| DiscoveryError::Closed)
    }
}

/// Receiving half of [`channel`].
#[derive(Debug)]
pub struct ChannelSource {
    service: String,
    rx: mpsc::UnboundedReceiver<Snapshot>,
}

#[async_trait::async_trait]
impl DiscoverySource for ChannelSource {
    fn service(&self) -> &str {
        &self.service
    }

    async fn run(self: Box<Self>, tx: SnapshotSender) {
        let mut this = *self;
        while let Some(snapshot) = this.rx.recv().await {
            if tx.send(snapshot).await.is_err() {
                return;
            }
        }
        debug!(service = %this.service, "all publishers dropped");
    }
}
