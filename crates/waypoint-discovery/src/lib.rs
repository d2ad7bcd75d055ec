//! Push-based endpoint discovery.
//!
//! This crate provides:
//!
//! - [`DiscoverySource`]: the contract every source implements: push
//!   complete [`Snapshot`]s of a service's endpoints, in order, forever.
//! - [`channel`]: a source fed by hand through a [`SnapshotPublisher`].
//! - [`ConfigSource`]: re-derives endpoints from shared
//!   [`ServiceConnections`] whenever they change.
//! - [`KubernetesSource`]: maps a `k8s+` specifier onto an external
//!   [`EndpointWatcher`].

mod channel;
mod config;
mod error;
pub mod kubernetes;
mod source;

pub use channel::{ChannelSource, SnapshotPublisher, channel};
pub use config::{CONF_BASED, ConfigSource, Projection, ServiceConnections};
pub use error::DiscoveryError;
pub use kubernetes::{
    EndpointWatcher, K8S_PREFIX, KubernetesSource, KubernetesSpec, WatchTarget, WorkloadKind,
};
pub use source::{DiscoverySource, SNAPSHOT_QUEUE_CAPACITY, Snapshot, SnapshotSender, queue};
