//! Shared test harness for Waypoint integration tests.
//!
//! Provides [`DiscoveredService`]: an [`EndpointMap`] fed by an in-process
//! channel source, so tests can script the exact sequence of snapshots a
//! discovery backend would deliver.

use std::collections::HashSet;
use std::time::Duration;

use waypoint_discovery::{DiscoveryError, SnapshotPublisher, channel};
use waypoint_endpoint::{EndpointError, EndpointMap};

/// `n` endpoint URLs sharing a host prefix, e.g. `http://a-0:3181`.
pub fn node_set(prefix: &str, n: usize) -> Vec<String> {
    (0..n).map(|i| format!("http://{prefix}-{i}:3181")).collect()
}

/// `n` distinct routing keys.
pub fn keys(n: usize) -> Vec<String> {
    (0..n).map(|i| format!("github.com/org/repo-{i}")).collect()
}

/// Fraction of positions where `before` and `after` differ.
pub fn changed_fraction(before: &[String], after: &[String]) -> f64 {
    assert_eq!(before.len(), after.len());
    let changed = before.iter().zip(after).filter(|(a, b)| a != b).count();
    changed as f64 / before.len() as f64
}

/// A discovery-backed map plus the handle that feeds it.
pub struct DiscoveredService {
    pub map: EndpointMap,
    publisher: SnapshotPublisher,
}

impl DiscoveredService {
    pub fn new(service: &str) -> Self {
        let (publisher, source) = channel(service);
        Self {
            map: EndpointMap::discover(format!("test+{service}"), source),
            publisher,
        }
    }

    /// Deliver a snapshot with `endpoints`.
    pub fn publish(&self, endpoints: &[String]) {
        self.publisher
            .publish(endpoints.to_vec())
            .expect("map stopped discovery");
    }

    /// Deliver a failed snapshot.
    pub fn fail(&self, reason: &str) -> DiscoveryError {
        let err = DiscoveryError::Watch(reason.to_string());
        self.publisher
            .publish_error(err.clone())
            .expect("map stopped discovery");
        err
    }

    /// Wait until the map reports exactly `expected` as its endpoints.
    pub async fn wait_for_endpoints(&self, expected: &[String]) {
        let expected: HashSet<&String> = expected.iter().collect();
        wait_for(Duration::from_secs(5), Duration::from_millis(5), || async {
            match self.map.endpoints().await {
                Ok(current) => current.iter().collect::<HashSet<_>>() == expected,
                Err(_) => false,
            }
        })
        .await;
    }

    /// Wait until the map fails queries with `expected`.
    pub async fn wait_for_error(&self, expected: &EndpointError) {
        wait_for(Duration::from_secs(5), Duration::from_millis(5), || async {
            self.map.endpoints().await.as_ref().err() == Some(expected)
        })
        .await;
    }
}

/// Wait for a condition to become true within a timeout.
pub async fn wait_for<F, Fut>(timeout: Duration, poll_interval: Duration, condition: F)
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if condition().await {
            return;
        }
        if tokio::time::Instant::now() >= deadline {
            panic!("condition not met within {timeout:?}");
        }
        tokio::time::sleep(poll_interval).await;
    }
}
