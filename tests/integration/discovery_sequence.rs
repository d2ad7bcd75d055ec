//! Integration test: discovery sequences.
//!
//! Snapshots delivered to a map are observed in order, and a query never
//! sees a mix of two node sets.

use std::sync::Arc;
use std::time::Duration;

use waypoint_endpoint::EndpointError;
use waypoint_integration_tests::{DiscoveredService, keys, node_set};

/// What a query observed at one point in time.
#[derive(Debug, PartialEq)]
enum Observed {
    A,
    Failed,
    C,
}

/// A(3 nodes) → B(error) → C(3 other nodes): each state is observed in
/// order, and routing under A and C uses only that state's nodes.
#[tokio::test]
async fn test_sequence_observed_in_order() {
    let svc = Arc::new(DiscoveredService::new("searcher"));
    let a = node_set("a", 3);
    let c = node_set("c", 3);

    svc.publish(&a);
    svc.wait_for_endpoints(&a).await;

    // Observer records every state change it sees, until it reaches C.
    let observer = {
        let svc = svc.clone();
        let (a, c) = (a.clone(), c.clone());
        tokio::spawn(async move {
            let keys = keys(20);
            let mut seen: Vec<Observed> = Vec::new();
            loop {
                let observed = match svc.map.get_many(&keys).await {
                    Ok(routed) if routed.iter().all(|e| a.contains(e)) => Observed::A,
                    Ok(routed) if routed.iter().all(|e| c.contains(e)) => Observed::C,
                    Ok(routed) => panic!("mixed node sets: {routed:?}"),
                    Err(_) => Observed::Failed,
                };
                if seen.last() != Some(&observed) {
                    seen.push(observed);
                }
                if seen.last() == Some(&Observed::C) {
                    return seen;
                }
                tokio::task::yield_now().await;
            }
        })
    };

    let failure = svc.fail("api server unreachable");
    svc.wait_for_error(&EndpointError::Discovery(failure)).await;

    svc.publish(&c);
    svc.wait_for_endpoints(&c).await;

    let seen = tokio::time::timeout(Duration::from_secs(5), observer)
        .await
        .expect("observer never saw the final set")
        .unwrap();

    // Every observation is a subsequence of A → Failed → C.
    let order = [Observed::A, Observed::Failed, Observed::C];
    let mut position = 0;
    for state in &seen {
        let at = order[position..]
            .iter()
            .position(|o| o == state)
            .map(|p| p + position);
        position = at.unwrap_or_else(|| panic!("out of order: {seen:?}"));
    }
    assert_eq!(seen.first(), Some(&Observed::A));
    assert_eq!(seen.last(), Some(&Observed::C));
}

/// An error snapshot hides the old ring; recovery does not revert to it.
#[tokio::test]
async fn test_error_then_recovery_uses_new_set() {
    let svc = DiscoveredService::new("gitserver");
    let a = node_set("a", 4);
    let c = node_set("c", 2);

    svc.publish(&a);
    svc.wait_for_endpoints(&a).await;

    let failure = svc.fail("watch expired");
    let expected = EndpointError::Discovery(failure);
    svc.wait_for_error(&expected).await;
    assert_eq!(svc.map.get("repo").await, Err(expected.clone()));
    assert_eq!(svc.map.get_n("repo", 2).await, Err(expected.clone()));
    assert_eq!(svc.map.get_many(&["x", "y"]).await, Err(expected));

    svc.publish(&c);
    svc.wait_for_endpoints(&c).await;
    for key in keys(50) {
        let endpoint = svc.map.get(&key).await.unwrap();
        assert!(c.contains(&endpoint), "{endpoint} not in new set");
    }
}

/// An empty snapshot makes queries fail; the next non-empty one restores them.
#[tokio::test]
async fn test_empty_snapshot_then_recovery() {
    let svc = DiscoveredService::new("symbols");
    let a = node_set("a", 2);

    svc.publish(&a);
    svc.wait_for_endpoints(&a).await;

    svc.publish(&[]);
    svc.wait_for_error(&EndpointError::NoEndpoints {
        service: "symbols".into(),
    })
    .await;

    svc.publish(&a);
    svc.wait_for_endpoints(&a).await;
}

/// Routing is identical across rebuilds of the same node set.
#[tokio::test]
async fn test_routing_stable_across_rebuilds() {
    let svc = DiscoveredService::new("searcher");
    let a = node_set("a", 5);
    let keys = keys(200);

    svc.publish(&a);
    svc.wait_for_endpoints(&a).await;
    let before = svc.map.get_many(&keys).await.unwrap();

    // Same set, different order, with an outage in between.
    let failure = svc.fail("blip");
    svc.wait_for_error(&EndpointError::Discovery(failure)).await;
    let mut reversed = a.clone();
    reversed.reverse();
    svc.publish(&reversed);
    svc.wait_for_endpoints(&a).await;

    assert_eq!(svc.map.get_many(&keys).await.unwrap(), before);
}
