//! Integration test: replica-count maps and specifier dispatch.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use waypoint_discovery::{DiscoveryError, EndpointWatcher, WatchTarget, WorkloadKind};
use waypoint_endpoint::{EndpointError, EndpointMap, MapFactory};
use waypoint_integration_tests::keys;

#[tokio::test]
async fn test_docker_compose_replicas() {
    let map = EndpointMap::replicas("docker-compose", "svc", "3", "6070", "http");
    assert_eq!(
        map.endpoints().await.unwrap(),
        vec!["httpsvc-0:6070", "httpsvc-1:6070", "httpsvc-2:6070"]
    );
}

#[tokio::test]
async fn test_kubernetes_replicas_route_like_static() {
    let replicas = EndpointMap::replicas("kubernetes", "indexed-search", "4", "6070", "http://");
    let static_map = EndpointMap::new(
        "http://indexed-search-0.indexed-search:6070 \
         http://indexed-search-1.indexed-search:6070 \
         http://indexed-search-2.indexed-search:6070 \
         http://indexed-search-3.indexed-search:6070",
    );

    let keys = keys(300);
    assert_eq!(
        replicas.get_many(&keys).await.unwrap(),
        static_map.get_many(&keys).await.unwrap()
    );
}

#[tokio::test]
async fn test_invalid_replicas_fail_every_query() {
    for bad in ["0", "abc", "-2"] {
        let map = EndpointMap::replicas("docker-compose", "svc", bad, "6070", "");
        let expected = EndpointError::InvalidReplicas {
            service: "svc".into(),
        };
        assert_eq!(map.get("k").await, Err(expected.clone()));
        assert_eq!(map.get_n("k", 2).await, Err(expected.clone()));
        assert_eq!(map.get_many(&["k"]).await, Err(expected.clone()));
        assert_eq!(map.endpoints().await, Err(expected));
    }
}

#[tokio::test]
async fn test_unrecognized_mode() {
    let map = EndpointMap::replicas("swarm", "svc", "2", "6070", "");
    assert_eq!(
        map.get("k").await.unwrap_err().to_string(),
        "unrecognized url value to enable replica endpoints swarm"
    );
}

#[tokio::test]
async fn test_not_configured() {
    let map = EndpointMap::replicas("", "symbols", "", "", "");
    assert_eq!(
        map.get("k").await.unwrap_err().to_string(),
        "symbols service has not been configured"
    );
}

/// Reports a fixed host list for every target, recording what it was asked.
struct RecordingWatcher {
    hosts: Vec<String>,
    targets: mpsc::UnboundedSender<WatchTarget>,
}

#[async_trait]
impl EndpointWatcher for RecordingWatcher {
    async fn watch(
        &self,
        target: WatchTarget,
        tx: mpsc::Sender<Result<Vec<String>, DiscoveryError>>,
    ) {
        let _ = self.targets.send(target);
        if tx.send(Ok(self.hosts.clone())).await.is_ok() {
            tx.closed().await;
        }
    }
}

#[tokio::test]
async fn test_kubernetes_specifier_through_factory() {
    let (targets_tx, mut targets_rx) = mpsc::unbounded_channel();
    let factory = MapFactory::new().with_kubernetes(Arc::new(RecordingWatcher {
        hosts: vec!["indexed-search-0".into(), "indexed-search-1".into()],
        targets: targets_tx,
    }));

    let map = factory.from_spec("k8s+rpc://indexed-search.prod:6070?kind=sts");
    assert_eq!(
        map.endpoints().await.unwrap(),
        vec![
            "rpc://indexed-search-0.indexed-search:6070",
            "rpc://indexed-search-1.indexed-search:6070",
        ]
    );

    let target = targets_rx.recv().await.unwrap();
    assert_eq!(target.service, "indexed-search");
    assert_eq!(target.namespace.as_deref(), Some("prod"));
    assert_eq!(target.kind, WorkloadKind::StatefulSet);
}

#[tokio::test]
async fn test_kubernetes_specifier_without_watcher() {
    let map = EndpointMap::new("k8s+http://searcher");
    assert_eq!(
        map.get("k").await,
        Err(EndpointError::KubernetesUnavailable {
            spec: "k8s+http://searcher".into()
        })
    );
}
