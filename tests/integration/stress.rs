//! Integration test: stress.
//!
//! One task swaps a map between two node sets while 50 tasks query it.
//! Every response must be consistent with exactly one of the sets.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::Barrier;
use waypoint_integration_tests::{DiscoveredService, keys, node_set};

/// Which node set a batch of endpoints came from.
fn classify(endpoints: &[String], a: &HashSet<String>, b: &HashSet<String>) -> char {
    if endpoints.iter().all(|e| a.contains(e)) {
        'a'
    } else if endpoints.iter().all(|e| b.contains(e)) {
        'b'
    } else {
        panic!("response mixes node sets: {endpoints:?}");
    }
}

/// 1 swapper + 50 readers running `get`, `get_n`, `get_many` and `ring`.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_swaps_under_concurrent_queries() {
    let svc = Arc::new(DiscoveredService::new("searcher"));
    let set_a = node_set("a", 5);
    let set_b = node_set("b", 7);
    let a: Arc<HashSet<String>> = Arc::new(set_a.iter().cloned().collect());
    let b: Arc<HashSet<String>> = Arc::new(set_b.iter().cloned().collect());

    svc.publish(&set_a);
    svc.wait_for_endpoints(&set_a).await;

    let done = Arc::new(AtomicBool::new(false));
    let barrier = Arc::new(Barrier::new(51));

    let swapper = {
        let svc = svc.clone();
        let barrier = barrier.clone();
        let done = done.clone();
        let (set_a, set_b) = (set_a.clone(), set_b.clone());
        tokio::spawn(async move {
            barrier.wait().await;
            for round in 0..200 {
                let next = if round % 2 == 0 { &set_b } else { &set_a };
                svc.publish(next);
                tokio::task::yield_now().await;
            }
            done.store(true, Ordering::Release);
        })
    };

    let mut readers = Vec::new();
    for reader in 0..50 {
        let svc = svc.clone();
        let barrier = barrier.clone();
        let done = done.clone();
        let (a, b) = (a.clone(), b.clone());
        readers.push(tokio::spawn(async move {
            barrier.wait().await;
            let keys = keys(32);
            let mut queries = 0usize;
            // Keep querying until the swapper is done, and at least 20 rounds.
            while queries < 20 || !done.load(Ordering::Acquire) {
                let key = &keys[queries % keys.len()];
                match reader % 4 {
                    0 => {
                        let endpoint = svc.map.get(key).await.unwrap();
                        classify(std::slice::from_ref(&endpoint), &a, &b);
                    }
                    1 => {
                        let ranked = svc.map.get_n(key, 4).await.unwrap();
                        assert_eq!(ranked.len(), 4);
                        classify(&ranked, &a, &b);
                    }
                    2 => {
                        let batch = svc.map.get_many(&keys).await.unwrap();
                        classify(&batch, &a, &b);
                    }
                    _ => {
                        let ring = svc.map.ring().await.unwrap();
                        let routed: Vec<String> = keys
                            .iter()
                            .filter_map(|k| ring.lookup(k).map(str::to_string))
                            .collect();
                        assert_eq!(routed.len(), keys.len());
                        let set = classify(&routed, &a, &b);
                        let expected = if set == 'a' { 5 } else { 7 };
                        assert_eq!(ring.len(), expected);
                    }
                }
                queries += 1;
                tokio::task::yield_now().await;
            }
            queries
        }));
    }

    swapper.await.unwrap();
    let mut total = 0;
    for reader in readers {
        total += reader.await.unwrap();
    }
    assert!(total >= 50 * 20);

    // The swapper ends on set A.
    svc.wait_for_endpoints(&set_a).await;
}

/// Many tasks racing on the first query see one consistent ring.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_first_queries_agree() {
    let svc = Arc::new(DiscoveredService::new("gitserver"));
    let set = node_set("g", 9);
    svc.publish(&set);

    let keys = Arc::new(keys(100));
    let barrier = Arc::new(Barrier::new(50));
    let mut handles = Vec::new();
    for _ in 0..50 {
        let svc = svc.clone();
        let keys = keys.clone();
        let barrier = barrier.clone();
        handles.push(tokio::spawn(async move {
            barrier.wait().await;
            svc.map.get_many(keys.as_slice()).await.unwrap()
        }));
    }

    let mut answers = Vec::new();
    for h in handles {
        answers.push(h.await.unwrap());
    }
    assert!(answers.windows(2).all(|w| w[0] == w[1]));
}
