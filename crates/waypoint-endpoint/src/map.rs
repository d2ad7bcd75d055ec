//! Consistent hash map over a service's endpoints.
//!
//! An [`EndpointMap`] is either fixed at construction (static or
//! permanently failed) or kept current by a [`DiscoverySource`]. For
//! discovery-backed maps the first query starts a background task that
//! applies every snapshot to the shared `{ring, error}` state; the first
//! query waits for that task to process one snapshot, later queries never
//! wait for discovery.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{OnceCell, RwLock, RwLockReadGuard, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use waypoint_discovery::{ConfigSource, DiscoverySource, ServiceConnections, Snapshot, queue};
use waypoint_ring::HashRing;

use crate::error::EndpointError;
use crate::factory::MapFactory;
use crate::observability::record_endpoint_count;

/// Service name reported when a static map has no endpoints.
const STATIC_SERVICE: &str = "static";

/// Ring and error, always updated together.
#[derive(Debug, Default)]
struct RingState {
    /// Last ring built from a non-empty snapshot. Kept (but unreachable)
    /// while `error` is set.
    ring: Option<Arc<HashRing>>,
    /// Sticky error; wins over `ring` until a good snapshot clears it.
    error: Option<EndpointError>,
}

impl RingState {
    fn current(&self, urlspec: &str) -> Result<&Arc<HashRing>, EndpointError> {
        if let Some(err) = &self.error {
            return Err(err.clone());
        }
        // Only reachable if the synchronizer died before its first snapshot.
        self.ring.as_ref().ok_or_else(|| EndpointError::DiscoveryEnded {
            urlspec: urlspec.to_string(),
        })
    }
}

/// A discovery source waiting for the first query to start it.
struct Pending {
    source: Box<dyn DiscoverySource>,
    ready: watch::Sender<bool>,
}

/// Consistent hash map from keys to service endpoints.
///
/// Cheap to query from many tasks at once: every query takes a read lock on
/// the current ring. Only the map's own background task ever writes.
pub struct EndpointMap {
    /// Human-readable description, used in `Display` and logs.
    urlspec: String,
    state: Arc<RwLock<RingState>>,
    /// Guards the one-time start of discovery.
    started: OnceCell<()>,
    /// Discovery source not yet started. `None` for static and empty maps.
    pending: Mutex<Option<Pending>>,
    /// Flips to `true` once the first snapshot has been applied. `None`
    /// for maps that never run discovery.
    ready: Option<watch::Receiver<bool>>,
    /// Background tasks owned by this map, aborted on drop.
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl EndpointMap {
    /// Create a map for a URL specifier.
    ///
    /// A specifier starting with `k8s+` selects Kubernetes discovery (see
    /// [`waypoint_discovery::kubernetes`]); without a configured watcher
    /// this yields a map that fails every query. Anything else is a
    /// whitespace-separated list of static URLs:
    ///
    /// ```text
    /// "k8s+http://searcher"
    /// "k8s+rpc://indexed-search?kind=sts"
    /// "http://searcher-0 http://searcher-1 http://searcher-2"
    /// ```
    ///
    /// Use [`MapFactory`] to plug in a Kubernetes watcher.
    pub fn new(urlspec: &str) -> Self {
        MapFactory::new().from_spec(urlspec)
    }

    /// Create a map from a replica count; see [`MapFactory::replicas`].
    pub fn replicas(
        urlspec: &str,
        service: &str,
        replicas: &str,
        port: &str,
        protocol: &str,
    ) -> Self {
        MapFactory::new().replicas(urlspec, service, replicas, port, protocol)
    }

    /// A map that consistently hashes over a fixed set of endpoints.
    ///
    /// Endpoints can be arbitrary strings. A static map never returns an
    /// error unless it was given no endpoints at all; then `get` and
    /// `get_many` fail with [`EndpointError::NoEndpoints`] for the
    /// `"static"` service instead of returning an empty endpoint.
    pub fn from_static<I, S>(endpoints: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let ring = HashRing::new(endpoints);
        let urlspec = format!("[{}]", ring.nodes().join(" "));
        Self::settled(
            urlspec,
            RingState {
                ring: Some(Arc::new(ring)),
                error: None,
            },
        )
    }

    /// A map that fails every query with `err`.
    pub fn empty(err: EndpointError) -> Self {
        Self::settled(
            format!("error: {err}"),
            RingState {
                ring: None,
                error: Some(err),
            },
        )
    }

    /// A map kept current by `source`.
    ///
    /// Nothing happens until the first query, which starts the source and
    /// waits for its first snapshot.
    pub fn discover(urlspec: impl Into<String>, source: impl DiscoverySource) -> Self {
        let (ready_tx, ready_rx) = watch::channel(false);
        Self {
            urlspec: urlspec.into(),
            state: Arc::new(RwLock::new(RingState::default())),
            started: OnceCell::new(),
            pending: Mutex::new(Some(Pending {
                source: Box::new(source),
                ready: ready_tx,
            })),
            ready: Some(ready_rx),
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// A map that re-derives its endpoints from shared configuration.
    ///
    /// `projection` runs against the current [`ServiceConnections`] at start
    /// and after every change published on `connections`.
    pub fn conf_based<F>(connections: watch::Receiver<ServiceConnections>, projection: F) -> Self
    where
        F: Fn(&ServiceConnections) -> Vec<String> + Send + Sync + 'static,
    {
        Self::discover("conf-based", ConfigSource::new(connections, projection))
    }

    fn settled(urlspec: String, state: RingState) -> Self {
        Self {
            urlspec,
            state: Arc::new(RwLock::new(state)),
            started: OnceCell::new(),
            pending: Mutex::new(None),
            ready: None,
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Description of where this map's endpoints come from.
    pub fn urlspec(&self) -> &str {
        &self.urlspec
    }

    /// The endpoint closest to `key`.
    ///
    /// Discovered endpoints are whatever the source registered; the endpoint
    /// may not be serving yet, so callers should retry on failure.
    pub async fn get(&self, key: &str) -> Result<String, EndpointError> {
        let state = self.read().await;
        let ring = state.current(&self.urlspec)?;
        ring.lookup(key)
            .map(str::to_string)
            .ok_or_else(|| self.no_endpoints())
    }

    /// The `n` endpoints closest to `key`, best first.
    pub async fn get_n(&self, key: &str, n: usize) -> Result<Vec<String>, EndpointError> {
        let state = self.read().await;
        let ring = state.current(&self.urlspec)?;
        Ok(ring.lookup_n(key, n).into_iter().map(str::to_string).collect())
    }

    /// Same as calling [`EndpointMap::get`] for each key, against one ring.
    ///
    /// Takes the lock once for the whole batch, so it is both faster than
    /// per-key calls and consistent: no update can land mid-batch.
    pub async fn get_many<K: AsRef<str>>(
        &self,
        keys: &[K],
    ) -> Result<Vec<String>, EndpointError> {
        let state = self.read().await;
        let ring = state.current(&self.urlspec)?;
        keys.iter()
            .map(|key| {
                ring.lookup(key.as_ref())
                    .map(str::to_string)
                    .ok_or_else(|| self.no_endpoints())
            })
            .collect()
    }

    /// Every endpoint currently in the map.
    pub async fn endpoints(&self) -> Result<Vec<String>, EndpointError> {
        let state = self.read().await;
        let ring = state.current(&self.urlspec)?;
        Ok(ring.nodes().to_vec())
    }

    /// The current ring, for callers doing many lookups off-lock.
    ///
    /// The returned ring is a snapshot; later updates do not affect it.
    pub async fn ring(&self) -> Result<Arc<HashRing>, EndpointError> {
        let state = self.read().await;
        state.current(&self.urlspec).cloned()
    }

    /// Only static maps hold an empty ring; discovery never installs one.
    fn no_endpoints(&self) -> EndpointError {
        EndpointError::NoEndpoints {
            service: STATIC_SERVICE.to_string(),
        }
    }

    /// Make sure discovery has started, then take the read lock.
    async fn read(&self) -> RwLockReadGuard<'_, RingState> {
        self.started.get_or_init(|| self.start()).await;
        self.state.read().await
    }

    /// Start discovery (if any) and wait for the first snapshot.
    ///
    /// Runs at most once to completion. If a waiting caller is cancelled
    /// the next caller re-enters, finds the source already running, and
    /// just waits.
    async fn start(&self) {
        let pending = self
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        if let Some(Pending { source, ready }) = pending {
            debug!(urlspec = %self.urlspec, service = source.service(), "starting discovery");
            let (tx, rx) = queue();
            let synchronizer = Synchronizer {
                urlspec: self.urlspec.clone(),
                state: Arc::clone(&self.state),
                ready,
                signalled: false,
            };
            let sync_task = tokio::spawn(synchronizer.run(rx));
            let source_task = tokio::spawn(source.run(tx));
            self.tasks
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .extend([sync_task, source_task]);
        }

        let Some(mut ready) = self.ready.clone() else {
            return;
        };
        if ready.wait_for(|ready| *ready).await.is_err() {
            warn!(urlspec = %self.urlspec, "endpoint synchronizer stopped before becoming ready");
        }
    }
}

impl Drop for EndpointMap {
    fn drop(&mut self) {
        let tasks = self.tasks.get_mut().unwrap_or_else(PoisonError::into_inner);
        for task in tasks.drain(..) {
            task.abort();
        }
    }
}

impl fmt::Display for EndpointMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "endpoint.Map({})", self.urlspec)
    }
}

impl fmt::Debug for EndpointMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EndpointMap")
            .field("urlspec", &self.urlspec)
            .field("discovery", &self.ready.is_some())
            .finish_non_exhaustive()
    }
}

/// Applies snapshots from the queue to a map's shared state.
///
/// The only writer of a map's [`RingState`].
struct Synchronizer {
    urlspec: String,
    state: Arc<RwLock<RingState>>,
    ready: watch::Sender<bool>,
    signalled: bool,
}

impl Synchronizer {
    async fn run(mut self, mut rx: mpsc::Receiver<Snapshot>) {
        while let Some(snapshot) = rx.recv().await {
            info!(
                urlspec = %self.urlspec,
                service = %snapshot.service,
                count = snapshot.endpoints.len(),
                error = ?snapshot.error,
                "endpoints discovered"
            );
            self.apply(snapshot).await;
            self.signal_ready();
        }

        if !self.signalled {
            warn!(urlspec = %self.urlspec, "discovery ended before the first snapshot");
            self.state.write().await.error = Some(EndpointError::DiscoveryEnded {
                urlspec: self.urlspec.clone(),
            });
            self.signal_ready();
        } else {
            debug!(urlspec = %self.urlspec, "discovery ended");
        }
    }

    async fn apply(&self, snapshot: Snapshot) {
        if let Some(err) = snapshot.error {
            // Keep the old ring; the error shadows it until a good snapshot.
            self.state.write().await.error = Some(err.into());
            return;
        }

        if snapshot.endpoints.is_empty() {
            self.state.write().await.error = Some(EndpointError::NoEndpoints {
                service: snapshot.service,
            });
            return;
        }

        record_endpoint_count(&snapshot.service, snapshot.endpoints.len());

        // Build outside the lock; swap ring and error in one critical section.
        let ring = Arc::new(HashRing::new(snapshot.endpoints));
        let mut state = self.state.write().await;
        state.ring = Some(ring);
        state.error = None;
    }

    fn signal_ready(&mut self) {
        if !self.signalled {
            self.signalled = true;
            self.ready.send_replace(true);
        }
    }
}
