//! Building endpoint maps from configuration strings.

use std::fmt;
use std::sync::Arc;

use tracing::debug;
use waypoint_discovery::{EndpointWatcher, K8S_PREFIX, KubernetesSource, KubernetesSpec};

use crate::error::EndpointError;
use crate::map::EndpointMap;
use crate::replicas::{ReplicaMode, parse_replicas};

/// Builds [`EndpointMap`]s from URL specifiers and replica descriptors.
///
/// Holds the optional Kubernetes watcher that `k8s+` specifiers need.
#[derive(Clone, Default)]
pub struct MapFactory {
    kubernetes: Option<Arc<dyn EndpointWatcher>>,
}

impl MapFactory {
    /// A factory without Kubernetes support.
    pub fn new() -> Self {
        Self::default()
    }

    /// Use `watcher` for `k8s+` specifiers.
    pub fn with_kubernetes(mut self, watcher: Arc<dyn EndpointWatcher>) -> Self {
        self.kubernetes = Some(watcher);
        self
    }

    /// Create a map for a URL specifier; see [`EndpointMap::new`].
    ///
    /// Never fails: an unparseable `k8s+` specifier, or one given to a
    /// factory without a watcher, produces a map that fails every query.
    pub fn from_spec(&self, urlspec: &str) -> EndpointMap {
        if !urlspec.starts_with(K8S_PREFIX) {
            return EndpointMap::from_static(urlspec.split_whitespace());
        }

        let spec = match KubernetesSpec::parse(urlspec) {
            Ok(spec) => spec,
            Err(e) => return EndpointMap::empty(e.into()),
        };

        match &self.kubernetes {
            Some(watcher) => {
                debug!(%spec, "using kubernetes discovery");
                EndpointMap::discover(urlspec, KubernetesSource::new(spec, Arc::clone(watcher)))
            }
            None => EndpointMap::empty(EndpointError::KubernetesUnavailable {
                spec: urlspec.to_string(),
            }),
        }
    }

    /// Create a map from a replica descriptor.
    ///
    /// - `replicas` set: it must be a positive integer, and `urlspec` picks
    ///   the naming convention (`"docker-compose"` or `"kubernetes"`).
    /// - `replicas` empty: `urlspec` is an ordinary specifier.
    /// - both empty: the service is not configured.
    ///
    /// Every failure becomes a map that returns the error from its queries.
    pub fn replicas(
        &self,
        urlspec: &str,
        service: &str,
        replicas: &str,
        port: &str,
        protocol: &str,
    ) -> EndpointMap {
        if !replicas.is_empty() {
            let generated = parse_replicas(service, replicas).and_then(|count| {
                let mode: ReplicaMode = urlspec.parse()?;
                Ok(mode.endpoints(service, count, port, protocol))
            });
            return match generated {
                Ok(endpoints) => EndpointMap::from_static(endpoints),
                Err(e) => EndpointMap::empty(e),
            };
        }

        if !urlspec.is_empty() {
            return self.from_spec(urlspec);
        }

        EndpointMap::empty(EndpointError::NotConfigured {
            service: service.to_string(),
        })
    }
}

impl fmt::Debug for MapFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MapFactory")
            .field("kubernetes", &self.kubernetes.is_some())
            .finish()
    }
}
