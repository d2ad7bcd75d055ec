//! Error types for endpoint maps.

use waypoint_discovery::DiscoveryError;

/// Errors returned by [`EndpointMap`](crate::EndpointMap) queries.
///
/// Construction never fails: a bad descriptor produces a map that returns
/// one of these from every query instead. Cloneable so a sticky error can
/// be handed to every caller verbatim.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EndpointError {
    /// The replica count was not a positive integer.
    #[error("error parsing replicas value for {service}")]
    InvalidReplicas {
        /// Service whose replica count was rejected.
        service: String,
    },

    /// The deployment mode given with a replica count is not known.
    #[error("unrecognized url value to enable replica endpoints {mode}")]
    UnrecognizedMode {
        /// The mode as given.
        mode: String,
    },

    /// Neither a specifier nor a replica count was provided.
    #[error("{service} service has not been configured")]
    NotConfigured {
        /// Service that is missing configuration.
        service: String,
    },

    /// A `k8s+` specifier was used but no Kubernetes watcher is available.
    #[error("kubernetes discovery is not available for {spec}")]
    KubernetesUnavailable {
        /// The specifier as given.
        spec: String,
    },

    /// The discovery source reported a failure.
    #[error(transparent)]
    Discovery(#[from] DiscoveryError),

    /// The latest snapshot listed no endpoints.
    #[error(
        "no {service} endpoints could be found (this may indicate more {service} replicas are needed)"
    )]
    NoEndpoints {
        /// Service with an empty endpoint set.
        service: String,
    },

    /// The discovery source stopped before reporting any endpoints.
    #[error("discovery for {urlspec} ended before reporting any endpoints")]
    DiscoveryEnded {
        /// Description of the map whose source ended.
        urlspec: String,
    },
}
