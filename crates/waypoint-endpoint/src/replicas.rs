//! Synthetic endpoint lists for fixed-replica deployments.
//!
//! Docker Compose and Kubernetes stateful sets name replicas differently:
//!
//! - docker-compose: `zoekt-webserver-0:6070`
//! - kubernetes:     `indexed-search-0.indexed-search:6070`
//!
//! Both generators are pure and return replicas in ascending index order.

use std::fmt;
use std::str::FromStr;

use crate::error::EndpointError;

/// Deployment convention used to name replicas.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplicaMode {
    /// `{protocol}{service}-{i}:{port}`
    DockerCompose,
    /// `{protocol}{service}-{i}.{service}:{port}`
    Kubernetes,
}

impl ReplicaMode {
    /// Generate the endpoints for `replicas` replicas of `service`.
    pub fn endpoints(
        self,
        service: &str,
        replicas: usize,
        port: &str,
        protocol: &str,
    ) -> Vec<String> {
        match self {
            ReplicaMode::DockerCompose => {
                docker_compose_endpoints(service, replicas, port, protocol)
            }
            ReplicaMode::Kubernetes => kubernetes_endpoints(service, replicas, port, protocol),
        }
    }
}

impl FromStr for ReplicaMode {
    type Err = EndpointError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "docker-compose" => Ok(ReplicaMode::DockerCompose),
            "kubernetes" => Ok(ReplicaMode::Kubernetes),
            other => Err(EndpointError::UnrecognizedMode {
                mode: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for ReplicaMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReplicaMode::DockerCompose => f.write_str("docker-compose"),
            ReplicaMode::Kubernetes => f.write_str("kubernetes"),
        }
    }
}

/// Parse a replica count, which must be a positive integer.
pub fn parse_replicas(service: &str, replicas: &str) -> Result<usize, EndpointError> {
    match replicas.parse::<usize>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(EndpointError::InvalidReplicas {
            service: service.to_string(),
        }),
    }
}

/// Flat naming: `{protocol}{service}-{i}:{port}`.
pub fn docker_compose_endpoints(
    service: &str,
    replicas: usize,
    port: &str,
    protocol: &str,
) -> Vec<String> {
    (0..replicas)
        .map(|i| format!("{protocol}{service}-{i}:{port}"))
        .collect()
}

/// Indexed-hostname naming: `{protocol}{service}-{i}.{service}:{port}`.
pub fn kubernetes_endpoints(
    service: &str,
    replicas: usize,
    port: &str,
    protocol: &str,
) -> Vec<String> {
    (0..replicas)
        .map(|i| format!("{protocol}{service}-{i}.{service}:{port}"))
        .collect()
}
