//! Consistent-hash endpoint maps kept current by discovery.
//!
//! This crate provides:
//!
//! - [`EndpointMap`]: maps keys to service endpoints with rendezvous
//!   hashing; static, permanently failed, or discovery-backed.
//! - [`MapFactory`]: builds maps from URL specifiers and replica
//!   descriptors, with optional Kubernetes discovery.
//! - [`replicas`]: endpoint generators for fixed-replica deployments.

mod error;
mod factory;
mod map;
pub mod observability;
pub mod replicas;


pub use error::EndpointError;
pub use factory::MapFactory;
pub use map::EndpointMap;
pub use replicas::ReplicaMode;
