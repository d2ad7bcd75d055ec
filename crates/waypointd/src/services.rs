//! Endpoint maps for every configured service.

use std::collections::BTreeMap;

use anyhow::{Result, bail};
use tokio::sync::watch;
use tracing::debug;
use waypoint_discovery::{CONF_BASED, ConfigSource, ServiceConnections};
use waypoint_endpoint::{EndpointError, EndpointMap, MapFactory};

use crate::config::{CliConfig, ServiceSection};

/// One [`EndpointMap`] per `[services.<name>]` section.
///
/// Conf-based services share a single `watch` channel carrying the
/// `[connections]` table; [`Services::connections`] is its sending half.
pub struct Services {
    maps: BTreeMap<String, EndpointMap>,
    connections: watch::Sender<ServiceConnections>,
}

impl Services {
    /// Build maps for every service in `config`.
    pub fn build(config: &CliConfig, factory: &MapFactory) -> Self {
        let (connections, rx) = watch::channel(config.connections.clone());

        let maps = config
            .services
            .iter()
            .map(|(name, section)| {
                let map = build_map(name, section, factory, &rx);
                debug!(service = %name, map = %map, "configured service");
                (name.clone(), map)
            })
            .collect();

        Self { maps, connections }
    }

    /// The map for `service`.
    pub fn get(&self, service: &str) -> Result<&EndpointMap> {
        match self.maps.get(service) {
            Some(map) => Ok(map),
            None => bail!(EndpointError::NotConfigured {
                service: service.to_string()
            }),
        }
    }

    /// Configured services with their maps, sorted by name.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &EndpointMap)> {
        self.maps.iter().map(|(name, map)| (name.as_str(), map))
    }

    /// Publishes `[connections]` updates to conf-based maps.
    pub fn connections(&self) -> &watch::Sender<ServiceConnections> {
        &self.connections
    }
}

fn build_map(
    name: &str,
    section: &ServiceSection,
    factory: &MapFactory,
    connections: &watch::Receiver<ServiceConnections>,
) -> EndpointMap {
    if section.is_conf_based() {
        let service = name.to_string();
        let source = ConfigSource::named(name, connections.clone(), move |conns| {
            conns.endpoints(&service).to_vec()
        });
        return EndpointMap::discover(CONF_BASED, source);
    }

    factory.replicas(
        &section.url,
        name,
        &section.replicas,
        &section.port,
        &section.protocol,
    )
}
