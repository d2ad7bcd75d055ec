//! `waypointd`: query Waypoint endpoint maps from the command line.
//!
//! Builds one endpoint map per `[services.<name>]` config section and
//! answers consistent-hash lookups against them.
//!
//! # Usage
//!
//! ```text
//! waypointd -c waypoint.toml services                # list configured maps
//! waypointd -c waypoint.toml endpoints searcher      # current endpoint set
//! waypointd -c waypoint.toml get gitserver repo-a repo-b
//! waypointd -c waypoint.toml get-n gitserver repo-a -n 2
//! waypointd -c waypoint.toml watch gitserver         # follow config edits
//! ```

mod config;
mod reload;
mod services;
mod telemetry;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{debug, info};
use waypoint_endpoint::{EndpointMap, MapFactory};

use config::CliConfig;
use reload::ConfigReloader;
use services::Services;

// -----------------------------------------------------------------------
// CLI definition
// -----------------------------------------------------------------------

#[derive(Parser)]
#[command(
    name = "waypointd",
    version,
    about = "Consistent-hash routing of keys to service endpoints"
)]
struct Cli {
    /// Path to TOML config file.
    #[arg(short, long, global = true, env = "WAYPOINT_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the endpoint for each key, one per line.
    Get {
        /// Service name, as in `[services.<name>]`.
        service: String,

        /// Keys to route.
        #[arg(required = true)]
        keys: Vec<String>,
    },

    /// Print the `n` closest endpoints for a key, best first.
    GetN {
        /// Service name, as in `[services.<name>]`.
        service: String,

        /// Key to route.
        key: String,

        /// Number of endpoints to return.
        #[arg(short, default_value = "1")]
        n: usize,
    },

    /// Print every endpoint of a service.
    Endpoints {
        /// Service name, as in `[services.<name>]`.
        service: String,
    },

    /// List configured services.
    Services,

    /// Print a service's endpoints every time they change.
    Watch {
        /// Service name, as in `[services.<name>]`.
        service: String,
    },
}

// -----------------------------------------------------------------------
// Entrypoint
// -----------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = CliConfig::load(cli.config.as_deref()).context("failed to load config")?;

    telemetry::init(&config.log.level);

    let services = Services::build(&config, &MapFactory::new());
    debug!(count = config.services.len(), "services configured");

    match cli.command {
        Commands::Get { service, keys } => cmd_get(&services, &service, &keys).await,
        Commands::GetN { service, key, n } => cmd_get_n(&services, &service, &key, n).await,
        Commands::Endpoints { service } => cmd_endpoints(&services, &service).await,
        Commands::Services => {
            cmd_services(&services);
            Ok(())
        }
        Commands::Watch { service } => cmd_watch(&services, &config, cli.config, &service).await,
    }
}

// -----------------------------------------------------------------------
// Queries
// -----------------------------------------------------------------------

async fn cmd_get(services: &Services, service: &str, keys: &[String]) -> Result<()> {
    let map = services.get(service)?;
    let endpoints = map
        .get_many(keys)
        .await
        .with_context(|| format!("{map}: lookup failed"))?;

    for endpoint in endpoints {
        println!("{endpoint}");
    }
    Ok(())
}

async fn cmd_get_n(services: &Services, service: &str, key: &str, n: usize) -> Result<()> {
    let map = services.get(service)?;
    let endpoints = map
        .get_n(key, n)
        .await
        .with_context(|| format!("{map}: lookup failed"))?;

    for endpoint in endpoints {
        println!("{endpoint}");
    }
    Ok(())
}

async fn cmd_endpoints(services: &Services, service: &str) -> Result<()> {
    let map = services.get(service)?;
    let endpoints = map
        .endpoints()
        .await
        .with_context(|| format!("{map}: no endpoints"))?;

    for endpoint in endpoints {
        println!("{endpoint}");
    }
    Ok(())
}

fn cmd_services(services: &Services) {
    for (name, map) in services.iter() {
        println!("{name:<24} {map}");
    }
}

// -----------------------------------------------------------------------
// waypointd watch
// -----------------------------------------------------------------------

async fn cmd_watch(
    services: &Services,
    config: &CliConfig,
    path: Option<PathBuf>,
    service: &str,
) -> Result<()> {
    let map = services.get(service)?;
    let interval = config.poll_interval();

    let reloader = match path {
        Some(path) => {
            let reloader = ConfigReloader::new(path, services.connections().clone()).await;
            Some(reloader.spawn(interval))
        }
        None => None,
    };

    info!(service, map = %map, "watching endpoints");
    let result = follow(map, interval, tokio::signal::ctrl_c(), |line| println!("{line}")).await;

    if let Some(task) = reloader {
        task.abort();
    }
    result.context("failed to listen for ctrl-c")
}

/// Emit the map's state on every change until `shutdown` resolves.
///
/// `shutdown` is polled across iterations, so a signal that lands while a
/// state is being printed is not lost.
async fn follow<S>(
    map: &EndpointMap,
    interval: Duration,
    shutdown: S,
    mut emit: impl FnMut(&str),
) -> std::io::Result<()>
where
    S: Future<Output = std::io::Result<()>>,
{
    tokio::pin!(shutdown);
    let mut ticker = tokio::time::interval(interval);
    let mut last: Option<String> = None;
    loop {
        tokio::select! {
            res = &mut shutdown => return res,
            _ = ticker.tick() => {
                let current = describe(map).await;
                if last.as_ref() != Some(&current) {
                    emit(&current);
                    last = Some(current);
                }
            }
        }
    }
}

/// One-line summary of a map's current state.
async fn describe(map: &EndpointMap) -> String {
    match map.endpoints().await {
        Ok(endpoints) => endpoints.join(" "),
        Err(e) => format!("error: {e}"),
    }
}
