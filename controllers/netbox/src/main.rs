//! NetBox IPAM Controller
//!
//! Reconciles prefix, IP address, IP range and VLAN claims against NetBox:
//! claims are resolved to concrete allocations (restored by hash or newly
//! allocated under a pool lease), and the resulting resources are reserved in
//! NetBox with their custom fields kept in sync.

mod allocation;
mod backoff;
mod claim_resolution;
mod config;
mod controller;
mod custom_fields;
mod error;
mod lease;
mod lookup;
mod reconciler;
mod reservation;
mod restoration;
mod status;
mod watcher;

#[cfg(test)]
mod claim_resolution_test;
#[cfg(test)]
mod test_utils;

use crate::config::OperatorConfig;
use crate::controller::Controller;
use crate::error::ControllerError;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), ControllerError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("Starting NetBox IPAM Controller");

    let config = OperatorConfig::from_env()?;

    info!("Configuration:");
    info!("  NetBox URL: {}", config.base_url());
    info!("  Restoration hash field: {}", config.restoration_hash_field);
    info!("  Lease namespace: {}", config.operator_namespace);
    info!(
        "  Watch namespace: {}",
        config.watch_namespace.as_deref().unwrap_or("all namespaces")
    );

    let controller = Controller::new(config).await?;
    controller.run().await
}
