//! Main controller implementation.
//!
//! Builds the clients and the shared [`Reconciler`], then runs one watcher per
//! CRD kind:
//! - NetBoxPrefixClaim / NetBoxPrefix
//! - NetBoxIpAddressClaim / NetBoxIpAddress
//! - NetBoxIpRangeClaim / NetBoxIpRange
//! - NetBoxVlanClaim / NetBoxVlan
//! - Service (LoadBalancer ingress IPs mirrored into NetBoxIpAddress)

use crate::config::OperatorConfig;
use crate::error::ControllerError;
use crate::lease::KubeLeaseStore;
use crate::reconciler::{Backend, Reconciler};
use crate::watcher::Watcher;
use futures::future::select_all;
use kube::Client;
use netbox_client::{NetBoxClient, NetBoxClientTrait};
use std::future::Future;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{error, info};

/// A running watcher and the kind it watches
struct WatcherTask {
    kind: &'static str,
    handle: JoinHandle<Result<(), ControllerError>>,
}

/// Main controller for the NetBox IPAM CRDs.
pub struct Controller {
    watchers: Vec<WatcherTask>,
}

impl Controller {
    /// Connect to Kubernetes and NetBox and start all watchers.
    ///
    /// Fails early when the NetBox token is rejected or the restoration hash
    /// custom field is missing, so a misconfigured deployment crash-loops
    /// instead of failing every reconcile.
    pub async fn new(config: OperatorConfig) -> Result<Self, ControllerError> {
        info!("Initializing NetBox IPAM controller");

        let kube_client = Client::try_default().await?;

        let base_url = config.base_url();
        let netbox_client = NetBoxClient::new(base_url.clone(), config.auth_token.clone())?;

        info!("Validating NetBox token and connectivity...");
        netbox_client.validate_token().await.map_err(|e| {
            error!("Failed to validate NetBox token: {}", e);
            error!("Please ensure:");
            error!("  1. AUTH_TOKEN environment variable is set correctly");
            error!("  2. The token is valid in NetBox");
            error!("  3. NetBox is reachable at {}", base_url);
            ControllerError::NetBox(e)
        })?;
        info!("NetBox token validated and connectivity established");

        verify_restoration_field(&netbox_client, &config.restoration_hash_field).await?;

        let leases = KubeLeaseStore::new(kube_client.clone(), &config.operator_namespace);
        let namespace = config.watch_namespace.clone();
        let backend = Backend::new(Arc::new(netbox_client), Arc::new(config), Arc::new(leases));
        let reconciler = Arc::new(Reconciler::new(kube_client.clone(), backend));
        let watcher = Arc::new(Watcher::new(reconciler, kube_client, namespace));

        let watchers = vec![
            spawn("NetBoxPrefixClaim", &watcher, |w| async move { w.watch_prefix_claims().await }),
            spawn("NetBoxPrefix", &watcher, |w| async move { w.watch_prefixes().await }),
            spawn("NetBoxIpAddressClaim", &watcher, |w| async move { w.watch_ip_address_claims().await }),
            spawn("NetBoxIpAddress", &watcher, |w| async move { w.watch_ip_addresses().await }),
            spawn("NetBoxIpRangeClaim", &watcher, |w| async move { w.watch_ip_range_claims().await }),
            spawn("NetBoxIpRange", &watcher, |w| async move { w.watch_ip_ranges().await }),
            spawn("NetBoxVlanClaim", &watcher, |w| async move { w.watch_vlan_claims().await }),
            spawn("NetBoxVlan", &watcher, |w| async move { w.watch_vlans().await }),
            spawn("Service", &watcher, |w| async move { w.watch_services().await }),
        ];

        info!("Started {} watchers", watchers.len());
        Ok(Self { watchers })
    }

    /// Run until the first watcher stops. A watcher never stops on its own,
    /// so whichever one does is reported as an error.
    pub async fn run(self) -> Result<(), ControllerError> {
        let (kinds, handles): (Vec<_>, Vec<_>) = self.watchers.into_iter().map(|w| (w.kind, w.handle)).unzip();
        if handles.is_empty() {
            return Ok(());
        }

        let (result, index, remaining) = select_all(handles).await;
        for handle in remaining {
            handle.abort();
        }

        let kind = kinds[index];
        result
            .map_err(|e| ControllerError::Watch(format!("{} watcher panicked: {}", kind, e)))?
            .map_err(|e| ControllerError::Watch(format!("{} watcher error: {}", kind, e)))?;
        Err(ControllerError::Watch(format!("{} watcher stopped", kind)))
    }
}

/// Check that the custom field holding restoration hashes exists in NetBox.
///
/// Without it every reserved object would be written untagged and no claim
/// could ever be restored.
pub async fn verify_restoration_field(netbox: &dyn NetBoxClientTrait, field: &str) -> Result<(), ControllerError> {
    let fields = netbox.query_custom_fields(&[("name", field)], false).await?;
    if fields.iter().any(|f| f.name == field) {
        info!("Restoration hash custom field {} found in NetBox", field);
        return Ok(());
    }

    error!("Custom field {} does not exist in NetBox", field);
    error!("Please ensure:");
    error!("  1. A text custom field named {} is created in NetBox", field);
    error!("  2. It is assigned to prefixes, IP addresses, IP ranges and VLANs");
    error!("  3. NETBOX_RESTORATION_HASH_FIELD_NAME matches its name");
    Err(ControllerError::InvalidConfig(format!("custom field {} does not exist in NetBox", field)))
}

fn spawn<F, Fut>(kind: &'static str, watcher: &Arc<Watcher>, watch: F) -> WatcherTask
where
    F: FnOnce(Arc<Watcher>) -> Fut,
    Fut: Future<Output = Result<(), ControllerError>> + Send + 'static,
{
    WatcherTask {
        kind,
        handle: tokio::spawn(watch(Arc::clone(watcher))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use netbox_client::MockNetBoxClient;

    #[tokio::test]
    async fn test_verify_restoration_field_present() {
        let mock = MockNetBoxClient::new("http://netbox.test");
        mock.add_custom_field(mock.helpers().custom_field(1, "netboxOperatorRestorationHash"));
        mock.add_custom_field(mock.helpers().custom_field(2, "owner"));

        verify_restoration_field(&mock, "netboxOperatorRestorationHash").await.unwrap();
    }

    #[tokio::test]
    async fn test_verify_restoration_field_missing() {
        let mock = MockNetBoxClient::new("http://netbox.test");
        mock.add_custom_field(mock.helpers().custom_field(2, "owner"));

        let err = verify_restoration_field(&mock, "netboxOperatorRestorationHash").await.unwrap_err();
        match err {
            ControllerError::InvalidConfig(message) => {
                assert!(message.contains("netboxOperatorRestorationHash"), "{}", message)
            }
            other => panic!("expected InvalidConfig, got {:?}", other),
        }
    }
}
