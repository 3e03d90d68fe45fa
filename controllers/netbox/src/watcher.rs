//! Kubernetes resource watchers.
//!
//! Every kind is driven by its own `kube_runtime::Controller` through the
//! generic [`run_controller`] helper, which takes care of reconnection,
//! per-object backoff and logging. Claim controllers also watch the resources
//! they own, so a resource turning Ready wakes its claim up.

use crate::error::ControllerError;
use crate::reconciler::{object_key, KubeObject, Reconciler};
use crds::{
    NetBoxIpAddress, NetBoxIpAddressClaim, NetBoxIpRange, NetBoxIpRangeClaim, NetBoxPrefix, NetBoxPrefixClaim,
    NetBoxVlan, NetBoxVlanClaim,
};
use futures::StreamExt;
use k8s_openapi::api::core::v1::Service;
use kube::{Api, Client};
use kube_runtime::controller::{Action, Config as ControllerConfig};
use kube_runtime::{watcher, Controller};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

type ReconcileFuture = Pin<Box<dyn Future<Output = Result<Action, ControllerError>> + Send>>;

/// Run `controller` until its watch stream ends.
///
/// Errors are requeued after the object's Fibonacci backoff delay, and the
/// first success resets it.
async fn run_controller<K, F>(
    controller: Controller<K>,
    reconciler: Arc<Reconciler>,
    reconcile_fn: F,
    kind: &'static str,
) -> Result<(), ControllerError>
where
    K: KubeObject,
    F: Fn(Arc<Reconciler>, Arc<K>) -> ReconcileFuture + Send + Sync + Clone + 'static,
{
    info!("Starting {} watcher", kind);

    let error_policy = move |obj: Arc<K>, error: &ControllerError, ctx: Arc<Reconciler>| {
        let key = format!("{}/{}", kind, object_key(obj.as_ref()));
        let (delay, count) = ctx.backoff().record_failure(&key);
        error!(
            "Reconciliation of {} failed ({} in a row), retrying in {:?}: {}",
            key, count, delay, error
        );
        Action::requeue(delay)
    };

    let reconcile = move |obj: Arc<K>, ctx: Arc<Reconciler>| {
        let reconcile_fn = reconcile_fn.clone();
        async move {
            let key = format!("{}/{}", kind, object_key(obj.as_ref()));
            debug!("Reconcile triggered for {}", key);
            let action = reconcile_fn(ctx.clone(), obj).await?;
            ctx.backoff().record_success(&key);
            Ok::<_, ControllerError>(action)
        }
    };

    // Debounce batches bursts of status updates, concurrency bounds the load
    // each kind puts on NetBox
    let controller_config = ControllerConfig::default()
        .debounce(Duration::from_secs(5))
        .concurrency(3);

    controller
        .with_config(controller_config)
        .run(reconcile, error_policy, reconciler)
        .for_each(|res| async move {
            match res {
                Ok((obj, _)) => debug!("Reconciled {} {}", kind, obj.name),
                Err(e) => error!("Controller error for {}: {}", kind, e),
            }
        })
        .await;

    Ok(())
}

/// Starts one controller per kind
pub struct Watcher {
    reconciler: Arc<Reconciler>,
    client: Client,
    namespace: Option<String>,
}

impl Watcher {
    /// `namespace` restricts every watch to one namespace; `None` watches all
    pub fn new(reconciler: Arc<Reconciler>, client: Client, namespace: Option<String>) -> Self {
        Self {
            reconciler,
            client,
            namespace,
        }
    }

    fn api<K: KubeObject>(&self) -> Api<K> {
        match &self.namespace {
            Some(ns) => Api::namespaced(self.client.clone(), ns),
            None => Api::all(self.client.clone()),
        }
    }

    fn resource_controller<K: KubeObject>(&self) -> Controller<K> {
        Controller::new(self.api::<K>(), watcher::Config::default())
    }

    /// Claims also react to changes of the resource they own
    fn claim_controller<C: KubeObject, R: KubeObject>(&self) -> Controller<C> {
        Controller::new(self.api::<C>(), watcher::Config::default()).owns(self.api::<R>(), watcher::Config::default())
    }

    pub async fn watch_prefix_claims(&self) -> Result<(), ControllerError> {
        run_controller(
            self.claim_controller::<NetBoxPrefixClaim, NetBoxPrefix>(),
            self.reconciler.clone(),
            |reconciler, claim| Box::pin(async move { reconciler.reconcile_prefix_claim(&claim).await }),
            "NetBoxPrefixClaim",
        )
        .await
    }

    pub async fn watch_prefixes(&self) -> Result<(), ControllerError> {
        run_controller(
            self.resource_controller::<NetBoxPrefix>(),
            self.reconciler.clone(),
            |reconciler, prefix| Box::pin(async move { reconciler.reconcile_resource(prefix.as_ref()).await }),
            "NetBoxPrefix",
        )
        .await
    }

    pub async fn watch_ip_address_claims(&self) -> Result<(), ControllerError> {
        run_controller(
            self.claim_controller::<NetBoxIpAddressClaim, NetBoxIpAddress>(),
            self.reconciler.clone(),
            |reconciler, claim| Box::pin(async move { reconciler.reconcile_ip_address_claim(&claim).await }),
            "NetBoxIpAddressClaim",
        )
        .await
    }

    pub async fn watch_ip_addresses(&self) -> Result<(), ControllerError> {
        run_controller(
            self.resource_controller::<NetBoxIpAddress>(),
            self.reconciler.clone(),
            |reconciler, ip| Box::pin(async move { reconciler.reconcile_resource(ip.as_ref()).await }),
            "NetBoxIpAddress",
        )
        .await
    }

    pub async fn watch_ip_range_claims(&self) -> Result<(), ControllerError> {
        run_controller(
            self.claim_controller::<NetBoxIpRangeClaim, NetBoxIpRange>(),
            self.reconciler.clone(),
            |reconciler, claim| Box::pin(async move { reconciler.reconcile_ip_range_claim(&claim).await }),
            "NetBoxIpRangeClaim",
        )
        .await
    }

    pub async fn watch_ip_ranges(&self) -> Result<(), ControllerError> {
        run_controller(
            self.resource_controller::<NetBoxIpRange>(),
            self.reconciler.clone(),
            |reconciler, range| Box::pin(async move { reconciler.reconcile_resource(range.as_ref()).await }),
            "NetBoxIpRange",
        )
        .await
    }

    pub async fn watch_vlan_claims(&self) -> Result<(), ControllerError> {
        run_controller(
            self.claim_controller::<NetBoxVlanClaim, NetBoxVlan>(),
            self.reconciler.clone(),
            |reconciler, claim| Box::pin(async move { reconciler.reconcile_vlan_claim(&claim).await }),
            "NetBoxVlanClaim",
        )
        .await
    }

    /// LoadBalancer Services, woken up when a mirrored IP address changes
    pub async fn watch_services(&self) -> Result<(), ControllerError> {
        run_controller(
            self.claim_controller::<Service, NetBoxIpAddress>(),
            self.reconciler.clone(),
            |reconciler, service| Box::pin(async move { reconciler.reconcile_service(&service).await }),
            "Service",
        )
        .await
    }

    pub async fn watch_vlans(&self) -> Result<(), ControllerError> {
        run_controller(
            self.resource_controller::<NetBoxVlan>(),
            self.reconciler.clone(),
            |reconciler, vlan| Box::pin(async move { reconciler.reconcile_resource(vlan.as_ref()).await }),
            "NetBoxVlan",
        )
        .await
    }
}
