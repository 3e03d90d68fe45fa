//! Reconciliation logic for the IPAM CRDs.
//!
//! Every allocation is modelled as two objects:
//! - a claim, which asks for "some prefix/IP/range/VLAN from this pool"
//! - a resource, owned by the claim, which holds the concrete value and is
//!   reserved in NetBox
//!
//! LoadBalancer Services are mirrored into IP address resources they own
//! (`service.rs`).
//!
//! Resources share one generic flow (`resource.rs`) driven by the
//! [`resource::ResourceKind`] impls in `ipam`. Claims differ enough per kind
//! that each has its own reconciler, built from the helpers in `claim.rs`.

pub mod claim;
pub mod ipam;
pub mod resource;
pub mod service;

use crate::backoff::BackoffTracker;
use crate::claim_resolution::ClaimResolver;
use crate::config::OperatorConfig;
use crate::error::ControllerError;
use crate::lease::{LeaseLocker, LeaseStore};
use crate::reservation::Reserver;
use crds::CustomFields;
use k8s_openapi::NamespaceResourceScope;
use kube::api::{Patch, PatchParams};
use kube::{Api, Client, Resource, ResourceExt};
use netbox_client::NetBoxClientTrait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt::Debug;
use std::sync::Arc;
use tracing::{debug, info};

/// Namespaced kinds the reconciler reads and patches
pub trait KubeObject:
    Resource<Scope = NamespaceResourceScope, DynamicType = ()>
    + Clone
    + Debug
    + Serialize
    + DeserializeOwned
    + Send
    + Sync
    + 'static
{
}

impl<T> KubeObject for T where
    T: Resource<Scope = NamespaceResourceScope, DynamicType = ()>
        + Clone
        + Debug
        + Serialize
        + DeserializeOwned
        + Send
        + Sync
        + 'static
{
}

/// Everything a reconcile needs besides the Kubernetes API.
///
/// Kept separate from [`Reconciler`] so the NetBox-facing half of each flow
/// can run against the mock client and an in-memory lease store.
#[derive(Clone)]
pub struct Backend {
    pub netbox: Arc<dyn NetBoxClientTrait>,
    pub config: Arc<OperatorConfig>,
    pub leases: Arc<dyn LeaseStore>,
}

impl Backend {
    pub fn new(netbox: Arc<dyn NetBoxClientTrait>, config: Arc<OperatorConfig>, leases: Arc<dyn LeaseStore>) -> Self {
        Self { netbox, config, leases }
    }

    pub fn resolver(&self) -> ClaimResolver<'_> {
        ClaimResolver::new(self.netbox.as_ref(), &self.config)
    }

    pub fn reserver(&self) -> Reserver<'_> {
        Reserver::new(self.netbox.as_ref(), &self.config)
    }

    pub fn locker(&self, pool: &PoolLease) -> LeaseLocker {
        LeaseLocker::new(
            Arc::clone(&self.leases),
            pool.lease.clone(),
            pool.holder.clone(),
            self.config.lease_duration,
        )
    }
}

/// The lease guarding one pool, as seen by one holder.
///
/// A claim and the resource it creates share the holder "namespace/name", so
/// the resource can re-enter the lease its claim took and release it once the
/// allocation is written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolLease {
    pub lease: String,
    pub holder: String,
}

/// Reconciles the IPAM claims and resources.
pub struct Reconciler {
    pub(crate) client: Client,
    pub(crate) backend: Backend,
    backoff: BackoffTracker,
}

impl Reconciler {
    pub fn new(client: Client, backend: Backend) -> Self {
        Self {
            client,
            backend,
            backoff: BackoffTracker::new(),
        }
    }

    /// Per-object error backoff, shared with the watchers' error policy
    pub fn backoff(&self) -> &BackoffTracker {
        &self.backoff
    }

    pub(crate) fn config(&self) -> &OperatorConfig {
        &self.backend.config
    }

    pub(crate) fn api<K: KubeObject>(&self, namespace: &str) -> Api<K> {
        Api::namespaced(self.client.clone(), namespace)
    }

    pub(crate) async fn get_opt<K: KubeObject>(&self, namespace: &str, name: &str) -> Result<Option<K>, ControllerError> {
        Ok(self.api::<K>(namespace).get_opt(name).await?)
    }

    pub(crate) async fn add_finalizer<K: KubeObject>(&self, obj: &K, finalizer: &str) -> Result<(), ControllerError> {
        if has_finalizer(obj, finalizer) {
            return Ok(());
        }
        let mut finalizers = obj.finalizers().to_vec();
        finalizers.push(finalizer.to_string());
        self.patch_metadata(obj, serde_json::json!({ "finalizers": finalizers })).await?;
        debug!("{}: added finalizer {}", object_key(obj), finalizer);
        Ok(())
    }

    pub(crate) async fn remove_finalizer<K: KubeObject>(&self, obj: &K, finalizer: &str) -> Result<(), ControllerError> {
        if !has_finalizer(obj, finalizer) {
            return Ok(());
        }
        let finalizers = finalizers_without(obj, finalizer);
        self.patch_metadata(obj, serde_json::json!({ "finalizers": finalizers })).await?;
        info!("{}: removed finalizer {}", object_key(obj), finalizer);
        Ok(())
    }

    pub(crate) async fn set_annotation<K: KubeObject>(&self, obj: &K, key: &str, value: &str) -> Result<(), ControllerError> {
        if obj.annotations().get(key).map(String::as_str) == Some(value) {
            return Ok(());
        }
        let mut annotations = serde_json::Map::new();
        annotations.insert(key.to_string(), serde_json::Value::String(value.to_string()));
        self.patch_metadata(obj, serde_json::json!({ "annotations": annotations })).await
    }

    async fn patch_metadata<K: KubeObject>(&self, obj: &K, metadata: serde_json::Value) -> Result<(), ControllerError> {
        let namespace = namespace_of(obj)?;
        let patch = serde_json::json!({ "metadata": metadata });
        self.api::<K>(&namespace)
            .patch(&obj.name_any(), &PatchParams::default(), &Patch::Merge(&patch))
            .await?;
        Ok(())
    }

    /// Status patch failures propagate so the reconcile is retried instead of
    /// losing the condition change.
    pub(crate) async fn patch_status<K: KubeObject, S: Serialize>(&self, obj: &K, status: &S) -> Result<(), ControllerError> {
        let namespace = namespace_of(obj)?;
        let patch = serde_json::json!({ "status": status });
        self.api::<K>(&namespace)
            .patch_status(&obj.name_any(), &PatchParams::default(), &Patch::Merge(&patch))
            .await?;
        Ok(())
    }
}

/// "namespace/name", used for log lines, lease holders and backoff keys
pub fn object_key<K: Resource>(obj: &K) -> String {
    format!("{}/{}", obj.namespace().unwrap_or_default(), obj.name_any())
}

pub(crate) fn namespace_of<K: Resource>(obj: &K) -> Result<String, ControllerError> {
    obj.namespace()
        .ok_or_else(|| ControllerError::InvalidConfig(format!("{} has no namespace", obj.name_any())))
}

pub(crate) fn has_finalizer<K: Resource>(obj: &K, finalizer: &str) -> bool {
    obj.finalizers().iter().any(|f| f == finalizer)
}

pub(crate) fn finalizers_without<K: Resource>(obj: &K, finalizer: &str) -> Vec<String> {
    obj.finalizers().iter().filter(|f| *f != finalizer).cloned().collect()
}

pub(crate) fn is_being_deleted<K: Resource>(obj: &K) -> bool {
    obj.meta().deletion_timestamp.is_some()
}

/// Name of the controlling owner of `obj` if it is of kind `owner_kind`
pub(crate) fn controller_owner<K: Resource>(obj: &K, owner_kind: &str) -> Option<String> {
    obj.owner_references()
        .iter()
        .find(|r| r.controller == Some(true) && r.kind == owner_kind)
        .map(|r| r.name.clone())
}

/// Spec custom fields plus the restoration hash under the configured field name
pub(crate) fn with_restoration_hash(custom_fields: &CustomFields, hash_field: &str, hash: &str) -> CustomFields {
    let mut fields = custom_fields.clone();
    fields.insert(hash_field.to_string(), hash.to_string());
    fields
}
