//! Generic reconcile flow for backend-facing resources.
//!
//! 1. On deletion, delete the object in NetBox (unless preserved) and drop
//!    the finalizer.
//! 2. Initialise the Ready condition and add the finalizer.
//! 3. While an owned resource is not ready, re-enter the pool lease its claim
//!    took and release it after the write.
//! 4. Merge custom fields against the last snapshot and reserve in NetBox.
//! 5. Record the NetBox ID, URL, snapshot annotation and Ready condition.

use super::{
    controller_owner, has_finalizer, is_being_deleted, object_key, Backend, KubeObject, PoolLease, Reconciler,
};
use crate::custom_fields::{
    merge_custom_fields, parse_snapshot, snapshot_annotation, MANAGED_CUSTOM_FIELDS_ANNOTATION,
};
use crate::config::OperatorConfig;
use crate::error::ControllerError;
use crate::reservation::{ReservationError, ReserveOutcome, Reserver};
use crate::status::{self, report, ConditionTemplate};
use async_trait::async_trait;
use crds::{is_condition_true, CustomFields, NetBoxResourceStatus, CONDITION_READY};
use kube::api::DeleteParams;
use kube::ResourceExt;
use kube_runtime::controller::Action;
use netbox_client::{NetBoxClientTrait, NetBoxError};
use tracing::{debug, info, warn};

/// A resource kind reserved in NetBox
#[async_trait]
pub trait ResourceKind: KubeObject {
    const KIND: &'static str;
    /// Kind of the claim that creates and owns this resource
    const CLAIM_KIND: &'static str;
    const FINALIZER: &'static str;
    /// Path of the object type in the NetBox UI, e.g. "ipam/prefixes"
    const UI_PATH: &'static str;

    const RESERVED: ConditionTemplate;
    const RESERVE_FAILED: ConditionTemplate;
    const DELETE_FAILED: ConditionTemplate;

    fn resource_status(&self) -> Option<&NetBoxResourceStatus>;

    fn preserve_in_netbox(&self) -> bool;

    fn spec_custom_fields(&self) -> &CustomFields;

    /// Lease name of the pool the owning claim allocates from, once known
    async fn claim_pool(reconciler: &Reconciler, namespace: &str, claim: &str) -> Result<Option<String>, ControllerError>;

    async fn reserve(&self, reserver: &Reserver<'_>, custom_fields: CustomFields) -> Result<ReserveOutcome, ReservationError>;

    async fn delete_from_netbox(netbox: &dyn NetBoxClientTrait, id: u64) -> Result<(), NetBoxError>;
}

/// Outcome of pushing a resource to NetBox
#[derive(Debug)]
pub enum SyncOutcome {
    /// Another holder has the pool lease
    Locked,
    /// Written; `snapshot` is the managed custom fields annotation to store
    Reserved { id: u64, snapshot: String },
    /// The object under this literal belongs to a different claim
    HashMismatch(u64),
    Failed(ReservationError),
}

/// NetBox half of the resource flow: merge custom fields, reserve, release the lease.
///
/// A corrupt snapshot annotation and lease store failures are returned as
/// errors. Reservation failures are part of the outcome so the caller can
/// report them before retrying.
pub async fn sync_resource<R: ResourceKind>(
    backend: &Backend,
    resource: &R,
    pool: Option<&PoolLease>,
) -> Result<SyncOutcome, ControllerError> {
    let key = object_key(resource);
    let snapshot = parse_snapshot(&key, resource.annotations())?;
    let merged = merge_custom_fields(resource.spec_custom_fields(), &snapshot);

    let locker = match pool {
        Some(pool) => {
            let locker = backend.locker(pool);
            if !locker.try_lock().await? {
                return Ok(SyncOutcome::Locked);
            }
            debug!("{}: holding pool lease {}", key, pool.lease);
            Some(locker)
        }
        None => None,
    };

    let outcome = resource.reserve(&backend.reserver(), merged).await;
    if let Some(locker) = locker {
        locker.unlock().await;
    }

    Ok(match outcome {
        Ok(ReserveOutcome::Reserved(id)) => SyncOutcome::Reserved {
            id,
            snapshot: snapshot_annotation(resource.spec_custom_fields())?,
        },
        Ok(ReserveOutcome::HashMismatch(id)) => SyncOutcome::HashMismatch(id),
        Err(e) => SyncOutcome::Failed(e),
    })
}

/// What the resource reconcile does after a sync
#[derive(Debug)]
pub enum ResourceStep {
    /// The pool lease is busy, try again after the lock retry delay
    Retry,
    /// Store the snapshot annotation and the updated status
    Record { snapshot: String },
    /// The resource was never written to NetBox and its literal belongs to a
    /// different claim: delete it so the claim can resolve again
    Delete { foreign_id: u64 },
    /// A recorded allocation no longer carries our hash, store the conflict
    Conflict,
    /// Store the failure and retry with backoff
    Failed(ReservationError),
}

/// Apply a sync outcome to the resource status and decide what happens next.
///
/// A hash mismatch only deletes the resource while no NetBox ID has been
/// recorded. Once the resource has owned an allocation the mismatch is
/// reported as Ready=False instead.
pub fn sync_step<R: ResourceKind>(
    key: &str,
    status: &mut NetBoxResourceStatus,
    outcome: SyncOutcome,
    config: &OperatorConfig,
    generation: Option<i64>,
) -> ResourceStep {
    match outcome {
        SyncOutcome::Locked => ResourceStep::Retry,
        SyncOutcome::Reserved { id, snapshot } => {
            status.id = id;
            status.url = config.ui_url(R::UI_PATH, id);
            report(key, &mut status.conditions, &R::RESERVED, None, generation);
            ResourceStep::Record { snapshot }
        }
        SyncOutcome::HashMismatch(id) if status.id == 0 => ResourceStep::Delete { foreign_id: id },
        SyncOutcome::HashMismatch(id) => {
            let detail = format!("{} {} has a different restoration hash", R::KIND, id);
            report(
                key,
                &mut status.conditions,
                &status::RESTORATION_HASH_MISMATCH,
                Some(&detail),
                generation,
            );
            ResourceStep::Conflict
        }
        SyncOutcome::Failed(e) => {
            report(key, &mut status.conditions, &R::RESERVE_FAILED, Some(&e), generation);
            ResourceStep::Failed(e)
        }
    }
}

impl Reconciler {
    pub async fn reconcile_resource<R: ResourceKind>(&self, resource: &R) -> Result<Action, ControllerError> {
        let key = object_key(resource);
        let namespace = super::namespace_of(resource)?;
        let generation = resource.meta().generation;
        let mut status = resource.resource_status().cloned().unwrap_or_default();

        if is_being_deleted(resource) {
            if has_finalizer(resource, R::FINALIZER) {
                if !resource.preserve_in_netbox() && status.id != 0 {
                    if let Err(e) = R::delete_from_netbox(self.backend.netbox.as_ref(), status.id).await {
                        report(&key, &mut status.conditions, &R::DELETE_FAILED, Some(&e), generation);
                        self.patch_status(resource, &status).await?;
                        return Err(e.into());
                    }
                    info!("{}: deleted {} {} from NetBox", key, R::KIND, status.id);
                } else {
                    debug!("{}: leaving {} {} in NetBox", key, R::KIND, status.id);
                }
                self.remove_finalizer(resource, R::FINALIZER).await?;
            }
            return Ok(Action::await_change());
        }

        info!("Reconciling {} {}", R::KIND, key);

        if status.conditions.is_empty() {
            report(&key, &mut status.conditions, &status::NEW_RESOURCE, None, generation);
            self.patch_status(resource, &status).await?;
        }
        self.add_finalizer(resource, R::FINALIZER).await?;

        // Status-only updates on a ready resource never contend for the lease
        let pool = match controller_owner(resource, R::CLAIM_KIND) {
            Some(claim) if !is_condition_true(&status.conditions, CONDITION_READY) => {
                R::claim_pool(self, &namespace, &claim).await?.map(|lease| PoolLease {
                    lease,
                    holder: format!("{}/{}", namespace, claim),
                })
            }
            _ => None,
        };

        let outcome = sync_resource(&self.backend, resource, pool.as_ref()).await?;
        match sync_step::<R>(&key, &mut status, outcome, self.config(), generation) {
            ResourceStep::Retry => {
                debug!("{}: pool lease busy, retrying in {:?}", key, self.config().lock_retry);
                Ok(Action::requeue(self.config().lock_retry))
            }
            ResourceStep::Record { snapshot } => {
                self.set_annotation(resource, MANAGED_CUSTOM_FIELDS_ANNOTATION, &snapshot).await?;
                if resource.resource_status() != Some(&status) {
                    self.patch_status(resource, &status).await?;
                }
                Ok(Action::await_change())
            }
            ResourceStep::Delete { foreign_id } => {
                warn!(
                    "{}: {} {} in NetBox belongs to a different claim, deleting resource",
                    key,
                    R::KIND,
                    foreign_id
                );
                self.api::<R>(&namespace)
                    .delete(&resource.name_any(), &DeleteParams::default())
                    .await?;
                Ok(Action::await_change())
            }
            ResourceStep::Conflict => {
                self.patch_status(resource, &status).await?;
                Ok(Action::await_change())
            }
            ResourceStep::Failed(e) => {
                self.patch_status(resource, &status).await?;
                Err(e.into())
            }
        }
    }
}
