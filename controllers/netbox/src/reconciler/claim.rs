//! Building blocks shared by the claim reconcilers.
//!
//! A claim reconcile either finds its resource or resolves a value under the
//! pool lease and creates the resource. The lease is deliberately left held
//! after a successful resolution: the resource reconcile re-enters it with
//! the same holder and releases it once the value is written to NetBox, so no
//! other claim can be handed the same free space in between.

use super::{object_key, Backend, KubeObject, PoolLease, Reconciler};
use crate::claim_resolution::{ResolutionError, Resolved};
use crate::error::ControllerError;
use crate::status::{report, ConditionTemplate};
use crds::{find_condition, is_condition_true, Condition, NetBoxResourceStatus, CONDITION_READY};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::api::PostParams;
use kube::{Resource, ResourceExt};
use kube_runtime::controller::Action;
use std::future::Future;
use std::ops::ControlFlow;
use std::time::Duration;
use tracing::{debug, info};

/// Retry delay for outcomes that depend on pool occupancy, such as an
/// exhausted parent
pub const POOL_RETRY: Duration = Duration::from_secs(30);

/// Result of resolving a claim under its pool lease
#[derive(Debug)]
pub enum Allocation<T> {
    /// Another holder has the lease
    Locked,
    Resolved(Resolved<T>),
    Failed(ResolutionError),
}

/// Take the pool lease and run `resolve`.
///
/// On failure the lease is released right away. On success it stays held for
/// the resource reconcile, see the module docs.
pub async fn resolve_locked<T, F>(backend: &Backend, pool: &PoolLease, resolve: F) -> Result<Allocation<T>, ControllerError>
where
    F: Future<Output = Result<Resolved<T>, ResolutionError>>,
{
    let locker = backend.locker(pool);
    if !locker.try_lock().await? {
        debug!("{}: pool lease {} is held by someone else", pool.holder, pool.lease);
        return Ok(Allocation::Locked);
    }

    match resolve.await {
        Ok(resolved) => Ok(Allocation::Resolved(resolved)),
        Err(e) => {
            locker.unlock().await;
            Ok(Allocation::Failed(e))
        }
    }
}

/// What to return after a resolution failure has been reported.
///
/// Transient backend errors go back to the watcher's backoff. Outcomes that
/// need somebody to edit the claim or NetBox wait for a change, everything
/// else is retried on a timer since pool occupancy changes on its own.
pub fn after_resolution_failure(error: ResolutionError) -> Result<Action, ControllerError> {
    if error.is_transient() {
        Err(error.into())
    } else if error.needs_intervention() {
        Ok(Action::await_change())
    } else {
        Ok(Action::requeue(POOL_RETRY))
    }
}

/// Turn the outcome of [`resolve_locked`] into the claim's next step.
///
/// A resolved value continues to resource creation. A busy lease requeues
/// after `lock_retry`. A failure is reported with `not_assigned` and mapped
/// by [`after_resolution_failure`].
pub fn allocation_step<T>(
    key: &str,
    conditions: &mut Vec<Condition>,
    allocation: Allocation<T>,
    not_assigned: &ConditionTemplate,
    lock_retry: Duration,
    generation: Option<i64>,
) -> Result<ControlFlow<Action, Resolved<T>>, ControllerError> {
    match allocation {
        Allocation::Resolved(resolved) => Ok(ControlFlow::Continue(resolved)),
        Allocation::Locked => {
            debug!("{}: pool lease busy, retrying in {:?}", key, lock_retry);
            Ok(ControlFlow::Break(Action::requeue(lock_retry)))
        }
        Allocation::Failed(e) => {
            report(key, conditions, not_assigned, Some(&e), generation);
            after_resolution_failure(e).map(ControlFlow::Break)
        }
    }
}

/// Controller owner reference from a claim to the resource it creates
pub fn owner_reference<C>(claim: &C) -> Result<OwnerReference, ControllerError>
where
    C: Resource<DynamicType = ()>,
{
    claim
        .controller_owner_ref(&())
        .ok_or_else(|| ControllerError::InvalidConfig(format!("{} has no uid yet", object_key(claim))))
}

/// Mirror the resource's Ready condition onto the claim. Returns whether it is ready.
///
/// A not-ready resource's own Ready message is attached so the claim shows why.
pub fn mirror_ready(
    key: &str,
    conditions: &mut Vec<Condition>,
    resource: Option<&NetBoxResourceStatus>,
    ready: &ConditionTemplate,
    not_ready: &ConditionTemplate,
    generation: Option<i64>,
) -> bool {
    let resource_conditions = resource.map(|s| s.conditions.as_slice()).unwrap_or_default();
    if is_condition_true(resource_conditions, CONDITION_READY) {
        report(key, conditions, ready, None, generation);
        return true;
    }
    let detail = find_condition(resource_conditions, CONDITION_READY).map(|c| c.message.clone());
    report(
        key,
        conditions,
        not_ready,
        detail.as_ref().map(|m| m as &dyn std::fmt::Display),
        generation,
    );
    false
}

impl Reconciler {
    /// Create a resource. One that already exists is left alone, the next
    /// claim reconcile picks it up.
    pub(crate) async fn create_resource<K: KubeObject>(&self, resource: &K) -> Result<(), ControllerError> {
        let namespace = super::namespace_of(resource)?;
        match self.api::<K>(&namespace).create(&PostParams::default(), resource).await {
            Ok(_) => {
                info!("Created {}", object_key(resource));
                Ok(())
            }
            Err(kube::Error::Api(e)) if e.code == 409 => {
                debug!("{} already exists", object_key(resource));
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Replace an object, e.g. after changing its spec. Conflicts surface as
    /// errors and are retried.
    pub(crate) async fn replace<K: KubeObject>(&self, obj: &K) -> Result<(), ControllerError> {
        let namespace = super::namespace_of(obj)?;
        self.api::<K>(&namespace)
            .replace(&obj.name_any(), &PostParams::default(), obj)
            .await?;
        Ok(())
    }
}
