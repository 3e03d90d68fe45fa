//! NetBoxPrefixClaim reconciler
//!
//! The parent is either given literally or selected from NetBox by
//! attributes. The selection is stored in `status.selectedParentPrefix` and
//! is the source of truth for every later reconcile.

use super::super::claim::{
    after_resolution_failure, allocation_step, mirror_ready, owner_reference, resolve_locked, Allocation,
};
use super::super::{is_being_deleted, namespace_of, object_key, with_restoration_hash, PoolLease, Reconciler};
use crate::allocation::{parse_prefix_length, AllocationError};
use crate::claim_resolution::{ResolutionError, Resolved};
use crate::error::ControllerError;
use crate::lease::lease_name_for_pool;
use crate::restoration::prefix_claim_hash;
use crate::status::{self, report};
use crds::{find_condition, NetBoxPrefix, NetBoxPrefixClaim, NetBoxPrefixClaimStatus, NetBoxPrefixSpec, CONDITION_READY};
use ipnet::IpNet;
use kube::{Resource, ResourceExt};
use kube_runtime::controller::Action;
use std::ops::ControlFlow;
use std::time::Duration;
use tracing::{debug, info};

/// Recorded as the selected parent when a prefix was restored by hash. The
/// hash does not cover the parent, so it cannot be known.
pub const PARENT_NOT_INFERRED: &str = "Prefix restored from hash, cannot infer the parent prefix";

/// Spec of the NetBoxPrefix holding `prefix` for `claim`
pub fn prefix_spec_for_claim(claim: &NetBoxPrefixClaim, prefix: &str, hash_field: &str, hash: &str) -> NetBoxPrefixSpec {
    NetBoxPrefixSpec {
        prefix: prefix.to_string(),
        site: claim.spec.site.clone(),
        tenant: claim.spec.tenant.clone(),
        description: claim.spec.description.clone(),
        comments: claim.spec.comments.clone(),
        custom_fields: with_restoration_hash(&claim.spec.custom_fields, hash_field, hash),
        tags: claim.spec.tags.clone(),
        preserve_in_netbox: claim.spec.preserve_in_netbox,
    }
}

/// NetBoxPrefix owned by `claim`, named after it
pub fn prefix_for_claim(
    claim: &NetBoxPrefixClaim,
    prefix: &str,
    hash_field: &str,
    hash: &str,
) -> Result<NetBoxPrefix, ControllerError> {
    let mut resource = NetBoxPrefix::new(&claim.name_any(), prefix_spec_for_claim(claim, prefix, hash_field, hash));
    resource.metadata.namespace = claim.namespace();
    resource.metadata.owner_references = Some(vec![owner_reference(claim)?]);
    Ok(resource)
}

/// Whether a failed allocation means the selected parent is full
fn parent_exhausted(error: &ResolutionError) -> bool {
    matches!(
        error,
        ResolutionError::Allocation(AllocationError::PoolExhausted | AllocationError::NoPrefixMatchesSize)
    )
}

/// Record a selector-based parent selection, or report why there is none
pub fn parent_selection_step(
    key: &str,
    status: &mut NetBoxPrefixClaimStatus,
    selected: Result<String, ResolutionError>,
    generation: Option<i64>,
) -> Result<ControlFlow<Action>, ControllerError> {
    match selected {
        Ok(parent) => {
            let detail = format!("parentPrefix is selected: {}", parent);
            report(key, &mut status.conditions, &status::prefix::PARENT_SELECTED, Some(&detail), generation);
            status.selected_parent_prefix = Some(parent);
            Ok(ControlFlow::Continue(()))
        }
        Err(e) => {
            report(key, &mut status.conditions, &status::prefix::PARENT_NOT_SELECTED, Some(&e), generation);
            after_resolution_failure(e).map(ControlFlow::Break)
        }
    }
}

/// Next step for a claim whose prefix was restored without a known parent.
///
/// When the tagged prefix went away since selection the selection is
/// cleared and parent selection starts over.
pub fn restored_prefix_step(
    key: &str,
    status: &mut NetBoxPrefixClaimStatus,
    restored: Result<Option<IpNet>, ResolutionError>,
    lock_retry: Duration,
    generation: Option<i64>,
) -> Result<ControlFlow<Action, Resolved<IpNet>>, ControllerError> {
    match restored {
        Ok(Some(prefix)) => Ok(ControlFlow::Continue(Resolved { value: prefix, restored: true })),
        Ok(None) => {
            debug!("{}: restorable prefix is gone, selecting a parent again", key);
            status.selected_parent_prefix = None;
            Ok(ControlFlow::Break(Action::requeue(lock_retry)))
        }
        Err(e) => {
            report(key, &mut status.conditions, &status::prefix::NOT_ASSIGNED, Some(&e), generation);
            after_resolution_failure(e).map(ControlFlow::Break)
        }
    }
}

/// Next step after resolving a prefix under the parent's lease.
///
/// A parent picked by selector that turns out to be full is cleared so the
/// next reconcile selects another one.
pub fn prefix_allocation_step(
    key: &str,
    status: &mut NetBoxPrefixClaimStatus,
    allocation: Allocation<IpNet>,
    from_selector: bool,
    lock_retry: Duration,
    generation: Option<i64>,
) -> Result<ControlFlow<Action, Resolved<IpNet>>, ControllerError> {
    match allocation {
        Allocation::Failed(e) if from_selector && parent_exhausted(&e) => {
            let detail = format!("{}, will restart the parent prefix selection process", e);
            report(key, &mut status.conditions, &status::prefix::NOT_ASSIGNED, Some(&detail), generation);
            status.selected_parent_prefix = None;
            Ok(ControlFlow::Break(Action::requeue(lock_retry)))
        }
        other => allocation_step(
            key,
            &mut status.conditions,
            other,
            &status::prefix::NOT_ASSIGNED,
            lock_retry,
            generation,
        ),
    }
}

/// Whether `status` selected a parent the stored claim does not know about yet
pub fn selection_unsaved(claim: &NetBoxPrefixClaim, status: &NetBoxPrefixClaimStatus) -> bool {
    let stored = claim.status.as_ref().and_then(|s| s.selected_parent_prefix.as_deref());
    stored != status.selected_parent_prefix.as_deref()
}

impl Reconciler {
    pub async fn reconcile_prefix_claim(&self, claim: &NetBoxPrefixClaim) -> Result<Action, ControllerError> {
        // The owned prefix is garbage collected through its owner reference
        if is_being_deleted(claim) {
            return Ok(Action::await_change());
        }

        let key = object_key(claim);
        info!("Reconciling NetBoxPrefixClaim {}", key);

        let mut status = claim.status.clone().unwrap_or_default();
        if find_condition(&status.conditions, CONDITION_READY).is_none() {
            report(&key, &mut status.conditions, &status::NEW_RESOURCE, None, claim.meta().generation);
        }

        let outcome = self.converge_prefix_claim(claim, &key, &mut status).await;
        if claim.status.as_ref() != Some(&status) {
            self.patch_status(claim, &status).await?;
        }
        outcome
    }

    async fn converge_prefix_claim(
        &self,
        claim: &NetBoxPrefixClaim,
        key: &str,
        status: &mut NetBoxPrefixClaimStatus,
    ) -> Result<Action, ControllerError> {
        let namespace = namespace_of(claim)?;
        let generation = claim.meta().generation;
        let hash = prefix_claim_hash(claim);
        let hash_field = self.config().restoration_hash_field.clone();

        let resource = match self.get_opt::<NetBoxPrefix>(&namespace, &claim.name_any()).await? {
            Some(existing) => {
                // Only mutable fields follow the claim
                let mut spec = prefix_spec_for_claim(claim, &existing.spec.prefix, &hash_field, &hash);
                spec.tenant = existing.spec.tenant.clone();
                if spec != existing.spec {
                    debug!("{}: updating NetBoxPrefix spec", key);
                    let mut updated = existing.clone();
                    updated.spec = spec;
                    self.replace(&updated).await?;
                }
                existing
            }
            None => match self.assign_prefix(claim, key, &hash, status).await? {
                ControlFlow::Continue(created) => created,
                ControlFlow::Break(action) => return Ok(action),
            },
        };

        let ready = mirror_ready(
            key,
            &mut status.conditions,
            resource.status.as_ref(),
            &status::prefix::CLAIM_READY,
            &status::prefix::CLAIM_NOT_READY,
            generation,
        );
        if ready {
            status.prefix = resource.spec.prefix.clone();
            status.prefix_name = resource.name_any();
        }
        Ok(Action::await_change())
    }

    /// Select a parent if needed, resolve a prefix and create the NetBoxPrefix
    async fn assign_prefix(
        &self,
        claim: &NetBoxPrefixClaim,
        key: &str,
        hash: &str,
        status: &mut NetBoxPrefixClaimStatus,
    ) -> Result<ControlFlow<Action, NetBoxPrefix>, ControllerError> {
        let generation = claim.meta().generation;
        let lock_retry = self.config().lock_retry;
        let resolver = self.backend.resolver();

        let requested = match parse_prefix_length(&claim.spec.prefix_length) {
            Ok(length) => length,
            Err(e) => {
                report(key, &mut status.conditions, &status::prefix::NOT_ASSIGNED, Some(&e), generation);
                return Ok(ControlFlow::Break(Action::await_change()));
            }
        };

        let literal = claim.spec.parent_prefix.as_deref().filter(|p| !p.is_empty());
        let selector = claim.spec.parent_prefix_selector.as_ref().filter(|s| !s.is_empty());
        if status.selected_parent_prefix.as_deref().is_none_or(str::is_empty) {
            match (literal, selector) {
                (Some(parent), _) => {
                    status.selected_parent_prefix = Some(parent.to_string());
                    let detail = format!("parentPrefix is provided in CR: {}", parent);
                    report(key, &mut status.conditions, &status::prefix::PARENT_SELECTED, Some(&detail), generation);
                }
                (None, Some(selector)) => {
                    // The hash does not cover the parent, so a restorable
                    // prefix skips selection entirely
                    let selected = match resolver.restore_prefix(hash).await {
                        Ok(Some(_)) => Ok(PARENT_NOT_INFERRED.to_string()),
                        Ok(None) => resolver.select_parent_prefix(selector, requested).await.map(|p| p.to_string()),
                        Err(e) => Err(e),
                    };
                    if let ControlFlow::Break(action) = parent_selection_step(key, status, selected, generation)? {
                        return Ok(ControlFlow::Break(action));
                    }
                }
                (None, None) => {
                    let detail = "either parentPrefixSelector or parentPrefix needs to be set";
                    report(key, &mut status.conditions, &status::prefix::PARENT_NOT_SELECTED, Some(&detail), generation);
                    return Ok(ControlFlow::Break(Action::await_change()));
                }
            }
        }

        let parent = status.selected_parent_prefix.clone().unwrap_or_default();
        let step = if parent == PARENT_NOT_INFERRED {
            restored_prefix_step(key, status, resolver.restore_prefix(hash).await, lock_retry, generation)?
        } else {
            let pool = PoolLease {
                lease: lease_name_for_pool(&parent),
                holder: key.to_string(),
            };
            let allocation = resolve_locked(&self.backend, &pool, resolver.resolve_prefix(hash, &parent, requested)).await?;
            prefix_allocation_step(key, status, allocation, literal.is_none(), lock_retry, generation)?
        };
        let resolved = match step {
            ControlFlow::Continue(resolved) => resolved,
            ControlFlow::Break(action) => return Ok(ControlFlow::Break(action)),
        };

        if resolved.restored {
            info!("{}: restored prefix {} from NetBox", key, resolved.value);
        } else {
            info!("{}: assigned new prefix {} from {}", key, resolved.value, parent);
        }

        // The resource reconcile reads the selected parent to re-enter the
        // lease, so it has to be stored before the resource exists
        if selection_unsaved(claim, status) {
            self.patch_status(claim, &*status).await?;
        }

        let resource = prefix_for_claim(
            claim,
            &resolved.value.to_string(),
            &self.config().restoration_hash_field,
            hash,
        )?;
        if let Err(e) = self.create_resource(&resource).await {
            report(key, &mut status.conditions, &status::prefix::NOT_ASSIGNED, Some(&e), generation);
            return Err(e);
        }
        report(key, &mut status.conditions, &status::prefix::ASSIGNED, None, generation);
        Ok(ControlFlow::Continue(resource))
    }
}
