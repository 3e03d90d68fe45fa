//! NetBoxVlanClaim reconciler
//!
//! The pool is a VLAN group. An explicit `vlanId` is taken as is when free,
//! otherwise the lowest unused VID in the group is assigned.

use super::super::claim::{allocation_step, mirror_ready, owner_reference, resolve_locked};
use super::super::{is_being_deleted, namespace_of, object_key, with_restoration_hash, PoolLease, Reconciler};
use crate::error::ControllerError;
use crate::lease::lease_name_for_vlan_group;
use crate::restoration::vlan_claim_hash;
use crate::status::{self, report};
use crds::{find_condition, NetBoxVlan, NetBoxVlanClaim, NetBoxVlanClaimStatus, NetBoxVlanSpec, CONDITION_READY};
use kube::{Resource, ResourceExt};
use kube_runtime::controller::Action;
use std::ops::ControlFlow;
use tracing::{debug, info};

/// VLAN name requested by the claim, defaulting to the claim's name
pub fn vlan_name(claim: &NetBoxVlanClaim) -> String {
    claim
        .spec
        .name
        .clone()
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| claim.name_any())
}

pub fn vlan_spec_for_claim(claim: &NetBoxVlanClaim, vid: u16, hash_field: &str, hash: &str) -> NetBoxVlanSpec {
    NetBoxVlanSpec {
        vlan_id: vid,
        name: vlan_name(claim),
        vlan_group: claim.spec.vlan_group.clone(),
        site: claim.spec.site.clone(),
        tenant: claim.spec.tenant.clone(),
        description: claim.spec.description.clone(),
        comments: claim.spec.comments.clone(),
        custom_fields: with_restoration_hash(&claim.spec.custom_fields, hash_field, hash),
        tags: claim.spec.tags.clone(),
        preserve_in_netbox: claim.spec.preserve_in_netbox,
    }
}

pub fn vlan_for_claim(claim: &NetBoxVlanClaim, vid: u16, hash_field: &str, hash: &str) -> Result<NetBoxVlan, ControllerError> {
    let mut resource = NetBoxVlan::new(&claim.name_any(), vlan_spec_for_claim(claim, vid, hash_field, hash));
    resource.metadata.namespace = claim.namespace();
    resource.metadata.owner_references = Some(vec![owner_reference(claim)?]);
    Ok(resource)
}

pub fn fill_vlan_status(status: &mut NetBoxVlanClaimStatus, resource: &NetBoxVlan) {
    status.vlan_id = resource.spec.vlan_id;
    status.vlan_name = resource.spec.name.clone();
    status.vlan_resource_name = resource.name_any();
}

impl Reconciler {
    pub async fn reconcile_vlan_claim(&self, claim: &NetBoxVlanClaim) -> Result<Action, ControllerError> {
        if is_being_deleted(claim) {
            return Ok(Action::await_change());
        }

        let key = object_key(claim);
        info!("Reconciling NetBoxVlanClaim {}", key);

        let mut status = claim.status.clone().unwrap_or_default();
        if find_condition(&status.conditions, CONDITION_READY).is_none() {
            report(&key, &mut status.conditions, &status::NEW_RESOURCE, None, claim.meta().generation);
        }

        let outcome = self.converge_vlan_claim(claim, &key, &mut status).await;
        if claim.status.as_ref() != Some(&status) {
            self.patch_status(claim, &status).await?;
        }
        outcome
    }

    async fn converge_vlan_claim(
        &self,
        claim: &NetBoxVlanClaim,
        key: &str,
        status: &mut NetBoxVlanClaimStatus,
    ) -> Result<Action, ControllerError> {
        let namespace = namespace_of(claim)?;
        let generation = claim.meta().generation;
        let hash = vlan_claim_hash(claim);
        let hash_field = self.config().restoration_hash_field.clone();

        let resource = match self.get_opt::<NetBoxVlan>(&namespace, &claim.name_any()).await? {
            Some(existing) => {
                let mut spec = vlan_spec_for_claim(claim, existing.spec.vlan_id, &hash_field, &hash);
                spec.vlan_group = existing.spec.vlan_group.clone();
                spec.tenant = existing.spec.tenant.clone();
                if spec != existing.spec {
                    debug!("{}: updating NetBoxVlan spec", key);
                    let mut updated = existing.clone();
                    updated.spec = spec;
                    self.replace(&updated).await?;
                }
                existing
            }
            None => {
                let pool = PoolLease {
                    lease: lease_name_for_vlan_group(&claim.spec.vlan_group),
                    holder: key.to_string(),
                };
                let resolver = self.backend.resolver();
                let allocation = resolve_locked(
                    &self.backend,
                    &pool,
                    resolver.resolve_vlan(&hash, &claim.spec.vlan_group, claim.spec.vlan_id),
                )
                .await?;
                let resolved = match allocation_step(
                    key,
                    &mut status.conditions,
                    allocation,
                    &status::vlan::NOT_ASSIGNED,
                    self.config().lock_retry,
                    generation,
                )? {
                    ControlFlow::Continue(resolved) => resolved,
                    ControlFlow::Break(action) => return Ok(action),
                };

                if resolved.restored {
                    info!("{}: restored VLAN {} in group {}", key, resolved.value, claim.spec.vlan_group);
                } else {
                    info!("{}: assigned VLAN {} in group {}", key, resolved.value, claim.spec.vlan_group);
                }

                let resource = vlan_for_claim(claim, resolved.value, &hash_field, &hash)?;
                if let Err(e) = self.create_resource(&resource).await {
                    report(key, &mut status.conditions, &status::vlan::NOT_ASSIGNED, Some(&e), generation);
                    return Err(e);
                }
                report(key, &mut status.conditions, &status::vlan::ASSIGNED, None, generation);
                resource
            }
        };

        if mirror_ready(
            key,
            &mut status.conditions,
            resource.status.as_ref(),
            &status::vlan::CLAIM_READY,
            &status::vlan::CLAIM_NOT_READY,
            generation,
        ) {
            fill_vlan_status(status, &resource);
        }
        Ok(Action::await_change())
    }
}
