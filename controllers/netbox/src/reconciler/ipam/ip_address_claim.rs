//! NetBoxIpAddressClaim reconciler

use super::super::claim::{allocation_step, mirror_ready, owner_reference, resolve_locked};
use super::super::{is_being_deleted, namespace_of, object_key, with_restoration_hash, PoolLease, Reconciler};
use crate::allocation::parse_host;
use crate::error::ControllerError;
use crate::lease::lease_name_for_pool;
use crate::restoration::ip_address_claim_hash;
use crate::status::{self, report};
use crds::{
    find_condition, NetBoxIpAddress, NetBoxIpAddressClaim, NetBoxIpAddressClaimStatus, NetBoxIpAddressSpec,
    CONDITION_READY,
};
use kube::{Resource, ResourceExt};
use kube_runtime::controller::Action;
use std::ops::ControlFlow;
use tracing::{debug, info};

pub fn ip_address_spec_for_claim(
    claim: &NetBoxIpAddressClaim,
    address: &str,
    hash_field: &str,
    hash: &str,
) -> NetBoxIpAddressSpec {
    NetBoxIpAddressSpec {
        ip_address: address.to_string(),
        tenant: claim.spec.tenant.clone(),
        description: claim.spec.description.clone(),
        comments: claim.spec.comments.clone(),
        custom_fields: with_restoration_hash(&claim.spec.custom_fields, hash_field, hash),
        tags: claim.spec.tags.clone(),
        preserve_in_netbox: claim.spec.preserve_in_netbox,
    }
}

pub fn ip_address_for_claim(
    claim: &NetBoxIpAddressClaim,
    address: &str,
    hash_field: &str,
    hash: &str,
) -> Result<NetBoxIpAddress, ControllerError> {
    let mut resource = NetBoxIpAddress::new(
        &claim.name_any(),
        ip_address_spec_for_claim(claim, address, hash_field, hash),
    );
    resource.metadata.namespace = claim.namespace();
    resource.metadata.owner_references = Some(vec![owner_reference(claim)?]);
    Ok(resource)
}

/// Copy the assigned address of a ready resource into the claim status
pub fn fill_ip_address_status(status: &mut NetBoxIpAddressClaimStatus, resource: &NetBoxIpAddress) {
    status.ip_address = resource.spec.ip_address.clone();
    status.ip_address_dot_decimal = parse_host(&resource.spec.ip_address)
        .map(|ip| ip.to_string())
        .unwrap_or_default();
    status.ip_address_name = resource.name_any();
}

impl Reconciler {
    pub async fn reconcile_ip_address_claim(&self, claim: &NetBoxIpAddressClaim) -> Result<Action, ControllerError> {
        if is_being_deleted(claim) {
            return Ok(Action::await_change());
        }

        let key = object_key(claim);
        info!("Reconciling NetBoxIpAddressClaim {}", key);

        let mut status = claim.status.clone().unwrap_or_default();
        if find_condition(&status.conditions, CONDITION_READY).is_none() {
            report(&key, &mut status.conditions, &status::NEW_RESOURCE, None, claim.meta().generation);
        }

        let outcome = self.converge_ip_address_claim(claim, &key, &mut status).await;
        if claim.status.as_ref() != Some(&status) {
            self.patch_status(claim, &status).await?;
        }
        outcome
    }

    async fn converge_ip_address_claim(
        &self,
        claim: &NetBoxIpAddressClaim,
        key: &str,
        status: &mut NetBoxIpAddressClaimStatus,
    ) -> Result<Action, ControllerError> {
        let namespace = namespace_of(claim)?;
        let generation = claim.meta().generation;
        let hash = ip_address_claim_hash(claim);
        let hash_field = self.config().restoration_hash_field.clone();

        let resource = match self.get_opt::<NetBoxIpAddress>(&namespace, &claim.name_any()).await? {
            Some(existing) => {
                let mut spec = ip_address_spec_for_claim(claim, &existing.spec.ip_address, &hash_field, &hash);
                spec.tenant = existing.spec.tenant.clone();
                if spec != existing.spec {
                    debug!("{}: updating NetBoxIpAddress spec", key);
                    let mut updated = existing.clone();
                    updated.spec = spec;
                    self.replace(&updated).await?;
                }
                existing
            }
            None => {
                let pool = PoolLease {
                    lease: lease_name_for_pool(&claim.spec.parent_prefix),
                    holder: key.to_string(),
                };
                let resolver = self.backend.resolver();
                let allocation = resolve_locked(
                    &self.backend,
                    &pool,
                    resolver.resolve_ip_address(&hash, &claim.spec.parent_prefix),
                )
                .await?;
                let resolved = match allocation_step(
                    key,
                    &mut status.conditions,
                    allocation,
                    &status::ip_address::NOT_ASSIGNED,
                    self.config().lock_retry,
                    generation,
                )? {
                    ControlFlow::Continue(resolved) => resolved,
                    ControlFlow::Break(action) => return Ok(action),
                };

                if resolved.restored {
                    info!("{}: restored IP {} from NetBox", key, resolved.value);
                } else {
                    info!("{}: assigned new IP {}", key, resolved.value);
                }

                let resource = ip_address_for_claim(claim, &resolved.value.to_string(), &hash_field, &hash)?;
                if let Err(e) = self.create_resource(&resource).await {
                    report(key, &mut status.conditions, &status::ip_address::NOT_ASSIGNED, Some(&e), generation);
                    return Err(e);
                }
                report(key, &mut status.conditions, &status::ip_address::ASSIGNED, None, generation);
                resource
            }
        };

        if mirror_ready(
            key,
            &mut status.conditions,
            resource.status.as_ref(),
            &status::ip_address::CLAIM_READY,
            &status::ip_address::CLAIM_NOT_READY,
            generation,
        ) {
            fill_ip_address_status(status, &resource);
        }
        Ok(Action::await_change())
    }
}
