//! NetBoxIpRangeClaim reconciler

use super::super::claim::{allocation_step, mirror_ready, owner_reference, resolve_locked, Allocation};
use super::super::{is_being_deleted, namespace_of, object_key, with_restoration_hash, PoolLease, Reconciler};
use crate::allocation::{expand_range, host_prefix, parse_host, parse_prefix};
use crate::claim_resolution::ResolutionError;
use crate::error::ControllerError;
use crate::lease::lease_name_for_pool;
use crate::restoration::ip_range_claim_hash;
use crate::status::{self, report, ConditionTemplate};
use crds::{
    find_condition, NetBoxIpRange, NetBoxIpRangeClaim, NetBoxIpRangeClaimStatus, NetBoxIpRangeSpec, CONDITION_READY,
};
use kube::{Resource, ResourceExt};
use kube_runtime::controller::Action;
use std::net::IpAddr;
use std::ops::ControlFlow;
use tracing::{debug, info};

pub fn ip_range_spec_for_claim(
    claim: &NetBoxIpRangeClaim,
    start_address: &str,
    end_address: &str,
    hash_field: &str,
    hash: &str,
) -> NetBoxIpRangeSpec {
    NetBoxIpRangeSpec {
        start_address: start_address.to_string(),
        end_address: end_address.to_string(),
        tenant: claim.spec.tenant.clone(),
        description: claim.spec.description.clone(),
        comments: claim.spec.comments.clone(),
        custom_fields: with_restoration_hash(&claim.spec.custom_fields, hash_field, hash),
        tags: claim.spec.tags.clone(),
        preserve_in_netbox: claim.spec.preserve_in_netbox,
    }
}

pub fn ip_range_for_claim(
    claim: &NetBoxIpRangeClaim,
    (start, end): (IpAddr, IpAddr),
    hash_field: &str,
    hash: &str,
) -> Result<NetBoxIpRange, ControllerError> {
    let spec = ip_range_spec_for_claim(
        claim,
        &host_prefix(start).to_string(),
        &host_prefix(end).to_string(),
        hash_field,
        hash,
    );
    let mut resource = NetBoxIpRange::new(&claim.name_any(), spec);
    resource.metadata.namespace = claim.namespace();
    resource.metadata.owner_references = Some(vec![owner_reference(claim)?]);
    Ok(resource)
}

/// Copy the range of a ready resource into the claim status, including
/// every address in the range
pub fn fill_ip_range_status(status: &mut NetBoxIpRangeClaimStatus, resource: &NetBoxIpRange) {
    let spec = &resource.spec;
    status.start_address = spec.start_address.clone();
    status.end_address = spec.end_address.clone();
    status.ip_range = format!("{}-{}", spec.start_address, spec.end_address);
    status.ip_range_name = resource.name_any();

    if let (Ok(start), Ok(end)) = (parse_host(&spec.start_address), parse_host(&spec.end_address)) {
        let mask = parse_prefix(&spec.start_address)
            .map(|net| format!("/{}", net.prefix_len()))
            .unwrap_or_default();
        let addresses = expand_range(start, end);

        status.start_address_dot_decimal = start.to_string();
        status.end_address_dot_decimal = end.to_string();
        status.ip_range_dot_decimal = format!("{}-{}", start, end);
        status.ip_addresses = addresses.iter().map(|ip| format!("{}{}", ip, mask)).collect();
        status.ip_addresses_dot_decimal = addresses.iter().map(ToString::to_string).collect();
    }
}

/// A restored range of the wrong size gets its own reason
fn range_failure_template<T>(allocation: &Allocation<T>) -> &'static ConditionTemplate {
    match allocation {
        Allocation::Failed(ResolutionError::SizeMismatch { .. }) => &status::ip_range::SIZE_MISMATCH,
        _ => &status::ip_range::NOT_ASSIGNED,
    }
}

impl Reconciler {
    pub async fn reconcile_ip_range_claim(&self, claim: &NetBoxIpRangeClaim) -> Result<Action, ControllerError> {
        if is_being_deleted(claim) {
            return Ok(Action::await_change());
        }

        let key = object_key(claim);
        info!("Reconciling NetBoxIpRangeClaim {}", key);

        let mut status = claim.status.clone().unwrap_or_default();
        if find_condition(&status.conditions, CONDITION_READY).is_none() {
            report(&key, &mut status.conditions, &status::NEW_RESOURCE, None, claim.meta().generation);
        }

        let outcome = self.converge_ip_range_claim(claim, &key, &mut status).await;
        if claim.status.as_ref() != Some(&status) {
            self.patch_status(claim, &status).await?;
        }
        outcome
    }

    async fn converge_ip_range_claim(
        &self,
        claim: &NetBoxIpRangeClaim,
        key: &str,
        status: &mut NetBoxIpRangeClaimStatus,
    ) -> Result<Action, ControllerError> {
        let namespace = namespace_of(claim)?;
        let generation = claim.meta().generation;
        let hash = ip_range_claim_hash(claim);
        let hash_field = self.config().restoration_hash_field.clone();

        let resource = match self.get_opt::<NetBoxIpRange>(&namespace, &claim.name_any()).await? {
            Some(existing) => {
                let mut spec = ip_range_spec_for_claim(
                    claim,
                    &existing.spec.start_address,
                    &existing.spec.end_address,
                    &hash_field,
                    &hash,
                );
                spec.tenant = existing.spec.tenant.clone();
                if spec != existing.spec {
                    debug!("{}: updating NetBoxIpRange spec", key);
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
                    resolver.resolve_ip_range(&hash, &claim.spec.parent_prefix, claim.spec.size),
                )
                .await?;
                let template = range_failure_template(&allocation);
                let resolved = match allocation_step(
                    key,
                    &mut status.conditions,
                    allocation,
                    template,
                    self.config().lock_retry,
                    generation,
                )? {
                    ControlFlow::Continue(resolved) => resolved,
                    ControlFlow::Break(action) => return Ok(action),
                };

                let (start, end) = resolved.value;
                if resolved.restored {
                    info!("{}: restored IP range {}-{} from NetBox", key, start, end);
                } else {
                    info!("{}: assigned new IP range {}-{}", key, start, end);
                }

                let resource = ip_range_for_claim(claim, resolved.value, &hash_field, &hash)?;
                if let Err(e) = self.create_resource(&resource).await {
                    report(key, &mut status.conditions, &status::ip_range::NOT_ASSIGNED, Some(&e), generation);
                    return Err(e);
                }
                report(key, &mut status.conditions, &status::ip_range::ASSIGNED, None, generation);
                resource
            }
        };

        if mirror_ready(
            key,
            &mut status.conditions,
            resource.status.as_ref(),
            &status::ip_range::CLAIM_READY,
            &status::ip_range::CLAIM_NOT_READY,
            generation,
        ) {
            fill_ip_range_status(status, &resource);
        }
        Ok(Action::await_change())
    }
}
