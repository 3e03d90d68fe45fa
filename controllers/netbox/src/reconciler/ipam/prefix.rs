//! NetBoxPrefix reconciler

use super::super::resource::ResourceKind;
use super::super::Reconciler;
use super::prefix_claim::PARENT_NOT_INFERRED;
use crate::error::ControllerError;
use crate::lease::lease_name_for_pool;
use crate::reservation::{ReservationError, ReserveOutcome, Reserver};
use crate::status::{self, ConditionTemplate};
use async_trait::async_trait;
use crds::{CustomFields, NetBoxPrefix, NetBoxPrefixClaim, NetBoxResourceStatus};
use netbox_client::{NetBoxClientTrait, NetBoxError};

pub const PREFIX_FINALIZER: &str = "dcops.microscaler.io/netbox-prefix-finalizer";

#[async_trait]
impl ResourceKind for NetBoxPrefix {
    const KIND: &'static str = "NetBoxPrefix";
    const CLAIM_KIND: &'static str = "NetBoxPrefixClaim";
    const FINALIZER: &'static str = PREFIX_FINALIZER;
    const UI_PATH: &'static str = "ipam/prefixes";

    const RESERVED: ConditionTemplate = status::prefix::RESERVED;
    const RESERVE_FAILED: ConditionTemplate = status::prefix::RESERVE_FAILED;
    const DELETE_FAILED: ConditionTemplate = status::prefix::DELETE_FAILED;

    fn resource_status(&self) -> Option<&NetBoxResourceStatus> {
        self.status.as_ref()
    }

    fn preserve_in_netbox(&self) -> bool {
        self.spec.preserve_in_netbox
    }

    fn spec_custom_fields(&self) -> &CustomFields {
        &self.spec.custom_fields
    }

    /// The claim's selected parent. A prefix restored without knowing its
    /// parent is written without a lease.
    async fn claim_pool(reconciler: &Reconciler, namespace: &str, claim: &str) -> Result<Option<String>, ControllerError> {
        let Some(claim) = reconciler.get_opt::<NetBoxPrefixClaim>(namespace, claim).await? else {
            return Ok(None);
        };
        let selected = claim
            .status
            .as_ref()
            .and_then(|s| s.selected_parent_prefix.clone())
            .filter(|s| !s.is_empty())
            .or(claim.spec.parent_prefix);
        Ok(selected
            .filter(|p| !p.is_empty() && p != PARENT_NOT_INFERRED)
            .map(|p| lease_name_for_pool(&p)))
    }

    async fn reserve(&self, reserver: &Reserver<'_>, custom_fields: CustomFields) -> Result<ReserveOutcome, ReservationError> {
        reserver.reserve_prefix(self, custom_fields).await
    }

    async fn delete_from_netbox(netbox: &dyn NetBoxClientTrait, id: u64) -> Result<(), NetBoxError> {
        netbox.delete_prefix(id).await
    }
}
