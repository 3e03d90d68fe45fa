//! NetBoxVlan reconciler
//!
//! VLANs lock their VLAN group instead of a prefix.

use super::super::resource::ResourceKind;
use super::super::Reconciler;
use crate::error::ControllerError;
use crate::lease::lease_name_for_vlan_group;
use crate::reservation::{ReservationError, ReserveOutcome, Reserver};
use crate::status::{self, ConditionTemplate};
use async_trait::async_trait;
use crds::{CustomFields, NetBoxResourceStatus, NetBoxVlan, NetBoxVlanClaim};
use netbox_client::{NetBoxClientTrait, NetBoxError};

pub const VLAN_FINALIZER: &str = "dcops.microscaler.io/netbox-vlan-finalizer";

#[async_trait]
impl ResourceKind for NetBoxVlan {
    const KIND: &'static str = "NetBoxVlan";
    const CLAIM_KIND: &'static str = "NetBoxVlanClaim";
    const FINALIZER: &'static str = VLAN_FINALIZER;
    const UI_PATH: &'static str = "ipam/vlans";

    const RESERVED: ConditionTemplate = status::vlan::RESERVED;
    const RESERVE_FAILED: ConditionTemplate = status::vlan::RESERVE_FAILED;
    const DELETE_FAILED: ConditionTemplate = status::vlan::DELETE_FAILED;

    fn resource_status(&self) -> Option<&NetBoxResourceStatus> {
        self.status.as_ref()
    }

    fn preserve_in_netbox(&self) -> bool {
        self.spec.preserve_in_netbox
    }

    fn spec_custom_fields(&self) -> &CustomFields {
        &self.spec.custom_fields
    }

    async fn claim_pool(reconciler: &Reconciler, namespace: &str, claim: &str) -> Result<Option<String>, ControllerError> {
        Ok(reconciler
            .get_opt::<NetBoxVlanClaim>(namespace, claim)
            .await?
            .map(|c| lease_name_for_vlan_group(&c.spec.vlan_group)))
    }

    async fn reserve(&self, reserver: &Reserver<'_>, custom_fields: CustomFields) -> Result<ReserveOutcome, ReservationError> {
        reserver.reserve_vlan(self, custom_fields).await
    }

    async fn delete_from_netbox(netbox: &dyn NetBoxClientTrait, id: u64) -> Result<(), NetBoxError> {
        netbox.delete_vlan(id).await
    }
}
