//! NetBoxIpAddress reconciler

use super::super::resource::ResourceKind;
use super::super::Reconciler;
use crate::error::ControllerError;
use crate::lease::lease_name_for_pool;
use crate::reservation::{ReservationError, ReserveOutcome, Reserver};
use crate::status::{self, ConditionTemplate};
use async_trait::async_trait;
use crds::{CustomFields, NetBoxIpAddress, NetBoxIpAddressClaim, NetBoxResourceStatus};
use netbox_client::{NetBoxClientTrait, NetBoxError};

pub const IP_ADDRESS_FINALIZER: &str = "dcops.microscaler.io/netbox-ipaddress-finalizer";

#[async_trait]
impl ResourceKind for NetBoxIpAddress {
    const KIND: &'static str = "NetBoxIpAddress";
    const CLAIM_KIND: &'static str = "NetBoxIpAddressClaim";
    const FINALIZER: &'static str = IP_ADDRESS_FINALIZER;
    const UI_PATH: &'static str = "ipam/ip-addresses";

    const RESERVED: ConditionTemplate = status::ip_address::RESERVED;
    const RESERVE_FAILED: ConditionTemplate = status::ip_address::RESERVE_FAILED;
    const DELETE_FAILED: ConditionTemplate = status::ip_address::DELETE_FAILED;

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
            .get_opt::<NetBoxIpAddressClaim>(namespace, claim)
            .await?
            .map(|c| lease_name_for_pool(&c.spec.parent_prefix)))
    }

    async fn reserve(&self, reserver: &Reserver<'_>, custom_fields: CustomFields) -> Result<ReserveOutcome, ReservationError> {
        reserver.reserve_ip_address(self, custom_fields).await
    }

    async fn delete_from_netbox(netbox: &dyn NetBoxClientTrait, id: u64) -> Result<(), NetBoxError> {
        netbox.delete_ip_address(id).await
    }
}
