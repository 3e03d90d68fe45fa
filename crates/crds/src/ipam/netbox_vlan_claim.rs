//! NetBoxVlanClaim Custom Resource Definition
//!
//! Requests a VLAN ID from a NetBox VLAN group, either a specific one or the
//! lowest free ID.

use crate::ipam::common::{CustomFields, TagReference};
use crate::Condition;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[kube(
    group = "dcops.microscaler.io",
    version = "v1alpha1",
    kind = "NetBoxVlanClaim",
    namespaced,
    status = "NetBoxVlanClaimStatus",
    shortname = "vlc",
    printcolumn = r#"{"name":"VID","type":"integer","jsonPath":".status.vlanId"}"#,
    printcolumn = r#"{"name":"Ready","type":"string","jsonPath":".status.conditions[?(@.type==\"Ready\")].status"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct NetBoxVlanClaimSpec {
    /// VLAN group acting as the pool. Immutable.
    pub vlan_group: String,

    /// Explicit VLAN ID (1-4094). The lowest free ID is taken when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vlan_id: Option<u16>,

    /// VLAN name in NetBox, defaults to the claim name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub site: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comments: Option<String>,

    #[serde(default)]
    pub custom_fields: CustomFields,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<TagReference>,

    #[serde(default)]
    pub preserve_in_netbox: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NetBoxVlanClaimStatus {
    /// Assigned VLAN ID (0 until assigned)
    #[serde(default)]
    pub vlan_id: u16,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub vlan_name: String,

    /// Name of the NetBoxVlan resource owned by this claim
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub vlan_resource_name: String,

    #[serde(default)]
    pub conditions: Vec<Condition>,
}
