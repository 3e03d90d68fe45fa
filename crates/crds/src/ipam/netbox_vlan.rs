//! NetBoxVlan Custom Resource Definition
//!
//! A VLAN reserved in a NetBox VLAN group.

use crate::ipam::common::{CustomFields, NetBoxResourceStatus, TagReference};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// NetBoxVlanSpec defines the desired state of a NetBox VLAN
#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[kube(
    group = "dcops.microscaler.io",
    version = "v1alpha1",
    kind = "NetBoxVlan",
    namespaced,
    status = "NetBoxResourceStatus",
    printcolumn = r#"{"name":"VID","type":"integer","jsonPath":".spec.vlanId"}"#,
    printcolumn = r#"{"name":"Group","type":"string","jsonPath":".spec.vlanGroup"}"#,
    printcolumn = r#"{"name":"ID","type":"integer","jsonPath":".status.id"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct NetBoxVlanSpec {
    /// VLAN ID (1-4094). Immutable once set.
    pub vlan_id: u16,

    /// VLAN name
    pub name: String,

    /// VLAN group name or slug. Immutable once set.
    pub vlan_group: String,

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
