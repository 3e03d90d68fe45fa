//! NetBoxIpAddressClaim Custom Resource Definition

use crate::ipam::common::{CustomFields, TagReference};
use crate::Condition;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Requests a single IP address from a parent prefix
#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[kube(
    group = "dcops.microscaler.io",
    version = "v1alpha1",
    kind = "NetBoxIpAddressClaim",
    namespaced,
    status = "NetBoxIpAddressClaimStatus",
    shortname = "ipc",
    printcolumn = r#"{"name":"IpAddress","type":"string","jsonPath":".status.ipAddress"}"#,
    printcolumn = r#"{"name":"Ready","type":"string","jsonPath":".status.conditions[?(@.type==\"Ready\")].status"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct NetBoxIpAddressClaimSpec {
    /// Parent prefix in CIDR notation. Immutable.
    pub parent_prefix: String,

    /// Tenant name or slug. Immutable.
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
pub struct NetBoxIpAddressClaimStatus {
    /// Assigned address with mask, e.g. "10.0.0.5/32"
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub ip_address: String,

    /// Assigned address without mask
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub ip_address_dot_decimal: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub ip_address_name: String,

    #[serde(default)]
    pub conditions: Vec<Condition>,
}
