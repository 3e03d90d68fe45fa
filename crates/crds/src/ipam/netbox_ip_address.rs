//! NetBoxIpAddress Custom Resource Definition

use crate::ipam::common::{CustomFields, NetBoxResourceStatus, TagReference};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// A single IP address reserved in NetBox
#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[kube(
    group = "dcops.microscaler.io",
    version = "v1alpha1",
    kind = "NetBoxIpAddress",
    namespaced,
    status = "NetBoxResourceStatus",
    printcolumn = r#"{"name":"IpAddress","type":"string","jsonPath":".spec.ipAddress"}"#,
    printcolumn = r#"{"name":"ID","type":"integer","jsonPath":".status.id"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct NetBoxIpAddressSpec {
    /// Address with host mask, e.g. "10.0.0.5/32". Immutable once set.
    pub ip_address: String,

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
