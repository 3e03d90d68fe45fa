//! NetBoxIpRange Custom Resource Definition

use crate::ipam::common::{CustomFields, NetBoxResourceStatus, TagReference};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// A consecutive address range reserved in NetBox
#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[kube(
    group = "dcops.microscaler.io",
    version = "v1alpha1",
    kind = "NetBoxIpRange",
    namespaced,
    status = "NetBoxResourceStatus",
    printcolumn = r#"{"name":"Start","type":"string","jsonPath":".spec.startAddress"}"#,
    printcolumn = r#"{"name":"End","type":"string","jsonPath":".spec.endAddress"}"#,
    printcolumn = r#"{"name":"ID","type":"integer","jsonPath":".status.id"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct NetBoxIpRangeSpec {
    /// First address with host mask. Immutable once set.
    pub start_address: String,

    /// Last address with host mask. Immutable once set.
    pub end_address: String,

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
