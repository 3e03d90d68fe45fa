//! NetBoxPrefix Custom Resource Definition
//!
//! A concrete prefix reserved in NetBox. Usually created and owned by a
//! NetBoxPrefixClaim, but may also be applied directly.

use crate::ipam::common::{CustomFields, NetBoxResourceStatus, TagReference};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// NetBoxPrefixSpec defines the desired state of a NetBox prefix
#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[kube(
    group = "dcops.microscaler.io",
    version = "v1alpha1",
    kind = "NetBoxPrefix",
    namespaced,
    status = "NetBoxResourceStatus",
    printcolumn = r#"{"name":"Prefix","type":"string","jsonPath":".spec.prefix"}"#,
    printcolumn = r#"{"name":"ID","type":"integer","jsonPath":".status.id"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct NetBoxPrefixSpec {
    /// Prefix CIDR (e.g., "192.168.1.0/28"). Immutable once set.
    pub prefix: String,

    /// Site name or slug
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub site: Option<String>,

    /// Tenant name or slug
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

    /// Skip deleting the prefix from NetBox when this resource is deleted
    #[serde(default)]
    pub preserve_in_netbox: bool,
}
