//! NetBoxPrefixClaim Custom Resource Definition
//!
//! Requests a child prefix of a given length from a parent prefix. The parent is
//! either named directly or selected from NetBox by attributes.

use crate::ipam::common::{CustomFields, TagReference};
use crate::Condition;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// NetBoxPrefixClaimSpec defines the requested prefix
#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[kube(
    group = "dcops.microscaler.io",
    version = "v1alpha1",
    kind = "NetBoxPrefixClaim",
    namespaced,
    status = "NetBoxPrefixClaimStatus",
    shortname = "pxc",
    printcolumn = r#"{"name":"Prefix","type":"string","jsonPath":".status.prefix"}"#,
    printcolumn = r#"{"name":"Ready","type":"string","jsonPath":".status.conditions[?(@.type==\"Ready\")].status"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct NetBoxPrefixClaimSpec {
    /// Parent prefix to allocate from (e.g. "10.0.0.0/16"). Immutable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_prefix: Option<String>,

    /// Attributes used to pick a parent prefix when `parentPrefix` is not set.
    /// Keys `tenant`, `site` and `family` are built in, everything else is
    /// matched against NetBox custom fields. Immutable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_prefix_selector: Option<BTreeMap<String, String>>,

    /// Requested prefix length including the slash, e.g. "/28". Immutable.
    pub prefix_length: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub site: Option<String>,

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

    /// Keep the prefix in NetBox when the claim is deleted
    #[serde(default)]
    pub preserve_in_netbox: bool,
}

/// NetBoxPrefixClaimStatus defines the observed state of the claim
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NetBoxPrefixClaimStatus {
    /// Assigned prefix in CIDR notation
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub prefix: String,

    /// Name of the NetBoxPrefix resource owned by this claim
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub prefix_name: String,

    /// Parent prefix the allocation was taken from. Serialized as null when
    /// unset so a merge patch clears a previous selection.
    #[serde(default)]
    pub selected_parent_prefix: Option<String>,

    #[serde(default)]
    pub conditions: Vec<Condition>,
}
