//! Types shared by all IPAM claim and resource specs

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Custom field values pushed to NetBox, keyed by custom field name
pub type CustomFields = BTreeMap<String, String>;

/// Reference to an existing NetBox tag, by name or slug
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct TagReference {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slug: Option<String>,
}

/// Status block common to every backend-facing resource
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NetBoxResourceStatus {
    /// NetBox object ID (0 until the object has been reserved)
    #[serde(default)]
    pub id: u64,

    /// Link to the object in the NetBox UI
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub url: String,

    #[serde(default)]
    pub conditions: Vec<crate::Condition>,
}
