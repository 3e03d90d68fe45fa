//! NetBox API models
//!
//! Read models match the NetBox REST API serializers closely enough for the
//! IPAM controller; unknown fields are ignored. Writable payloads carry custom
//! fields as a typed string map, the untyped JSON representation stays inside
//! this crate.
//! See: netbox/netbox/ipam/api/serializers_/ip.py

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Choice field as returned by NetBox, e.g. `{"value": "active", "label": "Active"}`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Choice<T> {
    pub value: T,
    #[serde(default)]
    pub label: String,
}

/// Lookup of a single custom field in NetBox's untyped `custom_fields` object.
///
/// Strings are returned as-is, numbers and booleans are rendered, `null` and
/// missing keys yield `None`.
pub fn custom_field_value(custom_fields: &serde_json::Value, name: &str) -> Option<String> {
    match custom_fields.get(name)? {
        serde_json::Value::Null => None,
        serde_json::Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// Prefix model matching NetBox PrefixSerializer
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Prefix {
    pub id: u64,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub display: String,
    pub family: Choice<u8>,
    pub prefix: String, // e.g., "192.168.1.0/24"
    /// Site on NetBox < 4.2
    #[serde(default)]
    pub site: Option<NestedSite>,
    /// Scope object ID on NetBox >= 4.2
    #[serde(default)]
    pub scope_id: Option<u64>,
    #[serde(default)]
    pub tenant: Option<NestedTenant>,
    #[serde(default)]
    pub status: Option<Choice<String>>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub comments: String,
    #[serde(default)]
    pub tags: Vec<NestedTag>,
    #[serde(default)]
    pub custom_fields: serde_json::Value,
}

impl Prefix {
    pub fn custom_field(&self, name: &str) -> Option<String> {
        custom_field_value(&self.custom_fields, name)
    }
}

/// IP Address model matching NetBox IPAddressSerializer
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct IPAddress {
    pub id: u64,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub display: String,
    pub family: Choice<u8>,
    pub address: String, // e.g., "192.168.1.1/32"
    #[serde(default)]
    pub tenant: Option<NestedTenant>,
    #[serde(default)]
    pub status: Option<Choice<String>>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub comments: String,
    #[serde(default)]
    pub tags: Vec<NestedTag>,
    #[serde(default)]
    pub custom_fields: serde_json::Value,
}

impl IPAddress {
    pub fn custom_field(&self, name: &str) -> Option<String> {
        custom_field_value(&self.custom_fields, name)
    }
}

/// IP Range model matching NetBox IPRangeSerializer
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct IpRange {
    pub id: u64,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub display: String,
    pub family: Choice<u8>,
    pub start_address: String,
    pub end_address: String,
    /// Number of addresses in the range, computed by NetBox
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub tenant: Option<NestedTenant>,
    #[serde(default)]
    pub status: Option<Choice<String>>,
    #[serde(default)]
    pub mark_populated: bool,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub comments: String,
    #[serde(default)]
    pub tags: Vec<NestedTag>,
    #[serde(default)]
    pub custom_fields: serde_json::Value,
}

impl IpRange {
    pub fn custom_field(&self, name: &str) -> Option<String> {
        custom_field_value(&self.custom_fields, name)
    }
}

/// Available IP Address (from prefix available-ips endpoint)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct AvailableIP {
    pub family: u8,
    pub address: String, // e.g., "192.168.1.1/24"
}

/// Available prefix (from prefix available-prefixes endpoint)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct AvailablePrefix {
    pub family: u8,
    pub prefix: String, // e.g., "192.168.1.64/26"
}

/// VLAN model (from IPAM API)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Vlan {
    pub id: u64,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub display: String,
    #[serde(default)]
    pub site: Option<NestedSite>,
    #[serde(default)]
    pub group: Option<NestedVlanGroup>,
    pub vid: u16,
    pub name: String,
    #[serde(default)]
    pub tenant: Option<NestedTenant>,
    #[serde(default)]
    pub status: Option<Choice<String>>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub comments: String,
    #[serde(default)]
    pub tags: Vec<NestedTag>,
    #[serde(default)]
    pub custom_fields: serde_json::Value,
}

impl Vlan {
    pub fn custom_field(&self, name: &str) -> Option<String> {
        custom_field_value(&self.custom_fields, name)
    }
}

/// VLAN group model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VlanGroup {
    pub id: u64,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub display: String,
    pub name: String,
    pub slug: String,
}

/// Tenant model (from tenancy API)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tenant {
    pub id: u64,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub display: String,
    pub name: String,
    pub slug: String,
}

/// Site model (from DCIM API)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Site {
    pub id: u64,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub display: String,
    pub name: String,
    pub slug: String,
}

/// Custom field definition (from extras API)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomField {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub display: String,
}

// Nested serializers (simplified versions for references)

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NestedTenant {
    pub id: u64,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub display: String,
    pub name: String,
    pub slug: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NestedSite {
    pub id: u64,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub display: String,
    pub name: String,
    pub slug: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NestedVlanGroup {
    pub id: u64,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub display: String,
    pub name: String,
    pub slug: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NestedTag {
    pub id: u64,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub display: String,
    pub name: String,
    pub slug: String,
}

/// Tag reference in a write payload; NetBox resolves it by name or slug
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct WritableTag {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub slug: Option<String>,
}

/// Request body for creating or updating a prefix
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct WritablePrefix {
    pub prefix: String,
    pub status: String,
    /// Site ID; sent as `site` to NetBox < 4.2 and as a `dcim.site` scope otherwise
    #[serde(skip)]
    pub site: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tenant: Option<u64>,
    pub description: String,
    pub comments: String,
    pub custom_fields: BTreeMap<String, String>,
    pub tags: Vec<WritableTag>,
}

/// Request body for creating or updating an IP address
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct WritableIPAddress {
    pub address: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tenant: Option<u64>,
    pub description: String,
    pub comments: String,
    pub custom_fields: BTreeMap<String, String>,
    pub tags: Vec<WritableTag>,
}

/// Request body for creating or updating an IP range
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct WritableIpRange {
    pub start_address: String,
    pub end_address: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tenant: Option<u64>,
    pub mark_populated: bool,
    pub description: String,
    pub comments: String,
    pub custom_fields: BTreeMap<String, String>,
    pub tags: Vec<WritableTag>,
}

/// Request body for creating or updating a VLAN
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct WritableVlan {
    pub vid: u16,
    pub name: String,
    pub status: String,
    pub group: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub site: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tenant: Option<u64>,
    pub description: String,
    pub comments: String,
    pub custom_fields: BTreeMap<String, String>,
    pub tags: Vec<WritableTag>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_custom_field_value_renders_scalars() {
        let fields = serde_json::json!({
            "hash": "abc",
            "count": 3,
            "enabled": true,
            "unset": null,
        });
        assert_eq!(custom_field_value(&fields, "hash").as_deref(), Some("abc"));
        assert_eq!(custom_field_value(&fields, "count").as_deref(), Some("3"));
        assert_eq!(custom_field_value(&fields, "enabled").as_deref(), Some("true"));
        assert_eq!(custom_field_value(&fields, "unset"), None);
        assert_eq!(custom_field_value(&fields, "missing"), None);
    }

    #[test]
    fn test_prefix_deserializes_netbox_payload() {
        let body = serde_json::json!({
            "id": 12,
            "url": "http://netbox/api/ipam/prefixes/12/",
            "display": "10.0.0.0/28",
            "family": {"value": 4, "label": "IPv4"},
            "prefix": "10.0.0.0/28",
            "status": {"value": "active", "label": "Active"},
            "tenant": null,
            "custom_fields": {"netboxOperatorRestorationHash": "deadbeef"},
            "unknown_field": 1,
        });
        let prefix: Prefix = serde_json::from_value(body).unwrap();
        assert_eq!(prefix.family.value, 4);
        assert_eq!(prefix.custom_field("netboxOperatorRestorationHash").as_deref(), Some("deadbeef"));
        assert!(prefix.tags.is_empty());
    }

    #[test]
    fn test_writable_prefix_skips_site() {
        let payload = WritablePrefix {
            prefix: "10.0.0.0/28".to_string(),
            status: "active".to_string(),
            site: Some(3),
            ..Default::default()
        };
        let value = serde_json::to_value(&payload).unwrap();
        assert!(value.get("site").is_none());
        assert!(value.get("tenant").is_none());
    }
}
