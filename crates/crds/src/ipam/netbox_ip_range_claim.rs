//! NetBoxIpRangeClaim Custom Resource Definition
//!
//! Requests `size` consecutive addresses out of a parent prefix.

use crate::ipam::common::{CustomFields, TagReference};
use crate::Condition;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[kube(
    group = "dcops.microscaler.io",
    version = "v1alpha1",
    kind = "NetBoxIpRangeClaim",
    namespaced,
    status = "NetBoxIpRangeClaimStatus",
    shortname = "iprc",
    printcolumn = r#"{"name":"IpRange","type":"string","jsonPath":".status.ipRange"}"#,
    printcolumn = r#"{"name":"Ready","type":"string","jsonPath":".status.conditions[?(@.type==\"Ready\")].status"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct NetBoxIpRangeClaimSpec {
    /// Parent prefix in CIDR notation. Immutable.
    pub parent_prefix: String,

    /// Number of consecutive addresses, 2 to 50. Immutable.
    #[schemars(range(min = 2, max = 50))]
    pub size: u32,

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
pub struct NetBoxIpRangeClaimStatus {
    /// "start/mask-end/mask"
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub ip_range: String,

    /// "start-end" without masks
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub ip_range_dot_decimal: String,

    /// Every address in the range, with mask
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ip_addresses: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ip_addresses_dot_decimal: Vec<String>,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub start_address: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub start_address_dot_decimal: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub end_address: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub end_address_dot_decimal: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub ip_range_name: String,

    #[serde(default)]
    pub conditions: Vec<Condition>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube::CustomResourceExt;

    #[test]
    fn test_size_is_bounded_in_schema() {
        let crd = serde_json::to_value(NetBoxIpRangeClaim::crd()).unwrap();
        let size = &crd["spec"]["versions"][0]["schema"]["openAPIV3Schema"]["properties"]["spec"]["properties"]["size"];
        assert_eq!(size["minimum"].as_f64(), Some(2.0), "{}", size);
        assert_eq!(size["maximum"].as_f64(), Some(50.0), "{}", size);
    }
}
