//! Helper functions for building NetBox models and matching query filters

use crate::models::*;
use std::collections::BTreeMap;
use std::net::IpAddr;

/// Helper functions for creating model instances in mock implementations and tests
#[derive(Debug, Clone)]
pub struct Helpers {
    base_url: String,
}

impl Helpers {
    pub fn new(base_url: String) -> Self {
        Self { base_url }
    }

    /// Build a prefix with no custom fields
    pub fn prefix(&self, id: u64, prefix: &str) -> Prefix {
        Prefix {
            id,
            url: format!("{}/api/ipam/prefixes/{}/", self.base_url, id),
            display: prefix.to_string(),
            family: family_of(prefix),
            prefix: prefix.to_string(),
            site: None,
            scope_id: None,
            tenant: None,
            status: Some(status_choice("active")),
            description: String::new(),
            comments: String::new(),
            tags: Vec::new(),
            custom_fields: serde_json::json!({}),
        }
    }

    /// Build an IP address with no custom fields
    pub fn ip_address(&self, id: u64, address: &str) -> IPAddress {
        IPAddress {
            id,
            url: format!("{}/api/ipam/ip-addresses/{}/", self.base_url, id),
            display: address.to_string(),
            family: family_of(address),
            address: address.to_string(),
            tenant: None,
            status: Some(status_choice("active")),
            description: String::new(),
            comments: String::new(),
            tags: Vec::new(),
            custom_fields: serde_json::json!({}),
        }
    }

    /// Build an IP range; `size` is derived from the two addresses
    pub fn ip_range(&self, id: u64, start_address: &str, end_address: &str) -> IpRange {
        IpRange {
            id,
            url: format!("{}/api/ipam/ip-ranges/{}/", self.base_url, id),
            display: format!("{}-{}", start_address, end_address),
            family: family_of(start_address),
            start_address: start_address.to_string(),
            end_address: end_address.to_string(),
            size: range_size(start_address, end_address),
            tenant: None,
            status: Some(status_choice("active")),
            mark_populated: false,
            description: String::new(),
            comments: String::new(),
            tags: Vec::new(),
            custom_fields: serde_json::json!({}),
        }
    }

    pub fn vlan(&self, id: u64, vid: u16, name: &str, group: Option<&VlanGroup>) -> Vlan {
        Vlan {
            id,
            url: format!("{}/api/ipam/vlans/{}/", self.base_url, id),
            display: name.to_string(),
            site: None,
            group: group.map(|g| NestedVlanGroup {
                id: g.id,
                url: g.url.clone(),
                display: g.display.clone(),
                name: g.name.clone(),
                slug: g.slug.clone(),
            }),
            vid,
            name: name.to_string(),
            tenant: None,
            status: Some(status_choice("active")),
            description: String::new(),
            comments: String::new(),
            tags: Vec::new(),
            custom_fields: serde_json::json!({}),
        }
    }

    pub fn vlan_group(&self, id: u64, name: &str) -> VlanGroup {
        VlanGroup {
            id,
            url: format!("{}/api/ipam/vlan-groups/{}/", self.base_url, id),
            display: name.to_string(),
            name: name.to_string(),
            slug: slugify(name),
        }
    }

    pub fn tenant(&self, id: u64, name: &str) -> Tenant {
        Tenant {
            id,
            url: format!("{}/api/tenancy/tenants/{}/", self.base_url, id),
            display: name.to_string(),
            name: name.to_string(),
            slug: slugify(name),
        }
    }

    pub fn site(&self, id: u64, name: &str) -> Site {
        Site {
            id,
            url: format!("{}/api/dcim/sites/{}/", self.base_url, id),
            display: name.to_string(),
            name: name.to_string(),
            slug: slugify(name),
        }
    }

    pub fn custom_field(&self, id: u64, name: &str) -> CustomField {
        CustomField {
            id,
            name: name.to_string(),
            label: name.to_string(),
            display: name.to_string(),
        }
    }

    pub(crate) fn nested_tenant(&self, tenants: &[Tenant], id: Option<u64>) -> Option<NestedTenant> {
        let tenant = tenants.iter().find(|t| Some(t.id) == id)?;
        Some(NestedTenant {
            id: tenant.id,
            url: tenant.url.clone(),
            display: tenant.display.clone(),
            name: tenant.name.clone(),
            slug: tenant.slug.clone(),
        })
    }

    pub(crate) fn nested_site(&self, sites: &[Site], id: Option<u64>) -> Option<NestedSite> {
        let site = sites.iter().find(|s| Some(s.id) == id)?;
        Some(NestedSite {
            id: site.id,
            url: site.url.clone(),
            display: site.display.clone(),
            name: site.name.clone(),
            slug: site.slug.clone(),
        })
    }

    pub(crate) fn nested_tags(&self, tags: &[WritableTag]) -> Vec<NestedTag> {
        tags.iter()
            .enumerate()
            .map(|(i, t)| {
                let name = t.name.clone().or_else(|| t.slug.clone()).unwrap_or_default();
                NestedTag {
                    id: i as u64 + 1,
                    url: format!("{}/api/extras/tags/{}/", self.base_url, i + 1),
                    display: name.clone(),
                    slug: t.slug.clone().unwrap_or_else(|| slugify(&name)),
                    name,
                }
            })
            .collect()
    }
}

pub(crate) fn status_choice(value: &str) -> Choice<String> {
    let mut label = value.to_string();
    if let Some(first) = label.get_mut(0..1) {
        first.make_ascii_uppercase();
    }
    Choice { value: value.to_string(), label }
}

pub(crate) fn family_of(address: &str) -> Choice<u8> {
    if address.contains(':') {
        Choice { value: 6, label: "IPv6".to_string() }
    } else {
        Choice { value: 4, label: "IPv4".to_string() }
    }
}

fn slugify(name: &str) -> String {
    name.to_lowercase().replace(' ', "-")
}

/// Parse the host part of "addr" or "addr/len"
pub(crate) fn host(address: &str) -> Option<IpAddr> {
    address.split('/').next()?.parse().ok()
}

pub(crate) fn host_value(address: &str) -> Option<u128> {
    match host(address)? {
        IpAddr::V4(v4) => Some(u128::from(u32::from(v4))),
        IpAddr::V6(v6) => Some(u128::from(v6)),
    }
}

pub(crate) fn range_size(start: &str, end: &str) -> u64 {
    match (host_value(start), host_value(end)) {
        (Some(s), Some(e)) if e >= s => u64::try_from(e - s + 1).unwrap_or(u64::MAX),
        _ => 0,
    }
}

/// Render custom fields the way NetBox returns them
pub(crate) fn custom_fields_json(fields: &BTreeMap<String, String>) -> serde_json::Value {
    serde_json::Value::Object(
        fields
            .iter()
            .map(|(k, v)| (k.clone(), serde_json::Value::String(v.clone())))
            .collect(),
    )
}

/// PATCH semantics: supplied keys overwrite, others are retained
pub(crate) fn merge_custom_fields(existing: &mut serde_json::Value, fields: &BTreeMap<String, String>) {
    if !existing.is_object() {
        *existing = serde_json::json!({});
    }
    if let Some(obj) = existing.as_object_mut() {
        for (k, v) in fields {
            obj.insert(k.clone(), serde_json::Value::String(v.clone()));
        }
    }
}

/// Evaluate NetBox-style query filters against a model.
///
/// `field` maps a filter key to the model's value for it and returns `None`
/// for keys the mock does not model; those filters are ignored. `cf_<name>`
/// filters compare against the custom fields.
pub(crate) fn matches_filters<F>(
    filters: &[(&str, &str)],
    custom_fields: &serde_json::Value,
    field: F,
) -> bool
where
    F: Fn(&str) -> Option<Option<String>>,
{
    filters.iter().all(|(key, value)| {
        if let Some(cf_name) = key.strip_prefix("cf_") {
            return custom_field_value(custom_fields, cf_name).as_deref() == Some(*value);
        }
        match field(key) {
            Some(actual) => actual.as_deref() == Some(*value),
            None => true,
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_range_size() {
        assert_eq!(range_size("10.0.0.5/32", "10.0.0.7/32"), 3);
        assert_eq!(range_size("2001:db8::1/128", "2001:db8::1/128"), 1);
        assert_eq!(range_size("10.0.0.7/32", "10.0.0.5/32"), 0);
    }

    #[test]
    fn test_matches_filters_custom_fields() {
        let cf = serde_json::json!({"hash": "abc"});
        assert!(matches_filters(&[("cf_hash", "abc")], &cf, |_| None));
        assert!(!matches_filters(&[("cf_hash", "xyz")], &cf, |_| None));
        assert!(!matches_filters(&[("cf_missing", "abc")], &cf, |_| None));
    }

    #[test]
    fn test_matches_filters_ignores_unknown_keys() {
        let cf = serde_json::json!({});
        let field = |k: &str| match k {
            "prefix" => Some(Some("10.0.0.0/24".to_string())),
            _ => None,
        };
        assert!(matches_filters(&[("prefix", "10.0.0.0/24"), ("limit", "5")], &cf, field));
        assert!(!matches_filters(&[("prefix", "10.0.1.0/24")], &cf, field));
    }
}
