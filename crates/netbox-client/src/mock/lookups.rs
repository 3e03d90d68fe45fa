//! Lookup operations for MockNetBoxClient
//!
//! Tenants, sites, VLAN groups and custom field definitions are read-only from
//! the controller's point of view; tests seed them with the `add_*` helpers.

use super::MockNetBoxClient;
use super::helpers::matches_filters;
use crate::error::NetBoxError;
use crate::models::*;

fn name_slug_id(name: &str, slug: &str, id: u64, key: &str) -> Option<Option<String>> {
    match key {
        "name" => Some(Some(name.to_string())),
        "slug" => Some(Some(slug.to_string())),
        "id" => Some(Some(id.to_string())),
        _ => None,
    }
}

pub async fn query_vlan_groups(client: &MockNetBoxClient, filters: &[(&str, &str)], _fetch_all: bool) -> Result<Vec<VlanGroup>, NetBoxError> {
    let empty = serde_json::Value::Null;
    let mut groups: Vec<VlanGroup> = client.vlan_groups
        .lock()
        .unwrap()
        .values()
        .filter(|g| matches_filters(filters, &empty, |key| name_slug_id(&g.name, &g.slug, g.id, key)))
        .cloned()
        .collect();
    groups.sort_by_key(|g| g.id);
    Ok(groups)
}

pub async fn query_tenants(client: &MockNetBoxClient, filters: &[(&str, &str)], _fetch_all: bool) -> Result<Vec<Tenant>, NetBoxError> {
    let empty = serde_json::Value::Null;
    let mut tenants: Vec<Tenant> = client.tenants
        .lock()
        .unwrap()
        .values()
        .filter(|t| matches_filters(filters, &empty, |key| name_slug_id(&t.name, &t.slug, t.id, key)))
        .cloned()
        .collect();
    tenants.sort_by_key(|t| t.id);
    Ok(tenants)
}

pub async fn query_sites(client: &MockNetBoxClient, filters: &[(&str, &str)], _fetch_all: bool) -> Result<Vec<Site>, NetBoxError> {
    let empty = serde_json::Value::Null;
    let mut sites: Vec<Site> = client.sites
        .lock()
        .unwrap()
        .values()
        .filter(|s| matches_filters(filters, &empty, |key| name_slug_id(&s.name, &s.slug, s.id, key)))
        .cloned()
        .collect();
    sites.sort_by_key(|s| s.id);
    Ok(sites)
}

pub async fn query_custom_fields(client: &MockNetBoxClient, filters: &[(&str, &str)], _fetch_all: bool) -> Result<Vec<CustomField>, NetBoxError> {
    let empty = serde_json::Value::Null;
    let mut fields: Vec<CustomField> = client.custom_fields
        .lock()
        .unwrap()
        .values()
        .filter(|f| {
            matches_filters(filters, &empty, |key| match key {
                "name" => Some(Some(f.name.clone())),
                _ => None,
            })
        })
        .cloned()
        .collect();
    fields.sort_by_key(|f| f.id);
    Ok(fields)
}
