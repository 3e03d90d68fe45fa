//! IPAM operations for MockNetBoxClient
//!
//! Handles prefixes, IP addresses, IP ranges and VLANs

use super::MockNetBoxClient;
use super::helpers::{
    custom_fields_json, family_of, host, host_value, matches_filters, merge_custom_fields,
    range_size, status_choice,
};
use crate::error::NetBoxError;
use crate::models::*;

fn tenants(client: &MockNetBoxClient) -> Vec<Tenant> {
    client.tenants.lock().unwrap().values().cloned().collect()
}

fn sites(client: &MockNetBoxClient) -> Vec<Site> {
    client.sites.lock().unwrap().values().cloned().collect()
}

fn sorted<T, K: Ord>(mut items: Vec<T>, key: impl Fn(&T) -> K) -> Vec<T> {
    items.sort_by_key(key);
    items
}

fn tenant_field(tenant: Option<&NestedTenant>, key: &str) -> Option<Option<String>> {
    match key {
        "tenant_id" => Some(tenant.map(|t| t.id.to_string())),
        "tenant" => Some(tenant.map(|t| t.slug.clone())),
        _ => None,
    }
}

/// Drop allocated hosts from every available-ips listing
fn consume_available(client: &MockNetBoxClient, first: u128, last: u128) {
    let mut listings = client.available_ips.lock().unwrap();
    for ips in listings.values_mut() {
        ips.retain(|ip| host_value(&ip.address).is_none_or(|v| v < first || v > last));
    }
}

pub async fn query_prefixes(client: &MockNetBoxClient, filters: &[(&str, &str)], _fetch_all: bool) -> Result<Vec<Prefix>, NetBoxError> {
        let prefixes = client.prefixes.lock().unwrap();
        let results = prefixes
            .values()
            .filter(|p| {
                matches_filters(filters, &p.custom_fields, |key| match key {
                    "prefix" => Some(Some(p.prefix.clone())),
                    "family" => Some(Some(p.family.value.to_string())),
                    "site_id" => Some(
                        p.site.as_ref().map(|s| s.id).or(p.scope_id).map(|id| id.to_string()),
                    ),
                    "id" => Some(Some(p.id.to_string())),
                    _ => tenant_field(p.tenant.as_ref(), key),
                })
            })
            .cloned()
            .collect();
        Ok(sorted(results, |p: &Prefix| p.id))
}

pub async fn get_available_prefixes(client: &MockNetBoxClient, prefix_id: u64) -> Result<Vec<AvailablePrefix>, NetBoxError> {
        if !client.prefixes.lock().unwrap().contains_key(&prefix_id) {
            return Err(NetBoxError::NotFound(format!("Prefix {} not found", prefix_id)));
        }
        Ok(client.available_prefixes
            .lock()
            .unwrap()
            .get(&prefix_id)
            .cloned()
            .unwrap_or_default())
}

fn build_prefix(client: &MockNetBoxClient, id: u64, request: &WritablePrefix) -> Prefix {
        let helpers = client.helpers();
        let mut prefix = helpers.prefix(id, &request.prefix);
        prefix.status = Some(status_choice(&request.status));
        prefix.tenant = helpers.nested_tenant(&tenants(client), request.tenant);
        prefix.site = helpers.nested_site(&sites(client), request.site);
        prefix.description = request.description.clone();
        prefix.comments = request.comments.clone();
        prefix.tags = helpers.nested_tags(&request.tags);
        prefix.custom_fields = custom_fields_json(&request.custom_fields);
        prefix
}

pub async fn create_prefix(client: &MockNetBoxClient, request: &WritablePrefix) -> Result<Prefix, NetBoxError> {
        client.check_write()?;
        let id = client.next_id();
        let prefix = build_prefix(client, id, request);
        client.prefixes.lock().unwrap().insert(id, prefix.clone());
        Ok(prefix)
}

pub async fn update_prefix(client: &MockNetBoxClient, id: u64, request: &WritablePrefix) -> Result<Prefix, NetBoxError> {
        client.check_write()?;
        let mut updated = build_prefix(client, id, request);
        let mut prefixes = client.prefixes.lock().unwrap();
        let existing = prefixes
            .get_mut(&id)
            .ok_or_else(|| NetBoxError::NotFound(format!("Prefix {} not found", id)))?;
        let mut custom_fields = existing.custom_fields.clone();
        merge_custom_fields(&mut custom_fields, &request.custom_fields);
        updated.custom_fields = custom_fields;
        *existing = updated.clone();
        Ok(updated)
}

pub async fn delete_prefix(client: &MockNetBoxClient, id: u64) -> Result<(), NetBoxError> {
        client.check_write()?;
        client.prefixes.lock().unwrap().remove(&id);
        Ok(())
}

pub async fn query_ip_addresses(client: &MockNetBoxClient, filters: &[(&str, &str)], _fetch_all: bool) -> Result<Vec<IPAddress>, NetBoxError> {
        let ips = client.ip_addresses.lock().unwrap();
        let results = ips
            .values()
            .filter(|ip| {
                matches_filters(filters, &ip.custom_fields, |key| match key {
                    // NetBox compares the host part of the address filter
                    "address" => Some(
                        filters
                            .iter()
                            .find(|(k, _)| *k == "address")
                            .filter(|(_, v)| host(v) == host(&ip.address))
                            .map(|(_, v)| (*v).to_string()),
                    ),
                    "family" => Some(Some(ip.family.value.to_string())),
                    _ => tenant_field(ip.tenant.as_ref(), key),
                })
            })
            .cloned()
            .collect();
        Ok(sorted(results, |ip: &IPAddress| ip.id))
}

pub async fn get_available_ips(client: &MockNetBoxClient, prefix_id: u64, limit: Option<u32>) -> Result<Vec<AvailableIP>, NetBoxError> {
        if !client.prefixes.lock().unwrap().contains_key(&prefix_id) {
            return Err(NetBoxError::NotFound(format!("Prefix {} not found", prefix_id)));
        }
        let mut ips = client.available_ips
            .lock()
            .unwrap()
            .get(&prefix_id)
            .cloned()
            .unwrap_or_default();
        if let Some(limit) = limit {
            ips.truncate(limit as usize);
        }
        Ok(ips)
}

fn build_ip_address(client: &MockNetBoxClient, id: u64, request: &WritableIPAddress) -> IPAddress {
        let helpers = client.helpers();
        let mut ip = helpers.ip_address(id, &request.address);
        ip.status = Some(status_choice(&request.status));
        ip.tenant = helpers.nested_tenant(&tenants(client), request.tenant);
        ip.description = request.description.clone();
        ip.comments = request.comments.clone();
        ip.tags = helpers.nested_tags(&request.tags);
        ip.custom_fields = custom_fields_json(&request.custom_fields);
        ip
}

pub async fn create_ip_address(client: &MockNetBoxClient, request: &WritableIPAddress) -> Result<IPAddress, NetBoxError> {
        client.check_write()?;
        let id = client.next_id();
        let ip = build_ip_address(client, id, request);
        if let Some(value) = host_value(&ip.address) {
            consume_available(client, value, value);
        }
        client.ip_addresses.lock().unwrap().insert(id, ip.clone());
        Ok(ip)
}

pub async fn update_ip_address(client: &MockNetBoxClient, id: u64, request: &WritableIPAddress) -> Result<IPAddress, NetBoxError> {
        client.check_write()?;
        let mut updated = build_ip_address(client, id, request);
        let mut ips = client.ip_addresses.lock().unwrap();
        let existing = ips
            .get_mut(&id)
            .ok_or_else(|| NetBoxError::NotFound(format!("IP address {} not found", id)))?;
        let mut custom_fields = existing.custom_fields.clone();
        merge_custom_fields(&mut custom_fields, &request.custom_fields);
        updated.custom_fields = custom_fields;
        *existing = updated.clone();
        Ok(updated)
}

pub async fn delete_ip_address(client: &MockNetBoxClient, id: u64) -> Result<(), NetBoxError> {
        client.check_write()?;
        client.ip_addresses.lock().unwrap().remove(&id);
        Ok(())
}

pub async fn query_ip_ranges(client: &MockNetBoxClient, filters: &[(&str, &str)], _fetch_all: bool) -> Result<Vec<IpRange>, NetBoxError> {
        let ranges = client.ip_ranges.lock().unwrap();
        let results = ranges
            .values()
            .filter(|r| {
                matches_filters(filters, &r.custom_fields, |key| {
                    let own = match key {
                        "start_address" => &r.start_address,
                        "end_address" => &r.end_address,
                        "family" => return Some(Some(r.family.value.to_string())),
                        _ => return tenant_field(r.tenant.as_ref(), key),
                    };
                    Some(
                        filters
                            .iter()
                            .find(|(k, _)| *k == key)
                            .filter(|(_, v)| host(v) == host(own))
                            .map(|(_, v)| (*v).to_string()),
                    )
                })
            })
            .cloned()
            .collect();
        Ok(sorted(results, |r: &IpRange| r.id))
}

fn build_ip_range(client: &MockNetBoxClient, id: u64, request: &WritableIpRange) -> IpRange {
        let helpers = client.helpers();
        let mut range = helpers.ip_range(id, &request.start_address, &request.end_address);
        range.status = Some(status_choice(&request.status));
        range.tenant = helpers.nested_tenant(&tenants(client), request.tenant);
        range.mark_populated = request.mark_populated;
        range.description = request.description.clone();
        range.comments = request.comments.clone();
        range.tags = helpers.nested_tags(&request.tags);
        range.custom_fields = custom_fields_json(&request.custom_fields);
        range
}

pub async fn create_ip_range(client: &MockNetBoxClient, request: &WritableIpRange) -> Result<IpRange, NetBoxError> {
        client.check_write()?;
        let id = client.next_id();
        let range = build_ip_range(client, id, request);
        if let (Some(first), Some(last)) = (host_value(&range.start_address), host_value(&range.end_address)) {
            consume_available(client, first, last);
        }
        client.ip_ranges.lock().unwrap().insert(id, range.clone());
        Ok(range)
}

pub async fn update_ip_range(client: &MockNetBoxClient, id: u64, request: &WritableIpRange) -> Result<IpRange, NetBoxError> {
        client.check_write()?;
        let mut updated = build_ip_range(client, id, request);
        let mut ranges = client.ip_ranges.lock().unwrap();
        let existing = ranges
            .get_mut(&id)
            .ok_or_else(|| NetBoxError::NotFound(format!("IP range {} not found", id)))?;
        let mut custom_fields = existing.custom_fields.clone();
        merge_custom_fields(&mut custom_fields, &request.custom_fields);
        updated.custom_fields = custom_fields;
        updated.size = range_size(&updated.start_address, &updated.end_address);
        *existing = updated.clone();
        Ok(updated)
}

pub async fn delete_ip_range(client: &MockNetBoxClient, id: u64) -> Result<(), NetBoxError> {
        client.check_write()?;
        client.ip_ranges.lock().unwrap().remove(&id);
        Ok(())
}

pub async fn query_vlans(client: &MockNetBoxClient, filters: &[(&str, &str)], _fetch_all: bool) -> Result<Vec<Vlan>, NetBoxError> {
        let vlans = client.vlans.lock().unwrap();
        let results = vlans
            .values()
            .filter(|v| {
                matches_filters(filters, &v.custom_fields, |key| match key {
                    "vid" => Some(Some(v.vid.to_string())),
                    "name" => Some(Some(v.name.clone())),
                    "group_id" => Some(v.group.as_ref().map(|g| g.id.to_string())),
                    "site_id" => Some(v.site.as_ref().map(|s| s.id.to_string())),
                    _ => tenant_field(v.tenant.as_ref(), key),
                })
            })
            .cloned()
            .collect();
        Ok(sorted(results, |v: &Vlan| v.id))
}

fn build_vlan(client: &MockNetBoxClient, id: u64, request: &WritableVlan) -> Vlan {
        let helpers = client.helpers();
        let group = client.vlan_groups.lock().unwrap().get(&request.group).cloned();
        let mut vlan = helpers.vlan(id, request.vid, &request.name, group.as_ref());
        vlan.status = Some(status_choice(&request.status));
        vlan.site = helpers.nested_site(&sites(client), request.site);
        vlan.tenant = helpers.nested_tenant(&tenants(client), request.tenant);
        vlan.description = request.description.clone();
        vlan.comments = request.comments.clone();
        vlan.tags = helpers.nested_tags(&request.tags);
        vlan.custom_fields = custom_fields_json(&request.custom_fields);
        vlan
}

pub async fn create_vlan(client: &MockNetBoxClient, request: &WritableVlan) -> Result<Vlan, NetBoxError> {
        client.check_write()?;
        let duplicate = client.vlans.lock().unwrap().values().any(|v| {
            v.vid == request.vid && v.group.as_ref().map(|g| g.id) == Some(request.group)
        });
        if duplicate {
            return Err(NetBoxError::InvalidRequest(format!(
                "VLAN with vid {} already exists in group {}",
                request.vid, request.group
            )));
        }
        let id = client.next_id();
        let vlan = build_vlan(client, id, request);
        client.vlans.lock().unwrap().insert(id, vlan.clone());
        Ok(vlan)
}

pub async fn update_vlan(client: &MockNetBoxClient, id: u64, request: &WritableVlan) -> Result<Vlan, NetBoxError> {
        client.check_write()?;
        let mut updated = build_vlan(client, id, request);
        let mut vlans = client.vlans.lock().unwrap();
        let existing = vlans
            .get_mut(&id)
            .ok_or_else(|| NetBoxError::NotFound(format!("VLAN {} not found", id)))?;
        let mut custom_fields = existing.custom_fields.clone();
        merge_custom_fields(&mut custom_fields, &request.custom_fields);
        updated.custom_fields = custom_fields;
        *existing = updated.clone();
        Ok(updated)
}

pub async fn delete_vlan(client: &MockNetBoxClient, id: u64) -> Result<(), NetBoxError> {
        client.check_write()?;
        client.vlans.lock().unwrap().remove(&id);
        Ok(())
}
