//! Mock NetBoxClient for unit testing
//!
//! This module provides a mock implementation of NetBoxClientTrait that can be used
//! in unit tests without requiring a running NetBox instance.
//!
//! The mock is organized into domain-specific modules:
//! - `ipam.rs` - prefixes, IP addresses, IP ranges and VLANs
//! - `lookups.rs` - tenants, sites, VLAN groups and custom field definitions
//! - `helpers.rs` - model builders and query filter matching

mod helpers;
mod ipam;
mod lookups;

pub use helpers::Helpers;

use crate::error::NetBoxError;
use crate::models::*;
use crate::netbox_trait::NetBoxClientTrait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Mock NetBoxClient for testing
///
/// This mock stores resources in memory and can be configured to return
/// specific responses for testing different scenarios. Clones share storage,
/// so a test can keep a handle for assertions after handing one to a reconciler.
#[derive(Clone, Debug)]
pub struct MockNetBoxClient {
    pub(crate) base_url: String,
    // In-memory storage for resources
    pub(crate) prefixes: Arc<Mutex<HashMap<u64, Prefix>>>,
    pub(crate) ip_addresses: Arc<Mutex<HashMap<u64, IPAddress>>>,
    pub(crate) ip_ranges: Arc<Mutex<HashMap<u64, IpRange>>>,
    pub(crate) vlans: Arc<Mutex<HashMap<u64, Vlan>>>,
    pub(crate) vlan_groups: Arc<Mutex<HashMap<u64, VlanGroup>>>,
    pub(crate) tenants: Arc<Mutex<HashMap<u64, Tenant>>>,
    pub(crate) sites: Arc<Mutex<HashMap<u64, Site>>>,
    pub(crate) custom_fields: Arc<Mutex<HashMap<u64, CustomField>>>,
    // Free-space listings keyed by parent prefix ID
    pub(crate) available_ips: Arc<Mutex<HashMap<u64, Vec<AvailableIP>>>>,
    pub(crate) available_prefixes: Arc<Mutex<HashMap<u64, Vec<AvailablePrefix>>>>,
    // When set, every write fails with this message
    pub(crate) write_failure: Arc<Mutex<Option<String>>>,
    // Counter for generating IDs
    pub(crate) next_id: Arc<Mutex<u64>>,
}

impl MockNetBoxClient {
    /// Create a new mock client
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            prefixes: Arc::new(Mutex::new(HashMap::new())),
            ip_addresses: Arc::new(Mutex::new(HashMap::new())),
            ip_ranges: Arc::new(Mutex::new(HashMap::new())),
            vlans: Arc::new(Mutex::new(HashMap::new())),
            vlan_groups: Arc::new(Mutex::new(HashMap::new())),
            tenants: Arc::new(Mutex::new(HashMap::new())),
            sites: Arc::new(Mutex::new(HashMap::new())),
            custom_fields: Arc::new(Mutex::new(HashMap::new())),
            available_ips: Arc::new(Mutex::new(HashMap::new())),
            available_prefixes: Arc::new(Mutex::new(HashMap::new())),
            write_failure: Arc::new(Mutex::new(None)),
            next_id: Arc::new(Mutex::new(1000)),
        }
    }

    /// Model builders bound to this mock's base URL
    pub fn helpers(&self) -> Helpers {
        Helpers::new(self.base_url.clone())
    }

    /// Add a prefix to the mock store (for test setup)
    pub fn add_prefix(&self, prefix: Prefix) {
        self.prefixes.lock().unwrap().insert(prefix.id, prefix);
    }

    /// Add an IP address to the mock store (for test setup)
    pub fn add_ip_address(&self, ip: IPAddress) {
        self.ip_addresses.lock().unwrap().insert(ip.id, ip);
    }

    /// Add an IP range to the mock store (for test setup)
    pub fn add_ip_range(&self, range: IpRange) {
        self.ip_ranges.lock().unwrap().insert(range.id, range);
    }

    /// Add a VLAN to the mock store (for test setup)
    pub fn add_vlan(&self, vlan: Vlan) {
        self.vlans.lock().unwrap().insert(vlan.id, vlan);
    }

    pub fn add_vlan_group(&self, group: VlanGroup) {
        self.vlan_groups.lock().unwrap().insert(group.id, group);
    }

    /// Add a tenant to the mock store (for test setup)
    pub fn add_tenant(&self, tenant: Tenant) {
        self.tenants.lock().unwrap().insert(tenant.id, tenant);
    }

    /// Add a site to the mock store (for test setup)
    pub fn add_site(&self, site: Site) {
        self.sites.lock().unwrap().insert(site.id, site);
    }

    /// Register a custom field definition (for test setup)
    pub fn add_custom_field(&self, field: CustomField) {
        self.custom_fields.lock().unwrap().insert(field.id, field);
    }

    /// Set the available-ips listing of a prefix (for test setup)
    pub fn set_available_ips(&self, prefix_id: u64, ips: Vec<AvailableIP>) {
        self.available_ips.lock().unwrap().insert(prefix_id, ips);
    }

    /// Set the available-prefixes listing of a prefix (for test setup)
    pub fn set_available_prefixes(&self, prefix_id: u64, prefixes: Vec<AvailablePrefix>) {
        self.available_prefixes.lock().unwrap().insert(prefix_id, prefixes);
    }

    /// Make every subsequent create/update/delete fail
    pub fn fail_writes(&self, message: impl Into<String>) {
        *self.write_failure.lock().unwrap() = Some(message.into());
    }

    pub fn clear_write_failure(&self) {
        *self.write_failure.lock().unwrap() = None;
    }

    /// Snapshot of stored prefixes, ordered by ID
    pub fn prefixes(&self) -> Vec<Prefix> {
        let mut all: Vec<Prefix> = self.prefixes.lock().unwrap().values().cloned().collect();
        all.sort_by_key(|p| p.id);
        all
    }

    /// Snapshot of stored IP addresses, ordered by ID
    pub fn ip_addresses(&self) -> Vec<IPAddress> {
        let mut all: Vec<IPAddress> = self.ip_addresses.lock().unwrap().values().cloned().collect();
        all.sort_by_key(|ip| ip.id);
        all
    }

    /// Snapshot of stored IP ranges, ordered by ID
    pub fn ip_ranges(&self) -> Vec<IpRange> {
        let mut all: Vec<IpRange> = self.ip_ranges.lock().unwrap().values().cloned().collect();
        all.sort_by_key(|r| r.id);
        all
    }

    /// Snapshot of stored VLANs, ordered by ID
    pub fn vlans(&self) -> Vec<Vlan> {
        let mut all: Vec<Vlan> = self.vlans.lock().unwrap().values().cloned().collect();
        all.sort_by_key(|v| v.id);
        all
    }

    /// Generate next ID
    pub(crate) fn next_id(&self) -> u64 {
        let mut id = self.next_id.lock().unwrap();
        *id += 1;
        *id
    }

    pub(crate) fn check_write(&self) -> Result<(), NetBoxError> {
        match self.write_failure.lock().unwrap().as_ref() {
            Some(message) => Err(NetBoxError::Api(message.clone())),
            None => Ok(()),
        }
    }
}

#[async_trait::async_trait]
impl NetBoxClientTrait for MockNetBoxClient {
    fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn validate_token(&self) -> Result<(), NetBoxError> {
        Ok(())
    }

    async fn query_prefixes(&self, filters: &[(&str, &str)], fetch_all: bool) -> Result<Vec<Prefix>, NetBoxError> {
        ipam::query_prefixes(self, filters, fetch_all).await
    }

    async fn get_available_prefixes(&self, prefix_id: u64) -> Result<Vec<AvailablePrefix>, NetBoxError> {
        ipam::get_available_prefixes(self, prefix_id).await
    }

    async fn create_prefix(&self, prefix: &WritablePrefix) -> Result<Prefix, NetBoxError> {
        ipam::create_prefix(self, prefix).await
    }

    async fn update_prefix(&self, id: u64, prefix: &WritablePrefix) -> Result<Prefix, NetBoxError> {
        ipam::update_prefix(self, id, prefix).await
    }

    async fn delete_prefix(&self, id: u64) -> Result<(), NetBoxError> {
        ipam::delete_prefix(self, id).await
    }

    async fn query_ip_addresses(&self, filters: &[(&str, &str)], fetch_all: bool) -> Result<Vec<IPAddress>, NetBoxError> {
        ipam::query_ip_addresses(self, filters, fetch_all).await
    }

    async fn get_available_ips(&self, prefix_id: u64, limit: Option<u32>) -> Result<Vec<AvailableIP>, NetBoxError> {
        ipam::get_available_ips(self, prefix_id, limit).await
    }

    async fn create_ip_address(&self, address: &WritableIPAddress) -> Result<IPAddress, NetBoxError> {
        ipam::create_ip_address(self, address).await
    }

    async fn update_ip_address(&self, id: u64, address: &WritableIPAddress) -> Result<IPAddress, NetBoxError> {
        ipam::update_ip_address(self, id, address).await
    }

    async fn delete_ip_address(&self, id: u64) -> Result<(), NetBoxError> {
        ipam::delete_ip_address(self, id).await
    }

    async fn query_ip_ranges(&self, filters: &[(&str, &str)], fetch_all: bool) -> Result<Vec<IpRange>, NetBoxError> {
        ipam::query_ip_ranges(self, filters, fetch_all).await
    }

    async fn create_ip_range(&self, range: &WritableIpRange) -> Result<IpRange, NetBoxError> {
        ipam::create_ip_range(self, range).await
    }

    async fn update_ip_range(&self, id: u64, range: &WritableIpRange) -> Result<IpRange, NetBoxError> {
        ipam::update_ip_range(self, id, range).await
    }

    async fn delete_ip_range(&self, id: u64) -> Result<(), NetBoxError> {
        ipam::delete_ip_range(self, id).await
    }

    async fn query_vlans(&self, filters: &[(&str, &str)], fetch_all: bool) -> Result<Vec<Vlan>, NetBoxError> {
        ipam::query_vlans(self, filters, fetch_all).await
    }

    async fn create_vlan(&self, vlan: &WritableVlan) -> Result<Vlan, NetBoxError> {
        ipam::create_vlan(self, vlan).await
    }

    async fn update_vlan(&self, id: u64, vlan: &WritableVlan) -> Result<Vlan, NetBoxError> {
        ipam::update_vlan(self, id, vlan).await
    }

    async fn delete_vlan(&self, id: u64) -> Result<(), NetBoxError> {
        ipam::delete_vlan(self, id).await
    }

    async fn query_vlan_groups(&self, filters: &[(&str, &str)], fetch_all: bool) -> Result<Vec<VlanGroup>, NetBoxError> {
        lookups::query_vlan_groups(self, filters, fetch_all).await
    }

    async fn query_tenants(&self, filters: &[(&str, &str)], fetch_all: bool) -> Result<Vec<Tenant>, NetBoxError> {
        lookups::query_tenants(self, filters, fetch_all).await
    }

    async fn query_sites(&self, filters: &[(&str, &str)], fetch_all: bool) -> Result<Vec<Site>, NetBoxError> {
        lookups::query_sites(self, filters, fetch_all).await
    }

    async fn query_custom_fields(&self, filters: &[(&str, &str)], fetch_all: bool) -> Result<Vec<CustomField>, NetBoxError> {
        lookups::query_custom_fields(self, filters, fetch_all).await
    }
}
