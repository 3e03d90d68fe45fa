//! NetBoxClient trait for mocking
//!
//! This trait abstracts the NetBoxClient to enable mocking in unit tests.
//! The concrete NetBoxClient implements this trait, and tests can use mock implementations.

use crate::error::NetBoxError;
use crate::models::*;

/// Trait for NetBox API client operations
///
/// This trait enables mocking of NetBox API calls for unit testing.
/// All async methods must be `Send` to work with Tokio's work-stealing runtime.
///
/// Query methods return an empty `Vec` when nothing matches; that is never an
/// error. Delete methods treat an object that is already gone as deleted.
#[async_trait::async_trait]
pub trait NetBoxClientTrait: Send + Sync {
    /// Get the base URL
    fn base_url(&self) -> &str;

    /// Validate the API token
    async fn validate_token(&self) -> Result<(), NetBoxError>;

    // Prefixes
    async fn query_prefixes(&self, filters: &[(&str, &str)], fetch_all: bool) -> Result<Vec<Prefix>, NetBoxError>;
    async fn get_available_prefixes(&self, prefix_id: u64) -> Result<Vec<AvailablePrefix>, NetBoxError>;
    async fn create_prefix(&self, prefix: &WritablePrefix) -> Result<Prefix, NetBoxError>;
    async fn update_prefix(&self, id: u64, prefix: &WritablePrefix) -> Result<Prefix, NetBoxError>;
    async fn delete_prefix(&self, id: u64) -> Result<(), NetBoxError>;

    // IP addresses
    async fn query_ip_addresses(&self, filters: &[(&str, &str)], fetch_all: bool) -> Result<Vec<IPAddress>, NetBoxError>;
    async fn get_available_ips(&self, prefix_id: u64, limit: Option<u32>) -> Result<Vec<AvailableIP>, NetBoxError>;
    async fn create_ip_address(&self, address: &WritableIPAddress) -> Result<IPAddress, NetBoxError>;
    async fn update_ip_address(&self, id: u64, address: &WritableIPAddress) -> Result<IPAddress, NetBoxError>;
    async fn delete_ip_address(&self, id: u64) -> Result<(), NetBoxError>;

    // IP ranges
    async fn query_ip_ranges(&self, filters: &[(&str, &str)], fetch_all: bool) -> Result<Vec<IpRange>, NetBoxError>;
    async fn create_ip_range(&self, range: &WritableIpRange) -> Result<IpRange, NetBoxError>;
    async fn update_ip_range(&self, id: u64, range: &WritableIpRange) -> Result<IpRange, NetBoxError>;
    async fn delete_ip_range(&self, id: u64) -> Result<(), NetBoxError>;

    // VLANs
    async fn query_vlans(&self, filters: &[(&str, &str)], fetch_all: bool) -> Result<Vec<Vlan>, NetBoxError>;
    async fn create_vlan(&self, vlan: &WritableVlan) -> Result<Vlan, NetBoxError>;
    async fn update_vlan(&self, id: u64, vlan: &WritableVlan) -> Result<Vlan, NetBoxError>;
    async fn delete_vlan(&self, id: u64) -> Result<(), NetBoxError>;
    async fn query_vlan_groups(&self, filters: &[(&str, &str)], fetch_all: bool) -> Result<Vec<VlanGroup>, NetBoxError>;

    // Lookups
    async fn query_tenants(&self, filters: &[(&str, &str)], fetch_all: bool) -> Result<Vec<Tenant>, NetBoxError>;
    async fn query_sites(&self, filters: &[(&str, &str)], fetch_all: bool) -> Result<Vec<Site>, NetBoxError>;
    async fn query_custom_fields(&self, filters: &[(&str, &str)], fetch_all: bool) -> Result<Vec<CustomField>, NetBoxError>;
}
