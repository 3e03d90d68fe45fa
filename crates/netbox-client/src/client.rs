//! NetBox API client
//!
//! Implements the NetBox REST API client for IPAM operations on top of the
//! shared [`HttpClient`]. Based on NetBox API structure: /api/ipam/prefixes/,
//! /api/ipam/ip-addresses/, /api/ipam/ip-ranges/ and /api/ipam/vlans/

use crate::common::HttpClient;
use crate::common::query::query_resources;
use crate::error::NetBoxError;
use crate::models::*;
use crate::netbox_trait::NetBoxClientTrait;
use reqwest::Client;
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{debug, info};

/// NetBox API client
pub struct NetBoxClient {
    http: HttpClient,
    /// NetBox < 4.2 takes `site` on prefixes, newer releases take a scope
    legacy_site_field: OnceCell<bool>,
}

impl NetBoxClient {
    /// Create a new NetBox client
    ///
    /// # Arguments
    /// * `base_url` - NetBox base URL (e.g., "http://netbox:80")
    /// * `token` - API token for authentication
    pub fn new(base_url: String, token: String) -> Result<Self, NetBoxError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(NetBoxError::Http)?;

        Ok(Self {
            http: HttpClient::new(client, base_url, token),
            legacy_site_field: OnceCell::new(),
        })
    }

    /// Get the NetBox release reported by `/api/status/`
    pub async fn netbox_version(&self) -> Result<String, NetBoxError> {
        let status: serde_json::Value = self.http.get("/api/status/").await?;
        status
            .get("netbox-version")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .ok_or_else(|| NetBoxError::Api("status response has no netbox-version".to_string()))
    }

    async fn uses_legacy_site_field(&self) -> Result<bool, NetBoxError> {
        self.legacy_site_field
            .get_or_try_init(|| async {
                let version = self.netbox_version().await?;
                let legacy = is_legacy_version(&version);
                info!("Detected NetBox {} (legacy site field: {})", version, legacy);
                Ok::<bool, NetBoxError>(legacy)
            })
            .await
            .copied()
    }

    async fn prefix_payload(&self, prefix: &WritablePrefix) -> Result<serde_json::Value, NetBoxError> {
        let mut body = serde_json::to_value(prefix)?;
        if let (Some(site_id), Some(obj)) = (prefix.site, body.as_object_mut()) {
            if self.uses_legacy_site_field().await? {
                obj.insert("site".to_string(), site_id.into());
            } else {
                obj.insert("scope_type".to_string(), "dcim.site".into());
                obj.insert("scope_id".to_string(), site_id.into());
            }
        }
        Ok(body)
    }
}

/// `true` for releases older than 4.2, e.g. "3.7.8" or "v4.1.0"
fn is_legacy_version(version: &str) -> bool {
    let mut parts = version
        .trim_start_matches('v')
        .split(|c: char| c == '.' || c == '-')
        .map(|p| p.parse::<u32>().unwrap_or(0));
    let major = parts.next().unwrap_or(0);
    let minor = parts.next().unwrap_or(0);
    (major, minor) < (4, 2)
}

#[async_trait::async_trait]
impl NetBoxClientTrait for NetBoxClient {
    fn base_url(&self) -> &str {
        self.http.base_url()
    }

    /// Validate the API token by making a simple authenticated request.
    ///
    /// Uses the status endpoint as it's lightweight and requires authentication.
    async fn validate_token(&self) -> Result<(), NetBoxError> {
        let url = self.http.build_url("/api/status/");
        debug!("Validating NetBox token and connectivity");

        let response = self
            .http
            .client()
            .get(&url)
            .header("Authorization", self.http.auth_header())
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(NetBoxError::Http)?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();

        if status == 401 || status == 403 {
            return Err(NetBoxError::Authentication(format!(
                "Invalid token: {} - {}",
                status, body
            )));
        }

        if !status.is_success() {
            return Err(NetBoxError::Api(format!(
                "Failed to validate token: {} - {}",
                status, body
            )));
        }

        debug!("Token validated successfully");
        Ok(())
    }

    async fn query_prefixes(&self, filters: &[(&str, &str)], fetch_all: bool) -> Result<Vec<Prefix>, NetBoxError> {
        query_resources(&self.http, "ipam/prefixes", filters, fetch_all).await
    }

    async fn get_available_prefixes(&self, prefix_id: u64) -> Result<Vec<AvailablePrefix>, NetBoxError> {
        self.http
            .get(&format!("/api/ipam/prefixes/{}/available-prefixes/", prefix_id))
            .await
    }

    async fn create_prefix(&self, prefix: &WritablePrefix) -> Result<Prefix, NetBoxError> {
        let body = self.prefix_payload(prefix).await?;
        self.http.post("/api/ipam/prefixes/", &body).await
    }

    async fn update_prefix(&self, id: u64, prefix: &WritablePrefix) -> Result<Prefix, NetBoxError> {
        let body = self.prefix_payload(prefix).await?;
        self.http.patch(&format!("/api/ipam/prefixes/{}/", id), &body).await
    }

    async fn delete_prefix(&self, id: u64) -> Result<(), NetBoxError> {
        self.http.delete(&format!("/api/ipam/prefixes/{}/", id)).await
    }

    async fn query_ip_addresses(&self, filters: &[(&str, &str)], fetch_all: bool) -> Result<Vec<IPAddress>, NetBoxError> {
        query_resources(&self.http, "ipam/ip-addresses", filters, fetch_all).await
    }

    async fn get_available_ips(&self, prefix_id: u64, limit: Option<u32>) -> Result<Vec<AvailableIP>, NetBoxError> {
        let mut path = format!("/api/ipam/prefixes/{}/available-ips/", prefix_id);
        if let Some(limit) = limit {
            path = format!("{}?limit={}", path, limit);
        }
        self.http.get(&path).await
    }

    async fn create_ip_address(&self, address: &WritableIPAddress) -> Result<IPAddress, NetBoxError> {
        let body = serde_json::to_value(address)?;
        self.http.post("/api/ipam/ip-addresses/", &body).await
    }

    async fn update_ip_address(&self, id: u64, address: &WritableIPAddress) -> Result<IPAddress, NetBoxError> {
        let body = serde_json::to_value(address)?;
        self.http.patch(&format!("/api/ipam/ip-addresses/{}/", id), &body).await
    }

    async fn delete_ip_address(&self, id: u64) -> Result<(), NetBoxError> {
        self.http.delete(&format!("/api/ipam/ip-addresses/{}/", id)).await
    }

    async fn query_ip_ranges(&self, filters: &[(&str, &str)], fetch_all: bool) -> Result<Vec<IpRange>, NetBoxError> {
        query_resources(&self.http, "ipam/ip-ranges", filters, fetch_all).await
    }

    async fn create_ip_range(&self, range: &WritableIpRange) -> Result<IpRange, NetBoxError> {
        let body = serde_json::to_value(range)?;
        self.http.post("/api/ipam/ip-ranges/", &body).await
    }

    async fn update_ip_range(&self, id: u64, range: &WritableIpRange) -> Result<IpRange, NetBoxError> {
        let body = serde_json::to_value(range)?;
        self.http.patch(&format!("/api/ipam/ip-ranges/{}/", id), &body).await
    }

    async fn delete_ip_range(&self, id: u64) -> Result<(), NetBoxError> {
        self.http.delete(&format!("/api/ipam/ip-ranges/{}/", id)).await
    }

    async fn query_vlans(&self, filters: &[(&str, &str)], fetch_all: bool) -> Result<Vec<Vlan>, NetBoxError> {
        query_resources(&self.http, "ipam/vlans", filters, fetch_all).await
    }

    async fn create_vlan(&self, vlan: &WritableVlan) -> Result<Vlan, NetBoxError> {
        let body = serde_json::to_value(vlan)?;
        self.http.post("/api/ipam/vlans/", &body).await
    }

    async fn update_vlan(&self, id: u64, vlan: &WritableVlan) -> Result<Vlan, NetBoxError> {
        let body = serde_json::to_value(vlan)?;
        self.http.patch(&format!("/api/ipam/vlans/{}/", id), &body).await
    }

    async fn delete_vlan(&self, id: u64) -> Result<(), NetBoxError> {
        self.http.delete(&format!("/api/ipam/vlans/{}/", id)).await
    }

    async fn query_vlan_groups(&self, filters: &[(&str, &str)], fetch_all: bool) -> Result<Vec<VlanGroup>, NetBoxError> {
        query_resources(&self.http, "ipam/vlan-groups", filters, fetch_all).await
    }

    async fn query_tenants(&self, filters: &[(&str, &str)], fetch_all: bool) -> Result<Vec<Tenant>, NetBoxError> {
        query_resources(&self.http, "tenancy/tenants", filters, fetch_all).await
    }

    async fn query_sites(&self, filters: &[(&str, &str)], fetch_all: bool) -> Result<Vec<Site>, NetBoxError> {
        query_resources(&self.http, "dcim/sites", filters, fetch_all).await
    }

    async fn query_custom_fields(&self, filters: &[(&str, &str)], fetch_all: bool) -> Result<Vec<CustomField>, NetBoxError> {
        query_resources(&self.http, "extras/custom-fields", filters, fetch_all).await
    }
}
