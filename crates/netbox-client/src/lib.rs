//! NetBox REST API Client
//!
//! A Rust client library for the parts of the NetBox REST API used by the
//! DCops IPAM controller: prefixes, IP addresses, IP ranges and VLANs, plus the
//! tenant/site/VLAN group/custom field lookups they reference.
//!
//! # Example
//!
//! ```no_run
//! use netbox_client::{NetBoxClient, NetBoxClientTrait};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = NetBoxClient::new(
//!     "http://netbox:80".to_string(),
//!     "your-api-token".to_string(),
//! )?;
//!
//! // Find a parent prefix and list its free space
//! let parents = client.query_prefixes(&[("prefix", "10.0.0.0/16")], false).await?;
//! if let Some(parent) = parents.first() {
//!     let free = client.get_available_prefixes(parent.id).await?;
//!     println!("{} free blocks", free.len());
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Features
//!
//! - **IPAM Operations**: Query, create, update and delete prefixes, IP addresses, IP ranges
//! - **Free space**: available-prefixes and available-ips listings
//! - **VLAN Management**: VLANs and VLAN groups
//! - **Pagination**: Support for fetching all pages of large result sets
//! - **Mocking**: `MockNetBoxClient` behind the `test-util` feature

pub mod client;
pub mod common;
pub mod error;
pub mod models;
#[path = "trait.rs"]
pub mod netbox_trait;
#[cfg(feature = "test-util")]
pub mod mock;

pub use client::NetBoxClient;
pub use common::{HttpClient, PaginatedResponse};
pub use error::NetBoxError;
pub use models::*;
pub use netbox_trait::NetBoxClientTrait;
#[cfg(feature = "test-util")]
pub use mock::MockNetBoxClient;
