//! IPAM (IP Address Management) CRDs
//!
//! Claims request an allocation from a pool; resources hold the concrete
//! allocation reserved in NetBox:
//! - Prefixes
//! - IP addresses
//! - IP ranges
//! - VLANs

pub mod common;
pub mod netbox_ip_address;
pub mod netbox_ip_address_claim;
pub mod netbox_ip_range;
pub mod netbox_ip_range_claim;
pub mod netbox_prefix;
pub mod netbox_prefix_claim;
pub mod netbox_vlan;
pub mod netbox_vlan_claim;

pub use common::*;
pub use netbox_ip_address::*;
pub use netbox_ip_address_claim::*;
pub use netbox_ip_range::*;
pub use netbox_ip_range_claim::*;
pub use netbox_prefix::*;
pub use netbox_prefix_claim::*;
pub use netbox_vlan::*;
pub use netbox_vlan_claim::*;
