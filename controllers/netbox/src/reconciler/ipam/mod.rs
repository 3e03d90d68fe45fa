//! IPAM (IP Address Management) reconcilers
//!
//! One claim reconciler and one resource reconciler per kind:
//! prefixes, IP addresses, IP ranges and VLANs.

pub mod ip_address;
pub mod ip_address_claim;
pub mod ip_range;
pub mod ip_range_claim;
pub mod prefix;
pub mod prefix_claim;
pub mod vlan;
pub mod vlan_claim;
#[cfg(test)]
mod claim_builders_test;
#[cfg(test)]
mod prefix_claim_test;
