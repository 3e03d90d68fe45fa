//! DCops IPAM CRD Definitions
//!
//! Kubernetes Custom Resource Definitions for the NetBox IPAM controller:
//! claim/resource pairs for prefixes, IP addresses, IP ranges and VLANs.

pub mod conditions;
pub mod ipam;

pub use conditions::*;
pub use ipam::*;

/// API group shared by every CRD in this crate
pub const API_GROUP: &str = "dcops.microscaler.io";

/// API version shared by every CRD in this crate
pub const API_VERSION: &str = "v1alpha1";
