//! Restoration hashes.
//!
//! A claim that is deleted and re-created with the same immutable fields must
//! get back the allocation it had before. Each claim kind hashes its immutable
//! identity, the hash is stored in a NetBox custom field on the allocation, and
//! restoration looks allocations up by that field.
//!
//! Only immutable fields go into a hash. Mutable metadata such as descriptions
//! or custom fields never affects it.

use crds::{NetBoxIpAddressClaim, NetBoxIpRangeClaim, NetBoxPrefixClaim, NetBoxVlanClaim};
use kube::ResourceExt;
use sha2::{Digest, Sha256};

/// Separates fields so that ("ab", "c") and ("a", "bc") hash differently
const FIELD_SEPARATOR: u8 = 0x1f;

/// SHA-256 over the fields in order, lowercase hex encoded
pub fn digest(fields: &[&str]) -> String {
    let mut hasher = Sha256::new();
    for (i, field) in fields.iter().enumerate() {
        if i > 0 {
            hasher.update([FIELD_SEPARATOR]);
        }
        hasher.update(field.as_bytes());
    }
    hex::encode(hasher.finalize())
}

/// Canonical text form of a parent prefix selector: `key_value` pairs sorted by key
fn selector_string(claim: &NetBoxPrefixClaim) -> String {
    claim
        .spec
        .parent_prefix_selector
        .as_ref()
        .map(|selector| {
            // BTreeMap iterates in key order
            selector
                .iter()
                .map(|(k, v)| format!("{}_{}", k, v))
                .collect::<Vec<_>>()
                .join("_")
        })
        .unwrap_or_default()
}

pub fn prefix_claim_hash(claim: &NetBoxPrefixClaim) -> String {
    let namespace = claim.namespace().unwrap_or_default();
    let name = claim.name_any();
    let selector = selector_string(claim);
    digest(&[
        namespace.as_str(),
        name.as_str(),
        claim.spec.parent_prefix.as_deref().unwrap_or_default(),
        claim.spec.prefix_length.as_str(),
        claim.spec.tenant.as_deref().unwrap_or_default(),
        selector.as_str(),
    ])
}

pub fn ip_address_claim_hash(claim: &NetBoxIpAddressClaim) -> String {
    let namespace = claim.namespace().unwrap_or_default();
    let name = claim.name_any();
    digest(&[
        namespace.as_str(),
        name.as_str(),
        claim.spec.parent_prefix.as_str(),
        claim.spec.tenant.as_deref().unwrap_or_default(),
    ])
}

pub fn ip_range_claim_hash(claim: &NetBoxIpRangeClaim) -> String {
    let namespace = claim.namespace().unwrap_or_default();
    let name = claim.name_any();
    let size = claim.spec.size.to_string();
    digest(&[
        namespace.as_str(),
        name.as_str(),
        claim.spec.parent_prefix.as_str(),
        claim.spec.tenant.as_deref().unwrap_or_default(),
        size.as_str(),
    ])
}

pub fn vlan_claim_hash(claim: &NetBoxVlanClaim) -> String {
    let namespace = claim.namespace().unwrap_or_default();
    let name = claim.name_any();
    digest(&[namespace.as_str(), name.as_str(), claim.spec.vlan_group.as_str()])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::*;

    #[test]
    fn test_digest_is_stable_lowercase_hex() {
        let a = digest(&["ns", "claim", "10.0.0.0/16", "/28", "", ""]);
        let b = digest(&["ns", "claim", "10.0.0.0/16", "/28", "", ""]);
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c)));
    }

    #[test]
    fn test_digest_known_value() {
        // sha256("") is well known
        assert_eq!(
            digest(&[""]),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_digest_separates_fields() {
        assert_ne!(digest(&["ab", "c"]), digest(&["a", "bc"]));
        assert_ne!(digest(&["ns-a", "x"]), digest(&["ns", "-ax"]));
    }

    #[test]
    fn test_mutable_fields_do_not_change_hash() {
        let mut claim = test_prefix_claim("pc", "default", "10.0.0.0/16", "/28");
        let before = prefix_claim_hash(&claim);

        claim.spec.description = Some("edited".to_string());
        claim.spec.comments = Some("edited".to_string());
        claim.spec.custom_fields.insert("env".to_string(), "prod".to_string());
        assert_eq!(prefix_claim_hash(&claim), before);

        claim.spec.prefix_length = "/27".to_string();
        assert_ne!(prefix_claim_hash(&claim), before);
    }

    #[test]
    fn test_hash_depends_on_namespace_and_kind_fields() {
        let a = test_ip_range_claim("r", "team-a", "10.0.0.0/24", 4);
        let b = test_ip_range_claim("r", "team-b", "10.0.0.0/24", 4);
        let c = test_ip_range_claim("r", "team-a", "10.0.0.0/24", 5);
        assert_ne!(ip_range_claim_hash(&a), ip_range_claim_hash(&b));
        assert_ne!(ip_range_claim_hash(&a), ip_range_claim_hash(&c));

        let ip = test_ip_address_claim("r", "team-a", "10.0.0.0/24");
        assert_eq!(ip_address_claim_hash(&ip), ip_address_claim_hash(&ip.clone()));

        let vlan = test_vlan_claim("v", "team-a", "fabric", None);
        let mut other_group = vlan.clone();
        other_group.spec.vlan_group = "edge".to_string();
        assert_ne!(vlan_claim_hash(&vlan), vlan_claim_hash(&other_group));
    }

    #[test]
    fn test_tenant_is_part_of_the_hash() {
        let ip = test_ip_address_claim("web", "team-a", "10.0.0.0/24");
        let mut tenanted_ip = ip.clone();
        tenanted_ip.spec.tenant = Some("acme".to_string());
        assert_ne!(ip_address_claim_hash(&ip), ip_address_claim_hash(&tenanted_ip));
        assert_eq!(
            ip_address_claim_hash(&tenanted_ip),
            digest(&["team-a", "web", "10.0.0.0/24", "acme"])
        );

        let mut range = test_ip_range_claim("r", "team-a", "10.0.0.0/24", 4);
        range.spec.tenant = Some("acme".to_string());
        assert_eq!(
            ip_range_claim_hash(&range),
            digest(&["team-a", "r", "10.0.0.0/24", "acme", "4"])
        );
    }

    #[test]
    fn test_selector_order_does_not_matter() {
        let mut a = test_prefix_claim("pc", "default", "", "/28");
        a.spec.parent_prefix = None;
        a.spec.parent_prefix_selector = Some(
            [("tenant", "acme"), ("family", "IPv4")]
                .into_iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        );
        let mut b = a.clone();
        b.spec.parent_prefix_selector = Some(
            [("family", "IPv4"), ("tenant", "acme")]
                .into_iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        );
        assert_eq!(prefix_claim_hash(&a), prefix_claim_hash(&b));
        assert_eq!(selector_string(&a), "family_IPv4_tenant_acme");
    }
}
