//! Unit tests for the resources and statuses built from claims

#[cfg(test)]
mod tests {
    use crate::config::DEFAULT_RESTORATION_HASH_FIELD;
    use crate::reconciler::ipam::ip_address_claim::*;
    use crate::reconciler::ipam::ip_range_claim::*;
    use crate::reconciler::ipam::prefix_claim::*;
    use crate::reconciler::ipam::vlan_claim::*;
    use crate::test_utils::*;
    use crds::{NetBoxIpAddressClaimStatus, NetBoxIpRangeClaimStatus, NetBoxVlanClaimStatus};
    use std::net::IpAddr;

    const HASH: &str = "3b1f0c";

    #[test]
    fn test_prefix_resource_is_owned_and_tagged() {
        let mut claim = test_prefix_claim("web", "team-a", "10.0.0.0/24", "28");
        claim.spec.custom_fields.insert("env".to_string(), "prod".to_string());
        claim.spec.preserve_in_netbox = true;

        let prefix = prefix_for_claim(&claim, "10.0.0.16/28", DEFAULT_RESTORATION_HASH_FIELD, HASH).unwrap();
        assert_eq!(prefix.metadata.name.as_deref(), Some("web"));
        assert_eq!(prefix.metadata.namespace.as_deref(), Some("team-a"));
        assert_eq!(prefix.spec.prefix, "10.0.0.16/28");
        assert!(prefix.spec.preserve_in_netbox);
        assert_eq!(
            prefix.spec.custom_fields.get(DEFAULT_RESTORATION_HASH_FIELD).map(String::as_str),
            Some(HASH)
        );
        assert_eq!(prefix.spec.custom_fields.get("env").map(String::as_str), Some("prod"));

        let owners = prefix.metadata.owner_references.unwrap();
        assert_eq!(owners.len(), 1);
        assert_eq!(owners[0].kind, "NetBoxPrefixClaim");
        assert_eq!(owners[0].uid, "uid-team-a-web");
    }

    #[test]
    fn test_ip_address_status_has_dot_decimal() {
        let claim = test_ip_address_claim("web", "team-a", "10.0.0.0/24");
        let ip = ip_address_for_claim(&claim, "10.0.0.7/24", DEFAULT_RESTORATION_HASH_FIELD, HASH).unwrap();

        let mut status = NetBoxIpAddressClaimStatus::default();
        fill_ip_address_status(&mut status, &ip);
        assert_eq!(status.ip_address, "10.0.0.7/24");
        assert_eq!(status.ip_address_dot_decimal, "10.0.0.7");
        assert_eq!(status.ip_address_name, "web");
    }

    #[test]
    fn test_ip_range_status_lists_every_address() {
        let claim = test_ip_range_claim("pool", "team-a", "10.0.0.0/24", 3);
        let start: IpAddr = "10.0.0.10".parse().unwrap();
        let end: IpAddr = "10.0.0.12".parse().unwrap();
        let range = ip_range_for_claim(&claim, (start, end), DEFAULT_RESTORATION_HASH_FIELD, HASH).unwrap();
        assert_eq!(range.spec.start_address, "10.0.0.10/32");
        assert_eq!(range.spec.end_address, "10.0.0.12/32");

        let mut status = NetBoxIpRangeClaimStatus::default();
        fill_ip_range_status(&mut status, &range);
        assert_eq!(status.ip_range, "10.0.0.10/32-10.0.0.12/32");
        assert_eq!(status.ip_range_dot_decimal, "10.0.0.10-10.0.0.12");
        assert_eq!(status.start_address_dot_decimal, "10.0.0.10");
        assert_eq!(status.end_address_dot_decimal, "10.0.0.12");
        assert_eq!(
            status.ip_addresses,
            vec!["10.0.0.10/32", "10.0.0.11/32", "10.0.0.12/32"]
        );
        assert_eq!(status.ip_addresses_dot_decimal, vec!["10.0.0.10", "10.0.0.11", "10.0.0.12"]);
        assert_eq!(status.ip_range_name, "pool");
    }

    #[test]
    fn test_vlan_name_defaults_to_claim_name() {
        let mut claim = test_vlan_claim("storage", "team-a", "fabric", Some(120));
        assert_eq!(vlan_name(&claim), "storage");

        claim.spec.name = Some(String::new());
        assert_eq!(vlan_name(&claim), "storage");

        claim.spec.name = Some("san-a".to_string());
        let vlan = vlan_for_claim(&claim, 120, DEFAULT_RESTORATION_HASH_FIELD, HASH).unwrap();
        assert_eq!(vlan.spec.name, "san-a");
        assert_eq!(vlan.spec.vlan_group, "fabric");

        let mut status = NetBoxVlanClaimStatus::default();
        fill_vlan_status(&mut status, &vlan);
        assert_eq!(status.vlan_id, 120);
        assert_eq!(status.vlan_name, "san-a");
        assert_eq!(status.vlan_resource_name, "storage");
    }

    #[test]
    fn test_spec_rebuild_is_stable() {
        let claim = test_ip_address_claim("web", "team-a", "10.0.0.0/24");
        let a = ip_address_spec_for_claim(&claim, "10.0.0.7/24", DEFAULT_RESTORATION_HASH_FIELD, HASH);
        let b = ip_address_spec_for_claim(&claim, "10.0.0.7/24", DEFAULT_RESTORATION_HASH_FIELD, HASH);
        assert_eq!(a, b);
    }
}
