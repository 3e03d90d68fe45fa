//! Unit tests for the claim resolution engine

#[cfg(test)]
mod tests {
    use crate::allocation::AllocationError;
    use crate::claim_resolution::*;
    use crate::config::DEFAULT_RESTORATION_HASH_FIELD;
    use crate::test_utils::test_config;
    use netbox_client::{AvailableIP, AvailablePrefix, MockNetBoxClient};
    use std::collections::BTreeMap;

    const PARENT_ID: u64 = 1;

    fn mock_with_parent(parent: &str) -> MockNetBoxClient {
        let mock = MockNetBoxClient::new("http://netbox.test");
        mock.add_prefix(mock.helpers().prefix(PARENT_ID, parent));
        mock
    }

    fn free_prefixes(mock: &MockNetBoxClient, prefix_id: u64, prefixes: &[&str]) {
        mock.set_available_prefixes(
            prefix_id,
            prefixes
                .iter()
                .map(|p| AvailablePrefix { family: 4, prefix: p.to_string() })
                .collect(),
        );
    }

    fn free_ips(mock: &MockNetBoxClient, prefix_id: u64, ips: &[&str]) {
        mock.set_available_ips(
            prefix_id,
            ips.iter()
                .map(|ip| AvailableIP { family: 4, address: format!("{}/24", ip) })
                .collect(),
        );
    }

    fn tagged(hash: &str) -> serde_json::Value {
        let mut fields = serde_json::Map::new();
        fields.insert(DEFAULT_RESTORATION_HASH_FIELD.to_string(), hash.into());
        serde_json::Value::Object(fields)
    }

    #[tokio::test]
    async fn test_prefix_best_fit_takes_smallest_block() {
        let mock = mock_with_parent("10.0.0.0/16");
        free_prefixes(&mock, PARENT_ID, &["10.0.2.0/23", "10.0.0.32/27", "10.0.0.64/26"]);
        let config = test_config();
        let resolver = ClaimResolver::new(&mock, &config);

        let resolved = resolver.resolve_prefix("h1", "10.0.0.0/16", 28).await.unwrap();
        assert!(!resolved.restored);
        assert_eq!(resolved.value.to_string(), "10.0.0.32/28");
    }

    #[tokio::test]
    async fn test_prefix_restored_by_hash() {
        let mock = mock_with_parent("10.0.0.0/16");
        let mut existing = mock.helpers().prefix(7, "10.0.5.16/28");
        existing.custom_fields = tagged("h1");
        mock.add_prefix(existing);
        // Free space would give a different block
        free_prefixes(&mock, PARENT_ID, &["10.0.0.0/28"]);
        let config = test_config();
        let resolver = ClaimResolver::new(&mock, &config);

        let resolved = resolver.resolve_prefix("h1", "10.0.0.0/16", 28).await.unwrap();
        assert!(resolved.restored);
        assert_eq!(resolved.value.to_string(), "10.0.5.16/28");
    }

    #[tokio::test]
    async fn test_prefix_restore_is_ambiguous_with_two_matches() {
        let mock = mock_with_parent("10.0.0.0/16");
        for (id, prefix) in [(7, "10.0.5.16/28"), (8, "10.0.5.32/28")] {
            let mut existing = mock.helpers().prefix(id, prefix);
            existing.custom_fields = tagged("h1");
            mock.add_prefix(existing);
        }
        let config = test_config();
        let resolver = ClaimResolver::new(&mock, &config);

        let err = resolver.resolve_prefix("h1", "10.0.0.0/16", 28).await.unwrap_err();
        assert!(matches!(err, ResolutionError::Ambiguous { count: 2, .. }), "{}", err);
        assert!(err.needs_intervention());
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn test_prefix_entire_parent_is_rejected() {
        let mock = mock_with_parent("10.0.0.0/24");
        // An empty parent lists itself as free
        free_prefixes(&mock, PARENT_ID, &["10.0.0.0/24"]);
        let config = test_config();
        let resolver = ClaimResolver::new(&mock, &config);

        let err = resolver.allocate_prefix("10.0.0.0/24", 24).await.unwrap_err();
        assert!(matches!(err, ResolutionError::Allocation(AllocationError::EntireParentRequested)));

        let narrowed = resolver.allocate_prefix("10.0.0.0/24", 26).await.unwrap();
        assert_eq!(narrowed.to_string(), "10.0.0.0/26");
    }

    #[tokio::test]
    async fn test_prefix_exhausted_and_size_criteria_differ() {
        let mock = mock_with_parent("10.0.0.0/24");
        let config = test_config();
        let resolver = ClaimResolver::new(&mock, &config);

        let err = resolver.allocate_prefix("10.0.0.0/24", 28).await.unwrap_err();
        assert!(matches!(err, ResolutionError::Allocation(AllocationError::PoolExhausted)));
        assert!(!err.needs_intervention());

        free_prefixes(&mock, PARENT_ID, &["10.0.0.4/30"]);
        let err = resolver.allocate_prefix("10.0.0.0/24", 28).await.unwrap_err();
        assert!(matches!(err, ResolutionError::Allocation(AllocationError::NoPrefixMatchesSize)));
    }

    #[tokio::test]
    async fn test_unknown_parent_is_reported() {
        let mock = MockNetBoxClient::new("http://netbox.test");
        let config = test_config();
        let resolver = ClaimResolver::new(&mock, &config);

        let err = resolver.allocate_prefix("10.9.0.0/16", 24).await.unwrap_err();
        assert!(matches!(err, ResolutionError::ParentNotFound(ref p) if p == "10.9.0.0/16"));
    }

    #[tokio::test]
    async fn test_select_parent_prefers_longest_candidate_with_room() {
        let mock = MockNetBoxClient::new("http://netbox.test");
        let helpers = mock.helpers();
        mock.add_custom_field(helpers.custom_field(1, "environment"));
        for (id, prefix) in [(10, "10.0.0.0/16"), (11, "10.1.0.0/24"), (12, "10.2.0.0/25")] {
            let mut p = helpers.prefix(id, prefix);
            p.custom_fields = serde_json::json!({"environment": "prod"});
            mock.add_prefix(p);
        }
        let mut other = helpers.prefix(13, "10.3.0.0/26");
        other.custom_fields = serde_json::json!({"environment": "dev"});
        mock.add_prefix(other);

        free_prefixes(&mock, 10, &["10.0.0.0/16"]);
        free_prefixes(&mock, 11, &["10.1.0.0/24"]);
        // The /25 is full
        let config = test_config();
        let resolver = ClaimResolver::new(&mock, &config);

        let selector: BTreeMap<String, String> = [("environment", "prod"), ("family", "IPv4")]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let selected = resolver.select_parent_prefix(&selector, 28).await.unwrap();
        assert_eq!(selected.to_string(), "10.1.0.0/24");
    }

    #[tokio::test]
    async fn test_select_parent_rejects_unknown_custom_fields() {
        let mock = MockNetBoxClient::new("http://netbox.test");
        let config = test_config();
        let resolver = ClaimResolver::new(&mock, &config);

        let selector: BTreeMap<String, String> = [("poolName", "a"), ("rack", "r1")]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let err = resolver.select_parent_prefix(&selector, 28).await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "invalid parentPrefixSelector, netbox custom fields poolName, rack do not exist"
        );

        let selector: BTreeMap<String, String> =
            [("family".to_string(), "IPv5".to_string())].into_iter().collect();
        let err = resolver.select_parent_prefix(&selector, 28).await.unwrap_err();
        assert!(matches!(err, ResolutionError::InvalidSelector(_)));
    }

    #[tokio::test]
    async fn test_select_parent_without_candidates() {
        let mock = MockNetBoxClient::new("http://netbox.test");
        let config = test_config();
        let resolver = ClaimResolver::new(&mock, &config);

        let selector: BTreeMap<String, String> =
            [("family".to_string(), "IPv6".to_string())].into_iter().collect();
        let err = resolver.select_parent_prefix(&selector, 64).await.unwrap_err();
        assert!(matches!(err, ResolutionError::NoParentCandidate));
    }

    #[tokio::test]
    async fn test_ip_address_first_available() {
        let mock = mock_with_parent("10.0.0.0/24");
        free_ips(&mock, PARENT_ID, &["10.0.0.9", "10.0.0.10"]);
        let config = test_config();
        let resolver = ClaimResolver::new(&mock, &config);

        let resolved = resolver.resolve_ip_address("h2", "10.0.0.0/24").await.unwrap();
        assert_eq!(resolved, Resolved { value: "10.0.0.9/32".parse().unwrap(), restored: false });
    }

    #[tokio::test]
    async fn test_ip_address_restore_checks_parent_membership() {
        let mock = mock_with_parent("10.0.0.0/24");
        let mut existing = mock.helpers().ip_address(5, "10.0.0.77/24");
        existing.custom_fields = tagged("h2");
        mock.add_ip_address(existing);
        let config = test_config();
        let resolver = ClaimResolver::new(&mock, &config);

        let resolved = resolver.resolve_ip_address("h2", "10.0.0.0/24").await.unwrap();
        assert!(resolved.restored);
        assert_eq!(resolved.value.to_string(), "10.0.0.77/32");

        let err = resolver.resolve_ip_address("h2", "10.0.1.0/24").await.unwrap_err();
        assert!(matches!(err, ResolutionError::RestoredOutsideParent { .. }));
    }

    #[tokio::test]
    async fn test_ip_range_first_consecutive_run() {
        let mock = mock_with_parent("10.0.0.0/24");
        free_ips(&mock, PARENT_ID, &["10.0.0.1", "10.0.0.3", "10.0.0.5", "10.0.0.6", "10.0.0.7", "10.0.0.8"]);
        let config = test_config();
        let resolver = ClaimResolver::new(&mock, &config);

        let resolved = resolver.resolve_ip_range("h3", "10.0.0.0/24", 3).await.unwrap();
        let (start, end) = resolved.value;
        assert_eq!(start.to_string(), "10.0.0.5");
        assert_eq!(end.to_string(), "10.0.0.7");

        let err = resolver.resolve_ip_range("h3", "10.0.0.0/24", 5).await.unwrap_err();
        assert!(matches!(err, ResolutionError::Allocation(AllocationError::NotEnoughConsecutive)));
    }

    #[tokio::test]
    async fn test_ip_range_size_out_of_bounds_is_rejected() {
        let mock = mock_with_parent("10.0.0.0/24");
        free_ips(&mock, PARENT_ID, &["10.0.0.1", "10.0.0.2", "10.0.0.3"]);
        let mut existing = mock.helpers().ip_range(6, "10.0.0.10/24", "10.0.0.10/24");
        existing.custom_fields = tagged("h5");
        mock.add_ip_range(existing);
        let config = test_config();
        let resolver = ClaimResolver::new(&mock, &config);

        for size in [0, 1, 51, u32::MAX] {
            let err = resolver.resolve_ip_range("h5", "10.0.0.0/24", size).await.unwrap_err();
            assert!(
                matches!(err, ResolutionError::Allocation(AllocationError::InvalidRangeSize(s)) if s == size),
                "{}",
                err
            );
            assert!(err.needs_intervention());
        }

        let resolved = resolver.resolve_ip_range("h6", "10.0.0.0/24", 2).await.unwrap();
        assert_eq!(resolved.value.0.to_string(), "10.0.0.1");
    }

    #[tokio::test]
    async fn test_ip_range_restore_size_mismatch() {
        let mock = mock_with_parent("10.0.0.0/24");
        let mut existing = mock.helpers().ip_range(6, "10.0.0.10/24", "10.0.0.13/24");
        existing.custom_fields = tagged("h3");
        mock.add_ip_range(existing);
        let config = test_config();
        let resolver = ClaimResolver::new(&mock, &config);

        let restored = resolver.resolve_ip_range("h3", "10.0.0.0/24", 4).await.unwrap();
        assert!(restored.restored);

        let err = resolver.resolve_ip_range("h3", "10.0.0.0/24", 5).await.unwrap_err();
        assert!(matches!(err, ResolutionError::SizeMismatch { requested: 5, actual: 4 }));
        assert!(err.needs_intervention());
    }

    #[tokio::test]
    async fn test_vlan_lowest_free_and_explicit_ids() {
        let mock = MockNetBoxClient::new("http://netbox.test");
        let helpers = mock.helpers();
        let group = helpers.vlan_group(3, "fabric");
        mock.add_vlan_group(group.clone());
        mock.add_vlan(helpers.vlan(20, 1, "a", Some(&group)));
        mock.add_vlan(helpers.vlan(21, 2, "b", Some(&group)));
        mock.add_vlan(helpers.vlan(22, 4, "c", Some(&group)));
        // Same VID in another group does not count
        mock.add_vlan(helpers.vlan(23, 3, "d", None));
        let config = test_config();
        let resolver = ClaimResolver::new(&mock, &config);

        assert_eq!(resolver.resolve_vlan("h4", "fabric", None).await.unwrap().value, 3);
        assert_eq!(resolver.resolve_vlan("h4", "fabric", Some(100)).await.unwrap().value, 100);

        let err = resolver.resolve_vlan("h4", "fabric", Some(4)).await.unwrap_err();
        assert!(matches!(err, ResolutionError::VlanIdInUse { vid: 4, .. }));

        let err = resolver.resolve_vlan("h4", "missing", None).await.unwrap_err();
        assert!(matches!(err, ResolutionError::VlanGroupNotFound(_)));
    }

    #[tokio::test]
    async fn test_vlan_restored_by_hash() {
        let mock = MockNetBoxClient::new("http://netbox.test");
        let helpers = mock.helpers();
        let group = helpers.vlan_group(3, "fabric");
        mock.add_vlan_group(group.clone());
        let mut existing = helpers.vlan(20, 42, "web", Some(&group));
        existing.custom_fields = tagged("h4");
        mock.add_vlan(existing);
        let config = test_config();
        let resolver = ClaimResolver::new(&mock, &config);

        // The restored VID wins over an explicit request of the same claim
        let resolved = resolver.resolve_vlan("h4", "fabric", Some(42)).await.unwrap();
        assert_eq!(resolved, Resolved { value: 42, restored: true });
    }
}
