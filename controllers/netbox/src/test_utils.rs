//! Test utilities for unit testing reconcilers
//!
//! Builders for claims and resources, a configuration fixture and an
//! in-memory lease store with the same compare-and-swap behaviour as the
//! Kubernetes API.

use crate::config::{OperatorConfig, DEFAULT_RESTORATION_HASH_FIELD};
use crate::lease::{LeaseError, LeaseRecord, LeaseStore};
use crate::reconciler::Backend;
use async_trait::async_trait;
use crds::*;
use k8s_openapi::api::core::v1::{LoadBalancerIngress, LoadBalancerStatus, Service, ServiceSpec, ServiceStatus};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use netbox_client::MockNetBoxClient;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

fn meta(name: &str, namespace: &str) -> ObjectMeta {
    ObjectMeta {
        name: Some(name.to_string()),
        namespace: Some(namespace.to_string()),
        uid: Some(format!("uid-{}-{}", namespace, name)),
        ..Default::default()
    }
}

pub fn test_config() -> OperatorConfig {
    OperatorConfig {
        netbox_host: "netbox.test".to_string(),
        auth_token: "token".to_string(),
        https: false,
        restoration_hash_field: DEFAULT_RESTORATION_HASH_FIELD.to_string(),
        operator_namespace: "netbox-system".to_string(),
        watch_namespace: None,
        lease_duration: Duration::from_secs(30),
        lock_retry: Duration::from_secs(2),
    }
}

/// Backend over a clone of `netbox` and a fresh in-memory lease store.
///
/// The mock's clones share storage, so the caller keeps inspecting `netbox`.
pub fn test_backend(netbox: &MockNetBoxClient) -> (Backend, Arc<MemoryLeaseStore>) {
    let leases = Arc::new(MemoryLeaseStore::default());
    let backend = Backend::new(
        Arc::new(netbox.clone()),
        Arc::new(test_config()),
        Arc::clone(&leases) as Arc<dyn LeaseStore>,
    );
    (backend, leases)
}

/// Prefix claim with a literal parent; pass "" for a selector based claim
pub fn test_prefix_claim(name: &str, namespace: &str, parent: &str, prefix_length: &str) -> NetBoxPrefixClaim {
    NetBoxPrefixClaim {
        metadata: meta(name, namespace),
        spec: NetBoxPrefixClaimSpec {
            parent_prefix: (!parent.is_empty()).then(|| parent.to_string()),
            prefix_length: prefix_length.to_string(),
            ..Default::default()
        },
        status: None,
    }
}

pub fn test_ip_address_claim(name: &str, namespace: &str, parent: &str) -> NetBoxIpAddressClaim {
    NetBoxIpAddressClaim {
        metadata: meta(name, namespace),
        spec: NetBoxIpAddressClaimSpec {
            parent_prefix: parent.to_string(),
            ..Default::default()
        },
        status: None,
    }
}

pub fn test_ip_range_claim(name: &str, namespace: &str, parent: &str, size: u32) -> NetBoxIpRangeClaim {
    NetBoxIpRangeClaim {
        metadata: meta(name, namespace),
        spec: NetBoxIpRangeClaimSpec {
            parent_prefix: parent.to_string(),
            size,
            ..Default::default()
        },
        status: None,
    }
}

pub fn test_vlan_claim(name: &str, namespace: &str, group: &str, vlan_id: Option<u16>) -> NetBoxVlanClaim {
    NetBoxVlanClaim {
        metadata: meta(name, namespace),
        spec: NetBoxVlanClaimSpec {
            vlan_group: group.to_string(),
            vlan_id,
            ..Default::default()
        },
        status: None,
    }
}

pub fn test_prefix(name: &str, namespace: &str, prefix: &str) -> NetBoxPrefix {
    NetBoxPrefix {
        metadata: meta(name, namespace),
        spec: NetBoxPrefixSpec {
            prefix: prefix.to_string(),
            ..Default::default()
        },
        status: None,
    }
}

pub fn test_ip_address(name: &str, namespace: &str, address: &str) -> NetBoxIpAddress {
    NetBoxIpAddress {
        metadata: meta(name, namespace),
        spec: NetBoxIpAddressSpec {
            ip_address: address.to_string(),
            ..Default::default()
        },
        status: None,
    }
}

/// A LoadBalancer Service with one ingress entry per IP
pub fn test_load_balancer_service(name: &str, namespace: &str, ips: &[&str]) -> Service {
    Service {
        metadata: meta(name, namespace),
        spec: Some(ServiceSpec {
            type_: Some("LoadBalancer".to_string()),
            ..Default::default()
        }),
        status: Some(ServiceStatus {
            load_balancer: Some(LoadBalancerStatus {
                ingress: Some(
                    ips.iter()
                        .map(|ip| LoadBalancerIngress {
                            ip: Some(ip.to_string()),
                            ..Default::default()
                        })
                        .collect(),
                ),
            }),
            ..Default::default()
        }),
    }
}

pub fn test_ip_range(name: &str, namespace: &str, start: &str, end: &str) -> NetBoxIpRange {
    NetBoxIpRange {
        metadata: meta(name, namespace),
        spec: NetBoxIpRangeSpec {
            start_address: start.to_string(),
            end_address: end.to_string(),
            ..Default::default()
        },
        status: None,
    }
}

pub fn test_vlan(name: &str, namespace: &str, vid: u16, group: &str) -> NetBoxVlan {
    NetBoxVlan {
        metadata: meta(name, namespace),
        spec: NetBoxVlanSpec {
            vlan_id: vid,
            name: name.to_string(),
            vlan_group: group.to_string(),
            ..Default::default()
        },
        status: None,
    }
}

/// Lease store kept in memory.
///
/// Every successful write bumps the record's resource version, and writes
/// carrying a stale version are rejected.
#[derive(Debug, Default)]
pub struct MemoryLeaseStore {
    records: Mutex<HashMap<String, LeaseRecord>>,
    version: Mutex<u64>,
}

impl MemoryLeaseStore {
    pub fn insert(&self, name: &str, mut record: LeaseRecord) {
        record.resource_version = Some(self.next_version());
        self.records.lock().unwrap().insert(name.to_string(), record);
    }

    pub fn holder(&self, name: &str) -> Option<String> {
        self.records
            .lock()
            .unwrap()
            .get(name)
            .and_then(|r| r.holder.clone())
    }

    fn next_version(&self) -> String {
        let mut version = self.version.lock().unwrap();
        *version += 1;
        version.to_string()
    }
}

#[async_trait]
impl LeaseStore for MemoryLeaseStore {
    async fn get(&self, name: &str) -> Result<Option<LeaseRecord>, LeaseError> {
        Ok(self.records.lock().unwrap().get(name).cloned())
    }

    async fn create(&self, name: &str, record: &LeaseRecord) -> Result<bool, LeaseError> {
        let mut records = self.records.lock().unwrap();
        if records.contains_key(name) {
            return Ok(false);
        }
        let mut stored = record.clone();
        stored.resource_version = Some(self.next_version());
        records.insert(name.to_string(), stored);
        Ok(true)
    }

    async fn replace(&self, name: &str, record: &LeaseRecord) -> Result<bool, LeaseError> {
        let mut records = self.records.lock().unwrap();
        let Some(current) = records.get(name) else {
            return Ok(false);
        };
        if current.resource_version != record.resource_version {
            return Ok(false);
        }
        let mut stored = record.clone();
        stored.resource_version = Some(self.next_version());
        records.insert(name.to_string(), stored);
        Ok(true)
    }
}
