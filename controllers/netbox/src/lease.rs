//! Lease based locking of allocation pools.
//!
//! Allocating from a parent prefix or VLAN group is a read-then-write against
//! NetBox, so two claims allocating from the same pool at the same time could
//! be handed the same free block. Every allocation therefore holds a
//! `coordination.k8s.io/v1` Lease named after the pool.
//!
//! `try_lock` never waits: a busy lease returns `false` and the caller requeues.
//! Leases that are not released expire after their duration.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use k8s_openapi::api::coordination::v1::Lease;
use kube::api::{Api, PostParams};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

/// Errors talking to the lease store
#[derive(Debug, Error)]
pub enum LeaseError {
    #[error("Kubernetes error: {0}")]
    Kube(#[from] kube::Error),

    #[error("Malformed lease {0}: {1}")]
    Malformed(String, String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// The parts of a Lease the locker cares about
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaseRecord {
    /// Current holder, `None` when released
    pub holder: Option<String>,
    pub renew_time: Option<DateTime<Utc>>,
    pub duration_seconds: i32,
    /// Version the record was read at; writes with a stale version fail
    pub resource_version: Option<String>,
}

impl LeaseRecord {
    fn held_by(holder: &str, now: DateTime<Utc>, duration: Duration) -> Self {
        Self {
            holder: Some(holder.to_string()),
            renew_time: Some(now),
            duration_seconds: i32::try_from(duration.as_secs()).unwrap_or(i32::MAX),
            resource_version: None,
        }
    }

    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        match self.renew_time {
            Some(renewed) => renewed + chrono::Duration::seconds(i64::from(self.duration_seconds)) <= now,
            None => true,
        }
    }

    fn is_free(&self) -> bool {
        self.holder.as_deref().is_none_or(str::is_empty)
    }
}

/// Storage for lease records with compare-and-swap writes.
///
/// `create` and `replace` return `Ok(false)` when another writer got there
/// first (the record already exists, or its version moved on).
#[async_trait]
pub trait LeaseStore: Send + Sync {
    async fn get(&self, name: &str) -> Result<Option<LeaseRecord>, LeaseError>;

    async fn create(&self, name: &str, record: &LeaseRecord) -> Result<bool, LeaseError>;

    async fn replace(&self, name: &str, record: &LeaseRecord) -> Result<bool, LeaseError>;
}

/// Lease store backed by Lease objects in the operator namespace
#[derive(Clone)]
pub struct KubeLeaseStore {
    api: Api<Lease>,
}

impl KubeLeaseStore {
    pub fn new(client: kube::Client, namespace: &str) -> Self {
        Self { api: Api::namespaced(client, namespace) }
    }

    fn to_lease(name: &str, record: &LeaseRecord) -> Result<Lease, LeaseError> {
        let renew_time = record
            .renew_time
            .map(|t| t.to_rfc3339_opts(SecondsFormat::Micros, true));
        let mut metadata = serde_json::json!({ "name": name });
        if let Some(version) = &record.resource_version {
            metadata["resourceVersion"] = serde_json::Value::String(version.clone());
        }
        let lease = serde_json::json!({
            "apiVersion": "coordination.k8s.io/v1",
            "kind": "Lease",
            "metadata": metadata,
            "spec": {
                "holderIdentity": record.holder,
                "leaseDurationSeconds": record.duration_seconds,
                "renewTime": renew_time,
            }
        });
        Ok(serde_json::from_value(lease)?)
    }

    fn from_lease(name: &str, lease: &Lease) -> Result<LeaseRecord, LeaseError> {
        let value = serde_json::to_value(lease)?;
        let spec = &value["spec"];
        let renew_time = match spec["renewTime"].as_str() {
            Some(raw) => Some(
                DateTime::parse_from_rfc3339(raw)
                    .map_err(|e| LeaseError::Malformed(name.to_string(), e.to_string()))?
                    .with_timezone(&Utc),
            ),
            None => None,
        };
        Ok(LeaseRecord {
            holder: spec["holderIdentity"].as_str().map(str::to_string),
            renew_time,
            duration_seconds: spec["leaseDurationSeconds"]
                .as_i64()
                .and_then(|d| i32::try_from(d).ok())
                .unwrap_or(0),
            resource_version: value["metadata"]["resourceVersion"].as_str().map(str::to_string),
        })
    }
}

fn is_conflict(error: &kube::Error) -> bool {
    matches!(error, kube::Error::Api(resp) if resp.code == 409)
}

#[async_trait]
impl LeaseStore for KubeLeaseStore {
    async fn get(&self, name: &str) -> Result<Option<LeaseRecord>, LeaseError> {
        match self.api.get_opt(name).await? {
            Some(lease) => Ok(Some(Self::from_lease(name, &lease)?)),
            None => Ok(None),
        }
    }

    async fn create(&self, name: &str, record: &LeaseRecord) -> Result<bool, LeaseError> {
        let lease = Self::to_lease(name, record)?;
        match self.api.create(&PostParams::default(), &lease).await {
            Ok(_) => Ok(true),
            Err(e) if is_conflict(&e) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn replace(&self, name: &str, record: &LeaseRecord) -> Result<bool, LeaseError> {
        let lease = Self::to_lease(name, record)?;
        match self.api.replace(name, &PostParams::default(), &lease).await {
            Ok(_) => Ok(true),
            Err(e) if is_conflict(&e) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

/// Non-blocking lock on one named lease
pub struct LeaseLocker {
    store: Arc<dyn LeaseStore>,
    name: String,
    holder: String,
    duration: Duration,
}

impl LeaseLocker {
    /// `holder` identifies the caller, e.g. "namespace/claim-name"
    pub fn new(store: Arc<dyn LeaseStore>, name: impl Into<String>, holder: impl Into<String>, duration: Duration) -> Self {
        Self {
            store,
            name: name.into(),
            holder: holder.into(),
            duration,
        }
    }

    /// Take the lease if it is free, expired or already ours.
    ///
    /// Returns `Ok(false)` when somebody else holds it or won a race for it.
    pub async fn try_lock(&self) -> Result<bool, LeaseError> {
        let now = Utc::now();
        let mut desired = LeaseRecord::held_by(&self.holder, now, self.duration);

        let Some(current) = self.store.get(&self.name).await? else {
            return self.store.create(&self.name, &desired).await;
        };

        let ours = current.holder.as_deref() == Some(self.holder.as_str());
        if !(current.is_free() || ours || current.is_expired(now)) {
            debug!(
                "Lease {} is held by {}",
                self.name,
                current.holder.as_deref().unwrap_or_default()
            );
            return Ok(false);
        }

        desired.resource_version = current.resource_version;
        self.store.replace(&self.name, &desired).await
    }

    /// Release the lease if we still hold it. Failures are logged and ignored,
    /// the lease expires on its own.
    pub async fn unlock(&self) {
        let current = match self.store.get(&self.name).await {
            Ok(Some(current)) => current,
            Ok(None) => return,
            Err(e) => {
                warn!("Failed to read lease {} for release: {}", self.name, e);
                return;
            }
        };
        if current.holder.as_deref() != Some(self.holder.as_str()) {
            return;
        }

        let released = LeaseRecord {
            holder: None,
            renew_time: None,
            duration_seconds: current.duration_seconds,
            resource_version: current.resource_version,
        };
        match self.store.replace(&self.name, &released).await {
            Ok(true) => debug!("Released lease {}", self.name),
            Ok(false) => debug!("Lease {} changed before release", self.name),
            Err(e) => warn!("Failed to release lease {}: {}", self.name, e),
        }
    }
}

/// Lease name for an allocation pool literal such as "10.0.0.0/24" or "2001:db8::/48".
///
/// Separators are replaced with '-'. Literals that still don't form a valid
/// object name are sanitized and suffixed with a short SHA-256 of the literal,
/// so distinct pools keep distinct names.
pub fn lease_name_for_pool(literal: &str) -> String {
    let simple = literal.trim().to_ascii_lowercase().replace(['/', ':'], "-");
    if is_valid_object_name(&simple) {
        return simple;
    }

    let sanitized: String = simple
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '.' { c } else { '-' })
        .collect();
    let sanitized = sanitized.trim_matches(|c| c == '-' || c == '.');
    let digest = Sha256::digest(literal.as_bytes());
    let suffix = hex::encode(&digest[..4]);

    let mut prefix: String = sanitized.chars().take(240).collect();
    while prefix.ends_with(['-', '.']) {
        prefix.pop();
    }
    if prefix.is_empty() {
        format!("pool-{}", suffix)
    } else {
        format!("{}-{}", prefix, suffix)
    }
}

/// Lease name for a VLAN group
pub fn lease_name_for_vlan_group(group: &str) -> String {
    lease_name_for_pool(&format!("vlan-group-{}", group))
}

fn is_valid_object_name(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= 253
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '.')
        && name.starts_with(|c: char| c.is_ascii_alphanumeric())
        && name.ends_with(|c: char| c.is_ascii_alphanumeric())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::MemoryLeaseStore;

    fn locker(store: &Arc<MemoryLeaseStore>, holder: &str, secs: u64) -> LeaseLocker {
        LeaseLocker::new(store.clone(), "10.0.0.0-24", holder, Duration::from_secs(secs))
    }

    #[test]
    fn test_lease_name_for_pool() {
        assert_eq!(lease_name_for_pool("10.0.0.0/24"), "10.0.0.0-24");
        assert_eq!(lease_name_for_pool("2001:DB8:1::/48"), "2001-db8-1---48");
        assert_eq!(lease_name_for_pool("2001:db8:1::/48"), lease_name_for_pool("2001:db8:1::/48"));
    }

    #[test]
    fn test_lease_name_sanitizes_and_suffixes() {
        let name = lease_name_for_pool("::/0");
        assert!(is_valid_object_name(&name), "{}", name);
        assert!(name.starts_with("0-"), "{}", name);
        // First four digest bytes of the literal, lowercase hex
        assert_eq!(name, "0-6d0e7095");

        let a = lease_name_for_vlan_group("Fabric A");
        let b = lease_name_for_vlan_group("Fabric_A");
        assert!(is_valid_object_name(&a));
        assert!(is_valid_object_name(&b));
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn test_try_lock_is_exclusive_until_unlock() {
        let store = Arc::new(MemoryLeaseStore::default());
        let a = locker(&store, "ns/a", 30);
        let b = locker(&store, "ns/b", 30);

        assert!(a.try_lock().await.unwrap());
        assert!(!b.try_lock().await.unwrap());
        // Re-entrant for the same holder
        assert!(a.try_lock().await.unwrap());

        a.unlock().await;
        assert!(b.try_lock().await.unwrap());
        assert!(!a.try_lock().await.unwrap());
    }

    #[tokio::test]
    async fn test_unlock_by_other_holder_is_ignored() {
        let store = Arc::new(MemoryLeaseStore::default());
        let a = locker(&store, "ns/a", 30);
        let b = locker(&store, "ns/b", 30);

        assert!(a.try_lock().await.unwrap());
        b.unlock().await;
        assert!(!b.try_lock().await.unwrap());
    }

    #[tokio::test]
    async fn test_expired_lease_can_be_taken_over() {
        let store = Arc::new(MemoryLeaseStore::default());
        store.insert(
            "10.0.0.0-24",
            LeaseRecord {
                holder: Some("ns/crashed".to_string()),
                renew_time: Some(Utc::now() - chrono::Duration::seconds(120)),
                duration_seconds: 30,
                resource_version: None,
            },
        );

        let b = locker(&store, "ns/b", 30);
        assert!(b.try_lock().await.unwrap());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_lockers_never_both_win() {
        for _ in 0..20 {
            let store = Arc::new(MemoryLeaseStore::default());
            let handles: Vec<_> = (0..8)
                .map(|i| {
                    let l = locker(&store, &format!("ns/claim-{}", i), 30);
                    tokio::spawn(async move { l.try_lock().await.unwrap() })
                })
                .collect();

            let mut winners = 0;
            for handle in handles {
                if handle.await.unwrap() {
                    winners += 1;
                }
            }
            assert_eq!(winners, 1);
        }
    }
}
