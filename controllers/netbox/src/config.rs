//! Operator configuration.
//!
//! Loaded once from the environment in `main` and handed to every component
//! behind an `Arc`, so nothing reads the environment after startup.

use crate::error::ControllerError;
use std::env;
use std::time::Duration;

/// Default name of the NetBox custom field holding restoration hashes
pub const DEFAULT_RESTORATION_HASH_FIELD: &str = "netboxOperatorRestorationHash";

const DEFAULT_LEASE_DURATION_SECONDS: u64 = 30;
const DEFAULT_LOCK_RETRY_SECONDS: u64 = 2;

/// Runtime configuration of the controller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperatorConfig {
    /// NetBox host, optionally with port (e.g. "netbox.netbox:8080")
    pub netbox_host: String,
    pub auth_token: String,
    /// Talk to NetBox over HTTPS
    pub https: bool,
    /// Custom field that stores restoration hashes in NetBox
    pub restoration_hash_field: String,
    /// Namespace holding the lease objects used for parent locking
    pub operator_namespace: String,
    /// Only watch this namespace; all namespaces when `None`
    pub watch_namespace: Option<String>,
    /// How long an unrenewed lease stays valid
    pub lease_duration: Duration,
    /// Requeue delay after failing to lock a parent
    pub lock_retry: Duration,
}

impl OperatorConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ControllerError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup.
    ///
    /// Empty values are treated as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ControllerError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let required = |key: &str| {
            get(key).ok_or_else(|| {
                ControllerError::InvalidConfig(format!("{} environment variable is required", key))
            })
        };

        let https = match get("HTTPS_ENABLE") {
            Some(value) => parse_bool("HTTPS_ENABLE", &value)?,
            None => true,
        };

        Ok(Self {
            netbox_host: required("NETBOX_HOST")?,
            auth_token: required("AUTH_TOKEN")?,
            https,
            restoration_hash_field: get("NETBOX_RESTORATION_HASH_FIELD_NAME")
                .unwrap_or_else(|| DEFAULT_RESTORATION_HASH_FIELD.to_string()),
            operator_namespace: required("POD_NAMESPACE")?,
            watch_namespace: get("WATCH_NAMESPACE"),
            lease_duration: Duration::from_secs(parse_seconds(
                "LEASE_DURATION_SECONDS",
                get("LEASE_DURATION_SECONDS"),
                DEFAULT_LEASE_DURATION_SECONDS,
            )?),
            lock_retry: Duration::from_secs(parse_seconds(
                "LOCK_RETRY_SECONDS",
                get("LOCK_RETRY_SECONDS"),
                DEFAULT_LOCK_RETRY_SECONDS,
            )?),
        })
    }

    /// Scheme and host, e.g. "https://netbox.example.com"
    pub fn base_url(&self) -> String {
        let scheme = if self.https { "https" } else { "http" };
        format!("{}://{}", scheme, self.netbox_host.trim_end_matches('/'))
    }

    /// Link to an object in the NetBox UI, e.g. `ui_url("ipam/prefixes", 7)`
    pub fn ui_url(&self, kind_path: &str, id: u64) -> String {
        format!("{}/{}/{}", self.base_url(), kind_path, id)
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ControllerError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        other => Err(ControllerError::InvalidConfig(format!(
            "{} must be a boolean, got '{}'",
            key, other
        ))),
    }
}

fn parse_seconds(key: &str, value: Option<String>, default: u64) -> Result<u64, ControllerError> {
    match value {
        None => Ok(default),
        Some(raw) => match raw.trim().parse::<u64>() {
            Ok(0) | Err(_) => Err(ControllerError::InvalidConfig(format!(
                "{} must be a positive number of seconds, got '{}'",
                key, raw
            ))),
            Ok(secs) => Ok(secs),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    const MINIMAL: &[(&str, &str)] = &[
        ("NETBOX_HOST", "netbox.local"),
        ("AUTH_TOKEN", "secret"),
        ("POD_NAMESPACE", "netbox-operator"),
    ];

    #[test]
    fn test_defaults() {
        let config = OperatorConfig::from_lookup(lookup(MINIMAL)).unwrap();
        assert!(config.https);
        assert_eq!(config.restoration_hash_field, DEFAULT_RESTORATION_HASH_FIELD);
        assert_eq!(config.watch_namespace, None);
        assert_eq!(config.lease_duration, Duration::from_secs(30));
        assert_eq!(config.lock_retry, Duration::from_secs(2));
        assert_eq!(config.base_url(), "https://netbox.local");
    }

    #[test]
    fn test_overrides() {
        let mut vars = MINIMAL.to_vec();
        vars.extend([
            ("HTTPS_ENABLE", "false"),
            ("NETBOX_RESTORATION_HASH_FIELD_NAME", "restoreHash"),
            ("WATCH_NAMESPACE", "tenant-a"),
            ("LOCK_RETRY_SECONDS", "5"),
        ]);
        let config = OperatorConfig::from_lookup(lookup(&vars)).unwrap();
        assert_eq!(config.base_url(), "http://netbox.local");
        assert_eq!(config.restoration_hash_field, "restoreHash");
        assert_eq!(config.watch_namespace.as_deref(), Some("tenant-a"));
        assert_eq!(config.lock_retry, Duration::from_secs(5));
        assert_eq!(config.ui_url("ipam/prefixes", 12), "http://netbox.local/ipam/prefixes/12");
    }

    #[test]
    fn test_missing_required() {
        let err = OperatorConfig::from_lookup(lookup(&[("NETBOX_HOST", "netbox.local")])).unwrap_err();
        assert!(err.to_string().contains("AUTH_TOKEN"));
    }

    #[test]
    fn test_malformed_values() {
        let mut vars = MINIMAL.to_vec();
        vars.push(("HTTPS_ENABLE", "maybe"));
        assert!(OperatorConfig::from_lookup(lookup(&vars)).is_err());

        let mut vars = MINIMAL.to_vec();
        vars.push(("LEASE_DURATION_SECONDS", "0"));
        assert!(OperatorConfig::from_lookup(lookup(&vars)).is_err());
    }
}
