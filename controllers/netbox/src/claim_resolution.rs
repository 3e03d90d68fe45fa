//! Claim resolution engine.
//!
//! Turns a claim into a concrete allocation: first by restoring the allocation
//! tagged with the claim's restoration hash, otherwise by running the
//! allocation engine over the parent's free space.
//!
//! Resolution only reads from NetBox. The allocation is written when the
//! resource created from the claim is reconciled, so callers must hold the
//! pool's lease around resolution and nothing else.

use crate::allocation::{
    best_fit_prefix, find_consecutive_run, first_available_ip, host_prefix, parse_host, parse_prefix, range_size,
    validate_prefix_length, validate_range_size, AllocationError,
};
use crate::config::OperatorConfig;
use crate::lookup;
use ipnet::IpNet;
use netbox_client::{NetBoxClientTrait, NetBoxError, Prefix, VlanGroup};
use std::collections::{BTreeMap, BTreeSet};
use std::net::IpAddr;
use thiserror::Error;
use tracing::debug;

/// Highest usable 802.1Q VLAN ID
pub const MAX_VLAN_ID: u16 = 4094;

#[derive(Debug, Error)]
pub enum ResolutionError {
    /// More than one allocation carries the same restoration hash
    #[error("found {count} {kind} objects in NetBox with restoration hash {hash}")]
    Ambiguous { kind: &'static str, hash: String, count: usize },

    /// The restored allocation could not be interpreted
    #[error("restored {kind} '{value}' is malformed")]
    Malformed { kind: &'static str, value: String },

    #[error("restored {value} is outside parent prefix {parent}")]
    RestoredOutsideParent { value: String, parent: String },

    #[error("restored IP range has {actual} addresses but {requested} were requested")]
    SizeMismatch { requested: u32, actual: u128 },

    #[error("parent prefix {0} not found in NetBox")]
    ParentNotFound(String),

    #[error("invalid parentPrefixSelector, {0}")]
    InvalidSelector(String),

    #[error("no parent prefix matching the selector has room for the requested prefix")]
    NoParentCandidate,

    #[error("VLAN group {0} not found in NetBox")]
    VlanGroupNotFound(String),

    #[error("VLAN ID {vid} is already in use in VLAN group {group}")]
    VlanIdInUse { vid: u16, group: String },

    #[error("no free VLAN ID left in VLAN group {0}")]
    VlanIdsExhausted(String),

    #[error(transparent)]
    Allocation(#[from] AllocationError),

    #[error(transparent)]
    NetBox(#[from] NetBoxError),
}

impl ResolutionError {
    /// Transient backend failures are retried with backoff. Everything else is
    /// a business outcome reported through the claim's conditions.
    pub fn is_transient(&self) -> bool {
        matches!(self, ResolutionError::NetBox(e) if !e.is_not_found())
    }

    /// Outcomes that will not change until somebody edits the claim or fixes
    /// NetBox by hand. Everything else may clear up as pool occupancy changes.
    pub fn needs_intervention(&self) -> bool {
        match self {
            ResolutionError::Ambiguous { .. }
            | ResolutionError::Malformed { .. }
            | ResolutionError::RestoredOutsideParent { .. }
            | ResolutionError::SizeMismatch { .. }
            | ResolutionError::InvalidSelector(_)
            | ResolutionError::VlanIdInUse { .. } => true,
            ResolutionError::Allocation(e) => matches!(
                e,
                AllocationError::InvalidPrefixLength(_)
                    | AllocationError::InvalidPrefix(_)
                    | AllocationError::EntireParentRequested
                    | AllocationError::RequestedLargerThanParent { .. }
                    | AllocationError::LengthExceedsFamily { .. }
                    | AllocationError::InvalidRangeSize(_)
            ),
            _ => false,
        }
    }
}

/// A resolved allocation and whether it was restored rather than newly allocated
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolved<T> {
    pub value: T,
    pub restored: bool,
}

impl<T> Resolved<T> {
    fn restored(value: T) -> Self {
        Self { value, restored: true }
    }

    fn allocated(value: T) -> Self {
        Self { value, restored: false }
    }
}

/// Resolves claims against NetBox
pub struct ClaimResolver<'a> {
    netbox: &'a dyn NetBoxClientTrait,
    hash_field: &'a str,
}

impl<'a> ClaimResolver<'a> {
    pub fn new(netbox: &'a dyn NetBoxClientTrait, config: &'a OperatorConfig) -> Self {
        Self {
            netbox,
            hash_field: &config.restoration_hash_field,
        }
    }

    fn hash_filter(&self) -> String {
        format!("cf_{}", self.hash_field)
    }

    fn single<T>(kind: &'static str, hash: &str, mut found: Vec<T>) -> Result<Option<T>, ResolutionError> {
        match found.len() {
            0 => Ok(None),
            1 => Ok(found.pop()),
            count => Err(ResolutionError::Ambiguous {
                kind,
                hash: hash.to_string(),
                count,
            }),
        }
    }

    /// Look up a parent prefix by its literal
    pub async fn find_parent(&self, parent: &str) -> Result<Prefix, ResolutionError> {
        self.netbox
            .query_prefixes(&[("prefix", parent)], false)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| ResolutionError::ParentNotFound(parent.to_string()))
    }

    // Prefixes

    /// The prefix previously allocated for `hash`, if any
    pub async fn restore_prefix(&self, hash: &str) -> Result<Option<IpNet>, ResolutionError> {
        let filter = self.hash_filter();
        let found = self.netbox.query_prefixes(&[(filter.as_str(), hash)], false).await?;
        let Some(prefix) = Self::single("prefix", hash, found)? else {
            return Ok(None);
        };
        parse_prefix(&prefix.prefix)
            .map(Some)
            .map_err(|_| ResolutionError::Malformed {
                kind: "prefix",
                value: prefix.prefix.clone(),
            })
    }

    /// Best-fit child prefix of `requested` length from the free space of `parent`
    pub async fn allocate_prefix(&self, parent: &str, requested: u8) -> Result<IpNet, ResolutionError> {
        validate_prefix_length(&parse_prefix(parent)?, requested)?;

        let parent_prefix = self.find_parent(parent).await?;
        let available = self.available_prefixes(parent_prefix.id).await?;
        Ok(best_fit_prefix(&available, requested)?)
    }

    async fn available_prefixes(&self, prefix_id: u64) -> Result<Vec<IpNet>, ResolutionError> {
        self.netbox
            .get_available_prefixes(prefix_id)
            .await?
            .iter()
            .map(|p| parse_prefix(&p.prefix).map_err(ResolutionError::from))
            .collect()
    }

    /// Restore or allocate a prefix under a known parent
    pub async fn resolve_prefix(&self, hash: &str, parent: &str, requested: u8) -> Result<Resolved<IpNet>, ResolutionError> {
        if let Some(restored) = self.restore_prefix(hash).await? {
            check_membership(parent, &restored)?;
            debug!("Restored prefix {} for hash {}", restored, hash);
            return Ok(Resolved::restored(restored));
        }
        Ok(Resolved::allocated(self.allocate_prefix(parent, requested).await?))
    }

    /// Pick a parent prefix by selector.
    ///
    /// `tenant`, `site` and `family` are NetBox attributes, every other key is a
    /// custom field that must exist. Among the matches that still have room for
    /// a child of `requested` length, the one with the longest prefix length is
    /// chosen.
    pub async fn select_parent_prefix(
        &self,
        selector: &BTreeMap<String, String>,
        requested: u8,
    ) -> Result<IpNet, ResolutionError> {
        let filters = self.selector_filters(selector).await?;
        let filters: Vec<(&str, &str)> = filters.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect();

        let mut candidates: Vec<(IpNet, u64)> = Vec::new();
        for prefix in self.netbox.query_prefixes(&filters, true).await? {
            match parse_prefix(&prefix.prefix) {
                Ok(net) if validate_prefix_length(&net, requested).is_ok() => candidates.push((net, prefix.id)),
                Ok(_) => {}
                Err(e) => debug!("Skipping parent candidate {}: {}", prefix.prefix, e),
            }
        }
        // Longest prefix length first, NetBox order on ties
        candidates.sort_by(|a, b| b.0.prefix_len().cmp(&a.0.prefix_len()));

        for (net, id) in candidates {
            let available = self.available_prefixes(id).await?;
            if best_fit_prefix(&available, requested).is_ok() {
                return Ok(net);
            }
            debug!("Parent candidate {} has no room for /{}", net, requested);
        }
        Err(ResolutionError::NoParentCandidate)
    }

    async fn selector_filters(&self, selector: &BTreeMap<String, String>) -> Result<Vec<(String, String)>, ResolutionError> {
        let mut filters = Vec::new();
        let mut missing = Vec::new();

        for (key, value) in selector {
            match key.as_str() {
                "tenant" => {
                    let tenant = lookup::find_tenant(self.netbox, value)
                        .await?
                        .ok_or_else(|| ResolutionError::InvalidSelector(format!("tenant {} does not exist", value)))?;
                    filters.push(("tenant_id".to_string(), tenant.id.to_string()));
                }
                "site" => {
                    let site = lookup::find_site(self.netbox, value)
                        .await?
                        .ok_or_else(|| ResolutionError::InvalidSelector(format!("site {} does not exist", value)))?;
                    filters.push(("site_id".to_string(), site.id.to_string()));
                }
                "family" => {
                    let family = match value.as_str() {
                        "IPv4" => "4",
                        "IPv6" => "6",
                        other => {
                            return Err(ResolutionError::InvalidSelector(format!(
                                "family must be IPv4 or IPv6, got {}",
                                other
                            )));
                        }
                    };
                    filters.push(("family".to_string(), family.to_string()));
                }
                field => {
                    let defined = self.netbox.query_custom_fields(&[("name", field)], false).await?;
                    if defined.is_empty() {
                        missing.push(field.to_string());
                    }
                    filters.push((format!("cf_{}", field), value.clone()));
                }
            }
        }

        if !missing.is_empty() {
            return Err(ResolutionError::InvalidSelector(format!(
                "netbox custom fields {} do not exist",
                missing.join(", ")
            )));
        }
        Ok(filters)
    }

    // IP addresses

    /// Restore or allocate a single address from `parent`, as a host prefix
    pub async fn resolve_ip_address(&self, hash: &str, parent: &str) -> Result<Resolved<IpNet>, ResolutionError> {
        let filter = self.hash_filter();
        let found = self.netbox.query_ip_addresses(&[(filter.as_str(), hash)], false).await?;
        if let Some(existing) = Self::single("IP address", hash, found)? {
            let ip = parse_host(&existing.address).map_err(|_| ResolutionError::Malformed {
                kind: "IP address",
                value: existing.address.clone(),
            })?;
            let restored = host_prefix(ip);
            check_membership(parent, &restored)?;
            return Ok(Resolved::restored(restored));
        }

        let parent_prefix = self.find_parent(parent).await?;
        let available = self.available_ips(parent_prefix.id, Some(1)).await?;
        Ok(Resolved::allocated(first_available_ip(&available)?))
    }

    async fn available_ips(&self, prefix_id: u64, limit: Option<u32>) -> Result<Vec<IpAddr>, ResolutionError> {
        self.netbox
            .get_available_ips(prefix_id, limit)
            .await?
            .iter()
            .map(|ip| parse_host(&ip.address).map_err(ResolutionError::from))
            .collect()
    }

    // IP ranges

    /// Restore or allocate `size` consecutive addresses from `parent`
    pub async fn resolve_ip_range(
        &self,
        hash: &str,
        parent: &str,
        size: u32,
    ) -> Result<Resolved<(IpAddr, IpAddr)>, ResolutionError> {
        validate_range_size(size)?;

        let filter = self.hash_filter();
        let found = self.netbox.query_ip_ranges(&[(filter.as_str(), hash)], false).await?;
        if let Some(existing) = Self::single("IP range", hash, found)? {
            let malformed = || ResolutionError::Malformed {
                kind: "IP range",
                value: format!("{}-{}", existing.start_address, existing.end_address),
            };
            let start = parse_host(&existing.start_address).map_err(|_| malformed())?;
            let end = parse_host(&existing.end_address).map_err(|_| malformed())?;
            let actual = range_size(start, end).ok_or_else(malformed)?;
            if actual != u128::from(size) {
                return Err(ResolutionError::SizeMismatch { requested: size, actual });
            }
            check_membership(parent, &host_prefix(start))?;
            check_membership(parent, &host_prefix(end))?;
            return Ok(Resolved::restored((start, end)));
        }

        let parent_prefix = self.find_parent(parent).await?;
        let available = self.available_ips(parent_prefix.id, None).await?;
        Ok(Resolved::allocated(find_consecutive_run(&available, size)?))
    }

    // VLANs

    pub async fn find_vlan_group(&self, group: &str) -> Result<VlanGroup, ResolutionError> {
        lookup::find_vlan_group(self.netbox, group)
            .await?
            .ok_or_else(|| ResolutionError::VlanGroupNotFound(group.to_string()))
    }

    /// Restore the VID tagged with `hash`, else use `requested` or the lowest free VID
    pub async fn resolve_vlan(
        &self,
        hash: &str,
        group: &str,
        requested: Option<u16>,
    ) -> Result<Resolved<u16>, ResolutionError> {
        let vlan_group = self.find_vlan_group(group).await?;
        let group_id = vlan_group.id.to_string();

        let filter = self.hash_filter();
        let found = self
            .netbox
            .query_vlans(&[("group_id", group_id.as_str()), (filter.as_str(), hash)], false)
            .await?;
        if let Some(existing) = Self::single("VLAN", hash, found)? {
            return Ok(Resolved::restored(existing.vid));
        }

        let used: BTreeSet<u16> = self
            .netbox
            .query_vlans(&[("group_id", group_id.as_str())], true)
            .await?
            .iter()
            .map(|v| v.vid)
            .collect();

        match requested {
            Some(vid) if used.contains(&vid) => Err(ResolutionError::VlanIdInUse {
                vid,
                group: group.to_string(),
            }),
            Some(vid) => Ok(Resolved::allocated(vid)),
            None => (1..=MAX_VLAN_ID)
                .find(|vid| !used.contains(vid))
                .map(Resolved::allocated)
                .ok_or_else(|| ResolutionError::VlanIdsExhausted(group.to_string())),
        }
    }
}

fn check_membership(parent: &str, restored: &IpNet) -> Result<(), ResolutionError> {
    if parse_prefix(parent)?.contains(restored) {
        Ok(())
    } else {
        Err(ResolutionError::RestoredOutsideParent {
            value: restored.to_string(),
            parent: parent.to_string(),
        })
    }
}
