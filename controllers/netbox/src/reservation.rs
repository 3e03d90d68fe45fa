//! Backend writes for resources.
//!
//! Each resource is looked up in NetBox by its allocation literal and then
//! created or updated. When the resource carries a restoration hash, an
//! existing object with a different hash belongs to another claim and is
//! reported instead of overwritten.

use crate::config::OperatorConfig;
use crate::lookup;
use crds::{CustomFields, NetBoxIpAddress, NetBoxIpRange, NetBoxPrefix, NetBoxVlan, TagReference};
use kube::ResourceExt;
use netbox_client::{
    NetBoxClientTrait, NetBoxError, WritableIPAddress, WritableIpRange, WritablePrefix, WritableTag,
    WritableVlan,
};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Appended to everything the controller writes into free-text fields
pub const WARNING_COMMENT: &str =
    " // managed by netbox-operator, please don't edit it in Netbox unless you know what you're doing";

/// NetBox rejects longer descriptions
pub const MAX_DESCRIPTION_LENGTH: usize = 200;

/// Part of the warning that is kept when the description fills the field
const MIN_WARNING_LENGTH: usize = 30;

/// Custom field marking VLANs written by this controller
pub const MANAGED_BY_FIELD: &str = "managed_by";
pub const MANAGED_BY_VALUE: &str = "netbox-operator";

const STATUS_ACTIVE: &str = "active";

#[derive(Debug, Error)]
pub enum ReservationError {
    #[error(transparent)]
    NetBox(#[from] NetBoxError),

    #[error("tenant {0} not found in NetBox")]
    TenantNotFound(String),

    #[error("site {0} not found in NetBox")]
    SiteNotFound(String),

    #[error("VLAN group {0} not found in NetBox")]
    VlanGroupNotFound(String),
}

/// Result of reserving a resource
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReserveOutcome {
    /// Created or updated, with the NetBox ID
    Reserved(u64),
    /// The object exists but was allocated for a different claim
    HashMismatch(u64),
}

/// What to do with the objects found under a resource's allocation literal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WritePlan {
    Create,
    Update(u64),
    HashMismatch(u64),
}

/// Decide between create, update and refusing to touch a foreign object.
///
/// `existing` yields `(id, recorded hash)` in NetBox order; only the first
/// object is considered. Without a desired hash any existing object is adopted.
pub fn plan_write<I>(existing: I, desired_hash: Option<&str>) -> WritePlan
where
    I: IntoIterator<Item = (u64, Option<String>)>,
{
    let Some((id, recorded)) = existing.into_iter().next() else {
        return WritePlan::Create;
    };
    match desired_hash {
        Some(hash) if recorded.as_deref() != Some(hash) => WritePlan::HashMismatch(id),
        _ => WritePlan::Update(id),
    }
}

/// Append the warning to a description, keeping the result within
/// [`MAX_DESCRIPTION_LENGTH`] characters.
///
/// A long description is cut so that a shortened warning still fits.
/// Otherwise only the warning is cut.
pub fn truncate_description(description: &str) -> String {
    let with_warning = format!("{}{}", description, WARNING_COMMENT);
    if with_warning.chars().count() <= MAX_DESCRIPTION_LENGTH {
        return with_warning;
    }

    let room = MAX_DESCRIPTION_LENGTH - MIN_WARNING_LENGTH;
    if description.chars().count() > room {
        let head: String = description.chars().take(room).collect();
        let warning: String = WARNING_COMMENT.chars().take(MIN_WARNING_LENGTH).collect();
        return head + &warning;
    }
    with_warning.chars().take(MAX_DESCRIPTION_LENGTH).collect()
}

/// NetBox description of a resource: "namespace/name // description" plus the warning
pub fn format_description(namespace: &str, name: &str, description: Option<&str>) -> String {
    truncate_description(&format!(
        "{}/{} // {}",
        namespace,
        name,
        description.unwrap_or_default()
    ))
}

pub fn format_comments(comments: Option<&str>) -> String {
    format!("{}{}", comments.unwrap_or_default(), WARNING_COMMENT)
}

fn writable_tags(tags: &[TagReference]) -> Vec<WritableTag> {
    tags.iter()
        .map(|t| WritableTag {
            name: t.name.clone(),
            slug: t.slug.clone(),
        })
        .collect()
}

/// Writes resources to NetBox
pub struct Reserver<'a> {
    netbox: &'a dyn NetBoxClientTrait,
    hash_field: &'a str,
}

impl<'a> Reserver<'a> {
    pub fn new(netbox: &'a dyn NetBoxClientTrait, config: &'a OperatorConfig) -> Self {
        Self {
            netbox,
            hash_field: &config.restoration_hash_field,
        }
    }

    fn desired_hash<'f>(&self, custom_fields: &'f CustomFields) -> Option<&'f str> {
        custom_fields
            .get(self.hash_field)
            .map(String::as_str)
            .filter(|h| !h.is_empty())
    }

    async fn tenant_id(&self, tenant: Option<&str>) -> Result<Option<u64>, ReservationError> {
        let Some(tenant) = tenant.filter(|t| !t.is_empty()) else {
            return Ok(None);
        };
        lookup::find_tenant(self.netbox, tenant)
            .await?
            .map(|t| Some(t.id))
            .ok_or_else(|| ReservationError::TenantNotFound(tenant.to_string()))
    }

    async fn site_id(&self, site: Option<&str>) -> Result<Option<u64>, ReservationError> {
        let Some(site) = site.filter(|s| !s.is_empty()) else {
            return Ok(None);
        };
        lookup::find_site(self.netbox, site)
            .await?
            .map(|s| Some(s.id))
            .ok_or_else(|| ReservationError::SiteNotFound(site.to_string()))
    }

    /// Create or update a prefix. `custom_fields` is the merged set including tombstones.
    pub async fn reserve_prefix(&self, prefix: &NetBoxPrefix, custom_fields: CustomFields) -> Result<ReserveOutcome, ReservationError> {
        let namespace = prefix.namespace().unwrap_or_default();
        let spec = &prefix.spec;

        let existing = self.netbox.query_prefixes(&[("prefix", spec.prefix.as_str())], false).await?;
        let plan = plan_write(
            existing.iter().map(|p| (p.id, p.custom_field(self.hash_field))),
            self.desired_hash(&custom_fields),
        );

        let payload = WritablePrefix {
            prefix: spec.prefix.clone(),
            status: STATUS_ACTIVE.to_string(),
            site: self.site_id(spec.site.as_deref()).await?,
            tenant: self.tenant_id(spec.tenant.as_deref()).await?,
            description: format_description(&namespace, &prefix.name_any(), spec.description.as_deref()),
            comments: format_comments(spec.comments.as_deref()),
            custom_fields,
            tags: writable_tags(&spec.tags),
        };

        match plan {
            WritePlan::Create => {
                let created = self.netbox.create_prefix(&payload).await?;
                info!("Created prefix {} in NetBox (id {})", created.prefix, created.id);
                Ok(ReserveOutcome::Reserved(created.id))
            }
            WritePlan::Update(id) => {
                let updated = self.netbox.update_prefix(id, &payload).await?;
                debug!("Updated prefix {} in NetBox (id {})", updated.prefix, updated.id);
                Ok(ReserveOutcome::Reserved(updated.id))
            }
            WritePlan::HashMismatch(id) => Ok(ReserveOutcome::HashMismatch(id)),
        }
    }

    pub async fn reserve_ip_address(&self, ip: &NetBoxIpAddress, custom_fields: CustomFields) -> Result<ReserveOutcome, ReservationError> {
        let namespace = ip.namespace().unwrap_or_default();
        let spec = &ip.spec;

        let existing = self
            .netbox
            .query_ip_addresses(&[("address", spec.ip_address.as_str())], false)
            .await?;
        let plan = plan_write(
            existing.iter().map(|a| (a.id, a.custom_field(self.hash_field))),
            self.desired_hash(&custom_fields),
        );

        let payload = WritableIPAddress {
            address: spec.ip_address.clone(),
            status: STATUS_ACTIVE.to_string(),
            tenant: self.tenant_id(spec.tenant.as_deref()).await?,
            description: format_description(&namespace, &ip.name_any(), spec.description.as_deref()),
            comments: format_comments(spec.comments.as_deref()),
            custom_fields,
            tags: writable_tags(&spec.tags),
        };

        match plan {
            WritePlan::Create => {
                let created = self.netbox.create_ip_address(&payload).await?;
                info!("Created IP address {} in NetBox (id {})", created.address, created.id);
                Ok(ReserveOutcome::Reserved(created.id))
            }
            WritePlan::Update(id) => {
                let updated = self.netbox.update_ip_address(id, &payload).await?;
                debug!("Updated IP address {} in NetBox (id {})", updated.address, updated.id);
                Ok(ReserveOutcome::Reserved(updated.id))
            }
            WritePlan::HashMismatch(id) => Ok(ReserveOutcome::HashMismatch(id)),
        }
    }

    pub async fn reserve_ip_range(&self, range: &NetBoxIpRange, custom_fields: CustomFields) -> Result<ReserveOutcome, ReservationError> {
        let namespace = range.namespace().unwrap_or_default();
        let spec = &range.spec;

        let existing = self
            .netbox
            .query_ip_ranges(
                &[
                    ("start_address", spec.start_address.as_str()),
                    ("end_address", spec.end_address.as_str()),
                ],
                false,
            )
            .await?;
        let plan = plan_write(
            existing.iter().map(|r| (r.id, r.custom_field(self.hash_field))),
            self.desired_hash(&custom_fields),
        );

        let payload = WritableIpRange {
            start_address: spec.start_address.clone(),
            end_address: spec.end_address.clone(),
            status: STATUS_ACTIVE.to_string(),
            tenant: self.tenant_id(spec.tenant.as_deref()).await?,
            mark_populated: true,
            description: format_description(&namespace, &range.name_any(), spec.description.as_deref()),
            comments: format_comments(spec.comments.as_deref()),
            custom_fields,
            tags: writable_tags(&spec.tags),
        };

        match plan {
            WritePlan::Create => {
                let created = self.netbox.create_ip_range(&payload).await?;
                info!(
                    "Created IP range {}-{} in NetBox (id {})",
                    created.start_address, created.end_address, created.id
                );
                Ok(ReserveOutcome::Reserved(created.id))
            }
            WritePlan::Update(id) => {
                let updated = self.netbox.update_ip_range(id, &payload).await?;
                debug!("Updated IP range {} in NetBox", updated.id);
                Ok(ReserveOutcome::Reserved(updated.id))
            }
            WritePlan::HashMismatch(id) => Ok(ReserveOutcome::HashMismatch(id)),
        }
    }

    /// Create or update a VLAN in its group. VLANs are tagged `managed_by=netbox-operator`.
    pub async fn reserve_vlan(&self, vlan: &NetBoxVlan, mut custom_fields: CustomFields) -> Result<ReserveOutcome, ReservationError> {
        let namespace = vlan.namespace().unwrap_or_default();
        let spec = &vlan.spec;

        let group = lookup::find_vlan_group(self.netbox, &spec.vlan_group)
            .await?
            .ok_or_else(|| ReservationError::VlanGroupNotFound(spec.vlan_group.clone()))?;
        let group_id = group.id.to_string();
        let vid = spec.vlan_id.to_string();

        let existing = self
            .netbox
            .query_vlans(&[("group_id", group_id.as_str()), ("vid", vid.as_str())], false)
            .await?;
        let plan = plan_write(
            existing.iter().map(|v| (v.id, v.custom_field(self.hash_field))),
            self.desired_hash(&custom_fields),
        );
        if let (WritePlan::Update(_), Some(current)) = (plan, existing.first()) {
            if current.custom_field(MANAGED_BY_FIELD).as_deref() != Some(MANAGED_BY_VALUE) {
                info!("Taking ownership of unmanaged VLAN {} in group {}", spec.vlan_id, group.name);
            }
        }

        custom_fields.insert(MANAGED_BY_FIELD.to_string(), MANAGED_BY_VALUE.to_string());
        let payload = WritableVlan {
            vid: spec.vlan_id,
            name: spec.name.clone(),
            status: STATUS_ACTIVE.to_string(),
            group: group.id,
            site: self.site_id(spec.site.as_deref()).await?,
            tenant: self.tenant_id(spec.tenant.as_deref()).await?,
            description: format_description(&namespace, &vlan.name_any(), spec.description.as_deref()),
            comments: format_comments(spec.comments.as_deref()),
            custom_fields,
            tags: writable_tags(&spec.tags),
        };

        match plan {
            WritePlan::Create => {
                let created = self.netbox.create_vlan(&payload).await?;
                info!("Created VLAN {} ({}) in NetBox (id {})", created.vid, created.name, created.id);
                Ok(ReserveOutcome::Reserved(created.id))
            }
            WritePlan::Update(id) => {
                let updated = self.netbox.update_vlan(id, &payload).await?;
                debug!("Updated VLAN {} in NetBox (id {})", updated.vid, updated.id);
                Ok(ReserveOutcome::Reserved(updated.id))
            }
            WritePlan::HashMismatch(id) => {
                warn!("VLAN {} in group {} belongs to another claim", spec.vlan_id, group.name);
                Ok(ReserveOutcome::HashMismatch(id))
            }
        }
    }
}
