//! Name-or-slug lookups of NetBox objects referenced by claims and resources.
//!
//! Users may give either the display name or the slug. The name is tried first.

use netbox_client::{NetBoxClientTrait, NetBoxError, Site, Tenant, VlanGroup};

pub async fn find_tenant(netbox: &dyn NetBoxClientTrait, tenant: &str) -> Result<Option<Tenant>, NetBoxError> {
    let by_name = netbox.query_tenants(&[("name", tenant)], false).await?;
    if let Some(found) = by_name.into_iter().next() {
        return Ok(Some(found));
    }
    Ok(netbox.query_tenants(&[("slug", tenant)], false).await?.into_iter().next())
}

pub async fn find_site(netbox: &dyn NetBoxClientTrait, site: &str) -> Result<Option<Site>, NetBoxError> {
    let by_name = netbox.query_sites(&[("name", site)], false).await?;
    if let Some(found) = by_name.into_iter().next() {
        return Ok(Some(found));
    }
    Ok(netbox.query_sites(&[("slug", site)], false).await?.into_iter().next())
}

pub async fn find_vlan_group(netbox: &dyn NetBoxClientTrait, group: &str) -> Result<Option<VlanGroup>, NetBoxError> {
    let by_name = netbox.query_vlan_groups(&[("name", group)], false).await?;
    if let Some(found) = by_name.into_iter().next() {
        return Ok(Some(found));
    }
    Ok(netbox.query_vlan_groups(&[("slug", group)], false).await?.into_iter().next())
}
