//! Service reconciler.
//!
//! Mirrors the ingress IPs of a `LoadBalancer` Service into NetBoxIpAddress
//! resources owned by the Service. Every mirrored resource carries the
//! Service's labels, which is how stale ones are found and pruned when an IP
//! goes away or the Service stops being a load balancer.

use super::claim::owner_reference;
use super::{object_key, Reconciler};
use crate::allocation::host_prefix;
use crate::error::ControllerError;
use crds::{NetBoxIpAddress, NetBoxIpAddressSpec};
use k8s_openapi::api::core::v1::Service;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::{DeleteParams, ListParams};
use kube::ResourceExt;
use kube_runtime::controller::Action;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::net::IpAddr;
use tracing::{debug, info};

pub const MANAGED_BY_LABEL: &str = "dcops.microscaler.io/managed-by";
pub const MANAGED_BY_VALUE: &str = "service-loadbalancer";
pub const SERVICE_UID_LABEL: &str = "dcops.microscaler.io/service-uid";
pub const SERVICE_NAME_LABEL: &str = "dcops.microscaler.io/service-name";
pub const SERVICE_NAMESPACE_LABEL: &str = "dcops.microscaler.io/service-namespace";

const LOAD_BALANCER: &str = "LoadBalancer";

/// Ingress IPs of a LoadBalancer Service with a host mask, without duplicates.
///
/// Any other Service type, and hostname-only ingress entries, yield nothing.
pub fn load_balancer_ips(service: &Service) -> Vec<String> {
    let is_load_balancer = service
        .spec
        .as_ref()
        .and_then(|s| s.type_.as_deref())
        .is_some_and(|t| t == LOAD_BALANCER);
    if !is_load_balancer {
        return Vec::new();
    }

    let ingress = service
        .status
        .as_ref()
        .and_then(|s| s.load_balancer.as_ref())
        .and_then(|lb| lb.ingress.as_ref());

    let mut ips: Vec<String> = Vec::new();
    for ip in ingress.into_iter().flatten().filter_map(|i| i.ip.as_deref()) {
        let ip = with_host_mask(ip);
        if !ips.contains(&ip) {
            ips.push(ip);
        }
    }
    ips
}

fn with_host_mask(ip: &str) -> String {
    let ip = ip.trim();
    if ip.contains('/') {
        return ip.to_string();
    }
    match ip.parse::<IpAddr>() {
        Ok(addr) => host_prefix(addr).to_string(),
        Err(_) => ip.to_string(),
    }
}

/// Labels tying a mirrored IP address to its Service
pub fn service_labels(service: &Service) -> BTreeMap<String, String> {
    BTreeMap::from([
        (MANAGED_BY_LABEL.to_string(), MANAGED_BY_VALUE.to_string()),
        (SERVICE_UID_LABEL.to_string(), service.uid().unwrap_or_default()),
        (SERVICE_NAME_LABEL.to_string(), service.name_any()),
        (SERVICE_NAMESPACE_LABEL.to_string(), service.namespace().unwrap_or_default()),
    ])
}

fn label_selector(labels: &BTreeMap<String, String>) -> String {
    labels
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join(",")
}

/// "{service}-{first four digest bytes of the address}", stable per address
pub fn ip_address_name(service: &str, ip: &str) -> String {
    let digest = Sha256::digest(ip.as_bytes());
    format!("{}-{}", service, hex::encode(&digest[..4]))
}

/// The IP address resource mirroring `ip` of `service`
pub fn desired_ip_address(service: &Service, ip: &str) -> Result<NetBoxIpAddress, ControllerError> {
    let namespace = super::namespace_of(service)?;
    let name = service.name_any();
    Ok(NetBoxIpAddress {
        metadata: ObjectMeta {
            name: Some(ip_address_name(&name, ip)),
            namespace: Some(namespace.clone()),
            labels: Some(service_labels(service)),
            owner_references: Some(vec![owner_reference(service)?]),
            ..Default::default()
        },
        spec: NetBoxIpAddressSpec {
            ip_address: ip.to_string(),
            description: Some(format!("Service {}/{}", namespace, name)),
            preserve_in_netbox: false,
            ..Default::default()
        },
        status: None,
    })
}

/// Names of the mirrored addresses whose IP is no longer wanted
pub fn stale_ip_addresses(existing: &[NetBoxIpAddress], desired: &[String]) -> Vec<String> {
    existing
        .iter()
        .filter(|ip| !desired.contains(&ip.spec.ip_address))
        .map(|ip| ip.name_any())
        .collect()
}

/// Whether an existing mirrored address has to be rewritten to match `desired`
fn needs_update(existing: &NetBoxIpAddress, desired: &NetBoxIpAddress) -> bool {
    existing.spec != desired.spec
        || desired
            .labels()
            .iter()
            .any(|(k, v)| existing.labels().get(k) != Some(v))
}

impl Reconciler {
    pub async fn reconcile_service(&self, service: &Service) -> Result<Action, ControllerError> {
        let key = object_key(service);
        let namespace = super::namespace_of(service)?;
        let desired = load_balancer_ips(service);
        debug!("Reconciling Service {} with {} load balancer IPs", key, desired.len());

        let api = self.api::<NetBoxIpAddress>(&namespace);
        for ip in &desired {
            let wanted = desired_ip_address(service, ip)?;
            match api.get_opt(&wanted.name_any()).await? {
                None => self.create_resource(&wanted).await?,
                Some(mut existing) if needs_update(&existing, &wanted) => {
                    existing.spec = wanted.spec.clone();
                    existing.labels_mut().extend(service_labels(service));
                    self.replace(&existing).await?;
                    info!("{}: updated IpAddress {}", key, existing.name_any());
                }
                Some(_) => {}
            }
        }

        let selector = label_selector(&service_labels(service));
        let existing = api.list(&ListParams::default().labels(&selector)).await?.items;
        for name in stale_ip_addresses(&existing, &desired) {
            match api.delete(&name, &DeleteParams::default()).await {
                Ok(_) => info!("{}: deleted stale IpAddress {}", key, name),
                Err(kube::Error::Api(e)) if e.code == 404 => {}
                Err(e) => return Err(e.into()),
            }
        }

        Ok(Action::await_change())
    }
}
