//! Controller-specific error types.
//!
//! Errors returned from a reconcile are retried by the watcher with a
//! per-object backoff. Business outcomes such as an exhausted pool or a busy
//! lock are reported through conditions instead and never surface here.

use crate::claim_resolution::ResolutionError;
use crate::lease::LeaseError;
use crate::reservation::ReservationError;
use kube::Error as KubeError;
use netbox_client::NetBoxError;
use thiserror::Error;

/// Errors that can occur in the NetBox IPAM Controller.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// Kubernetes API error
    #[error("Kubernetes error: {0}")]
    Kube(#[from] KubeError),

    /// NetBox API error
    #[error("NetBox error: {0}")]
    NetBox(#[from] NetBoxError),

    #[error("Claim resolution failed: {0}")]
    Resolution(#[from] ResolutionError),

    #[error("Reservation failed: {0}")]
    Reservation(#[from] ReservationError),

    #[error("Lease error: {0}")]
    Lease(#[from] LeaseError),

    /// Invalid configuration or object metadata
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// JSON (de)serialization of a patch or annotation failed
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The managed custom fields annotation could not be parsed
    #[error("Corrupt managed custom fields annotation on {0}: {1}")]
    CorruptSnapshot(String, String),

    /// Resource watch failed
    #[error("Resource watch failed: {0}")]
    Watch(String),
}
