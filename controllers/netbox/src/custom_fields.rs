//! Custom field merging with tombstones.
//!
//! NetBox has no "delete custom field value" operation. To remove a key the
//! controller set earlier it has to write an empty value. The set of keys last
//! pushed to NetBox is remembered in an annotation on the resource and used as
//! the baseline for the next write.

use crate::error::ControllerError;
use crds::CustomFields;
use std::collections::BTreeMap;

/// Annotation holding the custom fields last written to NetBox (JSON object)
pub const MANAGED_CUSTOM_FIELDS_ANNOTATION: &str = "dcops.microscaler.io/managed-custom-fields";

/// Read the managed custom fields snapshot from an object's annotations.
///
/// A missing or empty annotation is an empty snapshot. A value that is not a
/// JSON object of strings is reported as [`ControllerError::CorruptSnapshot`],
/// which the caller retries.
pub fn parse_snapshot(
    object: &str,
    annotations: &BTreeMap<String, String>,
) -> Result<CustomFields, ControllerError> {
    match annotations.get(MANAGED_CUSTOM_FIELDS_ANNOTATION) {
        None => Ok(CustomFields::new()),
        Some(raw) if raw.trim().is_empty() => Ok(CustomFields::new()),
        Some(raw) => serde_json::from_str(raw)
            .map_err(|e| ControllerError::CorruptSnapshot(object.to_string(), e.to_string())),
    }
}

/// Custom fields to send to NetBox.
///
/// Every key of `spec` with its value, plus an empty tombstone for every key
/// that was in `snapshot` but is gone from `spec`.
pub fn merge_custom_fields(spec: &CustomFields, snapshot: &CustomFields) -> CustomFields {
    let mut merged = spec.clone();
    for key in snapshot.keys() {
        merged.entry(key.clone()).or_default();
    }
    merged
}

/// Annotation value to store after a successful write: exactly the spec keys
pub fn snapshot_annotation(spec: &CustomFields) -> Result<String, ControllerError> {
    Ok(serde_json::to_string(spec)?)
}
