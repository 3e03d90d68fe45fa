//! Condition templates and reporting.
//!
//! Conditions are the only place users see why an object is not ready, so
//! every change is also logged with its reason.

use crds::{set_condition, Condition, ConditionStatus, CONDITION_READY};
use std::fmt;
use tracing::{info, warn};

/// A condition with a fixed type, status, reason and base message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConditionTemplate {
    pub type_: &'static str,
    pub status: ConditionStatus,
    pub reason: &'static str,
    pub message: &'static str,
}

impl ConditionTemplate {
    const fn new(type_: &'static str, status: ConditionStatus, reason: &'static str, message: &'static str) -> Self {
        Self { type_, status, reason, message }
    }

    /// Build the condition. An attached error is appended as "message: error".
    pub fn build(&self, error: Option<&dyn fmt::Display>, generation: Option<i64>) -> Condition {
        let message = match error {
            Some(e) => format!("{}: {}", self.message, e),
            None => self.message.to_string(),
        };
        Condition::new(self.type_, self.status, self.reason, message).with_generation(generation)
    }
}

/// Apply a condition to `conditions` and log it when it changed.
///
/// `object` is "namespace/name" and is only used for the log line.
pub fn report(
    object: &str,
    conditions: &mut Vec<Condition>,
    template: &ConditionTemplate,
    error: Option<&dyn fmt::Display>,
    generation: Option<i64>,
) -> bool {
    let condition = template.build(error, generation);
    let message = condition.message.clone();
    let changed = set_condition(conditions, condition);
    if changed {
        match template.status {
            ConditionStatus::True => info!("{}: {} ({})", object, message, template.reason),
            _ => warn!("{}: {} ({})", object, message, template.reason),
        }
    }
    changed
}

const TRUE: ConditionStatus = ConditionStatus::True;
const FALSE: ConditionStatus = ConditionStatus::False;

/// Every resource starts here until its first backend write
pub const NEW_RESOURCE: ConditionTemplate =
    ConditionTemplate::new(CONDITION_READY, FALSE, "NewResource", "Pending Reconciliation");

/// The NetBox object is tagged with another claim's restoration hash
pub const RESTORATION_HASH_MISMATCH: ConditionTemplate = ConditionTemplate::new(
    CONDITION_READY,
    FALSE,
    "RestorationHashMismatch",
    "Object in NetBox belongs to a different claim",
);

pub mod prefix {
    use super::*;

    pub const RESERVED: ConditionTemplate =
        ConditionTemplate::new(CONDITION_READY, TRUE, "PrefixReservedInNetbox", "Prefix was reserved in NetBox");
    pub const RESERVE_FAILED: ConditionTemplate = ConditionTemplate::new(
        CONDITION_READY,
        FALSE,
        "FailedToReservePrefixInNetbox",
        "Failed to reserve prefix in NetBox",
    );
    pub const DELETE_FAILED: ConditionTemplate = ConditionTemplate::new(
        CONDITION_READY,
        FALSE,
        "FailedToDeletePrefixInNetbox",
        "Failed to delete prefix in Netbox",
    );

    pub const CLAIM_READY: ConditionTemplate =
        ConditionTemplate::new(CONDITION_READY, TRUE, "PrefixClaimResourceReady", "Prefix Resource is ready");
    pub const CLAIM_NOT_READY: ConditionTemplate = ConditionTemplate::new(
        CONDITION_READY,
        FALSE,
        "PrefixClaimResourceNotReady",
        "Prefix Resource is not ready",
    );

    pub const ASSIGNED_TYPE: &str = "PrefixAssigned";
    pub const ASSIGNED: ConditionTemplate = ConditionTemplate::new(
        ASSIGNED_TYPE,
        TRUE,
        "PrefixCRCreated",
        "New prefix fetched from NetBox and prefix CR was created",
    );
    pub const NOT_ASSIGNED: ConditionTemplate = ConditionTemplate::new(
        ASSIGNED_TYPE,
        FALSE,
        "PrefixCRNotCreated",
        "Failed to fetch new Prefix from NetBox",
    );

    pub const PARENT_SELECTED_TYPE: &str = "ParentPrefixSelected";
    pub const PARENT_SELECTED: ConditionTemplate = ConditionTemplate::new(
        PARENT_SELECTED_TYPE,
        TRUE,
        "ParentPrefixSelected",
        "The parent prefix was selected successfully",
    );
    pub const PARENT_NOT_SELECTED: ConditionTemplate = ConditionTemplate::new(
        PARENT_SELECTED_TYPE,
        FALSE,
        "NoParentPrefixSelected",
        "The parent prefix was not able to be selected",
    );
}

pub mod ip_address {
    use super::*;

    pub const RESERVED: ConditionTemplate =
        ConditionTemplate::new(CONDITION_READY, TRUE, "IpAddressReservedInNetbox", "IP was reserved/updated in NetBox");
    pub const RESERVE_FAILED: ConditionTemplate = ConditionTemplate::new(
        CONDITION_READY,
        FALSE,
        "FailedToReserveIpAddressInNetbox",
        "Failed to reserve IP in NetBox",
    );
    pub const DELETE_FAILED: ConditionTemplate = ConditionTemplate::new(
        CONDITION_READY,
        FALSE,
        "FailedToDeleteIpAddressInNetbox",
        "Failed to delete IP in NetBox",
    );

    pub const CLAIM_READY: ConditionTemplate =
        ConditionTemplate::new(CONDITION_READY, TRUE, "IPAddressResourceReady", "IPAddress Resource is ready");
    pub const CLAIM_NOT_READY: ConditionTemplate = ConditionTemplate::new(
        CONDITION_READY,
        FALSE,
        "IPAddressResourceNotReady",
        "IPAddress Resource is not ready",
    );

    pub const ASSIGNED_TYPE: &str = "IPAssigned";
    pub const ASSIGNED: ConditionTemplate = ConditionTemplate::new(
        ASSIGNED_TYPE,
        TRUE,
        "IPAddressCRCreated",
        "New IP fetched from NetBox and IPAddress CR was created",
    );
    pub const NOT_ASSIGNED: ConditionTemplate = ConditionTemplate::new(
        ASSIGNED_TYPE,
        FALSE,
        "IPAddressCRNotCreated",
        "Failed to fetch new IP from NetBox",
    );
}

pub mod ip_range {
    use super::*;

    pub const RESERVED: ConditionTemplate =
        ConditionTemplate::new(CONDITION_READY, TRUE, "IpRangeReservedInNetbox", "Ip Range was reserved/updated in NetBox");
    pub const RESERVE_FAILED: ConditionTemplate = ConditionTemplate::new(
        CONDITION_READY,
        FALSE,
        "FailedToReserveIpRangeInNetbox",
        "Failed to reserve Ip Range in NetBox",
    );
    pub const DELETE_FAILED: ConditionTemplate = ConditionTemplate::new(
        CONDITION_READY,
        FALSE,
        "FailedToDeleteIpRangeInNetbox",
        "Failed to delete Ip Range in NetBox",
    );

    pub const CLAIM_READY: ConditionTemplate =
        ConditionTemplate::new(CONDITION_READY, TRUE, "IPRangeResourceReady", "IpRange Resource is ready");
    pub const CLAIM_NOT_READY: ConditionTemplate = ConditionTemplate::new(
        CONDITION_READY,
        FALSE,
        "IPRangeResourceNotReady",
        "IpRange Resource is not ready",
    );

    pub const ASSIGNED_TYPE: &str = "IPRangeAssigned";
    pub const ASSIGNED: ConditionTemplate = ConditionTemplate::new(
        ASSIGNED_TYPE,
        TRUE,
        "IPRangeCRCreated",
        "New IP Range fetched from NetBox and IpRange CR was created",
    );
    pub const NOT_ASSIGNED: ConditionTemplate = ConditionTemplate::new(
        ASSIGNED_TYPE,
        FALSE,
        "IPRangeCRNotCreated",
        "Failed to fetch new IP Range from NetBox",
    );
    pub const SIZE_MISMATCH: ConditionTemplate = ConditionTemplate::new(
        ASSIGNED_TYPE,
        FALSE,
        "IPRangeSizeMismatch",
        "Size of restored IpRange does not match the requested size",
    );
}

pub mod vlan {
    use super::*;

    pub const RESERVED: ConditionTemplate =
        ConditionTemplate::new(CONDITION_READY, TRUE, "VlanReservedInNetbox", "VLAN was synchronized with NetBox");
    pub const RESERVE_FAILED: ConditionTemplate = ConditionTemplate::new(
        CONDITION_READY,
        FALSE,
        "FailedToReserveVlanInNetbox",
        "Failed to synchronize VLAN with NetBox",
    );
    pub const DELETE_FAILED: ConditionTemplate = ConditionTemplate::new(
        CONDITION_READY,
        FALSE,
        "FailedToDeleteVlanInNetbox",
        "Failed to delete VLAN in NetBox",
    );

    pub const CLAIM_READY: ConditionTemplate =
        ConditionTemplate::new(CONDITION_READY, TRUE, "VlanResourceReady", "Vlan Resource is ready");
    pub const CLAIM_NOT_READY: ConditionTemplate =
        ConditionTemplate::new(CONDITION_READY, FALSE, "VlanResourceNotReady", "Vlan Resource is not ready");

    pub const ASSIGNED_TYPE: &str = "VlanAssigned";
    pub const ASSIGNED: ConditionTemplate =
        ConditionTemplate::new(ASSIGNED_TYPE, TRUE, "VlanCRCreated", "VLAN VID assigned and Vlan CR created");
    pub const NOT_ASSIGNED: ConditionTemplate = ConditionTemplate::new(
        ASSIGNED_TYPE,
        FALSE,
        "VlanCRNotCreated",
        "Failed to assign VID or create Vlan CR",
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crds::{find_condition, is_condition_true};

    #[test]
    fn test_report_appends_error_to_message() {
        let mut conditions = Vec::new();
        let err = "connection refused";
        assert!(report("ns/a", &mut conditions, &prefix::RESERVE_FAILED, Some(&err), Some(3)));

        let ready = find_condition(&conditions, CONDITION_READY).unwrap();
        assert_eq!(ready.reason, "FailedToReservePrefixInNetbox");
        assert_eq!(ready.message, "Failed to reserve prefix in NetBox: connection refused");
        assert_eq!(ready.observed_generation, Some(3));
    }

    #[test]
    fn test_report_is_quiet_when_unchanged() {
        let mut conditions = Vec::new();
        assert!(report("ns/a", &mut conditions, &NEW_RESOURCE, None, None));
        assert!(!report("ns/a", &mut conditions, &NEW_RESOURCE, None, None));

        assert!(report("ns/a", &mut conditions, &vlan::RESERVED, None, None));
        assert!(is_condition_true(&conditions, CONDITION_READY));
        assert_eq!(conditions.len(), 1);
    }

    #[test]
    fn test_assigned_and_ready_are_separate() {
        let mut conditions = Vec::new();
        report("ns/r", &mut conditions, &ip_range::ASSIGNED, None, None);
        report("ns/r", &mut conditions, &ip_range::CLAIM_NOT_READY, None, None);

        assert!(is_condition_true(&conditions, ip_range::ASSIGNED_TYPE));
        assert!(!is_condition_true(&conditions, CONDITION_READY));
    }
}
