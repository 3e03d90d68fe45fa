//! Unit tests for the prefix claim's parent selection steps

#[cfg(test)]
mod tests {
    use crate::allocation::AllocationError;
    use crate::claim_resolution::{ResolutionError, Resolved};
    use crate::reconciler::claim::{Allocation, POOL_RETRY};
    use crate::reconciler::ipam::prefix_claim::*;
    use crate::status;
    use crate::test_utils::*;
    use crds::{find_condition, ConditionStatus, NetBoxPrefixClaimStatus};
    use kube_runtime::controller::Action;
    use serde_json::{json, Value};
    use std::ops::ControlFlow;
    use std::time::Duration;

    const KEY: &str = "team-a/web";
    const RETRY: Duration = Duration::from_secs(2);

    fn selected(parent: &str) -> NetBoxPrefixClaimStatus {
        NetBoxPrefixClaimStatus {
            selected_parent_prefix: Some(parent.to_string()),
            ..Default::default()
        }
    }

    /// JSON merge patch as the API server applies it to the stored object
    fn merge(target: &mut Value, patch: &Value) {
        match (target, patch) {
            (Value::Object(target), Value::Object(patch)) => {
                for (key, value) in patch {
                    if value.is_null() {
                        target.remove(key);
                    } else {
                        merge(target.entry(key.clone()).or_insert(Value::Null), value);
                    }
                }
            }
            (target, patch) => *target = patch.clone(),
        }
    }

    #[test]
    fn test_exhausted_selected_parent_is_cleared_on_the_server() {
        let mut stored = json!({ "status": selected("10.0.0.0/24") });
        let mut status = selected("10.0.0.0/24");

        let exhausted = Allocation::Failed(ResolutionError::Allocation(AllocationError::PoolExhausted));
        let step = prefix_allocation_step(KEY, &mut status, exhausted, true, RETRY, None).unwrap();
        assert_eq!(step, ControlFlow::Break(Action::requeue(RETRY)));
        assert_eq!(status.selected_parent_prefix, None);

        let assigned = find_condition(&status.conditions, status::prefix::ASSIGNED_TYPE).unwrap();
        assert_eq!(assigned.status, ConditionStatus::False);
        assert!(
            assigned.message.ends_with("will restart the parent prefix selection process"),
            "{}",
            assigned.message
        );

        merge(&mut stored, &json!({ "status": status }));
        assert!(stored["status"].get("selectedParentPrefix").is_none(), "{}", stored);
    }

    #[test]
    fn test_exhausted_literal_parent_keeps_selection() {
        let mut status = selected("10.0.0.0/24");
        let exhausted = Allocation::Failed(ResolutionError::Allocation(AllocationError::NoPrefixMatchesSize));

        let step = prefix_allocation_step(KEY, &mut status, exhausted, false, RETRY, None).unwrap();
        assert_eq!(step, ControlFlow::Break(Action::requeue(POOL_RETRY)));
        assert_eq!(status.selected_parent_prefix.as_deref(), Some("10.0.0.0/24"));
    }

    #[test]
    fn test_locked_parent_requeues_after_lock_retry() {
        let mut status = selected("10.0.0.0/24");
        let step = prefix_allocation_step(KEY, &mut status, Allocation::Locked, true, RETRY, None).unwrap();
        assert_eq!(step, ControlFlow::Break(Action::requeue(RETRY)));
        assert_eq!(status.selected_parent_prefix.as_deref(), Some("10.0.0.0/24"));
        assert!(status.conditions.is_empty());
    }

    #[test]
    fn test_resolved_prefix_continues() {
        let mut status = selected("10.0.0.0/24");
        let resolved = Resolved {
            value: "10.0.0.16/28".parse().unwrap(),
            restored: false,
        };
        let step = prefix_allocation_step(KEY, &mut status, Allocation::Resolved(resolved.clone()), true, RETRY, None)
            .unwrap();
        assert_eq!(step, ControlFlow::Continue(resolved));
    }

    #[test]
    fn test_parent_selection_is_recorded() {
        let mut status = NetBoxPrefixClaimStatus::default();
        let step = parent_selection_step(KEY, &mut status, Ok("10.1.0.0/24".to_string()), Some(3)).unwrap();
        assert_eq!(step, ControlFlow::Continue(()));
        assert_eq!(status.selected_parent_prefix.as_deref(), Some("10.1.0.0/24"));
        let condition = find_condition(&status.conditions, status::prefix::PARENT_SELECTED_TYPE).unwrap();
        assert_eq!(condition.status, ConditionStatus::True);
        assert!(condition.message.ends_with("10.1.0.0/24"), "{}", condition.message);

        let mut status = NetBoxPrefixClaimStatus::default();
        let step = parent_selection_step(KEY, &mut status, Err(ResolutionError::NoParentCandidate), None).unwrap();
        assert_eq!(step, ControlFlow::Break(Action::requeue(POOL_RETRY)));
        assert_eq!(status.selected_parent_prefix, None);
        let condition = find_condition(&status.conditions, status::prefix::PARENT_SELECTED_TYPE).unwrap();
        assert_eq!(condition.reason, status::prefix::PARENT_NOT_SELECTED.reason);
    }

    #[test]
    fn test_vanished_restorable_prefix_restarts_selection() {
        let mut status = selected(PARENT_NOT_INFERRED);
        let step = restored_prefix_step(KEY, &mut status, Ok(None), RETRY, None).unwrap();
        assert_eq!(step, ControlFlow::Break(Action::requeue(RETRY)));
        assert_eq!(status.selected_parent_prefix, None);
        assert!(json!({ "status": status })["status"]["selectedParentPrefix"].is_null());

        let mut status = selected(PARENT_NOT_INFERRED);
        let step = restored_prefix_step(KEY, &mut status, Ok(Some("10.0.5.16/28".parse().unwrap())), RETRY, None)
            .unwrap();
        assert!(matches!(step, ControlFlow::Continue(Resolved { restored: true, .. })));
        assert_eq!(status.selected_parent_prefix.as_deref(), Some(PARENT_NOT_INFERRED));
    }

    #[test]
    fn test_fresh_selection_must_be_stored_before_the_resource() {
        let mut claim = test_prefix_claim("web", "team-a", "", "/28");
        let mut status = selected("10.0.0.0/24");
        assert!(selection_unsaved(&claim, &status));

        claim.status = Some(selected("10.0.0.0/24"));
        assert!(!selection_unsaved(&claim, &status));

        status.selected_parent_prefix = None;
        assert!(selection_unsaved(&claim, &status));
    }
}
