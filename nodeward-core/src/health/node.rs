use super::HealthReport;
use crate::models::{ConditionStatus, NodeConditionSet};

/// The one condition that must be true; every other condition must be false
pub const READY_CONDITION: &str = "Ready";

/// Evaluate a node's conditions.
#[must_use]
pub fn evaluate_node_conditions(set: &NodeConditionSet) -> HealthReport {
    let reasons = set
        .conditions
        .iter()
        .filter(|condition| {
            let expected = if condition.kind == READY_CONDITION {
                ConditionStatus::True
            } else {
                ConditionStatus::False
            };
            condition.status != expected
        })
        .map(|condition| format!("{}: {}", condition.kind, condition.message))
        .collect();

    HealthReport::from_reasons(reasons)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NodeCondition;

    fn condition(kind: &str, status: ConditionStatus, message: &str) -> NodeCondition {
        NodeCondition {
            kind: kind.to_string(),
            status,
            reason: String::new(),
            message: message.to_string(),
        }
    }

    fn node(conditions: Vec<NodeCondition>) -> NodeConditionSet {
        NodeConditionSet {
            node_name: "worker-1".to_string(),
            conditions,
        }
    }

    #[test]
    fn test_healthy_node() {
        let set = node(vec![
            condition("MemoryPressure", ConditionStatus::False, "kubelet has sufficient memory available"),
            condition("DiskPressure", ConditionStatus::False, "kubelet has no disk pressure"),
            condition("Ready", ConditionStatus::True, "kubelet is posting ready status"),
        ]);

        assert_eq!(evaluate_node_conditions(&set), HealthReport::ok());
    }

    #[test]
    fn test_not_ready_node() {
        let set = node(vec![condition(
            "Ready",
            ConditionStatus::Unknown,
            "Kubelet stopped posting node status.",
        )]);

        let report = evaluate_node_conditions(&set);
        assert_eq!(report.reasons, vec!["Ready: Kubelet stopped posting node status."]);
    }

    #[test]
    fn test_pressure_conditions_degrade() {
        let set = node(vec![
            condition("DiskPressure", ConditionStatus::True, "disk almost full"),
            condition("PIDPressure", ConditionStatus::Unknown, "no status"),
            condition("Ready", ConditionStatus::True, "ok"),
        ]);

        let report = evaluate_node_conditions(&set);
        assert_eq!(
            report.reasons,
            vec!["DiskPressure: disk almost full", "PIDPressure: no status"]
        );
    }
}
