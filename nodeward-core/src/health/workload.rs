use super::HealthReport;
use crate::models::WorkloadRecord;

/// Owner kind of workloads placed directly by the node agent
pub const NODE_OWNER_KIND: &str = "Node";

/// Readiness reason of a workload that ran to completion
pub const COMPLETED_REASON: &str = "PodCompleted";

/// Which workloads an evaluation looks at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WorkloadScope {
    #[default]
    All,
    /// Only workloads managed by the node agent itself (static pods)
    LocallyManaged,
}

impl WorkloadScope {
    #[must_use]
    pub fn includes(self, record: &WorkloadRecord) -> bool {
        match self {
            Self::All => true,
            Self::LocallyManaged => record.owner_kinds.iter().any(|k| k == NODE_OWNER_KIND),
        }
    }
}

/// Records the given scope selects, in input order.
#[must_use]
pub fn workloads_in_scope(records: &[WorkloadRecord], scope: WorkloadScope) -> Vec<&WorkloadRecord> {
    records.iter().filter(|r| scope.includes(r)).collect()
}

/// Evaluate in-scope workloads: any whose readiness condition is false,
/// other than one that completed, is a failure.
#[must_use]
pub fn evaluate_workloads(records: &[WorkloadRecord], scope: WorkloadScope) -> HealthReport {
    let reasons = workloads_in_scope(records, scope)
        .into_iter()
        .filter_map(|record| {
            let ready = record.ready.as_ref()?;
            if ready.met || ready.reason == COMPLETED_REASON {
                return None;
            }
            Some(format!(
                "Workload '{}/{}' not ready: {}",
                record.namespace, record.name, ready.message
            ))
        })
        .collect();

    HealthReport::from_reasons(reasons)
}
