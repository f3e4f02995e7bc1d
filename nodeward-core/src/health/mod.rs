//! Health evaluation
//!
//! Pure functions that classify fetched records as ok or degraded and list
//! the reasons. Evaluators never look at record order beyond reproducing
//! it in the reasons list, so the same set of records always yields the
//! same set of reasons.

pub mod consensus;
pub mod node;
pub mod service;
pub mod workload;

use serde::{Deserialize, Serialize};

pub use consensus::{evaluate_alarms, evaluate_consensus};
pub use node::evaluate_node_conditions;
pub use service::evaluate_services;
pub use workload::{evaluate_workloads, workloads_in_scope, WorkloadScope};

/// Binary classification produced by an evaluator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Judgement {
    Ok,
    Degraded,
}

/// Outcome of one evaluation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthReport {
    pub judgement: Judgement,
    pub reasons: Vec<String>,
}

impl HealthReport {
    #[must_use]
    pub const fn ok() -> Self {
        Self {
            judgement: Judgement::Ok,
            reasons: Vec::new(),
        }
    }

    /// Degraded iff at least one reason was given.
    #[must_use]
    pub fn from_reasons(reasons: Vec<String>) -> Self {
        let judgement = if reasons.is_empty() {
            Judgement::Ok
        } else {
            Judgement::Degraded
        };
        Self { judgement, reasons }
    }

    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.judgement == Judgement::Ok
    }
}

impl Default for HealthReport {
    fn default() -> Self {
        Self::ok()
    }
}
