//! Workload readiness checks

use axum::extract::{Path, Query, State};
use nodeward_core::health::{evaluate_workloads, workloads_in_scope, WorkloadScope};
use nodeward_core::models::WorkloadRecord;
use serde::Deserialize;

use super::response::{assemble, CheckResponse};
use super::{AppResult, AppState};

#[derive(Debug, Default, Deserialize)]
pub struct PodQuery {
    /// `true` limits the check to static pods
    #[serde(rename = "static")]
    pub static_only: Option<String>,
}

impl PodQuery {
    fn scope(&self) -> WorkloadScope {
        if self.static_only.as_deref() == Some("true") {
            WorkloadScope::LocallyManaged
        } else {
            WorkloadScope::All
        }
    }
}

pub async fn list_pods(
    State(state): State<AppState>,
    Query(query): Query<PodQuery>,
) -> AppResult<CheckResponse> {
    pods(&state, None, None, query.scope()).await
}

pub async fn list_namespace_pods(
    State(state): State<AppState>,
    Path(namespace): Path<String>,
    Query(query): Query<PodQuery>,
) -> AppResult<CheckResponse> {
    pods(&state, Some(&namespace), None, query.scope()).await
}

pub async fn list_node_pods(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Query(query): Query<PodQuery>,
) -> AppResult<CheckResponse> {
    pods(&state, None, Some(&name), query.scope()).await
}

pub async fn list_node_namespace_pods(
    State(state): State<AppState>,
    Path((name, namespace)): Path<(String, String)>,
    Query(query): Query<PodQuery>,
) -> AppResult<CheckResponse> {
    pods(&state, Some(&namespace), Some(&name), query.scope()).await
}

async fn pods(
    state: &AppState,
    namespace: Option<&str>,
    node: Option<&str>,
    scope: WorkloadScope,
) -> AppResult<CheckResponse> {
    // Only in-scope workloads are reported.
    let result = state.workloads.list(namespace, node).await.map(|records| {
        workloads_in_scope(&records, scope)
            .into_iter()
            .cloned()
            .collect::<Vec<WorkloadRecord>>()
    });
    assemble("pods", result, |records| {
        evaluate_workloads(records, WorkloadScope::All)
    })
}
