//! Consensus-store checks, always against the control-plane nodes

use axum::extract::{Query, State};
use nodeward_cluster::CONTROL_PLANE_ROLE;
use nodeward_core::health::{evaluate_alarms, evaluate_consensus};
use nodeward_core::units::parse_base2_bytes;
use serde::Deserialize;

use super::response::{assemble, CheckResponse};
use super::{AppError, AppResult, AppState};

#[derive(Debug, Default, Deserialize)]
pub struct EtcdStatusQuery {
    /// Databases smaller than this skip the fragmentation check (`512MiB`)
    #[serde(rename = "minDbSize")]
    pub min_db_size: Option<String>,
}

pub async fn status(
    State(state): State<AppState>,
    Query(query): Query<EtcdStatusQuery>,
) -> AppResult<CheckResponse> {
    let min_db_size = match query.min_db_size.as_deref() {
        Some(value) => parse_base2_bytes(value)
            .map_err(|e| AppError::bad_request(format!("invalid minDbSize: {e}")))?,
        None => state.health.min_db_size,
    };

    let targets = state.role_addresses(Some(CONTROL_PLANE_ROLE)).await?;
    let result = state.agents.etcd_status(&targets).await;
    assemble("status", result, |members| {
        evaluate_consensus(members, min_db_size)
    })
}

pub async fn alarms(State(state): State<AppState>) -> AppResult<CheckResponse> {
    let targets = state.role_addresses(Some(CONTROL_PLANE_ROLE)).await?;
    let result = state.agents.etcd_alarms(&targets).await;
    assemble("alarms", result, evaluate_alarms)
}
