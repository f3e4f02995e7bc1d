//! Informational agent queries: image inventory, clock check and the
//! per-node hardware and platform resources

use axum::extract::{Path, State};
use nodeward_core::HealthReport;

use super::response::{assemble, CheckResponse};
use super::{AppResult, AppState};

pub async fn images(State(state): State<AppState>) -> AppResult<CheckResponse> {
    let targets = state.role_addresses(None).await?;
    let result = state.agents.images(&targets).await;
    assemble("images", result, |_| HealthReport::ok())
}

/// Compare the endpoint node's clock against `server`
pub async fn time_check(
    State(state): State<AppState>,
    Path(server): Path<String>,
) -> AppResult<CheckResponse> {
    let result = state.agents.time_check(&[], &server).await;
    assemble("time", result, |_| HealthReport::ok())
}

/// Hardware summary of the named node
pub async fn node_info(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> AppResult<CheckResponse> {
    let address = node_address(&state, &name).await?;
    let result = state.agents.system_info(&address).await;
    assemble("info", result, |_| HealthReport::ok())
}

/// Platform metadata of the named node
pub async fn node_metadata(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> AppResult<CheckResponse> {
    let address = node_address(&state, &name).await?;
    let result = state.agents.platform_metadata(&address).await;
    assemble("metadata", result, |_| HealthReport::ok())
}

async fn node_address(state: &AppState, name: &str) -> AppResult<String> {
    let detail = state.directory.get_node(name).await?;
    Ok(detail.node.address)
}
