//! Node listing and node condition checks

use axum::{
    extract::{Path, Query, State},
    Json,
};
use nodeward_core::health::evaluate_node_conditions;
use nodeward_core::models::NodeRef;
use serde::{Deserialize, Serialize};

use super::response::CheckResponse;
use super::{AppResult, AppState};

#[derive(Debug, Default, Deserialize)]
pub struct NodeQuery {
    pub role: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct NodeList {
    pub nodes: Vec<NodeRef>,
}

pub async fn list_nodes(
    State(state): State<AppState>,
    Query(query): Query<NodeQuery>,
) -> AppResult<Json<NodeList>> {
    let nodes = state.directory.list_nodes(query.role.as_deref()).await?;
    Ok(Json(NodeList { nodes }))
}

pub async fn node_status(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> AppResult<CheckResponse> {
    let detail = state.directory.get_node(&name).await?;
    let report = evaluate_node_conditions(&detail.condition_set());
    CheckResponse::new("node", &detail, None, report)
}
