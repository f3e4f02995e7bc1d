//! Node-agent service checks

use axum::extract::{Path, State};

use super::response::{assemble, CheckResponse};
use super::{AppResult, AppState};
use nodeward_core::health::evaluate_services;

pub async fn list_services(State(state): State<AppState>) -> AppResult<CheckResponse> {
    let targets = state.role_addresses(None).await?;
    service_list(&state, &targets).await
}

pub async fn list_node_services(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> AppResult<CheckResponse> {
    let targets = state.node_addresses(&name).await?;
    service_list(&state, &targets).await
}

pub async fn get_service(
    State(state): State<AppState>,
    Path(service): Path<String>,
) -> AppResult<CheckResponse> {
    let targets = state.role_addresses(None).await?;
    service_info(&state, &targets, &service).await
}

pub async fn get_node_service(
    State(state): State<AppState>,
    Path((name, service)): Path<(String, String)>,
) -> AppResult<CheckResponse> {
    let targets = state.node_addresses(&name).await?;
    service_info(&state, &targets, &service).await
}

async fn service_list(state: &AppState, targets: &[String]) -> AppResult<CheckResponse> {
    let result = state.agents.service_list(targets).await;
    assemble("services", result, |records| {
        evaluate_services(records, &state.health.exempt_services)
    })
}

async fn service_info(state: &AppState, targets: &[String], service: &str) -> AppResult<CheckResponse> {
    let result = state.agents.service_info(targets, service).await;
    assemble("service", result, |records| {
        evaluate_services(records, &state.health.exempt_services)
    })
}
