// Module: http
// Read-only JSON API over the cluster health checks

pub mod auth;
pub mod error;
pub mod etcd;
pub mod health;
pub mod inventory;
pub mod middleware;
pub mod nodes;
pub mod pods;
pub mod response;
pub mod services;


use axum::{middleware::from_fn_with_state, routing::get, Router};
use ipnet::IpNet;
use nodeward_cluster::{AgentClient, NodeDirectory, WorkloadFetcher};
use nodeward_core::Config;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::timeout::TimeoutLayer;

pub use auth::BasicCredentials;
pub use error::{AppError, AppResult};

/// Evaluation settings shared by the handlers
#[derive(Debug, Clone)]
pub struct HealthSettings {
    pub exempt_services: Arc<HashSet<String>>,
    /// Default for `minDbSize`
    pub min_db_size: u64,
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub agents: AgentClient,
    pub workloads: WorkloadFetcher,
    pub directory: Arc<dyn NodeDirectory>,
    pub credentials: Arc<BasicCredentials>,
    pub trusted_proxies: Arc<Vec<IpNet>>,
    pub health: HealthSettings,
    pub request_timeout: Duration,
}

impl AppState {
    /// Build the state from a validated configuration.
    pub fn new(
        config: &Config,
        agents: AgentClient,
        workloads: WorkloadFetcher,
        directory: Arc<dyn NodeDirectory>,
    ) -> Result<Self, String> {
        Ok(Self {
            agents,
            workloads,
            directory,
            credentials: Arc::new(BasicCredentials::new(
                config.auth.username.clone(),
                config.auth.password.clone(),
            )),
            trusted_proxies: Arc::new(config.server.trusted_proxy_networks()?),
            health: HealthSettings {
                exempt_services: Arc::new(
                    config.health.health_exempt_services.iter().cloned().collect(),
                ),
                min_db_size: config.min_db_size_bytes(),
            },
            request_timeout: config.server.request_timeout(),
        })
    }

    /// Addresses of the nodes carrying `role` (every node for `None`).
    pub async fn role_addresses(&self, role: Option<&str>) -> AppResult<Vec<String>> {
        let nodes = self.directory.list_nodes(role).await?;
        Ok(nodes.into_iter().map(|n| n.address).collect())
    }

    /// Address of the named node.
    pub async fn node_addresses(&self, name: &str) -> AppResult<Vec<String>> {
        let node = self.directory.get_node(name).await?;
        Ok(vec![node.node.address])
    }
}

/// Create the HTTP router with all routes
pub fn create_router(state: AppState) -> Router {
    let v1 = Router::new()
        // Services
        .route("/service", get(services::list_services))
        .route("/service/{service}", get(services::get_service))
        // Consensus store
        .route("/etcd/status", get(etcd::status))
        .route("/etcd/alarms", get(etcd::alarms))
        // Workloads
        .route("/pod", get(pods::list_pods))
        .route("/pod/{namespace}", get(pods::list_namespace_pods))
        // Inventory
        .route("/images", get(inventory::images))
        .route("/time/{server}", get(inventory::time_check))
        // Nodes
        .route("/node", get(nodes::list_nodes))
        .route("/node/{name}", get(nodes::node_status))
        .route("/node/{name}/info", get(inventory::node_info))
        .route("/node/{name}/metadata", get(inventory::node_metadata))
        .route("/node/{name}/service", get(services::list_node_services))
        .route("/node/{name}/service/{service}", get(services::get_node_service))
        .route("/node/{name}/pod", get(pods::list_node_pods))
        .route("/node/{name}/pod/{namespace}", get(pods::list_node_namespace_pods))
        .route_layer(from_fn_with_state(state.clone(), auth::basic_auth));

    Router::new()
        // Anonymous liveness endpoint
        .merge(health::create_health_router())
        .nest("/v1", v1)
        .fallback(middleware::not_found)
        .method_not_allowed_fallback(middleware::method_not_allowed)
        .layer(TimeoutLayer::new(state.request_timeout))
        .layer(from_fn_with_state(state.clone(), middleware::access_log))
        .layer(CatchPanicLayer::custom(middleware::panic_response))
        // Apply state to all routes (must be last)
        .with_state(state)
}
