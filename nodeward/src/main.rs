mod server;

use anyhow::Result;
use clap::Parser;
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use nodeward_api::AppState;
use nodeward_cluster::{
    AgentClient, ConnectionManager, FanOutInvoker, KubeDirectory, NodeDirectory, RetryPolicy,
    TalosConnector, WorkloadFetcher,
};
use nodeward_core::{logging, Config};

use server::NodewardServer;

/// Config files probed when no path is given: working directory, then the k8s mount
const DEFAULT_CONFIG_PATHS: &[&str] = &["config.yaml", "/config/config.yaml"];

#[derive(Parser, Debug)]
#[command(name = "nodeward")]
#[command(about = "Cluster health checks over the node agents", long_about = None)]
struct Args {
    /// Configuration file
    #[arg(long, env = "NODEWARD_CONFIG_PATH")]
    config: Option<String>,

    /// Listen address, overriding the configured one
    #[arg(long)]
    listen: Option<String>,
}

/// Load configuration: explicit path > ./config.yaml > /config/config.yaml > environment only
fn load_config(path: Option<String>) -> Config {
    let config_path = path.filter(|p| Path::new(p).exists()).or_else(|| {
        DEFAULT_CONFIG_PATHS
            .iter()
            .find(|p| Path::new(p).exists())
            .map(|p| (*p).to_string())
    });

    if let Some(path) = config_path {
        eprintln!("Loading config from {path}");
        match Config::from_file(&path) {
            Ok(cfg) => return cfg,
            Err(e) => {
                eprintln!("Failed to load {path}: {e}");
                eprintln!("Falling back to environment variables");
            }
        }
    } else {
        eprintln!("No config file found, using environment variables");
    }

    Config::from_env().unwrap_or_else(|e| {
        eprintln!("Failed to load config: {e}");
        eprintln!("Using default configuration");
        Config::default()
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // 1. Load configuration
    let mut config = load_config(args.config);
    if let Some(listen) = args.listen {
        config.server.listen_address = listen;
    }

    // 2. Validate configuration (fail fast on misconfigurations)
    if let Err(errors) = config.validate() {
        for e in &errors {
            eprintln!("Config validation error: {e}");
        }
        return Err(anyhow::anyhow!(
            "Configuration validation failed with {} error(s)",
            errors.len()
        ));
    }

    // 3. Initialize logging
    logging::init_logging(&config.logging)?;
    info!("nodeward starting...");
    info!("HTTP address: {}", config.server.listen_address);

    if config.auth.ensure_password() {
        warn!(
            username = %config.auth.username,
            password = %config.auth.password,
            "No password configured, generated one for this run"
        );
    }

    // 4. Node-agent connection, created eagerly so bad credentials fail startup
    let shutdown = CancellationToken::new();
    let policy = RetryPolicy::from_config(&config.agent);
    let connections = Arc::new(ConnectionManager::new(
        Arc::new(TalosConnector::new(&config.agent)),
        config.agent.probe_timeout(),
    ));
    if let Err(e) = connections.handle().await {
        error!("Failed to connect to the node agents: {}", e);
        return Err(anyhow::anyhow!("node agent connection failed: {e}"));
    }
    info!("Node agent connection established");

    // 5. Cluster directory
    let directory: Arc<dyn NodeDirectory> = Arc::new(KubeDirectory::connect().await.map_err(|e| {
        error!("Failed to create cluster directory client: {}", e);
        anyhow::anyhow!("cluster directory unavailable: {e}")
    })?);
    info!("Cluster directory client initialized");

    // 6. HTTP state
    let agents = AgentClient::new(FanOutInvoker::new(connections, policy, shutdown.clone()));
    let workloads = WorkloadFetcher::new(directory.clone(), policy, shutdown.clone());
    let state = AppState::new(&config, agents, workloads, directory)
        .map_err(|e| anyhow::anyhow!("invalid server configuration: {e}"))?;

    NodewardServer::new(config, state, shutdown).start().await
}
