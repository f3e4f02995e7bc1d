//! Server lifecycle management
//!
//! Serves the HTTP API until a shutdown signal arrives, then cancels
//! in-flight agent retries and drains open requests.

use std::net::SocketAddr;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use nodeward_api::{create_router, AppState};
use nodeward_core::Config;

pub struct NodewardServer {
    config: Config,
    state: AppState,
    shutdown: CancellationToken,
}

impl NodewardServer {
    pub const fn new(config: Config, state: AppState, shutdown: CancellationToken) -> Self {
        Self {
            config,
            state,
            shutdown,
        }
    }

    /// Serve until a shutdown signal (or a server error)
    pub async fn start(self) -> anyhow::Result<()> {
        let http_addr: SocketAddr = self
            .config
            .server
            .listen_address
            .parse()
            .map_err(|e| anyhow::anyhow!("Invalid HTTP address '{}': {e}", self.config.server.listen_address))?;

        let listener = tokio::net::TcpListener::bind(http_addr)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to bind HTTP address {http_addr}: {e}"))?;
        info!("HTTP server listening on {}", http_addr);

        let router = create_router(self.state);
        let shutdown = self.shutdown.clone();
        let graceful = async move {
            shutdown_signal().await;
            info!("Shutdown signal received, starting graceful shutdown...");
            // Stops retry loops so open requests finish promptly
            shutdown.cancel();
        };

        if let Err(e) = axum::serve(
            listener,
            router.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(graceful)
        .await
        {
            error!("HTTP server error: {}", e);
            self.shutdown.cancel();
            return Err(e.into());
        }

        info!("nodeward shut down complete");
        Ok(())
    }
}

/// Wait for a shutdown signal (SIGTERM or SIGINT/Ctrl+C)
async fn shutdown_signal() {
    let ctrl_c = async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {}
            Err(e) => {
                error!("Failed to install Ctrl+C handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => { info!("Received Ctrl+C"); }
        () = terminate => { info!("Received SIGTERM"); }
    }
}
