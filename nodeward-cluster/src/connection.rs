//! Connection manager
//!
//! Owns the single process-wide handle to the node agents. The handle is
//! created lazily, probed when a call through it fails, and replaced when
//! the probe fails. All three steps run under one lock so concurrent
//! requests that hit the same stale handle reconnect once.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::transport::{AgentTransport, Connector};

pub struct ConnectionManager {
    connector: Arc<dyn Connector>,
    current: Mutex<Option<Arc<dyn AgentTransport>>>,
    probe_timeout: Duration,
}

impl ConnectionManager {
    pub fn new(connector: Arc<dyn Connector>, probe_timeout: Duration) -> Self {
        Self {
            connector,
            current: Mutex::new(None),
            probe_timeout,
        }
    }

    /// Current handle, creating it on first use.
    pub async fn handle(&self) -> Result<Arc<dyn AgentTransport>> {
        let mut current = self.current.lock().await;
        if let Some(handle) = current.as_ref() {
            return Ok(Arc::clone(handle));
        }
        let handle = self.create().await?;
        *current = Some(Arc::clone(&handle));
        Ok(handle)
    }

    /// Build a fresh handle from the ambient credentials.
    pub async fn create(&self) -> Result<Arc<dyn AgentTransport>> {
        self.connector.connect().await.map_err(|e| match e {
            Error::Connection(_) => e,
            other => Error::Connection(other.to_string()),
        })
    }

    /// Run the liveness probe against `handle`.
    pub async fn probe(&self, handle: &Arc<dyn AgentTransport>) -> Result<()> {
        match tokio::time::timeout(self.probe_timeout, handle.version()).await {
            Ok(Ok(version)) => {
                debug!(version = %version, "Agent liveness probe succeeded");
                Ok(())
            }
            Ok(Err(e)) => Err(e),
            Err(_) => Err(Error::Timeout(format!(
                "liveness probe exceeded {:?}",
                self.probe_timeout
            ))),
        }
    }

    /// Discard the current handle and install a new one.
    pub async fn replace(&self) -> Result<Arc<dyn AgentTransport>> {
        let mut current = self.current.lock().await;
        self.replace_locked(&mut current).await
    }

    async fn replace_locked(
        &self,
        current: &mut Option<Arc<dyn AgentTransport>>,
    ) -> Result<Arc<dyn AgentTransport>> {
        // A failed reconnect leaves no handle so the next request starts over.
        *current = None;
        let handle = self.create().await?;
        *current = Some(Arc::clone(&handle));
        info!("Re-established agent connection");
        Ok(handle)
    }

    /// Make sure `stale`, the handle a call just failed on, is still usable.
    ///
    /// Returns the handle the next attempt should use: the current one if
    /// another request already replaced `stale`, `stale` itself if it
    /// answers the probe, otherwise a newly created handle. Fails with
    /// [`Error::Connection`] only when a new handle cannot be created.
    pub async fn ensure_live(
        &self,
        stale: &Arc<dyn AgentTransport>,
    ) -> Result<Arc<dyn AgentTransport>> {
        let mut current = self.current.lock().await;

        if let Some(handle) = current.as_ref() {
            if !Arc::ptr_eq(handle, stale) {
                debug!("Agent connection already replaced by a concurrent request");
                return Ok(Arc::clone(handle));
            }
        }

        match self.probe(stale).await {
            Ok(()) => {
                if current.is_none() {
                    *current = Some(Arc::clone(stale));
                }
                Ok(Arc::clone(stale))
            }
            Err(e) => {
                warn!(error = %e, "Agent liveness probe failed, reconnecting");
                self.replace_locked(&mut current).await
            }
        }
    }
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("probe_timeout", &self.probe_timeout)
            .finish_non_exhaustive()
    }
}
