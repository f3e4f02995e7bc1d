//! Agent credentials
//!
//! Reads the talosconfig client file (base64 PEM material per context) and
//! turns it into mutually authenticated gRPC channels to the agent proxy.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use nodeward_core::config::AgentConfig;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tonic::transport::{Certificate, ClientTlsConfig, Endpoint, Identity};
use tracing::info;

use crate::error::{Error, Result};
use crate::transport::{AgentTransport, Connector, TalosTransport};

/// Mounted into pods granted agent API access
pub const IN_CLUSTER_CONFIG_PATH: &str = "/var/run/secrets/talos.dev/config";

pub const TALOSCONFIG_ENV: &str = "TALOSCONFIG";

/// On-disk talosconfig
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TalosConfigFile {
    #[serde(default)]
    pub context: String,
    #[serde(default)]
    pub contexts: HashMap<String, TalosContext>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TalosContext {
    #[serde(default)]
    pub endpoints: Vec<String>,
    #[serde(default)]
    pub ca: String,
    #[serde(default)]
    pub crt: String,
    #[serde(default)]
    pub key: String,
}

/// Decoded material of the selected context
#[derive(Clone)]
pub struct AgentCredentials {
    pub context: String,
    pub endpoint: String,
    pub ca_pem: Vec<u8>,
    pub cert_pem: Vec<u8>,
    pub key_pem: Vec<u8>,
}

impl std::fmt::Debug for AgentCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentCredentials")
            .field("context", &self.context)
            .field("endpoint", &self.endpoint)
            .finish_non_exhaustive()
    }
}

impl TalosConfigFile {
    pub fn parse(contents: &str) -> Result<Self> {
        serde_yaml::from_str(contents)
            .map_err(|e| Error::Configuration(format!("invalid talosconfig: {e}")))
    }

    /// Select `context` (or the file's current context) and decode it.
    pub fn credentials(&self, context: Option<&str>) -> Result<AgentCredentials> {
        let name = context.unwrap_or(&self.context);
        if name.is_empty() {
            return Err(Error::Configuration(
                "talosconfig has no current context".to_string(),
            ));
        }
        let selected = self
            .contexts
            .get(name)
            .ok_or_else(|| Error::Configuration(format!("talosconfig context '{name}' not found")))?;
        let endpoint = selected.endpoints.first().cloned().ok_or_else(|| {
            Error::Configuration(format!("talosconfig context '{name}' has no endpoints"))
        })?;

        Ok(AgentCredentials {
            context: name.to_string(),
            endpoint,
            ca_pem: decode_pem("ca", &selected.ca)?,
            cert_pem: decode_pem("crt", &selected.crt)?,
            key_pem: decode_pem("key", &selected.key)?,
        })
    }
}

fn decode_pem(field: &str, value: &str) -> Result<Vec<u8>> {
    if value.is_empty() {
        return Err(Error::Configuration(format!("talosconfig field '{field}' is empty")));
    }
    STANDARD
        .decode(value.trim())
        .map_err(|e| Error::Configuration(format!("talosconfig field '{field}' is not base64: {e}")))
}

/// First existing talosconfig among the configured path, `$TALOSCONFIG`,
/// the in-cluster mount and `~/.talos/config`.
pub fn find_talosconfig(configured: Option<&str>) -> Result<PathBuf> {
    let lookup = |key: &str| std::env::var(key).ok().filter(|v| !v.is_empty());
    resolve_talosconfig(configured, lookup, |path| path.exists())
}

fn resolve_talosconfig(
    configured: Option<&str>,
    env: impl Fn(&str) -> Option<String>,
    exists: impl Fn(&Path) -> bool,
) -> Result<PathBuf> {
    if let Some(path) = configured.filter(|p| !p.is_empty()) {
        return Ok(PathBuf::from(path));
    }

    let candidates = [
        env(TALOSCONFIG_ENV).map(PathBuf::from),
        Some(PathBuf::from(IN_CLUSTER_CONFIG_PATH)),
        env("HOME").map(|home| Path::new(&home).join(".talos").join("config")),
    ];
    candidates
        .into_iter()
        .flatten()
        .find(|path| exists(path))
        .ok_or_else(|| Error::Configuration("no talosconfig found".to_string()))
}

/// Split an endpoint into its host and `https://` URI, adding `port` when
/// the endpoint names none.
pub fn endpoint_uri(endpoint: &str, port: u16) -> (String, String) {
    let endpoint = endpoint
        .trim()
        .trim_start_matches("https://")
        .trim_end_matches('/');

    // [v6]:port, [v6], bare v6, host:port, host
    if let Some(rest) = endpoint.strip_prefix('[') {
        if let Some((host, tail)) = rest.split_once(']') {
            let port = tail
                .strip_prefix(':')
                .and_then(|p| p.parse::<u16>().ok())
                .unwrap_or(port);
            return (host.to_string(), format!("https://[{host}]:{port}"));
        }
    }
    if endpoint.matches(':').count() > 1 {
        return (endpoint.to_string(), format!("https://[{endpoint}]:{port}"));
    }
    match endpoint.rsplit_once(':') {
        Some((host, p)) if p.parse::<u16>().is_ok() => (host.to_string(), format!("https://{endpoint}")),
        _ => (endpoint.to_string(), format!("https://{endpoint}:{port}")),
    }
}

/// [`Connector`] building mTLS channels from the talosconfig
#[derive(Debug, Clone)]
pub struct TalosConnector {
    config_path: Option<String>,
    context: Option<String>,
    port: u16,
    connect_timeout: Duration,
}

impl TalosConnector {
    pub fn new(config: &AgentConfig) -> Self {
        Self {
            config_path: config.talosconfig_path.clone(),
            context: config.context.clone(),
            port: config.endpoint_port,
            connect_timeout: config.connect_timeout(),
        }
    }

    /// Credentials are re-read on every connect so rotated files are picked up.
    async fn load_credentials(&self) -> Result<AgentCredentials> {
        let path = find_talosconfig(self.config_path.as_deref())?;
        let contents = tokio::fs::read_to_string(&path).await.map_err(|e| {
            Error::Configuration(format!("failed to read {}: {e}", path.display()))
        })?;
        TalosConfigFile::parse(&contents)?.credentials(self.context.as_deref())
    }
}

#[async_trait]
impl Connector for TalosConnector {
    async fn connect(&self) -> Result<Arc<dyn AgentTransport>> {
        let credentials = self.load_credentials().await?;
        let (host, uri) = endpoint_uri(&credentials.endpoint, self.port);

        let tls = ClientTlsConfig::new()
            .ca_certificate(Certificate::from_pem(&credentials.ca_pem))
            .identity(Identity::from_pem(&credentials.cert_pem, &credentials.key_pem))
            .domain_name(host.clone());

        let channel = Endpoint::from_shared(uri.clone())
            .map_err(|e| Error::Connection(format!("invalid endpoint '{uri}': {e}")))?
            .connect_timeout(self.connect_timeout)
            .tcp_keepalive(Some(Duration::from_secs(30)))
            .tls_config(tls)
            .map_err(|e| Error::Connection(format!("TLS setup for '{uri}' failed: {e}")))?
            .connect()
            .await
            .map_err(|e| Error::Connection(format!("failed to connect to '{uri}': {e}")))?;

        info!(
            endpoint = %uri,
            context = %credentials.context,
            "Established agent connection"
        );
        Ok(Arc::new(TalosTransport::new(channel, host)))
    }
}
