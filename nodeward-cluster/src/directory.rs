//! Node directory
//!
//! Resolves node identity, address and roles, node conditions and
//! workloads from the Kubernetes API.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Node, Pod};
use kube::api::{Api, ListParams};
use kube::Client;
use nodeward_core::models::{
    ConditionStatus, NodeCondition, NodeDetail, NodeRef, ReadyCondition, WorkloadRecord,
};
use std::collections::BTreeSet;
use tracing::debug;

use crate::error::{Error, Result};

/// Prefix of the labels carrying node roles
pub const ROLE_LABEL_PREFIX: &str = "node-role.kubernetes.io/";

/// Role of the nodes running the consensus store
pub const CONTROL_PLANE_ROLE: &str = "control-plane";

const INTERNAL_IP: &str = "InternalIP";
const HOSTNAME: &str = "Hostname";
const POD_READY: &str = "Ready";

#[async_trait]
pub trait NodeDirectory: Send + Sync {
    /// Nodes carrying `role`; `None` or an empty role lists every node.
    async fn list_nodes(&self, role: Option<&str>) -> Result<Vec<NodeRef>>;

    async fn get_node(&self, name: &str) -> Result<NodeDetail>;

    /// Workloads, optionally limited to one namespace and/or node.
    async fn list_workloads(
        &self,
        namespace: Option<&str>,
        node: Option<&str>,
    ) -> Result<Vec<WorkloadRecord>>;
}

/// [`NodeDirectory`] backed by the Kubernetes API
#[derive(Clone)]
pub struct KubeDirectory {
    client: Client,
}

impl KubeDirectory {
    pub const fn new(client: Client) -> Self {
        Self { client }
    }

    /// Connect with ambient credentials: the in-cluster service account
    /// when present, the local kubeconfig otherwise.
    pub async fn connect() -> Result<Self> {
        let client = Client::try_default()
            .await
            .map_err(|e| Error::Directory(format!("failed to create Kubernetes client: {e}")))?;
        Ok(Self::new(client))
    }
}

impl std::fmt::Debug for KubeDirectory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeDirectory").finish_non_exhaustive()
    }
}

#[async_trait]
impl NodeDirectory for KubeDirectory {
    async fn list_nodes(&self, role: Option<&str>) -> Result<Vec<NodeRef>> {
        let api: Api<Node> = Api::all(self.client.clone());
        let params = match role.filter(|r| !r.is_empty()) {
            Some(role) => ListParams::default().labels(&format!("{ROLE_LABEL_PREFIX}{role}")),
            None => ListParams::default(),
        };

        let nodes = api.list(&params).await?;
        debug!(role = ?role, count = nodes.items.len(), "Listed nodes");
        Ok(nodes.items.iter().map(node_ref).collect())
    }

    async fn get_node(&self, name: &str) -> Result<NodeDetail> {
        let api: Api<Node> = Api::all(self.client.clone());
        let node = api
            .get_opt(name)
            .await?
            .ok_or_else(|| Error::NotFound(format!("node '{name}'")))?;
        Ok(node_detail(&node))
    }

    async fn list_workloads(
        &self,
        namespace: Option<&str>,
        node: Option<&str>,
    ) -> Result<Vec<WorkloadRecord>> {
        let api: Api<Pod> = match namespace.filter(|n| !n.is_empty()) {
            Some(namespace) => Api::namespaced(self.client.clone(), namespace),
            None => Api::all(self.client.clone()),
        };
        let params = match node.filter(|n| !n.is_empty()) {
            Some(node) => ListParams::default().fields(&format!("spec.nodeName={node}")),
            None => ListParams::default(),
        };

        let pods = api.list(&params).await?;
        debug!(namespace = ?namespace, node = ?node, count = pods.items.len(), "Listed workloads");
        Ok(pods.items.iter().map(workload_record).collect())
    }
}

/// Identity of a node: internal address, hostname (object name if the
/// node reports none) and the roles from its role labels.
pub fn node_ref(node: &Node) -> NodeRef {
    let mut name = node.metadata.name.clone().unwrap_or_default();
    let mut address = String::new();

    let addresses = node
        .status
        .as_ref()
        .and_then(|s| s.addresses.as_deref())
        .unwrap_or_default();
    for entry in addresses {
        match entry.type_.as_str() {
            INTERNAL_IP => address.clone_from(&entry.address),
            HOSTNAME => name.clone_from(&entry.address),
            _ => {}
        }
    }

    let roles: BTreeSet<String> = node
        .metadata
        .labels
        .iter()
        .flatten()
        .filter_map(|(label, _)| label.strip_prefix(ROLE_LABEL_PREFIX))
        .map(|role| role.rsplit('/').next().unwrap_or(role).to_string())
        .collect();

    NodeRef {
        name,
        address,
        roles,
    }
}

pub fn node_detail(node: &Node) -> NodeDetail {
    let conditions = node
        .status
        .as_ref()
        .and_then(|s| s.conditions.as_deref())
        .unwrap_or_default()
        .iter()
        .map(|c| NodeCondition {
            kind: c.type_.clone(),
            status: ConditionStatus::parse(&c.status),
            reason: c.reason.clone().unwrap_or_default(),
            message: c.message.clone().unwrap_or_default(),
        })
        .collect();

    NodeDetail {
        node: node_ref(node),
        conditions,
    }
}

pub fn workload_record(pod: &Pod) -> WorkloadRecord {
    let owner_kinds = pod
        .metadata
        .owner_references
        .iter()
        .flatten()
        .map(|owner| owner.kind.clone())
        .collect();

    let ready = pod
        .status
        .as_ref()
        .and_then(|s| s.conditions.as_deref())
        .unwrap_or_default()
        .iter()
        .find(|c| c.type_ == POD_READY)
        .map(|c| ReadyCondition {
            met: c.status == "True",
            reason: c.reason.clone().unwrap_or_default(),
            message: c.message.clone().unwrap_or_default(),
        });

    WorkloadRecord {
        name: pod.metadata.name.clone().unwrap_or_default(),
        namespace: pod.metadata.namespace.clone().unwrap_or_default(),
        node_name: pod.spec.as_ref().and_then(|s| s.node_name.clone()),
        owner_kinds,
        ready,
        status: pod
            .status
            .as_ref()
            .and_then(|s| serde_json::to_value(s).ok()),
    }
}
