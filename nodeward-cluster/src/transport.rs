//! Node-agent transport seam
//!
//! [`AgentTransport`] is one live connection to the agent fleet; everything
//! above it (connection manager, invoker, fetchers) only sees this trait so
//! it can be exercised without a cluster. [`TalosTransport`] is the gRPC
//! implementation.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use futures::StreamExt;
use nodeward_core::models::{
    ConsensusAlarm, ConsensusMemberStatus, ImageRecord, NodeResource, ServiceRecord, TimeRecord,
};
use nodeward_core::units::format_si_bytes;
use nodeward_proto::common::{ContainerdNamespace, Metadata};
use nodeward_proto::cosi::resource::{GetRequest, GetResponse, StateClient};
use nodeward_proto::machine::{
    etcd_member_alarm::AlarmType, EtcdAlarm, EtcdStatus, ImageListRequest, ImageListResponse,
    MachineServiceClient, ServiceList,
};
use nodeward_proto::time::{Time, TimeRequest, TimeServiceClient};
use std::sync::Arc;
use tonic::metadata::{Ascii, MetadataValue};
use tonic::transport::Channel;
use tracing::debug;

use crate::error::{Error, Result};
use crate::invoker::FanOutResult;

/// gRPC metadata key the agent proxy reads its target list from
pub const NODES_METADATA_KEY: &str = "nodes";

/// Key naming the single node a resource read is proxied to
pub const NODE_METADATA_KEY: &str = "node";

/// Address of one resource in the agent's state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceId {
    pub namespace: &'static str,
    pub kind: &'static str,
    pub id: &'static str,
}

/// Hardware summary of a node (vendor, product, serial, uuid)
pub const SYSTEM_INFORMATION: ResourceId = ResourceId {
    namespace: "hardware",
    kind: "SystemInformations.hardware.talos.dev",
    id: "systeminformation",
};

/// Platform the node runs on (cloud, region, instance type)
pub const PLATFORM_METADATA: ResourceId = ResourceId {
    namespace: "runtime",
    kind: "PlatformMetadatas.talos.dev",
    id: "platformmetadata",
};

/// Records of one call plus the nodes that failed to answer it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentReply<T> {
    pub data: T,
    /// `"<node>: <error>"` per node the proxy could not reach
    pub node_errors: Vec<String>,
}

impl<T> AgentReply<T> {
    pub const fn complete(data: T) -> Self {
        Self {
            data,
            node_errors: Vec::new(),
        }
    }

    /// A reply with node errors is partial: its records are kept and the
    /// errors become the attempt's failure.
    pub fn into_result(self) -> FanOutResult<T> {
        if self.node_errors.is_empty() {
            FanOutResult::Complete(self.data)
        } else {
            FanOutResult::Partial {
                data: self.data,
                error: Error::RemoteCall(self.node_errors.join("; ")),
            }
        }
    }
}

/// One live connection to the node agents
#[async_trait]
pub trait AgentTransport: Send + Sync {
    /// Liveness probe; answered by the endpoint itself
    async fn version(&self) -> Result<String>;

    async fn service_list(&self, nodes: &[String]) -> Result<AgentReply<Vec<ServiceRecord>>>;

    async fn etcd_status(&self, nodes: &[String])
        -> Result<AgentReply<Vec<ConsensusMemberStatus>>>;

    async fn etcd_alarms(&self, nodes: &[String]) -> Result<AgentReply<Vec<ConsensusAlarm>>>;

    async fn image_list(&self, nodes: &[String]) -> Result<AgentReply<Vec<ImageRecord>>>;

    async fn time_check(&self, nodes: &[String], server: &str)
        -> Result<AgentReply<Vec<TimeRecord>>>;

    /// Read one resource from `node`'s state. A missing resource is
    /// [`Error::NotFound`].
    async fn resource(&self, node: &str, resource: ResourceId) -> Result<NodeResource>;
}

/// Builds new transports from the ambient credentials
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self) -> Result<Arc<dyn AgentTransport>>;
}

/// gRPC transport to the agent proxy
#[derive(Debug, Clone)]
pub struct TalosTransport {
    channel: Channel,
    /// Host of the endpoint, used to attribute replies that carry no metadata
    endpoint_host: String,
}

impl TalosTransport {
    #[must_use]
    pub fn new(channel: Channel, endpoint_host: impl Into<String>) -> Self {
        Self {
            channel,
            endpoint_host: endpoint_host.into(),
        }
    }

    fn machine(&self) -> MachineServiceClient<Channel> {
        MachineServiceClient::new(self.channel.clone())
    }

    fn request<M>(&self, message: M, nodes: &[String]) -> Result<tonic::Request<M>> {
        let mut request = tonic::Request::new(message);
        for node in nodes {
            let value: MetadataValue<Ascii> = node
                .parse()
                .map_err(|_| Error::RemoteCall(format!("invalid node address '{node}'")))?;
            request.metadata_mut().append(NODES_METADATA_KEY, value);
        }
        Ok(request)
    }
}

#[async_trait]
impl AgentTransport for TalosTransport {
    async fn version(&self) -> Result<String> {
        let response = self.machine().version(()).await?.into_inner();
        Ok(response
            .messages
            .into_iter()
            .next()
            .and_then(|m| m.version)
            .map(|v| v.tag)
            .unwrap_or_default())
    }

    async fn service_list(&self, nodes: &[String]) -> Result<AgentReply<Vec<ServiceRecord>>> {
        let response = self
            .machine()
            .service_list(self.request((), nodes)?)
            .await?
            .into_inner();
        Ok(convert_service_lists(response.messages, &self.endpoint_host))
    }

    async fn etcd_status(
        &self,
        nodes: &[String],
    ) -> Result<AgentReply<Vec<ConsensusMemberStatus>>> {
        let response = self
            .machine()
            .etcd_status(self.request((), nodes)?)
            .await?
            .into_inner();
        Ok(convert_etcd_status(response.messages, &self.endpoint_host))
    }

    async fn etcd_alarms(&self, nodes: &[String]) -> Result<AgentReply<Vec<ConsensusAlarm>>> {
        let response = self
            .machine()
            .etcd_alarm_list(self.request((), nodes)?)
            .await?
            .into_inner();
        Ok(convert_etcd_alarms(response.messages, &self.endpoint_host))
    }

    async fn image_list(&self, nodes: &[String]) -> Result<AgentReply<Vec<ImageRecord>>> {
        let request = ImageListRequest {
            namespace: ContainerdNamespace::NsCri as i32,
        };
        let mut stream = self
            .machine()
            .image_list(self.request(request, nodes)?)
            .await?
            .into_inner();

        let mut messages = Vec::new();
        let mut stream_error = None;
        while let Some(item) = stream.next().await {
            match item {
                Ok(message) => messages.push(message),
                Err(status) => {
                    stream_error = Some(Error::from(status));
                    break;
                }
            }
        }

        match stream_error {
            // Nothing arrived before the stream broke: the attempt failed outright.
            Some(e) if messages.is_empty() => Err(e),
            Some(e) => {
                debug!(received = messages.len(), error = %e, "Image stream ended early");
                let mut reply = convert_images(messages, &self.endpoint_host);
                reply.node_errors.push(e.to_string());
                Ok(reply)
            }
            None => Ok(convert_images(messages, &self.endpoint_host)),
        }
    }

    async fn time_check(
        &self,
        nodes: &[String],
        server: &str,
    ) -> Result<AgentReply<Vec<TimeRecord>>> {
        let request = TimeRequest {
            server: server.to_string(),
        };
        let response = TimeServiceClient::new(self.channel.clone())
            .time_check(self.request(request, nodes)?)
            .await?
            .into_inner();
        Ok(convert_time(response.messages, &self.endpoint_host))
    }

    async fn resource(&self, node: &str, resource: ResourceId) -> Result<NodeResource> {
        let mut request = tonic::Request::new(GetRequest {
            namespace: resource.namespace.to_string(),
            r#type: resource.kind.to_string(),
            id: resource.id.to_string(),
        });
        let value: MetadataValue<Ascii> = node
            .parse()
            .map_err(|_| Error::RemoteCall(format!("invalid node address '{node}'")))?;
        request.metadata_mut().insert(NODE_METADATA_KEY, value);

        let response = match StateClient::new(self.channel.clone()).get(request).await {
            Ok(response) => response.into_inner(),
            Err(status) if status.code() == tonic::Code::NotFound => {
                return Err(Error::NotFound(format!(
                    "resource {}/{} on {node}",
                    resource.kind, resource.id
                )));
            }
            Err(status) => return Err(status.into()),
        };
        convert_resource(response, node, resource)
    }
}

/// Split a message's metadata into its node name and, if the proxy failed
/// to reach that node, the error.
fn node_of(metadata: Option<&Metadata>, fallback: &str) -> (String, Option<String>) {
    let Some(metadata) = metadata else {
        return (fallback.to_string(), None);
    };
    let node = if metadata.hostname.is_empty() {
        fallback.to_string()
    } else {
        metadata.hostname.clone()
    };
    let error = (!metadata.error.is_empty()).then(|| format!("{node}: {}", metadata.error));
    (node, error)
}

fn format_timestamp(timestamp: Option<&prost_types::Timestamp>) -> String {
    timestamp
        .and_then(|ts| {
            let nanos = u32::try_from(ts.nanos).ok()?;
            DateTime::<Utc>::from_timestamp(ts.seconds, nanos)
        })
        .map(|dt| dt.to_rfc3339_opts(SecondsFormat::Secs, true))
        .unwrap_or_default()
}

pub(crate) fn convert_service_lists(
    messages: Vec<ServiceList>,
    fallback: &str,
) -> AgentReply<Vec<ServiceRecord>> {
    let mut reply = AgentReply::complete(Vec::new());
    for message in messages {
        let (node, error) = node_of(message.metadata.as_ref(), fallback);
        if let Some(error) = error {
            reply.node_errors.push(error);
            continue;
        }
        reply.data.extend(message.services.into_iter().map(|service| {
            let (healthy, health_message) = match service.health {
                Some(health) if !health.unknown => (Some(health.healthy), health.last_message),
                Some(health) => (None, health.last_message),
                None => (None, String::new()),
            };
            ServiceRecord {
                host_node: node.clone(),
                service_id: service.id,
                state: service.state,
                healthy,
                health_message,
            }
        }));
    }
    reply
}

pub(crate) fn convert_etcd_status(
    messages: Vec<EtcdStatus>,
    fallback: &str,
) -> AgentReply<Vec<ConsensusMemberStatus>> {
    let mut reply = AgentReply::complete(Vec::new());
    for message in messages {
        let (node, error) = node_of(message.metadata.as_ref(), fallback);
        if let Some(error) = error {
            reply.node_errors.push(error);
            continue;
        }
        let Some(status) = message.member_status else {
            continue;
        };
        reply.data.push(ConsensusMemberStatus {
            host_node: node,
            member_id: status.member_id,
            leader_id: status.leader,
            db_size_bytes: status.db_size,
            db_size_in_use_bytes: status.db_size_in_use,
            raft_index: status.raft_index,
            raft_term: status.raft_term,
            is_learner: status.is_learner,
            errors: status.errors,
        });
    }
    reply
}

pub(crate) fn convert_etcd_alarms(
    messages: Vec<EtcdAlarm>,
    fallback: &str,
) -> AgentReply<Vec<ConsensusAlarm>> {
    let mut reply = AgentReply::complete(Vec::new());
    for message in messages {
        let (node, error) = node_of(message.metadata.as_ref(), fallback);
        if let Some(error) = error {
            reply.node_errors.push(error);
            continue;
        }
        for alarm in message.member_alarms {
            let kind = AlarmType::try_from(alarm.alarm);
            if matches!(kind, Ok(AlarmType::None)) {
                continue;
            }
            reply.data.push(ConsensusAlarm {
                host_node: node.clone(),
                member_id: alarm.member_id,
                alarm_kind: kind.map_or("UNKNOWN", |k| k.as_str_name()).to_string(),
            });
        }
    }
    reply
}

pub(crate) fn convert_images(
    messages: Vec<ImageListResponse>,
    fallback: &str,
) -> AgentReply<Vec<ImageRecord>> {
    let mut reply = AgentReply::complete(Vec::new());
    for message in messages {
        let (node, error) = node_of(message.metadata.as_ref(), fallback);
        if let Some(error) = error {
            reply.node_errors.push(error);
            continue;
        }
        let size_bytes = message.size.max(0);
        reply.data.push(ImageRecord {
            node,
            name: message.name,
            digest: message.digest,
            size: format_si_bytes(size_bytes.unsigned_abs()),
            size_bytes,
            created_at: format_timestamp(message.created_at.as_ref()),
        });
    }
    reply
}

pub(crate) fn convert_time(messages: Vec<Time>, fallback: &str) -> AgentReply<Vec<TimeRecord>> {
    let mut reply = AgentReply::complete(Vec::new());
    for message in messages {
        let (node, error) = node_of(message.metadata.as_ref(), fallback);
        if let Some(error) = error {
            reply.node_errors.push(error);
            continue;
        }
        reply.data.push(TimeRecord {
            node,
            server: message.server,
            local_time: format_timestamp(message.localtime.as_ref()),
            remote_time: format_timestamp(message.remotetime.as_ref()),
        });
    }
    reply
}

pub(crate) fn convert_resource(
    response: GetResponse,
    node: &str,
    requested: ResourceId,
) -> Result<NodeResource> {
    let missing = || Error::NotFound(format!("resource {}/{} on {node}", requested.kind, requested.id));
    let resource = response.resource.ok_or_else(missing)?;
    let metadata = resource.metadata.unwrap_or_default();
    let yaml = resource.spec.map(|spec| spec.yaml_spec).unwrap_or_default();

    let spec = if yaml.trim().is_empty() {
        serde_json::Value::Null
    } else {
        serde_yaml::from_str(&yaml).map_err(|e| {
            Error::Decode(format!("{} spec from {node}: {e}", requested.kind))
        })?
    };

    let or_requested = |value: String, fallback: &str| {
        if value.is_empty() {
            fallback.to_string()
        } else {
            value
        }
    };
    Ok(NodeResource {
        node: node.to_string(),
        namespace: or_requested(metadata.namespace, requested.namespace),
        kind: or_requested(metadata.r#type, requested.kind),
        id: or_requested(metadata.id, requested.id),
        version: metadata.version,
        spec,
    })
}
