//! Fetchers over the invoker and connection manager, driven by an
//! in-memory agent fleet.

use async_trait::async_trait;
use nodeward_cluster::{
    AgentClient, AgentReply, AgentTransport, ConnectionManager, Connector, Error, FanOutInvoker,
    FanOutResult, ResourceId, Result, RetryPolicy,
};
use nodeward_core::health::{evaluate_alarms, evaluate_consensus, evaluate_services};
use nodeward_core::models::{
    ConsensusAlarm, ConsensusMemberStatus, ImageRecord, NodeResource, ServiceRecord, TimeRecord,
};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// One connection to a fleet of control-plane nodes; every call fails
/// once `broken` is set until a new connection is made.
struct Fleet {
    generation: usize,
    broken: Arc<AtomicBool>,
    unreachable: Vec<String>,
}

impl Fleet {
    fn check(&self) -> Result<()> {
        if self.broken.load(Ordering::SeqCst) {
            Err(Error::RemoteCall("transport is closing".into()))
        } else {
            Ok(())
        }
    }

    fn answer<T>(&self, nodes: &[String], record: impl Fn(&str) -> T) -> AgentReply<Vec<T>> {
        let mut reply = AgentReply::complete(Vec::new());
        for node in nodes {
            if self.unreachable.contains(node) {
                reply.node_errors.push(format!("{node}: connection refused"));
            } else {
                reply.data.push(record(node));
            }
        }
        reply
    }
}

#[async_trait]
impl AgentTransport for Fleet {
    async fn version(&self) -> Result<String> {
        self.check()?;
        Ok(format!("v1.8.{}", self.generation))
    }

    async fn service_list(&self, nodes: &[String]) -> Result<AgentReply<Vec<ServiceRecord>>> {
        self.check()?;
        Ok(self.answer(nodes, |node| ServiceRecord {
            host_node: node.to_string(),
            service_id: "etcd".to_string(),
            state: "Running".to_string(),
            healthy: Some(true),
            health_message: String::new(),
        }))
    }

    async fn etcd_status(&self, nodes: &[String]) -> Result<AgentReply<Vec<ConsensusMemberStatus>>> {
        self.check()?;
        Ok(self.answer(nodes, |node| ConsensusMemberStatus {
            host_node: node.to_string(),
            member_id: 1,
            leader_id: 7,
            db_size_bytes: 64 << 20,
            db_size_in_use_bytes: 32 << 20,
            raft_index: 100,
            raft_term: 2,
            is_learner: false,
            errors: Vec::new(),
        }))
    }

    async fn etcd_alarms(&self, _nodes: &[String]) -> Result<AgentReply<Vec<ConsensusAlarm>>> {
        self.check()?;
        Ok(AgentReply::complete(Vec::new()))
    }

    async fn image_list(&self, _nodes: &[String]) -> Result<AgentReply<Vec<ImageRecord>>> {
        self.check()?;
        Ok(AgentReply::complete(Vec::new()))
    }

    async fn time_check(&self, nodes: &[String], server: &str) -> Result<AgentReply<Vec<TimeRecord>>> {
        self.check()?;
        Ok(self.answer(nodes, |node| TimeRecord {
            node: node.to_string(),
            server: server.to_string(),
            local_time: "2024-01-01T00:00:00Z".to_string(),
            remote_time: "2024-01-01T00:00:00Z".to_string(),
        }))
    }

    async fn resource(&self, node: &str, resource: ResourceId) -> Result<NodeResource> {
        self.check()?;
        if self.unreachable.iter().any(|n| n == node) {
            return Err(Error::RemoteCall(format!("{node}: connection refused")));
        }
        Ok(NodeResource {
            node: node.to_string(),
            namespace: resource.namespace.to_string(),
            kind: resource.kind.to_string(),
            id: resource.id.to_string(),
            version: self.generation.to_string(),
            spec: serde_json::json!({ "platform": "metal" }),
        })
    }
}

struct FleetConnector {
    connects: AtomicUsize,
    unreachable: Vec<String>,
    /// Shared with the most recent connection
    broken: std::sync::Mutex<Arc<AtomicBool>>,
}

impl FleetConnector {
    fn new(unreachable: &[&str]) -> Self {
        Self {
            connects: AtomicUsize::new(0),
            unreachable: unreachable.iter().map(|n| (*n).to_string()).collect(),
            broken: std::sync::Mutex::new(Arc::new(AtomicBool::new(false))),
        }
    }

    fn break_current(&self) {
        self.broken.lock().unwrap().store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl Connector for FleetConnector {
    async fn connect(&self) -> Result<Arc<dyn AgentTransport>> {
        let generation = self.connects.fetch_add(1, Ordering::SeqCst) + 1;
        let broken = Arc::new(AtomicBool::new(false));
        *self.broken.lock().unwrap() = Arc::clone(&broken);
        Ok(Arc::new(Fleet {
            generation,
            broken,
            unreachable: self.unreachable.clone(),
        }))
    }
}

fn agent_client(connector: Arc<FleetConnector>, deadline: Duration) -> AgentClient {
    let connections = Arc::new(ConnectionManager::new(connector, Duration::from_millis(200)));
    let policy = RetryPolicy::new(Duration::from_millis(5), deadline);
    AgentClient::new(FanOutInvoker::new(connections, policy, CancellationToken::new()))
}

fn targets(nodes: &[&str]) -> Vec<String> {
    nodes.iter().map(|n| (*n).to_string()).collect()
}

#[tokio::test]
async fn test_healthy_fleet_is_evaluated_ok() {
    let connector = Arc::new(FleetConnector::new(&[]));
    let client = agent_client(connector.clone(), Duration::from_secs(2));
    let nodes = targets(&["10.0.0.2", "10.0.0.3", "10.0.0.4"]);

    let services = client.service_list(&nodes).await;
    let FanOutResult::Complete(services) = services else {
        panic!("expected complete service list");
    };
    assert_eq!(services.len(), 3);
    assert!(evaluate_services(&services, &HashSet::new()).is_ok());

    let FanOutResult::Complete(members) = client.etcd_status(&nodes).await else {
        panic!("expected complete consensus status");
    };
    assert!(evaluate_consensus(&members, 512 << 20).is_ok());

    let FanOutResult::Complete(alarms) = client.etcd_alarms(&nodes).await else {
        panic!("expected complete alarm list");
    };
    assert!(evaluate_alarms(&alarms).is_ok());
    assert_eq!(connector.connects.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_unreachable_node_yields_partial_records() {
    let connector = Arc::new(FleetConnector::new(&["10.0.0.4"]));
    let client = agent_client(connector, Duration::from_millis(100));

    let result = client
        .service_list(&targets(&["10.0.0.2", "10.0.0.3", "10.0.0.4"]))
        .await;

    match result {
        FanOutResult::Partial { data, error } => {
            assert_eq!(data.len(), 2);
            assert!(error.to_string().contains("10.0.0.4"));
        }
        other => panic!("expected partial result, got {other:?}"),
    }
}

#[tokio::test]
async fn test_broken_connection_is_replaced_once_for_concurrent_requests() {
    let connector = Arc::new(FleetConnector::new(&[]));
    let client = agent_client(connector.clone(), Duration::from_secs(2));
    let nodes = targets(&["10.0.0.2"]);

    assert!(client.service_list(&nodes).await.is_complete());
    connector.break_current();

    let calls = (0..8).map(|_| client.time_check(&nodes, "pool.ntp.org"));
    let results = futures::future::join_all(calls).await;

    assert!(results.iter().all(FanOutResult::is_complete));
    assert_eq!(connector.connects.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_resource_read_survives_reconnect() {
    let connector = Arc::new(FleetConnector::new(&[]));
    let client = agent_client(connector.clone(), Duration::from_secs(2));

    assert!(client.platform_metadata("10.0.0.2").await.is_complete());
    connector.break_current();

    let FanOutResult::Complete(records) = client.platform_metadata("10.0.0.2").await else {
        panic!("expected platform metadata after reconnect");
    };
    assert_eq!(records[0].version, "2");
    assert_eq!(records[0].spec["platform"], "metal");
    assert_eq!(connector.connects.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_unreachable_resource_node_fails_after_deadline() {
    let connector = Arc::new(FleetConnector::new(&["10.0.0.4"]));
    let client = agent_client(connector, Duration::from_millis(100));

    let result = client.system_info("10.0.0.4").await;

    assert!(matches!(result, FanOutResult::Failed(Error::RemoteCall(_))));
}
