//! Domain fetchers
//!
//! [`AgentClient`] decorates the [`FanOutInvoker`] with one method per
//! agent operation. [`WorkloadFetcher`] lists workloads, which come from
//! the node directory rather than the agents.

use nodeward_core::models::{
    ConsensusAlarm, ConsensusMemberStatus, ImageRecord, NodeResource, ServiceRecord, TimeRecord,
    WorkloadRecord,
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::directory::NodeDirectory;
use crate::error::Error;
use crate::invoker::{FanOutInvoker, FanOutResult};
use crate::retry::{self, RetryPolicy};
use crate::transport::{AgentReply, ResourceId, PLATFORM_METADATA, SYSTEM_INFORMATION};

/// Agent operations, each retried and reconnected by the invoker
#[derive(Debug, Clone)]
pub struct AgentClient {
    invoker: FanOutInvoker,
}

impl AgentClient {
    pub const fn new(invoker: FanOutInvoker) -> Self {
        Self { invoker }
    }

    pub const fn invoker(&self) -> &FanOutInvoker {
        &self.invoker
    }

    pub async fn service_list(&self, targets: &[String]) -> FanOutResult<Vec<ServiceRecord>> {
        self.invoker
            .invoke("ServiceList", targets, |agent, nodes| async move {
                agent.service_list(&nodes).await
            })
            .await
    }

    /// One service on each target; a complete answer without it is
    /// [`Error::NotFound`].
    pub async fn service_info(
        &self,
        targets: &[String],
        service_id: &str,
    ) -> FanOutResult<Vec<ServiceRecord>> {
        let result = self
            .service_list(targets)
            .await
            .map(|records| filter_service(records, service_id));

        match result {
            FanOutResult::Complete(records) if records.is_empty() => {
                FanOutResult::Failed(Error::NotFound(format!("service '{service_id}'")))
            }
            other => other,
        }
    }

    pub async fn etcd_status(&self, targets: &[String]) -> FanOutResult<Vec<ConsensusMemberStatus>> {
        self.invoker
            .invoke("EtcdStatus", targets, |agent, nodes| async move {
                agent.etcd_status(&nodes).await
            })
            .await
    }

    pub async fn etcd_alarms(&self, targets: &[String]) -> FanOutResult<Vec<ConsensusAlarm>> {
        self.invoker
            .invoke("EtcdAlarmList", targets, |agent, nodes| async move {
                agent.etcd_alarms(&nodes).await
            })
            .await
    }

    pub async fn images(&self, targets: &[String]) -> FanOutResult<Vec<ImageRecord>> {
        self.invoker
            .invoke("ImageList", targets, |agent, nodes| async move {
                agent.image_list(&nodes).await
            })
            .await
    }

    pub async fn time_check(&self, targets: &[String], server: &str) -> FanOutResult<Vec<TimeRecord>> {
        self.invoker
            .invoke("TimeCheck", targets, |agent, nodes| {
                let server = server.to_string();
                async move { agent.time_check(&nodes, &server).await }
            })
            .await
    }

    /// Hardware summary of the node at `address`
    pub async fn system_info(&self, address: &str) -> FanOutResult<Vec<NodeResource>> {
        self.resource("SystemInformation", address, SYSTEM_INFORMATION)
            .await
    }

    /// Platform metadata of the node at `address`
    pub async fn platform_metadata(&self, address: &str) -> FanOutResult<Vec<NodeResource>> {
        self.resource("PlatformMetadata", address, PLATFORM_METADATA)
            .await
    }

    async fn resource(
        &self,
        operation: &str,
        address: &str,
        resource: ResourceId,
    ) -> FanOutResult<Vec<NodeResource>> {
        self.invoker
            .invoke(operation, &[], |agent, _| {
                let address = address.to_string();
                async move {
                    let record = agent.resource(&address, resource).await?;
                    Ok(AgentReply::complete(vec![record]))
                }
            })
            .await
    }
}

fn filter_service(records: Vec<ServiceRecord>, service_id: &str) -> Vec<ServiceRecord> {
    records
        .into_iter()
        .filter(|r| r.service_id == service_id)
        .collect()
}

/// Workload listing, bounded by the agent-call deadline and the shutdown
/// token. Directory errors are returned as they are.
#[derive(Clone)]
pub struct WorkloadFetcher {
    directory: Arc<dyn NodeDirectory>,
    policy: RetryPolicy,
    shutdown: CancellationToken,
}

impl WorkloadFetcher {
    pub fn new(
        directory: Arc<dyn NodeDirectory>,
        policy: RetryPolicy,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            directory,
            policy,
            shutdown,
        }
    }

    pub async fn list(
        &self,
        namespace: Option<&str>,
        node: Option<&str>,
    ) -> FanOutResult<Vec<WorkloadRecord>> {
        let directory = &self.directory;
        retry::run(
            "ListWorkloads",
            self.policy,
            &self.shutdown,
            (),
            |()| async move {
                // Directory errors are not retryable, so a failing API server ends the call at once.
                match directory.list_workloads(namespace, node).await {
                    Ok(records) => FanOutResult::Complete(records),
                    Err(e) => FanOutResult::Failed(e),
                }
            },
            retry::no_recovery,
        )
        .await
    }
}

impl std::fmt::Debug for WorkloadFetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkloadFetcher")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::testing::{service, FakeConnector, FakeTransport};
    use crate::connection::ConnectionManager;
    use async_trait::async_trait;
    use nodeward_core::models::{NodeDetail, NodeRef};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn client(transport: FakeTransport) -> AgentClient {
        let connections = Arc::new(ConnectionManager::new(
            Arc::new(FakeConnector::new(vec![transport])),
            Duration::from_millis(200),
        ));
        let policy = RetryPolicy::new(Duration::from_millis(5), Duration::from_millis(300));
        AgentClient::new(FanOutInvoker::new(connections, policy, CancellationToken::new()))
    }

    #[tokio::test]
    async fn test_service_info_filters_by_id() {
        let transport = FakeTransport::new(1, true).script(vec![Ok(AgentReply::complete(vec![
            service("cp-1", "etcd"),
            service("cp-1", "kubelet"),
            service("cp-2", "etcd"),
        ]))]);

        let result = client(transport)
            .service_info(&["10.0.0.2".to_string()], "etcd")
            .await;

        let records = result.data().cloned().unwrap();
        assert_eq!(records.len(), 2);
        assert!(records.iter().all(|r| r.service_id == "etcd"));
    }

    #[tokio::test]
    async fn test_service_info_missing_service() {
        let transport = FakeTransport::new(1, true)
            .script(vec![Ok(AgentReply::complete(vec![service("cp-1", "etcd")]))]);

        let result = client(transport).service_info(&[], "ext-foo").await;

        assert!(matches!(result, FanOutResult::Failed(Error::NotFound(_))));
    }

    fn shared_client(transport: &Arc<FakeTransport>) -> AgentClient {
        let connector = FakeConnector {
            transports: std::sync::Mutex::new([Arc::clone(transport)].into()),
            connects: AtomicUsize::new(0),
        };
        let connections = Arc::new(ConnectionManager::new(
            Arc::new(connector),
            Duration::from_millis(200),
        ));
        let policy = RetryPolicy::new(Duration::from_millis(5), Duration::from_millis(300));
        AgentClient::new(FanOutInvoker::new(connections, policy, CancellationToken::new()))
    }

    #[tokio::test]
    async fn test_system_info_reads_one_node() {
        let transport = Arc::new(FakeTransport::new(4, true));

        let result = shared_client(&transport).system_info("10.0.0.3").await;

        let records = match result {
            FanOutResult::Complete(records) => records,
            other => panic!("expected complete result, got {other:?}"),
        };
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].node, "10.0.0.3");
        assert_eq!(records[0].kind, SYSTEM_INFORMATION.kind);
        assert_eq!(records[0].spec["transport"], 4);
    }

    #[tokio::test]
    async fn test_missing_resource_is_not_retried() {
        let transport = Arc::new(FakeTransport::new(1, true));

        let result = shared_client(&transport).platform_metadata("absent").await;

        assert!(matches!(result, FanOutResult::Failed(Error::NotFound(_))));
        assert_eq!(transport.resource_calls.load(Ordering::SeqCst), 1);
    }

    /// Fails the first `failures` listings with `error`, then answers
    struct ScriptedDirectory {
        calls: AtomicUsize,
        failures: usize,
        error: fn() -> Error,
    }

    impl ScriptedDirectory {
        fn new(failures: usize, error: fn() -> Error) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                failures,
                error,
            })
        }
    }

    #[async_trait]
    impl NodeDirectory for ScriptedDirectory {
        async fn list_nodes(&self, _role: Option<&str>) -> crate::Result<Vec<NodeRef>> {
            Ok(Vec::new())
        }

        async fn get_node(&self, name: &str) -> crate::Result<NodeDetail> {
            Err(Error::NotFound(name.to_string()))
        }

        async fn list_workloads(
            &self,
            namespace: Option<&str>,
            _node: Option<&str>,
        ) -> crate::Result<Vec<WorkloadRecord>> {
            if self.calls.fetch_add(1, Ordering::SeqCst) < self.failures {
                return Err((self.error)());
            }
            Ok(vec![WorkloadRecord {
                name: "coredns-abc".to_string(),
                namespace: namespace.unwrap_or("kube-system").to_string(),
                node_name: None,
                owner_kinds: vec!["ReplicaSet".to_string()],
                ready: None,
                status: None,
            }])
        }
    }

    fn fetcher(directory: Arc<ScriptedDirectory>) -> WorkloadFetcher {
        WorkloadFetcher::new(
            directory,
            RetryPolicy::new(Duration::from_millis(10), Duration::from_millis(500)),
            CancellationToken::new(),
        )
    }

    #[tokio::test]
    async fn test_workload_listing() {
        let directory = ScriptedDirectory::new(0, || Error::Directory("unused".into()));

        let result = fetcher(directory.clone()).list(Some("kube-system"), None).await;

        assert!(result.is_complete());
        assert_eq!(result.data().unwrap()[0].namespace, "kube-system");
        assert_eq!(directory.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_directory_failure_is_not_retried() {
        let directory = ScriptedDirectory::new(usize::MAX, || {
            Error::Directory("api server unreachable".into())
        });
        let started = std::time::Instant::now();

        let result = fetcher(directory.clone()).list(None, None).await;

        assert!(matches!(
            result,
            FanOutResult::Failed(Error::Directory(ref m)) if m == "api server unreachable"
        ));
        assert_eq!(directory.calls.load(Ordering::SeqCst), 1);
        assert!(started.elapsed() < Duration::from_millis(250));
    }
}
