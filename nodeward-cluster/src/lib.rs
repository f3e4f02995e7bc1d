//! nodeward cluster access
//!
//! Everything that talks to the outside: the shared agent connection, the
//! retrying fan-out invoker and the fetchers built on it, agent
//! credentials, and the Kubernetes-backed node directory.

pub mod connection;
pub mod credentials;
pub mod directory;
pub mod error;
pub mod fetch;
pub mod invoker;
pub mod retry;
pub mod transport;

pub use connection::ConnectionManager;
pub use credentials::TalosConnector;
pub use directory::{KubeDirectory, NodeDirectory, CONTROL_PLANE_ROLE};
pub use error::{Error, Result};
pub use fetch::{AgentClient, WorkloadFetcher};
pub use invoker::{FanOutInvoker, FanOutResult};
pub use retry::RetryPolicy;
pub use transport::{
    AgentReply, AgentTransport, Connector, ResourceId, TalosTransport, PLATFORM_METADATA,
    SYSTEM_INFORMATION,
};
