//! Fan-out invoker
//!
//! Issues one logical call to a set of node addresses through the shared
//! connection, retrying with [`crate::retry::run`] and asking the
//! [`ConnectionManager`] to check (and if needed replace) the connection
//! after every failed attempt.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::connection::ConnectionManager;
use crate::error::{Error, Result};
use crate::retry::{self, RetryPolicy};
use crate::transport::{AgentReply, AgentTransport};

/// Outcome of a fan-out call
///
/// `Partial` means some nodes answered and others did not, or the call ran
/// out of time after a partial answer; the records received are kept so
/// callers can decide whether they are usable.
#[derive(Debug)]
pub enum FanOutResult<T> {
    Complete(T),
    Partial { data: T, error: Error },
    Failed(Error),
}

impl<T> FanOutResult<T> {
    /// Whether every targeted node answered
    pub const fn is_complete(&self) -> bool {
        matches!(self, Self::Complete(_))
    }

    pub const fn data(&self) -> Option<&T> {
        match self {
            Self::Complete(data) | Self::Partial { data, .. } => Some(data),
            Self::Failed(_) => None,
        }
    }

    pub const fn error(&self) -> Option<&Error> {
        match self {
            Self::Complete(_) => None,
            Self::Partial { error, .. } | Self::Failed(error) => Some(error),
        }
    }

    pub fn into_parts(self) -> (Option<T>, Option<Error>) {
        match self {
            Self::Complete(data) => (Some(data), None),
            Self::Partial { data, error } => (Some(data), Some(error)),
            Self::Failed(error) => (None, Some(error)),
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> FanOutResult<U> {
        match self {
            Self::Complete(data) => FanOutResult::Complete(f(data)),
            Self::Partial { data, error } => FanOutResult::Partial {
                data: f(data),
                error,
            },
            Self::Failed(error) => FanOutResult::Failed(error),
        }
    }
}

/// Runs agent calls against target nodes with retry and reconnection
#[derive(Debug, Clone)]
pub struct FanOutInvoker {
    connections: Arc<ConnectionManager>,
    policy: RetryPolicy,
    shutdown: CancellationToken,
}

impl FanOutInvoker {
    pub fn new(
        connections: Arc<ConnectionManager>,
        policy: RetryPolicy,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            connections,
            policy,
            shutdown,
        }
    }

    #[must_use]
    pub const fn policy(&self) -> RetryPolicy {
        self.policy
    }

    #[must_use]
    pub const fn shutdown_token(&self) -> &CancellationToken {
        &self.shutdown
    }

    #[must_use]
    pub fn connections(&self) -> &Arc<ConnectionManager> {
        &self.connections
    }

    /// Call `op` for `targets` (empty = the endpoint's own node) with the
    /// default deadline.
    pub async fn invoke<T, F, Fut>(&self, operation: &str, targets: &[String], op: F) -> FanOutResult<T>
    where
        F: Fn(Arc<dyn AgentTransport>, Vec<String>) -> Fut,
        Fut: Future<Output = Result<AgentReply<T>>>,
    {
        self.invoke_with_deadline(operation, targets, self.policy.deadline, op)
            .await
    }

    pub async fn invoke_with_deadline<T, F, Fut>(
        &self,
        operation: &str,
        targets: &[String],
        deadline: Duration,
        op: F,
    ) -> FanOutResult<T>
    where
        F: Fn(Arc<dyn AgentTransport>, Vec<String>) -> Fut,
        Fut: Future<Output = Result<AgentReply<T>>>,
    {
        let started = Instant::now();
        let handle = tokio::select! {
            () = self.shutdown.cancelled() => {
                return FanOutResult::Failed(Error::Cancelled(format!(
                    "{operation} cancelled by shutdown"
                )));
            }
            handle = tokio::time::timeout(deadline, self.connections.handle()) => match handle {
                Ok(Ok(handle)) => handle,
                Ok(Err(e)) => return FanOutResult::Failed(e),
                Err(_) => {
                    return FanOutResult::Failed(Error::Timeout(format!(
                        "{operation}: no agent connection within {deadline:?}"
                    )));
                }
            },
        };
        // Connecting counts against the same budget as the attempts.
        let remaining = deadline.saturating_sub(started.elapsed());

        let op = &op;
        retry::run(
            operation,
            self.policy.with_deadline(remaining),
            &self.shutdown,
            handle,
            |handle| {
                let call = op(handle, targets.to_vec());
                async move {
                    match call.await {
                        Ok(reply) => reply.into_result(),
                        Err(e) => FanOutResult::Failed(e),
                    }
                }
            },
            move |stale| async move { self.connections.ensure_live(&stale).await },
        )
        .await
    }
}
