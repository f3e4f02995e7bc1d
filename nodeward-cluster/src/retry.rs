//! Retry-with-recovery combinator
//!
//! One loop shared by every remote call: constant backoff between attempts,
//! an overall deadline measured from the first attempt, a recovery step
//! after each failed attempt, and prompt exit on shutdown. The last partial
//! data seen is handed back together with the terminal error.

use backon::{BackoffBuilder, ConstantBuilder};
use nodeward_core::config::AgentConfig;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::Error;
use crate::invoker::FanOutResult;

/// Constant-interval retry bounded by an overall deadline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub interval: Duration,
    pub deadline: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(100),
            deadline: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    #[must_use]
    pub const fn new(interval: Duration, deadline: Duration) -> Self {
        Self { interval, deadline }
    }

    #[must_use]
    pub const fn from_config(config: &AgentConfig) -> Self {
        Self::new(config.retry_interval(), config.retry_deadline())
    }

    #[must_use]
    pub const fn with_deadline(self, deadline: Duration) -> Self {
        Self { deadline, ..self }
    }

    /// Delays before each retry; the deadline cuts the sequence short.
    fn delays(&self) -> impl Iterator<Item = Duration> {
        let interval = self.interval.max(Duration::from_millis(1));
        let times = usize::try_from(self.deadline.as_millis() / interval.as_millis())
            .unwrap_or(usize::MAX);
        ConstantBuilder::default()
            .with_delay(interval)
            .with_max_times(times)
            .build()
    }
}

/// Run `attempt` until it completes, fails for good, or the deadline passes.
///
/// `context` is handed to every attempt (for agent calls, the connection
/// handle). After a failed attempt `recover` gets the context back and
/// returns the one to use next; an error from `recover` ends the loop.
pub async fn run<C, T, A, AF, R, RF>(
    operation: &str,
    policy: RetryPolicy,
    shutdown: &CancellationToken,
    mut context: C,
    mut attempt: A,
    mut recover: R,
) -> FanOutResult<T>
where
    C: Clone,
    A: FnMut(C) -> AF,
    AF: Future<Output = FanOutResult<T>>,
    R: FnMut(C) -> RF,
    RF: Future<Output = Result<C, Error>>,
{
    let deadline = Instant::now() + policy.deadline;
    let mut last_data: Option<T> = None;
    let mut last_error: Option<Error> = None;

    for (attempt_no, delay) in std::iter::once(Duration::ZERO)
        .chain(policy.delays())
        .enumerate()
    {
        if delay > Duration::ZERO {
            if Instant::now() + delay >= deadline {
                break;
            }
            tokio::select! {
                () = shutdown.cancelled() => return cancelled(operation, last_data),
                () = tokio::time::sleep(delay) => {}
            }
        }

        let outcome = tokio::select! {
            () = shutdown.cancelled() => return cancelled(operation, last_data),
            outcome = tokio::time::timeout_at(deadline, attempt(context.clone())) => outcome,
        };

        let error = match outcome {
            Ok(FanOutResult::Complete(data)) => {
                if attempt_no > 0 {
                    debug!(operation, attempts = attempt_no + 1, "Call succeeded after retry");
                }
                return FanOutResult::Complete(data);
            }
            Ok(FanOutResult::Partial { data, error }) => {
                last_data = Some(data);
                error
            }
            Ok(FanOutResult::Failed(error)) => error,
            Err(_) => {
                last_error = Some(Error::Timeout(format!(
                    "{operation} did not finish within {:?}",
                    policy.deadline
                )));
                break;
            }
        };

        if !error.is_retryable() {
            return finish(last_data, error);
        }

        warn!(
            operation,
            attempt = attempt_no + 1,
            error = %error,
            "Remote call failed, retrying"
        );

        let recovered = tokio::select! {
            () = shutdown.cancelled() => return cancelled(operation, last_data),
            recovered = tokio::time::timeout_at(deadline, recover(context.clone())) => recovered,
        };
        match recovered {
            Ok(Ok(next)) => context = next,
            Ok(Err(e)) => return finish(last_data, e),
            Err(_) => {
                last_error = Some(error);
                break;
            }
        }

        last_error = Some(error);
    }

    let error = last_error.unwrap_or_else(|| {
        Error::Timeout(format!(
            "{operation} did not finish within {:?}",
            policy.deadline
        ))
    });
    finish(last_data, error)
}

/// Recovery step for calls that have nothing to reconnect.
pub async fn no_recovery<C>(context: C) -> Result<C, Error> {
    Ok(context)
}

fn finish<T>(data: Option<T>, error: Error) -> FanOutResult<T> {
    match data {
        Some(data) => FanOutResult::Partial { data, error },
        None => FanOutResult::Failed(error),
    }
}

fn cancelled<T>(operation: &str, data: Option<T>) -> FanOutResult<T> {
    debug!(operation, "Call cancelled by shutdown");
    finish(data, Error::Cancelled(format!("{operation} cancelled by shutdown")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn fast() -> RetryPolicy {
        RetryPolicy::new(Duration::from_millis(5), Duration::from_millis(200))
    }

    #[test]
    fn test_default_policy() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.interval, Duration::from_millis(100));
        assert_eq!(policy.deadline, Duration::from_secs(10));
        assert_eq!(policy.delays().count(), 100);
    }

    #[tokio::test]
    async fn test_succeeds_after_transient_failures() {
        let calls = AtomicUsize::new(0);
        let result = run(
            "ServiceList",
            fast(),
            &CancellationToken::new(),
            (),
            |()| {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        FanOutResult::Failed(Error::RemoteCall("unavailable".into()))
                    } else {
                        FanOutResult::Complete(vec!["etcd"])
                    }
                }
            },
            no_recovery,
        )
        .await;

        assert!(matches!(result, FanOutResult::Complete(ref v) if v == &vec!["etcd"]));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_deadline_returns_last_partial_data() {
        let result = run(
            "EtcdStatus",
            fast(),
            &CancellationToken::new(),
            (),
            |()| async {
                FanOutResult::Partial {
                    data: vec![1_u64],
                    error: Error::RemoteCall("cp-2: connection refused".into()),
                }
            },
            no_recovery,
        )
        .await;

        match result {
            FanOutResult::Partial { data, error } => {
                assert_eq!(data, vec![1]);
                assert!(error.to_string().contains("cp-2"));
            }
            other => panic!("expected partial result, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_deadline_without_data_fails() {
        let result: FanOutResult<()> = run(
            "EtcdStatus",
            fast(),
            &CancellationToken::new(),
            (),
            |()| async { FanOutResult::Failed(Error::RemoteCall("unavailable".into())) },
            no_recovery,
        )
        .await;

        assert!(matches!(result, FanOutResult::Failed(Error::RemoteCall(_))));
    }

    #[tokio::test]
    async fn test_recovery_error_aborts_immediately() {
        let calls = AtomicUsize::new(0);
        let result: FanOutResult<()> = run(
            "ServiceList",
            fast(),
            &CancellationToken::new(),
            (),
            |()| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { FanOutResult::Failed(Error::RemoteCall("unavailable".into())) }
            },
            |()| async { Err(Error::Connection("credentials rejected".into())) },
        )
        .await;

        assert!(matches!(result, FanOutResult::Failed(Error::Connection(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_non_retryable_error_is_not_retried() {
        let calls = AtomicUsize::new(0);
        let result: FanOutResult<()> = run(
            "ServiceList",
            fast(),
            &CancellationToken::new(),
            (),
            |()| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { FanOutResult::Failed(Error::Directory("forbidden".into())) }
            },
            no_recovery,
        )
        .await;

        assert!(matches!(result, FanOutResult::Failed(Error::Directory(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_recovered_context_is_used_next() {
        let result = run(
            "ServiceList",
            fast(),
            &CancellationToken::new(),
            1_u32,
            |generation| async move {
                if generation == 1 {
                    FanOutResult::Failed(Error::RemoteCall("stale".into()))
                } else {
                    FanOutResult::Complete(generation)
                }
            },
            |generation| async move { Ok(generation + 1) },
        )
        .await;

        assert!(matches!(result, FanOutResult::Complete(2)));
    }

    #[tokio::test]
    async fn test_shutdown_cancels_promptly() {
        let shutdown = CancellationToken::new();
        let policy = RetryPolicy::new(Duration::from_millis(50), Duration::from_secs(30));
        let trigger = shutdown.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let started = Instant::now();
        let result: FanOutResult<()> = run(
            "ServiceList",
            policy,
            &shutdown,
            (),
            |()| async { FanOutResult::Failed(Error::RemoteCall("unavailable".into())) },
            no_recovery,
        )
        .await;

        assert!(matches!(result, FanOutResult::Failed(Error::Cancelled(_))));
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
