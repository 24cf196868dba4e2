//! Reachability probing with bounded retry

use std::future::Future;
use std::time::Duration;

use tokio::time::{Instant, sleep, timeout};
use tracing::{debug, info, warn};

use crate::error::ToolchainError;
use crate::types::SshTarget;

/// Exponential backoff between probe attempts
#[derive(Debug, Clone)]
pub struct Backoff {
    pub initial: Duration,
    pub max: Duration,
    pub multiplier: f64,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            initial: Duration::from_secs(1),
            max: Duration::from_secs(10),
            multiplier: 2.0,
        }
    }
}

impl Backoff {
    /// Delay after the `attempt`-th failure (zero based)
    #[must_use]
    pub fn delay(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let secs = self.initial.as_secs_f64() * self.multiplier.powi(exponent);
        Duration::from_secs_f64(secs.min(self.max.as_secs_f64()))
    }
}

/// Retries a connection attempt until it succeeds or the budget runs out
///
/// Each attempt is bounded by the remaining budget and every sleep is
/// clamped to it, so a call returns shortly after `budget` at the latest.
#[derive(Debug, Clone, Default)]
pub struct ReachabilityProbe {
    backoff: Backoff,
}

impl ReachabilityProbe {
    #[must_use]
    pub fn new(backoff: Backoff) -> Self {
        Self { backoff }
    }

    /// Run `attempt` until it returns `Ok`
    ///
    /// `attempt` receives the budget left for that try. Returns the number of
    /// attempts made on success.
    ///
    /// # Errors
    /// Returns `ToolchainError::Unreachable` once the budget is exhausted, or
    /// the attempt's own error if it is permanent.
    pub async fn wait<F, Fut>(
        &self,
        target: &SshTarget,
        budget: Duration,
        mut attempt: F,
    ) -> Result<u32, ToolchainError>
    where
        F: FnMut(Duration) -> Fut,
        Fut: Future<Output = Result<(), ToolchainError>>,
    {
        let deadline = Instant::now() + budget;
        let mut attempts = 0u32;

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            attempts += 1;

            match timeout(remaining, attempt(remaining)).await {
                Ok(Ok(())) => {
                    info!(host = %target.host, attempts, "target reachable");
                    return Ok(attempts);
                }
                Ok(Err(e)) if e.is_permanent() => {
                    warn!(host = %target.host, error = %e, "probe cannot succeed, giving up");
                    return Err(e);
                }
                Ok(Err(e)) => {
                    debug!(host = %target.host, attempt = attempts, error = %e, "probe attempt failed");
                }
                Err(_) => {
                    debug!(host = %target.host, attempt = attempts, "probe attempt ran out of budget");
                }
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                warn!(
                    host = %target.host,
                    user = %target.user,
                    timeout = ?budget,
                    attempts,
                    "target unreachable"
                );
                return Err(ToolchainError::Unreachable {
                    user: target.user.clone(),
                    host: target.host.clone(),
                    timeout: budget,
                });
            }

            sleep(self.backoff.delay(attempts - 1).min(remaining)).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    use nixconverge_exec::ExecError;

    use super::*;

    fn fast_probe() -> ReachabilityProbe {
        ReachabilityProbe::new(Backoff {
            initial: Duration::from_millis(10),
            max: Duration::from_millis(40),
            multiplier: 2.0,
        })
    }

    fn target() -> SshTarget {
        SshTarget::new("root", "web", "")
    }

    fn refused() -> ToolchainError {
        ToolchainError::CommandFailed {
            command: "ssh root@web true".to_string(),
            status: 255,
            stderr: "Connection refused".to_string(),
        }
    }

    #[test]
    fn test_backoff_delay() {
        let backoff = Backoff::default();

        assert_eq!(backoff.delay(0), Duration::from_secs(1));
        assert_eq!(backoff.delay(1), Duration::from_secs(2));
        assert_eq!(backoff.delay(2), Duration::from_secs(4));
        assert_eq!(backoff.delay(10), Duration::from_secs(10));
        assert_eq!(backoff.delay(u32::MAX), Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_succeeds_after_retries() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let attempts = fast_probe()
            .wait(&target(), Duration::from_secs(5), move |_| {
                let n = counter.fetch_add(1, Ordering::SeqCst);
                async move { if n < 2 { Err(refused()) } else { Ok(()) } }
            })
            .await
            .unwrap();

        assert_eq!(attempts, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_times_out_within_budget() {
        let budget = Duration::from_secs(30);
        let start = Instant::now();

        let result = ReachabilityProbe::default()
            .wait(&target(), budget, |_| async { Err(refused()) })
            .await;

        assert!(matches!(result, Err(ToolchainError::Unreachable { .. })));
        assert_eq!(start.elapsed(), budget);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hanging_attempt_bounded_by_budget() {
        let budget = Duration::from_secs(5);
        let start = Instant::now();

        let result = ReachabilityProbe::default()
            .wait(&target(), budget, |_| async {
                sleep(Duration::from_secs(300)).await;
                Ok(())
            })
            .await;

        assert!(matches!(result, Err(ToolchainError::Unreachable { .. })));
        assert_eq!(start.elapsed(), budget);
    }

    #[tokio::test]
    async fn test_permanent_error_stops_retrying() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let result = fast_probe()
            .wait(&target(), Duration::from_secs(5), move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                async {
                    Err(ToolchainError::Exec(ExecError::SpawnError {
                        program: "ssh".to_string(),
                        message: "No such file or directory".to_string(),
                    }))
                }
            })
            .await;

        assert!(matches!(result, Err(ToolchainError::Exec(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
