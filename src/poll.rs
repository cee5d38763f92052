//! Bounded readiness polling with cooperative cancellation.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, trace};

use crate::stage::Probe;

/// Parameters for one readiness poll.
#[derive(Debug, Clone)]
pub struct PollSpec {
    /// Delay between condition evaluations.
    pub interval: Duration,
    /// Maximum number of evaluations before giving up.
    pub max_attempts: u32,
    /// Overall deadline for the whole poll. `None` means attempts alone
    /// bound the poll.
    pub timeout: Option<Duration>,
}

impl PollSpec {
    /// Create a spec bounded by attempt count only.
    pub fn new(interval: Duration, max_attempts: u32) -> Self {
        Self {
            interval,
            max_attempts,
            timeout: None,
        }
    }

    /// Additionally bound the poll by an overall deadline.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Result of a readiness poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollOutcome {
    /// Whether the condition became true before the budget ran out.
    pub ready: bool,
    /// Number of evaluations actually performed.
    pub attempts: u32,
}

/// Cooperative cancellation flag shared between the orchestrator and any
/// in-flight poll. Cloning is cheap; all clones observe the same flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    /// Create a fresh, unset token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Idempotent.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Generic bounded-retry poll primitive: wait until a condition holds or
/// give up.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReadinessPoller;

impl ReadinessPoller {
    /// Evaluate `probe` at `spec.interval` until it returns true, the
    /// attempt budget is exhausted, the deadline elapses, or `cancel` is
    /// set - whichever comes first.
    ///
    /// Probe errors are treated as "not yet ready", never as poll
    /// failures. The cancellation flag is checked at the top of each
    /// iteration, so a cancel issued mid-sleep takes effect before the
    /// next evaluation.
    pub async fn poll(probe: &dyn Probe, spec: &PollSpec, cancel: &CancelToken) -> PollOutcome {
        let deadline = spec.timeout.map(|t| Instant::now() + t);
        let mut attempts = 0u32;

        while attempts < spec.max_attempts {
            if cancel.is_cancelled() {
                debug!(attempts, "poll cancelled");
                return PollOutcome {
                    ready: false,
                    attempts,
                };
            }
            if let Some(deadline) = deadline {
                if Instant::now() >= deadline {
                    debug!(attempts, "poll deadline elapsed");
                    return PollOutcome {
                        ready: false,
                        attempts,
                    };
                }
            }

            attempts += 1;
            match probe.evaluate().await {
                Ok(true) => {
                    debug!(attempts, "condition satisfied");
                    return PollOutcome {
                        ready: true,
                        attempts,
                    };
                }
                Ok(false) => {
                    trace!(attempt = attempts, "not yet ready");
                }
                Err(e) => {
                    trace!(attempt = attempts, error = %e, "probe error, treating as not ready");
                }
            }

            if attempts < spec.max_attempts {
                tokio::time::sleep(spec.interval).await;
            }
        }

        PollOutcome {
            ready: false,
            attempts,
        }
    }
}
