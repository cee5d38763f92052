//! Stage definition, action/probe traits and error types.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

/// Error returned by a stage action or probe.
#[derive(Error, Debug)]
pub enum StageError {
    /// Transient failure - retryable within a poll loop, never a run
    /// failure by itself.
    #[error("transient: {0}")]
    Transient(#[source] anyhow::Error),

    /// Fatal failure - halts the run and triggers rollback.
    #[error("fatal: {0}")]
    Fatal(#[source] anyhow::Error),

    /// Non-fatal failure - logged, run continues.
    #[error("non-fatal: {0}")]
    NonFatal(#[source] anyhow::Error),

    /// A response from an external service did not match the expected
    /// shape. Always treated as fatal for the stage that saw it.
    #[error("malformed response: {0}")]
    MalformedResponse(String),
}

impl StageError {
    /// Create a transient error.
    pub fn transient(err: impl Into<anyhow::Error>) -> Self {
        Self::Transient(err.into())
    }

    /// Create a fatal error.
    pub fn fatal(err: impl Into<anyhow::Error>) -> Self {
        Self::Fatal(err.into())
    }

    /// Create a non-fatal error.
    pub fn non_fatal(err: impl Into<anyhow::Error>) -> Self {
        Self::NonFatal(err.into())
    }

    /// Returns true if this error is transient.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }

    /// Returns true if this error must halt the run regardless of the
    /// stage's declared severity.
    pub fn forces_fatal(&self) -> bool {
        matches!(self, Self::MalformedResponse(_))
    }
}

/// Classification determining whether a stage's failure halts the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum Severity {
    /// Failure halts the run and triggers rollback.
    Fatal,
    /// Failure is logged and the run continues.
    BestEffort,
}

/// A single unit of provisioning work.
#[async_trait]
pub trait StageAction: Send + Sync {
    /// Perform the action, returning captured output on success.
    async fn run(&self) -> Result<String, StageError>;

    /// Whether this action mutates the world. Readiness waits and other
    /// pure observations return false; compensations may only be attached
    /// to stages whose action reports true.
    fn has_side_effects(&self) -> bool {
        true
    }
}

/// A repeatable observation of external state.
///
/// Used both as a stage's idempotency check ("already done?") and as a
/// readiness condition ("up yet?"). Must be safe to invoke any number of
/// times. An `Err` during polling counts as "not yet ready".
#[async_trait]
pub trait Probe: Send + Sync {
    async fn evaluate(&self) -> Result<bool, StageError>;
}

/// One unit of provisioning work with an idempotency check and optional
/// compensating action. Immutable once the plan is built.
#[derive(Clone)]
pub struct Stage {
    pub(crate) id: &'static str,
    pub(crate) description: String,
    pub(crate) severity: Severity,
    pub(crate) action: Arc<dyn StageAction>,
    pub(crate) check: Option<Arc<dyn Probe>>,
    pub(crate) compensation: Option<Arc<dyn StageAction>>,
    pub(crate) timeout: Duration,
}

impl Stage {
    /// Start building a stage with the given identifier and action.
    pub fn builder(id: &'static str, action: impl StageAction + 'static) -> StageBuilder {
        StageBuilder {
            stage: Stage {
                id,
                description: String::new(),
                severity: Severity::Fatal,
                action: Arc::new(action),
                check: None,
                compensation: None,
                timeout: Duration::from_secs(120),
            },
        }
    }

    /// The stage identifier.
    pub fn id(&self) -> &'static str {
        self.id
    }

    /// Human-readable description.
    pub fn description(&self) -> &str {
        &self.description
    }

    /// The stage's failure classification.
    pub fn severity(&self) -> Severity {
        self.severity
    }

    /// Whether this stage declares a compensating action.
    pub fn has_compensation(&self) -> bool {
        self.compensation.is_some()
    }
}

impl std::fmt::Debug for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stage")
            .field("id", &self.id)
            .field("severity", &self.severity)
            .field("has_check", &self.check.is_some())
            .field("has_compensation", &self.compensation.is_some())
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Builder for a [`Stage`].
pub struct StageBuilder {
    stage: Stage,
}

impl StageBuilder {
    /// Set the human-readable description.
    pub fn description(mut self, description: &str) -> Self {
        self.stage.description = description.to_string();
        self
    }

    /// Mark the stage best-effort: its failure never aborts the run.
    pub fn best_effort(mut self) -> Self {
        self.stage.severity = Severity::BestEffort;
        self
    }

    /// Attach an idempotency check. A satisfied check skips the stage
    /// without side effects.
    pub fn check(mut self, probe: impl Probe + 'static) -> Self {
        self.stage.check = Some(Arc::new(probe));
        self
    }

    /// Attach a compensating action, run in reverse order on rollback.
    pub fn compensation(mut self, action: impl StageAction + 'static) -> Self {
        self.stage.compensation = Some(Arc::new(action));
        self
    }

    /// Bound the action's execution time. Defaults to 120 seconds.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.stage.timeout = timeout;
        self
    }

    /// Finish building the stage.
    pub fn build(self) -> Stage {
        self.stage
    }
}

/// Adapter turning an async closure into a [`StageAction`].
pub struct FnAction<F> {
    f: F,
    side_effecting: bool,
}

impl<F, Fut> FnAction<F>
where
    F: Fn() -> Fut + Send + Sync,
    Fut: std::future::Future<Output = Result<String, StageError>> + Send,
{
    /// Wrap a closure as a side-effecting action.
    pub fn new(f: F) -> Self {
        Self {
            f,
            side_effecting: true,
        }
    }

    /// Wrap a closure as a pure observation.
    pub fn observing(f: F) -> Self {
        Self {
            f,
            side_effecting: false,
        }
    }
}

#[async_trait]
impl<F, Fut> StageAction for FnAction<F>
where
    F: Fn() -> Fut + Send + Sync,
    Fut: std::future::Future<Output = Result<String, StageError>> + Send,
{
    async fn run(&self) -> Result<String, StageError> {
        (self.f)().await
    }

    fn has_side_effects(&self) -> bool {
        self.side_effecting
    }
}

/// Adapter turning an async closure into a [`Probe`].
pub struct FnProbe<F>(pub F);

#[async_trait]
impl<F, Fut> Probe for FnProbe<F>
where
    F: Fn() -> Fut + Send + Sync,
    Fut: std::future::Future<Output = Result<bool, StageError>> + Send,
{
    async fn evaluate(&self) -> Result<bool, StageError> {
        (self.0)().await
    }
}
