//! Single-stage execution with timeout and structured results.

use std::time::Instant;

use tracing::{debug, info, warn};

use crate::report::{ExecutionResult, Outcome};
use crate::stage::{Severity, Stage, StageError};

/// Runs one stage and folds every possible failure into an
/// [`ExecutionResult`]. Never returns `Err` past its boundary.
#[derive(Debug, Clone, Copy, Default)]
pub struct StageExecutor;

impl StageExecutor {
    /// Execute the stage: idempotency check first, then the action under
    /// the stage's timeout. A satisfied check yields `Skipped` with no
    /// side effects.
    pub async fn execute(stage: &Stage) -> ExecutionResult {
        let started = Instant::now();

        if let Some(check) = &stage.check {
            match tokio::time::timeout(stage.timeout, check.evaluate()).await {
                Ok(Ok(true)) => {
                    info!(stage = stage.id, "already satisfied, skipping");
                    return ExecutionResult {
                        stage_id: stage.id,
                        outcome: Outcome::Skipped,
                        output: String::new(),
                        error: None,
                        elapsed: started.elapsed(),
                    };
                }
                Ok(Ok(false)) => {}
                // A broken or hung check must not fail the stage; the
                // action runs and decides for itself.
                Err(_) => {
                    warn!(stage = stage.id, timeout = ?stage.timeout, "idempotency check timed out, running stage");
                }
                Ok(Err(e)) => {
                    warn!(stage = stage.id, error = %e, "idempotency check failed, running stage");
                }
            }
        }

        debug!(stage = stage.id, "executing");
        let attempt = tokio::time::timeout(stage.timeout, stage.action.run()).await;

        match attempt {
            Ok(Ok(output)) => {
                info!(stage = stage.id, "succeeded");
                ExecutionResult {
                    stage_id: stage.id,
                    outcome: Outcome::Succeeded,
                    output,
                    error: None,
                    elapsed: started.elapsed(),
                }
            }
            Ok(Err(e)) => {
                let outcome = Self::classify(stage, &e);
                warn!(stage = stage.id, error = %e, ?outcome, "stage failed");
                ExecutionResult {
                    stage_id: stage.id,
                    outcome,
                    output: String::new(),
                    error: Some(e.to_string()),
                    elapsed: started.elapsed(),
                }
            }
            Err(_) => {
                let outcome = match stage.severity() {
                    Severity::Fatal => Outcome::FailedFatal,
                    Severity::BestEffort => Outcome::FailedNonFatal,
                };
                warn!(stage = stage.id, timeout = ?stage.timeout, "stage timed out");
                ExecutionResult {
                    stage_id: stage.id,
                    outcome,
                    output: String::new(),
                    error: Some(format!("timed out after {:?}", stage.timeout)),
                    elapsed: started.elapsed(),
                }
            }
        }
    }

    /// Map an action error onto the stage's declared classification.
    /// Malformed external responses halt the run regardless.
    fn classify(stage: &Stage, err: &StageError) -> Outcome {
        if err.forces_fatal() {
            return Outcome::FailedFatal;
        }
        match stage.severity() {
            Severity::Fatal => Outcome::FailedFatal,
            Severity::BestEffort => Outcome::FailedNonFatal,
        }
    }
}
