//! Top-level run driver: stages in order, rollback on fatal failure.

use tracing::{info, warn};

use crate::executor::StageExecutor;
use crate::plan::Plan;
use crate::poll::CancelToken;
use crate::report::{Outcome, RunReport, RunState};
use crate::rollback::RollbackManager;

/// Drives one plan through to a terminal state, producing the run's
/// single [`RunReport`].
pub struct Orchestrator {
    plan: Plan,
    cancel: CancelToken,
}

impl Orchestrator {
    /// Create an orchestrator for the given plan.
    pub fn new(plan: Plan) -> Self {
        Self {
            plan,
            cancel: CancelToken::new(),
        }
    }

    /// Share an external cancellation token. Once cancelled, the run
    /// skips remaining stages and proceeds directly to rollback.
    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// A clone of the run's cancellation token, usable by poll-backed
    /// stage actions so an in-flight poll observes the same flag.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Execute the plan strictly sequentially. Terminal states are
    /// `Completed` and `Failed`; the report carries one entry per stage
    /// attempted, skipped stages included.
    pub async fn run(&self) -> RunReport {
        let mut report = RunReport::new(self.plan.name());
        let mut rollback = RollbackManager::new();

        info!(plan = self.plan.name(), stages = self.plan.len(), "run starting");

        for (index, stage) in self.plan.stages().iter().enumerate() {
            if self.cancel.is_cancelled() {
                warn!(plan = self.plan.name(), at_stage = stage.id(), "run cancelled");
                report.cancelled = true;
                report.state = RunState::RollingBack;
                report.rolled_back = rollback.rollback_all().await;
                report.state = RunState::Failed;
                return report;
            }

            report.state = RunState::Running(index);
            let result = StageExecutor::execute(stage).await;
            let outcome = result.outcome;
            report.results.push(result);

            match outcome {
                Outcome::Succeeded => {
                    if let Some(compensation) = &stage.compensation {
                        rollback.record(stage.id(), compensation.clone());
                    }
                }
                Outcome::Skipped => {}
                Outcome::FailedNonFatal => {
                    warn!(stage = stage.id(), "best-effort stage failed, continuing");
                }
                Outcome::FailedFatal => {
                    warn!(stage = stage.id(), "fatal failure, rolling back");
                    report.cancelled = self.cancel.is_cancelled();
                    report.state = RunState::RollingBack;
                    report.rolled_back = rollback.rollback_all().await;
                    report.state = RunState::Failed;
                    return report;
                }
            }
        }

        // A cancel that landed while the final stage was in flight has no
        // next loop iteration to observe it; the run must still roll back.
        if self.cancel.is_cancelled() {
            warn!(plan = self.plan.name(), "run cancelled during final stage");
            report.cancelled = true;
            report.state = RunState::RollingBack;
            report.rolled_back = rollback.rollback_all().await;
            report.state = RunState::Failed;
            return report;
        }

        info!(plan = self.plan.name(), "run completed");
        report.state = RunState::Completed;
        report
    }
}
