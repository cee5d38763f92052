//! Per-run execution records.

use std::fmt::Write as _;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Final state of an orchestrator run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RunState {
    /// No stage attempted yet.
    Pending,
    /// Executing the stage at this position.
    Running(usize),
    /// A fatal failure occurred; compensations are being applied.
    RollingBack,
    /// Every stage was consumed without a fatal failure.
    Completed,
    /// The run halted on a fatal failure or cancellation.
    Failed,
}

/// How a single stage attempt ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Outcome {
    /// The action ran and succeeded.
    Succeeded,
    /// The idempotency check reported "already done"; nothing ran.
    Skipped,
    /// The action failed and the stage is fatal; the run halts.
    FailedFatal,
    /// The action failed but the stage is best-effort; the run continues.
    FailedNonFatal,
}

impl Outcome {
    /// Whether this outcome allows the run to advance.
    pub fn advances(&self) -> bool {
        !matches!(self, Self::FailedFatal)
    }
}

/// Record of one stage attempt. Created fresh per run, never mutated
/// after the run completes.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionResult {
    /// The stage identifier.
    pub stage_id: &'static str,
    /// How the attempt ended.
    pub outcome: Outcome,
    /// Captured output, when the action produced any.
    pub output: String,
    /// Rendered error text, when the attempt failed.
    pub error: Option<String>,
    /// Wall time spent on the attempt.
    #[serde(with = "duration_millis")]
    pub elapsed: Duration,
}

mod duration_millis {
    use std::time::Duration;

    pub fn serialize<S: serde::Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u128(d.as_millis())
    }
}

/// Ordered record of one orchestrator run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    /// Name of the executed plan.
    pub plan_name: String,
    /// When the run started.
    pub started_at: DateTime<Utc>,
    /// One entry per attempted stage, in execution order. Skipped stages
    /// still get an entry; stages after a fatal failure do not.
    pub results: Vec<ExecutionResult>,
    /// Identifiers of stages whose compensation was invoked, in rollback
    /// (reverse) order.
    pub rolled_back: Vec<&'static str>,
    /// Terminal state of the run.
    pub state: RunState,
    /// Whether the run was cut short by cancellation.
    pub cancelled: bool,
}

impl RunReport {
    pub(crate) fn new(plan_name: &str) -> Self {
        Self {
            plan_name: plan_name.to_string(),
            started_at: Utc::now(),
            results: Vec::new(),
            rolled_back: Vec::new(),
            state: RunState::Pending,
            cancelled: false,
        }
    }

    /// Whether the run reached `Completed`.
    pub fn success(&self) -> bool {
        self.state == RunState::Completed
    }

    /// Process exit code for callers that surface the run to a shell:
    /// 0 on `Completed`, 1 otherwise.
    pub fn exit_code(&self) -> i32 {
        if self.success() {
            0
        } else {
            1
        }
    }

    /// The last fatal failure's rendered error, if any.
    pub fn failure_reason(&self) -> Option<&str> {
        self.results
            .iter()
            .rev()
            .find(|r| r.outcome == Outcome::FailedFatal)
            .and_then(|r| r.error.as_deref())
    }

    /// Render a human-readable summary: every stage's outcome in order,
    /// the final status and, on failure, which stages were rolled back.
    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "plan '{}' started {}", self.plan_name, self.started_at);
        for r in &self.results {
            let mark = match r.outcome {
                Outcome::Succeeded => "ok",
                Outcome::Skipped => "skip",
                Outcome::FailedFatal => "FAIL",
                Outcome::FailedNonFatal => "warn",
            };
            let _ = write!(out, "  [{mark:<4}] {:<24} {:?}", r.stage_id, r.elapsed);
            if let Some(err) = &r.error {
                let _ = write!(out, " - {err}");
            }
            let _ = writeln!(out);
        }
        let status = if self.success() {
            "completed"
        } else if self.cancelled {
            "failed (cancelled)"
        } else {
            "failed"
        };
        let _ = writeln!(out, "result: {status}");
        if !self.rolled_back.is_empty() {
            let _ = writeln!(out, "rolled back: {}", self.rolled_back.join(", "));
        }
        out
    }
}
