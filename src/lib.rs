//! # Provflow
//!
//! The embeddable provisioning engine.
//!
//! Declarative, idempotent, multi-stage deployment orchestration with
//! readiness checks and compensating rollback. A library, not a service:
//! a run happens in your process and produces one report.
//!
//! ## Why Provflow?
//!
//! - **Declarative plans** - stages with idempotency checks and undo
//!   actions, validated before anything runs
//! - **Skip what's done** - a satisfied check marks the stage skipped,
//!   never re-executed, never rolled back
//! - **Bounded waiting** - one poll primitive for "daemon is up" and
//!   "endpoint answers", with attempt, deadline and cancellation bounds
//! - **Rollback on fatal failure** - succeeded stages are compensated in
//!   reverse order, best-effort all the way down
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use provflow::{Orchestrator, Plan, Stage, ProcessAction, ProcessProbe};
//!
//! let plan = Plan::builder("bootstrap")
//!     .stage(
//!         Stage::builder("install", ProcessAction::new("sh", &["-c", "apt-get install -y jq"]))
//!             .check(ProcessProbe::new("jq", &["--version"]))
//!             .build(),
//!     )
//!     .build()?;
//!
//! let report = Orchestrator::new(plan).run().await;
//! std::process::exit(report.exit_code());
//! ```
//!
//! ## Readiness polling
//!
//! Wrap any [`Probe`] in an [`AwaitReadyAction`] to make "wait until X"
//! a stage. The stage's severity decides whether poll exhaustion aborts
//! the run or merely logs a degraded outcome.
//!
//! ## Shipped plans
//!
//! [`plans::wireguard`] compiles a WireGuard REST API host deployment
//! into a plan: Docker install, daemon readiness, container start,
//! API readiness, first-client provisioning.

pub mod actions;
pub mod config;
pub mod executor;
pub mod orchestrator;
pub mod plan;
pub mod plans;
pub mod poll;
pub mod report;
pub mod rollback;
pub mod stage;

pub use actions::{
    AwaitReadyAction, CreateClientAction, DirExistsProbe, EnsureDirAction, HttpProbe,
    ProcessAction, ProcessProbe, RemoveDirAction,
};
pub use config::{ConfigError, DeployConfig, Ports};
pub use executor::StageExecutor;
pub use orchestrator::Orchestrator;
pub use plan::{Plan, PlanBuilder, PlanError};
pub use plans::{deployment_plan, DeployError};
pub use poll::{CancelToken, PollOutcome, PollSpec, ReadinessPoller};
pub use report::{ExecutionResult, Outcome, RunReport, RunState};
pub use rollback::RollbackManager;
pub use stage::{FnAction, FnProbe, Probe, Severity, Stage, StageAction, StageBuilder, StageError};
