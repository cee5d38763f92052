//! End-to-end orchestrator behavior: ordering, rollback, idempotent
//! re-runs and cancellation.

use async_trait::async_trait;
use provflow::{
    CancelToken, FnAction, FnProbe, Orchestrator, Outcome, Plan, Probe, RunState, Stage,
    StageAction, StageError,
};
use std::sync::{Arc, Mutex};

/// Action that logs its tag and optionally fails.
struct RecordingAction {
    tag: &'static str,
    log: Arc<Mutex<Vec<String>>>,
    fail: bool,
}

#[async_trait]
impl StageAction for RecordingAction {
    async fn run(&self) -> Result<String, StageError> {
        self.log.lock().unwrap().push(format!("run:{}", self.tag));
        if self.fail {
            Err(StageError::fatal(anyhow::anyhow!("{} broke", self.tag)))
        } else {
            Ok(format!("{} done", self.tag))
        }
    }
}

/// Probe with a fixed answer.
struct FixedProbe(bool);

#[async_trait]
impl Probe for FixedProbe {
    async fn evaluate(&self) -> Result<bool, StageError> {
        Ok(self.0)
    }
}

fn stage(
    id: &'static str,
    log: &Arc<Mutex<Vec<String>>>,
    fail: bool,
    compensated: bool,
) -> Stage {
    let builder = Stage::builder(
        id,
        RecordingAction {
            tag: id,
            log: log.clone(),
            fail,
        },
    );
    if compensated {
        builder
            .compensation(RecordingAction {
                tag: Box::leak(format!("undo-{id}").into_boxed_str()),
                log: log.clone(),
                fail: false,
            })
            .build()
    } else {
        builder.build()
    }
}

#[tokio::test]
async fn all_stages_succeed_in_declaration_order() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let plan = Plan::builder("happy")
        .stage(stage("one", &log, false, true))
        .stage(stage("two", &log, false, false))
        .stage(stage("three", &log, false, true))
        .build()
        .unwrap();

    let report = Orchestrator::new(plan).run().await;

    assert_eq!(report.state, RunState::Completed);
    assert!(report.success());
    assert_eq!(report.exit_code(), 0);
    assert!(report.rolled_back.is_empty());
    let ids: Vec<_> = report.results.iter().map(|r| r.stage_id).collect();
    assert_eq!(ids, vec!["one", "two", "three"]);
    assert!(report
        .results
        .iter()
        .all(|r| r.outcome == Outcome::Succeeded));
    assert_eq!(
        *log.lock().unwrap(),
        vec!["run:one", "run:two", "run:three"]
    );
}

#[tokio::test]
async fn fatal_failure_at_stage_three_rolls_back_compensated_predecessors() {
    // Spec scenario: 5 stages, stage 3 fatal. Stages 1-2 succeeded, only
    // those with compensations are undone, in reverse order; 4-5 never run.
    let log = Arc::new(Mutex::new(Vec::new()));
    let plan = Plan::builder("fatal-at-3")
        .stage(stage("s1", &log, false, true))
        .stage(stage("s2", &log, false, true))
        .stage(stage("s3", &log, true, false))
        .stage(stage("s4", &log, false, false))
        .stage(stage("s5", &log, false, true))
        .build()
        .unwrap();

    let report = Orchestrator::new(plan).run().await;

    assert_eq!(report.state, RunState::Failed);
    assert_eq!(report.exit_code(), 1);
    let ids: Vec<_> = report.results.iter().map(|r| r.stage_id).collect();
    assert_eq!(ids, vec!["s1", "s2", "s3"]);
    assert_eq!(report.results[0].outcome, Outcome::Succeeded);
    assert_eq!(report.results[1].outcome, Outcome::Succeeded);
    assert_eq!(report.results[2].outcome, Outcome::FailedFatal);
    assert_eq!(report.rolled_back, vec!["s2", "s1"]);
    assert_eq!(
        *log.lock().unwrap(),
        vec!["run:s1", "run:s2", "run:s3", "run:undo-s2", "run:undo-s1"]
    );
    assert!(report.failure_reason().unwrap().contains("s3 broke"));
}

#[tokio::test]
async fn best_effort_failure_never_halts_the_run() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let soft = Stage::builder(
        "soft",
        RecordingAction {
            tag: "soft",
            log: log.clone(),
            fail: true,
        },
    )
    .best_effort()
    .build();

    let plan = Plan::builder("degraded")
        .stage(stage("first", &log, false, false))
        .stage(soft)
        .stage(stage("last", &log, false, false))
        .build()
        .unwrap();

    let report = Orchestrator::new(plan).run().await;

    assert_eq!(report.state, RunState::Completed);
    assert_eq!(report.results[1].outcome, Outcome::FailedNonFatal);
    assert_eq!(report.results[2].outcome, Outcome::Succeeded);
    assert!(report.rolled_back.is_empty());
}

#[tokio::test]
async fn satisfied_checks_skip_every_stage_and_record_no_compensations() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let mk = |id: &'static str| {
        Stage::builder(
            id,
            RecordingAction {
                tag: id,
                log: log.clone(),
                fail: false,
            },
        )
        .check(FixedProbe(true))
        .compensation(RecordingAction {
            tag: "never",
            log: log.clone(),
            fail: false,
        })
        .build()
    };

    let plan = Plan::builder("rerun")
        .stage(mk("a"))
        .stage(mk("b"))
        .stage(mk("c"))
        .build()
        .unwrap();

    let report = Orchestrator::new(plan).run().await;

    assert_eq!(report.state, RunState::Completed);
    assert!(report.results.iter().all(|r| r.outcome == Outcome::Skipped));
    assert!(report.rolled_back.is_empty());
    // Nothing ran at all.
    assert!(log.lock().unwrap().is_empty());
}

#[tokio::test]
async fn failing_check_runs_the_stage_anyway() {
    let log = Arc::new(Mutex::new(Vec::new()));
    struct BrokenProbe;

    #[async_trait]
    impl Probe for BrokenProbe {
        async fn evaluate(&self) -> Result<bool, StageError> {
            Err(StageError::transient(anyhow::anyhow!("probe offline")))
        }
    }

    let st = Stage::builder(
        "guarded",
        RecordingAction {
            tag: "guarded",
            log: log.clone(),
            fail: false,
        },
    )
    .check(BrokenProbe)
    .build();

    let plan = Plan::builder("broken-check").stage(st).build().unwrap();
    let report = Orchestrator::new(plan).run().await;

    assert_eq!(report.results[0].outcome, Outcome::Succeeded);
    assert_eq!(*log.lock().unwrap(), vec!["run:guarded"]);
}

#[tokio::test]
async fn cancellation_between_stages_proceeds_directly_to_rollback() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let cancel = CancelToken::new();

    // First stage cancels the run; the remaining stages must not execute.
    struct CancellingAction {
        cancel: CancelToken,
        log: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl StageAction for CancellingAction {
        async fn run(&self) -> Result<String, StageError> {
            self.log.lock().unwrap().push("run:trigger".to_string());
            self.cancel.cancel();
            Ok(String::new())
        }
    }

    let trigger = Stage::builder(
        "trigger",
        CancellingAction {
            cancel: cancel.clone(),
            log: log.clone(),
        },
    )
    .compensation(RecordingAction {
        tag: "undo-trigger",
        log: log.clone(),
        fail: false,
    })
    .build();

    let plan = Plan::builder("cancelled")
        .stage(trigger)
        .stage(stage("never-reached", &log, false, false))
        .build()
        .unwrap();

    let report = Orchestrator::new(plan)
        .with_cancel_token(cancel)
        .run()
        .await;

    assert_eq!(report.state, RunState::Failed);
    assert!(report.cancelled);
    assert_eq!(report.results.len(), 1);
    assert_eq!(report.rolled_back, vec!["trigger"]);
    assert_eq!(
        *log.lock().unwrap(),
        vec!["run:trigger", "run:undo-trigger"]
    );
}

#[tokio::test]
async fn cancellation_during_final_stage_still_rolls_back() {
    // A cancel landing while the last stage is in flight has no further
    // loop iteration to observe it; the run must still fail and undo.
    let log = Arc::new(Mutex::new(Vec::new()));
    let cancel = CancelToken::new();

    struct CancellingSoftAction {
        cancel: CancelToken,
    }

    #[async_trait]
    impl StageAction for CancellingSoftAction {
        async fn run(&self) -> Result<String, StageError> {
            self.cancel.cancel();
            Err(StageError::non_fatal(anyhow::anyhow!("gave up waiting")))
        }
    }

    let last = Stage::builder("wait-api", CancellingSoftAction {
        cancel: cancel.clone(),
    })
    .best_effort()
    .build();

    let plan = Plan::builder("cancel-at-end")
        .stage(stage("prepare", &log, false, true))
        .stage(last)
        .build()
        .unwrap();

    let report = Orchestrator::new(plan)
        .with_cancel_token(cancel)
        .run()
        .await;

    assert_eq!(report.state, RunState::Failed);
    assert!(report.cancelled, "cancelled flag not set: {:?}", report.state);
    assert_eq!(report.results.len(), 2);
    assert_eq!(report.results[1].outcome, Outcome::FailedNonFatal);
    assert_eq!(report.rolled_back, vec!["prepare"]);
    assert_eq!(
        *log.lock().unwrap(),
        vec!["run:prepare", "run:undo-prepare"]
    );
}

#[tokio::test]
async fn cancellation_during_final_succeeding_stage_still_rolls_back() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let cancel = CancelToken::new();

    struct CancellingAction {
        cancel: CancelToken,
    }

    #[async_trait]
    impl StageAction for CancellingAction {
        async fn run(&self) -> Result<String, StageError> {
            self.cancel.cancel();
            Ok(String::new())
        }
    }

    let plan = Plan::builder("cancel-on-success")
        .stage(stage("prepare", &log, false, true))
        .stage(Stage::builder("finish", CancellingAction { cancel: cancel.clone() }).build())
        .build()
        .unwrap();

    let report = Orchestrator::new(plan)
        .with_cancel_token(cancel)
        .run()
        .await;

    assert_eq!(report.state, RunState::Failed);
    assert!(report.cancelled);
    assert_eq!(report.results[1].outcome, Outcome::Succeeded);
    assert_eq!(report.rolled_back, vec!["prepare"]);
}

#[tokio::test]
async fn cancelled_fatal_stage_marks_the_report_cancelled() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let cancel = CancelToken::new();

    // A fatal readiness wait that observes the cancel and gives up.
    struct CancellingFatalAction {
        cancel: CancelToken,
    }

    #[async_trait]
    impl StageAction for CancellingFatalAction {
        async fn run(&self) -> Result<String, StageError> {
            self.cancel.cancel();
            Err(StageError::fatal(anyhow::anyhow!("cancelled mid-wait")))
        }
    }

    let plan = Plan::builder("cancelled-fatal")
        .stage(stage("prepare", &log, false, true))
        .stage(Stage::builder("wait-daemon", CancellingFatalAction { cancel: cancel.clone() }).build())
        .build()
        .unwrap();

    let report = Orchestrator::new(plan)
        .with_cancel_token(cancel)
        .run()
        .await;

    assert_eq!(report.state, RunState::Failed);
    assert!(report.cancelled);
    assert_eq!(report.results[1].outcome, Outcome::FailedFatal);
    assert_eq!(report.rolled_back, vec!["prepare"]);
}

#[tokio::test]
async fn hung_idempotency_check_is_bounded_by_the_stage_timeout() {
    let log = Arc::new(Mutex::new(Vec::new()));

    struct HungProbe;

    #[async_trait]
    impl Probe for HungProbe {
        async fn evaluate(&self) -> Result<bool, StageError> {
            tokio::time::sleep(std::time::Duration::from_secs(60)).await;
            Ok(true)
        }
    }

    let guarded = Stage::builder(
        "guarded",
        RecordingAction {
            tag: "guarded",
            log: log.clone(),
            fail: false,
        },
    )
    .check(HungProbe)
    .timeout(std::time::Duration::from_millis(50))
    .build();

    let plan = Plan::builder("hung-check").stage(guarded).build().unwrap();

    let started = std::time::Instant::now();
    let report = Orchestrator::new(plan).run().await;

    // The wedged check gives way to the action instead of stalling the run.
    assert!(started.elapsed() < std::time::Duration::from_secs(10));
    assert_eq!(report.state, RunState::Completed);
    assert_eq!(report.results[0].outcome, Outcome::Succeeded);
    assert_eq!(*log.lock().unwrap(), vec!["run:guarded"]);
}

#[tokio::test]
async fn closure_actions_and_probes_compose_into_stages() {
    let log = Arc::new(Mutex::new(Vec::new()));

    let action_log = log.clone();
    let action = FnAction::new(move || {
        let log = action_log.clone();
        async move {
            log.lock().unwrap().push("ran".to_string());
            Ok::<String, StageError>("done".to_string())
        }
    });

    let st = Stage::builder("closurized", action)
        .check(FnProbe(|| async { Ok::<bool, StageError>(false) }))
        .build();

    let plan = Plan::builder("closures").stage(st).build().unwrap();
    let report = Orchestrator::new(plan).run().await;

    assert_eq!(report.state, RunState::Completed);
    assert_eq!(report.results[0].outcome, Outcome::Succeeded);
    assert_eq!(report.results[0].output, "done");
    assert_eq!(*log.lock().unwrap(), vec!["ran"]);
}

#[tokio::test]
async fn stage_timeout_is_classified_by_severity() {
    let log = Arc::new(Mutex::new(Vec::new()));
    struct SlowAction;

    #[async_trait]
    impl StageAction for SlowAction {
        async fn run(&self) -> Result<String, StageError> {
            tokio::time::sleep(std::time::Duration::from_secs(60)).await;
            Ok(String::new())
        }
    }

    let slow = Stage::builder("slow", SlowAction)
        .timeout(std::time::Duration::from_millis(50))
        .build();

    let plan = Plan::builder("timeouts")
        .stage(stage("setup", &log, false, true))
        .stage(slow)
        .build()
        .unwrap();

    let report = Orchestrator::new(plan).run().await;

    assert_eq!(report.state, RunState::Failed);
    assert_eq!(report.results[1].outcome, Outcome::FailedFatal);
    assert!(report.results[1].error.as_deref().unwrap().contains("timed out"));
    assert_eq!(report.rolled_back, vec!["setup"]);
}
