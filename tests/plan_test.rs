//! Plan construction-time validation.

use async_trait::async_trait;
use provflow::{Plan, PlanError, Stage, StageAction, StageError};

struct NoopAction;

#[async_trait]
impl StageAction for NoopAction {
    async fn run(&self) -> Result<String, StageError> {
        Ok(String::new())
    }
}

/// Pure observation - declares no side effects.
struct ObservingAction;

#[async_trait]
impl StageAction for ObservingAction {
    async fn run(&self) -> Result<String, StageError> {
        Ok(String::new())
    }

    fn has_side_effects(&self) -> bool {
        false
    }
}

#[test]
fn preserves_declaration_order() {
    let plan = Plan::builder("ordered")
        .stage(Stage::builder("alpha", NoopAction).build())
        .stage(Stage::builder("beta", NoopAction).build())
        .stage(Stage::builder("gamma", NoopAction).build())
        .build()
        .unwrap();

    let ids: Vec<_> = plan.stages().iter().map(|s| s.id()).collect();
    assert_eq!(ids, vec!["alpha", "beta", "gamma"]);
    assert_eq!(plan.len(), 3);
}

#[test]
fn rejects_duplicate_stage_ids() {
    let err = Plan::builder("dupes")
        .stage(Stage::builder("setup", NoopAction).build())
        .stage(Stage::builder("setup", NoopAction).build())
        .build()
        .unwrap_err();

    assert!(matches!(err, PlanError::DuplicateStageId("setup")));
}

#[test]
fn rejects_empty_plans() {
    let err = Plan::builder("nothing").build().unwrap_err();
    assert!(matches!(err, PlanError::Empty(_)));
}

#[test]
fn rejects_compensation_on_side_effect_free_action() {
    let err = Plan::builder("watcher")
        .stage(
            Stage::builder("observe", ObservingAction)
                .compensation(NoopAction)
                .build(),
        )
        .build()
        .unwrap_err();

    assert!(matches!(err, PlanError::CompensationWithoutEffect("observe")));
}

#[test]
fn compensation_on_side_effecting_action_is_fine() {
    let plan = Plan::builder("worker")
        .stage(
            Stage::builder("mutate", NoopAction)
                .compensation(NoopAction)
                .build(),
        )
        .build()
        .unwrap();

    assert!(plan.stages()[0].has_compensation());
}
