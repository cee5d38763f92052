//! Plan construction and validation.

use std::collections::HashSet;

use thiserror::Error;

use crate::stage::Stage;

/// Error raised while building a plan.
#[derive(Error, Debug)]
pub enum PlanError {
    /// Two stages declared the same identifier.
    #[error("duplicate stage id '{0}'")]
    DuplicateStageId(&'static str),

    /// A plan must contain at least one stage.
    #[error("plan '{0}' has no stages")]
    Empty(String),

    /// Compensations are only meaningful on stages with observable side
    /// effects.
    #[error("stage '{0}' attaches a compensation to a side-effect-free action")]
    CompensationWithoutEffect(&'static str),
}

/// An ordered, validated sequence of stages. Stage order is fixed at
/// construction and executed strictly sequentially.
#[derive(Debug, Clone)]
pub struct Plan {
    name: String,
    stages: Vec<Stage>,
}

impl Plan {
    /// Start building a plan with the given name.
    pub fn builder(name: &str) -> PlanBuilder {
        PlanBuilder {
            name: name.to_string(),
            stages: Vec::new(),
        }
    }

    /// The plan name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Stages in declaration order.
    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    /// Number of stages.
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    /// Whether the plan has no stages. Never true for a built plan.
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }
}

/// Builder for a [`Plan`]. Validates at `build` time.
pub struct PlanBuilder {
    name: String,
    stages: Vec<Stage>,
}

impl PlanBuilder {
    /// Append a stage. Declaration order is execution order.
    pub fn stage(mut self, stage: Stage) -> Self {
        self.stages.push(stage);
        self
    }

    /// Validate and build the plan.
    pub fn build(self) -> Result<Plan, PlanError> {
        if self.stages.is_empty() {
            return Err(PlanError::Empty(self.name));
        }

        let mut seen = HashSet::new();
        for stage in &self.stages {
            if !seen.insert(stage.id) {
                return Err(PlanError::DuplicateStageId(stage.id));
            }
            if stage.compensation.is_some() && !stage.action.has_side_effects() {
                return Err(PlanError::CompensationWithoutEffect(stage.id));
            }
        }

        Ok(Plan {
            name: self.name,
            stages: self.stages,
        })
    }
}
