//! Reverse-order compensation of succeeded stages.

use std::sync::Arc;

use tracing::{info, warn};

use crate::stage::StageAction;

/// Tracks reversible actions in execution order and undoes them in
/// reverse after a fatal failure. Only the orchestrator triggers
/// rollback.
#[derive(Default)]
pub struct RollbackManager {
    recorded: Vec<(&'static str, Arc<dyn StageAction>)>,
}

impl RollbackManager {
    /// Create an empty manager.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a succeeded stage's compensation. Skipped stages are never
    /// recorded.
    pub fn record(&mut self, stage_id: &'static str, compensation: Arc<dyn StageAction>) {
        self.recorded.push((stage_id, compensation));
    }

    /// Number of recorded compensations.
    pub fn len(&self) -> usize {
        self.recorded.len()
    }

    /// Whether nothing has been recorded.
    pub fn is_empty(&self) -> bool {
        self.recorded.is_empty()
    }

    /// Run every recorded compensation in reverse order. Compensation
    /// errors are logged and swallowed so the remaining compensations
    /// always get their chance. Returns the stage ids attempted, in
    /// rollback order.
    pub async fn rollback_all(&mut self) -> Vec<&'static str> {
        let mut attempted = Vec::with_capacity(self.recorded.len());

        for (stage_id, compensation) in self.recorded.drain(..).rev() {
            info!(stage = stage_id, "rolling back");
            match compensation.run().await {
                Ok(_) => info!(stage = stage_id, "rollback complete"),
                Err(e) => warn!(stage = stage_id, error = %e, "rollback failed, continuing"),
            }
            attempted.push(stage_id);
        }

        attempted
    }
}
