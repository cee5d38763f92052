//! Adapter exposing a readiness poll as a stage action.

use std::sync::Arc;

use anyhow::anyhow;
use async_trait::async_trait;

use crate::poll::{CancelToken, PollSpec, ReadinessPoller};
use crate::stage::{Probe, StageAction, StageError};

/// Waits for an external condition via [`ReadinessPoller`]. Exhaustion is
/// an error whose weight the owning stage's severity decides; the action
/// itself mutates nothing.
pub struct AwaitReadyAction {
    probe: Arc<dyn Probe>,
    spec: PollSpec,
    cancel: CancelToken,
}

impl AwaitReadyAction {
    pub fn new(probe: impl Probe + 'static, spec: PollSpec, cancel: CancelToken) -> Self {
        Self {
            probe: Arc::new(probe),
            spec,
            cancel,
        }
    }
}

#[async_trait]
impl StageAction for AwaitReadyAction {
    async fn run(&self) -> Result<String, StageError> {
        let outcome = ReadinessPoller::poll(self.probe.as_ref(), &self.spec, &self.cancel).await;
        if outcome.ready {
            Ok(format!("ready after {} attempt(s)", outcome.attempts))
        } else if self.cancel.is_cancelled() {
            Err(StageError::non_fatal(anyhow!(
                "cancelled after {} attempt(s)",
                outcome.attempts
            )))
        } else {
            Err(StageError::non_fatal(anyhow!(
                "not ready after {} attempt(s)",
                outcome.attempts
            )))
        }
    }

    fn has_side_effects(&self) -> bool {
        false
    }
}
