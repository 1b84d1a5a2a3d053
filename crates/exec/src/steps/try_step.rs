use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use crate::context::StepContext;
use crate::error::Result;
use crate::run_state::RunState;
use crate::step::Step;

/// Runs `step` and succeeds regardless of how it ended, unless the build
/// itself was canceled.
pub struct TryStep {
    step: Arc<dyn Step>,
}

impl TryStep {
    pub fn new(step: Arc<dyn Step>) -> Self {
        Self { step }
    }
}

#[async_trait]
impl Step for TryStep {
    async fn run(&self, ctx: &StepContext, state: &RunState) -> Result<bool> {
        match self.step.run(ctx, state).await {
            Err(err) if err.is_canceled() => Err(err),
            Err(err) => {
                warn!(error = %err, "ignoring error in try step");
                Ok(true)
            }
            Ok(_) => Ok(true),
        }
    }

    fn succeeded(&self) -> bool {
        true
    }

    fn register_on_failure(&self, hook: Arc<dyn Step>) {
        self.step.register_on_failure(hook);
    }
}
