use std::sync::Arc;

use async_trait::async_trait;
use tokio::task::JoinSet;
use tracing::debug;

use crate::context::StepContext;
use crate::error::{ExecError, Result};
use crate::run_state::RunState;
use crate::step::Step;

/// Runs every child at once and succeeds if all of them do.
pub struct AggregateStep {
    steps: Vec<Arc<dyn Step>>,
}

impl AggregateStep {
    pub fn new(steps: Vec<Arc<dyn Step>>) -> Self {
        Self { steps }
    }
}

#[async_trait]
impl Step for AggregateStep {
    async fn run(&self, ctx: &StepContext, state: &RunState) -> Result<bool> {
        let mut set = JoinSet::new();
        for step in &self.steps {
            let step = Arc::clone(step);
            let ctx = ctx.clone();
            let state = state.clone();
            set.spawn(async move { step.run(&ctx, &state).await });
        }

        let mut succeeded = true;
        let mut errors = Vec::new();
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(Ok(ok)) => succeeded &= ok,
                Ok(Err(e)) => errors.push(e),
                Err(e) => errors.push(ExecError::from_join(e)),
            }
        }

        if let Some(err) = ExecError::combine(errors) {
            return Err(err);
        }

        debug!(steps = self.steps.len(), succeeded, "aggregate finished");
        Ok(succeeded)
    }

    fn succeeded(&self) -> bool {
        self.steps.iter().all(|step| step.succeeded())
    }
}
