use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::debug;

use crate::context::StepContext;
use crate::error::{ExecError, Result};
use crate::run_state::RunState;
use crate::step::Step;

/// Runs children concurrently, at most `limit` at a time.
///
/// With `fail_fast`, the first child that fails or errors stops further
/// children from being started and cancels the ones still running.
pub struct InParallelStep {
    steps: Vec<Arc<dyn Step>>,
    limit: usize,
    fail_fast: bool,
}

impl InParallelStep {
    /// A `limit` below 1 runs every child at once.
    pub fn new(steps: Vec<Arc<dyn Step>>, limit: usize, fail_fast: bool) -> Self {
        let limit = if limit < 1 { steps.len().max(1) } else { limit };
        Self {
            steps,
            limit,
            fail_fast,
        }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }
}

#[async_trait]
impl Step for InParallelStep {
    async fn run(&self, ctx: &StepContext, state: &RunState) -> Result<bool> {
        let run_ctx = ctx.child();
        let semaphore = Arc::new(Semaphore::new(self.limit));
        let mut set = JoinSet::new();

        for step in &self.steps {
            let Ok(permit) = Arc::clone(&semaphore).acquire_owned().await else {
                break;
            };
            if run_ctx.is_cancelled() {
                debug!("in_parallel stopped launching steps");
                break;
            }

            let step = Arc::clone(step);
            let step_ctx = run_ctx.clone();
            let state = state.clone();
            let fail_fast = self.fail_fast;
            set.spawn(async move {
                let result = step.run(&step_ctx, &state).await;
                if fail_fast && !matches!(result, Ok(true)) {
                    step_ctx.cancel();
                }
                drop(permit);
                result
            });
        }

        let mut errors = Vec::new();
        while let Some(joined) = set.join_next().await {
            let result = joined.unwrap_or_else(|e| Err(ExecError::from_join(e)));
            if let Err(err) = result {
                if self.fail_fast && !run_ctx.is_cancelled() {
                    run_ctx.cancel();
                }
                if !err.is_canceled() {
                    errors.push(err);
                }
            }
        }
        run_ctx.cancel();

        if let Some(err) = ctx.err() {
            return Err(err);
        }
        if let Some(err) = ExecError::combine(errors) {
            return Err(err);
        }

        Ok(self.succeeded())
    }

    fn succeeded(&self) -> bool {
        self.steps.iter().all(|step| step.succeeded())
    }
}
