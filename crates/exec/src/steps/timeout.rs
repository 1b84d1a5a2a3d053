use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::context::StepContext;
use crate::error::Result;
use crate::run_state::RunState;
use crate::step::Step;

async fn run_with_deadline(
    step: &dyn Step,
    duration: Duration,
    ctx: &StepContext,
    state: &RunState,
) -> Result<bool> {
    let timeout_ctx = ctx.with_timeout(duration);
    let result = step.run(&timeout_ctx, state).await;
    timeout_ctx.cancel();
    result
}

/// Fails `step` without an error once `duration` has passed.
pub struct TimeoutStep {
    step: Arc<dyn Step>,
    duration: Duration,
    timed_out: AtomicBool,
}

impl TimeoutStep {
    pub fn new(step: Arc<dyn Step>, duration: Duration) -> Self {
        Self {
            step,
            duration,
            timed_out: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl Step for TimeoutStep {
    async fn run(&self, ctx: &StepContext, state: &RunState) -> Result<bool> {
        self.timed_out.store(false, Ordering::SeqCst);
        match run_with_deadline(self.step.as_ref(), self.duration, ctx, state).await {
            Err(err) if err.is_deadline_exceeded() && ctx.err().is_none() => {
                warn!(duration = ?self.duration, "step timed out");
                self.timed_out.store(true, Ordering::SeqCst);
                Ok(false)
            }
            other => other,
        }
    }

    fn succeeded(&self) -> bool {
        !self.timed_out.load(Ordering::SeqCst) && self.step.succeeded()
    }

    fn register_on_failure(&self, hook: Arc<dyn Step>) {
        self.step.register_on_failure(hook);
    }
}

/// Interrupts `step` with a deadline error once `duration` has passed.
pub struct InterruptStep {
    step: Arc<dyn Step>,
    duration: Duration,
}

impl InterruptStep {
    pub fn new(step: Arc<dyn Step>, duration: Duration) -> Self {
        Self { step, duration }
    }
}

#[async_trait]
impl Step for InterruptStep {
    async fn run(&self, ctx: &StepContext, state: &RunState) -> Result<bool> {
        let result = run_with_deadline(self.step.as_ref(), self.duration, ctx, state).await;
        if matches!(&result, Err(err) if err.is_deadline_exceeded()) {
            debug!(duration = ?self.duration, "step interrupted");
        }
        result
    }

    fn succeeded(&self) -> bool {
        self.step.succeeded()
    }

    fn register_on_failure(&self, hook: Arc<dyn Step>) {
        self.step.register_on_failure(hook);
    }
}
