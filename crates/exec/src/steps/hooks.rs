//! Steps that run a hook depending on how another step ended.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::context::StepContext;
use crate::error::{ExecError, Result};
use crate::run_state::RunState;
use crate::step::{IdentityStep, Step};

/// Runs `hook` only when `step` succeeds.
pub struct OnSuccessStep {
    step: Arc<dyn Step>,
    hook: Arc<dyn Step>,
}

impl OnSuccessStep {
    pub fn new(step: Arc<dyn Step>, hook: Arc<dyn Step>) -> Self {
        Self { step, hook }
    }

    /// Chain `steps` so each runs only if the previous one succeeded.
    pub fn sequence(steps: Vec<Arc<dyn Step>>) -> Arc<dyn Step> {
        steps
            .into_iter()
            .rev()
            .fold(Arc::new(IdentityStep) as Arc<dyn Step>, |next, step| {
                Arc::new(OnSuccessStep::new(step, next)) as Arc<dyn Step>
            })
    }
}

#[async_trait]
impl Step for OnSuccessStep {
    async fn run(&self, ctx: &StepContext, state: &RunState) -> Result<bool> {
        if !self.step.run(ctx, state).await? {
            return Ok(false);
        }
        self.hook.run(ctx, state).await
    }

    fn succeeded(&self) -> bool {
        self.step.succeeded() && self.hook.succeeded()
    }
}

/// Runs `hook` when `step` completes without succeeding.
pub struct OnFailureStep {
    step: Arc<dyn Step>,
    hook: Arc<dyn Step>,
}

impl OnFailureStep {
    /// The hook is also registered on `step`, so leaves that support it can
    /// run it themselves.
    pub fn new(step: Arc<dyn Step>, hook: Arc<dyn Step>) -> Self {
        step.register_on_failure(Arc::clone(&hook));
        Self { step, hook }
    }
}

#[async_trait]
impl Step for OnFailureStep {
    async fn run(&self, ctx: &StepContext, state: &RunState) -> Result<bool> {
        let ok = self.step.run(ctx, state).await?;
        if !ok {
            debug!("running on_failure hook");
            self.hook.run(ctx, state).await?;
        }
        Ok(ok)
    }

    fn succeeded(&self) -> bool {
        self.step.succeeded()
    }

    fn register_on_failure(&self, hook: Arc<dyn Step>) {
        self.step.register_on_failure(hook);
    }
}

/// Runs `hook` when `step` errors for any reason other than cancellation.
pub struct OnErrorStep {
    step: Arc<dyn Step>,
    hook: Arc<dyn Step>,
}

impl OnErrorStep {
    pub fn new(step: Arc<dyn Step>, hook: Arc<dyn Step>) -> Self {
        Self { step, hook }
    }
}

#[async_trait]
impl Step for OnErrorStep {
    async fn run(&self, ctx: &StepContext, state: &RunState) -> Result<bool> {
        let err = match self.step.run(ctx, state).await {
            Ok(ok) => return Ok(ok),
            Err(err) if err.is_canceled() => return Err(err),
            Err(err) => err,
        };

        debug!(error = %err, "running on_error hook");
        match self.hook.run(ctx, state).await {
            Ok(_) => Err(err),
            Err(hook_err) => Err(ExecError::Multiple(vec![err, hook_err])),
        }
    }

    fn succeeded(&self) -> bool {
        self.step.succeeded()
    }

    fn register_on_failure(&self, hook: Arc<dyn Step>) {
        self.step.register_on_failure(hook);
    }
}

/// Runs `hook` when `step` is interrupted.
///
/// The hook runs under a fresh context, since the one given has already
/// been canceled.
pub struct OnAbortStep {
    step: Arc<dyn Step>,
    hook: Arc<dyn Step>,
}

impl OnAbortStep {
    pub fn new(step: Arc<dyn Step>, hook: Arc<dyn Step>) -> Self {
        Self { step, hook }
    }
}

#[async_trait]
impl Step for OnAbortStep {
    async fn run(&self, ctx: &StepContext, state: &RunState) -> Result<bool> {
        let err = match self.step.run(ctx, state).await {
            Err(err) if err.is_canceled() => err,
            other => return other,
        };

        debug!("running on_abort hook");
        match self.hook.run(&StepContext::background(), state).await {
            Ok(_) => Err(err),
            Err(hook_err) => Err(ExecError::Multiple(vec![err, hook_err])),
        }
    }

    fn succeeded(&self) -> bool {
        self.step.succeeded()
    }

    fn register_on_failure(&self, hook: Arc<dyn Step>) {
        self.step.register_on_failure(hook);
    }
}

/// Always runs `hook` after `step`, even when the build is interrupted.
pub struct EnsureStep {
    step: Arc<dyn Step>,
    hook: Arc<dyn Step>,
    hook_timeout: Option<Duration>,
}

impl EnsureStep {
    pub fn new(step: Arc<dyn Step>, hook: Arc<dyn Step>) -> Self {
        Self {
            step,
            hook,
            hook_timeout: None,
        }
    }

    /// Bound how long the hook may run once the build has been canceled.
    pub fn with_hook_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.hook_timeout = timeout;
        self
    }
}

#[async_trait]
impl Step for EnsureStep {
    async fn run(&self, ctx: &StepContext, state: &RunState) -> Result<bool> {
        let result = self.step.run(ctx, state).await;

        let canceled = ctx.err();
        let hook_ctx = match (&canceled, self.hook_timeout) {
            (None, _) => ctx.clone(),
            (Some(_), None) => StepContext::background(),
            (Some(_), Some(timeout)) => StepContext::background().with_timeout(timeout),
        };
        if canceled.is_some() {
            debug!("running ensure hook after cancellation");
        }

        let hook_result = self.hook.run(&hook_ctx, state).await;
        if canceled.is_some() {
            hook_ctx.cancel();
        }

        let mut errors = Vec::new();
        let mut ok = true;
        match result {
            Ok(step_ok) => {
                ok &= step_ok;
                if let Some(err) = canceled {
                    errors.push(err);
                }
            }
            Err(err) => errors.push(err),
        }
        match hook_result {
            Ok(hook_ok) => ok &= hook_ok,
            Err(err) => errors.push(err),
        }

        match ExecError::combine(errors) {
            Some(err) => Err(err),
            None => Ok(ok),
        }
    }

    fn succeeded(&self) -> bool {
        self.step.succeeded() && self.hook.succeeded()
    }

    fn register_on_failure(&self, hook: Arc<dyn Step>) {
        self.step.register_on_failure(hook);
    }
}
