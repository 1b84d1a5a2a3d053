//! Wrappers that report leaf errors to the build log.

use std::sync::Arc;

use async_trait::async_trait;
use regex::Regex;
use tracing::{info, warn};

use crate::context::StepContext;
use crate::error::{ExecError, Result};
use crate::run_state::RunState;
use crate::step::{BuildStepDelegateFactory, Step};

/// Error text matched by [`PatternRetryPolicy::default`].
pub const DEFAULT_RETRIABLE_PATTERNS: &[&str] = &["worker .+ disappeared"];

/// Decides which errors make a build worth re-running.
pub trait RetryPolicy: Send + Sync {
    fn is_retriable(&self, err: &ExecError) -> bool;
}

/// Matches the error message against a set of regular expressions.
#[derive(Debug, Clone)]
pub struct PatternRetryPolicy {
    patterns: Vec<Regex>,
}

impl PatternRetryPolicy {
    pub fn new<I, S>(patterns: I) -> std::result::Result<Self, regex::Error>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let patterns = patterns
            .into_iter()
            .map(|p| Regex::new(p.as_ref()))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(Self { patterns })
    }
}

impl Default for PatternRetryPolicy {
    fn default() -> Self {
        Self {
            patterns: DEFAULT_RETRIABLE_PATTERNS
                .iter()
                .filter_map(|p| Regex::new(p).ok())
                .collect(),
        }
    }
}

impl RetryPolicy for PatternRetryPolicy {
    fn is_retriable(&self, err: &ExecError) -> bool {
        if err.is_canceled() || err.is_deadline_exceeded() || err.is_retriable() {
            return false;
        }
        let message = err.to_string();
        self.patterns.iter().any(|p| p.is_match(&message))
    }
}

/// Reports any error of `step` through its delegate before returning it.
pub struct LogErrorStep {
    step: Arc<dyn Step>,
    delegate_factory: Arc<dyn BuildStepDelegateFactory>,
}

impl LogErrorStep {
    pub fn new(step: Arc<dyn Step>, delegate_factory: Arc<dyn BuildStepDelegateFactory>) -> Self {
        Self {
            step,
            delegate_factory,
        }
    }
}

#[async_trait]
impl Step for LogErrorStep {
    async fn run(&self, ctx: &StepContext, state: &RunState) -> Result<bool> {
        let err = match self.step.run(ctx, state).await {
            Ok(ok) => return Ok(ok),
            Err(err) => err,
        };

        let message = match &err {
            ExecError::Canceled => "interrupted".to_string(),
            ExecError::DeadlineExceeded => "timeout exceeded".to_string(),
            other => other.to_string(),
        };
        info!(error = %err, "step errored");

        self.delegate_factory
            .build_step_delegate(state)
            .errored(&message);

        Err(err)
    }

    fn succeeded(&self) -> bool {
        self.step.succeeded()
    }

    fn register_on_failure(&self, hook: Arc<dyn Step>) {
        self.step.register_on_failure(hook);
    }
}

/// Turns errors accepted by a [`RetryPolicy`] into [`ExecError::Retriable`].
pub struct RetryErrorStep {
    step: Arc<dyn Step>,
    delegate_factory: Arc<dyn BuildStepDelegateFactory>,
    policy: Arc<dyn RetryPolicy>,
}

impl RetryErrorStep {
    pub fn new(
        step: Arc<dyn Step>,
        delegate_factory: Arc<dyn BuildStepDelegateFactory>,
        policy: Arc<dyn RetryPolicy>,
    ) -> Self {
        Self {
            step,
            delegate_factory,
            policy,
        }
    }
}

#[async_trait]
impl Step for RetryErrorStep {
    async fn run(&self, ctx: &StepContext, state: &RunState) -> Result<bool> {
        match self.step.run(ctx, state).await {
            Err(err) if self.policy.is_retriable(&err) => {
                warn!(error = %err, "retriable error");
                self.delegate_factory
                    .build_step_delegate(state)
                    .errored(&format!("{}, will retry...", err));
                Err(ExecError::Retriable(Box::new(err)))
            }
            other => other,
        }
    }

    fn succeeded(&self) -> bool {
        self.step.succeeded()
    }

    fn register_on_failure(&self, hook: Arc<dyn Step>) {
        self.step.register_on_failure(hook);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeDelegateFactory, FakeStep};

    fn delegates() -> (Arc<FakeDelegateFactory>, Arc<dyn BuildStepDelegateFactory>) {
        let factory = Arc::new(FakeDelegateFactory::default());
        let dyn_factory: Arc<dyn BuildStepDelegateFactory> = factory.clone();
        (factory, dyn_factory)
    }

    #[tokio::test]
    async fn test_log_error_reports_message() {
        let (factory, dyn_factory) = delegates();
        let step = LogErrorStep::new(FakeStep::error("disk full"), dyn_factory);

        let err = step
            .run(&StepContext::background(), &RunState::default())
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "disk full");
        assert_eq!(factory.delegate.errors(), vec!["disk full".to_string()]);
    }

    #[tokio::test]
    async fn test_log_error_names_interruptions() {
        let (factory, dyn_factory) = delegates();
        let ctx = StepContext::background();
        ctx.cancel();

        let step = LogErrorStep::new(FakeStep::blocks(), dyn_factory);
        assert!(step.run(&ctx, &RunState::default()).await.is_err());
        assert_eq!(factory.delegate.errors(), vec!["interrupted".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_log_error_names_timeouts() {
        let (factory, dyn_factory) = delegates();
        let ctx = StepContext::background().with_timeout(std::time::Duration::from_millis(1));

        let step = LogErrorStep::new(FakeStep::blocks(), dyn_factory);
        assert!(step.run(&ctx, &RunState::default()).await.is_err());
        assert_eq!(
            factory.delegate.errors(),
            vec!["timeout exceeded".to_string()]
        );
    }

    #[tokio::test]
    async fn test_log_error_is_silent_on_success_and_failure() {
        let (factory, dyn_factory) = delegates();
        let step = LogErrorStep::new(FakeStep::fail(), dyn_factory);
        assert!(!step
            .run(&StepContext::background(), &RunState::default())
            .await
            .unwrap());
        assert!(factory.delegate.errors().is_empty());
    }

    #[tokio::test]
    async fn test_retry_error_wraps_matching_errors() {
        let (factory, dyn_factory) = delegates();
        let step = RetryErrorStep::new(
            FakeStep::error("worker w1 disappeared"),
            dyn_factory,
            Arc::new(PatternRetryPolicy::default()),
        );

        let err = step
            .run(&StepContext::background(), &RunState::default())
            .await
            .unwrap_err();
        assert!(err.is_retriable());
        assert_eq!(
            factory.delegate.errors(),
            vec!["worker w1 disappeared, will retry...".to_string()]
        );
    }

    #[tokio::test]
    async fn test_retry_error_passes_other_errors() {
        let (factory, dyn_factory) = delegates();
        let step = RetryErrorStep::new(
            FakeStep::error("disk full"),
            dyn_factory,
            Arc::new(PatternRetryPolicy::default()),
        );

        let err = step
            .run(&StepContext::background(), &RunState::default())
            .await
            .unwrap_err();
        assert!(!err.is_retriable());
        assert!(factory.delegate.errors().is_empty());
    }

    #[tokio::test]
    async fn test_leaf_error_is_logged_before_retry_notice() {
        let (factory, dyn_factory) = delegates();
        let logged = Arc::new(LogErrorStep::new(
            FakeStep::error("worker w1 disappeared"),
            Arc::clone(&dyn_factory),
        ));
        let step = RetryErrorStep::new(logged, dyn_factory, Arc::new(PatternRetryPolicy::default()));

        let err = step
            .run(&StepContext::background(), &RunState::default())
            .await
            .unwrap_err();
        assert!(err.is_retriable());
        assert_eq!(
            factory.delegate.errors(),
            vec![
                "worker w1 disappeared".to_string(),
                "worker w1 disappeared, will retry...".to_string(),
            ]
        );
    }

    #[test]
    fn test_pattern_policy() {
        let policy = PatternRetryPolicy::new(["connection reset", "^no workers"]).unwrap();
        let err = |m: &str| ExecError::Other(anyhow::anyhow!(m.to_string()));

        assert!(policy.is_retriable(&err("read: connection reset by peer")));
        assert!(policy.is_retriable(&err("no workers satisfying tags")));
        assert!(!policy.is_retriable(&err("there are no workers")));
        assert!(!policy.is_retriable(&ExecError::Canceled));

        assert!(PatternRetryPolicy::new(["("]).is_err());
    }
}
