use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::context::StepContext;
use crate::error::Result;
use crate::run_state::RunState;
use crate::step::Step;

/// Runs attempts in order until one succeeds without error.
pub struct RetryStep {
    attempts: Vec<Arc<dyn Step>>,
    last_attempt: AtomicUsize,
}

impl RetryStep {
    pub fn new(attempts: Vec<Arc<dyn Step>>) -> Self {
        Self {
            attempts,
            last_attempt: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl Step for RetryStep {
    async fn run(&self, ctx: &StepContext, state: &RunState) -> Result<bool> {
        let mut result = Ok(false);

        for (idx, attempt) in self.attempts.iter().enumerate() {
            self.last_attempt.store(idx, Ordering::SeqCst);
            result = attempt.run(ctx, state).await;

            if let Some(err) = ctx.err() {
                return Err(err);
            }

            match &result {
                Ok(true) => break,
                Ok(false) => debug!(attempt = idx + 1, "attempt failed"),
                Err(err) => debug!(attempt = idx + 1, error = %err, "attempt errored"),
            }
        }

        result
    }

    fn succeeded(&self) -> bool {
        self.attempts
            .get(self.last_attempt.load(Ordering::SeqCst))
            .map(|attempt| attempt.succeeded())
            .unwrap_or(false)
    }

    fn register_on_failure(&self, hook: Arc<dyn Step>) {
        if let Some(last) = self.attempts.last() {
            last.register_on_failure(hook);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ExecError;
    use crate::testing::FakeStep;

    #[tokio::test]
    async fn test_first_success_wins() {
        let a = FakeStep::fail();
        let b = FakeStep::succeed();
        let c = FakeStep::succeed();
        let step = RetryStep::new(vec![a.clone(), b.clone(), c.clone()]);

        let ok = step
            .run(&StepContext::background(), &RunState::default())
            .await
            .unwrap();
        assert!(ok);
        assert!(step.succeeded());
        assert_eq!((a.runs(), b.runs(), c.runs()), (1, 1, 0));
    }

    #[tokio::test]
    async fn test_errors_move_to_next_attempt() {
        let a = FakeStep::error("first");
        let b = FakeStep::succeed();
        let step = RetryStep::new(vec![a.clone(), b.clone()]);

        assert!(step
            .run(&StepContext::background(), &RunState::default())
            .await
            .unwrap());
        assert_eq!(b.runs(), 1);
    }

    #[tokio::test]
    async fn test_all_attempts_erroring_returns_last_error() {
        let step = RetryStep::new(vec![FakeStep::error("first"), FakeStep::error("second")]);
        let err = step
            .run(&StepContext::background(), &RunState::default())
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "second");
        assert!(!step.succeeded());
    }

    #[tokio::test]
    async fn test_all_attempts_failing_returns_false() {
        let step = RetryStep::new(vec![FakeStep::fail(), FakeStep::fail()]);
        assert!(!step
            .run(&StepContext::background(), &RunState::default())
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_cancellation_aborts_retries() {
        let ctx = StepContext::background();
        ctx.cancel();
        let next = FakeStep::succeed();
        let step = RetryStep::new(vec![FakeStep::blocks(), next.clone()]);

        let err = step.run(&ctx, &RunState::default()).await.unwrap_err();
        assert!(matches!(err, ExecError::Canceled));
        assert_eq!(next.runs(), 0);
    }
}
