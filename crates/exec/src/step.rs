//! The step abstraction and the delegate seam leaf steps report through.

use std::io::Write;
use std::sync::Arc;

use async_trait::async_trait;

use crate::context::StepContext;
use crate::error::Result;
use crate::run_state::RunState;

/// A node of the executable build tree.
///
/// `run` returns `Ok(false)` when the step ran to completion but failed (a
/// task exiting non-zero) and `Err` when it could not complete at all.
#[async_trait]
pub trait Step: Send + Sync {
    async fn run(&self, ctx: &StepContext, state: &RunState) -> Result<bool>;

    /// The outcome of the last `run`; only meaningful once it has returned.
    fn succeeded(&self) -> bool;

    /// Attach a hook that the step itself should run when it fails.
    ///
    /// Steps that wrap another step forward the hook to it; leaves that
    /// cannot use it ignore it.
    fn register_on_failure(&self, _hook: Arc<dyn Step>) {}
}

/// A step that does nothing and succeeds.
#[derive(Debug, Default, Clone, Copy)]
pub struct IdentityStep;

#[async_trait]
impl Step for IdentityStep {
    async fn run(&self, _ctx: &StepContext, _state: &RunState) -> Result<bool> {
        Ok(true)
    }

    fn succeeded(&self) -> bool {
        true
    }
}

/// Output sink handed to a step for one of its streams.
pub type OutputWriter = Box<dyn Write + Send>;

/// Receives lifecycle notifications and output for one step.
pub trait BuildStepDelegate: Send + Sync {
    fn initializing(&self);
    fn starting(&self);
    fn finished(&self, succeeded: bool);
    fn errored(&self, message: &str);
    fn stdout(&self) -> OutputWriter;
    fn stderr(&self) -> OutputWriter;
}

/// Builds the delegate for a step against the state it runs with.
pub trait BuildStepDelegateFactory: Send + Sync {
    fn build_step_delegate(&self, state: &RunState) -> Arc<dyn BuildStepDelegate>;
}
