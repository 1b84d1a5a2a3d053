use std::sync::Arc;

use conveyor_core::{GetPlan, Plan, PutPlan, TaskPlan};
use exec::{BuildStepDelegateFactory, Step};

/// Builds the leaf steps that talk to workers and resources.
///
/// The engine wraps every leaf it gets from here with error logging and
/// retriable error detection, so implementations only do the work itself.
pub trait StepFactory: Send + Sync {
    fn get_step(
        &self,
        plan: &Plan,
        get: &GetPlan,
        delegate_factory: Arc<dyn BuildStepDelegateFactory>,
    ) -> Arc<dyn Step>;

    fn put_step(
        &self,
        plan: &Plan,
        put: &PutPlan,
        delegate_factory: Arc<dyn BuildStepDelegateFactory>,
    ) -> Arc<dyn Step>;

    fn task_step(
        &self,
        plan: &Plan,
        task: &TaskPlan,
        delegate_factory: Arc<dyn BuildStepDelegateFactory>,
    ) -> Arc<dyn Step>;
}
