use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::context::StepContext;
use crate::error::Result;
use crate::run_state::RunState;
use crate::step::Step;

/// Runs `step` in a new local scope with some vars bound.
pub struct LocalScopeStep {
    step: Arc<dyn Step>,
    vars: Vec<(String, Value)>,
    redact: bool,
}

impl LocalScopeStep {
    pub fn new(step: Arc<dyn Step>, vars: Vec<(String, Value)>, redact: bool) -> Self {
        Self { step, vars, redact }
    }
}

#[async_trait]
impl Step for LocalScopeStep {
    async fn run(&self, ctx: &StepContext, state: &RunState) -> Result<bool> {
        let scope = state.new_local_scope();
        for (name, value) in &self.vars {
            scope.add_local_var(name.clone(), value.clone(), self.redact);
        }
        self.step.run(ctx, &scope).await
    }

    fn succeeded(&self) -> bool {
        self.step.succeeded()
    }

    fn register_on_failure(&self, hook: Arc<dyn Step>) {
        self.step.register_on_failure(hook);
    }
}
