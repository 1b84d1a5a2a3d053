//! Compiles a [`Plan`] tree into runnable steps.

use std::sync::Arc;
use std::time::Duration;

use conveyor_core::{parse_duration, AcrossPlan, AcrossVar, Plan, PlanStep, TimeoutPlan};
use events::EventBus;
use exec::steps::{
    AggregateStep, EnsureStep, InParallelStep, InterruptStep, LoadVarStep, LocalScopeStep,
    LogErrorStep, OnAbortStep, OnErrorStep, OnFailureStep, OnSuccessStep, PatternRetryPolicy,
    RetryErrorStep, RetryPolicy, RetryStep, TimeoutStep, TryStep,
};
use exec::{BuildStepDelegateFactory, Step};
use tracing::debug;
use uuid::Uuid;

use crate::delegate::EventDelegateFactory;
use crate::error::{EngineError, Result};
use crate::factory::StepFactory;

/// Builds the step tree of one build.
pub struct StepBuilder {
    factory: Arc<dyn StepFactory>,
    bus: EventBus,
    build_id: Uuid,
    retry_policy: Arc<dyn RetryPolicy>,
    ensure_timeout: Option<Duration>,
}

impl StepBuilder {
    pub fn new(factory: Arc<dyn StepFactory>, bus: EventBus, build_id: Uuid) -> Self {
        Self {
            factory,
            bus,
            build_id,
            retry_policy: Arc::new(PatternRetryPolicy::default()),
            ensure_timeout: None,
        }
    }

    pub fn with_retry_policy(mut self, policy: Arc<dyn RetryPolicy>) -> Self {
        self.retry_policy = policy;
        self
    }

    /// Bound the time `ensure` hooks may take after the build was aborted.
    pub fn with_ensure_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.ensure_timeout = timeout;
        self
    }

    pub fn build_id(&self) -> Uuid {
        self.build_id
    }

    pub fn build(&self, plan: &Plan) -> Result<Arc<dyn Step>> {
        self.build_node(plan, &[])
    }

    /// `inherited` holds the retry attempts of the enclosing retry steps.
    /// A node with its own `attempts` uses those instead.
    fn build_node(&self, plan: &Plan, inherited: &[u32]) -> Result<Arc<dyn Step>> {
        debug!(plan_id = %plan.id, kind = plan.step.kind(), "building step");
        let attempts = if plan.attempts.is_empty() {
            inherited
        } else {
            plan.attempts.as_slice()
        };
        let child = |plan: &Plan| self.build_node(plan, attempts);

        let step: Arc<dyn Step> = match &plan.step {
            PlanStep::Do(plans) => OnSuccessStep::sequence(self.build_all(plans, attempts)?),
            PlanStep::Aggregate(plans) => {
                Arc::new(AggregateStep::new(self.build_all(plans, attempts)?))
            }
            PlanStep::InParallel(parallel) => Arc::new(InParallelStep::new(
                self.build_all(&parallel.steps, attempts)?,
                parallel.limit,
                parallel.fail_fast,
            )),
            PlanStep::Across(across) => Arc::new(LogErrorStep::new(
                self.build_across(plan, across, attempts)?,
                self.delegates(plan, attempts),
            )),
            PlanStep::OnSuccess(hook) => {
                Arc::new(OnSuccessStep::new(child(&hook.step)?, child(&hook.next)?))
            }
            PlanStep::OnFailure(hook) => {
                Arc::new(OnFailureStep::new(child(&hook.step)?, child(&hook.next)?))
            }
            PlanStep::OnError(hook) => {
                Arc::new(OnErrorStep::new(child(&hook.step)?, child(&hook.next)?))
            }
            PlanStep::OnAbort(hook) => {
                Arc::new(OnAbortStep::new(child(&hook.step)?, child(&hook.next)?))
            }
            PlanStep::Ensure(hook) => Arc::new(
                EnsureStep::new(child(&hook.step)?, child(&hook.next)?)
                    .with_hook_timeout(self.ensure_timeout),
            ),
            PlanStep::Timeout(timeout) => {
                let duration = timeout_duration(plan, timeout)?;
                Arc::new(TimeoutStep::new(child(&timeout.step)?, duration))
            }
            PlanStep::Interrupt(timeout) => {
                let duration = timeout_duration(plan, timeout)?;
                Arc::new(InterruptStep::new(child(&timeout.step)?, duration))
            }
            PlanStep::Try(try_plan) => Arc::new(TryStep::new(child(&try_plan.step)?)),
            PlanStep::Retry(plans) => {
                let steps = plans
                    .iter()
                    .zip(1u32..)
                    .map(|(plan, attempt)| {
                        let mut nested = attempts.to_vec();
                        nested.push(attempt);
                        self.build_node(plan, &nested)
                    })
                    .collect::<Result<Vec<_>>>()?;
                Arc::new(RetryStep::new(steps))
            }
            PlanStep::Get(get) => {
                let delegates = self.delegates(plan, attempts);
                let leaf = self.factory.get_step(plan, get, Arc::clone(&delegates));
                self.wrap_leaf(leaf, delegates)
            }
            PlanStep::Put(put) => {
                let delegates = self.delegates(plan, attempts);
                let leaf = self.factory.put_step(plan, put, Arc::clone(&delegates));
                self.wrap_leaf(leaf, delegates)
            }
            PlanStep::Task(task) => {
                let delegates = self.delegates(plan, attempts);
                let leaf = self.factory.task_step(plan, task, Arc::clone(&delegates));
                self.wrap_leaf(leaf, delegates)
            }
            PlanStep::LoadVar(load_var) => {
                let delegates = self.delegates(plan, attempts);
                let leaf = Arc::new(LoadVarStep::new(
                    plan.id.clone(),
                    load_var.clone(),
                    Arc::clone(&delegates),
                ));
                Arc::new(LogErrorStep::new(leaf, delegates))
            }
        };

        Ok(step)
    }

    fn build_all(&self, plans: &[Plan], attempts: &[u32]) -> Result<Vec<Arc<dyn Step>>> {
        plans
            .iter()
            .map(|plan| self.build_node(plan, attempts))
            .collect()
    }

    fn delegates(&self, plan: &Plan, attempts: &[u32]) -> Arc<dyn BuildStepDelegateFactory> {
        Arc::new(
            EventDelegateFactory::new(self.bus.clone(), self.build_id, plan.id.clone())
                .with_attempts(attempts.to_vec()),
        )
    }

    fn wrap_leaf(
        &self,
        leaf: Arc<dyn Step>,
        delegates: Arc<dyn BuildStepDelegateFactory>,
    ) -> Arc<dyn Step> {
        let logged = Arc::new(LogErrorStep::new(leaf, Arc::clone(&delegates)));
        Arc::new(RetryErrorStep::new(
            logged,
            delegates,
            Arc::clone(&self.retry_policy),
        ))
    }

    fn build_across(
        &self,
        plan: &Plan,
        across: &AcrossPlan,
        attempts: &[u32],
    ) -> Result<Arc<dyn Step>> {
        if across.vars.is_empty() {
            return Err(EngineError::invalid_plan(&plan.id, "across has no vars"));
        }

        let expected: usize = across.vars.iter().map(|v| v.values.len()).product();
        if across.steps.len() != expected {
            return Err(EngineError::invalid_plan(
                &plan.id,
                format!(
                    "across expects {} steps, got {}",
                    expected,
                    across.steps.len()
                ),
            ));
        }

        let leaves = across
            .steps
            .iter()
            .map(|combination| {
                if combination.values.len() != across.vars.len() {
                    return Err(EngineError::invalid_plan(
                        &combination.step.id,
                        format!(
                            "across step binds {} values for {} vars",
                            combination.values.len(),
                            across.vars.len()
                        ),
                    ));
                }
                let bound = across
                    .vars
                    .iter()
                    .zip(&combination.values)
                    .map(|(var, value)| (var.var.clone(), value.clone()))
                    .collect();
                let step = self.build_node(&combination.step, attempts)?;
                Ok(Arc::new(LocalScopeStep::new(step, bound, false)) as Arc<dyn Step>)
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(nest_across(&across.vars, &leaves, across.fail_fast))
    }
}

/// One `InParallelStep` level per var; leaves are laid out row-major.
fn nest_across(vars: &[AcrossVar], leaves: &[Arc<dyn Step>], fail_fast: bool) -> Arc<dyn Step> {
    let Some((var, rest)) = vars.split_first() else {
        return OnSuccessStep::sequence(leaves.to_vec());
    };

    let children = if rest.is_empty() {
        leaves.to_vec()
    } else {
        let chunk: usize = rest.iter().map(|v| v.values.len()).product();
        if chunk == 0 {
            Vec::new()
        } else {
            leaves
                .chunks(chunk)
                .map(|group| nest_across(rest, group, fail_fast))
                .collect()
        }
    };

    Arc::new(InParallelStep::new(children, var.max_in_flight, fail_fast))
}

fn timeout_duration(plan: &Plan, timeout: &TimeoutPlan) -> Result<Duration> {
    parse_duration(&timeout.duration).map_err(|e| EngineError::invalid_plan(&plan.id, e.to_string()))
}
