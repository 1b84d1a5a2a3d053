//! Combinators and built-in leaf steps.

mod aggregate;
mod hooks;
mod in_parallel;
mod load_var;
mod local_scope;
mod log_error;
mod retry;
mod timeout;
mod try_step;

pub use aggregate::AggregateStep;
pub use hooks::{EnsureStep, OnAbortStep, OnErrorStep, OnFailureStep, OnSuccessStep};
pub use in_parallel::InParallelStep;
pub use load_var::LoadVarStep;
pub use local_scope::LocalScopeStep;
pub use log_error::{
    LogErrorStep, PatternRetryPolicy, RetryErrorStep, RetryPolicy, DEFAULT_RETRIABLE_PATTERNS,
};
pub use retry::RetryStep;
pub use timeout::{InterruptStep, TimeoutStep};
pub use try_step::TryStep;
