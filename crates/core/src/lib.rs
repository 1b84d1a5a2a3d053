//! Domain types shared by the conveyor crates.
//!
//! A build is described by a [`Plan`]: a tree of step descriptors compiled
//! from a pipeline definition. The execution crates turn this tree into
//! runnable steps; this crate only owns the data model.

pub mod domain;
pub mod error;

pub use domain::build::BuildStatus;
pub use domain::duration::parse_duration;
pub use domain::plan::{
    AcrossPlan, AcrossStepPlan, AcrossVar, GetPlan, HookPlan, InParallelPlan, LoadVarPlan, Plan,
    PlanId, PlanStep, PutPlan, TaskPlan, TimeoutPlan, TryPlan,
};
pub use error::{CoreError, Result};
