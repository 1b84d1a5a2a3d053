//! Build engine for conveyor
//!
//! Turns a [`Plan`](conveyor_core::Plan) into a step tree, runs it and
//! publishes what happens on an [`EventBus`](events::EventBus). Work that
//! needs workers or resources is delegated to a [`StepFactory`].

pub mod builder;
pub mod config;
pub mod delegate;
pub mod error;
pub mod factory;
pub mod runner;

pub use builder::StepBuilder;
pub use config::EngineConfig;
pub use delegate::{EventDelegate, EventDelegateFactory};
pub use error::{EngineError, Result};
pub use factory::StepFactory;
pub use runner::{load_plan, BuildOutcome, BuildRunner};
