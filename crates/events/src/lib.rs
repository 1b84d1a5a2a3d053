//! Build events for conveyor
//!
//! This crate provides the event types emitted while a build runs and the
//! bus that fans them out to subscribers.

mod bus;
mod types;

pub use bus::EventBus;
pub use types::*;
