//! Variable resolution and credential tracking.
//!
//! Build plans refer to secrets and computed values with the
//! `((source:path.field))` syntax. This crate parses those references,
//! resolves them against pluggable [`Variables`] sources, interpolates them
//! into documents and records every resolved secret so that log output can be
//! scrubbed later.

pub mod error;
pub mod reference;
pub mod template;
pub mod tracker;
pub mod variables;

pub use error::{Result, VarsError};
pub use reference::Reference;
pub use template::{interpolate, interpolate_str, EvaluateOpts, Template};
pub use tracker::{
    CredVarsTracker, ListCredVarsIterator, MapCredVarsIterator, TrackedVarsIterator, Tracker,
};
pub use variables::{MultiVariables, NamedVariables, StaticVariables, Variables};

/// Scope marker for variables local to a build step group.
pub const LOCAL_SOURCE: &str = ".";
