//! Execution of build step trees.
//!
//! A build is a tree of [`Step`]s sharing one [`RunState`]. Combinators in
//! [`steps`] decide which children run, how many at once, and how their
//! outcomes combine; leaves do the actual work and report through a
//! [`BuildStepDelegate`]. Output written by leaves is scrubbed of every
//! credential the build resolved by a [`RedactingWriter`].

pub mod artifacts;
pub mod build_vars;
pub mod context;
pub mod error;
pub mod redact;
pub mod run_state;
pub mod step;
pub mod steps;

#[cfg(test)]
mod testing;

pub use artifacts::{Artifact, ArtifactRepository, InMemoryArtifact, LocalArtifact};
pub use build_vars::BuildVariables;
pub use context::StepContext;
pub use error::{ExecError, Result};
pub use redact::{RedactingWriter, REDACTED};
pub use run_state::RunState;
pub use step::{BuildStepDelegate, BuildStepDelegateFactory, IdentityStep, OutputWriter, Step};
