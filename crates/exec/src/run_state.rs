//! State shared by every step of one build.

use std::any::Any;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use conveyor_core::PlanId;
use serde_json::Value;
use vars::{Reference, TrackedVarsIterator, Variables};

use crate::artifacts::{Artifact, ArtifactRepository};
use crate::build_vars::BuildVariables;

type Results = HashMap<PlanId, Box<dyn Any + Send + Sync>>;

/// Handle on the artifacts, variables and step results of a build.
///
/// Clones share everything. [`RunState::new_local_scope`] returns a state
/// with fresh artifact and variable scopes on top of this one; results stay
/// shared across scopes.
#[derive(Clone)]
pub struct RunState {
    artifacts: Arc<ArtifactRepository>,
    vars: BuildVariables,
    results: Arc<RwLock<Results>>,
    redaction_enabled: bool,
}

impl RunState {
    pub fn new(credentials: impl Variables + 'static, enable_redaction: bool) -> Self {
        Self {
            artifacts: Arc::new(ArtifactRepository::new()),
            vars: BuildVariables::new(credentials, enable_redaction),
            results: Arc::new(RwLock::new(HashMap::new())),
            redaction_enabled: enable_redaction,
        }
    }

    pub fn new_local_scope(&self) -> Self {
        Self {
            artifacts: Arc::new(ArtifactRepository::new_local_scope(&self.artifacts)),
            vars: self.vars.new_local_scope(),
            results: Arc::clone(&self.results),
            redaction_enabled: self.redaction_enabled,
        }
    }

    pub fn artifact_repository(&self) -> &ArtifactRepository {
        &self.artifacts
    }

    pub fn register_artifact(&self, name: impl Into<String>, artifact: Arc<dyn Artifact>) {
        self.artifacts.register_artifact(name, artifact);
    }

    pub fn vars(&self) -> &BuildVariables {
        &self.vars
    }

    pub fn get(&self, reference: &Reference) -> vars::Result<Option<Value>> {
        self.vars.get(reference)
    }

    pub fn add_local_var(&self, name: impl Into<String>, value: Value, redact: bool) {
        self.vars.add_local_var(name, value, redact);
    }

    pub fn iterate_interpolated_creds(&self, iter: &mut dyn TrackedVarsIterator) {
        self.vars.iterate_interpolated_creds(iter);
    }

    pub fn redaction_enabled(&self) -> bool {
        self.redaction_enabled
    }

    /// Record the result of a step, replacing any previous one.
    pub fn store_result<T: Any + Send + Sync>(&self, id: PlanId, value: T) {
        self.results
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, Box::new(value));
    }

    /// The stored result of a step, or `None` if absent or of another type.
    pub fn result<T: Any + Clone>(&self, id: &PlanId) -> Option<T> {
        self.results
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .and_then(|value| (**value).downcast_ref::<T>())
            .cloned()
    }
}

impl Default for RunState {
    fn default() -> Self {
        Self::new(vars::StaticVariables::new(), true)
    }
}

impl std::fmt::Debug for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunState")
            .field("artifacts", &self.artifacts)
            .field("vars", &self.vars)
            .field("redaction_enabled", &self.redaction_enabled)
            .finish()
    }
}
