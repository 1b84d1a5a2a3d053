//! Hierarchical variable scopes for a running build.

use std::sync::{Arc, PoisonError, RwLock};

use serde_json::Value;
use tracing::debug;
use vars::{
    CredVarsTracker, ListCredVarsIterator, Reference, StaticVariables, TrackedVarsIterator,
    Tracker, Variables, LOCAL_SOURCE,
};

/// Variables visible to a step.
///
/// References qualified with the local source `.` are looked up in this
/// scope's local vars first and then in the enclosing scopes. Any other
/// reference goes straight to the credential source at the root, whose
/// resolved values are tracked for redaction.
#[derive(Clone)]
pub struct BuildVariables {
    inner: Arc<Scope>,
}

struct Scope {
    parent: Parent,
    local: RwLock<StaticVariables>,
    tracker: Tracker,
}

enum Parent {
    Root(Arc<CredVarsTracker>),
    Scope(BuildVariables),
}

impl BuildVariables {
    /// The root scope of a build, resolving credentials through `source`.
    pub fn new(source: impl Variables + 'static, enable_redaction: bool) -> Self {
        Self {
            inner: Arc::new(Scope {
                parent: Parent::Root(Arc::new(CredVarsTracker::new(source, enable_redaction))),
                local: RwLock::new(StaticVariables::new()),
                tracker: Tracker::new(enable_redaction),
            }),
        }
    }

    /// A child scope whose lookups fall back to this one.
    pub fn new_local_scope(&self) -> Self {
        Self {
            inner: Arc::new(Scope {
                parent: Parent::Scope(self.clone()),
                local: RwLock::new(StaticVariables::new()),
                tracker: Tracker::new(self.redaction_enabled()),
            }),
        }
    }

    pub fn redaction_enabled(&self) -> bool {
        self.inner.tracker.enabled()
    }

    /// Bind a local var in this scope, tracking it for redaction if asked.
    pub fn add_local_var(&self, name: impl Into<String>, value: Value, redact: bool) {
        let name = name.into();
        if redact {
            let reference = Reference::new(name.clone()).with_source(LOCAL_SOURCE);
            self.inner.tracker.track(&reference, &value);
        }
        debug!(var = %name, redact, "adding local var");
        self.inner
            .local
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name, value);
    }

    /// Visit every credential resolved so far, innermost scope first.
    pub fn iterate_interpolated_creds(&self, iter: &mut dyn TrackedVarsIterator) {
        self.inner.tracker.iterate_interpolated_creds(iter);
        match &self.inner.parent {
            Parent::Root(source) => source.iterate_interpolated_creds(iter),
            Parent::Scope(parent) => parent.iterate_interpolated_creds(iter),
        }
    }

    /// Every tracked credential value in this scope and its parents.
    ///
    /// Values shadowed by a same-named credential in an inner scope are kept.
    pub fn secrets(&self) -> Vec<String> {
        let mut iter = ListCredVarsIterator::new();
        self.iterate_interpolated_creds(&mut iter);
        iter.values
    }

    fn parent_get(&self, reference: &Reference) -> vars::Result<Option<Value>> {
        match &self.inner.parent {
            Parent::Root(_) if reference.source.as_deref() == Some(LOCAL_SOURCE) => Ok(None),
            Parent::Root(source) => source.get(reference),
            Parent::Scope(parent) => parent.get(reference),
        }
    }
}

impl Variables for BuildVariables {
    fn get(&self, reference: &Reference) -> vars::Result<Option<Value>> {
        if reference.source.as_deref() == Some(LOCAL_SOURCE) {
            let local = self
                .inner
                .local
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .get(reference)?;
            if local.is_some() {
                return Ok(local);
            }
        }
        self.parent_get(reference)
    }

    fn list(&self) -> vars::Result<Vec<Reference>> {
        let mut all = match &self.inner.parent {
            Parent::Root(source) => source.list()?,
            Parent::Scope(parent) => parent.list()?,
        };
        let local = self
            .inner
            .local
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        all.extend(
            local
                .names()
                .map(|name| Reference::new(name.clone()).with_source(LOCAL_SOURCE)),
        );
        Ok(all)
    }
}

impl Default for BuildVariables {
    fn default() -> Self {
        Self::new(StaticVariables::new(), true)
    }
}

impl std::fmt::Debug for BuildVariables {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BuildVariables")
            .field("redaction_enabled", &self.redaction_enabled())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use vars::{MapCredVarsIterator, NamedVariables};

    fn root() -> BuildVariables {
        let creds = NamedVariables::new().with(
            "vault",
            StaticVariables::new()
                .with("password", json!("hunter2"))
                .with("aws", json!({"key": "AKIA", "region": "eu"})),
        );
        BuildVariables::new(creds, true)
    }

    fn local(name: &str) -> Reference {
        Reference::new(name).with_source(LOCAL_SOURCE)
    }

    #[test]
    fn test_local_var_lookup() {
        let vars = root();
        vars.add_local_var("foo", json!({"bar": "baz"}), false);

        assert_eq!(vars.get(&local("foo")).unwrap(), Some(json!({"bar": "baz"})));
        assert_eq!(
            vars.get(&local("foo").with_fields(["bar"])).unwrap(),
            Some(json!("baz"))
        );
        assert_eq!(vars.get(&Reference::new("foo")).unwrap(), None);
        assert_eq!(vars.get(&local("missing")).unwrap(), None);
    }

    #[test]
    fn test_child_scope_shadows_and_falls_through() {
        let parent = root();
        parent.add_local_var("a", json!(1), false);
        parent.add_local_var("b", json!(2), false);

        let child = parent.new_local_scope();
        child.add_local_var("a", json!(10), false);

        assert_eq!(child.get(&local("a")).unwrap(), Some(json!(10)));
        assert_eq!(child.get(&local("b")).unwrap(), Some(json!(2)));
        assert_eq!(parent.get(&local("a")).unwrap(), Some(json!(1)));

        let secret = Reference::new("password").with_source("vault");
        assert_eq!(child.get(&secret).unwrap(), Some(json!("hunter2")));
    }

    #[test]
    fn test_non_local_references_skip_local_vars() {
        let vars = root();
        vars.add_local_var("password", json!("local"), false);
        let secret = Reference::new("password").with_source("vault");
        assert_eq!(vars.get(&secret).unwrap(), Some(json!("hunter2")));
    }

    #[test]
    fn test_list_includes_local_vars() {
        let parent = root();
        parent.add_local_var("a", json!(1), false);
        let child = parent.new_local_scope();
        child.add_local_var("b", json!(2), false);

        let refs = child.list().unwrap();
        assert!(refs.contains(&local("a")));
        assert!(refs.contains(&local("b")));
        assert!(refs.contains(&Reference::new("password").with_source("vault")));
        assert_eq!(parent.list().unwrap().len(), 3);
    }

    #[test]
    fn test_tracks_resolved_credentials_and_redacted_locals() {
        let parent = root();
        parent
            .get(&Reference::new("aws").with_source("vault"))
            .unwrap();
        parent.add_local_var("revealed", json!("visible"), false);

        let child = parent.new_local_scope();
        child.add_local_var("hidden", json!("s3cr3t"), true);

        let mut iter = MapCredVarsIterator::new();
        child.iterate_interpolated_creds(&mut iter);
        assert_eq!(iter.creds["hidden"], "s3cr3t");
        assert_eq!(iter.creds["aws.key"], "AKIA");
        assert_eq!(iter.creds["aws.region"], "eu");
        assert!(!iter.creds.values().any(|v| v == "visible"));

        let mut parent_iter = MapCredVarsIterator::new();
        parent.iterate_interpolated_creds(&mut parent_iter);
        assert!(!parent_iter.creds.contains_key("hidden"));
    }

    #[test]
    fn test_inner_scope_wins_for_same_path() {
        let parent = root();
        parent.add_local_var("v", json!("outer"), true);
        let child = parent.new_local_scope();
        child.add_local_var("v", json!("inner"), true);

        let mut iter = MapCredVarsIterator::new();
        child.iterate_interpolated_creds(&mut iter);
        assert_eq!(iter.creds["v"], "inner");
    }

    #[test]
    fn test_disabled_redaction_tracks_nothing() {
        let vars = BuildVariables::new(StaticVariables::new().with("k", json!("v")), false);
        vars.get(&Reference::new("k")).unwrap();
        vars.add_local_var("x", json!("y"), true);
        assert!(vars.secrets().is_empty());
        assert!(!vars.new_local_scope().redaction_enabled());
    }
}
