//! Tracking of resolved credentials for later redaction.

use std::collections::{BTreeMap, HashMap};
use std::sync::{PoisonError, RwLock};

use serde_json::Value;
use tracing::trace;

use crate::error::Result;
use crate::reference::Reference;
use crate::variables::Variables;

/// Visitor over tracked credentials.
pub trait TrackedVarsIterator {
    fn yield_cred(&mut self, name: &str, value: &str);
}

/// Records string leaves of every value resolved through it.
#[derive(Debug, Default)]
pub struct Tracker {
    enabled: bool,
    interpolated: RwLock<HashMap<String, String>>,
}

impl Tracker {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            interpolated: RwLock::new(HashMap::new()),
        }
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    /// Track `value` as resolved for `reference`. Maps are flattened so that
    /// each string leaf is recorded under its full dotted path.
    pub fn track(&self, reference: &Reference, value: &Value) {
        if !self.enabled {
            return;
        }

        let mut creds = self
            .interpolated
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        collect_leaves(reference, value, &mut creds);
    }

    pub fn iterate_interpolated_creds(&self, iter: &mut dyn TrackedVarsIterator) {
        let creds = self
            .interpolated
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        for (name, value) in creds.iter() {
            iter.yield_cred(name, value);
        }
    }

    pub fn len(&self) -> usize {
        self.interpolated
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn collect_leaves(reference: &Reference, value: &Value, creds: &mut HashMap<String, String>) {
    match value {
        Value::Object(map) => {
            for (key, inner) in map {
                collect_leaves(&reference.child(key.clone()), inner, creds);
            }
        }
        Value::String(s) => {
            let name = reference.flattened_path();
            trace!(var = %name, "tracking credential");
            creds.insert(name, s.clone());
        }
        _ => {}
    }
}

/// Wraps a source and tracks every value it resolves.
pub struct CredVarsTracker {
    source: Box<dyn Variables>,
    tracker: Tracker,
}

impl CredVarsTracker {
    pub fn new(source: impl Variables + 'static, enabled: bool) -> Self {
        Self {
            source: Box::new(source),
            tracker: Tracker::new(enabled),
        }
    }

    pub fn enabled(&self) -> bool {
        self.tracker.enabled()
    }

    pub fn tracker(&self) -> &Tracker {
        &self.tracker
    }

    pub fn iterate_interpolated_creds(&self, iter: &mut dyn TrackedVarsIterator) {
        self.tracker.iterate_interpolated_creds(iter);
    }
}

impl Variables for CredVarsTracker {
    fn get(&self, reference: &Reference) -> Result<Option<Value>> {
        let value = self.source.get(reference)?;
        if let Some(value) = &value {
            self.tracker.track(reference, value);
        }
        Ok(value)
    }

    fn list(&self) -> Result<Vec<Reference>> {
        self.source.list()
    }
}

/// Collects credentials into a map; the first value seen for a name wins.
#[derive(Debug, Default)]
pub struct MapCredVarsIterator {
    pub creds: BTreeMap<String, String>,
}

impl MapCredVarsIterator {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TrackedVarsIterator for MapCredVarsIterator {
    fn yield_cred(&mut self, name: &str, value: &str) {
        self.creds
            .entry(name.to_string())
            .or_insert_with(|| value.to_string());
    }
}

/// Collects every credential value yielded, including shadowed ones.
#[derive(Debug, Default)]
pub struct ListCredVarsIterator {
    pub values: Vec<String>,
}

impl ListCredVarsIterator {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TrackedVarsIterator for ListCredVarsIterator {
    fn yield_cred(&mut self, _name: &str, value: &str) {
        self.values.push(value.to_string());
    }
}
