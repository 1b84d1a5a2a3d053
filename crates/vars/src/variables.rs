//! Variable sources.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value;

use crate::error::{type_name, Result, VarsError};
use crate::reference::Reference;

/// A provider of variable values.
pub trait Variables: Send + Sync {
    /// Resolve a reference; `Ok(None)` means the source does not know it.
    fn get(&self, reference: &Reference) -> Result<Option<Value>>;

    /// List every reference this source can resolve.
    fn list(&self) -> Result<Vec<Reference>>;
}

impl<T: Variables + ?Sized> Variables for Arc<T> {
    fn get(&self, reference: &Reference) -> Result<Option<Value>> {
        (**self).get(reference)
    }

    fn list(&self) -> Result<Vec<Reference>> {
        (**self).list()
    }
}

/// Walk `reference.fields` through nested maps, starting at `value`.
pub fn traverse_fields(reference: &Reference, value: Value) -> Result<Value> {
    let mut current = value;
    for field in &reference.fields {
        current = match current {
            Value::Object(mut map) => match map.remove(field) {
                Some(inner) => inner,
                None => {
                    return Err(VarsError::MissingField {
                        field: field.clone(),
                        reference: reference.to_string(),
                    })
                }
            },
            other => {
                return Err(VarsError::InvalidField {
                    field: field.clone(),
                    actual_type: type_name(&other).to_string(),
                    reference: reference.to_string(),
                })
            }
        };
    }
    Ok(current)
}

/// A fixed in-memory map of variables.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StaticVariables(BTreeMap<String, Value>);

impl StaticVariables {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: Value) -> Option<Value> {
        self.0.insert(name.into(), value)
    }

    pub fn with(mut self, name: impl Into<String>, value: Value) -> Self {
        self.insert(name, value);
        self
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &String> {
        self.0.keys()
    }
}

impl<K: Into<String>> FromIterator<(K, Value)> for StaticVariables {
    fn from_iter<I: IntoIterator<Item = (K, Value)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}

impl Variables for StaticVariables {
    fn get(&self, reference: &Reference) -> Result<Option<Value>> {
        match self.0.get(&reference.path) {
            Some(value) => traverse_fields(reference, value.clone()).map(Some),
            None => Ok(None),
        }
    }

    fn list(&self) -> Result<Vec<Reference>> {
        Ok(self.0.keys().map(Reference::new).collect())
    }
}

/// Dispatches qualified references to the source they name.
#[derive(Clone, Default)]
pub struct NamedVariables(BTreeMap<String, Arc<dyn Variables>>);

impl NamedVariables {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, source: impl Variables + 'static) -> Self {
        self.0.insert(name.into(), Arc::new(source));
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, source: Arc<dyn Variables>) {
        self.0.insert(name.into(), source);
    }
}

impl Variables for NamedVariables {
    fn get(&self, reference: &Reference) -> Result<Option<Value>> {
        let Some(name) = &reference.source else {
            return Ok(None);
        };

        match self.0.get(name) {
            Some(source) => source.get(reference),
            None => Err(VarsError::MissingSource(name.clone())),
        }
    }

    fn list(&self) -> Result<Vec<Reference>> {
        let mut all = Vec::new();
        for (name, source) in &self.0 {
            for mut reference in source.list()? {
                reference.source = Some(name.clone());
                all.push(reference);
            }
        }
        Ok(all)
    }
}

impl std::fmt::Debug for NamedVariables {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.0.keys()).finish()
    }
}

/// Tries several sources in order; the first hit (or error) wins.
#[derive(Clone, Default)]
pub struct MultiVariables(Vec<Arc<dyn Variables>>);

impl MultiVariables {
    pub fn new(sources: Vec<Arc<dyn Variables>>) -> Self {
        Self(sources)
    }

    pub fn push(&mut self, source: Arc<dyn Variables>) {
        self.0.push(source);
    }
}

impl Variables for MultiVariables {
    fn get(&self, reference: &Reference) -> Result<Option<Value>> {
        for source in &self.0 {
            if let Some(value) = source.get(reference)? {
                return Ok(Some(value));
            }
        }
        Ok(None)
    }

    fn list(&self) -> Result<Vec<Reference>> {
        let mut all = Vec::new();
        for source in &self.0 {
            all.extend(source.list()?);
        }
        Ok(all)
    }
}
