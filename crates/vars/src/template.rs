//! Interpolation of `((var))` references into documents and strings.

use std::collections::{BTreeSet, HashSet};
use std::sync::OnceLock;

use regex::Regex;
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::{type_name, Result, VarsError};
use crate::reference::Reference;
use crate::variables::Variables;

fn interpolation_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| Regex::new(r"\(\(([^()]+)\)\)").expect("static regex is valid"))
}

fn anchored_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| Regex::new(r"\A\(\(([^()]+)\)\)\z").expect("static regex is valid"))
}

/// Validation switches for an interpolation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EvaluateOpts {
    /// Fail with [`VarsError::UndefinedVars`] if any reference is unresolved.
    pub expect_all_keys: bool,
    /// Fail with [`VarsError::UnusedVars`] if the source lists a variable
    /// that the document never referenced.
    pub expect_all_vars_used: bool,
}

/// Interpolate every reference found in `node`.
///
/// A string that is exactly `((ref))` is replaced by the resolved value,
/// whatever its type. References embedded in longer strings are replaced by
/// the string form of a primitive value. Unresolved references are left as
/// written.
pub fn interpolate(node: &Value, vars: &dyn Variables, opts: EvaluateOpts) -> Result<Value> {
    let mut interpolator = Interpolator::new(vars);
    let result = interpolator.node(node.clone())?;
    interpolator.finish(opts)?;
    Ok(result)
}

/// Interpolate references embedded in a plain string.
pub fn interpolate_str(input: &str, vars: &dyn Variables, opts: EvaluateOpts) -> Result<String> {
    let mut interpolator = Interpolator::new(vars);
    let result = interpolator.string(input)?;
    interpolator.finish(opts)?;
    Ok(result)
}

/// A YAML document containing `((var))` references.
#[derive(Debug, Clone)]
pub struct Template {
    bytes: Vec<u8>,
}

impl Template {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            bytes: bytes.into(),
        }
    }

    /// Interpolate the document and render it back to YAML.
    pub fn evaluate(&self, vars: &dyn Variables, opts: EvaluateOpts) -> Result<Vec<u8>> {
        let document: Value = serde_yaml::from_slice(&self.bytes)?;
        let evaluated = interpolate(&document, vars, opts)?;
        Ok(serde_yaml::to_string(&evaluated)?.into_bytes())
    }
}

struct Interpolator<'a> {
    vars: &'a dyn Variables,
    missing: BTreeSet<String>,
    visited: HashSet<String>,
}

impl<'a> Interpolator<'a> {
    fn new(vars: &'a dyn Variables) -> Self {
        Self {
            vars,
            missing: BTreeSet::new(),
            visited: HashSet::new(),
        }
    }

    fn lookup(&mut self, name: &str) -> Result<Option<Value>> {
        let reference = Reference::parse(name)?;
        self.visited.insert(identifier(&reference));

        let value = self.vars.get(&reference)?;
        if value.is_none() {
            debug!(var = %reference, "var not found");
            self.missing.insert(reference.path.clone());
        }
        Ok(value)
    }

    fn node(&mut self, node: Value) -> Result<Value> {
        match node {
            Value::Object(map) => {
                let mut evaluated = Map::with_capacity(map.len());
                for (key, value) in map {
                    let value = self.node(value)?;
                    let key = self.key(key)?;
                    evaluated.insert(key, value);
                }
                Ok(Value::Object(evaluated))
            }
            Value::Array(items) => items
                .into_iter()
                .map(|item| self.node(item))
                .collect::<Result<Vec<_>>>()
                .map(Value::Array),
            Value::String(s) => self.string_node(s),
            other => Ok(other),
        }
    }

    fn key(&mut self, key: String) -> Result<String> {
        match self.string_node(key)? {
            Value::String(s) => Ok(s),
            other => Ok(other.to_string()),
        }
    }

    fn string_node(&mut self, s: String) -> Result<Value> {
        if let Some(captures) = anchored_regex().captures(&s) {
            return Ok(self.lookup(&captures[1])?.unwrap_or(Value::String(s)));
        }
        self.string(&s).map(Value::String)
    }

    fn string(&mut self, input: &str) -> Result<String> {
        let mut output = String::with_capacity(input.len());
        let mut last = 0;

        for captures in interpolation_regex().captures_iter(input) {
            let Some(whole) = captures.get(0) else {
                continue;
            };
            let name = &captures[1];
            output.push_str(&input[last..whole.start()]);

            match self.lookup(name)? {
                Some(value) => output.push_str(&primitive_string(name, &value)?),
                None => output.push_str(whole.as_str()),
            }
            last = whole.end();
        }

        output.push_str(&input[last..]);
        Ok(output)
    }

    fn finish(self, opts: EvaluateOpts) -> Result<()> {
        let mut errors = Vec::new();

        if opts.expect_all_keys && !self.missing.is_empty() {
            errors.push(VarsError::UndefinedVars(
                self.missing.into_iter().collect(),
            ));
        }

        if opts.expect_all_vars_used {
            let unused: BTreeSet<String> = self
                .vars
                .list()?
                .iter()
                .map(identifier)
                .filter(|id| !self.visited.contains(id))
                .collect();
            if !unused.is_empty() {
                errors.push(VarsError::UnusedVars(unused.into_iter().collect()));
            }
        }

        match VarsError::combine(errors) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

fn identifier(reference: &Reference) -> String {
    match &reference.source {
        Some(source) => format!("{}:{}", source, reference.path),
        None => reference.path.clone(),
    }
}

fn primitive_string(name: &str, value: &Value) -> Result<String> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Bool(b) => Ok(b.to_string()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Null => Ok("null".to_string()),
        other => Err(VarsError::InvalidInterpolation {
            name: name.to_string(),
            value_type: type_name(other).to_string(),
        }),
    }
}
