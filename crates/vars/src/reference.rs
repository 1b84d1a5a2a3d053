//! Parsing of `source:path.field."quoted field"` variable references.

use std::fmt;

use crate::error::{Result, VarsError};

/// A parsed pointer to a variable.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Reference {
    /// Name of the variable source, if qualified.
    pub source: Option<String>,
    pub path: String,
    /// Field accesses into the resolved value.
    pub fields: Vec<String>,
}

impl Reference {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            source: None,
            path: path.into(),
            fields: Vec::new(),
        }
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn with_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields = fields.into_iter().map(Into::into).collect();
        self
    }

    /// Parse a reference as written between `((` and `))`.
    pub fn parse(raw: &str) -> Result<Self> {
        let mut input = raw;
        let mut source = None;

        if let Some(idx) = find_unquoted(input, ':') {
            let candidate = input[..idx].trim();
            if candidate.contains('"') {
                return Err(VarsError::invalid_reference(
                    raw,
                    "source must not be quoted",
                ));
            }
            if candidate.is_empty() {
                return Err(VarsError::invalid_reference(raw, "empty source"));
            }
            source = Some(candidate.to_string());
            input = &input[idx + 1..];
        }

        let mut segments = Vec::new();
        for segment in split_unquoted(input, '.') {
            segments.push(parse_segment(raw, segment)?);
        }

        let mut segments = segments.into_iter();
        let path = segments
            .next()
            .ok_or_else(|| VarsError::invalid_reference(raw, "empty field"))?;

        Ok(Self {
            source,
            path,
            fields: segments.collect(),
        })
    }

    /// The path and fields joined with `.`, as used for tracking keys.
    pub fn flattened_path(&self) -> String {
        let mut parts = Vec::with_capacity(self.fields.len() + 1);
        parts.push(self.path.as_str());
        parts.extend(self.fields.iter().map(String::as_str));
        parts.join(".")
    }

    /// A copy of this reference with one more field appended.
    pub fn child(&self, field: impl Into<String>) -> Self {
        let mut child = self.clone();
        child.fields.push(field.into());
        child
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(source) = &self.source {
            write!(f, "{}:", source)?;
        }
        write_segment(f, &self.path)?;
        for field in &self.fields {
            f.write_str(".")?;
            write_segment(f, field)?;
        }
        Ok(())
    }
}

impl std::str::FromStr for Reference {
    type Err = VarsError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

fn write_segment(f: &mut fmt::Formatter<'_>, segment: &str) -> fmt::Result {
    let needs_quotes = segment.contains(&[',', '.', ':', '/', ' '][..])
        || segment.trim() != segment;
    if needs_quotes {
        write!(f, "\"{}\"", segment)
    } else {
        f.write_str(segment)
    }
}

fn parse_segment(raw: &str, segment: &str) -> Result<String> {
    let trimmed = segment.trim();
    let value = if trimmed.len() >= 2 && trimmed.starts_with('"') && trimmed.ends_with('"') {
        &trimmed[1..trimmed.len() - 1]
    } else {
        trimmed
    };

    if value.is_empty() {
        return Err(VarsError::invalid_reference(raw, "empty field"));
    }
    Ok(value.to_string())
}

fn find_unquoted(input: &str, needle: char) -> Option<usize> {
    let mut quoted = false;
    for (idx, c) in input.char_indices() {
        match c {
            '"' => quoted = !quoted,
            c if c == needle && !quoted => return Some(idx),
            _ => {}
        }
    }
    None
}

fn split_unquoted(input: &str, separator: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut quoted = false;
    let mut start = 0;
    for (idx, c) in input.char_indices() {
        match c {
            '"' => quoted = !quoted,
            c if c == separator && !quoted => {
                parts.push(&input[start..idx]);
                start = idx + c.len_utf8();
            }
            _ => {}
        }
    }
    parts.push(&input[start..]);
    parts
}
