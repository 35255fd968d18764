//! Response body templates.
//!
//! Bodies may reference named values as `{{.name}}`. The value set is the
//! request's path variables plus `timestamp` (current UTC, RFC 3339, second
//! precision). Variables that parse as integers are normalized to numbers so
//! `{"id": {{.id}}}` renders a JSON number.
//!
//! A template that fails to parse is served verbatim.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};
use dashmap::DashMap;
use thiserror::Error;

/// Rendered in place of a name with no value.
pub const NO_VALUE: &str = "<no value>";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TemplateError {
    #[error("unclosed action starting at byte {0}")]
    Unclosed(usize),

    #[error("unsupported action {0:?}")]
    BadAction(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplateValue {
    Int(i64),
    Str(String),
}

impl TemplateValue {
    fn from_var(raw: &str) -> Self {
        match raw.parse::<i64>() {
            Ok(n) => TemplateValue::Int(n),
            Err(_) => TemplateValue::Str(raw.to_string()),
        }
    }
}

impl fmt::Display for TemplateValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TemplateValue::Int(n) => write!(f, "{}", n),
            TemplateValue::Str(s) => f.write_str(s),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Field(String),
}

/// A parsed template, ready to render any number of times.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledTemplate {
    segments: Vec<Segment>,
}

impl CompiledTemplate {
    pub fn parse(source: &str) -> Result<Self, TemplateError> {
        let mut segments = Vec::new();
        let mut rest = source;
        let mut offset = 0;

        while let Some(open) = rest.find("{{") {
            if open > 0 {
                segments.push(Segment::Literal(rest[..open].to_string()));
            }
            let after_open = &rest[open + 2..];
            let close = after_open.find("}}").ok_or(TemplateError::Unclosed(offset + open))?;
            segments.push(Segment::Field(parse_action(&after_open[..close])?));

            let consumed = open + 2 + close + 2;
            offset += consumed;
            rest = &rest[consumed..];
        }

        if !rest.is_empty() {
            segments.push(Segment::Literal(rest.to_string()));
        }

        Ok(Self { segments })
    }

    /// Render against prepared values.
    pub fn render(&self, values: &BTreeMap<String, TemplateValue>) -> String {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Field(name) => match values.get(name) {
                    Some(value) => out.push_str(&value.to_string()),
                    None => out.push_str(NO_VALUE),
                },
            }
        }
        out
    }
}

fn parse_action(action: &str) -> Result<String, TemplateError> {
    let trimmed = action.trim();
    let name = trimmed
        .strip_prefix('.')
        .filter(|name| !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_'));

    match name {
        Some(name) => Ok(name.to_string()),
        None => Err(TemplateError::BadAction(trimmed.to_string())),
    }
}

/// Build the value set for one request.
pub fn template_values(vars: &BTreeMap<String, String>, now: DateTime<Utc>) -> BTreeMap<String, TemplateValue> {
    let mut values: BTreeMap<String, TemplateValue> = vars
        .iter()
        .map(|(name, raw)| (name.clone(), TemplateValue::from_var(raw)))
        .collect();
    values.insert(
        "timestamp".to_string(),
        TemplateValue::Str(now.to_rfc3339_opts(SecondsFormat::Secs, true)),
    );
    values
}

/// Compiled templates keyed by their source text.
///
/// Entries are created on first use and shared by concurrent requests. The
/// whole cache is replaced on reload, never partially invalidated.
#[derive(Debug, Default)]
pub struct TemplateCache {
    entries: DashMap<String, Arc<Result<CompiledTemplate, TemplateError>>>,
}

impl TemplateCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_compile(&self, source: &str) -> Arc<Result<CompiledTemplate, TemplateError>> {
        if let Some(hit) = self.entries.get(source) {
            return hit.value().clone();
        }
        let compiled = Arc::new(CompiledTemplate::parse(source));
        self.entries
            .entry(source.to_string())
            .or_insert(compiled)
            .value()
            .clone()
    }

    /// Render `source` with the given path variables at the current time.
    pub fn render(&self, source: &str, vars: &BTreeMap<String, String>) -> String {
        self.render_at(source, vars, Utc::now())
    }

    pub fn render_at(&self, source: &str, vars: &BTreeMap<String, String>, now: DateTime<Utc>) -> String {
        if !source.contains("{{") {
            return source.to_string();
        }

        match self.get_or_compile(source).as_ref() {
            Ok(template) => template.render(&template_values(vars, now)),
            Err(e) => {
                tracing::warn!(error = %e, "Response template failed to parse, serving raw body");
                source.to_string()
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
