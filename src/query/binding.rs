//! Dynamic query binding.
//!
//! A filter is any value that serializes to a map. Each non-empty field is
//! looked up by name in a per-kind binding table and applied to the criteria.
//! Fields the table does not know, or values the binding rejects, are skipped
//! and logged: one filter type may be shared across several entity kinds.

use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;
use tracing::debug;

pub type FlagFn<C> = fn(&mut C);
pub type ValueFn<C> = fn(&mut C, &Value) -> Result<(), BindError>;

/// How one filter field maps onto a criteria predicate.
pub enum Binding<C> {
    /// Zero-argument predicate triggered by a present, non-false field.
    Flag(FlagFn<C>),
    /// One-argument predicate receiving the field's value.
    Value(ValueFn<C>),
}

impl<C> Clone for Binding<C> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<C> Copy for Binding<C> {}

impl<C> fmt::Debug for Binding<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Binding::Flag(_) => f.write_str("Binding::Flag"),
            Binding::Value(_) => f.write_str("Binding::Value"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BindError {
    #[error("expected {expected}, got {found}")]
    TypeMismatch { expected: &'static str, found: String },
    #[error("{0}")]
    Invalid(String),
}

/// Field name → binding table for one criteria type.
pub struct QueryBindings<C> {
    entries: HashMap<&'static str, Binding<C>>,
}

impl<C> QueryBindings<C> {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    pub fn flag(mut self, name: &'static str, apply: FlagFn<C>) -> Self {
        self.entries.insert(name, Binding::Flag(apply));
        self
    }

    pub fn value(mut self, name: &'static str, apply: ValueFn<C>) -> Self {
        self.entries.insert(name, Binding::Value(apply));
        self
    }

    pub fn get(&self, name: &str) -> Option<Binding<C>> {
        self.entries.get(name).copied()
    }

    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.entries.keys().copied().collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<C> Default for QueryBindings<C> {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SkippedField {
    pub field: String,
    pub reason: String,
}

/// What a `bind` call did, field by field.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BindReport {
    pub applied: Vec<String>,
    pub skipped: Vec<SkippedField>,
}

impl BindReport {
    fn skip(&mut self, field: &str, reason: impl Into<String>) {
        let reason = reason.into();
        debug!(field, reason = %reason, "Skipped filter field");
        self.skipped.push(SkippedField {
            field: field.to_string(),
            reason,
        });
    }
}

/// `nameLike` → `name_like`, `taskID` → `task_id`. A run of capitals is one
/// word; its last capital starts a new word when a lowercase letter follows
/// (`HTTPServer` → `http_server`). snake_case names pass through.
pub fn normalize_field_name(name: &str) -> String {
    let chars: Vec<char> = name.chars().collect();
    let mut out = String::with_capacity(name.len() + 4);
    for (i, &ch) in chars.iter().enumerate() {
        if !ch.is_ascii_uppercase() {
            out.push(ch);
            continue;
        }
        let prev = i.checked_sub(1).map(|p| chars[p]);
        let next = chars.get(i + 1).copied();
        let word_start = match prev {
            None | Some('_') => false,
            Some(p) if p.is_ascii_uppercase() => next.is_some_and(|n| n.is_ascii_lowercase()),
            Some(_) => true,
        };
        if word_start {
            out.push('_');
        }
        out.push(ch.to_ascii_lowercase());
    }
    out
}

pub fn is_like_field(name: &str) -> bool {
    name.ends_with("_like")
}

/// Null, empty strings, empty arrays and empty maps carry no filter.
pub fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
        _ => false,
    }
}

/// Wraps a value as `%value%` for substring matching.
pub fn like_pattern(value: &Value) -> Value {
    match value {
        Value::String(s) => Value::String(format!("%{}%", s)),
        other => Value::String(format!("%{}%", other)),
    }
}

/// Serializes a filter into its field map. Anything but a map binds nothing.
pub fn filter_fields<F: Serialize + ?Sized>(filter: &F) -> Option<Map<String, Value>> {
    match serde_json::to_value(filter) {
        Ok(Value::Object(map)) => Some(map),
        Ok(Value::Null) => None,
        Ok(other) => {
            debug!(filter = %other, "Filter is not a field map, nothing to bind");
            None
        }
        Err(e) => {
            debug!(error = %e, "Filter could not be serialized, nothing to bind");
            None
        }
    }
}

/// Applies every non-empty filter field to `criteria`. Never fails.
pub fn bind<C, F>(criteria: &mut C, bindings: &QueryBindings<C>, filter: &F) -> BindReport
where
    F: Serialize + ?Sized,
{
    let mut report = BindReport::default();
    let Some(fields) = filter_fields(filter) else {
        return report;
    };

    for (raw_name, value) in &fields {
        if is_empty_value(value) {
            continue;
        }
        let name = normalize_field_name(raw_name);
        let Some(binding) = bindings.get(&name) else {
            report.skip(raw_name, "no matching query method");
            continue;
        };

        match binding {
            Binding::Flag(apply) => {
                if matches!(value, Value::Bool(false)) {
                    continue;
                }
                apply(criteria);
                report.applied.push(name);
            }
            Binding::Value(apply) => {
                let outcome = if is_like_field(&name) {
                    apply(criteria, &like_pattern(value))
                } else {
                    apply(criteria, value)
                };
                match outcome {
                    Ok(()) => report.applied.push(name),
                    Err(e) => report.skip(raw_name, e.to_string()),
                }
            }
        }
    }
    report
}

fn describe(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(_) => "boolean".to_string(),
        Value::Number(_) => "number".to_string(),
        Value::String(_) => "string".to_string(),
        Value::Array(_) => "array".to_string(),
        Value::Object(_) => "object".to_string(),
    }
}

/// Accepts strings, and numbers rendered as strings (numeric ids are common).
pub fn expect_string(value: &Value) -> Result<String, BindError> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(BindError::TypeMismatch {
            expected: "string",
            found: describe(other),
        }),
    }
}

pub fn expect_u32(value: &Value) -> Result<u32, BindError> {
    let n = match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse::<u64>().ok(),
        _ => None,
    };
    n.and_then(|n| u32::try_from(n).ok())
        .ok_or_else(|| BindError::TypeMismatch {
            expected: "unsigned integer",
            found: describe(value),
        })
}
