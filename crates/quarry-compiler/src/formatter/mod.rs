//! Parameter formatter
//!
//! Scoped to a single statement compilation: collects bindings in emission
//! order while rendering identifiers and placeholders. The compiler replaces
//! its formatter after every pushed statement so bindings never leak between
//! sequential statements of one builder.

use std::sync::Arc;

use quarry_core::Value;

use crate::ast::{Raw, SqlValue};
use crate::dialect::SqlDialect;


/// Caller-supplied identifier-quoting override. Receives the raw identifier
/// segment and the dialect's default implementation as a fallback.
pub type WrapIdentifierHook = Arc<dyn Fn(&str, &dyn Fn(&str) -> String) -> String + Send + Sync>;

/// Client-level formatting policy shared by every compilation for one
/// connection profile.
#[derive(Clone)]
pub struct FormatPolicy {
    /// Substituted for insert cells the caller did not provide. `None`
    /// means bind NULL instead (the null-as-default configuration).
    pub value_for_undefined: Option<Raw>,
    pub wrap_identifier: Option<WrapIdentifierHook>,
}

impl Default for FormatPolicy {
    fn default() -> Self {
        Self {
            value_for_undefined: Some(Raw::new("DEFAULT")),
            wrap_identifier: None,
        }
    }
}

impl FormatPolicy {
    pub fn use_null_as_default() -> Self {
        Self {
            value_for_undefined: None,
            wrap_identifier: None,
        }
    }

    /// Run an identifier through the caller's override without applying any
    /// dialect quoting, used where identifiers become binding values
    /// (columnInfo table names).
    pub fn apply_wrap_hook(&self, ident: &str) -> String {
        match &self.wrap_identifier {
            Some(hook) => hook(ident, &|s: &str| s.to_string()),
            None => ident.to_string(),
        }
    }
}

impl std::fmt::Debug for FormatPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FormatPolicy")
            .field("value_for_undefined", &self.value_for_undefined)
            .field(
                "wrap_identifier",
                &self.wrap_identifier.as_ref().map(|_| "<fn>"),
            )
            .finish()
    }
}

/// Per-statement formatter: renders fragments and records bindings.
pub struct Formatter<'a> {
    dialect: &'a dyn SqlDialect,
    policy: &'a FormatPolicy,
    bindings: Vec<Value>,
}

impl<'a> Formatter<'a> {
    pub fn new(dialect: &'a dyn SqlDialect, policy: &'a FormatPolicy) -> Self {
        Self {
            dialect,
            policy,
            bindings: Vec::new(),
        }
    }

    /// Collected bindings, consuming the formatter.
    pub fn into_bindings(self) -> Vec<Value> {
        self.bindings
    }

    /// Wrap an identifier: handles `a as b` aliases and dotted paths, quotes
    /// each segment per the dialect, and routes segments through the
    /// caller's override hook when one is configured.
    pub fn wrap(&self, ident: &str) -> String {
        if let Some(pos) = find_as(ident) {
            let (first, rest) = ident.split_at(pos);
            let second = &rest[4..];
            return self
                .dialect
                .alias(&self.wrap(first.trim()), &self.wrap(second.trim()));
        }
        ident
            .split('.')
            .map(|segment| self.wrap_segment(segment))
            .collect::<Vec<_>>()
            .join(".")
    }

    fn wrap_segment(&self, segment: &str) -> String {
        let fallback = |s: &str| {
            if s == "*" {
                s.to_string()
            } else {
                self.dialect.quote_identifier(s)
            }
        };
        match &self.policy.wrap_identifier {
            Some(hook) => hook(segment, &fallback),
            None => fallback(segment),
        }
    }

    /// Comma-join one or more wrapped identifiers.
    pub fn columnize(&self, columns: &[String]) -> String {
        columns
            .iter()
            .map(|c| self.wrap(c))
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Comma-join wrapped identifiers each prefixed verbatim, for MSSQL's
    /// `output inserted."id"` lists.
    pub fn columnize_with_prefix(&self, prefix: &str, columns: &[String]) -> String {
        columns
            .iter()
            .map(|c| format!("{}{}", prefix, self.wrap(c)))
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Render `first as second` per the dialect.
    pub fn alias(&self, first: &str, second: &str) -> String {
        self.dialect.alias(first, second)
    }

    /// Record a binding and return its placeholder marker, or inline a raw
    /// fragment's SQL while absorbing its bindings.
    pub fn parameter(&mut self, value: &SqlValue) -> String {
        match value {
            SqlValue::Raw(raw) => self.raw(raw),
            SqlValue::Value(v) => self.parameter_value(v.clone()),
        }
    }

    /// Record one concrete value.
    pub fn parameter_value(&mut self, value: Value) -> String {
        self.bindings.push(self.dialect.prepare_binding(value));
        "?".to_string()
    }

    /// Placeholder for an unprovided insert cell, per the client policy:
    /// inline the default fragment, or bind NULL.
    pub fn undefined_parameter(&mut self) -> String {
        match self.policy.value_for_undefined.clone() {
            Some(raw) => self.raw(&raw),
            None => self.parameter_value(Value::Null),
        }
    }

    /// Comma-joined parameter list for one insert row.
    pub fn parameterize(&mut self, row: &[Option<SqlValue>]) -> String {
        row.iter()
            .map(|cell| match cell {
                Some(value) => self.parameter(value),
                None => self.undefined_parameter(),
            })
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Inline a raw fragment, absorbing its bindings in order.
    pub fn raw(&mut self, raw: &Raw) -> String {
        for v in &raw.bindings {
            self.bindings.push(self.dialect.prepare_binding(v.clone()));
        }
        raw.sql.clone()
    }

    pub fn dialect(&self) -> &'a dyn SqlDialect {
        self.dialect
    }

    pub fn policy(&self) -> &'a FormatPolicy {
        self.policy
    }

    /// Whether the default-value policy would inline SQL (rather than bind
    /// NULL) for an unprovided cell.
    pub fn inlines_undefined(&self) -> bool {
        self.policy.value_for_undefined.is_some()
    }
}

/// Find the ` as ` separator of an alias expression, case-insensitively,
/// returning the byte offset of the separator.
fn find_as(ident: &str) -> Option<usize> {
    let lower = ident.to_ascii_lowercase();
    lower.find(" as ")
}

/// Interpolate bindings into SQL for error decoration. Each unescaped `?`
/// consumes one binding rendered through the dialect's inline escaping;
/// `\?` becomes a literal question mark. Never used for driver execution.
pub fn format_query(dialect: &dyn SqlDialect, sql: &str, bindings: &[Value]) -> String {
    let mut out = String::with_capacity(sql.len());
    let mut next = 0usize;
    let mut chars = sql.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\\' if chars.peek() == Some(&'?') => {
                chars.next();
                out.push('?');
            }
            '?' => {
                match bindings.get(next) {
                    Some(v) => out.push_str(&dialect.escape_value(v)),
                    None => out.push('?'),
                }
                next += 1;
            }
            _ => out.push(c),
        }
    }
    out
}
