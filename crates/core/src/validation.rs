//! Structured validation reports (field → violations).
//!
//! Records are validated before any write is attempted. A report collects every
//! violation instead of stopping at the first one, so callers can surface all
//! problems with a submitted record at once.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Kind of constraint a field value failed.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationKind {
    /// Required value missing or blank.
    Blank,
    /// Value collides with an already persisted record.
    Taken,
    /// Numeric value below zero.
    Negative,
    /// Value present but malformed or out of range.
    Invalid,
}

impl ViolationKind {
    /// Default human-readable message for this kind.
    pub fn default_message(self) -> &'static str {
        match self {
            ViolationKind::Blank => "can't be blank",
            ViolationKind::Taken => "has already been taken",
            ViolationKind::Negative => "must be greater than or equal to 0",
            ViolationKind::Invalid => "is invalid",
        }
    }
}

/// One failed constraint on one field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation {
    pub kind: ViolationKind,
    pub message: String,
}

impl Violation {
    pub fn new(kind: ViolationKind) -> Self {
        Self {
            kind,
            message: kind.default_message().to_string(),
        }
    }

    pub fn with_message(kind: ViolationKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// Collection of violations keyed by field name.
///
/// Field order is deterministic (sorted), violation order within a field is
/// insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ValidationErrors {
    fields: BTreeMap<String, Vec<Violation>>,
}

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Report with a single violation.
    pub fn single(field: impl Into<String>, kind: ViolationKind) -> Self {
        let mut errors = Self::new();
        errors.add(field, kind);
        errors
    }

    pub fn add(&mut self, field: impl Into<String>, kind: ViolationKind) {
        self.push(field, Violation::new(kind));
    }

    pub fn push(&mut self, field: impl Into<String>, violation: Violation) {
        self.fields.entry(field.into()).or_default().push(violation);
    }

    /// Merge another report into this one.
    pub fn extend(&mut self, other: ValidationErrors) {
        for (field, violations) in other.fields {
            self.fields.entry(field).or_default().extend(violations);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Number of fields with at least one violation.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Whether `field` has any violation.
    pub fn contains(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    /// Whether `field` has a violation of the given kind.
    pub fn has(&self, field: &str, kind: ViolationKind) -> bool {
        self.violations(field).iter().any(|v| v.kind == kind)
    }

    pub fn violations(&self, field: &str) -> &[Violation] {
        self.fields.get(field).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn messages_for(&self, field: &str) -> Vec<&str> {
        self.violations(field).iter().map(|v| v.message.as_str()).collect()
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    /// `Ok(())` for an empty report, otherwise the report itself as the error.
    pub fn into_result(self) -> Result<(), ValidationErrors> {
        if self.is_empty() { Ok(()) } else { Err(self) }
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (field, violations) in &self.fields {
            for v in violations {
                if !first {
                    f.write_str(", ")?;
                }
                write!(f, "{field} {}", v.message)?;
                first = false;
            }
        }
        Ok(())
    }
}

impl std::error::Error for ValidationErrors {}
