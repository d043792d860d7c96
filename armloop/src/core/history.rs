//! Critique records and the per-run, append-only history fed back to the planner.

use std::sync::LazyLock;

use jsonschema::{Draft, Validator};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

/// JSON Schema for critic output (Draft 2020-12).
pub const CRITIQUE_SCHEMA: &str = include_str!("../../schemas/critique.schema.json");

static CRITIQUE_VALIDATOR: LazyLock<Validator> = LazyLock::new(|| {
    let schema: Value = serde_json::from_str(CRITIQUE_SCHEMA)
        .expect("embedded critique schema should be valid json");
    jsonschema::options()
        .with_draft(Draft::Draft202012)
        .build(&schema)
        .expect("embedded critique schema should compile")
});

/// Feedback produced after a failed attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Critique {
    /// One-sentence physical explanation of the failure.
    pub diagnosis: String,
    /// One-sentence corrective instruction for the next plan.
    pub suggestion: String,
}

impl Critique {
    pub fn new(diagnosis: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self {
            diagnosis: diagnosis.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Neutral critique used when the critic fails or returns garbage.
    pub fn placeholder() -> Self {
        Self::new("Unknown", "Retry")
    }

    /// Decode critic output, rejecting anything that does not match the schema.
    pub fn parse(raw: &str) -> Result<Self, String> {
        let value: Value = serde_json::from_str(raw).map_err(|err| err.to_string())?;
        let violations: Vec<String> = CRITIQUE_VALIDATOR
            .iter_errors(&value)
            .map(|err| err.to_string())
            .collect();
        if !violations.is_empty() {
            return Err(violations.join("; "));
        }
        serde_json::from_value(value).map_err(|err| err.to_string())
    }

    /// Decode critic output, falling back to [`Critique::placeholder`].
    pub fn parse_or_placeholder(raw: &str) -> Self {
        Self::parse(raw).unwrap_or_else(|err| {
            warn!(error = %err, "malformed critique; using placeholder");
            Self::placeholder()
        })
    }
}

/// Ordered critiques from every failed attempt in the current run.
///
/// Entries are only ever appended: nothing is truncated, deduplicated or
/// reordered, so the planner always sees the cumulative evidence.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CritiqueHistory {
    entries: Vec<Critique>,
}

impl CritiqueHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, critique: Critique) {
        self.entries.push(critique);
    }

    /// Full history in arrival order.
    pub fn snapshot(&self) -> &[Critique] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn last(&self) -> Option<&Critique> {
        self.entries.last()
    }
}
