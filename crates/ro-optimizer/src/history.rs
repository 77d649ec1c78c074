//! Append-only per-iteration trace.

use chrono::{DateTime, Utc};
use ro_types::ParameterVector;
use serde::{Deserialize, Serialize};

/// Snapshot of one completed iteration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub iteration: usize,
    pub parameters: ParameterVector,
    /// Only set by the gradient family.
    pub gradient_norm: Option<f64>,
    pub value: f64,
    /// Backend reference of the evaluation `value` came from.
    pub reference: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

impl HistoryEntry {
    pub fn new(iteration: usize, parameters: &[f64], value: f64) -> Self {
        Self {
            iteration,
            parameters: parameters.to_vec(),
            gradient_norm: None,
            value,
            reference: None,
            recorded_at: Utc::now(),
        }
    }

    pub fn with_gradient_norm(mut self, norm: f64) -> Self {
        self.gradient_norm = Some(norm);
        self
    }

    pub fn with_reference(mut self, reference: Option<String>) -> Self {
        self.reference = reference;
        self
    }
}

/// Entries are only ever appended; nothing hands out mutable access to them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct History {
    entries: Vec<HistoryEntry>,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, entry: HistoryEntry) {
        self.entries.push(entry);
    }

    pub fn entries(&self) -> &[HistoryEntry] {
        &self.entries
    }

    pub fn last(&self) -> Option<&HistoryEntry> {
        self.entries.last()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Objective values in iteration order.
    pub fn values(&self) -> Vec<f64> {
        self.entries.iter().map(|e| e.value).collect()
    }
}
