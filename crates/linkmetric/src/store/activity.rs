//! Append-only activity log. Every state transition, retry, and failure
//! lands here so an operator can reconstruct the causal trace per attempt.

use crate::pipeline::domain::{AttemptId, CustomerId};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LogStatus {
    Success,
    Error,
    Info,
}

#[derive(Debug, Clone, Serialize)]
pub struct ActivityLogEntry {
    pub timestamp: DateTime<Utc>,
    pub attempt_id: Option<AttemptId>,
    pub customer_id: Option<CustomerId>,
    pub event_type: String,
    pub status: LogStatus,
    pub message: String,
}

/// Shared append-only sink. Entries are never mutated or deleted; insertion
/// order is timestamp order.
#[derive(Debug, Clone, Default)]
pub struct ActivityLog {
    entries: Arc<Mutex<Vec<ActivityLogEntry>>>,
}

impl ActivityLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(
        &self,
        attempt_id: Option<AttemptId>,
        customer_id: Option<CustomerId>,
        event_type: &str,
        status: LogStatus,
        message: String,
    ) {
        let entry = ActivityLogEntry {
            timestamp: Utc::now(),
            attempt_id,
            customer_id,
            event_type: event_type.to_string(),
            status,
            message,
        };
        self.entries
            .lock()
            .expect("activity log mutex poisoned")
            .push(entry);
    }

    /// The most recent `limit` entries, oldest first.
    pub fn recent(&self, limit: usize) -> Vec<ActivityLogEntry> {
        let entries = self.entries.lock().expect("activity log mutex poisoned");
        let start = entries.len().saturating_sub(limit);
        entries[start..].to_vec()
    }

    /// Full trace for one attempt, oldest first.
    pub fn for_attempt(&self, attempt_id: AttemptId) -> Vec<ActivityLogEntry> {
        let entries = self.entries.lock().expect("activity log mutex poisoned");
        entries
            .iter()
            .filter(|entry| entry.attempt_id == Some(attempt_id))
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().expect("activity log mutex poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
