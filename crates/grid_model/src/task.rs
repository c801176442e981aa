//! Tasks and time entries carried by cells.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single task inside a task-list cell.
///
/// Task ids are unique within their owning cell's list, not globally.
/// `cost` is a non-negative effort estimate in whatever unit the user
/// tracks (hours, points); negative input is clamped to zero at
/// construction so downstream sums never go negative.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: u32,
    pub text: String,
    pub completed: bool,
    pub cost: f64,
}

impl Task {
    /// Create a new incomplete task. Negative cost is clamped to zero.
    pub fn new(id: u32, text: impl Into<String>, cost: f64) -> Self {
        Self {
            id,
            text: text.into(),
            completed: false,
            cost: cost.max(0.0),
        }
    }

    /// Set the cost, clamping negative input to zero.
    pub fn set_cost(&mut self, cost: f64) {
        self.cost = cost.max(0.0);
    }
}

/// A timestamped minute entry on a headline cell.
///
/// Headlines can accumulate tracked minutes over time; each entry records
/// how many minutes and when they were logged.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MinuteEntry {
    pub minutes: u32,
    pub at: DateTime<Utc>,
}

impl MinuteEntry {
    pub fn new(minutes: u32, at: DateTime<Utc>) -> Self {
        Self { minutes, at }
    }
}
