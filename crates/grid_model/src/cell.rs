//! Cells: positioned nodes on the grid.
//!
//! A cell is either a headline (a label/grouping node, optionally carrying
//! tracked minute entries) or a task list. Cells may nest: `parent` holds
//! the upward edge, `children` the downward edges; the owning `CellMap`
//! keeps the two sides consistent.

use crate::geometry::{GridPoint, GridRect, GridSize};
use crate::task::{MinuteEntry, Task};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Unique identifier of a cell.
///
/// Ids are assigned monotonically by the owning `CellMap` and never reused
/// within a session.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct CellId(pub u64);

impl CellId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for CellId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cell-{}", self.0)
    }
}

/// The payload variant of a cell.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CellKind {
    /// A label/grouping node, optionally accumulating tracked minutes.
    Headline {
        #[serde(default)]
        entries: Vec<MinuteEntry>,
    },
    /// An ordered task list. `daily` lists reset completion once per
    /// calendar day; `last_reset_date` records the last reset.
    TaskList {
        tasks: Vec<Task>,
        #[serde(default)]
        daily: bool,
        #[serde(default)]
        last_reset_date: Option<NaiveDate>,
    },
}

impl CellKind {
    /// An empty headline payload.
    pub fn headline() -> Self {
        CellKind::Headline {
            entries: Vec::new(),
        }
    }

    /// An empty non-daily task list payload.
    pub fn task_list() -> Self {
        CellKind::TaskList {
            tasks: Vec::new(),
            daily: false,
            last_reset_date: None,
        }
    }
}

/// A node on the grid.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Cell {
    pub id: CellId,
    pub position: GridPoint,
    pub size: GridSize,
    pub text: String,
    pub kind: CellKind,
    #[serde(default)]
    pub parent: Option<CellId>,
    #[serde(default)]
    pub children: BTreeSet<CellId>,
    pub updated_at: DateTime<Utc>,
}

impl Cell {
    /// Create a new cell with no parent and no children.
    pub fn new(
        id: CellId,
        position: GridPoint,
        size: GridSize,
        text: impl Into<String>,
        kind: CellKind,
    ) -> Self {
        Self {
            id,
            position,
            size,
            text: text.into(),
            kind,
            parent: None,
            children: BTreeSet::new(),
            updated_at: Utc::now(),
        }
    }

    /// The rectangular footprint this cell occupies.
    pub fn rect(&self) -> GridRect {
        GridRect::new(self.position, self.size)
    }

    /// Refresh the modification timestamp. Call after every mutation.
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// Append a minute entry. No-op for task-list cells.
    pub fn log_minutes(&mut self, minutes: u32) {
        if let CellKind::Headline { entries } = &mut self.kind {
            entries.push(MinuteEntry::new(minutes, Utc::now()));
            self.touch();
        }
    }

    /// Sum of all tracked minutes on a headline cell.
    pub fn total_minutes(&self) -> u32 {
        match &self.kind {
            CellKind::Headline { entries } => entries.iter().map(|e| e.minutes).sum(),
            CellKind::TaskList { .. } => 0,
        }
    }

    /// Un-complete all tasks of a daily list, at most once per calendar day.
    ///
    /// Returns true if a reset happened. Non-daily lists and headlines are
    /// never reset.
    pub fn reset_daily_tasks(&mut self, today: NaiveDate) -> bool {
        let reset = match &mut self.kind {
            CellKind::TaskList {
                tasks,
                daily: true,
                last_reset_date,
            } if *last_reset_date != Some(today) => {
                for task in tasks.iter_mut() {
                    task.completed = false;
                }
                *last_reset_date = Some(today);
                true
            }
            _ => false,
        };
        if reset {
            self.touch();
        }
        reset
    }
}
