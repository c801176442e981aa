//! The owning cell collection.
//!
//! `CellMap` is the sole owner of all cells. It allocates ids, maintains
//! both sides of every parent/child edge, and enforces the occupancy
//! invariant (no two cells with overlapping footprints). Mutating layers go
//! through it; the sync layer treats its cell list as opaque payload.

use crate::cell::{Cell, CellId, CellKind};
use crate::error::{ModelError, ModelResult};
use crate::geometry::{GridPoint, GridRect, GridSize};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Owning collection of cells with monotonic id allocation.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CellMap {
    cells: BTreeMap<CellId, Cell>,
    next_id: u64,
}

impl CellMap {
    /// Create an empty collection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a collection holding a single seed headline at the origin.
    pub fn with_seed_cell(text: impl Into<String>) -> Self {
        let mut map = Self::new();
        let id = map.allocate_id();
        let cell = Cell::new(
            id,
            GridPoint::new(0, 0),
            GridSize::default(),
            text,
            CellKind::headline(),
        );
        map.cells.insert(id, cell);
        map
    }

    /// Rebuild a collection from a flat cell list (a sync pull). The id
    /// counter resumes above the highest id present so ids are never
    /// reused.
    pub fn from_cells(cells: Vec<Cell>) -> Self {
        let next_id = cells.iter().map(|c| c.id.value() + 1).max().unwrap_or(0);
        Self {
            cells: cells.into_iter().map(|c| (c.id, c)).collect(),
            next_id,
        }
    }

    /// Allocate the next cell id.
    pub fn allocate_id(&mut self) -> CellId {
        let id = CellId::new(self.next_id);
        self.next_id += 1;
        id
    }

    /// Insert a new cell at the given position, enforcing the occupancy
    /// invariant.
    pub fn insert(
        &mut self,
        position: GridPoint,
        size: GridSize,
        text: impl Into<String>,
        kind: CellKind,
    ) -> ModelResult<CellId> {
        let rect = GridRect::new(position, size);
        if let Some(occupied_by) = self.find_overlap(rect, None) {
            return Err(ModelError::Overlap {
                cell: CellId::new(self.next_id),
                occupied_by,
            });
        }
        let id = self.allocate_id();
        self.cells
            .insert(id, Cell::new(id, position, size, text, kind));
        Ok(id)
    }

    /// Remove a cell, detaching it from its parent and orphaning its
    /// children (children stay in the map with `parent = None`).
    pub fn remove(&mut self, id: CellId) -> ModelResult<Cell> {
        let cell = self.cells.remove(&id).ok_or(ModelError::CellNotFound(id))?;
        if let Some(parent_id) = cell.parent {
            if let Some(parent) = self.cells.get_mut(&parent_id) {
                parent.children.remove(&id);
                parent.touch();
            }
        }
        for child_id in &cell.children {
            if let Some(child) = self.cells.get_mut(child_id) {
                child.parent = None;
                child.touch();
            }
        }
        Ok(cell)
    }

    /// Make `child` a child of `parent`, detaching it from any previous
    /// parent first. Rejects cycles.
    pub fn attach(&mut self, parent: CellId, child: CellId) -> ModelResult<()> {
        if !self.cells.contains_key(&parent) {
            return Err(ModelError::CellNotFound(parent));
        }
        if !self.cells.contains_key(&child) {
            return Err(ModelError::CellNotFound(child));
        }
        if parent == child || self.is_ancestor(child, parent) {
            return Err(ModelError::CycleDetected { parent, child });
        }

        self.detach(child)?;

        if let Some(parent_cell) = self.cells.get_mut(&parent) {
            parent_cell.children.insert(child);
            parent_cell.touch();
        }
        if let Some(child_cell) = self.cells.get_mut(&child) {
            child_cell.parent = Some(parent);
            child_cell.touch();
        }
        Ok(())
    }

    /// Remove the edge between `child` and its parent, if any.
    pub fn detach(&mut self, child: CellId) -> ModelResult<()> {
        let parent = self
            .cells
            .get(&child)
            .ok_or(ModelError::CellNotFound(child))?
            .parent;
        if let Some(parent_id) = parent {
            if let Some(parent_cell) = self.cells.get_mut(&parent_id) {
                parent_cell.children.remove(&child);
                parent_cell.touch();
            }
            if let Some(child_cell) = self.cells.get_mut(&child) {
                child_cell.parent = None;
                child_cell.touch();
            }
        }
        Ok(())
    }

    /// Whether `ancestor` appears on the parent chain of `cell`.
    fn is_ancestor(&self, ancestor: CellId, cell: CellId) -> bool {
        let mut current = self.cells.get(&cell).and_then(|c| c.parent);
        while let Some(id) = current {
            if id == ancestor {
                return true;
            }
            current = self.cells.get(&id).and_then(|c| c.parent);
        }
        false
    }

    /// Move a cell to a new position, enforcing the occupancy invariant.
    pub fn move_cell(&mut self, id: CellId, position: GridPoint) -> ModelResult<()> {
        let size = self
            .cells
            .get(&id)
            .ok_or(ModelError::CellNotFound(id))?
            .size;
        let rect = GridRect::new(position, size);
        if let Some(occupied_by) = self.find_overlap(rect, Some(id)) {
            return Err(ModelError::Overlap {
                cell: id,
                occupied_by,
            });
        }
        if let Some(cell) = self.cells.get_mut(&id) {
            cell.position = position;
            cell.touch();
        }
        Ok(())
    }

    /// First cell whose footprint intersects `rect`, excluding `exclude`.
    pub fn find_overlap(&self, rect: GridRect, exclude: Option<CellId>) -> Option<CellId> {
        self.cells
            .values()
            .filter(|c| Some(c.id) != exclude)
            .find(|c| c.rect().intersects(&rect))
            .map(|c| c.id)
    }

    /// Apply the daily-task reset across the collection. Returns the number
    /// of cells that were reset.
    pub fn reset_daily_tasks(&mut self, today: NaiveDate) -> usize {
        self.cells
            .values_mut()
            .map(|c| c.reset_daily_tasks(today))
            .filter(|&reset| reset)
            .count()
    }

    pub fn get(&self, id: CellId) -> Option<&Cell> {
        self.cells.get(&id)
    }

    pub fn get_mut(&mut self, id: CellId) -> Option<&mut Cell> {
        self.cells.get_mut(&id)
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Cell> {
        self.cells.values()
    }

    /// Flat snapshot of all cells, ordered by id (the sync payload).
    pub fn to_cells(&self) -> Vec<Cell> {
        self.cells.values().cloned().collect()
    }

    /// Drop every cell. The id counter is NOT reset; ids stay unique
    /// within the session.
    pub fn clear(&mut self) {
        self.cells.clear();
    }
}
