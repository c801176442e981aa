//! Error types for the grid model crate.

use crate::cell::CellId;
use thiserror::Error;

/// Result type alias for model operations.
pub type ModelResult<T> = Result<T, ModelError>;

/// Errors that can occur while mutating the cell collection.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ModelError {
    /// A cell id was not present in the collection.
    #[error("Cell not found: {0}")]
    CellNotFound(CellId),

    /// Attaching a cell under itself or one of its descendants.
    #[error("Cycle detected: {child} cannot be a child of {parent}")]
    CycleDetected { parent: CellId, child: CellId },

    /// Placing a cell would overlap an existing cell's footprint.
    #[error("Footprint of {cell} overlaps existing cell {occupied_by}")]
    Overlap { cell: CellId, occupied_by: CellId },
}
