//! On-device storage backends.
//!
//! Two `LocalStore` backends:
//!
//! - `MemoryLocalStore`: `RwLock`-backed, for tests and development. No
//!   persistence; data is lost on restart.
//! - `FileLocalStore`: JSON files under a data directory, written
//!   atomically (temp file then rename) so a crash mid-write never leaves
//!   a torn collection on disk.

use crate::error::SyncResult;
use crate::store::{CellStore, MetadataStore};
use grid_model::Cell;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::RwLock;
use tokio::sync::Mutex;

/// In-memory `LocalStore` implementation.
///
/// Thread-safe and shareable via `Arc`. Tracks how many cell-collection
/// writes actually reached it, which the debounce tests use to assert
/// coalescing.
#[derive(Default)]
pub struct MemoryLocalStore {
    cells: RwLock<Vec<Cell>>,
    scalars: RwLock<HashMap<String, String>>,
    cell_saves: AtomicUsize,
}

impl MemoryLocalStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `save_cells` calls that reached this store.
    pub fn cell_save_count(&self) -> usize {
        self.cell_saves.load(Ordering::SeqCst)
    }
}

impl CellStore for MemoryLocalStore {
    async fn load_cells(&self) -> SyncResult<Vec<Cell>> {
        Ok(self.cells.read().unwrap().clone())
    }

    async fn save_cells(&self, cells: &[Cell]) -> SyncResult<()> {
        self.cell_saves.fetch_add(1, Ordering::SeqCst);
        *self.cells.write().unwrap() = cells.to_vec();
        Ok(())
    }
}

impl MetadataStore for MemoryLocalStore {
    async fn get_scalar(&self, key: &str) -> SyncResult<Option<String>> {
        Ok(self.scalars.read().unwrap().get(key).cloned())
    }

    async fn set_scalar(&self, key: &str, value: &str) -> SyncResult<()> {
        self.scalars
            .write()
            .unwrap()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove_scalar(&self, key: &str) -> SyncResult<()> {
        self.scalars.write().unwrap().remove(key);
        Ok(())
    }
}

/// File-backed `LocalStore` implementation.
///
/// # Layout
///
/// ```text
/// {data_dir}/
/// ├── {storage_key}.json       # JSON array of Cell
/// └── {storage_key}.meta.json  # JSON map of metadata scalars
/// ```
///
/// All writes go through a temp file followed by a rename. An internal
/// mutex serializes access so a scalar read-modify-write never races a
/// concurrent writer in the same process.
pub struct FileLocalStore {
    data_dir: PathBuf,
    storage_key: String,
    io_lock: Mutex<()>,
}

impl FileLocalStore {
    pub fn new(data_dir: impl Into<PathBuf>, storage_key: impl Into<String>) -> Self {
        Self {
            data_dir: data_dir.into(),
            storage_key: storage_key.into(),
            io_lock: Mutex::new(()),
        }
    }

    /// Path of the cell collection file.
    pub fn cells_path(&self) -> PathBuf {
        self.data_dir.join(format!("{}.json", self.storage_key))
    }

    /// Path of the metadata scalars file.
    pub fn scalars_path(&self) -> PathBuf {
        self.data_dir
            .join(format!("{}.meta.json", self.storage_key))
    }

    async fn write_atomic(&self, path: &Path, contents: String) -> SyncResult<()> {
        tokio::fs::create_dir_all(&self.data_dir).await?;
        let tmp = path.with_extension("tmp");
        tokio::fs::write(&tmp, contents).await?;
        tokio::fs::rename(&tmp, path).await?;
        Ok(())
    }

    async fn read_scalars(&self) -> SyncResult<HashMap<String, String>> {
        match tokio::fs::read_to_string(self.scalars_path()).await {
            Ok(data) => Ok(serde_json::from_str(&data)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(HashMap::new()),
            Err(e) => Err(e.into()),
        }
    }
}

impl CellStore for FileLocalStore {
    async fn load_cells(&self) -> SyncResult<Vec<Cell>> {
        let _guard = self.io_lock.lock().await;
        match tokio::fs::read_to_string(self.cells_path()).await {
            Ok(data) => Ok(serde_json::from_str(&data)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    async fn save_cells(&self, cells: &[Cell]) -> SyncResult<()> {
        let _guard = self.io_lock.lock().await;
        let json = serde_json::to_string_pretty(cells)?;
        self.write_atomic(&self.cells_path(), json).await
    }
}

impl MetadataStore for FileLocalStore {
    async fn get_scalar(&self, key: &str) -> SyncResult<Option<String>> {
        let _guard = self.io_lock.lock().await;
        Ok(self.read_scalars().await?.get(key).cloned())
    }

    async fn set_scalar(&self, key: &str, value: &str) -> SyncResult<()> {
        let _guard = self.io_lock.lock().await;
        let mut scalars = self.read_scalars().await?;
        scalars.insert(key.to_string(), value.to_string());
        let json = serde_json::to_string_pretty(&scalars)?;
        self.write_atomic(&self.scalars_path(), json).await
    }

    async fn remove_scalar(&self, key: &str) -> SyncResult<()> {
        let _guard = self.io_lock.lock().await;
        let mut scalars = self.read_scalars().await?;
        if scalars.remove(key).is_some() {
            let json = serde_json::to_string_pretty(&scalars)?;
            self.write_atomic(&self.scalars_path(), json).await?;
        }
        Ok(())
    }
}
