//! Configuration structures for MarrowDB.

use crate::page::PAGE_SIZE;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Storage configuration for the database engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory for table files.
    pub data_dir: PathBuf,
    /// Page size in bytes.
    pub page_size: usize,
    /// Enable fsync after page writes.
    pub fsync_enabled: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            page_size: PAGE_SIZE,
            fsync_enabled: true,
        }
    }
}

impl StorageConfig {
    /// Returns the path of the file backing the named table.
    pub fn table_path(&self, name: &str) -> PathBuf {
        self.data_dir.join(format!("{}.tbl", name))
    }
}
