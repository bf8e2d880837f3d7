//! Table handles: per-table control blocks owning the disk manager.

use marrow_common::config::StorageConfig;
use marrow_common::page::{PageId, PageLevel, PageType, META_PAGE_ID, PAGE_SIZE};
use marrow_common::{MarrowError, Result};
use tracing::debug;

use crate::disk::DiskManager;
use crate::slotted::SlottedPage;

/// In-memory control block for one open table.
///
/// Owns the disk manager for the table file and caches the metadata stored
/// on the meta page: the root page id and the next free page id. After any
/// structural change the cached root must equal the root recorded on disk.
#[derive(Debug)]
pub struct TableHandle {
    name: String,
    pub(crate) disk: DiskManager,
    root_page: PageId,
    next_free_page: PageId,
}

impl TableHandle {
    /// Creates a new table file and initializes its meta page with an unset
    /// root.
    pub fn create(config: &StorageConfig, name: &str) -> Result<()> {
        let path = config.table_path(name);
        if path.exists() {
            return Err(MarrowError::TableAlreadyExists(name.to_string()));
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let disk = DiskManager::open(&path, config.fsync_enabled)?;
        let meta = SlottedPage::new(META_PAGE_ID, PageType::Meta, PageLevel::Leaf);
        disk.write_page(META_PAGE_ID, meta.as_bytes())?;

        debug!(table = name, "created table");
        Ok(())
    }

    /// Opens an existing table, reading the root page id from the meta page.
    pub fn open(config: &StorageConfig, name: &str) -> Result<Self> {
        let path = config.table_path(name);
        if !path.exists() {
            return Err(MarrowError::TableNotFound(name.to_string()));
        }

        let disk = DiskManager::open(&path, config.fsync_enabled)?;
        let mut buf = [0u8; PAGE_SIZE];
        disk.read_page(META_PAGE_ID, &mut buf)?;
        let meta = SlottedPage::from_bytes(buf);
        meta.validate(META_PAGE_ID)?;

        let root_page = meta.root_page();
        let next_free_page = disk.num_pages().max(1);

        debug!(table = name, root_page, "opened table");
        Ok(Self {
            name: name.to_string(),
            disk,
            root_page,
            next_free_page,
        })
    }

    /// Table name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The disk manager owning this table's file.
    pub fn disk(&self) -> &DiskManager {
        &self.disk
    }

    /// Cached root page id; 0 when the tree is empty.
    pub fn root_page(&self) -> PageId {
        self.root_page
    }

    /// Allocates a fresh page id. Pages are never deallocated.
    pub fn allocate_page(&mut self) -> PageId {
        let page_id = self.next_free_page;
        self.next_free_page += 1;
        page_id
    }

    /// Records a new root page id on the meta page and in the cache.
    pub(crate) fn set_root_page(&mut self, root: PageId) -> Result<()> {
        let mut buf = [0u8; PAGE_SIZE];
        self.disk.read_page(META_PAGE_ID, &mut buf)?;
        let mut meta = SlottedPage::from_bytes(buf);
        meta.validate(META_PAGE_ID)?;
        meta.set_root_page(root);
        self.disk.write_page(META_PAGE_ID, meta.as_bytes())?;
        self.root_page = root;
        Ok(())
    }

    /// Forces all pending writes to durable storage.
    pub fn flush(&self) -> Result<()> {
        self.disk.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn test_config() -> (StorageConfig, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let config = StorageConfig {
            data_dir: dir.path().to_path_buf(),
            fsync_enabled: false,
            ..Default::default()
        };
        (config, dir)
    }

    #[test]
    fn test_create_and_open() {
        let (config, _dir) = test_config();

        TableHandle::create(&config, "users").unwrap();
        let handle = TableHandle::open(&config, "users").unwrap();

        assert_eq!(handle.name(), "users");
        assert_eq!(handle.root_page(), 0);
    }

    #[test]
    fn test_create_twice_fails() {
        let (config, _dir) = test_config();

        TableHandle::create(&config, "users").unwrap();
        let err = TableHandle::create(&config, "users").unwrap_err();
        assert!(matches!(err, MarrowError::TableAlreadyExists(_)));
    }

    #[test]
    fn test_open_missing_fails() {
        let (config, _dir) = test_config();

        let err = TableHandle::open(&config, "ghost").unwrap_err();
        assert!(matches!(err, MarrowError::TableNotFound(_)));
    }

    #[test]
    fn test_allocate_page_is_monotonic() {
        let (config, _dir) = test_config();

        TableHandle::create(&config, "t").unwrap();
        let mut handle = TableHandle::open(&config, "t").unwrap();

        // Page 0 is the meta page; allocation starts at 1.
        assert_eq!(handle.allocate_page(), 1);
        assert_eq!(handle.allocate_page(), 2);
        assert_eq!(handle.allocate_page(), 3);
    }

    #[test]
    fn test_set_root_page_persists() {
        let (config, _dir) = test_config();

        TableHandle::create(&config, "t").unwrap();
        let mut handle = TableHandle::open(&config, "t").unwrap();
        handle.set_root_page(5).unwrap();
        assert_eq!(handle.root_page(), 5);
        drop(handle);

        let reopened = TableHandle::open(&config, "t").unwrap();
        assert_eq!(reopened.root_page(), 5);
    }
}
