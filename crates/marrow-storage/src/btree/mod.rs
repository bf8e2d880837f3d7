//! Disk-backed B+ tree keyed by variable-length byte strings.
//!
//! The tree is organized over slotted pages in a single table file. Leaf
//! pages hold key/value records; internal pages hold separator keys, each
//! paired with its right child, with the leftmost child smuggled into the
//! page header's reserved bytes. Descent dispatches by binary search over
//! the separators; insertion splits full pages and propagates a separator
//! key upward, growing a new root when the old root splits.
//!
//! Everything is synchronous and single-threaded: every page mutated by an
//! insert is written back before the call returns, with no crash-atomic
//! grouping across those writes.

mod internal;
mod leaf;

use bytes::Bytes;
use marrow_common::config::StorageConfig;
use marrow_common::page::{PageHeader, PageId, PageLevel, PageType, PAGE_SIZE};
use marrow_common::{MarrowError, Result};
use tracing::debug;

use crate::record::{compare_keys, LeafRecord};
use crate::slotted::{SlottedPage, SLOT_SIZE};
use crate::table::TableHandle;

/// Maximum key size in bytes.
pub const MAX_KEY_SIZE: usize = 256;

/// Largest record that fits on an otherwise empty page.
const MAX_RECORD_SIZE: usize = PAGE_SIZE - PageHeader::SIZE - SLOT_SIZE;

/// A B+ tree over one table file.
pub struct BTree {
    handle: TableHandle,
}

impl BTree {
    /// Creates the table file backing a new, empty tree.
    pub fn create(config: &StorageConfig, name: &str) -> Result<()> {
        TableHandle::create(config, name)
    }

    /// Opens the tree over an existing table.
    pub fn open(config: &StorageConfig, name: &str) -> Result<Self> {
        Ok(Self {
            handle: TableHandle::open(config, name)?,
        })
    }

    /// Returns the underlying table handle.
    pub fn handle(&self) -> &TableHandle {
        &self.handle
    }

    /// Looks up a key, returning a copy of its value bytes.
    pub fn search(&self, key: &[u8]) -> Result<Option<Bytes>> {
        if self.handle.root_page() == 0 {
            return Ok(None);
        }

        let (_, leaf) = leaf::find_leaf(&self.handle, key)?;
        match leaf.search(key) {
            Ok(index) => Ok(Some(Bytes::copy_from_slice(leaf.slot_value(index)))),
            Err(_) => Ok(None),
        }
    }

    /// Inserts a key/value pair.
    ///
    /// Returns `Ok(false)` if the key already exists; the stored record is
    /// left unchanged. Errors abort the operation; after an error during a
    /// split the file may be left inconsistent.
    pub fn insert(&mut self, key: &[u8], value: &[u8]) -> Result<bool> {
        if key.len() > MAX_KEY_SIZE {
            return Err(MarrowError::KeyTooLarge {
                size: key.len(),
                max: MAX_KEY_SIZE,
            });
        }
        let record_size = LeafRecord::size_for(key.len(), value.len());
        if record_size > MAX_RECORD_SIZE {
            return Err(MarrowError::RecordTooLarge {
                size: record_size,
                max: MAX_RECORD_SIZE,
            });
        }

        let handle = &mut self.handle;

        // Empty tree: the first leaf becomes the root.
        if handle.root_page() == 0 {
            let root_id = handle.allocate_page();
            let mut root = SlottedPage::new(root_id, PageType::Data, PageLevel::Leaf);
            root.insert_record(key, value)?;
            handle.disk.write_page(root_id, root.as_bytes())?;
            handle.set_root_page(root_id)?;
            debug!(root = root_id, "created root leaf");
            return Ok(true);
        }

        let (leaf_id, mut leaf) = leaf::find_leaf(handle, key)?;
        if leaf.search(key).is_ok() {
            return Ok(false);
        }

        if leaf::insert_no_split(handle, leaf_id, &mut leaf, key, value)? {
            return Ok(true);
        }

        // Leaf is full: split it and route the new record to one side.
        let split = leaf::split_leaf_page(handle, &mut leaf)?;
        leaf.validate(leaf_id)?;
        handle.disk.write_page(leaf_id, leaf.as_bytes())?;

        let mut right = read_page(handle, split.new_page)?;
        let mut separator = if right.cell_count() > 0 {
            Bytes::copy_from_slice(right.slot_key(0))
        } else {
            split.separator.clone()
        };

        if compare_keys(key, &separator).is_lt() {
            if leaf.can_insert(record_size) {
                leaf.insert_record(key, value)?;
                handle.disk.write_page(leaf_id, leaf.as_bytes())?;
            } else if right.cell_count() == 0 && leaf.cell_count() == 1 {
                // The leaf held a single record too large to share a page:
                // move it right and keep the new record on the left, with
                // the moved record's key as separator.
                let moved_key =
                    relocate_single_record(handle, leaf_id, &mut leaf, &mut right, split.new_page)?;
                leaf.insert_record(key, value)?;
                handle.disk.write_page(leaf_id, leaf.as_bytes())?;
                internal::insert_into_parent(handle, leaf_id, &moved_key, split.new_page)?;
                return Ok(true);
            } else {
                return Err(MarrowError::Internal(
                    "left page out of space after leaf split".to_string(),
                ));
            }
        } else {
            if !right.can_insert(record_size) {
                return Err(MarrowError::Internal(
                    "right page out of space after leaf split".to_string(),
                ));
            }
            right.insert_record(key, value)?;
            handle.disk.write_page(split.new_page, right.as_bytes())?;
            // A previously empty right page (single-oversized-record split)
            // is now defined by the new record; the separator must follow
            // its first key or lookups for the left page's key would be
            // routed right.
            separator = Bytes::copy_from_slice(right.slot_key(0));
        }

        internal::insert_into_parent(handle, leaf_id, &separator, split.new_page)?;
        Ok(true)
    }

    /// Forces all pending writes to durable storage.
    pub fn flush(&self) -> Result<()> {
        self.handle.flush()
    }
}

/// Moves the sole record of `leaf` into the empty right sibling, rebuilding
/// the leaf empty. Returns the moved record's key, the new separator.
fn relocate_single_record(
    handle: &TableHandle,
    leaf_id: PageId,
    leaf: &mut SlottedPage,
    right: &mut SlottedPage,
    right_id: PageId,
) -> Result<Bytes> {
    let record = leaf.record_bytes(0).to_vec();
    let moved_key = Bytes::copy_from_slice(leaf.slot_key(0));

    let offset = right.write_raw_record(&record);
    right.insert_slot(0, offset);
    handle.disk.write_page(right_id, right.as_bytes())?;

    let mut empty = SlottedPage::new(leaf_id, PageType::Data, PageLevel::Leaf);
    empty.set_parent_page_id(leaf.parent_page_id());
    *leaf = empty;

    debug!(left = leaf_id, right = right_id, "relocated oversized record");
    Ok(moved_key)
}

/// Reads and validates one page.
pub(crate) fn read_page(handle: &TableHandle, page_id: PageId) -> Result<SlottedPage> {
    let mut buf = [0u8; PAGE_SIZE];
    handle.disk.read_page(page_id, &mut buf)?;
    let page = SlottedPage::from_bytes(buf);
    page.validate(page_id)?;
    Ok(page)
}

/// Result of splitting a page: the new right sibling and the separator key,
/// copied out of the page buffers so later mutations cannot invalidate it.
pub(crate) struct SplitResult {
    pub new_page: PageId,
    pub separator: Bytes,
}
