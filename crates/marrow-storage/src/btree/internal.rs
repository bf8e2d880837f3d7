//! Internal-level B+ tree operations: child dispatch, separator insertion,
//! internal split, parent propagation, root creation.

use bytes::Bytes;
use marrow_common::page::{PageId, PageLevel, PageType, INVALID_PAGE_ID};
use marrow_common::{MarrowError, Result};
use tracing::debug;

use super::{read_page, SplitResult};
use crate::record::{compare_keys, InternalEntry};
use crate::slotted::SlottedPage;
use crate::table::TableHandle;

/// Resolves the child page to descend into for `key`.
///
/// Each entry pairs a separator key with its RIGHT child (the subtree for
/// keys greater than or equal to it); the leftmost child lives in the page
/// header's reserved bytes.
pub(crate) fn find_child(page: &SlottedPage, key: &[u8]) -> Result<PageId> {
    debug_assert_eq!(page.page_level()?, PageLevel::Internal);

    if page.cell_count() == 0 {
        return Err(MarrowError::PageCorrupted {
            page_id: page.page_id(),
            reason: "internal page with no entries".to_string(),
        });
    }

    match page.search(key) {
        // Exact separator match: the key belongs to the right subtree.
        Ok(index) => Ok(page.child_at(index)),
        // Below every separator: leftmost child.
        Err(0) => Ok(page.leftmost_child()),
        // Between separators pos-1 and pos, or past the last one.
        Err(pos) => Ok(page.child_at(pos - 1)),
    }
}

/// Inserts a (separator, right child) entry at its sorted position.
///
/// Fails with `NodeFull` when the entry does not fit and `DuplicateKey`
/// when the separator is already present.
pub(crate) fn insert_no_split(page: &mut SlottedPage, key: &[u8], child: PageId) -> Result<()> {
    debug_assert_eq!(page.page_level()?, PageLevel::Internal);

    let entry = InternalEntry::new(Bytes::copy_from_slice(key), child);
    if !page.can_insert(entry.size_on_disk()) {
        return Err(MarrowError::NodeFull);
    }

    let index = match page.search(key) {
        Ok(_) => return Err(MarrowError::DuplicateKey),
        Err(index) => index,
    };

    let offset = page.write_raw_record(&entry.to_bytes());
    page.insert_slot(index, offset);
    Ok(())
}

/// Splits a full internal page around its middle entry.
///
/// Entries above the middle move to a freshly allocated right sibling whose
/// leftmost child becomes the middle entry's right child; the middle entry's
/// key is lifted out as the separator. Every child that moved, the new
/// leftmost included, is reparented to the new page. The right page is
/// written; the left page is rebuilt in place for the caller to write.
pub(crate) fn split_internal_page(
    handle: &mut TableHandle,
    page: &mut SlottedPage,
) -> Result<SplitResult> {
    assert_eq!(
        page.page_level()?,
        PageLevel::Internal,
        "internal split on a non-internal page"
    );

    let total = page.cell_count();
    assert!(
        total >= 2,
        "cannot split an internal page with fewer than two entries"
    );
    let mid = total / 2;

    // Copy the separator out before any mutation invalidates the borrow.
    let separator = Bytes::copy_from_slice(page.slot_key(mid));

    let new_page_id = handle.allocate_page();
    let mut new_page = SlottedPage::new(new_page_id, PageType::Index, PageLevel::Internal);
    new_page.set_parent_page_id(page.parent_page_id());
    new_page.set_leftmost_child(page.child_at(mid));

    for i in mid + 1..total {
        let offset = new_page.write_raw_record(page.record_bytes(i));
        let at = new_page.cell_count();
        new_page.insert_slot(at, offset);
    }

    // Children now living under the new page must name it as their parent.
    reparent(handle, page.child_at(mid), new_page_id)?;
    for i in mid + 1..total {
        reparent(handle, page.child_at(i), new_page_id)?;
    }

    // Rebuild the left page compactly with entries below the separator.
    let mut left = SlottedPage::new(page.page_id(), PageType::Index, PageLevel::Internal);
    left.set_parent_page_id(page.parent_page_id());
    left.set_leftmost_child(page.leftmost_child());
    for i in 0..mid {
        let offset = left.write_raw_record(page.record_bytes(i));
        left.insert_slot(i, offset);
    }
    *page = left;

    handle.disk.write_page(new_page_id, new_page.as_bytes())?;

    debug!(
        left = page.page_id(),
        right = new_page_id,
        "split internal page"
    );
    Ok(SplitResult {
        new_page: new_page_id,
        separator,
    })
}

/// Grows the tree by one level: a new internal root with `left` as its
/// leftmost child and a single (key, right) entry.
pub(crate) fn create_new_root(
    handle: &mut TableHandle,
    left: PageId,
    key: &[u8],
    right: PageId,
) -> Result<()> {
    let root_id = handle.allocate_page();

    let mut root = SlottedPage::new(root_id, PageType::Index, PageLevel::Internal);
    root.set_leftmost_child(left);
    insert_no_split(&mut root, key, right)?;

    handle.set_root_page(root_id)?;
    handle.disk.write_page(root_id, root.as_bytes())?;

    for child_id in [left, right] {
        reparent(handle, child_id, root_id)?;
    }

    debug!(root = root_id, left, right, "created new root");
    Ok(())
}

/// Records a split in the parent of `left`: the separator `key` with `right`
/// as its right child.
///
/// With no parent, a new root is created. A parent that cannot be read as an
/// internal page, or that already holds the separator, is an illegal state;
/// both fall back to creating a new root. A full parent is split and the
/// propagation recurses.
pub(crate) fn insert_into_parent(
    handle: &mut TableHandle,
    left: PageId,
    key: &[u8],
    right: PageId,
) -> Result<()> {
    let left_page = read_page(handle, left)?;
    let parent_id = left_page.parent_page_id();

    if parent_id == 0 || parent_id == INVALID_PAGE_ID {
        return create_new_root(handle, left, key, right);
    }

    let mut parent = read_page(handle, parent_id)?;
    if parent.page_level()? != PageLevel::Internal {
        return create_new_root(handle, left, key, right);
    }

    let index = match parent.search(key) {
        Ok(_) => return create_new_root(handle, left, key, right),
        Err(index) => index,
    };

    // Inserting in front of every separator makes `left` the leftmost child.
    if index == 0 {
        parent.set_leftmost_child(left);
    }

    match insert_no_split(&mut parent, key, right) {
        Ok(()) => {
            handle.disk.write_page(parent_id, parent.as_bytes())?;
            return Ok(());
        }
        Err(MarrowError::NodeFull) => {}
        Err(e) => return Err(e),
    }

    // The parent is full: split it, route the pending entry into whichever
    // half now covers its key range, then propagate the lifted separator.
    let split = split_internal_page(handle, &mut parent)?;

    if compare_keys(key, &split.separator).is_lt() {
        insert_no_split(&mut parent, key, right)?;
        handle.disk.write_page(parent_id, parent.as_bytes())?;
    } else {
        handle.disk.write_page(parent_id, parent.as_bytes())?;
        let mut new_parent = read_page(handle, split.new_page)?;
        insert_no_split(&mut new_parent, key, right)?;
        handle.disk.write_page(split.new_page, new_parent.as_bytes())?;
        reparent(handle, right, split.new_page)?;
    }

    insert_into_parent(handle, parent_id, &split.separator, split.new_page)
}

/// Rewrites a child page's parent pointer.
fn reparent(handle: &TableHandle, child_id: PageId, parent_id: PageId) -> Result<()> {
    let mut child = read_page(handle, child_id)?;
    child.set_parent_page_id(parent_id);
    handle.disk.write_page(child_id, child.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn internal_page(leftmost: PageId, entries: &[(&[u8], PageId)]) -> SlottedPage {
        let mut page = SlottedPage::new(3, PageType::Index, PageLevel::Internal);
        page.set_leftmost_child(leftmost);
        for (key, child) in entries {
            insert_no_split(&mut page, key, *child).unwrap();
        }
        page
    }

    #[test]
    fn test_find_child_dispatch() {
        let page = internal_page(10, &[(b"g", 11), (b"p", 12)]);

        // Below every separator.
        assert_eq!(find_child(&page, b"a").unwrap(), 10);
        // Equal to a separator goes right.
        assert_eq!(find_child(&page, b"g").unwrap(), 11);
        // Between separators.
        assert_eq!(find_child(&page, b"m").unwrap(), 11);
        // Past the last separator.
        assert_eq!(find_child(&page, b"z").unwrap(), 12);
    }

    #[test]
    fn test_find_child_empty_page_is_corruption() {
        let page = SlottedPage::new(3, PageType::Index, PageLevel::Internal);
        assert!(find_child(&page, b"a").is_err());
    }

    #[test]
    fn test_insert_no_split_sorted_and_duplicate() {
        let mut page = internal_page(1, &[(b"m", 2)]);
        insert_no_split(&mut page, b"d", 3).unwrap();
        insert_no_split(&mut page, b"t", 4).unwrap();

        assert_eq!(page.slot_key(0), b"d");
        assert_eq!(page.slot_key(1), b"m");
        assert_eq!(page.slot_key(2), b"t");

        let err = insert_no_split(&mut page, b"m", 9).unwrap_err();
        assert!(matches!(err, MarrowError::DuplicateKey));
    }
}
