//! Leaf-level B+ tree operations: descent, no-split insert, leaf split.

use bytes::Bytes;
use marrow_common::page::{PageId, PageLevel, PageType, INVALID_PAGE_ID};
use marrow_common::{MarrowError, Result};
use tracing::debug;

use super::{internal, read_page, SplitResult};
use crate::record::LeafRecord;
use crate::slotted::SlottedPage;
use crate::table::TableHandle;

/// Descent depth bound; exceeding it indicates a corrupt parent chain.
const MAX_DEPTH: usize = 100;

/// Walks from the root down to the leaf covering `key`.
pub(crate) fn find_leaf(handle: &TableHandle, key: &[u8]) -> Result<(PageId, SlottedPage)> {
    let mut page_id = handle.root_page();

    for _ in 0..MAX_DEPTH {
        let page = read_page(handle, page_id)?;
        if page.page_level()? == PageLevel::Leaf {
            return Ok((page_id, page));
        }

        let child = internal::find_child(&page, key)?;
        if child == 0 || child == INVALID_PAGE_ID {
            return Err(MarrowError::PageCorrupted {
                page_id,
                reason: format!("invalid child page id {}", child),
            });
        }
        page_id = child;
    }

    Err(MarrowError::TreeCorrupted(format!(
        "descent exceeded {} levels",
        MAX_DEPTH
    )))
}

/// Inserts into the leaf if it has room, writing the page back.
///
/// Returns `Ok(false)` without modifying the page when it is full.
pub(crate) fn insert_no_split(
    handle: &TableHandle,
    page_id: PageId,
    page: &mut SlottedPage,
    key: &[u8],
    value: &[u8],
) -> Result<bool> {
    if !page.can_insert(LeafRecord::size_for(key.len(), value.len())) {
        return Ok(false);
    }

    page.insert_record(key, value)?;
    page.validate(page_id)?;
    handle.disk.write_page(page_id, page.as_bytes())?;
    Ok(true)
}

/// Splits a full leaf: the upper half of its records moves to a freshly
/// allocated right sibling.
///
/// The separator key is the first key of the right page, or the sole key of
/// the left page when nothing moved (a single record too large to share a
/// page). The right page is written; the left page is rebuilt in place and
/// left for the caller to write.
pub(crate) fn split_leaf_page(
    handle: &mut TableHandle,
    page: &mut SlottedPage,
) -> Result<SplitResult> {
    assert_eq!(page.page_level()?, PageLevel::Leaf, "leaf split on a non-leaf page");
    page.validate(page.page_id())?;

    let total = page.cell_count();
    assert!(total >= 1, "cannot split an empty leaf");
    let split_index = (total / 2).max(1);

    let new_page_id = handle.allocate_page();
    let mut new_page = SlottedPage::new(new_page_id, PageType::Data, PageLevel::Leaf);
    new_page.set_parent_page_id(page.parent_page_id());

    for i in split_index..total {
        let offset = new_page.write_raw_record(page.record_bytes(i));
        let at = new_page.cell_count();
        new_page.insert_slot(at, offset);
    }

    // Rebuild the left page compactly from its surviving records, so the
    // caller's follow-up insert sees the reclaimed space.
    let mut left = SlottedPage::new(page.page_id(), PageType::Data, PageLevel::Leaf);
    left.set_parent_page_id(page.parent_page_id());
    for i in 0..split_index {
        let offset = left.write_raw_record(page.record_bytes(i));
        left.insert_slot(i, offset);
    }
    *page = left;

    let separator = if new_page.cell_count() > 0 {
        Bytes::copy_from_slice(new_page.slot_key(0))
    } else {
        Bytes::copy_from_slice(page.slot_key(0))
    };

    handle.disk.write_page(new_page_id, new_page.as_bytes())?;

    debug!(
        left = page.page_id(),
        right = new_page_id,
        moved = total - split_index,
        "split leaf page"
    );
    Ok(SplitResult {
        new_page: new_page_id,
        separator,
    })
}
