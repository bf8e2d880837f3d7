//! Record layouts stored inside slotted pages.

use bytes::{Bytes, BytesMut};
use marrow_common::page::PageId;

/// Size of the fixed prefix of a leaf record (key_size + value_size).
pub const LEAF_RECORD_HEADER: usize = 4;

/// Size of the fixed prefix of an internal entry (key_size + child_page).
pub const INTERNAL_ENTRY_HEADER: usize = 6;

/// Key comparison: lexicographic over raw bytes, so a shorter key sorts
/// before any key it prefixes (`"ab" < "abc" < "b"`).
///
/// Keys in this engine are short byte strings, so most comparisons are
/// settled inside the first word. When both keys carry a full 8-byte
/// prefix it is compared as one big-endian integer (which preserves byte
/// order) and only tying tails fall back to the byte loop.
#[inline]
pub fn compare_keys(a: &[u8], b: &[u8]) -> std::cmp::Ordering {
    if let (Some(head_a), Some(head_b)) = (a.first_chunk::<8>(), b.first_chunk::<8>()) {
        return u64::from_be_bytes(*head_a)
            .cmp(&u64::from_be_bytes(*head_b))
            .then_with(|| a[8..].cmp(&b[8..]));
    }
    a.cmp(b)
}

/// A key/value record in a leaf page.
///
/// Packed layout: `key_size: u16 | value_size: u16 | key | value`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeafRecord {
    /// The key bytes.
    pub key: Bytes,
    /// The value bytes.
    pub value: Bytes,
}

impl LeafRecord {
    /// Creates a new leaf record.
    pub fn new(key: Bytes, value: Bytes) -> Self {
        Self { key, value }
    }

    /// On-disk size for a record with the given key and value lengths.
    pub fn size_for(key_len: usize, value_len: usize) -> usize {
        LEAF_RECORD_HEADER + key_len + value_len
    }

    /// Size of this record on disk.
    pub fn size_on_disk(&self) -> usize {
        Self::size_for(self.key.len(), self.value.len())
    }

    /// Serializes the record to bytes.
    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.size_on_disk());
        buf.extend_from_slice(&(self.key.len() as u16).to_le_bytes());
        buf.extend_from_slice(&(self.value.len() as u16).to_le_bytes());
        buf.extend_from_slice(&self.key);
        buf.extend_from_slice(&self.value);
        buf.freeze()
    }

    /// Deserializes a record from bytes. Returns (record, bytes_consumed).
    pub fn from_bytes(buf: &[u8]) -> Option<(Self, usize)> {
        if buf.len() < LEAF_RECORD_HEADER {
            return None;
        }

        let key_len = u16::from_le_bytes([buf[0], buf[1]]) as usize;
        let value_len = u16::from_le_bytes([buf[2], buf[3]]) as usize;
        let total = LEAF_RECORD_HEADER + key_len + value_len;
        if buf.len() < total {
            return None;
        }

        let key = Bytes::copy_from_slice(&buf[LEAF_RECORD_HEADER..LEAF_RECORD_HEADER + key_len]);
        let value = Bytes::copy_from_slice(&buf[LEAF_RECORD_HEADER + key_len..total]);
        Some((Self { key, value }, total))
    }
}

/// A separator-key entry in an internal page.
///
/// Packed layout: `key_size: u16 | child_page: u32 | key`. The child is the
/// RIGHT child of the key: the subtree holding keys greater than or equal
/// to it. The leftmost child of an internal page lives in the page header's
/// reserved bytes, not in an entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InternalEntry {
    /// The separator key bytes.
    pub key: Bytes,
    /// The right child of the key.
    pub child_page: PageId,
}

impl InternalEntry {
    /// Creates a new internal entry.
    pub fn new(key: Bytes, child_page: PageId) -> Self {
        Self { key, child_page }
    }

    /// On-disk size for an entry with the given key length.
    pub fn size_for(key_len: usize) -> usize {
        INTERNAL_ENTRY_HEADER + key_len
    }

    /// Size of this entry on disk.
    pub fn size_on_disk(&self) -> usize {
        Self::size_for(self.key.len())
    }

    /// Serializes the entry to bytes.
    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.size_on_disk());
        buf.extend_from_slice(&(self.key.len() as u16).to_le_bytes());
        buf.extend_from_slice(&self.child_page.to_le_bytes());
        buf.extend_from_slice(&self.key);
        buf.freeze()
    }

    /// Deserializes an entry from bytes. Returns (entry, bytes_consumed).
    pub fn from_bytes(buf: &[u8]) -> Option<(Self, usize)> {
        if buf.len() < INTERNAL_ENTRY_HEADER {
            return None;
        }

        let key_len = u16::from_le_bytes([buf[0], buf[1]]) as usize;
        let child_page = u32::from_le_bytes([buf[2], buf[3], buf[4], buf[5]]);
        let total = INTERNAL_ENTRY_HEADER + key_len;
        if buf.len() < total {
            return None;
        }

        let key = Bytes::copy_from_slice(&buf[INTERNAL_ENTRY_HEADER..total]);
        Some((Self { key, child_page }, total))
    }
}
