//! Disk manager for page-level file I/O.

use marrow_common::page::{PageId, PAGE_SIZE};
use marrow_common::Result;
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::trace;

/// Manages reading and writing fixed-size pages within a single table file.
///
/// The disk manager exclusively owns the underlying file handle: it is
/// movable but not clonable, and the handle is released on drop.
#[derive(Debug)]
pub struct DiskManager {
    /// Path to the table file.
    path: PathBuf,
    /// Sync to durable storage after every page write.
    fsync_enabled: bool,
    /// Open file handle and cached page count.
    state: Mutex<FileState>,
}

#[derive(Debug)]
struct FileState {
    file: File,
    num_pages: u32,
}

impl DiskManager {
    /// Opens the table file, creating it if missing.
    pub fn open(path: impl AsRef<Path>, fsync_enabled: bool) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&path)?;

        let file_size = file.metadata()?.len();
        let num_pages = (file_size / PAGE_SIZE as u64) as u32;

        Ok(Self {
            path,
            fsync_enabled,
            state: Mutex::new(FileState { file, num_pages }),
        })
    }

    /// Returns the path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads a page into the caller's buffer.
    ///
    /// If the file ends before a full page is available, the remainder of
    /// the buffer is zero-filled.
    pub fn read_page(&self, page_id: PageId, buf: &mut [u8; PAGE_SIZE]) -> Result<()> {
        let mut state = self.state.lock();
        let offset = page_id as u64 * PAGE_SIZE as u64;
        state.file.seek(SeekFrom::Start(offset))?;

        let mut total = 0;
        while total < PAGE_SIZE {
            let n = state.file.read(&mut buf[total..])?;
            if n == 0 {
                break;
            }
            total += n;
        }
        if total < PAGE_SIZE {
            buf[total..].fill(0);
        }

        trace!(page_id, bytes = total, "read page");
        Ok(())
    }

    /// Writes a full page at `page_id`, extending the file first if needed.
    ///
    /// Extension mirrors the classic sparse-file protocol: a single zero
    /// byte is written at the last offset of the target page before the
    /// page itself is written.
    pub fn write_page(&self, page_id: PageId, data: &[u8; PAGE_SIZE]) -> Result<()> {
        let mut state = self.state.lock();
        let offset = page_id as u64 * PAGE_SIZE as u64;
        let required = offset + PAGE_SIZE as u64;

        let current = state.file.seek(SeekFrom::End(0))?;
        if current < required {
            state.file.seek(SeekFrom::Start(required - 1))?;
            state.file.write_all(&[0u8])?;
        }

        state.file.seek(SeekFrom::Start(offset))?;
        state.file.write_all(data)?;

        if self.fsync_enabled {
            state.file.sync_all()?;
        }

        if page_id >= state.num_pages {
            state.num_pages = page_id + 1;
        }

        trace!(page_id, "wrote page");
        Ok(())
    }

    /// Forces all buffered writes to durable storage.
    pub fn flush(&self) -> Result<()> {
        self.state.lock().file.sync_all()?;
        Ok(())
    }

    /// Returns the number of pages currently in the file.
    pub fn num_pages(&self) -> u32 {
        self.state.lock().num_pages
    }
}
