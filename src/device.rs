//! Blocking, block-addressed file I/O underneath the cache and free list.
//!
//! Grounded on the teacher's `Device` (`examples/konstantinoscs-Rust_filesystem/api/src/controller.rs`): a small
//! struct owning the backing file and exposing block-sized read/write
//! primitives, with a `Drop` impl that best-effort flushes on teardown.
//! Unlike the teacher's `Device`, this one is **not** memory-mapped and
//! does not pre-allocate a fixed block count: a B+ tree's index file grows
//! one block at a time as splits allocate fresh addresses, which does not
//! fit a fixed-size `mmap` without periodic remapping. Plain blocking
//! `seek`+`read`/`write` matches the single-writer, synchronous I/O model
//! this specification requires anyway (§5).

use crate::error::{IndexError, Result};
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// A growable file of fixed-size blocks, addressed by byte offset.
#[derive(Debug)]
pub struct Device {
    path: PathBuf,
    file: File,
    block_size: u32,
}

impl Device {
    /// Open (creating if absent) the backing file at `path`.
    pub fn open<P: AsRef<Path>>(path: P, block_size: u32) -> Result<Device> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&path)?;
        Ok(Device {
            path,
            file,
            block_size,
        })
    }

    /// Size in bytes of a block on this device.
    pub fn block_size(&self) -> u32 {
        self.block_size
    }

    /// Current length of the backing file, in bytes.
    pub fn len(&self) -> Result<u64> {
        Ok(self.file.metadata()?.len())
    }

    /// Whether the backing file has any content yet.
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Read the `block_size`-byte block at `addr`. Fails with
    /// [`IndexError::InvalidAddress`] if fewer than `block_size` bytes
    /// are available starting at `addr`.
    pub fn read_block(&mut self, addr: u64) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; self.block_size as usize];
        self.file.seek(SeekFrom::Start(addr))?;
        self.file
            .read_exact(&mut buf)
            .map_err(|_| IndexError::InvalidAddress { address: addr })?;
        Ok(buf)
    }

    /// Write `data` (which must be exactly `block_size` bytes) at `addr`,
    /// extending the file if `addr` lies past the current end.
    pub fn write_block(&mut self, addr: u64, data: &[u8]) -> Result<()> {
        debug_assert_eq!(data.len(), self.block_size as usize);
        self.file.seek(SeekFrom::Start(addr))?;
        self.file.write_all(data)?;
        Ok(())
    }

    /// Flush buffered writes to the OS.
    pub fn flush(&mut self) -> Result<()> {
        self.file.flush()?;
        Ok(())
    }

    /// Path of the file backing this device.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        let _ = self.file.flush();
    }
}
