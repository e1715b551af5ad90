//! Variable-length string storage (the `Varchar` half of C1).
//!
//! `Varchar` is not indexable, so it is kept out of [`crate::value::KeyType`]
//! entirely and modeled as its own append-only sidecar file, the same shape
//! as the teacher's `PointerType` (`examples/konstantinoscs-Rust_filesystem/api/src/*_BasePointerType` in the
//! original source pack this crate was modeled on): a write appends the
//! bytes and returns an `(offset, length)` pointer; a read seeks and reads
//! back. Never reclaims space — see `SPEC_FULL.md` §9.6.

use crate::error::Result;
use byteorder::{ByteOrder, LittleEndian};
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

/// The 16-byte inline representation of a `Varchar` value: an 8-byte
/// offset into the sidecar file and an 8-byte length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VarcharPointer {
    /// Byte offset into the sidecar file.
    pub offset: u64,
    /// Length of the string body, in bytes.
    pub length: u64,
}

impl VarcharPointer {
    /// The pointer for an absent/NULL varchar value: `(0, 0)`.
    pub const NULL: VarcharPointer = VarcharPointer {
        offset: 0,
        length: 0,
    };

    /// Size of the inline representation, in bytes.
    pub const SIZE: usize = 16;

    /// Encode to the fixed 16-byte inline form.
    pub fn encode(&self) -> [u8; 16] {
        let mut buf = [0u8; 16];
        LittleEndian::write_u64(&mut buf[0..8], self.offset);
        LittleEndian::write_u64(&mut buf[8..16], self.length);
        buf
    }

    /// Decode from the fixed 16-byte inline form.
    pub fn decode(bytes: &[u8]) -> Result<VarcharPointer> {
        if bytes.len() != Self::SIZE {
            return Err(crate::error::IndexError::InvalidBuffer {
                expected: Self::SIZE,
                actual: bytes.len(),
            });
        }
        Ok(VarcharPointer {
            offset: LittleEndian::read_u64(&bytes[0..8]),
            length: LittleEndian::read_u64(&bytes[8..16]),
        })
    }

    /// Whether this pointer represents the absent/NULL value.
    pub fn is_null(&self) -> bool {
        *self == Self::NULL
    }
}

/// Append-only byte store backing a column's `Varchar` values.
#[derive(Debug)]
pub struct VarcharStore {
    file: File,
}

impl VarcharStore {
    /// Open (creating if absent) the sidecar file at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<VarcharStore> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(path)?;
        Ok(VarcharStore { file })
    }

    /// Append `bytes` to the sidecar and return a pointer to it.
    pub fn encode(&mut self, bytes: &[u8]) -> Result<VarcharPointer> {
        let offset = self.file.seek(SeekFrom::End(0))?;
        self.file.write_all(bytes)?;
        Ok(VarcharPointer {
            offset,
            length: bytes.len() as u64,
        })
    }

    /// Read the string body referenced by `ptr` back out of the sidecar.
    pub fn decode(&mut self, ptr: VarcharPointer) -> Result<Option<Vec<u8>>> {
        if ptr.is_null() {
            return Ok(None);
        }
        let mut buf = vec![0u8; ptr.length as usize];
        self.file.seek(SeekFrom::Start(ptr.offset))?;
        self.file.read_exact(&mut buf)?;
        Ok(Some(buf))
    }

    /// Flush buffered writes to disk.
    pub fn flush(&mut self) -> Result<()> {
        self.file.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn round_trips_through_the_sidecar() {
        let dir = tempdir().unwrap();
        let mut store = VarcharStore::open(dir.path().join("strings")).unwrap();

        let p1 = store.encode(b"hello").unwrap();
        let p2 = store.encode(b"world, a longer string").unwrap();

        assert_eq!(store.decode(p1).unwrap().unwrap(), b"hello");
        assert_eq!(
            store.decode(p2).unwrap().unwrap(),
            b"world, a longer string"
        );
    }

    #[test]
    fn null_pointer_decodes_to_none() {
        let dir = tempdir().unwrap();
        let mut store = VarcharStore::open(dir.path().join("strings")).unwrap();
        assert_eq!(store.decode(VarcharPointer::NULL).unwrap(), None);
    }

    #[test]
    fn pointer_inline_round_trip() {
        let p = VarcharPointer {
            offset: 12345,
            length: 67,
        };
        let enc = p.encode();
        assert_eq!(VarcharPointer::decode(&enc).unwrap(), p);
    }

    #[test]
    fn repeated_writes_never_reclaim_space() {
        let dir = tempdir().unwrap();
        let mut store = VarcharStore::open(dir.path().join("strings")).unwrap();
        let p1 = store.encode(b"first").unwrap();
        let p2 = store.encode(b"second").unwrap();
        assert!(p2.offset >= p1.offset + p1.length);
    }
}
