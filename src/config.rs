//! Configuration surface for an [`crate::index::Index`].
//!
//! Mirrors the teacher's `SuperBlock` + `sb_valid` pattern
//! (`examples/konstantinoscs-Rust_filesystem/api/src/types.rs`,
//! `a_block_support.rs`): a small plain struct describing layout knobs, with
//! an eager validity check run before a disk structure is built from it.

use crate::error::{IndexError, Result};
use crate::value::KeyType;

/// Default index block size, in bytes.
pub const DEFAULT_BLOCK_SIZE: u32 = 4096;

/// Default bound on the number of dirty blocks the cache may hold before
/// it starts evicting.
pub const DEFAULT_MAX_DIRTY_BLOCKS: usize = 64;

/// Knobs governing how an [`crate::index::Index`] lays out and buffers its
/// on-disk blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    /// Size in bytes of each on-disk index block. Recommended range 1024-4096.
    pub index_block_size: u32,
    /// Maximum number of modified blocks the cache buffers before flushing
    /// the least-recently-inserted entry. Must be at least 1.
    pub max_dirty_blocks: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            index_block_size: DEFAULT_BLOCK_SIZE,
            max_dirty_blocks: DEFAULT_MAX_DIRTY_BLOCKS,
        }
    }
}

impl Config {
    /// Block header size: 1 byte isLeaf + 8 bytes parent + 2 bytes numKeys
    /// + 2 bytes numAddresses.
    const HEADER_SIZE: u32 = 1 + 8 + 2 + 2;

    /// Per-slot cost: the key's fixed width plus the paired 8-byte address.
    fn slot_size(&self, key_type: KeyType) -> u32 {
        key_type.size() as u32 + 8
    }

    /// `maxKeys = floor((blockSize - header) / (keySize + 8))`, per §3.
    pub fn max_keys(&self, key_type: KeyType) -> usize {
        ((self.index_block_size - Self::HEADER_SIZE) / self.slot_size(key_type)) as usize
    }

    /// Validate that this configuration can actually host `key_type`: the
    /// block must be large enough to hold the header and be able to fit at
    /// least 2 keys, the minimum needed for a meaningful split.
    pub fn validate(&self, key_type: KeyType) -> Result<()> {
        if self.max_dirty_blocks < 1 {
            return Err(IndexError::InvalidConfig(
                "max_dirty_blocks must be at least 1".into(),
            ));
        }
        if self.index_block_size <= Self::HEADER_SIZE {
            return Err(IndexError::InvalidConfig(format!(
                "index_block_size {} too small to hold the block header ({} bytes)",
                self.index_block_size,
                Self::HEADER_SIZE
            )));
        }
        if key_type.size() as u32 + 8 > self.index_block_size - Self::HEADER_SIZE {
            return Err(IndexError::InvalidConfig(format!(
                "index_block_size {} cannot fit even one key of type {:?}",
                self.index_block_size, key_type
            )));
        }
        if self.max_keys(key_type) < 2 {
            return Err(IndexError::InvalidConfig(format!(
                "index_block_size {} yields maxKeys={} for key type {:?}; need at least 2",
                self.index_block_size,
                self.max_keys(key_type),
                key_type
            )));
        }
        Ok(())
    }
}
