//! Error type shared by every layer of the indexing core.
//!
//! Follows the teacher's `thiserror`-derived enum approach (see
//! `examples/konstantinoscs-Rust_filesystem/api/src/error_given.rs` in the reference pack this crate was modeled
//! on), collapsed to a single flat enum rather than one enum per layer:
//! this crate has one layer of abstraction (the index), not a stack of
//! block/inode/directory layers, so there is nothing to nest.
//!
//! Unlike that reference error type, there is no catch-all `anyhow`
//! variant here. The error kinds below are a closed, fully enumerated
//! set; a catch-all would let a caller lose the ability to match on a
//! specific failure, which is exactly the tradeoff worth avoiding in a
//! library meant to be embedded.

use std::io;
use thiserror::Error;

/// Every way an operation on the indexing core can fail.
#[derive(Error, Debug)]
pub enum IndexError {
    /// A value failed its type's validity predicate during `encode`.
    #[error("invalid value for codec: {0}")]
    InvalidValue(String),

    /// A buffer handed to `decode` was not exactly the type's fixed size.
    #[error("invalid buffer for codec: expected {expected} bytes, got {actual}")]
    InvalidBuffer {
        /// Size the codec requires.
        expected: usize,
        /// Size actually supplied.
        actual: usize,
    },

    /// `encodeBlock` produced a payload larger than the configured block size.
    #[error("block payload overflowed block size {block_size}")]
    BlockOverflow {
        /// Configured block size in bytes.
        block_size: u32,
    },

    /// `decodeBlock` read a header that cannot describe a valid block.
    #[error("malformed block at address {address}: {reason}")]
    BlockMalformed {
        /// Address the block was read from.
        address: u64,
        /// Human-readable reason.
        reason: String,
    },

    /// `add` was called on a block that already holds `maxKeys` entries.
    #[error("block at address {address} is full")]
    BlockFull {
        /// Address of the full block.
        address: u64,
    },

    /// A lookup or delete could not find the requested key.
    #[error("key not found")]
    KeyNotFound,

    /// `readBlock` was asked for an address past the end of the file.
    #[error("invalid address {address}: past end of index file")]
    InvalidAddress {
        /// Address that could not be read.
        address: u64,
    },

    /// `cache.get`/`cache.flush` were called with an address not in the cache.
    #[error("address {address} is not cached")]
    NotCached {
        /// Address that was expected to be cached.
        address: u64,
    },

    /// The free-list sidecar file's size was not a multiple of 8 bytes on open.
    #[error("corrupt free list: size {size} is not a multiple of 8")]
    CorruptFreeList {
        /// Size observed on disk, in bytes.
        size: u64,
    },

    /// A configuration value failed validation before an `Index` could be opened.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Any I/O error from the backing index, free-list, or varchar sidecar files.
    #[error("I/O error")]
    Io(#[from] io::Error),
}

/// Shorthand `Result` alias used throughout the crate.
pub type Result<T> = std::result::Result<T, IndexError>;
