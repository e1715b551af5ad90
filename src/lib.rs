//! `nanoidx`: a disk-backed B+ tree indexing core.
//!
//! This crate implements the hard engineering piece underneath a small
//! relational database: a fixed-block B+ tree keyed on a typed column
//! ([`value`], [`block`], [`tree`]), the bounded write-back cache and
//! free-block manager that make its I/O practical ([`cache`],
//! [`freelist`]), and the byte-exact codecs both layers build on
//! ([`value`], [`varchar`], [`block`]).
//!
//! Start at [`index::Index`] — the lifecycle wrapper most callers want.
//! Everything else in the crate is the machinery underneath it, exposed
//! for callers (a table layer, test harnesses) that need finer control
//! than the high-level wrapper gives.
//!
//! Out of scope, by design: concurrency across processes, transactions,
//! networked access, query parsing, and the table/row layer above a
//! column index. See each module's documentation for the invariants it
//! upholds.

#![deny(missing_docs)]

pub mod block;
pub mod cache;
pub mod config;
pub mod device;
pub mod error;
pub mod freelist;
pub mod index;
pub mod tree;
pub mod value;
pub mod varchar;

pub use config::Config;
pub use error::{IndexError, Result};
pub use index::Index;
pub use value::{KeyType, Value};
