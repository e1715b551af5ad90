//! The top-level `Index` type: the public lifecycle wrapper tying a
//! backing file, its free list, and the tree logic together (§4.4.7).
//!
//! Grounded on `IndexIO.__init__`/`close` in
//! `examples/original_source/NanoIO/Index.py`, which derives the index
//! file and free-list sidecar paths from a table/column name pair; this
//! crate takes an explicit path prefix instead, since table/column naming
//! is a concern of the out-of-scope table layer (§1).

use crate::config::Config;
use crate::error::Result;
use crate::tree::{Condition, IndexTree, RangeQuery};
use crate::value::{KeyType, Value};
use std::path::{Path, PathBuf};

/// A disk-backed B+ tree index over a single typed column.
///
/// Construct with [`Index::open`], mutate with [`Index::insert`]/
/// [`Index::delete`], query with [`Index::lookup`]/[`Index::lookup_condition`]/
/// [`Index::range`], and release resources with [`Index::close`].
#[derive(Debug)]
pub struct Index {
    tree: IndexTree,
}

impl Index {
    /// Open or create an index rooted at `path_prefix`: the index file is
    /// `path_prefix` with a `.idx` extension, the free-list sidecar is
    /// `path_prefix` with a `.free` extension.
    pub fn open<P: AsRef<Path>>(path_prefix: P, key_type: KeyType, config: Config) -> Result<Index> {
        let prefix = path_prefix.as_ref();
        let index_path = with_suffix(prefix, "idx");
        let free_list_path = with_suffix(prefix, "free");
        let tree = IndexTree::open(index_path, free_list_path, key_type, config)?;
        Ok(Index { tree })
    }

    /// Insert `(key, payload_addr)`. `payload_addr` is opaque to the index
    /// — typically a row offset in the owning table file.
    pub fn insert(&mut self, key: Value, payload_addr: u64) -> Result<()> {
        self.tree.insert(key, payload_addr)
    }

    /// Look up the payload address for `key`. Fails with
    /// [`crate::error::IndexError::KeyNotFound`] if absent.
    pub fn lookup(&mut self, key: &Value) -> Result<u64> {
        self.tree.lookup(key)
    }

    /// Delete the first entry matching `key`.
    pub fn delete(&mut self, key: &Value) -> Result<()> {
        self.tree.delete(key)
    }

    /// Range scan: every payload address whose key falls within the given
    /// bounds, in non-decreasing key order.
    pub fn range(
        &mut self,
        min: Option<&Value>,
        max: Option<&Value>,
        min_eq: bool,
        max_eq: bool,
    ) -> Result<Vec<u64>> {
        self.tree.iterate(min, max, min_eq, max_eq)
    }

    /// Evaluate a combined equality/range condition. See [`Condition`].
    pub fn lookup_condition(&mut self, condition: &Condition) -> Result<Vec<u64>> {
        self.tree.lookup_condition(condition)
    }

    /// Flush the cache and free list, then flush the backing file.
    /// Idempotent.
    pub fn close(&mut self) -> Result<()> {
        self.tree.close()
    }

    /// The key type this index was opened with.
    pub fn key_type(&self) -> KeyType {
        self.tree.key_type()
    }
}

/// Convenience for building a [`RangeQuery`] from explicit bounds.
pub fn range(min: Option<Value>, max: Option<Value>, min_eq: bool, max_eq: bool) -> RangeQuery {
    RangeQuery {
        min,
        max,
        min_eq,
        max_eq,
    }
}

fn with_suffix(prefix: &Path, ext: &str) -> PathBuf {
    let mut os = prefix.as_os_str().to_owned();
    os.push(".");
    os.push(ext);
    PathBuf::from(os)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn open_insert_lookup_close_reopen() {
        let dir = tempdir().unwrap();
        let prefix = dir.path().join("column_a");
        let cfg = Config::default();

        {
            let mut idx = Index::open(&prefix, KeyType::Int(4), cfg).unwrap();
            for k in 0..20i64 {
                idx.insert(Value::Int(k), k as u64 * 2).unwrap();
            }
            idx.close().unwrap();
        }

        let mut idx = Index::open(&prefix, KeyType::Int(4), cfg).unwrap();
        for k in 0..20i64 {
            assert_eq!(idx.lookup(&Value::Int(k)).unwrap(), k as u64 * 2);
        }
        assert!(idx.lookup(&Value::Int(999)).is_err());
    }

    #[test]
    fn range_and_condition_delegate_to_the_tree() {
        let dir = tempdir().unwrap();
        let prefix = dir.path().join("column_b");
        let mut idx = Index::open(&prefix, KeyType::Int(4), Config::default()).unwrap();
        for k in 0..10i64 {
            idx.insert(Value::Int(k), k as u64).unwrap();
        }
        let got = idx
            .range(Some(&Value::Int(2)), Some(&Value::Int(5)), true, false)
            .unwrap();
        assert_eq!(got, vec![2, 3, 4]);

        let condition = Condition {
            equals: vec![Value::Int(9)],
            range: Some(range(Some(Value::Int(0)), Some(Value::Int(1)), true, true)),
        };
        assert_eq!(idx.lookup_condition(&condition).unwrap(), vec![9, 0, 1]);
    }
}
