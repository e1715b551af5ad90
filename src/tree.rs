//! B+ tree operations over the cache and device (the tree half of C4).
//!
//! Grounded on the `IndexIO` class in
//! `examples/original_source/NanoIO/Index.py`: `_lookupBlock` →
//! [`IndexTree::descend`], `_getBlockAtAddress`/`_writeBlockToFile` →
//! [`IndexTree::read_block`]/[`IndexTree::write_block`],
//! `_getAddressForNewBlock` → [`IndexTree::allocate_address`],
//! `_updateParentsKeys` → [`IndexTree::update_parents_keys`],
//! `_splitBlock` → [`IndexTree::split`], `add`/`delete`/`_iterate`/
//! `lookupCondition` carried over with the same structure. The two
//! documented source bugs (§9.2's undeclared `maxVal`, §9.3's `conition`
//! typo) are fixed here per the specification's stated intent rather than
//! reproduced.

use crate::block::{Block, BlockKind};
use crate::cache::Cache;
use crate::config::Config;
use crate::device::Device;
use crate::error::{IndexError, Result};
use crate::freelist::FreeList;
use crate::value::{KeyType, Value};
use std::cmp::Ordering;
use std::path::Path;

/// Result of descending the tree for `key` starting at some block: either
/// the leaf that would hold `key`, or the lowest interior block reached
/// before descent could go further (because `key` is smaller than
/// everything routed under that block). Modeled as a variant per the
/// redesign note in `SPEC_FULL.md` §9, rather than inspecting the runtime
/// type of the returned block.
#[derive(Debug)]
pub enum Descend {
    /// Descent reached a leaf.
    Found(Block),
    /// Descent stopped at an interior block because `key` undercuts it.
    StoppedAt(Block),
}

/// An optional inclusive/exclusive key range, as consumed by `iterate`.
#[derive(Debug, Clone, Default)]
pub struct RangeQuery {
    /// Inclusive/exclusive lower bound, per `min_eq`.
    pub min: Option<Value>,
    /// Inclusive/exclusive upper bound, per `max_eq`.
    pub max: Option<Value>,
    /// Whether `min` itself is included in the range.
    pub min_eq: bool,
    /// Whether `max` itself is included in the range.
    pub max_eq: bool,
}

/// A lookup condition: a set of specific equality values and/or a range.
#[derive(Debug, Clone, Default)]
pub struct Condition {
    /// Exact values to look up individually; missing ones are skipped.
    pub equals: Vec<Value>,
    /// An optional range scan to union with the equality lookups.
    pub range: Option<RangeQuery>,
}

/// Owns the index file, its cache, and its free list, and implements the
/// B+ tree operations over them.
#[derive(Debug)]
pub struct IndexTree {
    device: Device,
    cache: Cache,
    free_list: FreeList,
    config: Config,
    key_type: KeyType,
}

impl IndexTree {
    /// Open (creating if absent) the index file at `index_path` and its
    /// free-list sidecar at `free_list_path`. If the index file is empty,
    /// initializes it with a single empty leaf at offset 0.
    pub fn open<P: AsRef<Path>, Q: AsRef<Path>>(
        index_path: P,
        free_list_path: Q,
        key_type: KeyType,
        config: Config,
    ) -> Result<IndexTree> {
        config.validate(key_type)?;
        let mut device = Device::open(index_path, config.index_block_size)?;
        if device.is_empty()? {
            let root = Block::new_leaf(0, 0, key_type, &config);
            let bytes = root.encode()?;
            device.write_block(0, &bytes)?;
            device.flush()?;
        }
        let free_list = FreeList::open(free_list_path)?;
        let cache = Cache::new(config.max_dirty_blocks);
        log::debug!(
            "opened index (key_type={:?}, block_size={}, max_dirty_blocks={})",
            key_type,
            config.index_block_size,
            config.max_dirty_blocks
        );
        Ok(IndexTree {
            device,
            cache,
            free_list,
            config,
            key_type,
        })
    }

    /// The key type this tree is indexed on.
    pub fn key_type(&self) -> KeyType {
        self.key_type
    }

    /// The configuration this tree was opened with.
    pub fn config(&self) -> Config {
        self.config
    }

    /// Read the block at `addr`, reading through the cache. Never
    /// populates the cache on a pure read (§4.4.2).
    pub fn read_block(&mut self, addr: u64) -> Result<Block> {
        if let Some(block) = self.cache.get(addr) {
            return Ok(block);
        }
        let bytes = self.device.read_block(addr)?;
        Block::decode(&bytes, self.key_type, addr, &self.config)
    }

    /// Defer a block write to the cache; flush to the device only on
    /// eviction.
    pub fn write_block(&mut self, block: Block) -> Result<()> {
        if let Some(evicted) = self.cache.put(block) {
            log::trace!("cache evicted block at {} on insert", evicted.address);
            self.flush_one(evicted)?;
        }
        Ok(())
    }

    fn flush_one(&mut self, block: Block) -> Result<()> {
        let bytes = block.encode()?;
        self.device.write_block(block.address, &bytes)
    }

    /// Flush every cached block to the device, in insertion order.
    pub fn flush_all(&mut self) -> Result<()> {
        for block in self.cache.take_all() {
            self.flush_one(block)?;
        }
        self.device.flush()
    }

    /// Close the tree: flush the cache, flush the free list, flush the
    /// device. Safe to call more than once.
    pub fn close(&mut self) -> Result<()> {
        log::debug!("closing index");
        self.flush_all()?;
        self.free_list.close()?;
        self.device.flush()
    }

    /// Allocate an address for a new block: reuse a freed address if one
    /// exists, otherwise extend past the current file end or the highest
    /// cached-but-unflushed address, whichever is greater.
    pub fn allocate_address(&mut self) -> Result<u64> {
        if let Some(addr) = self.free_list.pop()? {
            log::trace!("reusing freed block address {}", addr);
            return Ok(addr);
        }
        let file_end = self.device.len()?;
        let candidate = match self.cache.max_address() {
            Some(m) => std::cmp::max(file_end, m + self.config.index_block_size as u64),
            None => file_end,
        };
        Ok(candidate)
    }

    /// Surrender `block`'s address to the free list, unless it's the root.
    pub fn mark_deleted(&mut self, block: &Block) -> Result<()> {
        if block.address == 0 {
            return Ok(());
        }
        self.free_list.push(block.address)
    }

    /// Descend from `start_addr` toward `key`. See [`Descend`].
    pub fn descend(&mut self, key: &Value, start_addr: u64, require_leaf: bool) -> Result<Descend> {
        let mut block = self.read_block(start_addr)?;
        loop {
            if block.is_leaf() {
                return Ok(Descend::Found(block));
            }
            match block.lookup(key) {
                Ok(addr) => block = self.read_block(addr)?,
                Err(IndexError::KeyNotFound) => {
                    if require_leaf {
                        return Err(IndexError::KeyNotFound);
                    }
                    return Ok(Descend::StoppedAt(block));
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn descend_block(&mut self, key: &Value, require_leaf: bool) -> Result<Block> {
        match self.descend(key, 0, require_leaf)? {
            Descend::Found(b) | Descend::StoppedAt(b) => Ok(b),
        }
    }

    /// Point lookup: the payload address for `key`, or `KeyNotFound`.
    pub fn lookup(&mut self, key: &Value) -> Result<u64> {
        let block = self.descend_block(key, true)?;
        block.lookup(key)
    }

    /// Insert `(key, payload_addr)`.
    pub fn insert(&mut self, key: Value, payload_addr: u64) -> Result<()> {
        let mut block = self.descend_block(&key, false)?;

        if !block.is_leaf() {
            let left_addr = block.addresses[0];
            let mut left = self.read_block(left_addr)?;
            if left.is_leaf() && !left.full() {
                let prev_key = left.keys[0].clone();
                left.add(key.clone(), payload_addr)?;
                self.write_block(left)?;
                self.update_parents_keys(left_addr, block.address, &prev_key, &key)?;
                return Ok(());
            }
        }

        if block.full() {
            self.split(block.address)?;
            block = self.descend_block(&key, false)?;
        }

        if !block.is_leaf() {
            let prev_key = block.keys[0].clone();
            let leaf_addr = self.allocate_address()?;
            let mut leaf = Block::new_leaf(leaf_addr, block.address, self.key_type, &self.config);
            leaf.add(key.clone(), payload_addr)?;
            block.add(key, leaf_addr)?;
            self.write_block(leaf)?;

            let new_first = block.keys[0].clone();
            let block_address = block.address;
            let block_parent = block.parent;
            self.write_block(block)?;

            if new_first != prev_key {
                self.update_parents_keys(block_address, block_parent, &prev_key, &new_first)?;
            }
        } else {
            block.add(key, payload_addr)?;
            self.write_block(block)?;
        }
        Ok(())
    }

    /// Walk up the parent chain from `(block_address, block_parent)`,
    /// rewriting a parent's leftmost key from `old_key` to `new_key` for
    /// as long as that parent's leftmost key matches `old_key` — i.e. for
    /// as long as `block_address`'s subtree remains each ancestor's
    /// left-most child. Stops the first time an ancestor's leftmost key
    /// doesn't match. Per §9.4, this is deliberately not run on delete.
    fn update_parents_keys(
        &mut self,
        block_address: u64,
        block_parent: u64,
        old_key: &Value,
        new_key: &Value,
    ) -> Result<()> {
        let mut parent = self.read_block(block_parent)?;
        if !parent.keys.is_empty() && parent.keys[0] == *old_key {
            parent.delete_address(block_address)?;
            parent.add(new_key.clone(), block_address)?;
            let parent_address = parent.address;
            let parent_parent = parent.parent;
            self.write_block(parent)?;
            // Recursing on the root (parent_address == parent_parent == 0)
            // terminates naturally: the re-read root's leftmost key is now
            // `new_key`, so the `old_key` match above fails next time.
            self.update_parents_keys(parent_address, parent_parent, old_key, new_key)?;
        }
        Ok(())
    }

    fn update_childrens_parent(&mut self, block: &Block) -> Result<()> {
        for &addr in &block.addresses {
            let mut child = self.read_block(addr)?;
            child.parent = block.address;
            self.write_block(child)?;
        }
        Ok(())
    }

    /// Split a full block, propagating splits upward as parents fill.
    pub fn split(&mut self, addr: u64) -> Result<()> {
        log::debug!("splitting block at {}", addr);
        let mut block = self.read_block(addr)?;

        if block.address == 0 {
            let new_addr = self.allocate_address()?;
            block.address = new_addr;
            block.parent = 0;

            let mut new_root = Block::new_interior(0, 0, self.key_type, &self.config);
            new_root.add(block.keys[0].clone(), new_addr)?;
            self.write_block(new_root)?;
            self.write_block(block.clone())?;

            if !block.is_leaf() {
                self.update_childrens_parent(&block)?;
            }
        }

        let mut parent = self.read_block(block.parent)?;
        if parent.full() {
            self.split(parent.address)?;
            block = self.read_block(block.address)?;
            parent = self.read_block(block.parent)?;
        }

        let new_addr = self.allocate_address()?;
        let mut new_block = match block.kind {
            BlockKind::Leaf => Block::new_leaf(new_addr, parent.address, self.key_type, &self.config),
            BlockKind::Interior => {
                Block::new_interior(new_addr, parent.address, self.key_type, &self.config)
            }
        };

        let m = block.keys.len() / 2;
        new_block.keys = block.keys.split_off(m);
        new_block.addresses = block.addresses.split_off(m);

        if !new_block.is_leaf() {
            self.update_childrens_parent(&new_block)?;
        }

        parent.add(new_block.keys[0].clone(), new_block.address)?;

        self.write_block(block)?;
        self.write_block(new_block)?;
        self.write_block(parent)?;
        Ok(())
    }

    /// Delete the first entry matching `key`, reclaiming any blocks that
    /// become empty as a result (except the root).
    pub fn delete(&mut self, key: &Value) -> Result<()> {
        let mut block = self.descend_block(key, true)?;
        block.delete(key)?;
        self.write_block(block.clone())?;

        while block.keys.is_empty() && block.address != 0 {
            self.mark_deleted(&block)?;
            let mut parent = self.read_block(block.parent)?;
            parent.delete_address(block.address)?;
            self.write_block(parent.clone())?;
            block = parent;
        }

        if block.address == 0 && block.keys.is_empty() && !block.is_leaf() {
            let fresh_root = Block::new_leaf(0, 0, self.key_type, &self.config);
            self.write_block(fresh_root)?;
        }
        Ok(())
    }

    fn in_min(&self, key: &Value, min: Option<&Value>, min_eq: bool) -> bool {
        match min {
            None => true,
            Some(v) => {
                let ord = self.key_type.compare(key, v);
                if min_eq {
                    ord != Ordering::Less
                } else {
                    ord == Ordering::Greater
                }
            }
        }
    }

    fn in_max(&self, key: &Value, max: Option<&Value>, max_eq: bool) -> bool {
        match max {
            None => true,
            Some(v) => {
                let ord = self.key_type.compare(key, v);
                if max_eq {
                    ord != Ordering::Greater
                } else {
                    ord == Ordering::Less
                }
            }
        }
    }

    fn iterate_block(
        &mut self,
        addr: u64,
        min: Option<&Value>,
        max: Option<&Value>,
        min_eq: bool,
        max_eq: bool,
        out: &mut Vec<u64>,
    ) -> Result<()> {
        let block = self.read_block(addr)?;
        if block.keys.is_empty() {
            return Ok(());
        }

        // Prune per the corrected intent of §9.2: skip this subtree
        // entirely if none of its keys can satisfy the bounds.
        if let Some(max_v) = max {
            let first = &block.keys[0];
            let prune = if max_eq {
                self.key_type.compare(first, max_v) == Ordering::Greater
            } else {
                self.key_type.compare(first, max_v) != Ordering::Less
            };
            if prune {
                return Ok(());
            }
        }
        if let Some(min_v) = min {
            let last = block.keys.last().unwrap();
            let prune = if min_eq {
                self.key_type.compare(last, min_v) == Ordering::Less
            } else {
                self.key_type.compare(last, min_v) != Ordering::Greater
            };
            if prune {
                return Ok(());
            }
        }

        if block.is_leaf() {
            for (k, &addr) in block.keys.iter().zip(block.addresses.iter()) {
                if self.in_min(k, min, min_eq) && self.in_max(k, max, max_eq) {
                    out.push(addr);
                }
            }
            return Ok(());
        }

        // Interior routing keys aren't themselves payload keys: key_i only
        // marks where child i's span *starts*. The span runs up to
        // key_{i+1} (exclusive), or to +infinity for the last child. Filter
        // on that span overlapping the query bounds, not on the routing
        // key's own membership in them, or an entire subtree gets dropped
        // whenever its first key happens to fall outside `[min, max]`.
        let n = block.keys.len();
        for i in 0..n {
            let lower = &block.keys[i];
            let next = block.keys.get(i + 1);

            if let Some(max_v) = max {
                let prune = if max_eq {
                    self.key_type.compare(lower, max_v) == Ordering::Greater
                } else {
                    self.key_type.compare(lower, max_v) != Ordering::Less
                };
                if prune {
                    continue;
                }
            }
            if let (Some(min_v), Some(upper)) = (min, next) {
                if self.key_type.compare(upper, min_v) != Ordering::Greater {
                    continue;
                }
            }

            self.iterate_block(block.addresses[i], min, max, min_eq, max_eq, out)?;
        }
        Ok(())
    }

    /// Depth-first, left-to-right range scan over payload addresses whose
    /// keys satisfy the given bounds, in non-decreasing key order.
    pub fn iterate(
        &mut self,
        min: Option<&Value>,
        max: Option<&Value>,
        min_eq: bool,
        max_eq: bool,
    ) -> Result<Vec<u64>> {
        let mut out = Vec::new();
        self.iterate_block(0, min, max, min_eq, max_eq, &mut out)?;
        Ok(out)
    }

    /// The concatenation of successful equality lookups (missing ones
    /// silently skipped) and, if a range is given, the filtered range scan.
    pub fn lookup_condition(&mut self, condition: &Condition) -> Result<Vec<u64>> {
        let mut positions = Vec::new();
        for item in &condition.equals {
            match self.lookup(item) {
                Ok(addr) => positions.push(addr),
                Err(IndexError::KeyNotFound) => {}
                Err(e) => return Err(e),
            }
        }
        if let Some(range) = &condition.range {
            let mut scanned = self.iterate(
                range.min.as_ref(),
                range.max.as_ref(),
                range.min_eq,
                range.max_eq,
            )?;
            positions.append(&mut scanned);
        }
        Ok(positions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn open_tree(block_size: u32, max_dirty: usize, key_type: KeyType) -> IndexTree {
        let dir = tempdir().unwrap();
        // Leak the tempdir so the files outlive this helper; fine for tests.
        let dir = Box::leak(Box::new(dir));
        let cfg = Config {
            index_block_size: block_size,
            max_dirty_blocks: max_dirty,
        };
        IndexTree::open(dir.path().join("idx"), dir.path().join("free"), key_type, cfg).unwrap()
    }

    #[test]
    fn lookup_after_insert() {
        let mut tree = open_tree(4096, 10, KeyType::Int(4));
        for k in 0..50i64 {
            tree.insert(Value::Int(k), (k * 10) as u64).unwrap();
        }
        for k in 0..50i64 {
            assert_eq!(tree.lookup(&Value::Int(k)).unwrap(), (k * 10) as u64);
        }
        assert!(tree.lookup(&Value::Int(999)).is_err());
    }

    #[test]
    fn leaf_split_scenario() {
        // blockSize chosen so maxKeys = 4 for Int8: header=13, slot=1+8=9.
        // floor((blockSize-13)/9) == 4 => blockSize in [49,57]; pick 49.
        let mut tree = open_tree(49, 10, KeyType::Int(1));
        tree.insert(Value::Int(1), 10).unwrap();
        tree.insert(Value::Int(2), 20).unwrap();
        tree.insert(Value::Int(3), 30).unwrap();
        tree.insert(Value::Int(4), 40).unwrap();
        tree.insert(Value::Int(5), 50).unwrap();

        let root = tree.read_block(0).unwrap();
        assert!(!root.is_leaf());
        assert_eq!(tree.lookup(&Value::Int(3)).unwrap(), 30);
        assert_eq!(tree.lookup(&Value::Int(5)).unwrap(), 50);
    }

    #[test]
    fn delete_then_lookup_fails() {
        let mut tree = open_tree(4096, 10, KeyType::Int(4));
        for k in 0..20i64 {
            tree.insert(Value::Int(k), k as u64).unwrap();
        }
        for k in (0..20i64).rev() {
            tree.delete(&Value::Int(k)).unwrap();
        }
        for k in 0..20i64 {
            assert!(tree.lookup(&Value::Int(k)).is_err());
        }
        let root = tree.read_block(0).unwrap();
        assert!(root.is_leaf());
        assert!(root.keys.is_empty());
    }

    #[test]
    fn range_iteration_is_ordered_and_bounded() {
        let mut tree = open_tree(4096, 10, KeyType::Int(4));
        for k in 0..30i64 {
            tree.insert(Value::Int(k), k as u64).unwrap();
        }
        let got = tree
            .iterate(Some(&Value::Int(10)), Some(&Value::Int(20)), true, false)
            .unwrap();
        let expected: Vec<u64> = (10..20).map(|k| k as u64).collect();
        assert_eq!(got, expected);
    }

    #[test]
    fn range_spans_multiple_interior_children() {
        // maxKeys = 4 for Int(1); inserting 0..=7 in order builds a root
        // with routing keys [0, 2, 4] over leaves [0,1], [2,3], [4,5,6,7].
        let mut tree = open_tree(49, 10, KeyType::Int(1));
        for k in 0..=7i64 {
            tree.insert(Value::Int(k), k as u64).unwrap();
        }
        let root = tree.read_block(0).unwrap();
        assert!(!root.is_leaf());

        // A bound whose lower edge (3) falls strictly inside the second
        // child's span must not drop that child just because its routing
        // key (2) is less than the lower bound.
        let got = tree
            .iterate(Some(&Value::Int(3)), Some(&Value::Int(6)), true, true)
            .unwrap();
        assert_eq!(got, vec![3, 4, 5, 6]);
    }

    #[test]
    fn lookup_condition_combines_equals_and_range() {
        let mut tree = open_tree(4096, 10, KeyType::Int(4));
        for k in 0..10i64 {
            tree.insert(Value::Int(k), k as u64).unwrap();
        }
        let condition = Condition {
            equals: vec![Value::Int(1), Value::Int(999)],
            range: Some(RangeQuery {
                min: Some(Value::Int(5)),
                max: Some(Value::Int(7)),
                min_eq: true,
                max_eq: true,
            }),
        };
        let got = tree.lookup_condition(&condition).unwrap();
        assert_eq!(got, vec![1, 5, 6, 7]);
    }

    #[test]
    fn reopen_persists_inserted_keys() {
        let dir = tempdir().unwrap();
        let cfg = Config {
            index_block_size: 4096,
            max_dirty_blocks: 4,
        };
        {
            let mut tree = IndexTree::open(
                dir.path().join("idx"),
                dir.path().join("free"),
                KeyType::Int(4),
                cfg,
            )
            .unwrap();
            for k in 0..150i64 {
                tree.insert(Value::Int(k), k as u64).unwrap();
            }
            tree.close().unwrap();
        }
        let mut tree = IndexTree::open(
            dir.path().join("idx"),
            dir.path().join("free"),
            KeyType::Int(4),
            cfg,
        )
        .unwrap();
        for k in 0..150i64 {
            assert_eq!(tree.lookup(&Value::Int(k)).unwrap(), k as u64);
        }
    }

    #[test]
    fn empty_block_reclamation_reuses_the_freed_address() {
        let mut tree = open_tree(49, 10, KeyType::Int(1));
        for k in 1..=5i64 {
            tree.insert(Value::Int(k), k as u64 * 10).unwrap();
        }
        // Deleting the full right-hand leaf's worth of keys empties and
        // reclaims its block; a subsequent split should reuse its address.
        tree.delete(&Value::Int(3)).unwrap();
        tree.delete(&Value::Int(4)).unwrap();
        tree.delete(&Value::Int(5)).unwrap();
        for k in 10..13i64 {
            tree.insert(Value::Int(k), k as u64).unwrap();
        }
        for k in [1i64, 2, 10, 11, 12] {
            assert!(tree.lookup(&Value::Int(k)).is_ok());
        }
    }
}
