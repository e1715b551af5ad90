//! Bounded, insertion-ordered write-back block cache (part of C4).
//!
//! Grounded on `examples/original_source/NanoTools/BlockCacheManager.py`:
//! an `OrderedDict` of blocks, evicted oldest-first once the cache exceeds
//! `maxDirtyBlocks`. The original compares with a strict `>` rather than
//! `>=`, which lets the cache grow to `maxDirtyBlocks + 1` entries before
//! the first eviction fires. `SPEC_FULL.md` §9.8 keeps this behavior
//! rather than "fixing" it, since nothing downstream depends on the bound
//! being exact and a silent behavior change would be a design decision
//! with no sign-off. Every cached entry is dirty — the cache has no
//! clean/shared mode (§4.4.1) — so eviction always means "write this back,
//! then drop it".

use crate::block::Block;
use std::collections::HashMap;

/// A write-back cache of recently touched blocks, keyed by their on-disk
/// address. `get` and `put` both move the touched entry to the
/// most-recently-used end; eviction always takes from the opposite end.
#[derive(Debug)]
pub struct Cache {
    max_dirty: usize,
    order: Vec<u64>,
    blocks: HashMap<u64, Block>,
}

impl Cache {
    /// Construct an empty cache bounded at `max_dirty` entries.
    pub fn new(max_dirty: usize) -> Cache {
        Cache {
            max_dirty,
            order: Vec::new(),
            blocks: HashMap::new(),
        }
    }

    /// Whether `address` is currently cached.
    pub fn contains(&self, address: u64) -> bool {
        self.blocks.contains_key(&address)
    }

    fn touch(&mut self, address: u64) {
        if let Some(pos) = self.order.iter().position(|&a| a == address) {
            self.order.remove(pos);
        }
        self.order.push(address);
    }

    /// Return a copy of the cached block at `address`, moving it to the
    /// most-recently-used position. `None` if not cached.
    pub fn get(&mut self, address: u64) -> Option<Block> {
        if self.blocks.contains_key(&address) {
            self.touch(address);
            self.blocks.get(&address).cloned()
        } else {
            None
        }
    }

    /// Insert or replace `block`. If `block.address` is already cached,
    /// it is replaced in place and moved to the most-recently-used
    /// position, with no eviction check at all (matching the source: a
    /// replace never triggers a flush). Otherwise, if the cache already
    /// holds more than `max_dirty` entries, evicts and returns the
    /// least-recently-used entry *before* inserting the new one;
    /// otherwise returns `None`.
    ///
    /// Note the strict `>` bound inherited from the original, checked
    /// against the length *before* this insertion: the cache's
    /// steady-state population is `max_dirty + 1`, not `max_dirty` (§9.8).
    pub fn put(&mut self, block: Block) -> Option<Block> {
        let address = block.address;
        if self.blocks.contains_key(&address) {
            self.touch(address);
            self.blocks.insert(address, block);
            return None;
        }

        let evicted = if self.order.len() > self.max_dirty {
            let evict_addr = self.order.remove(0);
            self.blocks.remove(&evict_addr)
        } else {
            None
        };
        self.order.push(address);
        self.blocks.insert(address, block);
        evicted
    }

    /// Remove and return a single entry, regardless of its position in the
    /// access order. `None` if not cached.
    pub fn take(&mut self, address: u64) -> Option<Block> {
        self.order.retain(|&a| a != address);
        self.blocks.remove(&address)
    }

    /// Remove and return every cached entry, oldest-first, clearing the
    /// cache.
    pub fn take_all(&mut self) -> Vec<Block> {
        let order = std::mem::take(&mut self.order);
        order
            .into_iter()
            .filter_map(|addr| self.blocks.remove(&addr))
            .collect()
    }

    /// Drop every entry without returning them (rollback-style discard).
    pub fn truncate(&mut self) {
        self.order.clear();
        self.blocks.clear();
    }

    /// Number of entries currently cached.
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Whether the cache currently holds no entries.
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// The largest address currently cached, if any. Used by address
    /// allocation to avoid colliding with a cached-but-unflushed block
    /// sitting past the current file end.
    pub fn max_address(&self) -> Option<u64> {
        self.blocks.keys().copied().max()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::value::KeyType;

    fn leaf(addr: u64) -> Block {
        let cfg = Config {
            index_block_size: 64,
            max_dirty_blocks: 4,
        };
        Block::new_leaf(addr, 0, KeyType::Int(4), &cfg)
    }

    #[test]
    fn put_and_get_round_trip() {
        let mut cache = Cache::new(2);
        cache.put(leaf(10));
        assert!(cache.contains(10));
        assert_eq!(cache.get(10).unwrap().address, 10);
    }

    #[test]
    fn eviction_fires_only_once_the_bound_is_exceeded() {
        let mut cache = Cache::new(2);
        assert_eq!(cache.put(leaf(1)).map(|b| b.address), None);
        assert_eq!(cache.put(leaf(2)).map(|b| b.address), None);
        // A third distinct address is allowed in before the pre-insert
        // length (2) exceeds max_dirty (2): the cache reaches max+1.
        assert_eq!(cache.put(leaf(3)).map(|b| b.address), None);
        assert_eq!(cache.len(), 3);
        // The fourth brings the pre-insert length (3) over the bound.
        assert_eq!(cache.put(leaf(4)).map(|b| b.address), Some(1));
        assert_eq!(cache.len(), 3);
    }

    #[test]
    fn replacing_an_existing_entry_does_not_grow_the_cache() {
        let mut cache = Cache::new(1);
        assert_eq!(cache.put(leaf(1)).map(|b| b.address), None);
        assert_eq!(cache.put(leaf(1)).map(|b| b.address), None);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn get_refreshes_recency_so_it_survives_eviction() {
        let mut cache = Cache::new(2);
        cache.put(leaf(1));
        cache.put(leaf(2));
        cache.get(1); // touch 1, making 2 the LRU entry
        // Pre-insert length is 2, not yet over the bound: no eviction.
        assert!(cache.put(leaf(3)).is_none());
        // Pre-insert length is now 3 > 2: the LRU entry (2) is evicted.
        let evicted = cache.put(leaf(4)).unwrap();
        assert_eq!(evicted.address, 2);
        assert!(cache.contains(1));
    }

    #[test]
    fn take_removes_a_specific_entry() {
        let mut cache = Cache::new(4);
        cache.put(leaf(1));
        let taken = cache.take(1).unwrap();
        assert_eq!(taken.address, 1);
        assert!(!cache.contains(1));
        assert!(cache.take(1).is_none());
    }

    #[test]
    fn take_all_drains_oldest_first() {
        let mut cache = Cache::new(10);
        cache.put(leaf(1));
        cache.put(leaf(2));
        cache.put(leaf(3));
        let addrs: Vec<u64> = cache.take_all().iter().map(|b| b.address).collect();
        assert_eq!(addrs, vec![1, 2, 3]);
        assert!(cache.is_empty());
    }

    #[test]
    fn truncate_discards_without_returning() {
        let mut cache = Cache::new(4);
        cache.put(leaf(1));
        cache.truncate();
        assert!(cache.is_empty());
        assert!(!cache.contains(1));
    }
}
