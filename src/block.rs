//! The in-memory block representation and its fixed-width codec (C2).
//!
//! Grounded on the original `_IndexBlock`/`LeafBlock`/`InteriorBlock`
//! hierarchy (`examples/original_source/NanoBlocks/Index.py`), rearchitected
//! per the redesign note in `SPEC_FULL.md` §9: one block record with a
//! `kind` discriminator instead of a leaf/interior subclass pair, and
//! `lookup` dispatching on `kind` rather than on the runtime type.

use crate::config::Config;
use crate::error::{IndexError, Result};
use crate::value::{KeyType, Value};
use byteorder::{ByteOrder, LittleEndian};
use std::cmp::Ordering;

/// Header size: 1 byte isLeaf + 8 bytes parent + 2 bytes numKeys + 2 bytes numAddresses.
const HEADER_SIZE: usize = 1 + 8 + 2 + 2;

/// Whether a block is a leaf (addresses point into the table file) or
/// interior (addresses point to other blocks in this index file).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    /// Addresses are payload addresses into the table file.
    Leaf,
    /// Addresses are addresses of child blocks.
    Interior,
}

/// A single fixed-size B+ tree block: a header plus two parallel arrays
/// of keys and addresses.
#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    /// This block's own address (byte offset in the index file).
    pub address: u64,
    /// Address of the parent interior block. `0` only for the root.
    pub parent: u64,
    /// Leaf or interior.
    pub kind: BlockKind,
    /// Keys, sorted non-decreasing; duplicates permitted.
    pub keys: Vec<Value>,
    /// Addresses paired index-for-index with `keys`.
    pub addresses: Vec<u64>,
    key_type: KeyType,
    max_keys: usize,
    block_size: u32,
}

impl Block {
    /// Construct a new, empty leaf block at `address`.
    pub fn new_leaf(address: u64, parent: u64, key_type: KeyType, config: &Config) -> Block {
        Block {
            address,
            parent,
            kind: BlockKind::Leaf,
            keys: Vec::new(),
            addresses: Vec::new(),
            key_type,
            max_keys: config.max_keys(key_type),
            block_size: config.index_block_size,
        }
    }

    /// Construct a new, empty interior block at `address`.
    pub fn new_interior(address: u64, parent: u64, key_type: KeyType, config: &Config) -> Block {
        Block {
            address,
            parent,
            kind: BlockKind::Interior,
            keys: Vec::new(),
            addresses: Vec::new(),
            key_type,
            max_keys: config.max_keys(key_type),
            block_size: config.index_block_size,
        }
    }

    /// Whether this block is a leaf.
    pub fn is_leaf(&self) -> bool {
        self.kind == BlockKind::Leaf
    }

    /// Whether this block already holds `maxKeys` entries.
    pub fn full(&self) -> bool {
        self.keys.len() >= self.max_keys
    }

    /// Maximum number of keys this block can hold, given its configuration.
    pub fn max_keys(&self) -> usize {
        self.max_keys
    }

    fn cmp_key(&self, a: &Value, b: &Value) -> Ordering {
        self.key_type.compare(a, b)
    }

    /// Bisect-left insertion of `(key, address)`. Fails [`IndexError::BlockFull`]
    /// if the block is already full.
    pub fn add(&mut self, key: Value, address: u64) -> Result<()> {
        if self.full() {
            return Err(IndexError::BlockFull {
                address: self.address,
            });
        }
        let idx = self
            .keys
            .partition_point(|k| self.cmp_key(k, &key) == Ordering::Less);
        self.keys.insert(idx, key);
        self.addresses.insert(idx, address);
        Ok(())
    }

    /// Delete the rightmost occurrence of `key`. Fails
    /// [`IndexError::KeyNotFound`] if `key` is not present.
    pub fn delete(&mut self, key: &Value) -> Result<()> {
        // bisect_right: first index whose key is strictly greater than `key`.
        let idx = self
            .keys
            .partition_point(|k| self.cmp_key(k, key) != Ordering::Greater);
        if idx == 0 || self.cmp_key(&self.keys[idx - 1], key) != Ordering::Equal {
            return Err(IndexError::KeyNotFound);
        }
        self.keys.remove(idx - 1);
        self.addresses.remove(idx - 1);
        Ok(())
    }

    /// Delete the entry paired with `address`, via linear search — cheap
    /// because `maxKeys` is small (§9.7).
    pub fn delete_address(&mut self, address: u64) -> Result<()> {
        let idx = self
            .addresses
            .iter()
            .position(|&a| a == address)
            .ok_or(IndexError::KeyNotFound)?;
        self.keys.remove(idx);
        self.addresses.remove(idx);
        Ok(())
    }

    /// Look up `key` in this block. Leaves require an exact match;
    /// interiors return the address of the child subtree that could hold
    /// `key` (its nearest lower-or-equal key).
    pub fn lookup(&self, key: &Value) -> Result<u64> {
        match self.kind {
            BlockKind::Leaf => {
                let idx = self
                    .keys
                    .partition_point(|k| self.cmp_key(k, key) != Ordering::Greater);
                if idx == 0 || self.cmp_key(&self.keys[idx - 1], key) != Ordering::Equal {
                    return Err(IndexError::KeyNotFound);
                }
                Ok(self.addresses[idx - 1])
            }
            BlockKind::Interior => {
                let idx = self
                    .keys
                    .partition_point(|k| self.cmp_key(k, key) != Ordering::Greater);
                if idx == 0 {
                    return Err(IndexError::KeyNotFound);
                }
                Ok(self.addresses[idx - 1])
            }
        }
    }

    /// Serialize this block to exactly `block_size` bytes per §3's layout.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; self.block_size as usize];
        if self.keys.len() > self.max_keys {
            return Err(IndexError::BlockOverflow {
                block_size: self.block_size,
            });
        }

        buf[0] = if self.is_leaf() { 1 } else { 0 };
        LittleEndian::write_u64(&mut buf[1..9], self.parent);
        LittleEndian::write_u16(&mut buf[9..11], self.keys.len() as u16);
        LittleEndian::write_u16(&mut buf[11..13], self.addresses.len() as u16);

        let key_size = self.key_type.size();
        let keys_start = HEADER_SIZE;
        let addrs_start = keys_start + self.max_keys * key_size;
        let needed = addrs_start + self.max_keys * 8;
        if needed > buf.len() {
            return Err(IndexError::BlockOverflow {
                block_size: self.block_size,
            });
        }

        for (i, key) in self.keys.iter().enumerate() {
            let encoded = self.key_type.encode(Some(key))?;
            let start = keys_start + i * key_size;
            buf[start..start + key_size].copy_from_slice(&encoded);
        }
        for (i, &addr) in self.addresses.iter().enumerate() {
            let start = addrs_start + i * 8;
            LittleEndian::write_u64(&mut buf[start..start + 8], addr);
        }

        Ok(buf)
    }

    /// Whether the first byte of `bytes` discriminates a leaf block.
    pub fn discriminate(bytes: &[u8]) -> Result<BlockKind> {
        if bytes.is_empty() {
            return Err(IndexError::BlockMalformed {
                address: 0,
                reason: "empty buffer".into(),
            });
        }
        Ok(if bytes[0] != 0 {
            BlockKind::Leaf
        } else {
            BlockKind::Interior
        })
    }

    /// Decode a block from `bytes`, which must be exactly `config.index_block_size`
    /// bytes, read from `address`.
    pub fn decode(
        bytes: &[u8],
        key_type: KeyType,
        address: u64,
        config: &Config,
    ) -> Result<Block> {
        if bytes.len() != config.index_block_size as usize {
            return Err(IndexError::InvalidBuffer {
                expected: config.index_block_size as usize,
                actual: bytes.len(),
            });
        }
        let kind = Self::discriminate(bytes)?;
        let parent = LittleEndian::read_u64(&bytes[1..9]);
        let num_keys = LittleEndian::read_u16(&bytes[9..11]) as usize;
        let num_addresses = LittleEndian::read_u16(&bytes[11..13]) as usize;
        if num_keys != num_addresses {
            return Err(IndexError::BlockMalformed {
                address,
                reason: format!(
                    "numKeys ({}) != numAddresses ({})",
                    num_keys, num_addresses
                ),
            });
        }

        let max_keys = config.max_keys(key_type);
        if num_keys > max_keys {
            return Err(IndexError::BlockMalformed {
                address,
                reason: format!("numKeys ({}) exceeds maxKeys ({})", num_keys, max_keys),
            });
        }

        let key_size = key_type.size();
        let keys_start = HEADER_SIZE;
        let addrs_start = keys_start + max_keys * key_size;

        let mut keys = Vec::with_capacity(num_keys);
        for i in 0..num_keys {
            let start = keys_start + i * key_size;
            let slice = bytes.get(start..start + key_size).ok_or_else(|| {
                IndexError::BlockMalformed {
                    address,
                    reason: "key slot out of bounds".into(),
                }
            })?;
            // Keys stored in a non-root block are never NULL: a block slot
            // is either empty (beyond numKeys, ignored) or a live key.
            let value = key_type.decode(slice)?.ok_or_else(|| IndexError::BlockMalformed {
                address,
                reason: "stored key decoded as NULL".into(),
            })?;
            keys.push(value);
        }

        let mut addresses = Vec::with_capacity(num_addresses);
        for i in 0..num_addresses {
            let start = addrs_start + i * 8;
            let slice = bytes.get(start..start + 8).ok_or_else(|| IndexError::BlockMalformed {
                address,
                reason: "address slot out of bounds".into(),
            })?;
            addresses.push(LittleEndian::read_u64(slice));
        }

        Ok(Block {
            address,
            parent,
            kind,
            keys,
            addresses,
            key_type,
            max_keys,
            block_size: config.index_block_size,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    fn cfg() -> Config {
        Config {
            index_block_size: 64,
            max_dirty_blocks: 4,
        }
    }

    #[test]
    fn add_lookup_delete_on_a_leaf() {
        let c = cfg();
        let kt = KeyType::Int(4);
        let mut b = Block::new_leaf(0, 0, kt, &c);
        b.add(Value::Int(3), 300).unwrap();
        b.add(Value::Int(1), 100).unwrap();
        b.add(Value::Int(2), 200).unwrap();
        assert_eq!(b.keys, vec![Value::Int(1), Value::Int(2), Value::Int(3)]);
        assert_eq!(b.lookup(&Value::Int(2)).unwrap(), 200);
        assert!(b.lookup(&Value::Int(9)).is_err());

        b.delete(&Value::Int(2)).unwrap();
        assert!(b.lookup(&Value::Int(2)).is_err());
        assert!(b.delete(&Value::Int(2)).is_err());
    }

    #[test]
    fn interior_lookup_returns_inclusive_lower_bound_child() {
        let c = cfg();
        let kt = KeyType::Int(4);
        let mut b = Block::new_interior(0, 0, kt, &c);
        b.add(Value::Int(10), 1000).unwrap();
        b.add(Value::Int(20), 2000).unwrap();
        assert_eq!(b.lookup(&Value::Int(15)).unwrap(), 1000);
        assert_eq!(b.lookup(&Value::Int(20)).unwrap(), 2000);
        assert_eq!(b.lookup(&Value::Int(100)).unwrap(), 2000);
        assert!(b.lookup(&Value::Int(5)).is_err());
    }

    #[test]
    fn full_block_rejects_further_adds() {
        let c = Config {
            index_block_size: 64,
            max_dirty_blocks: 4,
        };
        let kt = KeyType::Int(4);
        let mut b = Block::new_leaf(0, 0, kt, &c);
        let max = b.max_keys();
        for i in 0..max {
            b.add(Value::Int(i as i64), i as u64).unwrap();
        }
        assert!(b.full());
        assert!(b.add(Value::Int(999), 999).is_err());
    }

    #[test]
    fn encode_decode_round_trips() {
        let c = cfg();
        let kt = KeyType::Int(4);
        let mut b = Block::new_interior(128, 64, kt, &c);
        b.add(Value::Int(5), 1).unwrap();
        b.add(Value::Int(15), 2).unwrap();
        let encoded = b.encode().unwrap();
        assert_eq!(encoded.len(), c.index_block_size as usize);
        let decoded = Block::decode(&encoded, kt, 128, &c).unwrap();
        assert_eq!(decoded, b);
    }

    #[test]
    fn decode_rejects_numkeys_above_maxkeys() {
        let c = cfg();
        let kt = KeyType::Int(4);
        let mut buf = vec![0u8; c.index_block_size as usize];
        buf[0] = 1; // leaf
        LittleEndian::write_u16(&mut buf[9..11], 9999);
        LittleEndian::write_u16(&mut buf[11..13], 9999);
        assert!(Block::decode(&buf, kt, 0, &c).is_err());
    }

    #[test]
    fn decode_rejects_mismatched_counts() {
        let c = cfg();
        let kt = KeyType::Int(4);
        let mut buf = vec![0u8; c.index_block_size as usize];
        buf[0] = 1;
        LittleEndian::write_u16(&mut buf[9..11], 1);
        LittleEndian::write_u16(&mut buf[11..13], 2);
        assert!(Block::decode(&buf, kt, 0, &c).is_err());
    }

    #[test]
    fn delete_address_on_interior() {
        let c = cfg();
        let kt = KeyType::Int(4);
        let mut b = Block::new_interior(0, 0, kt, &c);
        b.add(Value::Int(1), 100).unwrap();
        b.add(Value::Int(2), 200).unwrap();
        b.delete_address(100).unwrap();
        assert_eq!(b.keys, vec![Value::Int(2)]);
        assert!(b.delete_address(100).is_err());
    }
}
