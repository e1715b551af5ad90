//! The typed value codec (component C1).
//!
//! Fixed-width, bit-exact encode/decode for the closed set of scalar types
//! a column can be indexed on, plus the `Varchar` sidecar-backed type for
//! variable-length strings (not indexable, but part of the same closed
//! type family per the specification).
//!
//! Grounded on the teacher's `Buffer`/`Block` cursor-based read/write
//! methods (`examples/konstantinoscs-Rust_filesystem/api/src/types.rs`) for the I/O shape, but the actual byte
//! layout is hand-written with `byteorder`/`to_le_bytes` rather than a
//! derive: this wire format is dictated byte-for-byte by the
//! specification, not left to a general-purpose serializer.

use crate::error::{IndexError, Result};
use byteorder::{ByteOrder, LittleEndian};
use std::cmp::Ordering;

/// The type of a value that can be stored in an indexed column: the
/// subset of scalar types with a total order, usable as a B+ tree key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyType {
    /// Signed integer of `n` bytes, `n` in `{1, 2, 4, 8}`.
    Int(u8),
    /// Unsigned integer of `n` bytes, `n` in `{1, 2, 4, 8}`.
    Uint(u8),
    /// IEEE-754 float of `n` bytes, `n` in `{4, 8}`.
    Float(u8),
    /// Fixed-length, zero-padded byte string of `n` bytes, `1 <= n <= 256`.
    Char(u16),
}

/// A decoded scalar value. `Varchar` is intentionally absent: it is not
/// indexable and is handled separately via [`VarcharStore`].
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// A signed integer, widened to `i64` regardless of its encoded width.
    Int(i64),
    /// An unsigned integer, widened to `u64` regardless of its encoded width.
    Uint(u64),
    /// A float, widened to `f64` regardless of its encoded width.
    Float(f64),
    /// A fixed-length byte string, unpadded (leading `0x00` bytes stripped).
    Char(Vec<u8>),
}

impl Value {
    fn variant_name(&self) -> &'static str {
        match self {
            Value::Int(_) => "Int",
            Value::Uint(_) => "Uint",
            Value::Float(_) => "Float",
            Value::Char(_) => "Char",
        }
    }
}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => a.partial_cmp(b),
            (Value::Uint(a), Value::Uint(b)) => a.partial_cmp(b),
            (Value::Float(a), Value::Float(b)) => a.partial_cmp(b),
            // Char keys are compared lexicographically over their
            // zero-padded on-disk form, matching the byte order a
            // straight `memcmp` of the encoded block slots would give.
            (Value::Char(a), Value::Char(b)) => a.partial_cmp(b),
            _ => None,
        }
    }
}

impl KeyType {
    /// Serialized size of this type, in bytes.
    pub fn size(&self) -> usize {
        match self {
            KeyType::Int(n) | KeyType::Uint(n) | KeyType::Float(n) => *n as usize,
            KeyType::Char(n) => *n as usize,
        }
    }

    fn check_width(n: u8, allowed: &[u8]) -> Result<()> {
        if allowed.contains(&n) {
            Ok(())
        } else {
            Err(IndexError::InvalidConfig(format!(
                "width {} not among supported widths {:?}",
                n, allowed
            )))
        }
    }

    /// Validate that this `KeyType` itself names a supported width.
    pub fn validate(&self) -> Result<()> {
        match self {
            KeyType::Int(n) | KeyType::Uint(n) => Self::check_width(*n, &[1, 2, 4, 8]),
            KeyType::Float(n) => Self::check_width(*n, &[4, 8]),
            KeyType::Char(n) => {
                if *n >= 1 && *n <= 256 {
                    Ok(())
                } else {
                    Err(IndexError::InvalidConfig(format!(
                        "Char width {} out of range 1..=256",
                        n
                    )))
                }
            }
        }
    }

    /// The inclusive numeric range this type can hold (signed/unsigned
    /// integers and floats only; `None` for `Char`, whose validity is a
    /// length check instead).
    fn int_range(&self) -> Option<(i128, i128)> {
        match self {
            KeyType::Int(n) => {
                let max = 2i128.pow(8 * (*n as u32) - 1) - 1;
                Some((-max, max))
            }
            KeyType::Uint(n) => {
                let max = 2i128.pow(8 * (*n as u32)) - 2;
                Some((0, max))
            }
            _ => None,
        }
    }

    /// Whether `v` is encodable: either within the type's ordinary range,
    /// or equal to its reserved NULL sentinel (`nullValue` sits one step
    /// outside the range on purpose, so it needs its own disjunct here).
    pub fn is_valid(&self, v: &Value) -> bool {
        if *v == self.null_value() {
            return true;
        }
        match (self, v) {
            (KeyType::Int(_), Value::Int(x)) => {
                let (lo, hi) = self.int_range().unwrap();
                (*x as i128) >= lo && (*x as i128) <= hi
            }
            (KeyType::Uint(_), Value::Uint(x)) => {
                let (lo, hi) = self.int_range().unwrap();
                (*x as i128) >= lo && (*x as i128) <= hi
            }
            (KeyType::Float(_), Value::Float(x)) => x.is_finite() || x.is_infinite(),
            (KeyType::Char(n), Value::Char(bytes)) => bytes.len() <= *n as usize,
            _ => false,
        }
    }

    /// The reserved NULL sentinel for this type.
    pub fn null_value(&self) -> Value {
        match self {
            KeyType::Int(n) => Value::Int(-(2i128.pow(8 * (*n as u32) - 1)) as i64),
            KeyType::Uint(n) => Value::Uint((2u128.pow(8 * (*n as u32)) - 1) as u64),
            KeyType::Float(_) => Value::Float(f64::INFINITY),
            KeyType::Char(n) => Value::Char(vec![0u8; *n as usize]),
        }
    }

    /// Encode `v` (or the NULL sentinel, if `v` is `None`) to exactly
    /// `self.size()` bytes.
    pub fn encode(&self, v: Option<&Value>) -> Result<Vec<u8>> {
        // Writers encoding +inf explicitly (as opposed to the implicit
        // `None` -> NULL mapping) collide with the Float NULL sentinel
        // and must be rejected, per the float contract.
        if let (KeyType::Float(_), Some(Value::Float(x))) = (self, v) {
            if *x == f64::INFINITY {
                return Err(IndexError::InvalidValue(
                    "+infinity is reserved as the Float NULL sentinel".into(),
                ));
            }
        }

        let owned;
        let v = match v {
            Some(v) => v,
            None => {
                owned = self.null_value();
                &owned
            }
        };

        if !self.is_valid(v) {
            return Err(IndexError::InvalidValue(format!(
                "{:?} is not a valid {:?}",
                v, self
            )));
        }

        let size = self.size();
        let mut buf = vec![0u8; size];
        match (self, v) {
            (KeyType::Int(1), Value::Int(x)) => buf[0] = *x as i8 as u8,
            (KeyType::Int(2), Value::Int(x)) => LittleEndian::write_i16(&mut buf, *x as i16),
            (KeyType::Int(4), Value::Int(x)) => LittleEndian::write_i32(&mut buf, *x as i32),
            (KeyType::Int(8), Value::Int(x)) => LittleEndian::write_i64(&mut buf, *x),
            (KeyType::Uint(1), Value::Uint(x)) => buf[0] = *x as u8,
            (KeyType::Uint(2), Value::Uint(x)) => LittleEndian::write_u16(&mut buf, *x as u16),
            (KeyType::Uint(4), Value::Uint(x)) => LittleEndian::write_u32(&mut buf, *x as u32),
            (KeyType::Uint(8), Value::Uint(x)) => LittleEndian::write_u64(&mut buf, *x),
            (KeyType::Float(4), Value::Float(x)) => LittleEndian::write_f32(&mut buf, *x as f32),
            (KeyType::Float(8), Value::Float(x)) => LittleEndian::write_f64(&mut buf, *x),
            (KeyType::Char(n), Value::Char(bytes)) => {
                // Left-pad with 0x00 up to `n` bytes.
                let start = *n as usize - bytes.len();
                buf[start..].copy_from_slice(bytes);
            }
            _ => {
                return Err(IndexError::InvalidValue(format!(
                    "{} value does not match key type {:?}",
                    v.variant_name(),
                    self
                )))
            }
        }
        Ok(buf)
    }

    /// Decode exactly `self.size()` bytes. Returns `None` if the bytes
    /// equal the encoded NULL sentinel.
    pub fn decode(&self, bytes: &[u8]) -> Result<Option<Value>> {
        if bytes.len() != self.size() {
            return Err(IndexError::InvalidBuffer {
                expected: self.size(),
                actual: bytes.len(),
            });
        }

        let value = match self {
            KeyType::Int(1) => Value::Int(bytes[0] as i8 as i64),
            KeyType::Int(2) => Value::Int(LittleEndian::read_i16(bytes) as i64),
            KeyType::Int(4) => Value::Int(LittleEndian::read_i32(bytes) as i64),
            KeyType::Int(8) => Value::Int(LittleEndian::read_i64(bytes)),
            KeyType::Uint(1) => Value::Uint(bytes[0] as u64),
            KeyType::Uint(2) => Value::Uint(LittleEndian::read_u16(bytes) as u64),
            KeyType::Uint(4) => Value::Uint(LittleEndian::read_u32(bytes) as u64),
            KeyType::Uint(8) => Value::Uint(LittleEndian::read_u64(bytes)),
            KeyType::Float(4) => Value::Float(LittleEndian::read_f32(bytes) as f64),
            KeyType::Float(8) => Value::Float(LittleEndian::read_f64(bytes)),
            KeyType::Char(_) => {
                let first_nonzero = bytes.iter().position(|&b| b != 0);
                match first_nonzero {
                    None => Value::Char(Vec::new()), // all-zero: handled as NULL below
                    Some(i) => Value::Char(bytes[i..].to_vec()),
                }
            }
            KeyType::Int(n) | KeyType::Uint(n) | KeyType::Float(n) => {
                return Err(IndexError::InvalidConfig(format!(
                    "unsupported width {} for {:?}",
                    n, self
                )))
            }
        };

        if value == self.null_value() || (matches!(self, KeyType::Char(_)) && is_all_zero(bytes))
        {
            return Ok(None);
        }
        Ok(Some(value))
    }

    /// Compare two decoded key values of this type. Panics if either
    /// value does not belong to this type — a caller bug, since every
    /// key in one index shares a single `KeyType`.
    pub fn compare(&self, a: &Value, b: &Value) -> Ordering {
        a.partial_cmp(b)
            .expect("keys compared must share this index's KeyType")
    }
}

fn is_all_zero(bytes: &[u8]) -> bool {
    bytes.iter().all(|&b| b == 0)
}
