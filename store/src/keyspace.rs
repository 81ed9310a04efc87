//! Physical key layout shared by every backend.
//!
//! Plain keys, named-map entries, and lists live in one flat ordered keyspace,
//! separated by a one-byte tag so they can never collide. A list is a small
//! header plus one key per element, so pushing and popping at either end
//! touches a constant number of keys however long the list grows.

use std::ops::Range;

use crate::StoreError;

const PLAIN: u8 = b'k';
const MAP: u8 = b'm';
const LIST: u8 = b'l';
const LIST_ITEM: u8 = b'i';

pub fn plain(key: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(1 + key.len());
    out.push(PLAIN);
    out.extend_from_slice(key);
    out
}

/// Map name is length-prefixed so `("ab", "c")` and `("a", "bc")` differ.
pub fn map_entry(map: &[u8], key: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(3 + map.len() + key.len());
    out.push(MAP);
    out.extend_from_slice(&(map.len() as u16).to_be_bytes());
    out.extend_from_slice(map);
    out.extend_from_slice(key);
    out
}

/// Metadata key of a list: the position of its front element and its length.
pub fn list(name: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(1 + name.len());
    out.push(LIST);
    out.extend_from_slice(name);
    out
}

/// One list element, keyed by its position.
pub fn list_item(name: &[u8], pos: u64) -> Vec<u8> {
    let mut out = Vec::with_capacity(11 + name.len());
    out.push(LIST_ITEM);
    out.extend_from_slice(&(name.len() as u16).to_be_bytes());
    out.extend_from_slice(name);
    out.extend_from_slice(&pos.to_be_bytes());
    out
}

/// Front position of a list with nothing in it. Pushes to the front move
/// down from here, pushes to the back move up.
pub const LIST_ORIGIN: u64 = 1 << 63;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ListMeta {
    pub head: u64,
    pub len: u64,
}

impl ListMeta {
    pub const EMPTY: Self = Self {
        head: LIST_ORIGIN,
        len: 0,
    };

    pub fn decode(raw: Option<Vec<u8>>) -> Result<Self, StoreError> {
        let Some(raw) = raw else {
            return Ok(Self::EMPTY);
        };
        let bytes: [u8; 16] = raw.as_slice().try_into().map_err(|_| {
            StoreError::Corruption(format!("list header of {} bytes", raw.len()))
        })?;
        let mut head = [0u8; 8];
        let mut len = [0u8; 8];
        head.copy_from_slice(&bytes[..8]);
        len.copy_from_slice(&bytes[8..]);
        Ok(Self {
            head: u64::from_be_bytes(head),
            len: u64::from_be_bytes(len),
        })
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(16);
        out.extend_from_slice(&self.head.to_be_bytes());
        out.extend_from_slice(&self.len.to_be_bytes());
        out
    }

    /// Positions of elements `[start, end)`, clamped to the list.
    pub fn window(&self, start: usize, end: usize) -> Range<u64> {
        let end = (end as u64).min(self.len);
        let start = (start as u64).min(end);
        self.head + start..self.head + end
    }
}

pub fn missing_item(name: &[u8], pos: u64) -> StoreError {
    StoreError::Corruption(format!(
        "list {} has no element at {pos}",
        String::from_utf8_lossy(name)
    ))
}
