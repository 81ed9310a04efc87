//! SHA-256 Merkle roots.
//!
//! Leaves are `sha256(item)`. Each level pairs adjacent nodes as
//! `sha256(left ‖ right)`; an odd trailing node is paired with itself.

use meridian_types::{MerkleRoot, Transaction};

use crate::hash::sha256;
use crate::CryptoError;

/// Root over arbitrary leaf payloads. An empty list yields `MerkleRoot::ZERO`.
pub fn merkle_root<T: AsRef<[u8]>>(items: &[T]) -> MerkleRoot {
    if items.is_empty() {
        return MerkleRoot::ZERO;
    }
    let mut level: Vec<[u8; 32]> = items.iter().map(|i| sha256(i.as_ref())).collect();
    while level.len() > 1 {
        level = level
            .chunks(2)
            .map(|pair| {
                let left = pair[0];
                let right = pair.get(1).copied().unwrap_or(left);
                let mut buf = [0u8; 64];
                buf[..32].copy_from_slice(&left);
                buf[32..].copy_from_slice(&right);
                sha256(&buf)
            })
            .collect();
    }
    MerkleRoot::new(level[0])
}

/// Root over the bincode serialization of each transaction.
pub fn transactions_root(txs: &[Transaction]) -> Result<MerkleRoot, CryptoError> {
    let leaves = txs
        .iter()
        .map(bincode::serialize)
        .collect::<Result<Vec<_>, _>>()
        .map_err(meridian_types::TypesError::from)?;
    Ok(merkle_root(&leaves))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_is_zero() {
        let empty: [&[u8]; 0] = [];
        assert!(merkle_root(&empty).is_zero());
    }

    #[test]
    fn single_leaf_is_its_hash() {
        assert_eq!(merkle_root(&[b"a"]).as_bytes(), &sha256(b"a"));
    }

    #[test]
    fn odd_leaf_pairs_with_itself() {
        let three = merkle_root(&[b"a".as_slice(), b"b", b"c"]);
        let four = merkle_root(&[b"a".as_slice(), b"b", b"c", b"c"]);
        assert_eq!(three, four);
    }

    #[test]
    fn order_matters() {
        assert_ne!(
            merkle_root(&[b"a".as_slice(), b"b"]),
            merkle_root(&[b"b".as_slice(), b"a"])
        );
    }
}
