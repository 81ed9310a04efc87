//! Hashing for transactions, blocks, orders, and state commitments.

use blake2::digest::consts::U32;
use blake2::{Blake2b, Digest};
use meridian_types::{Block, BlockHash, Order, OrderHash, ResultHash, Transaction, TxHash};
use sha2::Sha256;

use crate::CryptoError;

type Blake2b256 = Blake2b<U32>;

/// Compute a 256-bit Blake2b hash of arbitrary data.
pub fn blake2b_256(data: &[u8]) -> [u8; 32] {
    blake2b_256_multi(&[data])
}

/// Hash multiple byte slices in sequence (avoids concatenation allocation).
pub fn blake2b_256_multi(parts: &[&[u8]]) -> [u8; 32] {
    let mut hasher = Blake2b256::new();
    for part in parts {
        hasher.update(part);
    }
    let mut output = [0u8; 32];
    output.copy_from_slice(&hasher.finalize());
    output
}

pub fn sha256(data: &[u8]) -> [u8; 32] {
    let mut output = [0u8; 32];
    output.copy_from_slice(&Sha256::digest(data));
    output
}

/// Incremental SHA-256, used to build state commitments without
/// materialising the full concatenation.
#[derive(Default)]
pub struct Sha256Writer(Sha256);

impl Sha256Writer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn write(&mut self, bytes: &[u8]) {
        self.0.update(bytes);
    }

    pub fn finish(self) -> ResultHash {
        let mut output = [0u8; 32];
        output.copy_from_slice(&self.0.finalize());
        ResultHash::new(output)
    }
}

pub fn hash_transaction(tx: &Transaction) -> TxHash {
    TxHash::new(blake2b_256(&tx.preimage()))
}

pub fn hash_block(block: &Block) -> Result<BlockHash, CryptoError> {
    Ok(BlockHash::new(blake2b_256(&block.preimage()?)))
}

pub fn hash_order(order: &Order) -> OrderHash {
    OrderHash::new(blake2b_256(&order.preimage()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use meridian_types::{Address, Timestamp, TxKind};

    #[test]
    fn blake2b_deterministic() {
        assert_eq!(blake2b_256(b"meridian"), blake2b_256(b"meridian"));
        assert_ne!(blake2b_256(b"hello"), blake2b_256(b"world"));
    }

    #[test]
    fn blake2b_multi_equivalent() {
        let single = blake2b_256(b"helloworld");
        let multi = blake2b_256_multi(&[b"hello", b"world"]);
        assert_eq!(single, multi);
    }

    #[test]
    fn sha256_known_vector() {
        let empty = sha256(b"");
        assert_eq!(empty[0], 0xe3);
        assert_eq!(empty[31], 0x55);
    }

    #[test]
    fn writer_matches_one_shot() {
        let mut w = Sha256Writer::new();
        w.write(b"ab");
        w.write(b"cd");
        assert_eq!(w.finish().as_bytes(), &sha256(b"abcd"));
    }

    #[test]
    fn tx_hash_ignores_signature_and_fee() {
        let tx = Transaction::new(
            TxKind::plain_transfer(),
            1,
            Address::new([1; 32]),
            Address::new([2; 32]),
            10,
            Timestamp::new(5),
        );
        let with_fee = tx.clone().with_fee(3);
        assert_eq!(hash_transaction(&tx), hash_transaction(&with_fee));
    }
}
