//! 32-byte digest types for transactions, blocks, and state commitments.
//!
//! All hash types render as lowercase hex in human-readable formats (JSON,
//! TOML) and as raw 32-byte arrays in binary formats (bincode).

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

use crate::TypesError;

macro_rules! hash_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
        pub struct $name([u8; 32]);

        impl $name {
            pub const ZERO: Self = Self([0u8; 32]);

            pub fn new(bytes: [u8; 32]) -> Self {
                Self(bytes)
            }

            pub fn as_bytes(&self) -> &[u8; 32] {
                &self.0
            }

            pub fn is_zero(&self) -> bool {
                self.0 == [0u8; 32]
            }

            /// Parse from a 64-character hex string.
            pub fn from_hex(s: &str) -> Result<Self, TypesError> {
                let bytes = hex::decode(s).map_err(|e| TypesError::InvalidHash(e.to_string()))?;
                let arr: [u8; 32] = bytes
                    .try_into()
                    .map_err(|_| TypesError::InvalidHash(format!("expected 32 bytes: {s}")))?;
                Ok(Self(arr))
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({}\u{2026})", stringify!($name), hex::encode(&self.0[..4]))
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", hex::encode(self.0))
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                if serializer.is_human_readable() {
                    serializer.serialize_str(&hex::encode(self.0))
                } else {
                    self.0.serialize(serializer)
                }
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                if deserializer.is_human_readable() {
                    let s = String::deserialize(deserializer)?;
                    Self::from_hex(&s).map_err(serde::de::Error::custom)
                } else {
                    <[u8; 32]>::deserialize(deserializer).map(Self)
                }
            }
        }
    };
}

hash_type!(
    /// Digest of a transaction's `{nonce, amount, from, to, time}` pre-image.
    TxHash
);

hash_type!(
    /// Digest identifying a block: `{height, prev_hash, transactions, timestamp}`.
    BlockHash
);

hash_type!(
    /// State-commitment digest over the post-block values of every touched account.
    ResultHash
);

hash_type!(
    /// Root of the Merkle tree over a block's serialized transactions.
    MerkleRoot
);

hash_type!(
    /// Digest of a marketplace order's content fields.
    OrderHash
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_is_zero() {
        assert!(TxHash::ZERO.is_zero());
        assert!(!BlockHash::new([1u8; 32]).is_zero());
    }

    #[test]
    fn hex_roundtrip() {
        let h = BlockHash::new([0xAB; 32]);
        let parsed = BlockHash::from_hex(&h.to_string()).unwrap();
        assert_eq!(parsed, h);
    }

    #[test]
    fn from_hex_rejects_wrong_length() {
        assert!(TxHash::from_hex("abcd").is_err());
        assert!(TxHash::from_hex("zz").is_err());
    }

    #[test]
    fn json_uses_hex_and_bincode_uses_bytes() {
        let h = ResultHash::new([7u8; 32]);
        let json = serde_json::to_string(&h).unwrap();
        assert_eq!(json, format!("\"{}\"", "07".repeat(32)));
        let back: ResultHash = serde_json::from_str(&json).unwrap();
        assert_eq!(back, h);

        let bin = bincode::serialize(&h).unwrap();
        assert_eq!(bin.len(), 32);
        let back: ResultHash = bincode::deserialize(&bin).unwrap();
        assert_eq!(back, h);
    }
}
