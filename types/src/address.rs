//! Account addresses.
//!
//! An address is the 32-byte ed25519 public key of the account holder. The
//! all-zero address is the nil sentinel carried by coinbase transactions.
//!
//! Text format: `mrd_` + base32(public_key, 52 chars) + base32(checksum, 8 chars),
//! where the checksum is the first 5 bytes of Blake2b-256(public_key).
//! Base32 alphabet: `13456789abcdefghijkmnopqrstuwxyz` (avoids ambiguous chars).

use blake2::digest::consts::U32;
use blake2::{Blake2b, Digest};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::keys::PublicKey;
use crate::TypesError;

const BASE32_ALPHABET: &[u8; 32] = b"13456789abcdefghijkmnopqrstuwxyz";

/// Reverse lookup table: ASCII byte → 5-bit value (0xFF = invalid).
const BASE32_DECODE: [u8; 128] = {
    let mut table = [0xFFu8; 128];
    let alpha = BASE32_ALPHABET;
    let mut i = 0;
    while i < 32 {
        table[alpha[i] as usize] = i as u8;
        i += 1;
    }
    table
};

/// Number of base32 characters for the public key (256 bits → ceil(256/5) = 52).
const PUBKEY_CHARS: usize = 52;
/// Encoded length after the prefix: 52 pubkey + 8 checksum.
const ENCODED_LEN: usize = 60;

/// A fixed-width account identifier.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Address([u8; 32]);

impl Address {
    /// The prefix every textual address starts with.
    pub const PREFIX: &'static str = "mrd_";

    /// The nil address, used as `from` on coinbase transactions.
    pub const ZERO: Self = Self([0u8; 32]);

    pub fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn from_public_key(public_key: &PublicKey) -> Self {
        Self(public_key.0)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }

    /// The public key that signs for this address.
    pub fn public_key(&self) -> PublicKey {
        PublicKey(self.0)
    }

    /// Render the checksummed `mrd_` text form.
    pub fn encode(&self) -> String {
        let checksum = checksum(&self.0);
        let mut out = String::with_capacity(Self::PREFIX.len() + ENCODED_LEN);
        out.push_str(Self::PREFIX);
        out.push_str(&encode_base32(&self.0));
        out.push_str(&encode_base32(&checksum));
        out
    }

    /// Parse and checksum-verify an `mrd_` address.
    pub fn decode(s: &str) -> Result<Self, TypesError> {
        let encoded = s
            .strip_prefix(Self::PREFIX)
            .ok_or_else(|| TypesError::InvalidAddress(format!("missing prefix: {s}")))?;
        if encoded.len() != ENCODED_LEN {
            return Err(TypesError::InvalidAddress(format!("wrong length: {s}")));
        }
        let (key_part, sum_part) = encoded.split_at(PUBKEY_CHARS);
        let key: [u8; 32] = decode_base32_fixed(key_part)
            .ok_or_else(|| TypesError::InvalidAddress(format!("bad encoding: {s}")))?;
        let sum: [u8; 5] = decode_base32_fixed(sum_part)
            .ok_or_else(|| TypesError::InvalidAddress(format!("bad encoding: {s}")))?;
        if sum != checksum(&key) {
            return Err(TypesError::InvalidAddress(format!("checksum mismatch: {s}")));
        }
        Ok(Self(key))
    }
}

fn checksum(key: &[u8; 32]) -> [u8; 5] {
    let mut hasher = Blake2b::<U32>::new();
    hasher.update(key);
    let digest = hasher.finalize();
    let mut out = [0u8; 5];
    out.copy_from_slice(&digest[..5]);
    out
}

fn encode_base32(bytes: &[u8]) -> String {
    let num_chars = (bytes.len() * 8).div_ceil(5);
    let mut result = String::with_capacity(num_chars);

    let mut buffer: u64 = 0;
    let mut bits_in_buffer = 0;

    for &byte in bytes {
        buffer = (buffer << 8) | byte as u64;
        bits_in_buffer += 8;
        while bits_in_buffer >= 5 {
            bits_in_buffer -= 5;
            let idx = ((buffer >> bits_in_buffer) & 0x1F) as usize;
            result.push(BASE32_ALPHABET[idx] as char);
        }
    }
    if bits_in_buffer > 0 {
        let idx = ((buffer << (5 - bits_in_buffer)) & 0x1F) as usize;
        result.push(BASE32_ALPHABET[idx] as char);
    }

    result
}

fn decode_base32_fixed<const N: usize>(s: &str) -> Option<[u8; N]> {
    let mut buffer: u64 = 0;
    let mut bits_in_buffer = 0;
    let mut result = [0u8; N];
    let mut pos = 0;

    for c in s.bytes() {
        if c >= 128 {
            return None;
        }
        let val = BASE32_DECODE[c as usize];
        if val == 0xFF {
            return None;
        }
        buffer = (buffer << 5) | val as u64;
        bits_in_buffer += 5;
        if bits_in_buffer >= 8 {
            bits_in_buffer -= 8;
            if pos < N {
                result[pos] = (buffer >> bits_in_buffer) as u8;
                pos += 1;
            }
        }
    }

    if pos < N {
        return None;
    }
    Some(result)
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_zero() {
            return write!(f, "Address(nil)");
        }
        let text = self.encode();
        write!(f, "Address({}\u{2026})", &text[..12])
    }
}

impl FromStr for Address {
    type Err = TypesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::decode(s)
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if serializer.is_human_readable() {
            serializer.serialize_str(&self.encode())
        } else {
            self.0.serialize(serializer)
        }
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        if deserializer.is_human_readable() {
            let s = String::deserialize(deserializer)?;
            Self::decode(&s).map_err(serde::de::Error::custom)
        } else {
            <[u8; 32]>::deserialize(deserializer).map(Self)
        }
    }
}
