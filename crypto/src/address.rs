//! Address derivation from public keys.

use meridian_types::{Address, PublicKey};

/// The account address owned by `public_key`.
pub fn derive_address(public_key: &PublicKey) -> Address {
    Address::from_public_key(public_key)
}

/// Whether `address` is a well-formed, checksum-valid, non-nil `mrd_` address
/// whose key bytes decode to a valid ed25519 point.
pub fn validate_address(address: &str) -> bool {
    match Address::decode(address) {
        Ok(addr) => is_usable(&addr),
        Err(_) => false,
    }
}

/// A non-nil address that is a valid ed25519 point, so signatures for it can
/// be checked at all.
pub fn is_usable(address: &Address) -> bool {
    !address.is_zero() && ed25519_dalek::VerifyingKey::from_bytes(address.as_bytes()).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::keypair_from_seed;

    #[test]
    fn derive_and_validate() {
        let kp = keypair_from_seed(&[7u8; 32]);
        let addr = derive_address(&kp.public);
        assert!(addr.to_string().starts_with("mrd_"));
        assert!(validate_address(&addr.to_string()));
    }

    #[test]
    fn nil_address_is_not_usable() {
        assert!(!is_usable(&Address::ZERO));
        assert!(!validate_address(&Address::ZERO.to_string()));
    }

    #[test]
    fn garbage_rejected() {
        assert!(!validate_address("mrd_tooshort"));
        assert!(!validate_address(""));
    }
}
