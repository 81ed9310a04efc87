//! Ed25519 signing and verification for messages, transactions, and orders.

use ed25519_dalek::{Signer, SigningKey, Verifier, VerifyingKey};
use meridian_types::{Address, KeyPair, Order, PrivateKey, PublicKey, Signature, Transaction};

use crate::hash::{hash_order, hash_transaction};

/// Sign a message with a private key, returning the signature.
pub fn sign_message(message: &[u8], private_key: &PrivateKey) -> Signature {
    let signing_key = SigningKey::from_bytes(&private_key.0);
    Signature(signing_key.sign(message).to_bytes())
}

/// Verify a signature against a message and public key.
///
/// Returns `false` for malformed keys as well as bad signatures.
pub fn verify_signature(message: &[u8], signature: &Signature, public_key: &PublicKey) -> bool {
    let Ok(verifying_key) = VerifyingKey::from_bytes(&public_key.0) else {
        return false;
    };
    let dalek_sig = ed25519_dalek::Signature::from_bytes(&signature.0);
    verifying_key.verify(message, &dalek_sig).is_ok()
}

/// Stamp `tx.hash` from its pre-image. Used for unsigned transactions
/// (coinbase and conversions).
pub fn seal_transaction(tx: &mut Transaction) {
    tx.hash = hash_transaction(tx);
}

/// Stamp the hash and sign it with the sender's key.
pub fn sign_transaction(tx: &mut Transaction, keys: &KeyPair) {
    seal_transaction(tx);
    tx.signature = Some(sign_message(tx.hash.as_bytes(), &keys.private));
}

/// The stored hash matches the pre-image and `from` signed it.
pub fn verify_transaction(tx: &Transaction) -> bool {
    if hash_transaction(tx) != tx.hash {
        return false;
    }
    match &tx.signature {
        Some(sig) => verify_signature(tx.hash.as_bytes(), sig, &tx.from.public_key()),
        None => false,
    }
}

pub fn sign_order(order: &mut Order, marketplace: &KeyPair) {
    order.hash = hash_order(order);
    order.signature = Some(sign_message(order.hash.as_bytes(), &marketplace.private));
}

/// The order hash matches its content and the marketplace key signed it.
pub fn verify_order(order: &Order, marketplace: &Address) -> bool {
    if marketplace.is_zero() || hash_order(order) != order.hash {
        return false;
    }
    match &order.signature {
        Some(sig) => verify_signature(order.hash.as_bytes(), sig, &marketplace.public_key()),
        None => false,
    }
}
