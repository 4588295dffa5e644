//! Detached Ed25519 signature verification for discovery documents
//!
//! Discovery documents are published alongside a `.sig` companion file
//! containing a base64-encoded detached Ed25519 signature over the exact
//! document bytes. This module verifies that signature against the source's
//! configured public key.
//!
//! Verification fails closed: a key or signature of the wrong length is a
//! verification failure, never a panic or a skipped check.

use ed25519_dalek::{Signature, VerifyingKey, PUBLIC_KEY_LENGTH, SIGNATURE_LENGTH};

/// Verifies a detached Ed25519 signature over a byte payload.
///
/// Pure function with no side effects. Returns `false` for any malformed
/// key or signature (wrong length, non-canonical point) as well as for a
/// genuine signature mismatch; callers never need to distinguish the cases.
///
/// # Arguments
///
/// * `message` - The exact bytes the signature covers.
/// * `signature` - Raw 64-byte detached Ed25519 signature.
/// * `public_key` - Raw 32-byte Ed25519 public key.
///
/// # Examples
///
/// ```
/// use vpnportal::discovery::signature::verify_detached;
///
/// // Wrong-length inputs fail closed.
/// assert!(!verify_detached(b"payload", &[0u8; 10], &[0u8; 32]));
/// assert!(!verify_detached(b"payload", &[0u8; 64], &[0u8; 5]));
/// ```
pub fn verify_detached(message: &[u8], signature: &[u8], public_key: &[u8]) -> bool {
    let Ok(key_bytes) = <[u8; PUBLIC_KEY_LENGTH]>::try_from(public_key) else {
        return false;
    };
    let Ok(verifying_key) = VerifyingKey::from_bytes(&key_bytes) else {
        return false;
    };
    let Ok(sig_bytes) = <[u8; SIGNATURE_LENGTH]>::try_from(signature) else {
        return false;
    };
    let signature = Signature::from_bytes(&sig_bytes);

    verifying_key.verify_strict(message, &signature).is_ok()
}
