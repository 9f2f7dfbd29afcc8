//! Relying-party wire containers: the 52-byte key handle and the extracted
//! public key.
//!
//! A key handle is the only state a relying party keeps for a registration;
//! the authenticator itself stores nothing. Layout, fixed bit-for-bit:
//!
//! ```text
//! nonce[0:4] ‖ auth_tag[4:36] ‖ integrity_tag[36:52]
//! ```
//!
//! The nonce names the derivation to repeat; the auth tag binds the derived
//! key to the encrypted transport; the integrity tag binds the whole handle
//! to the application id under the device master key, so a captured handle
//! cannot be replayed for a different application or device.

use serde::{Deserialize, Serialize};

use crate::element::{PUBLIC_KEY_LEN, SCALAR_LEN};
use crate::error::TokenError;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Application (relying party) identifier length.
pub const APP_ID_LEN: usize = 32;

/// Registration nonce length.
pub const NONCE_LEN: usize = 4;

/// Transport authentication tag length.
pub const AUTH_TAG_LEN: usize = 32;

/// Handle integrity tag length.
pub const INTEGRITY_TAG_LEN: usize = 16;

/// Nonce plus auth tag — the portion the integrity tag covers.
pub const HANDLE_PREFIX_LEN: usize = NONCE_LEN + AUTH_TAG_LEN;

/// Total serialized key handle length.
pub const KEY_HANDLE_LEN: usize = HANDLE_PREFIX_LEN + INTEGRITY_TAG_LEN;

// ---------------------------------------------------------------------------
// Key handle
// ---------------------------------------------------------------------------

/// Opaque registration token handed to the relying party.
///
/// Produced once by key-pair generation, presented back on every
/// authentication. The authenticator re-derives the signing key from it on
/// demand; nothing about it is secret.
#[must_use = "the key handle must be returned to the relying party"]
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyHandle {
    /// Fresh element randomness naming this derivation.
    pub nonce: [u8; NONCE_LEN],
    /// Digest binding the derived key to the encrypted-write transport.
    pub auth_tag: [u8; AUTH_TAG_LEN],
    /// Keyed tag binding nonce, auth tag and application id together.
    pub integrity_tag: [u8; INTEGRITY_TAG_LEN],
}

impl KeyHandle {
    /// Serialize to the fixed 52-byte wire layout.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; KEY_HANDLE_LEN] {
        let mut out = [0u8; KEY_HANDLE_LEN];
        out[..NONCE_LEN].copy_from_slice(&self.nonce);
        out[NONCE_LEN..HANDLE_PREFIX_LEN].copy_from_slice(&self.auth_tag);
        out[HANDLE_PREFIX_LEN..].copy_from_slice(&self.integrity_tag);
        out
    }

    /// Parse the fixed 52-byte wire layout.
    ///
    /// # Errors
    ///
    /// Returns [`TokenError::MalformedHandle`] if `bytes` is not exactly
    /// 52 bytes. Content is not validated here — integrity is a separate,
    /// keyed check.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, TokenError> {
        if bytes.len() != KEY_HANDLE_LEN {
            return Err(TokenError::MalformedHandle(format!(
                "handle was {} bytes (expected {KEY_HANDLE_LEN})",
                bytes.len()
            )));
        }

        let mut nonce = [0u8; NONCE_LEN];
        nonce.copy_from_slice(&bytes[..NONCE_LEN]);
        let mut auth_tag = [0u8; AUTH_TAG_LEN];
        auth_tag.copy_from_slice(&bytes[NONCE_LEN..HANDLE_PREFIX_LEN]);
        let mut integrity_tag = [0u8; INTEGRITY_TAG_LEN];
        integrity_tag.copy_from_slice(&bytes[HANDLE_PREFIX_LEN..]);

        Ok(Self {
            nonce,
            auth_tag,
            integrity_tag,
        })
    }

    /// The 36-byte prefix (`nonce ‖ auth_tag`) the integrity tag is
    /// computed over.
    #[must_use]
    pub fn prefix(&self) -> [u8; HANDLE_PREFIX_LEN] {
        let mut out = [0u8; HANDLE_PREFIX_LEN];
        out[..NONCE_LEN].copy_from_slice(&self.nonce);
        out[NONCE_LEN..].copy_from_slice(&self.auth_tag);
        out
    }
}

// ---------------------------------------------------------------------------
// Public key
// ---------------------------------------------------------------------------

/// P-256 public key as extracted from a signing slot: affine coordinates,
/// 64 bytes `X ‖ Y` on the wire.
#[must_use = "the public key must be returned to the relying party"]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicKey {
    /// Affine X coordinate.
    pub x: [u8; SCALAR_LEN],
    /// Affine Y coordinate.
    pub y: [u8; SCALAR_LEN],
}

impl PublicKey {
    /// Serialize as `X ‖ Y`.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; PUBLIC_KEY_LEN] {
        let mut out = [0u8; PUBLIC_KEY_LEN];
        out[..SCALAR_LEN].copy_from_slice(&self.x);
        out[SCALAR_LEN..].copy_from_slice(&self.y);
        out
    }

    /// Parse a 64-byte `X ‖ Y` encoding.
    ///
    /// # Errors
    ///
    /// Returns [`TokenError::InvalidKeyMaterial`] on any other length.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, TokenError> {
        if bytes.len() != PUBLIC_KEY_LEN {
            return Err(TokenError::InvalidKeyMaterial(format!(
                "public key was {} bytes (expected {PUBLIC_KEY_LEN})",
                bytes.len()
            )));
        }
        let mut x = [0u8; SCALAR_LEN];
        x.copy_from_slice(&bytes[..SCALAR_LEN]);
        let mut y = [0u8; SCALAR_LEN];
        y.copy_from_slice(&bytes[SCALAR_LEN..]);
        Ok(Self { x, y })
    }
}

// ---------------------------------------------------------------------------
// Constant-time comparison
// ---------------------------------------------------------------------------

/// Constant-time tag equality.
///
/// The compared values are authenticator-side recomputations of attacker
/// supplied tags; a short-circuiting comparison would leak how many leading
/// bytes matched.
pub(crate) fn tags_match(a: &[u8], b: &[u8]) -> bool {
    ring::constant_time::verify_slices_are_equal(a, b).is_ok()
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_handle() -> KeyHandle {
        KeyHandle {
            nonce: [0x01, 0x02, 0x03, 0x04],
            auth_tag: [0xAA; AUTH_TAG_LEN],
            integrity_tag: [0xBB; INTEGRITY_TAG_LEN],
        }
    }

    #[test]
    fn wire_layout_offsets() {
        let bytes = sample_handle().to_bytes();
        assert_eq!(bytes.len(), 52);
        assert_eq!(&bytes[..4], &[0x01, 0x02, 0x03, 0x04]);
        assert_eq!(&bytes[4..36], &[0xAA; 32]);
        assert_eq!(&bytes[36..52], &[0xBB; 16]);
    }

    #[test]
    fn bytes_roundtrip() {
        let handle = sample_handle();
        let restored =
            KeyHandle::from_bytes(&handle.to_bytes()).expect("from_bytes should succeed");
        assert_eq!(restored, handle);
    }

    #[test]
    fn from_bytes_rejects_short_input() {
        let result = KeyHandle::from_bytes(&[0u8; 51]);
        assert!(
            matches!(result, Err(TokenError::MalformedHandle(_))),
            "51 bytes should yield TokenError::MalformedHandle"
        );
    }

    #[test]
    fn from_bytes_rejects_long_input() {
        let result = KeyHandle::from_bytes(&[0u8; 53]);
        assert!(
            matches!(result, Err(TokenError::MalformedHandle(_))),
            "53 bytes should yield TokenError::MalformedHandle"
        );
    }

    #[test]
    fn prefix_is_nonce_then_auth_tag() {
        let prefix = sample_handle().prefix();
        assert_eq!(&prefix[..4], &[0x01, 0x02, 0x03, 0x04]);
        assert_eq!(&prefix[4..], &[0xAA; 32]);
    }

    #[test]
    fn handle_serde_roundtrip() {
        let handle = sample_handle();
        let json = serde_json::to_string(&handle).expect("serialize should succeed");
        let restored: KeyHandle =
            serde_json::from_str(&json).expect("deserialize should succeed");
        assert_eq!(restored, handle);
    }

    #[test]
    fn public_key_bytes_roundtrip() {
        let key = PublicKey {
            x: [0x11; SCALAR_LEN],
            y: [0x22; SCALAR_LEN],
        };
        let bytes = key.to_bytes();
        assert_eq!(&bytes[..32], &[0x11; 32]);
        assert_eq!(&bytes[32..], &[0x22; 32]);
        let restored = PublicKey::from_bytes(&bytes).expect("from_bytes should succeed");
        assert_eq!(restored, key);
    }

    #[test]
    fn public_key_rejects_sec1_prefixed_input() {
        // 65-byte SEC1 encodings (leading 0x04) are not this wire format.
        let result = PublicKey::from_bytes(&[0x04; 65]);
        assert!(
            matches!(result, Err(TokenError::InvalidKeyMaterial(_))),
            "65 bytes should yield TokenError::InvalidKeyMaterial"
        );
    }

    #[test]
    fn tags_match_agrees_on_equal_tags() {
        assert!(tags_match(&[0xCC; 16], &[0xCC; 16]));
    }

    #[test]
    fn tags_match_rejects_any_difference() {
        let a = [0xCC; 16];
        let mut b = a;
        b[15] ^= 0x01;
        assert!(!tags_match(&a, &b));
        assert!(!tags_match(&a, &a[..15]));
    }
}
