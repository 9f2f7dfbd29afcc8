//! Key-handle derivation over the element's hash engine.
//!
//! Everything per-site hangs off one keyed step: HMAC-SHA256 under the
//! master key slot over `app_id ‖ nonce`. The HMAC runs entirely inside the
//! element; what follows host-side is public transformation (structural
//! padding, mask XOR, unkeyed digests). Re-running any of these functions
//! with the same inputs yields the same bytes — that determinism is what
//! lets the authenticator hold no per-site state at all.

use zeroize::Zeroize;

use crate::element::{
    priv_write_mac_message, ElementLayout, SecureElementChannel, DIGEST_LEN, KEY_PAD_LEN,
    PRIVATE_KEY_LEN, READ_MASK,
};
use crate::error::TokenError;
use crate::handle::{APP_ID_LEN, HANDLE_PREFIX_LEN, INTEGRITY_TAG_LEN, NONCE_LEN};
use crate::hash::HashEngine;
use crate::memory::SecretBytes;

/// Domain constant separating handle-integrity tags from every other keyed
/// digest the master key produces. Fixed on the wire: issued handles only
/// verify against firmware carrying the same value.
#[rustfmt::skip]
const HANDLE_TAG_DOMAIN: [u8; 16] = [
    0xc1, 0xff, 0x67, 0x0d, 0x66, 0xe5, 0x55, 0xbb,
    0xdc, 0x56, 0xaf, 0x7b, 0x41, 0x27, 0x4a, 0x21,
];

/// Slot-format ephemeral private key: 4 structural zero bytes then the
/// masked scalar. Exists only for the duration of one generate or load
/// call; zeroed on drop.
pub(crate) struct EphemeralKey(SecretBytes<PRIVATE_KEY_LEN>);

impl EphemeralKey {
    pub(crate) const fn expose(&self) -> &[u8; PRIVATE_KEY_LEN] {
        self.0.expose()
    }
}

/// The sole secret-dependent derivation step: HMAC-SHA256 keyed by the
/// master key slot over `app_id(32) ‖ nonce(4)`.
pub(crate) fn key_material<C: SecureElementChannel>(
    channel: &mut C,
    layout: &ElementLayout,
    app_id: &[u8; APP_ID_LEN],
    nonce: &[u8; NONCE_LEN],
) -> Result<SecretBytes<DIGEST_LEN>, TokenError> {
    let mut op = HashEngine::start_hmac(channel, layout.master_key_slot)?;
    op.update(app_id)?;
    op.update(nonce)?;
    let mut digest = op.finish()?;
    let material = SecretBytes::new(digest);
    digest.zeroize();
    Ok(material)
}

/// Shape raw key material into a slot-format private key: prepend the 4
/// structural zero bytes, then XOR with the read mask (whose leading 4
/// bytes are zero, so the padding survives).
pub(crate) fn ephemeral_key(material: &SecretBytes<DIGEST_LEN>) -> EphemeralKey {
    let mut key = [0u8; PRIVATE_KEY_LEN];
    key[KEY_PAD_LEN..].copy_from_slice(material.expose());
    for (byte, mask) in key.iter_mut().zip(READ_MASK.iter()) {
        *byte ^= mask;
    }
    let out = EphemeralKey(SecretBytes::new(key));
    key.zeroize();
    out
}

/// Unkeyed SHA-256 binding the plaintext key, the transport mask and the
/// exact encrypted-write command parameters; travels with the masked key
/// and is re-derived by the element before it accepts the write.
pub(crate) fn auth_tag<C: SecureElementChannel>(
    channel: &mut C,
    key: &EphemeralKey,
    layout: &ElementLayout,
) -> Result<[u8; DIGEST_LEN], TokenError> {
    let mut message = priv_write_mac_message(key.expose(), layout.ephemeral_key_slot);
    let digest = HashEngine::start(channel).and_then(|mut op| {
        op.update(&message)?;
        op.finish()
    });
    message.zeroize();
    digest
}

/// Keyed tag binding a handle prefix to an application id: first 16 bytes
/// of HMAC-SHA256 under the master key slot over
/// `prefix(36) ‖ domain(16) ‖ app_id(32)`.
pub(crate) fn integrity_tag<C: SecureElementChannel>(
    channel: &mut C,
    layout: &ElementLayout,
    prefix: &[u8; HANDLE_PREFIX_LEN],
    app_id: &[u8; APP_ID_LEN],
) -> Result<[u8; INTEGRITY_TAG_LEN], TokenError> {
    let mut op = HashEngine::start_hmac(channel, layout.master_key_slot)?;
    op.update(prefix)?;
    op.update(&HANDLE_TAG_DOMAIN)?;
    op.update(app_id)?;
    let digest = op.finish()?;

    let mut tag = [0u8; INTEGRITY_TAG_LEN];
    tag.copy_from_slice(&digest[..INTEGRITY_TAG_LEN]);
    Ok(tag)
}

// ---------------------------------------------------------------------------
// Unit tests — framing and the pure transforms
// ---------------------------------------------------------------------------
