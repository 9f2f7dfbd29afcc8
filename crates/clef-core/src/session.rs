//! One-time session arming for encrypted key writes.
//!
//! The element only accepts an encrypted private-key write while armed:
//! a fresh nonce context is committed, then the generate-digest command
//! folds the master key slot into it, producing a value the element will
//! honor for exactly one write. [`prepare`] runs that two-command sequence
//! and returns a [`PreparedSession`] token holding the channel exclusively;
//! its single operation, [`write_key`](PreparedSession::write_key),
//! consumes it. Arm-twice-write-once is therefore unrepresentable — a
//! second `prepare` needs the channel back, which means the first token is
//! gone.

use rand::rngs::OsRng;
use rand::RngCore;
use zeroize::Zeroize;

use crate::derive::EphemeralKey;
use crate::element::{
    ElementLayout, SecureElementChannel, DIGEST_LEN, GEN_DIG_ZONE_DATA, KEY_PAD_LEN,
    NONCE_MODE_SEED, NONCE_SEED_LEN, OP_GEN_DIG, OP_NONCE, OP_PRIV_WRITE,
    PRIVATE_KEY_LEN, PRIV_WRITE_ENCRYPT, PRIV_WRITE_PAYLOAD_LEN, WRITE_MASK,
};
use crate::error::TokenError;

/// Element armed for exactly one encrypted write.
pub(crate) struct PreparedSession<'a, C: SecureElementChannel> {
    channel: &'a mut C,
}

/// Commit a fresh nonce context and bind the master key slot into it.
///
/// Failure of either command aborts the derivation in progress; there is
/// no retry at this layer — the caller restarts the whole sequence.
pub(crate) fn prepare<'a, C: SecureElementChannel>(
    channel: &'a mut C,
    layout: &ElementLayout,
) -> Result<PreparedSession<'a, C>, TokenError> {
    let mut seed = [0u8; NONCE_SEED_LEN];
    OsRng.fill_bytes(&mut seed);
    channel.execute(OP_NONCE, NONCE_MODE_SEED, 0, &seed)?;
    channel.execute(OP_GEN_DIG, GEN_DIG_ZONE_DATA, layout.master_key_slot, &[])?;
    Ok(PreparedSession { channel })
}

impl<C: SecureElementChannel> PreparedSession<'_, C> {
    /// Move a derived private key into `slot`: the scalar portion masked
    /// for transport, the 4 structural zero bytes in the clear, the MAC
    /// appended. Consumes the arming whether the element accepts or not.
    pub(crate) fn write_key(
        self,
        slot: u16,
        key: &EphemeralKey,
        mac: &[u8; DIGEST_LEN],
    ) -> Result<(), TokenError> {
        let mut payload = [0u8; PRIV_WRITE_PAYLOAD_LEN];
        payload[..PRIVATE_KEY_LEN].copy_from_slice(key.expose());
        for (byte, mask) in payload[KEY_PAD_LEN..PRIVATE_KEY_LEN]
            .iter_mut()
            .zip(WRITE_MASK.iter())
        {
            *byte ^= mask;
        }
        payload[PRIVATE_KEY_LEN..].copy_from_slice(mac);

        let outcome = self
            .channel
            .execute(OP_PRIV_WRITE, PRIV_WRITE_ENCRYPT, slot, &payload);
        payload.zeroize();
        outcome.map(|_| ())
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
