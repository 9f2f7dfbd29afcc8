//! The authenticator's key-handle service.
//!
//! [`U2fToken`] owns the element channel and exposes the four operations a
//! U2F front end needs: registration (`generate_key_pair`), signing-slot
//! preparation (`load_key`), handle/app-id binding check (`verify_handle`)
//! and signing (`sign`), plus the signature counter and the attestation
//! certificate. Each operation is one opaque, non-interruptible command
//! sequence: it either completes or fails whole, and intermediate element
//! state is never observable through this interface.
//!
//! User-presence confirmation is deliberately absent — the calling flow
//! gates these operations, they do not gate themselves.

use crate::element::{
    ElementLayout, SecureElementChannel, DIGEST_LEN, GEN_KEY_MODE_PUBLIC, OP_GEN_KEY,
    OP_RANDOM, OP_SIGN, RANDOM_LEN, SIGNATURE_LEN, SIGN_MODE_EXTERNAL,
};
use crate::error::TokenError;
use crate::handle::{
    tags_match, KeyHandle, PublicKey, APP_ID_LEN, HANDLE_PREFIX_LEN, NONCE_LEN,
};
use crate::{counter, derive, session};

/// Which slot a signature is produced with.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SigningSlot {
    /// The volatile slot holding the currently loaded per-site key.
    Ephemeral,
    /// The manufacturer attestation key (registration responses).
    Attestation,
}

/// Stateless-authenticator core service over one secure element.
///
/// Owns the channel exclusively; the synchronous call model means at most
/// one operation — and therefore one element command sequence — is ever in
/// flight.
pub struct U2fToken<C: SecureElementChannel> {
    channel: C,
    layout: ElementLayout,
    attestation_cert: Vec<u8>,
}

impl<C: SecureElementChannel> U2fToken<C> {
    /// Bind the service to a channel, a provisioning layout, and the
    /// device attestation certificate blob.
    pub const fn new(channel: C, layout: ElementLayout, attestation_cert: Vec<u8>) -> Self {
        Self {
            channel,
            layout,
            attestation_cert,
        }
    }

    /// Register: derive a fresh key pair for `app_id` and return the
    /// 52-byte handle plus the public key, leaving the private key loaded
    /// in the ephemeral slot.
    ///
    /// The sequence is not atomic against power loss: interrupted between
    /// the encrypted write and the public-key read, the slot keeps a key
    /// whose handle was never returned. That key is unreferenced, never
    /// reused and overwritten by the next write — no secret leaves the
    /// element.
    ///
    /// # Errors
    ///
    /// Any element command failure aborts the whole sequence with no
    /// handle returned; retrying means a fresh nonce and a fresh key.
    pub fn generate_key_pair(
        &mut self,
        app_id: &[u8; APP_ID_LEN],
    ) -> Result<(KeyHandle, PublicKey), TokenError> {
        let randomness = self.channel.execute(OP_RANDOM, 0, 0, &[])?;
        if randomness.len() != RANDOM_LEN {
            return Err(TokenError::Protocol(format!(
                "random response was {} bytes (expected {RANDOM_LEN})",
                randomness.len()
            )));
        }
        let mut nonce = [0u8; NONCE_LEN];
        nonce.copy_from_slice(&randomness[..NONCE_LEN]);

        let material = derive::key_material(&mut self.channel, &self.layout, app_id, &nonce)?;
        let key = derive::ephemeral_key(&material);
        let auth_tag = derive::auth_tag(&mut self.channel, &key, &self.layout)?;

        let armed = session::prepare(&mut self.channel, &self.layout)?;
        armed.write_key(self.layout.ephemeral_key_slot, &key, &auth_tag)?;

        let public = self.extract_public_key()?;

        let mut prefix = [0u8; HANDLE_PREFIX_LEN];
        prefix[..NONCE_LEN].copy_from_slice(&nonce);
        prefix[NONCE_LEN..].copy_from_slice(&auth_tag);
        let integrity_tag =
            derive::integrity_tag(&mut self.channel, &self.layout, &prefix, app_id)?;

        Ok((
            KeyHandle {
                nonce,
                auth_tag,
                integrity_tag,
            },
            public,
        ))
    }

    /// Re-derive the private key named by `handle` and load it into the
    /// ephemeral slot, ready for [`sign`](Self::sign).
    ///
    /// The handle's integrity tag is **not** checked here; call
    /// [`verify_handle`](Self::verify_handle) first when binding assurance
    /// is required. The derivation is total — any 52-byte handle loads
    /// *some* key, just not one that signs for any previously issued
    /// public key unless the handle is genuine.
    ///
    /// # Errors
    ///
    /// Any element command failure aborts the sequence; the slot content
    /// is then indeterminate and the next load or generate overwrites it.
    pub fn load_key(
        &mut self,
        handle: &KeyHandle,
        app_id: &[u8; APP_ID_LEN],
    ) -> Result<(), TokenError> {
        let material =
            derive::key_material(&mut self.channel, &self.layout, app_id, &handle.nonce)?;
        let key = derive::ephemeral_key(&material);
        let auth_tag = derive::auth_tag(&mut self.channel, &key, &self.layout)?;

        let armed = session::prepare(&mut self.channel, &self.layout)?;
        armed.write_key(self.layout.ephemeral_key_slot, &key, &auth_tag)
    }

    /// Check that `handle` was issued by this device for `app_id`.
    ///
    /// Recomputes the integrity tag and compares in constant time. A
    /// mismatch is an expected outcome (another device's handle, another
    /// application's handle), reported as `Ok(false)`.
    ///
    /// # Errors
    ///
    /// Only element/transport failures; never the mismatch itself.
    pub fn verify_handle(
        &mut self,
        handle: &KeyHandle,
        app_id: &[u8; APP_ID_LEN],
    ) -> Result<bool, TokenError> {
        let expected =
            derive::integrity_tag(&mut self.channel, &self.layout, &handle.prefix(), app_id)?;
        Ok(tags_match(&expected, &handle.integrity_tag))
    }

    /// Sign a precomputed 32-byte digest with the selected slot and return
    /// the 64-byte `r ‖ s` signature.
    ///
    /// # Errors
    ///
    /// Element/transport failure, or [`TokenError::Protocol`] if the
    /// signature response is not exactly 64 bytes.
    pub fn sign(
        &mut self,
        slot: SigningSlot,
        digest: &[u8; DIGEST_LEN],
    ) -> Result<[u8; SIGNATURE_LEN], TokenError> {
        let slot_id = match slot {
            SigningSlot::Ephemeral => self.layout.ephemeral_key_slot,
            SigningSlot::Attestation => self.layout.attestation_key_slot,
        };
        let response = self
            .channel
            .execute(OP_SIGN, SIGN_MODE_EXTERNAL, slot_id, digest)?;
        response.as_slice().try_into().map_err(|_| {
            TokenError::Protocol(format!(
                "signature response was {} bytes (expected {SIGNATURE_LEN})",
                response.len()
            ))
        })
    }

    /// Increment the signature counter and return the new value.
    ///
    /// # Errors
    ///
    /// Element/transport failure or a malformed counter response.
    pub fn increment_counter(&mut self) -> Result<u32, TokenError> {
        counter::increment(&mut self.channel, &self.layout)
    }

    /// The manufacturer attestation certificate blob handed over at
    /// construction.
    #[must_use]
    pub fn attestation_certificate(&self) -> &[u8] {
        &self.attestation_cert
    }

    fn extract_public_key(&mut self) -> Result<PublicKey, TokenError> {
        let response = self.channel.execute(
            OP_GEN_KEY,
            GEN_KEY_MODE_PUBLIC,
            self.layout.ephemeral_key_slot,
            &[],
        )?;
        PublicKey::from_bytes(&response)
    }
}

// ---------------------------------------------------------------------------
// Unit tests — sequencing against the scripted channel
// ---------------------------------------------------------------------------
