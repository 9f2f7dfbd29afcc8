//! `clef-element` — software model of the CLEF secure element.
//!
//! A drop-in [`SecureElementChannel`] for tests and development, modeling
//! the command set the core drives: random numbers, the block hash/HMAC
//! engine, nonce/generate-digest session arming, the MAC-checked encrypted
//! private-key write, public-key extraction, external-digest ECDSA signing
//! and the monotonic counter.
//!
//! The model enforces the same sequencing rules as the part — one hash
//! session at a time, arm-then-write-once, write-protected fixed slots —
//! so a core that mis-drives the protocol fails here too. It is **not** a
//! secure element: secrets live in process memory (zeroized on drop, but
//! unshielded) and timing is nothing like silicon.

#![cfg_attr(test, allow(clippy::unwrap_used, clippy::arithmetic_side_effects))]

pub mod error;

mod engine;

pub use error::ElementError;

use p256::ecdsa::signature::hazmat::PrehashSigner;
use p256::ecdsa::{Signature, SigningKey};
use p256::elliptic_curve::sec1::ToEncodedPoint;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};
use zeroize::Zeroize;

use clef_core::element::{
    priv_write_mac_message, ElementLayout, SecureElementChannel, CMD_MAX_DATA,
    COUNTER_MODE_INCREMENT, DIGEST_LEN, GEN_DIG_ZONE_DATA, GEN_KEY_MODE_PUBLIC,
    KEY_PAD_LEN, NONCE_MODE_SEED, NONCE_SEED_LEN, OP_COUNTER, OP_GEN_DIG, OP_GEN_KEY,
    OP_NONCE, OP_PRIV_WRITE, OP_RANDOM, OP_SHA, OP_SIGN, PRIVATE_KEY_LEN,
    PRIV_WRITE_ENCRYPT, PRIV_WRITE_PAYLOAD_LEN, RANDOM_LEN, SCALAR_LEN,
    SHA_MODE_END, SHA_MODE_HMAC_END, SHA_MODE_HMAC_START, SHA_MODE_START,
    SHA_MODE_UPDATE, SIGN_MODE_EXTERNAL, WRITE_MASK,
};
use clef_core::handle::PublicKey;
use clef_core::memory::SecretBytes;
use clef_core::TokenError;

use crate::engine::HashSession;

/// Encrypted-write arming progress.
enum WriteSession {
    Idle,
    NonceLoaded,
    Armed,
}

/// Software stand-in for the secure cryptographic coprocessor.
pub struct SoftElement {
    layout: ElementLayout,
    master_key: SecretBytes<SCALAR_LEN>,
    attestation_key: SecretBytes<SCALAR_LEN>,
    /// Volatile signing slot — at most one derived key, gone on drop.
    ephemeral_key: Option<SecretBytes<PRIVATE_KEY_LEN>>,
    hash: Option<HashSession>,
    session: WriteSession,
    counter: u32,
}

impl SoftElement {
    /// Build an element with explicit slot secrets. The attestation key is
    /// a raw P-256 scalar, validated when first used, like the part does.
    /// Callers should zeroize their own copies of the inputs.
    #[must_use]
    pub fn new(
        layout: ElementLayout,
        master_key: [u8; SCALAR_LEN],
        attestation_key: [u8; SCALAR_LEN],
    ) -> Self {
        Self {
            layout,
            master_key: SecretBytes::new(master_key),
            attestation_key: SecretBytes::new(attestation_key),
            ephemeral_key: None,
            hash: None,
            session: WriteSession::Idle,
            counter: 0,
        }
    }

    /// Personalize a fresh element: random master key, random attestation
    /// key pair.
    #[must_use]
    pub fn provision(layout: ElementLayout) -> Self {
        let mut master = [0u8; SCALAR_LEN];
        OsRng.fill_bytes(&mut master);
        let mut attestation: [u8; SCALAR_LEN] = SigningKey::random(&mut OsRng).to_bytes().into();
        let element = Self::new(layout, master, attestation);
        master.zeroize();
        attestation.zeroize();
        element
    }

    /// Public half of the attestation key, for verifying registration
    /// signatures in tests.
    ///
    /// # Errors
    ///
    /// Returns an element rejection if the provisioned scalar is not a
    /// valid P-256 key.
    pub fn attestation_public_key(&self) -> Result<PublicKey, TokenError> {
        let signing = SigningKey::from_bytes(self.attestation_key.expose().into())
            .map_err(|_| ElementError::InvalidKey("attestation scalar out of range".into()))?;
        PublicKey::from_bytes(&public_key_bytes(&signing))
    }

    fn dispatch(
        &mut self,
        opcode: u8,
        p1: u8,
        p2: u16,
        data: &[u8],
    ) -> Result<Vec<u8>, ElementError> {
        if data.len() > CMD_MAX_DATA {
            return Err(ElementError::Oversize {
                len: data.len(),
                max: CMD_MAX_DATA,
            });
        }
        match opcode {
            OP_RANDOM => Ok(random_block()),
            OP_SHA => self.cmd_sha(p1, p2, data),
            OP_NONCE => self.cmd_nonce(p1, data),
            OP_GEN_DIG => self.cmd_gen_dig(p1, p2),
            OP_PRIV_WRITE => self.cmd_priv_write(p1, p2, data),
            OP_GEN_KEY => self.cmd_gen_key(p1, p2),
            OP_SIGN => self.cmd_sign(p1, p2, data),
            OP_COUNTER => self.cmd_counter(p1, p2),
            other => Err(ElementError::UnknownOpcode(other)),
        }
    }

    fn cmd_sha(&mut self, p1: u8, p2: u16, data: &[u8]) -> Result<Vec<u8>, ElementError> {
        match p1 {
            SHA_MODE_START => {
                self.hash = Some(HashSession::start());
                Ok(Vec::new())
            }
            SHA_MODE_HMAC_START => {
                if p2 != self.layout.master_key_slot {
                    return Err(ElementError::BadSlot(p2));
                }
                self.hash = Some(HashSession::start_keyed(self.master_key.expose())?);
                Ok(Vec::new())
            }
            SHA_MODE_UPDATE => {
                check_length_field(p2, data)?;
                let session = self.hash.as_mut().ok_or(ElementError::NoHashSession)?;
                session.absorb_block(data)?;
                Ok(Vec::new())
            }
            SHA_MODE_END | SHA_MODE_HMAC_END => {
                check_length_field(p2, data)?;
                // The session is consumed either way; a failed end command
                // leaves no computation to resume.
                let session = self.hash.take().ok_or(ElementError::NoHashSession)?;
                let digest = session.finish(data, p1 == SHA_MODE_HMAC_END)?;
                Ok(digest.to_vec())
            }
            mode => Err(ElementError::BadMode {
                opcode: OP_SHA,
                mode,
            }),
        }
    }

    fn cmd_nonce(&mut self, p1: u8, data: &[u8]) -> Result<Vec<u8>, ElementError> {
        if p1 != NONCE_MODE_SEED {
            return Err(ElementError::BadMode {
                opcode: OP_NONCE,
                mode: p1,
            });
        }
        if data.len() != NONCE_SEED_LEN {
            return Err(ElementError::LengthField {
                stated: NONCE_SEED_LEN,
                actual: data.len(),
            });
        }
        // A new nonce context always replaces whatever came before — an
        // armed-but-unused session dies here.
        self.session = WriteSession::NonceLoaded;
        Ok(Vec::new())
    }

    fn cmd_gen_dig(&mut self, p1: u8, p2: u16) -> Result<Vec<u8>, ElementError> {
        if p1 != GEN_DIG_ZONE_DATA {
            return Err(ElementError::BadMode {
                opcode: OP_GEN_DIG,
                mode: p1,
            });
        }
        if p2 != self.layout.master_key_slot {
            return Err(ElementError::BadSlot(p2));
        }
        match self.session {
            WriteSession::NonceLoaded => {
                self.session = WriteSession::Armed;
                Ok(Vec::new())
            }
            _ => Err(ElementError::NoNonce),
        }
    }

    fn cmd_priv_write(&mut self, p1: u8, p2: u16, data: &[u8]) -> Result<Vec<u8>, ElementError> {
        if p1 != PRIV_WRITE_ENCRYPT {
            return Err(ElementError::BadMode {
                opcode: OP_PRIV_WRITE,
                mode: p1,
            });
        }
        if p2 != self.layout.ephemeral_key_slot {
            // Master and attestation slots are write-protected after
            // personalization; everything else does not exist.
            return Err(ElementError::BadSlot(p2));
        }

        // The arming is spent by the attempt, not by its success.
        let armed = matches!(self.session, WriteSession::Armed);
        self.session = WriteSession::Idle;
        if !armed {
            return Err(ElementError::NotArmed);
        }

        if data.len() != PRIV_WRITE_PAYLOAD_LEN {
            return Err(ElementError::LengthField {
                stated: PRIV_WRITE_PAYLOAD_LEN,
                actual: data.len(),
            });
        }

        let mut key = [0u8; PRIVATE_KEY_LEN];
        key.copy_from_slice(&data[..PRIVATE_KEY_LEN]);
        for (byte, mask) in key[KEY_PAD_LEN..].iter_mut().zip(WRITE_MASK.iter()) {
            *byte ^= mask;
        }

        if key[..KEY_PAD_LEN] != [0u8; KEY_PAD_LEN] {
            key.zeroize();
            return Err(ElementError::InvalidKey(
                "missing structural zero padding".into(),
            ));
        }

        let mac: [u8; DIGEST_LEN] = Sha256::digest(priv_write_mac_message(&key, p2)).into();
        if mac[..] != data[PRIVATE_KEY_LEN..] {
            key.zeroize();
            return Err(ElementError::MacMismatch);
        }

        self.ephemeral_key = Some(SecretBytes::new(key));
        key.zeroize();
        Ok(Vec::new())
    }

    fn cmd_gen_key(&mut self, p1: u8, p2: u16) -> Result<Vec<u8>, ElementError> {
        if p1 != GEN_KEY_MODE_PUBLIC {
            return Err(ElementError::BadMode {
                opcode: OP_GEN_KEY,
                mode: p1,
            });
        }
        let signing = self.signing_key(p2)?;
        Ok(public_key_bytes(&signing))
    }

    fn cmd_sign(&mut self, p1: u8, p2: u16, data: &[u8]) -> Result<Vec<u8>, ElementError> {
        if p1 != SIGN_MODE_EXTERNAL {
            return Err(ElementError::BadMode {
                opcode: OP_SIGN,
                mode: p1,
            });
        }
        if data.len() != DIGEST_LEN {
            return Err(ElementError::LengthField {
                stated: DIGEST_LEN,
                actual: data.len(),
            });
        }
        let signing = self.signing_key(p2)?;
        let signature: Signature = signing
            .sign_prehash(data)
            .map_err(|_| ElementError::SignatureFailure)?;
        Ok(signature.to_bytes().to_vec())
    }

    fn cmd_counter(&mut self, p1: u8, p2: u16) -> Result<Vec<u8>, ElementError> {
        if p1 != COUNTER_MODE_INCREMENT {
            return Err(ElementError::BadMode {
                opcode: OP_COUNTER,
                mode: p1,
            });
        }
        if p2 != self.layout.counter_id {
            return Err(ElementError::BadSlot(p2));
        }
        // Monotonic: the counter pegs at its ceiling, it never wraps back.
        self.counter = self.counter.saturating_add(1);
        Ok(self.counter.to_le_bytes().to_vec())
    }

    fn signing_key(&self, slot: u16) -> Result<SigningKey, ElementError> {
        if slot == self.layout.ephemeral_key_slot {
            let key = self.ephemeral_key.as_ref().ok_or(ElementError::EmptySlot)?;
            let scalar: &[u8; SCALAR_LEN] = key.expose()[KEY_PAD_LEN..]
                .try_into()
                .map_err(|_| ElementError::SignatureFailure)?;
            SigningKey::from_bytes(scalar.into())
                .map_err(|_| ElementError::InvalidKey("scalar out of range".into()))
        } else if slot == self.layout.attestation_key_slot {
            SigningKey::from_bytes(self.attestation_key.expose().into())
                .map_err(|_| ElementError::InvalidKey("attestation scalar out of range".into()))
        } else {
            Err(ElementError::BadSlot(slot))
        }
    }
}

impl SecureElementChannel for SoftElement {
    fn execute(
        &mut self,
        opcode: u8,
        p1: u8,
        p2: u16,
        data: &[u8],
    ) -> Result<Vec<u8>, TokenError> {
        log::trace!(
            "element: opcode={opcode:#04x} p1={p1:#04x} p2={p2} len={}",
            data.len()
        );
        self.dispatch(opcode, p1, p2, data).map_err(TokenError::from)
    }
}

fn check_length_field(p2: u16, data: &[u8]) -> Result<(), ElementError> {
    if usize::from(p2) != data.len() {
        return Err(ElementError::LengthField {
            stated: usize::from(p2),
            actual: data.len(),
        });
    }
    Ok(())
}

fn random_block() -> Vec<u8> {
    let mut out = vec![0u8; RANDOM_LEN];
    OsRng.fill_bytes(&mut out);
    out
}

fn public_key_bytes(key: &SigningKey) -> Vec<u8> {
    let point = key.verifying_key().to_encoded_point(false);
    // Strip the SEC1 uncompressed marker; the wire format is bare X ‖ Y.
    point.as_bytes()[1..].to_vec()
}

// ---------------------------------------------------------------------------
// Unit tests — protocol enforcement
// ---------------------------------------------------------------------------
