//! Secure element command interface.
//!
//! The element is a commodity cryptographic coprocessor reached through a
//! synchronous request/response exchange. This module carries everything
//! both sides of that exchange must agree on:
//! - [`SecureElementChannel`] — the transport trait the core consumes
//! - command opcodes and mode bytes
//! - the firmware transport masks and the encrypted private-write MAC
//!   preimage
//! - [`ElementLayout`] — the provisioning-time slot assignment
//!
//! Everything here is byte-level wire contract; nothing is secret. The
//! masks obscure key material in transit against a passive bus observer,
//! they are firmware build constants, not per-operation values.

use serde::{Deserialize, Serialize};

use crate::error::TokenError;

// ---------------------------------------------------------------------------
// Exchange limits
// ---------------------------------------------------------------------------

/// Maximum command data bytes per exchange.
pub const CMD_MAX_DATA: usize = 72;

/// Hash block size the element's SHA command operates on.
pub const BLOCK_LEN: usize = 64;

/// SHA-256 digest length.
pub const DIGEST_LEN: usize = 32;

/// Length of the element's random-number response.
pub const RANDOM_LEN: usize = 32;

// ---------------------------------------------------------------------------
// Opcodes and mode bytes
// ---------------------------------------------------------------------------

/// Random-number generation.
pub const OP_RANDOM: u8 = 0x1B;
/// Commit a one-time nonce context.
pub const OP_NONCE: u8 = 0x16;
/// Fold a key slot into the nonce context (generate-digest).
pub const OP_GEN_DIG: u8 = 0x15;
/// Block hash / HMAC engine.
pub const OP_SHA: u8 = 0x47;
/// Public-key extraction from a private-key slot.
pub const OP_GEN_KEY: u8 = 0x40;
/// ECDSA signature over an externally supplied digest.
pub const OP_SIGN: u8 = 0x41;
/// Encrypted private-key write into a slot.
pub const OP_PRIV_WRITE: u8 = 0x46;
/// Monotonic counter.
pub const OP_COUNTER: u8 = 0x24;

/// SHA command modes (`p1`).
pub const SHA_MODE_START: u8 = 0x00;
pub const SHA_MODE_UPDATE: u8 = 0x01;
pub const SHA_MODE_END: u8 = 0x02;
pub const SHA_MODE_HMAC_START: u8 = 0x04;
pub const SHA_MODE_HMAC_END: u8 = 0x05;

/// Nonce command: mix a host seed with the element's RNG.
pub const NONCE_MODE_SEED: u8 = 0x00;
/// Host seed length for the nonce command.
pub const NONCE_SEED_LEN: usize = 20;

/// Generate-digest against a data-zone key slot.
pub const GEN_DIG_ZONE_DATA: u8 = 0x02;

/// Private-write in encrypted mode.
pub const PRIV_WRITE_ENCRYPT: u8 = 0x40;

/// Generate-key mode: derive the public key of a stored private key.
pub const GEN_KEY_MODE_PUBLIC: u8 = 0x00;

/// Sign an external (host-supplied) digest.
pub const SIGN_MODE_EXTERNAL: u8 = 0x80;

/// Counter command: increment and read back.
pub const COUNTER_MODE_INCREMENT: u8 = 0x01;

// ---------------------------------------------------------------------------
// Key and payload geometry
// ---------------------------------------------------------------------------

/// Slot-format private key: 4 structural zero bytes then the P-256 scalar.
pub const PRIVATE_KEY_LEN: usize = 36;
/// Structural zero padding at the head of a slot-format private key.
pub const KEY_PAD_LEN: usize = 4;
/// P-256 scalar length.
pub const SCALAR_LEN: usize = 32;
/// Uncompressed public key, `X ‖ Y`.
pub const PUBLIC_KEY_LEN: usize = 64;
/// ECDSA signature, `r ‖ s`.
pub const SIGNATURE_LEN: usize = 64;
/// Encrypted private-write payload: masked key then its MAC.
pub const PRIV_WRITE_PAYLOAD_LEN: usize = PRIVATE_KEY_LEN + DIGEST_LEN;

// ---------------------------------------------------------------------------
// Transport masks
// ---------------------------------------------------------------------------

/// Unmasks element-computed key material into a slot-format private key.
/// The first 4 bytes are zero so the structural zero padding of the key
/// format survives the XOR.
#[rustfmt::skip]
pub const READ_MASK: [u8; PRIVATE_KEY_LEN] = [
    0x00, 0x00, 0x00, 0x00,
    0x7d, 0x52, 0xe9, 0x16, 0x3a, 0xc0, 0x8f, 0x64, 0xd1, 0x4b, 0x2e, 0xa7,
    0x58, 0x93, 0x0c, 0xf5, 0x21, 0xbe, 0x74, 0x8a, 0xe3, 0x0f, 0xc6, 0x39,
    0x9b, 0x46, 0xd8, 0x62, 0x17, 0xac, 0x51, 0xfe,
];

/// Masks the scalar portion of a private key for the encrypted write. The
/// 4 structural zero bytes travel in the clear; they are public format,
/// not key material.
#[rustfmt::skip]
pub const WRITE_MASK: [u8; SCALAR_LEN] = [
    0x4e, 0xb1, 0x09, 0xd7, 0x86, 0x2d, 0xf2, 0x5b, 0x60, 0xcf, 0x13, 0x98,
    0xa4, 0x3e, 0xe1, 0x0a, 0xf8, 0x45, 0xbd, 0x27, 0x71, 0xd3, 0x8c, 0x56,
    0x2f, 0xea, 0x35, 0xc9, 0x9e, 0x08, 0x6b, 0x44,
];

// ---------------------------------------------------------------------------
// Encrypted private-write MAC
// ---------------------------------------------------------------------------

/// Zero padding at the head of the MAC preimage.
pub const MAC_PAD_LEN: usize = 28;
/// Command header trailing the MAC preimage: opcode, mode, slot, serial.
pub const MAC_HEADER_LEN: usize = 7;
/// Full MAC preimage length.
pub const MAC_PREIMAGE_LEN: usize =
    MAC_PAD_LEN + PRIVATE_KEY_LEN + SCALAR_LEN + MAC_HEADER_LEN;

/// Device serial tail bound into the MAC header.
const SERIAL_TAIL: [u8; 3] = [0xee, 0x01, 0x23];

/// Build the SHA-256 preimage authenticating an encrypted private-write:
/// `zeros(28) ‖ key(36) ‖ write_mask(32) ‖ header(7)`.
///
/// The digest of this preimage accompanies the masked key on the wire and
/// is independently re-derived by the element, binding the plaintext key,
/// the transport mask, and the exact target command parameters together.
#[must_use]
pub fn priv_write_mac_message(
    key: &[u8; PRIVATE_KEY_LEN],
    slot: u16,
) -> [u8; MAC_PREIMAGE_LEN] {
    let mut message = [0u8; MAC_PREIMAGE_LEN];
    let mut cursor = MAC_PAD_LEN;

    let key_end = cursor.saturating_add(PRIVATE_KEY_LEN);
    message[cursor..key_end].copy_from_slice(key);
    cursor = key_end;

    let mask_end = cursor.saturating_add(SCALAR_LEN);
    message[cursor..mask_end].copy_from_slice(&WRITE_MASK);
    cursor = mask_end;

    let [slot_lo, slot_hi] = slot.to_le_bytes();
    let header: [u8; MAC_HEADER_LEN] = [
        OP_PRIV_WRITE,
        PRIV_WRITE_ENCRYPT,
        slot_lo,
        slot_hi,
        SERIAL_TAIL[0],
        SERIAL_TAIL[1],
        SERIAL_TAIL[2],
    ];
    message[cursor..].copy_from_slice(&header);

    message
}

// ---------------------------------------------------------------------------
// Channel trait
// ---------------------------------------------------------------------------

/// Synchronous request/response exchange with the secure element.
///
/// One exchange per call; input and output are bounded by the element's
/// command buffer ([`CMD_MAX_DATA`]). Implementations map their transport
/// failures to [`TokenError::Transport`] and element command rejections to
/// [`TokenError::Element`]. Blocking for the duration of the exchange is
/// expected; timeouts live below this trait.
pub trait SecureElementChannel {
    /// Execute one command and return its response bytes.
    ///
    /// # Errors
    ///
    /// Returns [`TokenError::Transport`] if the exchange itself failed and
    /// [`TokenError::Element`] if the element rejected the command. Either
    /// way the multi-step sequence in progress is dead; callers restart
    /// from the top or give up.
    fn execute(
        &mut self,
        opcode: u8,
        p1: u8,
        p2: u16,
        data: &[u8],
    ) -> Result<Vec<u8>, TokenError>;
}

// ---------------------------------------------------------------------------
// Slot layout
// ---------------------------------------------------------------------------

/// Provisioning-time slot assignment of the element.
///
/// Fixed when the device is personalized; the host only ever names slots,
/// it never holds their contents.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementLayout {
    /// Write-protected slot holding the device master key.
    pub master_key_slot: u16,
    /// Volatile slot receiving derived per-site private keys.
    pub ephemeral_key_slot: u16,
    /// Read-only slot holding the manufacturer attestation private key.
    pub attestation_key_slot: u16,
    /// Hardware monotonic counter id.
    pub counter_id: u16,
}

impl Default for ElementLayout {
    fn default() -> Self {
        Self {
            master_key_slot: 1,
            ephemeral_key_slot: 2,
            attestation_key_slot: 3,
            counter_id: 0,
        }
    }
}

// ---------------------------------------------------------------------------
// Test support
// ---------------------------------------------------------------------------


// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
