//! Command rejection reasons of the software element.

use clef_core::TokenError;
use thiserror::Error;

/// Why the element refused a command.
///
/// At the channel boundary these become [`TokenError::Element`]; to the
/// core every rejection is equally fatal to the sequence in flight.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ElementError {
    /// Opcode outside the modeled command set.
    #[error("unknown opcode {0:#04x}")]
    UnknownOpcode(u8),

    /// Mode byte not valid for this opcode.
    #[error("unsupported mode {mode:#04x} for opcode {opcode:#04x}")]
    BadMode {
        /// Offending opcode.
        opcode: u8,
        /// Offending mode byte.
        mode: u8,
    },

    /// Command data exceeded the element's input buffer.
    #[error("command data was {len} bytes (buffer holds {max})")]
    Oversize {
        /// Received length.
        len: usize,
        /// Buffer capacity.
        max: usize,
    },

    /// The length parameter disagreed with the data actually sent.
    #[error("length field said {stated} bytes, {actual} received")]
    LengthField {
        /// Length claimed by the parameter field.
        stated: usize,
        /// Bytes actually received.
        actual: usize,
    },

    /// Hash data command without a preceding start.
    #[error("no hash session in progress")]
    NoHashSession,

    /// Hash end mode does not match how the session was started.
    #[error("hash end mode does not match the running session")]
    HashModeMismatch,

    /// Hash update blocks must be exactly 64 bytes; remainders under 64.
    #[error("bad hash block length {0}")]
    BadBlock(usize),

    /// Slot number not usable for this command.
    #[error("slot {0} is not usable for this command")]
    BadSlot(u16),

    /// Generate-digest issued without a committed nonce context.
    #[error("nonce context missing")]
    NoNonce,

    /// Encrypted write attempted without an armed session.
    #[error("write session not armed")]
    NotArmed,

    /// Recomputed write MAC did not match the one supplied.
    #[error("write authentication mismatch")]
    MacMismatch,

    /// Key material rejected (structural padding, scalar range).
    #[error("private key rejected: {0}")]
    InvalidKey(String),

    /// The named signing slot holds no key.
    #[error("signing slot is empty")]
    EmptySlot,

    /// The ECDSA engine failed to produce a signature.
    #[error("signature generation failed")]
    SignatureFailure,
}

impl From<ElementError> for TokenError {
    fn from(err: ElementError) -> Self {
        Self::Element(err.to_string())
    }
}
