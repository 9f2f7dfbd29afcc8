//! Error types for `clef-core`.

use thiserror::Error;

/// Errors produced by authenticator-core operations.
///
/// A failed integrity check on a key handle is **not** an error — a handle
/// issued by another device is an expected legitimate case, and
/// [`crate::service::U2fToken::verify_handle`] reports it as `Ok(false)`.
#[derive(Debug, Error)]
pub enum TokenError {
    /// Secure element exchange failed or timed out. Always fatal to the
    /// operation in flight; the caller decides whether to restart the whole
    /// sequence from scratch.
    #[error("secure element transport failed: {0}")]
    Transport(String),

    /// The secure element rejected a command (bad MAC, disarmed session,
    /// unusable key slot).
    #[error("secure element rejected command: {0}")]
    Element(String),

    /// A response violated the command contract (wrong length, oversize
    /// input, malformed field).
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Key handle bytes do not form a valid 52-byte handle.
    #[error("malformed key handle: {0}")]
    MalformedHandle(String),

    /// Invalid key material (wrong length, corrupted bytes).
    #[error("invalid key material: {0}")]
    InvalidKeyMaterial(String),

    /// Secure memory operation failed (core-dump lockdown, CSPRNG).
    #[error("secure memory error: {0}")]
    SecureMemory(String),
}
