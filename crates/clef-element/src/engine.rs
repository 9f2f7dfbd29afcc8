//! Block-level hash engine of the element.
//!
//! The real part consumes whole 64-byte blocks and applies final padding
//! itself on the end command; this model does the same on top of `sha2` /
//! `hmac`. One session at a time, started plain or keyed, closed by the
//! matching end mode.

use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

use clef_core::element::{BLOCK_LEN, DIGEST_LEN};

use crate::error::ElementError;

type HmacSha256 = Hmac<Sha256>;

/// An in-flight hash computation inside the element.
pub(crate) enum HashSession {
    /// Plain SHA-256.
    Plain(Sha256),
    /// HMAC-SHA256 keyed from a slot secret.
    Keyed(HmacSha256),
}

impl HashSession {
    pub(crate) fn start() -> Self {
        Self::Plain(Sha256::new())
    }

    pub(crate) fn start_keyed(key: &[u8]) -> Result<Self, ElementError> {
        let mac = HmacSha256::new_from_slice(key)
            .map_err(|_| ElementError::InvalidKey("unusable HMAC key".into()))?;
        Ok(Self::Keyed(mac))
    }

    /// Absorb one full 64-byte block.
    pub(crate) fn absorb_block(&mut self, block: &[u8]) -> Result<(), ElementError> {
        if block.len() != BLOCK_LEN {
            return Err(ElementError::BadBlock(block.len()));
        }
        match self {
            Self::Plain(hasher) => hasher.update(block),
            Self::Keyed(mac) => mac.update(block),
        }
        Ok(())
    }

    /// Absorb the sub-block remainder, apply final padding and produce the
    /// digest. `keyed_end` says which end mode the host used; it must match
    /// how the session was started.
    pub(crate) fn finish(
        self,
        remainder: &[u8],
        keyed_end: bool,
    ) -> Result<[u8; DIGEST_LEN], ElementError> {
        if remainder.len() >= BLOCK_LEN {
            return Err(ElementError::BadBlock(remainder.len()));
        }
        match (self, keyed_end) {
            (Self::Plain(mut hasher), false) => {
                hasher.update(remainder);
                Ok(hasher.finalize().into())
            }
            (Self::Keyed(mut mac), true) => {
                mac.update(remainder);
                Ok(mac.finalize().into_bytes().into())
            }
            _ => Err(ElementError::HashModeMismatch),
        }
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blockwise_plain_digest_matches_one_shot() {
        let data = [0x5C_u8; 150];

        let mut session = HashSession::start();
        session.absorb_block(&data[..64]).expect("block should absorb");
        session.absorb_block(&data[64..128]).expect("block should absorb");
        let digest = session
            .finish(&data[128..], false)
            .expect("finish should succeed");

        let expected: [u8; DIGEST_LEN] = Sha256::digest(data).into();
        assert_eq!(digest, expected);
    }

    #[test]
    fn blockwise_keyed_digest_matches_one_shot() {
        let key = [0x42_u8; 32];
        let data = [0x9E_u8; 70];

        let mut session = HashSession::start_keyed(&key).expect("keyed start should succeed");
        session.absorb_block(&data[..64]).expect("block should absorb");
        let digest = session
            .finish(&data[64..], true)
            .expect("finish should succeed");

        let mut mac = HmacSha256::new_from_slice(&key).expect("key should be usable");
        mac.update(&data);
        let expected: [u8; DIGEST_LEN] = mac.finalize().into_bytes().into();
        assert_eq!(digest, expected);
    }

    #[test]
    fn short_block_is_rejected() {
        let mut session = HashSession::start();
        let result = session.absorb_block(&[0u8; 63]);
        assert_eq!(result, Err(ElementError::BadBlock(63)));
    }

    #[test]
    fn oversized_remainder_is_rejected() {
        let session = HashSession::start();
        let result = session.finish(&[0u8; 64], false);
        assert_eq!(result, Err(ElementError::BadBlock(64)));
    }

    #[test]
    fn plain_session_refuses_keyed_end() {
        let session = HashSession::start();
        let result = session.finish(&[], true);
        assert_eq!(result, Err(ElementError::HashModeMismatch));
    }

    #[test]
    fn keyed_session_refuses_plain_end() {
        let session = HashSession::start_keyed(&[0x01; 32]).expect("keyed start should succeed");
        let result = session.finish(&[], false);
        assert_eq!(result, Err(ElementError::HashModeMismatch));
    }
}
