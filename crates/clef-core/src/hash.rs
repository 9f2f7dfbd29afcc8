//! Streaming hash/HMAC interface over the element's fixed-block SHA command.
//!
//! The element hashes in 64-byte blocks: a start command (plain or keyed by
//! a slot-held HMAC secret), one update command per full block, and an end
//! command carrying the 0–63 byte remainder, after which the element applies
//! final padding and returns the digest. [`HashEngine`] hides the chunking
//! behind an arbitrary-length `update`.
//!
//! The engine holds an exclusive borrow of the channel for its whole
//! lifetime, so a second computation cannot start while one is in flight.
//! A transport failure poisons the computation: the engine is dropped and
//! the caller restarts from `start`.

use zeroize::Zeroize;

use crate::element::{
    SecureElementChannel, BLOCK_LEN, DIGEST_LEN, OP_SHA, SHA_MODE_END,
    SHA_MODE_HMAC_END, SHA_MODE_HMAC_START, SHA_MODE_START, SHA_MODE_UPDATE,
};
use crate::error::TokenError;

/// Whether the computation finishes with the plain or the HMAC end mode.
#[derive(Clone, Copy, PartialEq, Eq)]
enum Mode {
    Plain,
    Hmac,
}

/// In-flight hash computation. Obtain one with [`HashEngine::start`] or
/// [`HashEngine::start_hmac`]; feed it with [`update`](Self::update); close
/// it with [`finish`](Self::finish).
pub struct HashEngine<'a, C: SecureElementChannel> {
    channel: &'a mut C,
    buf: [u8; BLOCK_LEN],
    buf_len: usize,
    mode: Mode,
}

impl<'a, C: SecureElementChannel> HashEngine<'a, C> {
    /// Begin a plain SHA-256 computation inside the element.
    ///
    /// # Errors
    ///
    /// Propagates the channel failure if the start command does not reach
    /// the element.
    pub fn start(channel: &'a mut C) -> Result<Self, TokenError> {
        channel.execute(OP_SHA, SHA_MODE_START, 0, &[])?;
        Ok(Self {
            channel,
            buf: [0u8; BLOCK_LEN],
            buf_len: 0,
            mode: Mode::Plain,
        })
    }

    /// Begin an HMAC-SHA256 computation keyed by the secret in `key_slot`.
    /// The key never crosses the channel; the element loads it internally.
    ///
    /// # Errors
    ///
    /// Propagates the channel failure if the start command does not reach
    /// the element.
    pub fn start_hmac(channel: &'a mut C, key_slot: u16) -> Result<Self, TokenError> {
        channel.execute(OP_SHA, SHA_MODE_HMAC_START, key_slot, &[])?;
        Ok(Self {
            channel,
            buf: [0u8; BLOCK_LEN],
            buf_len: 0,
            mode: Mode::Hmac,
        })
    }

    /// Absorb a chunk of any length. Full 64-byte blocks are pushed to the
    /// element as they accumulate; the remainder stays staged for the next
    /// call or for [`finish`](Self::finish).
    ///
    /// # Errors
    ///
    /// Propagates the channel failure; the computation is then dead and
    /// must be restarted from `start`.
    pub fn update(&mut self, data: &[u8]) -> Result<(), TokenError> {
        let mut rest = data;
        while !rest.is_empty() {
            let room = BLOCK_LEN.saturating_sub(self.buf_len);
            let take = room.min(rest.len());
            let (chunk, tail) = rest.split_at(take);

            let end = self.buf_len.saturating_add(take);
            self.buf[self.buf_len..end].copy_from_slice(chunk);
            self.buf_len = end;
            rest = tail;

            if self.buf_len == BLOCK_LEN {
                self.channel
                    .execute(OP_SHA, SHA_MODE_UPDATE, block_p2(), &self.buf)?;
                self.buf.zeroize();
                self.buf_len = 0;
            }
        }
        Ok(())
    }

    /// Flush the staged remainder with the end flag and return the 32-byte
    /// digest. The element applies final padding itself.
    ///
    /// # Errors
    ///
    /// Propagates the channel failure, or [`TokenError::Protocol`] if the
    /// element's digest response is not exactly 32 bytes.
    pub fn finish(mut self) -> Result<[u8; DIGEST_LEN], TokenError> {
        let end_mode = match self.mode {
            Mode::Plain => SHA_MODE_END,
            Mode::Hmac => SHA_MODE_HMAC_END,
        };
        let remainder_len = u16::try_from(self.buf_len).map_err(|_| {
            TokenError::Protocol("staged remainder exceeds the command length field".into())
        })?;
        let response = self.channel.execute(
            OP_SHA,
            end_mode,
            remainder_len,
            &self.buf[..self.buf_len],
        )?;

        let digest: [u8; DIGEST_LEN] = response.as_slice().try_into().map_err(|_| {
            TokenError::Protocol(format!(
                "digest response was {} bytes (expected {DIGEST_LEN})",
                response.len()
            ))
        })?;
        Ok(digest)
    }
}

impl<C: SecureElementChannel> Drop for HashEngine<'_, C> {
    fn drop(&mut self) {
        // Staged bytes may be key material in transit.
        self.buf.zeroize();
    }
}

const fn block_p2() -> u16 {
    BLOCK_LEN as u16
}

// ---------------------------------------------------------------------------
// Unit tests — command framing against a scripted channel
// ---------------------------------------------------------------------------
