//! `clef-core` — stateless U2F authenticator core for CLEF.
//!
//! This crate is the audit target: zero network, zero async, zero hardware
//! dependencies. Per-site private keys are never stored — each key handle
//! issued to a relying party carries enough to re-derive its signing key on
//! demand from the master secret inside the secure element, which is only
//! ever reached through the [`SecureElementChannel`] trait.
//!
//! ```text
//! caller ──► U2fToken ──► {derive, session, HashEngine} ──► channel ──► element
//! ```

#![cfg_attr(test, allow(clippy::unwrap_used, clippy::arithmetic_side_effects))]

pub mod element;
pub mod error;
pub mod handle;
pub mod hash;
pub mod memory;
pub mod service;

mod counter;
mod derive;
mod session;

pub use element::{ElementLayout, SecureElementChannel};
pub use error::TokenError;
pub use handle::{KeyHandle, PublicKey, APP_ID_LEN, KEY_HANDLE_LEN};
pub use hash::HashEngine;
pub use memory::{disable_core_dumps, LockedRegion, SecretBytes};
pub use service::{SigningSlot, U2fToken};
