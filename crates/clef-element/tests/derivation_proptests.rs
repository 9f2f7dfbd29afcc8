#![allow(clippy::unwrap_used, clippy::arithmetic_side_effects)]

//! Property-based tests for key-handle derivation.
//!
//! Verifies, over random application ids and challenges:
//! - every issued handle verifies for its own app id and no other
//! - re-deriving from a handle always reproduces the registered key
//! - any corruption of the integrity tag is rejected

use clef_core::{ElementLayout, SigningSlot, U2fToken};
use clef_element::SoftElement;
use p256::ecdsa::signature::hazmat::PrehashVerifier;
use p256::ecdsa::{Signature, VerifyingKey};
use proptest::prelude::*;

fn fresh_token() -> U2fToken<SoftElement> {
    let layout = ElementLayout::default();
    U2fToken::new(SoftElement::provision(layout), layout, Vec::new())
}

fn signature_verifies(
    public: &clef_core::PublicKey,
    digest: &[u8; 32],
    signature: &[u8; 64],
) -> bool {
    let mut sec1 = [0u8; 65];
    sec1[0] = 0x04;
    sec1[1..].copy_from_slice(&public.to_bytes());
    let key = VerifyingKey::from_sec1_bytes(&sec1).expect("public key should parse");
    let sig = Signature::from_slice(signature).expect("signature should parse");
    key.verify_prehash(digest, &sig).is_ok()
}

proptest! {
    /// Every issued handle verifies for the app id it was issued to.
    #[test]
    fn issued_handles_verify(app_id in proptest::array::uniform32(0u8..)) {
        let mut token = fresh_token();
        let (handle, _public) = token
            .generate_key_pair(&app_id)
            .expect("registration should succeed");
        prop_assert!(token
            .verify_handle(&handle, &app_id)
            .expect("verify should succeed"));
    }

    /// A handle never verifies for a different app id.
    #[test]
    fn handles_never_verify_for_another_app(
        app_id in proptest::array::uniform32(0u8..),
        other in proptest::array::uniform32(0u8..),
    ) {
        prop_assume!(app_id != other);
        let mut token = fresh_token();
        let (handle, _public) = token
            .generate_key_pair(&app_id)
            .expect("registration should succeed");
        prop_assert!(!token
            .verify_handle(&handle, &other)
            .expect("verify should succeed"));
    }

    /// Loading a handle reproduces the registered key exactly, observable
    /// as identical deterministic signatures that verify under the
    /// registered public key.
    #[test]
    fn loads_reproduce_the_registered_key(
        app_id in proptest::array::uniform32(0u8..),
        digest in proptest::array::uniform32(0u8..),
    ) {
        let mut token = fresh_token();
        let (handle, public) = token
            .generate_key_pair(&app_id)
            .expect("registration should succeed");

        token.load_key(&handle, &app_id).expect("load should succeed");
        let first = token
            .sign(SigningSlot::Ephemeral, &digest)
            .expect("sign should succeed");

        token.load_key(&handle, &app_id).expect("load should succeed");
        let second = token
            .sign(SigningSlot::Ephemeral, &digest)
            .expect("sign should succeed");

        prop_assert_eq!(first, second);
        prop_assert!(signature_verifies(&public, &digest, &first));
    }

    /// Any corruption of the integrity tag fails verification.
    #[test]
    fn corrupted_tags_are_rejected(
        app_id in proptest::array::uniform32(0u8..),
        index in 0usize..16,
        mask in 1u8..=255,
    ) {
        let mut token = fresh_token();
        let (handle, _public) = token
            .generate_key_pair(&app_id)
            .expect("registration should succeed");

        let mut tampered = handle;
        tampered.integrity_tag[index] ^= mask;
        prop_assert!(!token
            .verify_handle(&tampered, &app_id)
            .expect("verify should succeed"));
    }
}
