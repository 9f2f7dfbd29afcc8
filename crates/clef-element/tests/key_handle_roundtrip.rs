#![allow(clippy::unwrap_used, clippy::arithmetic_side_effects)]

//! End-to-end registration and authentication flows against the software
//! element: generate, verify, load, sign, and check the signature with a
//! host-side ECDSA verifier.

use clef_core::handle::PublicKey;
use clef_core::{ElementLayout, KeyHandle, SigningSlot, U2fToken};
use clef_element::SoftElement;
use p256::ecdsa::signature::hazmat::PrehashVerifier;
use p256::ecdsa::{Signature, VerifyingKey};
use sha2::{Digest, Sha256};

const CERT: &[u8] = b"attestation-cert-der";

fn app_id(origin: &str) -> [u8; 32] {
    Sha256::digest(origin.as_bytes()).into()
}

fn fresh_token() -> U2fToken<SoftElement> {
    let layout = ElementLayout::default();
    U2fToken::new(SoftElement::provision(layout), layout, CERT.to_vec())
}

fn signature_verifies(public: &PublicKey, digest: &[u8; 32], signature: &[u8; 64]) -> bool {
    let mut sec1 = [0u8; 65];
    sec1[0] = 0x04;
    sec1[1..].copy_from_slice(&public.to_bytes());
    let key = VerifyingKey::from_sec1_bytes(&sec1).expect("public key should parse");
    let sig = Signature::from_slice(signature).expect("signature should parse");
    key.verify_prehash(digest, &sig).is_ok()
}

#[test]
fn registration_and_authentication_scenario() {
    let mut token = fresh_token();
    let site = app_id("https://example.com");
    let other = app_id("https://other.example");
    let challenge = app_id("challenge digest");

    let (handle, public) = token
        .generate_key_pair(&site)
        .expect("registration should succeed");

    assert!(token.verify_handle(&handle, &site).expect("verify should succeed"));
    assert!(!token.verify_handle(&handle, &other).expect("verify should succeed"));

    token.load_key(&handle, &site).expect("load should succeed");
    let signature = token
        .sign(SigningSlot::Ephemeral, &challenge)
        .expect("sign should succeed");
    assert!(signature_verifies(&public, &challenge, &signature));
}

#[test]
fn generation_leaves_the_key_loaded() {
    let mut token = fresh_token();
    let site = app_id("https://example.com");
    let digest = app_id("post-registration challenge");

    let (_handle, public) = token
        .generate_key_pair(&site)
        .expect("registration should succeed");
    let signature = token
        .sign(SigningSlot::Ephemeral, &digest)
        .expect("sign should succeed");
    assert!(signature_verifies(&public, &digest, &signature));
}

#[test]
fn repeated_loads_reproduce_the_same_key() {
    let mut token = fresh_token();
    let site = app_id("https://example.com");
    let digest = app_id("fixed challenge");

    let (handle, public) = token
        .generate_key_pair(&site)
        .expect("registration should succeed");
    let after_generate = token
        .sign(SigningSlot::Ephemeral, &digest)
        .expect("sign should succeed");

    token.load_key(&handle, &site).expect("load should succeed");
    let after_first_load = token
        .sign(SigningSlot::Ephemeral, &digest)
        .expect("sign should succeed");

    token.load_key(&handle, &site).expect("load should succeed");
    let after_second_load = token
        .sign(SigningSlot::Ephemeral, &digest)
        .expect("sign should succeed");

    // Deterministic nonces make identical slot content observable as
    // identical signatures.
    assert_eq!(after_generate, after_first_load);
    assert_eq!(after_first_load, after_second_load);
    assert!(signature_verifies(&public, &digest, &after_second_load));
}

#[test]
fn every_single_bit_flip_of_the_integrity_tag_fails() {
    let mut token = fresh_token();
    let site = app_id("https://example.com");
    let (handle, _public) = token
        .generate_key_pair(&site)
        .expect("registration should succeed");

    for byte in 0..16 {
        for bit in 0..8 {
            let mut tampered = handle.clone();
            tampered.integrity_tag[byte] ^= 1 << bit;
            assert!(
                !token
                    .verify_handle(&tampered, &site)
                    .expect("verify should succeed"),
                "flipping tag byte {byte} bit {bit} must fail verification"
            );
        }
    }
}

#[test]
fn handles_bind_to_their_device() {
    let mut device_a = fresh_token();
    let mut device_b = fresh_token();
    let site = app_id("https://example.com");

    let (handle, _public) = device_a
        .generate_key_pair(&site)
        .expect("registration should succeed");

    assert!(
        !device_b
            .verify_handle(&handle, &site)
            .expect("verify should succeed"),
        "a handle must not verify under another device's master key"
    );
}

#[test]
fn wire_roundtrip_preserves_verification() {
    let mut token = fresh_token();
    let site = app_id("https://example.com");
    let (handle, _public) = token
        .generate_key_pair(&site)
        .expect("registration should succeed");

    let restored =
        KeyHandle::from_bytes(&handle.to_bytes()).expect("from_bytes should succeed");
    assert_eq!(restored, handle);
    assert!(token.verify_handle(&restored, &site).expect("verify should succeed"));
}

#[test]
fn unissued_nonce_loads_mechanically_but_signs_uselessly() {
    let mut token = fresh_token();
    let site = app_id("https://example.com");
    let digest = app_id("challenge");

    let (handle, public) = token
        .generate_key_pair(&site)
        .expect("registration should succeed");

    let mut foreign = handle.clone();
    foreign.nonce[0] ^= 0xFF;

    assert!(
        !token
            .verify_handle(&foreign, &site)
            .expect("verify should succeed"),
        "a never-issued nonce must fail the integrity check"
    );

    // The derivation is total: the load succeeds and produces *a* key —
    // just not one any issued public key knows about.
    token.load_key(&foreign, &site).expect("load should succeed");
    let signature = token
        .sign(SigningSlot::Ephemeral, &digest)
        .expect("sign should succeed");
    assert!(!signature_verifies(&public, &digest, &signature));
}

#[test]
fn loading_under_the_wrong_app_id_signs_uselessly() {
    let mut token = fresh_token();
    let site = app_id("https://example.com");
    let other = app_id("https://other.example");
    let digest = app_id("challenge");

    let (handle, public) = token
        .generate_key_pair(&site)
        .expect("registration should succeed");

    token.load_key(&handle, &other).expect("load should succeed");
    let signature = token
        .sign(SigningSlot::Ephemeral, &digest)
        .expect("sign should succeed");
    assert!(
        !signature_verifies(&public, &digest, &signature),
        "a key derived under the wrong app id must not match the registered public key"
    );
}

#[test]
fn attestation_signatures_verify_against_the_device_key() {
    let layout = ElementLayout::default();
    let element = SoftElement::provision(layout);
    let attestation_public = element
        .attestation_public_key()
        .expect("attestation key should be valid");
    let mut token = U2fToken::new(element, layout, CERT.to_vec());

    let digest = app_id("registration response");
    let signature = token
        .sign(SigningSlot::Attestation, &digest)
        .expect("attestation sign should succeed");
    assert!(signature_verifies(&attestation_public, &digest, &signature));
    assert_eq!(token.attestation_certificate(), CERT);
}

#[test]
fn counter_increments_by_one_per_call() {
    let mut token = fresh_token();
    let site = app_id("https://example.com");

    let first = token.increment_counter().expect("counter should succeed");
    token
        .generate_key_pair(&site)
        .expect("registration should succeed");
    let second = token.increment_counter().expect("counter should succeed");

    assert_eq!(second, first + 1, "key operations must not consume counter values");
}

#[test]
fn two_registrations_for_one_app_are_independent() {
    let mut token = fresh_token();
    let site = app_id("https://example.com");

    let (first_handle, first_public) = token
        .generate_key_pair(&site)
        .expect("registration should succeed");
    let (second_handle, second_public) = token
        .generate_key_pair(&site)
        .expect("registration should succeed");

    assert_ne!(first_handle.nonce, second_handle.nonce);
    assert_ne!(first_public, second_public);
    assert!(token.verify_handle(&first_handle, &site).expect("verify should succeed"));
    assert!(token.verify_handle(&second_handle, &site).expect("verify should succeed"));
}
