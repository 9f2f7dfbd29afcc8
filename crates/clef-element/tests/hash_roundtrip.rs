#![allow(clippy::unwrap_used, clippy::arithmetic_side_effects)]

//! Block-chunking transparency of the streaming hash interface.
//!
//! The engine must produce the same digest however the input is split
//! across `update` calls, and that digest must equal a host-side SHA-256 /
//! HMAC-SHA256 reference computation.

use clef_core::hash::HashEngine;
use clef_core::ElementLayout;
use clef_element::SoftElement;
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

const MASTER: [u8; 32] = [0x4D; 32];

fn element() -> SoftElement {
    SoftElement::new(ElementLayout::default(), MASTER, [0x11; 32])
}

fn digest_in_chunks(data: &[u8], chunks: &[usize]) -> [u8; 32] {
    let mut element = element();
    let mut op = HashEngine::start(&mut element).expect("start should succeed");
    let mut offset = 0;
    for len in chunks {
        op.update(&data[offset..offset + len]).expect("update should succeed");
        offset += len;
    }
    op.update(&data[offset..]).expect("update should succeed");
    op.finish().expect("finish should succeed")
}

#[test]
fn chunk_boundaries_do_not_change_the_digest() {
    let data: Vec<u8> = (0..257u16).map(|i| (i % 251) as u8).collect();

    let whole = digest_in_chunks(&data, &[]);
    let split = digest_in_chunks(&data, &[64, 65, 128]);
    let bytewise = digest_in_chunks(&data, &[1; 257]);

    assert_eq!(whole, split);
    assert_eq!(whole, bytewise);
}

#[test]
fn digest_matches_the_host_reference() {
    let data = [0xA7_u8; 200];
    let expected: [u8; 32] = Sha256::digest(data).into();
    assert_eq!(digest_in_chunks(&data, &[]), expected);
}

#[test]
fn boundary_lengths_match_the_host_reference() {
    for len in [0usize, 1, 63, 64, 65, 127, 128, 129] {
        let data: Vec<u8> = (0..len).map(|i| i as u8).collect();
        let expected: [u8; 32] = Sha256::digest(&data).into();
        assert_eq!(
            digest_in_chunks(&data, &[]),
            expected,
            "length {len} must match the reference digest"
        );
    }
}

#[test]
fn keyed_digest_matches_the_host_reference() {
    let layout = ElementLayout::default();
    let data = [0x3C_u8; 100];

    let mut element = element();
    let mut op = HashEngine::start_hmac(&mut element, layout.master_key_slot)
        .expect("start should succeed");
    op.update(&data[..10]).expect("update should succeed");
    op.update(&data[10..]).expect("update should succeed");
    let digest = op.finish().expect("finish should succeed");

    let mut mac =
        Hmac::<Sha256>::new_from_slice(&MASTER).expect("key should be usable");
    mac.update(&data);
    let expected: [u8; 32] = mac.finalize().into_bytes().into();
    assert_eq!(digest, expected);
}

#[test]
fn consecutive_computations_are_independent() {
    let mut element = element();

    let mut op = HashEngine::start(&mut element).expect("start should succeed");
    op.update(b"first message").expect("update should succeed");
    let first = op.finish().expect("finish should succeed");

    let mut op = HashEngine::start(&mut element).expect("start should succeed");
    op.update(b"second message").expect("update should succeed");
    let second = op.finish().expect("finish should succeed");

    assert_ne!(first, second);
    let expected: [u8; 32] = Sha256::digest(b"second message").into();
    assert_eq!(second, expected);
}
