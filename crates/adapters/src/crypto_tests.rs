// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use chacha20poly1305::aead::Aead;
use x25519_dalek::StaticSecret;

#[test]
fn rejects_wrong_length_public_key() {
    let err = seal(b"hello", &[0u8; 4]).unwrap_err();
    assert!(matches!(err, AdapterError::Crypto(_)));
}

#[test]
fn two_seals_of_the_same_plaintext_differ() {
    let secret = StaticSecret::random_from_rng(OsRng);
    let public = PublicKey::from(&secret);

    let a = seal(b"payload", public.as_bytes()).unwrap();
    let b = seal(b"payload", public.as_bytes()).unwrap();
    assert_ne!(a, b, "ephemeral key + nonce must vary per call");
}

#[test]
fn sealed_message_decrypts_with_the_matching_secret() {
    let secret = StaticSecret::random_from_rng(OsRng);
    let public = PublicKey::from(&secret);

    let sealed = seal(b"a queued report", public.as_bytes()).unwrap();
    let ephemeral_public_bytes: [u8; PUBLIC_KEY_LEN] =
        sealed[..PUBLIC_KEY_LEN].try_into().unwrap();
    let nonce_bytes = &sealed[PUBLIC_KEY_LEN..PUBLIC_KEY_LEN + NONCE_LEN];
    let ciphertext = &sealed[PUBLIC_KEY_LEN + NONCE_LEN..];

    let ephemeral_public = PublicKey::from(ephemeral_public_bytes);
    let shared = secret.diffie_hellman(&ephemeral_public);
    let cipher = ChaCha20Poly1305::new(shared.as_bytes().into());
    let plaintext = cipher
        .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
        .unwrap();

    assert_eq!(plaintext, b"a queued report");
}
