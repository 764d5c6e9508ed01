// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Sealing response-queue messages (spec.md §6): an ephemeral X25519 key
//! agreement against the queue's configured static public key, feeding a
//! ChaCha20-Poly1305 AEAD over the serialized `Report` bytes. Mirrors the
//! sealed-box pattern used for encryption elsewhere in the example pack
//! rather than a bespoke framing.

use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Nonce};
use rand_core::{OsRng, RngCore};
use x25519_dalek::{EphemeralSecret, PublicKey};

use crate::error::AdapterError;

const NONCE_LEN: usize = 12;
const PUBLIC_KEY_LEN: usize = 32;

/// Seals `plaintext` for the recipient identified by `recipient_public_key`
/// (a raw 32-byte X25519 public key). The output is
/// `ephemeral_public_key(32) || nonce(12) || ciphertext`, which is all a
/// receiver needs to recover the shared secret and decrypt.
pub fn seal(plaintext: &[u8], recipient_public_key: &[u8]) -> Result<Vec<u8>, AdapterError> {
    if recipient_public_key.len() != PUBLIC_KEY_LEN {
        return Err(AdapterError::Crypto(format!(
            "public key must be {PUBLIC_KEY_LEN} bytes, got {}",
            recipient_public_key.len()
        )));
    }
    let mut recipient_bytes = [0u8; PUBLIC_KEY_LEN];
    recipient_bytes.copy_from_slice(recipient_public_key);
    let recipient = PublicKey::from(recipient_bytes);

    let ephemeral_secret = EphemeralSecret::random_from_rng(OsRng);
    let ephemeral_public = PublicKey::from(&ephemeral_secret);
    let shared = ephemeral_secret.diffie_hellman(&recipient);

    let cipher = ChaCha20Poly1305::new(shared.as_bytes().into());
    let mut nonce_bytes = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, plaintext)
        .map_err(|e| AdapterError::Crypto(e.to_string()))?;

    let mut out = Vec::with_capacity(PUBLIC_KEY_LEN + NONCE_LEN + ciphertext.len());
    out.extend_from_slice(ephemeral_public.as_bytes());
    out.extend_from_slice(&nonce_bytes);
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

#[cfg(test)]
#[path = "crypto_tests.rs"]
mod tests;
