// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-queue response-encryption public keys (spec.md §6's `--encrypt-dir`):
//! a flat directory where each file is named after a queue's short name and
//! holds that queue's raw 32-byte X25519 public key. Unlike
//! `credentials.rs`'s per-region subdirectory scan, there is exactly one
//! flat lookup here — a queue either has a key file or it doesn't, and a
//! missing file just means "send response-queue reports in the clear",
//! never a hard error.

use std::path::PathBuf;

const PUBLIC_KEY_LEN: usize = 32;

/// Resolves a queue's response-encryption public key from `--encrypt-dir`,
/// if configured. Keys are re-read on every lookup (not cached) so a
/// rotated key file takes effect on the next responder provisioning.
#[derive(Debug, Clone)]
pub struct EncryptionKeyStore {
    root: PathBuf,
}

impl EncryptionKeyStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Reads the public key file for `queue_short_name`, if present.
    /// Returns `None` (rather than an error) for a missing file or one
    /// that isn't exactly 32 bytes, since an unconfigured key is a normal,
    /// expected state for a queue that simply isn't encrypting reports.
    pub fn public_key_for(&self, queue_short_name: &str) -> Option<Vec<u8>> {
        let bytes = std::fs::read(self.key_path(queue_short_name)).ok()?;
        if bytes.len() != PUBLIC_KEY_LEN {
            return None;
        }
        Some(bytes)
    }

    fn key_path(&self, queue_short_name: &str) -> PathBuf {
        self.root.join(queue_short_name)
    }
}

#[cfg(test)]
#[path = "encrypt_keys_tests.rs"]
mod tests;
