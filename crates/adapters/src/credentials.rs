// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Directory-of-pairs credential store for the SQS adapter (spec.md §6):
//! each subdirectory under the configured root holds exactly one
//! region-marker file and one credentials file. Out of THE CORE proper —
//! the engine never inspects a `CredentialHandle`'s contents, only the
//! adapter that issued it.

use std::path::{Path, PathBuf};

use qrunner_core::CredentialHandle;
use thiserror::Error;

const REGION_FILE: &str = "region";
const CREDENTIALS_FILE: &str = "credentials";

#[derive(Debug, Error)]
pub enum CredentialStoreError {
    #[error("failed to read credential directory {0}: {1}")]
    Io(PathBuf, #[source] std::io::Error),
    #[error("subdirectory {0} is missing its region or credentials file")]
    Incomplete(PathBuf),
}

/// One region's discovered AWS credentials, paired with a handle the SQS
/// adapter can later resolve back to an access key / secret key pair.
#[derive(Debug, Clone)]
pub struct RegionCredential {
    pub region: String,
    pub handle: CredentialHandle,
    dir: PathBuf,
}

impl RegionCredential {
    /// Reads the two-line `access_key_id\nsecret_access_key` credentials
    /// file for this region. Re-read on demand rather than cached, so a
    /// rotated credential file is picked up on the next refresh.
    pub fn load_keys(&self) -> Result<(String, String), CredentialStoreError> {
        let contents = std::fs::read_to_string(self.dir.join(CREDENTIALS_FILE))
            .map_err(|e| CredentialStoreError::Io(self.dir.clone(), e))?;
        let mut lines = contents.lines().map(str::trim).filter(|l| !l.is_empty());
        let access_key = lines
            .next()
            .ok_or_else(|| CredentialStoreError::Incomplete(self.dir.clone()))?
            .to_string();
        let secret_key = lines
            .next()
            .ok_or_else(|| CredentialStoreError::Incomplete(self.dir.clone()))?
            .to_string();
        Ok((access_key, secret_key))
    }
}

/// Scans `root` for region subdirectories, returning one `RegionCredential`
/// per subdirectory that has both a `region` marker file and a
/// `credentials` file.
pub fn scan(root: &Path) -> Result<Vec<RegionCredential>, CredentialStoreError> {
    let mut out = Vec::new();
    let entries =
        std::fs::read_dir(root).map_err(|e| CredentialStoreError::Io(root.to_path_buf(), e))?;
    for entry in entries {
        let entry = entry.map_err(|e| CredentialStoreError::Io(root.to_path_buf(), e))?;
        if !entry.file_type().map(|t| t.is_dir()).unwrap_or(false) {
            continue;
        }
        let dir = entry.path();
        let region_path = dir.join(REGION_FILE);
        let creds_path = dir.join(CREDENTIALS_FILE);
        if !region_path.is_file() || !creds_path.is_file() {
            return Err(CredentialStoreError::Incomplete(dir));
        }
        let region = std::fs::read_to_string(&region_path)
            .map_err(|e| CredentialStoreError::Io(dir.clone(), e))?
            .trim()
            .to_string();
        let handle = CredentialHandle::new(dir.to_string_lossy().into_owned());
        out.push(RegionCredential { region, handle, dir });
    }
    Ok(out)
}

#[cfg(test)]
#[path = "credentials_tests.rs"]
mod tests;
