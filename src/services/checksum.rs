//! Content hashing helpers shared by the audit trail and the lock.

use sha2::{Digest, Sha256};
use std::fmt::Write as _;
use std::path::Path;

use crate::domain::error::ExecError;

/// Hex-encoded sha256 of a byte slice.
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    let digest = hasher.finalize();
    let mut out = String::with_capacity(digest.len() * 2);
    for b in digest {
        let _ = write!(&mut out, "{b:02x}");
    }
    out
}

/// Hex-encoded sha256 of a file's contents.
pub async fn sha256_file(path: &Path) -> Result<String, ExecError> {
    let bytes = tokio::fs::read(path).await?;
    Ok(sha256_hex(&bytes))
}
