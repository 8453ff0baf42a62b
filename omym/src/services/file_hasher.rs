//! Content hashing
//!
//! The SHA-256 of a file's bytes is its identity in the state store, so it
//! must not change when the file moves.

use omym_common::{Error, Result};
use sha2::{Digest, Sha256};
use std::path::Path;

const CHUNK_SIZE: usize = 1024 * 1024;

/// Calculate the SHA-256 of a file (lower-case hex)
///
/// **Algorithm:**
/// 1. Read file content in chunks (1MB at a time for memory efficiency)
/// 2. Feed each chunk to SHA-256
/// 3. Return hex-encoded hash string
pub async fn calculate_hash(file_path: &Path) -> Result<String> {
    let path = file_path.to_path_buf();

    let hash = tokio::task::spawn_blocking(move || -> Result<String> {
        use std::io::Read;

        let mut file = std::fs::File::open(&path).map_err(|e| {
            Error::Io(std::io::Error::new(
                e.kind(),
                format!("Failed to open {} for hashing: {}", path.display(), e),
            ))
        })?;

        let mut hasher = Sha256::new();
        let mut buffer = vec![0u8; CHUNK_SIZE];
        loop {
            let bytes_read = file.read(&mut buffer)?;
            if bytes_read == 0 {
                break;
            }
            hasher.update(&buffer[..bytes_read]);
        }

        Ok(format!("{:x}", hasher.finalize()))
    })
    .await
    .map_err(|e| Error::Internal(format!("Hash calculation task failed: {}", e)))??;

    tracing::debug!(path = %file_path.display(), hash = %hash, "Calculated hash");
    Ok(hash)
}
