// ─── Checksum Engine ───
// CRC32 drift detection for local install files.

use std::path::Path;

use crc32fast::Hasher;
use tokio::io::AsyncReadExt;

use crate::core::error::{LauncherError, LauncherResult};

const READ_BUF_SIZE: usize = 64 * 1024;

/// Compute the CRC32 (IEEE) checksum of a local file, streamed through
/// a fixed-size buffer so large game archives never land in memory whole.
///
/// Returns `Ok(None)` when the file does not exist — an expected outcome
/// that drives download decisions, not an error. Any other IO failure
/// propagates.
pub async fn file_crc32(path: &Path) -> LauncherResult<Option<String>> {
    let mut file = match tokio::fs::File::open(path).await {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(LauncherError::Io {
                path: path.to_path_buf(),
                source,
            })
        }
    };

    let mut hasher = Hasher::new();
    let mut buf = vec![0u8; READ_BUF_SIZE];

    loop {
        let n = file.read(&mut buf).await.map_err(|source| LauncherError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }

    Ok(Some(format!("{:08x}", hasher.finalize())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn checksum_of_known_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("check.dat");
        // Standard CRC-32/IEEE check value.
        tokio::fs::write(&path, b"123456789").await.unwrap();

        let crc = file_crc32(&path).await.unwrap();
        assert_eq!(crc.as_deref(), Some("cbf43926"));
    }

    #[tokio::test]
    async fn missing_file_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let crc = file_crc32(&dir.path().join("absent.dat")).await.unwrap();
        assert_eq!(crc, None);
    }

    #[tokio::test]
    async fn empty_file_has_zero_checksum() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.dat");
        tokio::fs::write(&path, b"").await.unwrap();

        let crc = file_crc32(&path).await.unwrap();
        assert_eq!(crc.as_deref(), Some("00000000"));
    }
}
