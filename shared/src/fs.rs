//! Filesystem helpers shared across mhproxy tools and the engine.

use std::io;
use std::path::Path;

use anyhow::{Context, Result};

/// Maximum allowed size for a compiled proxy cache read into memory.
pub const MAX_CACHE_BYTES: u64 = 256 * 1024 * 1024; // 256 MiB
/// Maximum allowed size for a text proxy source.
pub const MAX_SOURCE_BYTES: u64 = 512 * 1024 * 1024; // 512 MiB

/// Read a file into memory, failing with `InvalidData` when it is larger
/// than `max_bytes`. Keeps the `io::ErrorKind` so callers can tell a missing
/// file from other failures.
pub fn read_capped(path: &Path, max_bytes: u64) -> io::Result<Vec<u8>> {
    let len = std::fs::metadata(path)?.len();
    if len > max_bytes {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("file too large ({len} bytes, max {max_bytes} bytes)"),
        ));
    }
    std::fs::read(path)
}

/// Read a file into memory with a size cap.
pub fn read_file_with_limit(path: &Path, max_bytes: u64) -> Result<Vec<u8>> {
    read_capped(path, max_bytes)
        .with_context(|| format!("Failed to read file: {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_file_with_limit_rejects_large_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("big.bin");
        std::fs::write(&path, vec![0u8; 64]).unwrap();

        assert!(read_file_with_limit(&path, 16).is_err());
        assert_eq!(read_file_with_limit(&path, 64).unwrap().len(), 64);
    }

    #[test]
    fn test_read_capped_error_kinds() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("source.mhclo");
        std::fs::write(&path, "verts\n0\n").unwrap();

        let err = read_capped(&path, 4).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
        let err = read_capped(&dir.path().join("nope"), 4).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
        assert_eq!(read_capped(&path, 64).unwrap(), b"verts\n0\n");
    }

    #[test]
    fn test_read_file_with_limit_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(read_file_with_limit(&dir.path().join("nope"), 16).is_err());
    }
}
