//! Best-effort secure removal of plaintext credential files.
//!
//! The file is overwritten in place with zeros, flushed to disk, then
//! unlinked. This reduces forensic recoverability of a retired token file;
//! on copy-on-write or journaling filesystems the old blocks may survive.

use std::fs::{self, OpenOptions};
use std::io::{self, ErrorKind, Write};
use std::path::Path;

const CHUNK_SIZE: usize = 8 * 1024;

/// Overwrite `path` with zeros, sync it, and remove it.
///
/// Returns the number of zero bytes written, or `0` if the file did not
/// exist. Overwrite and sync failures are logged and removal is still
/// attempted; only a failed removal is an error.
pub fn secure_erase(path: &Path) -> io::Result<u64> {
    let len = match fs::metadata(path) {
        Ok(meta) => meta.len(),
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e),
    };

    let written = match zero_fill(path, len) {
        Ok(written) => written,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "failed to overwrite file before removal");
            0
        }
    };

    match fs::remove_file(path) {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => return Err(e),
    }

    tracing::debug!(path = %path.display(), bytes = written, "securely erased file");
    Ok(written)
}

/// Overwrite the first `len` bytes of `path` with zeros and sync.
///
/// The file is not truncated. Returns the number of bytes written.
pub fn zero_fill(path: &Path, len: u64) -> io::Result<u64> {
    let mut file = OpenOptions::new().write(true).open(path)?;
    let zeros = [0u8; CHUNK_SIZE];

    let mut remaining = len;
    while remaining > 0 {
        let n = remaining.min(CHUNK_SIZE as u64) as usize;
        file.write_all(&zeros[..n])?;
        remaining -= n as u64;
    }

    file.sync_all()?;
    Ok(len)
}
