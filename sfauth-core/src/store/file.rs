//! Restricted-permission JSON file backend.
//!
//! This is the last resort in every chain: the file lives in the per-user
//! config directory, the directory is created owner-only (0700) and the
//! file owner read/write (0600). Writes go to a temporary sibling first
//! and are renamed into place, so a crash never leaves a half-written
//! token behind.

use async_trait::async_trait;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use super::{Backend, CredentialStore, StoreError};
use crate::config::{DIR_MODE, FILE_MODE};
use crate::erase::secure_erase;
use crate::token::TokenRecord;

/// File-backed credential store.
#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    /// Create a store writing to `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the token file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read and parse a token file.
    ///
    /// Returns `Ok(None)` if the file does not exist.
    pub fn read_record(path: &Path) -> Result<Option<TokenRecord>, StoreError> {
        let contents = match fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        Ok(Some(serde_json::from_str(&contents)?))
    }

    fn write_record(&self, record: &TokenRecord) -> Result<(), StoreError> {
        let mut data = zeroize::Zeroizing::new(serde_json::to_string_pretty(record)?);
        data.push('\n');
        write_private_file(&self.path, data.as_bytes())?;
        Ok(())
    }
}

/// Atomically replace `path` with `data`, owner read/write only.
///
/// The parent directory is created owner-only if missing. The data is
/// written to a temporary sibling, synced, then renamed into place.
pub(crate) fn write_private_file(path: &Path, data: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            create_private_dir(parent)?;
        }
    }

    let mut temp_name = path.as_os_str().to_owned();
    temp_name.push(".tmp");
    let temp_path = PathBuf::from(temp_name);

    let mut file = open_private(&temp_path)?;
    file.write_all(data)?;
    file.sync_all()?;
    drop(file);

    fs::rename(&temp_path, path)?;
    restrict_permissions(path, FILE_MODE)
}

/// Create `dir` and its parents, owner access only.
#[cfg(unix)]
pub(crate) fn create_private_dir(dir: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::DirBuilderExt;

    fs::DirBuilder::new()
        .recursive(true)
        .mode(DIR_MODE)
        .create(dir)
}

#[cfg(not(unix))]
pub(crate) fn create_private_dir(dir: &Path) -> std::io::Result<()> {
    fs::create_dir_all(dir)
}

#[cfg(unix)]
fn open_private(path: &Path) -> std::io::Result<fs::File> {
    use std::os::unix::fs::OpenOptionsExt;

    fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(FILE_MODE)
        .open(path)
}

#[cfg(not(unix))]
fn open_private(path: &Path) -> std::io::Result<fs::File> {
    fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)
}

#[cfg(unix)]
fn restrict_permissions(path: &Path, mode: u32) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;

    fs::set_permissions(path, fs::Permissions::from_mode(mode))
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path, _mode: u32) -> std::io::Result<()> {
    Ok(())
}

#[async_trait]
impl CredentialStore for FileStore {
    async fn get(&self) -> Result<Option<TokenRecord>, StoreError> {
        Self::read_record(&self.path)
    }

    async fn set(&self, record: &TokenRecord) -> Result<(), StoreError> {
        self.write_record(record)
    }

    async fn delete(&self) -> Result<(), StoreError> {
        secure_erase(&self.path)?;
        Ok(())
    }

    fn backend(&self) -> Backend {
        Backend::File
    }
}
