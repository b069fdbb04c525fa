//! Lumen Vault - Secure Filesystem Operations
//!
//! Atomic writes (temp + rename) for everything that must survive a
//! crash mid-write, and best-effort secure deletion for ciphertext.

use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use rand::RngCore;

use crate::error::{VaultError, VaultResult};

/// Files at or above this size are unlinked without overwriting.
/// Full secure-erase is not guaranteed for very large files.
pub const SECURE_WIPE_MAX: u64 = 100 * 1024 * 1024;

/// Overwrite block size for secure deletion
const WIPE_BLOCK: usize = 1024 * 1024;

/// A file written to a temp path and renamed into place on commit.
///
/// Dropping without [`AtomicFile::commit`] removes the temp file, so a
/// cancelled or failed writer never leaves a partial file at the
/// destination path.
pub struct AtomicFile {
    temp: PathBuf,
    dest: PathBuf,
    file: Option<File>,
    committed: bool,
}

impl AtomicFile {
    pub fn create(dest: &Path) -> VaultResult<Self> {
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }
        let temp = dest.with_extension("tmp");
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&temp)?;
        Ok(Self {
            temp,
            dest: dest.to_path_buf(),
            file: Some(file),
            committed: false,
        })
    }

    /// Sync and rename into place.
    pub fn commit(mut self) -> VaultResult<()> {
        if let Some(file) = self.file.take() {
            file.sync_all()?;
        }
        fs::rename(&self.temp, &self.dest)?;
        self.committed = true;
        Ok(())
    }

    pub fn dest(&self) -> &Path {
        &self.dest
    }
}

impl Write for AtomicFile {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.file
            .as_mut()
            .expect("write after commit")
            .write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.file.as_mut().expect("flush after commit").flush()
    }
}

impl Drop for AtomicFile {
    fn drop(&mut self) {
        if !self.committed {
            drop(self.file.take());
            let _ = fs::remove_file(&self.temp);
        }
    }
}

/// Filesystem handler rooted at the vault directory.
pub struct SecureFs {
    root: PathBuf,
}

impl SecureFs {
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Full path for a vault-relative file
    pub fn full_path(&self, relative: &str) -> PathBuf {
        self.root.join(relative)
    }

    /// Write a file atomically (temp + rename).
    pub fn write_file(&self, relative_path: &str, data: &[u8]) -> VaultResult<()> {
        let mut file = AtomicFile::create(&self.full_path(relative_path))?;
        file.write_all(data)?;
        file.commit()
    }

    /// Open an atomic writer for a vault-relative path.
    pub fn atomic_writer(&self, relative_path: &str) -> VaultResult<AtomicFile> {
        AtomicFile::create(&self.full_path(relative_path))
    }

    /// Read a whole file.
    pub fn read_file(&self, relative_path: &str) -> VaultResult<Vec<u8>> {
        let path = self.full_path(relative_path);
        if !path.exists() {
            return Err(VaultError::FileNotFound(path.display().to_string()));
        }

        let mut file = File::open(&path)?;
        let mut data = Vec::new();
        file.read_to_end(&mut data)?;
        Ok(data)
    }

    /// Open a file for streaming reads.
    pub fn open_file(&self, relative_path: &str) -> VaultResult<File> {
        let path = self.full_path(relative_path);
        if !path.exists() {
            return Err(VaultError::FileNotFound(path.display().to_string()));
        }
        Ok(File::open(&path)?)
    }

    /// Delete a file, optionally overwriting its contents with random
    /// bytes first. Files at or above [`SECURE_WIPE_MAX`] are unlinked
    /// without overwriting even when `secure` is requested.
    pub fn delete_file(&self, relative_path: &str, secure: bool) -> VaultResult<()> {
        let path = self.full_path(relative_path);
        if !path.exists() {
            return Ok(());
        }

        if secure {
            let size = fs::metadata(&path)?.len();
            if size > 0 && size < SECURE_WIPE_MAX {
                wipe_file(&path, size)?;
            } else if size >= SECURE_WIPE_MAX {
                log::warn!(
                    "skipping overwrite of {} ({} bytes, above wipe limit)",
                    path.display(),
                    size
                );
            }
        }

        fs::remove_file(&path)?;
        Ok(())
    }

    pub fn exists(&self, relative_path: &str) -> bool {
        self.full_path(relative_path).exists()
    }

    pub fn file_size(&self, relative_path: &str) -> VaultResult<u64> {
        let path = self.full_path(relative_path);
        Ok(fs::metadata(&path)?.len())
    }

    pub fn ensure_dir(&self, relative_path: &str) -> VaultResult<()> {
        fs::create_dir_all(self.full_path(relative_path))?;
        Ok(())
    }

    /// Total size of the vault directory tree.
    pub fn total_size(&self) -> VaultResult<u64> {
        let mut size = 0;
        for entry in walkdir::WalkDir::new(&self.root) {
            let entry = entry.map_err(|e| VaultError::Io(e.into()))?;
            if entry.file_type().is_file() {
                size += entry.metadata().map_err(|e| VaultError::Io(e.into()))?.len();
            }
        }
        Ok(size)
    }
}

fn wipe_file(path: &Path, size: u64) -> VaultResult<()> {
    let mut file = OpenOptions::new().write(true).open(path)?;
    let mut block = vec![0u8; WIPE_BLOCK.min(size as usize)];
    let mut rng = rand::thread_rng();

    let mut remaining = size as usize;
    while remaining > 0 {
        let to_write = remaining.min(block.len());
        rng.fill_bytes(&mut block[..to_write]);
        file.write_all(&block[..to_write])?;
        remaining -= to_write;
    }
    file.sync_all()?;
    Ok(())
}
