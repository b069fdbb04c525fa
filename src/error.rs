//! Lumen Vault - Error Types

use std::time::Duration;

use thiserror::Error;
use uuid::Uuid;

/// Result type for vault operations
pub type VaultResult<T> = Result<T, VaultError>;

/// Vault error types
#[derive(Error, Debug)]
pub enum VaultError {
    // ═══════════════════════════════════════════════════════════════
    // AUTHENTICATION ERRORS
    // ═══════════════════════════════════════════════════════════════

    #[error("invalid password - retry allowed in {}s", .retry_after.as_secs())]
    InvalidPassword { retry_after: Duration },

    #[error("biometric authentication is not available")]
    BiometricUnavailable,

    #[error("biometric authentication failed ({attempts_left} attempts left)")]
    BiometricFailed { attempts_left: u32 },

    #[error("biometric authentication disabled for this session - use the password")]
    BiometricLockedOut,

    // ═══════════════════════════════════════════════════════════════
    // CRYPTO ERRORS
    // ═══════════════════════════════════════════════════════════════

    #[error("key derivation failed: {0}")]
    KeyDerivationFailed(String),

    #[error("encryption failed: {0}")]
    EncryptionFailed(String),

    #[error("decryption failed: {0}")]
    DecryptionFailed(String),

    #[error("integrity check failed - data corrupted or tampered")]
    IntegrityCheckFailed,

    #[error("invalid key length: expected {expected}, got {actual}")]
    InvalidKeyLength { expected: usize, actual: usize },

    // ═══════════════════════════════════════════════════════════════
    // FILE ERRORS
    // ═══════════════════════════════════════════════════════════════

    #[error("file not found: {0}")]
    FileNotFound(String),

    #[error("file already exists: {0}")]
    FileAlreadyExists(String),

    #[error("file too large: {size} bytes (max: {max})")]
    FileTooLarge { size: u64, max: u64 },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // ═══════════════════════════════════════════════════════════════
    // FORMAT / INTEGRITY ERRORS
    // ═══════════════════════════════════════════════════════════════

    #[error("catalog corrupted: {0}")]
    CatalogCorrupted(String),

    #[error("entry corrupted: {id}")]
    EntryCorrupted { id: Uuid },

    #[error("file is incomplete - encryption did not finish")]
    IncompleteFile,

    #[error("invalid file format: {0}")]
    InvalidFileFormat(String),

    #[error("unsupported format version: {0}")]
    UnsupportedVersion(u8),

    // ═══════════════════════════════════════════════════════════════
    // SECURITY ERRORS
    // ═══════════════════════════════════════════════════════════════

    #[error("system randomness looks weak - refusing to generate key material")]
    InsecureRandomness,

    // ═══════════════════════════════════════════════════════════════
    // RATE LIMIT ERRORS
    // ═══════════════════════════════════════════════════════════════

    #[error("too many failed attempts - retry in {}s", .retry_after.as_secs())]
    RateLimited { retry_after: Duration },

    // ═══════════════════════════════════════════════════════════════
    // GENERAL ERRORS
    // ═══════════════════════════════════════════════════════════════

    #[error("vault is locked")]
    VaultLocked,

    #[error("vault is not initialized - run setup first")]
    VaultNotInitialized,

    #[error("vault is already initialized at: {0}")]
    AlreadyInitialized(String),

    #[error("entry not found: {0}")]
    EntryNotFound(Uuid),

    #[error("another unlock or lock is already in progress")]
    OperationInProgress,

    #[error("operation cancelled")]
    Cancelled,

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl VaultError {
    /// Human-readable recovery hint, where one exists.
    pub fn recovery_suggestion(&self) -> Option<String> {
        match self {
            VaultError::InvalidPassword { retry_after } | VaultError::RateLimited { retry_after } => {
                Some(format!("wait {} seconds before trying again", retry_after.as_secs()))
            }
            VaultError::BiometricLockedOut | VaultError::BiometricUnavailable => {
                Some("unlock with your password instead".into())
            }
            VaultError::CatalogCorrupted(_) => Some("restore the vault from a backup".into()),
            VaultError::IncompleteFile => Some("the import was interrupted - re-import the item".into()),
            VaultError::VaultLocked => Some("unlock the vault first".into()),
            VaultError::VaultNotInitialized => Some("run setup to create the vault".into()),
            _ => None,
        }
    }

    /// Integrity failures must never be retried blindly.
    pub fn is_integrity_failure(&self) -> bool {
        matches!(
            self,
            VaultError::IntegrityCheckFailed
                | VaultError::CatalogCorrupted(_)
                | VaultError::EntryCorrupted { .. }
        )
    }

    /// Errors that clear up on their own, given time or a retry.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            VaultError::RateLimited { .. }
                | VaultError::InvalidPassword { .. }
                | VaultError::IncompleteFile
                | VaultError::Cancelled
        )
    }
}

impl From<serde_json::Error> for VaultError {
    fn from(e: serde_json::Error) -> Self {
        VaultError::Serialization(e.to_string())
    }
}

impl From<bincode::Error> for VaultError {
    fn from(e: bincode::Error) -> Self {
        VaultError::Serialization(e.to_string())
    }
}

impl From<image::ImageError> for VaultError {
    fn from(e: image::ImageError) -> Self {
        VaultError::InvalidFileFormat(e.to_string())
    }
}
