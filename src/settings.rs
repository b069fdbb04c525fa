//! Lumen Vault - Persisted Settings
//!
//! Cleartext settings document: the salt, the verifier hash, the KDF
//! cost and a couple of behavior knobs. Nothing here is secret - the
//! salt is public by design and the verifier hash is useless without
//! the password.

use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::crypto::keys::{VaultSalt, SALT_LEN};
use crate::error::{VaultError, VaultResult};
use crate::idle::DEFAULT_IDLE_TIMEOUT_SECS;
use crate::secure_fs::SecureFs;

/// Settings filename inside the vault root
pub const SETTINGS_FILE: &str = "settings.json";

/// Current settings document version
pub const SETTINGS_VERSION: u32 = 1;

/// Vault settings document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VaultSettings {
    /// Document version
    pub version: u32,
    /// Key derivation salt, base64
    pub salt: String,
    /// Password verifier hash, hex
    pub verifier_hash: String,
    /// PBKDF2 iteration count used for this vault
    pub kdf_iterations: u32,
    /// Idle timeout before auto-lock
    pub idle_timeout_secs: u64,
    /// Whether biometric unlock is enabled
    pub biometric_enabled: bool,
    /// Vault creation timestamp
    pub created_at: DateTime<Utc>,
}

impl VaultSettings {
    pub fn new(salt: &VaultSalt, verifier_hash: [u8; 32], kdf_iterations: u32) -> Self {
        Self {
            version: SETTINGS_VERSION,
            salt: base64::engine::general_purpose::STANDARD.encode(salt.as_bytes()),
            verifier_hash: hex::encode(verifier_hash),
            kdf_iterations,
            idle_timeout_secs: DEFAULT_IDLE_TIMEOUT_SECS,
            biometric_enabled: false,
            created_at: Utc::now(),
        }
    }

    /// Load from the vault root. `Ok(None)` means the vault has not
    /// been set up yet.
    pub fn load(fs: &SecureFs) -> VaultResult<Option<Self>> {
        if !fs.exists(SETTINGS_FILE) {
            return Ok(None);
        }
        let data = fs.read_file(SETTINGS_FILE)?;
        let settings: VaultSettings = serde_json::from_slice(&data)?;
        if settings.version != SETTINGS_VERSION {
            return Err(VaultError::UnsupportedVersion(settings.version as u8));
        }
        Ok(Some(settings))
    }

    /// Persist atomically.
    pub fn save(&self, fs: &SecureFs) -> VaultResult<()> {
        let data = serde_json::to_vec_pretty(self)?;
        fs.write_file(SETTINGS_FILE, &data)
    }

    pub fn decoded_salt(&self) -> VaultResult<VaultSalt> {
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(&self.salt)
            .map_err(|e| VaultError::Serialization(format!("salt: {}", e)))?;
        let arr: [u8; SALT_LEN] = bytes
            .try_into()
            .map_err(|_| VaultError::Serialization("salt has wrong length".into()))?;
        Ok(VaultSalt::from_bytes(arr))
    }

    pub fn decoded_verifier_hash(&self) -> VaultResult<[u8; 32]> {
        let bytes = hex::decode(&self.verifier_hash)
            .map_err(|e| VaultError::Serialization(format!("verifier hash: {}", e)))?;
        bytes
            .try_into()
            .map_err(|_| VaultError::Serialization("verifier hash has wrong length".into()))
    }
}
