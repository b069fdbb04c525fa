//! Lumen Vault - Key Material
//!
//! Session key material expanded from the password-derived master key.

use hkdf::Hkdf;
use rand::RngCore;
use secrecy::{ExposeSecret, Secret};
use sha2::Sha256;

use crate::error::{VaultError, VaultResult};

/// Key length for AES-256
pub const KEY_LEN: usize = 32;

/// Salt length, generated once at setup
pub const SALT_LEN: usize = 32;

/// HKDF domain-separation labels.
///
/// Each derived key gets its own label so that compromise of one
/// does not weaken the others.
pub mod labels {
    /// Label for the media/catalog encryption key
    pub const ENCRYPTION: &[u8] = b"LumenVault-Encryption";

    /// Label for the catalog integrity HMAC key
    pub const HMAC: &[u8] = b"LumenVault-HMAC";

    /// Label for the password verifier key
    pub const VERIFIER: &[u8] = b"LumenVault-Verifier";

    /// Info prefix for per-entry content keys
    pub const FILE: &str = "LumenVault-File";

    /// Info prefix for per-entry thumbnail keys
    pub const THUMB: &str = "LumenVault-Thumb";

    /// Info for the catalog document key (salted per save)
    pub const CATALOG: &[u8] = b"LumenVault-Catalog";
}

/// Secure key wrapper with automatic zeroization
#[derive(Clone)]
pub struct VaultKey {
    inner: Secret<[u8; KEY_LEN]>,
}

impl VaultKey {
    /// Create a new vault key from bytes
    pub fn new(bytes: [u8; KEY_LEN]) -> Self {
        Self {
            inner: Secret::new(bytes),
        }
    }

    /// Expose the key bytes (use with caution)
    pub fn expose(&self) -> &[u8; KEY_LEN] {
        self.inner.expose_secret()
    }

    /// Generate a random key
    pub fn generate() -> Self {
        let mut bytes = [0u8; KEY_LEN];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self::new(bytes)
    }
}

impl std::fmt::Debug for VaultKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("VaultKey([redacted])")
    }
}

/// Vault salt, generated once at setup and persisted in cleartext.
///
/// Immutable for the lifetime of the vault (except through a password change).
#[derive(Clone)]
pub struct VaultSalt([u8; SALT_LEN]);

impl VaultSalt {
    /// Generate a fresh random salt.
    ///
    /// An all-zero output means the system RNG is broken; refuse it
    /// rather than producing a vault anyone can brute-force.
    pub fn generate() -> VaultResult<Self> {
        let mut bytes = [0u8; SALT_LEN];
        rand::thread_rng().fill_bytes(&mut bytes);
        if bytes.iter().all(|&b| b == 0) {
            return Err(VaultError::InsecureRandomness);
        }
        Ok(Self(bytes))
    }

    pub fn from_bytes(bytes: [u8; SALT_LEN]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; SALT_LEN] {
        &self.0
    }
}

/// Session key material, held only while the vault is unlocked.
///
/// Dropped (and zeroized through [`VaultKey`]) on lock.
pub struct KeyMaterial {
    encryption: VaultKey,
    hmac: VaultKey,
    verifier: VaultKey,
}

impl KeyMaterial {
    /// Expand the three session keys from the master key.
    pub fn expand(master: &VaultKey) -> VaultResult<Self> {
        Ok(Self {
            encryption: expand_key(master, labels::ENCRYPTION)?,
            hmac: expand_key(master, labels::HMAC)?,
            verifier: expand_key(master, labels::VERIFIER)?,
        })
    }

    /// Key for media and catalog encryption. Never used directly for
    /// bulk data: per-file and per-document keys are derived from it,
    /// so the stream cipher's counter nonces cannot collide across
    /// files.
    pub fn encryption_key(&self) -> &VaultKey {
        &self.encryption
    }

    /// Unique content key for one entry. Deterministic in the entry ID,
    /// so it can be recomputed at decrypt time.
    pub fn derive_file_key(&self, entry_id: &str) -> VaultResult<VaultKey> {
        let info = format!("{}:{}", labels::FILE, entry_id);
        derive_key(&self.encryption, &[], info.as_bytes())
    }

    /// Unique thumbnail key for one entry.
    pub fn derive_thumb_key(&self, entry_id: &str) -> VaultResult<VaultKey> {
        let info = format!("{}:{}", labels::THUMB, entry_id);
        derive_key(&self.encryption, &[], info.as_bytes())
    }

    /// Key for one revision of the catalog document. The caller stores
    /// the random salt with the document and passes it back on load.
    pub fn derive_catalog_key(&self, salt: &[u8]) -> VaultResult<VaultKey> {
        derive_key(&self.encryption, salt, labels::CATALOG)
    }

    /// Key for catalog integrity HMAC
    pub fn hmac_key(&self) -> &VaultKey {
        &self.hmac
    }

    /// Key used only to confirm the password
    pub fn verifier_key(&self) -> &VaultKey {
        &self.verifier
    }
}

/// Expand one labeled key from the master key using HKDF-SHA256
pub fn expand_key(master: &VaultKey, label: &[u8]) -> VaultResult<VaultKey> {
    let hk = Hkdf::<Sha256>::new(None, master.expose());
    let mut okm = [0u8; KEY_LEN];

    hk.expand(label, &mut okm)
        .map_err(|e| VaultError::KeyDerivationFailed(e.to_string()))?;

    Ok(VaultKey::new(okm))
}

/// Derive a key using HKDF-SHA256 with an explicit salt and info
pub fn derive_key(ikm: &VaultKey, salt: &[u8], info: &[u8]) -> VaultResult<VaultKey> {
    let salt = if salt.is_empty() { None } else { Some(salt) };
    let hk = Hkdf::<Sha256>::new(salt, ikm.expose());
    let mut okm = [0u8; KEY_LEN];

    hk.expand(info, &mut okm)
        .map_err(|e| VaultError::KeyDerivationFailed(e.to_string()))?;

    Ok(VaultKey::new(okm))
}
