//! Lumen Vault - Catalog (Encrypted Metadata Store)
//!
//! The ordered list of vault entries, persisted as one document:
//!
//! ```text
//! [MAGIC 8B]["LMNVCATL"]
//! [VERSION 1B][0x01]
//! [DOC SALT 16B][random per save, keys this revision's payload]
//! [PAYLOAD][stream-encrypted bincode of the entry list]
//! [HMAC 32B][HMAC-SHA256 over everything above]
//! ```
//!
//! The HMAC is checked before anything else on load; a mismatch is
//! catalog corruption and fatal to opening the vault. Every mutation
//! rewrites the whole document atomically, so a crash mid-write leaves
//! the previous valid catalog intact. The payload key is derived from
//! the salt on every save, so the stream cipher's counter nonces never
//! repeat across catalog revisions.

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use uuid::Uuid;

use crate::crypto::keys::KeyMaterial;
use crate::crypto::stream::{decrypt_bytes, encrypt_bytes};
use crate::error::{VaultError, VaultResult};
use crate::secure_fs::SecureFs;

/// Catalog filename inside the vault root
pub const CATALOG_FILE: &str = "catalog.lmv";

const CATALOG_MAGIC: [u8; 8] = *b"LMNVCATL";
const CATALOG_VERSION: u8 = 0x01;
const DOC_SALT_LEN: usize = 16;
const HMAC_LEN: usize = 32;
const HEADER_LEN: usize = CATALOG_MAGIC.len() + 1 + DOC_SALT_LEN;

type HmacSha256 = Hmac<Sha256>;

/// Media kind of a vault entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MediaType {
    Photo,
    Video,
}

/// Geographic capture location
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

/// One item in the vault
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VaultEntry {
    /// Unique ID
    pub id: Uuid,
    /// Vault-relative path of the content ciphertext
    pub ciphertext_path: String,
    /// Vault-relative path of the thumbnail ciphertext, if one exists
    pub thumb_path: Option<String>,
    /// Original filename
    pub filename: String,
    /// Import timestamp
    pub date_added: DateTime<Utc>,
    /// Original capture date, when known
    pub date_captured: Option<DateTime<Utc>>,
    /// Album the item came from, when known
    pub source_album: Option<String>,
    /// Plaintext size in bytes
    pub file_size: u64,
    /// Photo or video
    pub media_type: MediaType,
    /// Video duration in seconds
    pub duration_secs: Option<f64>,
    /// Capture location
    pub location: Option<GeoPoint>,
    /// Favorite flag
    pub favorite: bool,
}

/// In-memory catalog, loaded on unlock and dropped on lock.
///
/// Entries keep insertion order; IDs are unique.
#[derive(Debug, Default)]
pub struct Catalog {
    entries: Vec<VaultEntry>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load and verify the persisted catalog. A missing file is a
    /// fresh vault and yields an empty catalog.
    pub fn load(fs: &SecureFs, keys: &KeyMaterial) -> VaultResult<Self> {
        if !fs.exists(CATALOG_FILE) {
            return Ok(Self::new());
        }
        let data = fs.read_file(CATALOG_FILE)?;

        if data.len() < HEADER_LEN + HMAC_LEN {
            return Err(VaultError::CatalogCorrupted("file too small".into()));
        }
        if data[..CATALOG_MAGIC.len()] != CATALOG_MAGIC {
            return Err(VaultError::CatalogCorrupted("bad magic bytes".into()));
        }
        if data[CATALOG_MAGIC.len()] != CATALOG_VERSION {
            return Err(VaultError::CatalogCorrupted(format!(
                "unsupported version {}",
                data[CATALOG_MAGIC.len()]
            )));
        }

        // Integrity first: nothing else in the file is trusted until
        // the HMAC verifies.
        let body_len = data.len() - HMAC_LEN;
        let mut mac = HmacSha256::new_from_slice(keys.hmac_key().expose())
            .map_err(|e| VaultError::CatalogCorrupted(e.to_string()))?;
        mac.update(&data[..body_len]);
        if mac.verify_slice(&data[body_len..]).is_err() {
            return Err(VaultError::CatalogCorrupted(
                "integrity value mismatch".into(),
            ));
        }

        let salt = &data[CATALOG_MAGIC.len() + 1..HEADER_LEN];
        let doc_key = keys
            .derive_catalog_key(salt)
            .map_err(|e| VaultError::CatalogCorrupted(e.to_string()))?;

        let payload = &data[HEADER_LEN..body_len];
        let serialized = decrypt_bytes(&doc_key, payload)
            .map_err(|e| VaultError::CatalogCorrupted(e.to_string()))?;
        let entries: Vec<VaultEntry> = bincode::deserialize(&serialized)
            .map_err(|e| VaultError::CatalogCorrupted(e.to_string()))?;

        Ok(Self { entries })
    }

    /// Rewrite the whole document atomically.
    pub fn save(&self, fs: &SecureFs, keys: &KeyMaterial) -> VaultResult<()> {
        let mut salt = [0u8; DOC_SALT_LEN];
        rand::thread_rng().fill_bytes(&mut salt);
        let doc_key = keys.derive_catalog_key(&salt)?;

        let serialized = bincode::serialize(&self.entries)?;
        let payload = encrypt_bytes(&doc_key, &serialized)?;

        let mut document = Vec::with_capacity(HEADER_LEN + payload.len() + HMAC_LEN);
        document.extend_from_slice(&CATALOG_MAGIC);
        document.push(CATALOG_VERSION);
        document.extend_from_slice(&salt);
        document.extend_from_slice(&payload);

        let mut mac = HmacSha256::new_from_slice(keys.hmac_key().expose())
            .map_err(|e| VaultError::EncryptionFailed(e.to_string()))?;
        mac.update(&document);
        document.extend_from_slice(&mac.finalize().into_bytes());

        fs.write_file(CATALOG_FILE, &document)?;
        Ok(())
    }

    /// Append a new entry. IDs must be unique.
    pub fn add(&mut self, entry: VaultEntry) -> VaultResult<()> {
        if self.entries.iter().any(|e| e.id == entry.id) {
            return Err(VaultError::FileAlreadyExists(entry.id.to_string()));
        }
        self.entries.push(entry);
        Ok(())
    }

    /// Remove an entry, returning it.
    pub fn remove(&mut self, id: Uuid) -> VaultResult<VaultEntry> {
        let pos = self
            .entries
            .iter()
            .position(|e| e.id == id)
            .ok_or(VaultError::EntryNotFound(id))?;
        Ok(self.entries.remove(pos))
    }

    pub fn rename(&mut self, id: Uuid, new_filename: &str) -> VaultResult<()> {
        let entry = self.get_mut(id)?;
        entry.filename = new_filename.to_string();
        Ok(())
    }

    pub fn set_favorite(&mut self, id: Uuid, favorite: bool) -> VaultResult<()> {
        let entry = self.get_mut(id)?;
        entry.favorite = favorite;
        Ok(())
    }

    pub fn get(&self, id: Uuid) -> Option<&VaultEntry> {
        self.entries.iter().find(|e| e.id == id)
    }

    fn get_mut(&mut self, id: Uuid) -> VaultResult<&mut VaultEntry> {
        self.entries
            .iter_mut()
            .find(|e| e.id == id)
            .ok_or(VaultError::EntryNotFound(id))
    }

    /// Entries in insertion order.
    pub fn entries(&self) -> &[VaultEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, id: Uuid) -> bool {
        self.get(id).is_some()
    }
}
