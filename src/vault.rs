//! Lumen Vault - Vault Manager
//!
//! The lock/unlock state machine and everything it gates: key material
//! lifetime, the idle countdown, the sequential import pipeline,
//! decryption, deletion and maintenance.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use uuid::Uuid;
use zeroize::Zeroizing;

use crate::biometrics::{AuthCapability, CapabilityKind, NoAuthCapability};
use crate::catalog::{Catalog, GeoPoint, MediaType, VaultEntry};
use crate::crypto::kdf::{self, KdfParams};
use crate::crypto::keys::{expand_key, labels, KeyMaterial, VaultKey, VaultSalt};
use crate::crypto::stream::{decrypt_bytes, encrypt_bytes, StreamDecryptor, StreamEncryptor};
use crate::error::{VaultError, VaultResult};
use crate::idle::IdleTimer;
use crate::progress::{CancelToken, ProgressSink};
use crate::ratelimit::RateLimiter;
use crate::secure_fs::{AtomicFile, SecureFs};
use crate::settings::VaultSettings;
use crate::thumbs::PreviewEngine;

/// Directory for content ciphertexts
pub const MEDIA_DIR: &str = "media";

/// Directory for thumbnail ciphertexts
pub const THUMBS_DIR: &str = "thumbs";

/// Directory for decrypted temporary files (purged on lock)
pub const TMP_DIR: &str = "tmp";

/// Largest entry [`Vault::decrypt_to_buffer`] will hold in memory
pub const MAX_BUFFER_DECRYPT: u64 = 256 * 1024 * 1024;

/// Vault state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VaultState {
    /// No settings on disk yet - setup has not run
    Uninitialized,
    Locked,
    /// Transient: an unlock is in flight
    Unlocking,
    Unlocked,
    /// Transient: a lock is in flight
    Locking,
}

/// One item to import
#[derive(Debug, Clone)]
pub struct ImportRequest {
    pub source: PathBuf,
    pub filename: String,
    pub media_type: MediaType,
    pub source_album: Option<String>,
    pub date_captured: Option<DateTime<Utc>>,
    pub duration_secs: Option<f64>,
    pub location: Option<GeoPoint>,
}

impl ImportRequest {
    pub fn from_path(path: &Path, media_type: MediaType) -> Self {
        let filename = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("unknown")
            .to_string();
        Self {
            source: path.to_path_buf(),
            filename,
            media_type,
            source_album: None,
            date_captured: None,
            duration_secs: None,
            location: None,
        }
    }
}

/// What is wrong with a stored entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IssueKind {
    /// Ciphertext file is gone
    Missing,
    /// Encryption never finished (no completion marker)
    Incomplete,
    /// Tag or format verification failed
    Corrupted,
    /// Could not be read at all
    Unreadable,
}

/// Single integrity issue found by [`Vault::verify_entries`]
#[derive(Debug, Clone)]
pub struct EntryIssue {
    pub id: Uuid,
    pub filename: String,
    pub kind: IssueKind,
    pub detail: String,
}

/// Result of a vault-wide integrity pass
#[derive(Debug, Clone, Default)]
pub struct IntegrityReport {
    pub total: usize,
    pub verified: usize,
    pub issues: Vec<EntryIssue>,
}

impl IntegrityReport {
    pub fn is_healthy(&self) -> bool {
        self.issues.is_empty()
    }
}

/// Vault statistics
#[derive(Debug, Clone)]
pub struct VaultStats {
    pub total_entries: usize,
    pub photos: usize,
    pub videos: usize,
    pub favorites: usize,
    pub media_bytes: u64,
    pub disk_bytes: u64,
}

/// Re-arms the idle countdown when the suspension goes out of scope.
struct IdleSuspendGuard<'a> {
    vault: &'a Vault,
    reason: &'static str,
}

impl<'a> IdleSuspendGuard<'a> {
    fn new(vault: &'a Vault, reason: &'static str) -> Self {
        vault.suspend_idle_timer(reason);
        Self { vault, reason }
    }
}

impl Drop for IdleSuspendGuard<'_> {
    fn drop(&mut self) {
        self.vault.resume_idle_timer(self.reason);
    }
}

/// Handle for the background idle watcher thread.
/// Stops and joins the thread on drop.
pub struct IdleWatcherHandle {
    stop: Arc<AtomicBool>,
    handle: Option<std::thread::JoinHandle<()>>,
}

impl Drop for IdleWatcherHandle {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

/// The vault. One instance per vault directory, usually behind an
/// `Arc`; no ambient global state.
pub struct Vault {
    fs: SecureFs,
    previews: PreviewEngine,
    capability: Box<dyn AuthCapability>,
    state: RwLock<VaultState>,
    settings: RwLock<Option<VaultSettings>>,
    /// Session key material; exists exactly while unlocked
    keys: RwLock<Option<Arc<KeyMaterial>>>,
    /// In-memory catalog; exists exactly while unlocked
    catalog: RwLock<Option<Catalog>>,
    limiter: Mutex<RateLimiter>,
    idle: Mutex<IdleTimer>,
}

impl Vault {
    // ═══════════════════════════════════════════════════════════════
    // INITIALIZATION
    // ═══════════════════════════════════════════════════════════════

    /// Open a vault directory with password-only authentication.
    pub fn open(root: &Path) -> VaultResult<Self> {
        Self::with_capability(root, Box::new(NoAuthCapability))
    }

    /// Open a vault directory with an embedder-supplied authentication
    /// capability.
    pub fn with_capability(root: &Path, capability: Box<dyn AuthCapability>) -> VaultResult<Self> {
        let fs = SecureFs::new(root);
        fs.ensure_dir(MEDIA_DIR)?;
        fs.ensure_dir(THUMBS_DIR)?;
        fs.ensure_dir(TMP_DIR)?;

        let settings = VaultSettings::load(&fs)?;
        let state = if settings.is_some() {
            VaultState::Locked
        } else {
            VaultState::Uninitialized
        };
        let idle_timeout = settings
            .as_ref()
            .map(|s| s.idle_timeout_secs)
            .unwrap_or(crate::idle::DEFAULT_IDLE_TIMEOUT_SECS);

        Ok(Self {
            fs,
            previews: PreviewEngine::default(),
            capability,
            state: RwLock::new(state),
            settings: RwLock::new(settings),
            keys: RwLock::new(None),
            catalog: RwLock::new(None),
            limiter: Mutex::new(RateLimiter::new()),
            idle: Mutex::new(IdleTimer::new(Duration::from_secs(idle_timeout))),
        })
    }

    /// Create the vault: generate the salt, derive and store the
    /// verifier. The vault is left locked.
    pub fn setup(&self, password: &str) -> VaultResult<()> {
        self.setup_with_params(password, KdfParams::default())
    }

    pub fn setup_with_params(&self, password: &str, params: KdfParams) -> VaultResult<()> {
        {
            let state = self.state.read();
            if *state != VaultState::Uninitialized {
                return Err(VaultError::AlreadyInitialized(
                    self.fs.root().display().to_string(),
                ));
            }
        }

        let salt = VaultSalt::generate()?;
        let master = kdf::derive_master_key(password.as_bytes(), &salt, &params)?;
        let verifier = expand_key(&master, labels::VERIFIER)?;

        let settings = VaultSettings::new(&salt, kdf::verifier_hash(&verifier), params.iterations);
        settings.save(&self.fs)?;

        self.idle
            .lock()
            .set_timeout(Duration::from_secs(settings.idle_timeout_secs));
        *self.settings.write() = Some(settings);
        *self.state.write() = VaultState::Locked;

        log::info!("vault created at {}", self.fs.root().display());
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════
    // LOCK / UNLOCK
    // ═══════════════════════════════════════════════════════════════

    /// Unlock with the vault password.
    pub fn unlock(&self, password: &str) -> VaultResult<()> {
        self.unlock_with_bytes(password.as_bytes())
    }

    /// Unlock through the platform authentication capability.
    ///
    /// Biometric attempts have their own session cap; once exhausted,
    /// only the password works until the next successful unlock.
    pub fn unlock_biometric(&self, token: &[u8]) -> VaultResult<()> {
        let biometric_enabled = self
            .settings
            .read()
            .as_ref()
            .ok_or(VaultError::VaultNotInitialized)?
            .biometric_enabled;
        if !biometric_enabled || self.capability.kind() == CapabilityKind::None {
            return Err(VaultError::BiometricUnavailable);
        }
        if self.limiter.lock().biometric_exhausted() {
            return Err(VaultError::BiometricLockedOut);
        }

        match self.capability.authenticate(token) {
            Ok(password) => self.unlock_with_bytes(&password),
            Err(VaultError::BiometricUnavailable) => Err(VaultError::BiometricUnavailable),
            Err(_) => {
                let mut limiter = self.limiter.lock();
                let attempts_left = limiter.record_biometric_failure();
                if limiter.biometric_exhausted() {
                    log::warn!("biometric attempts exhausted for this session");
                    Err(VaultError::BiometricLockedOut)
                } else {
                    Err(VaultError::BiometricFailed { attempts_left })
                }
            }
        }
    }

    fn unlock_with_bytes(&self, password: &[u8]) -> VaultResult<()> {
        // Single-flight: the Locked -> Unlocking edge is taken under
        // the state lock, so concurrent unlocks cannot race the
        // limiter or the key slot.
        {
            let mut state = self.state.write();
            match *state {
                VaultState::Unlocked => return Ok(()),
                VaultState::Unlocking | VaultState::Locking => {
                    return Err(VaultError::OperationInProgress)
                }
                VaultState::Uninitialized => return Err(VaultError::VaultNotInitialized),
                VaultState::Locked => *state = VaultState::Unlocking,
            }
        }

        let result = self.try_unlock(password);
        let mut state = self.state.write();
        match result {
            Ok(()) => {
                *state = VaultState::Unlocked;
                log::info!("vault unlocked");
                Ok(())
            }
            Err(e) => {
                *state = VaultState::Locked;
                Err(e)
            }
        }
    }

    fn try_unlock(&self, password: &[u8]) -> VaultResult<()> {
        // Gate before the expensive derivation.
        if let Err(remaining) = self.limiter.lock().check() {
            return Err(VaultError::RateLimited {
                retry_after: remaining,
            });
        }

        let settings = self
            .settings
            .read()
            .clone()
            .ok_or(VaultError::VaultNotInitialized)?;
        let salt = settings.decoded_salt()?;
        let stored_hash = settings.decoded_verifier_hash()?;
        let params = KdfParams {
            iterations: settings.kdf_iterations,
        };

        match kdf::verify_password(password, &salt, &params, &stored_hash)? {
            Some(master) => {
                let keys = Arc::new(KeyMaterial::expand(&master)?);
                // Catalog corruption is fatal to opening the vault.
                let catalog = Catalog::load(&self.fs, &keys)?;

                {
                    let mut limiter = self.limiter.lock();
                    limiter.record_success();
                    limiter.reset_biometric();
                }
                *self.keys.write() = Some(keys);
                *self.catalog.write() = Some(catalog);

                let mut idle = self.idle.lock();
                idle.set_timeout(Duration::from_secs(settings.idle_timeout_secs));
                idle.arm(Instant::now());
                Ok(())
            }
            None => {
                let (retry_after, failures) = {
                    let mut limiter = self.limiter.lock();
                    let retry_after = limiter.record_failure();
                    (retry_after, limiter.failures())
                };
                log::warn!("failed unlock attempt ({} consecutive)", failures);
                Err(VaultError::InvalidPassword { retry_after })
            }
        }
    }

    /// Lock the vault, discarding key material and the in-memory
    /// catalog, and wiping decrypted temp files. Idempotent when
    /// already locked.
    pub fn lock(&self) -> VaultResult<()> {
        {
            let mut state = self.state.write();
            match *state {
                VaultState::Locked | VaultState::Uninitialized => return Ok(()),
                VaultState::Unlocking | VaultState::Locking => {
                    return Err(VaultError::OperationInProgress)
                }
                VaultState::Unlocked => *state = VaultState::Locking,
            }
        }

        *self.keys.write() = None; // zeroized on drop
        *self.catalog.write() = None;
        self.idle.lock().disarm();
        self.purge_temp_files();
        *self.state.write() = VaultState::Locked;

        log::info!("vault locked");
        Ok(())
    }

    pub fn state(&self) -> VaultState {
        self.enforce_idle();
        *self.state.read()
    }

    pub fn is_unlocked(&self) -> bool {
        self.state() == VaultState::Unlocked
    }

    pub fn is_initialized(&self) -> bool {
        *self.state.read() != VaultState::Uninitialized
    }

    pub fn root(&self) -> &Path {
        self.fs.root()
    }

    // ═══════════════════════════════════════════════════════════════
    // IDLE TIMEOUT
    // ═══════════════════════════════════════════════════════════════

    /// Pause the idle countdown while long-running work is active.
    /// Suspensions stack per reason; see [`Vault::resume_idle_timer`].
    pub fn suspend_idle_timer(&self, reason: &str) {
        self.idle.lock().suspend(reason);
    }

    /// Release one suspension. The countdown restarts from the full
    /// configured duration only when the last suspension goes.
    pub fn resume_idle_timer(&self, reason: &str) {
        self.idle.lock().resume(reason, Instant::now());
    }

    /// Auto-lock if the countdown has expired. Called lazily by every
    /// guarded operation and eagerly by the idle watcher thread.
    fn enforce_idle(&self) {
        let expired = *self.state.read() == VaultState::Unlocked
            && self.idle.lock().expired(Instant::now());
        if expired {
            log::info!("idle timeout expired, locking vault");
            let _ = self.lock();
        }
    }

    /// Spawn a background thread that enforces the idle timeout even
    /// while no operations run. The thread holds only a weak handle
    /// and exits when the vault is dropped.
    pub fn start_idle_watcher(
        self: &Arc<Self>,
        poll_interval: Duration,
    ) -> VaultResult<IdleWatcherHandle> {
        let stop = Arc::new(AtomicBool::new(false));
        let flag = stop.clone();
        let weak = Arc::downgrade(self);

        let handle = std::thread::Builder::new()
            .name("lumen-idle".into())
            .spawn(move || {
                while !flag.load(Ordering::SeqCst) {
                    match weak.upgrade() {
                        Some(vault) => vault.enforce_idle(),
                        None => break,
                    }
                    std::thread::sleep(poll_interval);
                }
            })?;

        Ok(IdleWatcherHandle {
            stop,
            handle: Some(handle),
        })
    }

    /// Key material for an operation; fails with `VaultLocked` outside
    /// the unlocked state. Touches the idle countdown.
    fn guard_unlocked(&self) -> VaultResult<Arc<KeyMaterial>> {
        self.enforce_idle();
        if *self.state.read() != VaultState::Unlocked {
            return Err(VaultError::VaultLocked);
        }
        self.idle.lock().touch(Instant::now());
        self.keys
            .read()
            .as_ref()
            .cloned()
            .ok_or(VaultError::VaultLocked)
    }

    // ═══════════════════════════════════════════════════════════════
    // IMPORT
    // ═══════════════════════════════════════════════════════════════

    /// Import items, strictly sequentially: bounded peak memory and a
    /// catalog order that matches the input order. Cancellation between
    /// chunks leaves no partial destination files; items finished
    /// before the cancellation stay imported.
    pub fn import_items(
        &self,
        requests: &[ImportRequest],
        progress: Option<&ProgressSink>,
        cancel: &CancelToken,
    ) -> VaultResult<Vec<VaultEntry>> {
        let keys = self.guard_unlocked()?;
        let _suspend = IdleSuspendGuard::new(self, "importing");

        let mut bytes_total = 0u64;
        for req in requests {
            bytes_total += std::fs::metadata(&req.source)
                .map_err(|_| VaultError::FileNotFound(req.source.display().to_string()))?
                .len();
        }
        if let Some(p) = progress {
            p.begin(bytes_total, requests.len() as u64, "importing");
        }

        let mut imported = Vec::with_capacity(requests.len());
        let mut bytes_done = 0u64;
        for (i, req) in requests.iter().enumerate() {
            if cancel.is_cancelled() {
                return Err(VaultError::Cancelled);
            }
            let entry = self.import_single(&keys, req, bytes_done, progress, cancel)?;
            bytes_done += entry.file_size;
            if let Some(p) = progress {
                p.item_done((i + 1) as u64, &format!("imported {}", entry.filename));
            }
            imported.push(entry);
        }

        if let Some(p) = progress {
            p.finish("import complete");
        }
        Ok(imported)
    }

    fn import_single(
        &self,
        keys: &KeyMaterial,
        req: &ImportRequest,
        base_bytes: u64,
        progress: Option<&ProgressSink>,
        cancel: &CancelToken,
    ) -> VaultResult<VaultEntry> {
        let plaintext = Zeroizing::new(
            std::fs::read(&req.source)
                .map_err(|_| VaultError::FileNotFound(req.source.display().to_string()))?,
        );
        let file_size = plaintext.len() as u64;
        let id = Uuid::new_v4();

        // Bounded preview. Video containers are not decodable as
        // images, so a video may end up without one.
        let preview = self.previews.generate(&plaintext).ok();
        if preview.is_none() && req.media_type == MediaType::Photo {
            log::warn!("no preview for photo {}", req.filename);
        }

        let file_key = keys.derive_file_key(&id.to_string())?;
        let ciphertext_path = format!("{}/{}.enc", MEDIA_DIR, id);
        let mut writer = self.fs.atomic_writer(&ciphertext_path)?;
        StreamEncryptor::new(&file_key).encrypt_with(
            plaintext.as_slice(),
            &mut writer,
            cancel,
            &mut |done| {
                if let Some(p) = progress {
                    p.bytes(base_bytes + done);
                }
            },
        )?;
        writer.commit()?;

        let thumb_path = match preview {
            Some(thumb) => {
                let thumb_key = keys.derive_thumb_key(&id.to_string())?;
                let path = format!("{}/{}.enc", THUMBS_DIR, id);
                let encrypted = encrypt_bytes(&thumb_key, &thumb)?;
                self.fs.write_file(&path, &encrypted)?;
                Some(path)
            }
            None => None,
        };

        let entry = VaultEntry {
            id,
            ciphertext_path,
            thumb_path,
            filename: req.filename.clone(),
            date_added: Utc::now(),
            date_captured: req.date_captured,
            source_album: req.source_album.clone(),
            file_size,
            media_type: req.media_type,
            duration_secs: req.duration_secs,
            location: req.location,
            favorite: false,
        };

        {
            let mut guard = self.catalog.write();
            let catalog = guard.as_mut().ok_or(VaultError::VaultLocked)?;
            catalog.add(entry.clone())?;
            catalog.save(&self.fs, keys)?;
        }

        log::info!("imported {} as {} ({} bytes)", req.filename, id, file_size);
        Ok(entry)
    }

    // ═══════════════════════════════════════════════════════════════
    // READ / EXPORT
    // ═══════════════════════════════════════════════════════════════

    /// Entries in catalog (insertion) order.
    pub fn entries(&self) -> VaultResult<Vec<VaultEntry>> {
        self.guard_unlocked()?;
        let guard = self.catalog.read();
        let catalog = guard.as_ref().ok_or(VaultError::VaultLocked)?;
        Ok(catalog.entries().to_vec())
    }

    pub fn entry(&self, id: Uuid) -> VaultResult<VaultEntry> {
        self.guard_unlocked()?;
        let guard = self.catalog.read();
        let catalog = guard.as_ref().ok_or(VaultError::VaultLocked)?;
        catalog
            .get(id)
            .cloned()
            .ok_or(VaultError::EntryNotFound(id))
    }

    /// Decrypt an entry fully into memory. Nothing is returned unless
    /// every chunk authenticates and the completion marker is present.
    ///
    /// Refuses entries above [`MAX_BUFFER_DECRYPT`]; large videos go
    /// through [`Vault::decrypt_to_temp_file`] instead.
    pub fn decrypt_to_buffer(&self, id: Uuid) -> VaultResult<Vec<u8>> {
        let keys = self.guard_unlocked()?;
        let entry = self.entry(id)?;
        if entry.file_size > MAX_BUFFER_DECRYPT {
            return Err(VaultError::FileTooLarge {
                size: entry.file_size,
                max: MAX_BUFFER_DECRYPT,
            });
        }
        let file_key = keys.derive_file_key(&id.to_string())?;
        let data = self.fs.read_file(&entry.ciphertext_path)?;
        decrypt_bytes(&file_key, &data).map_err(|e| {
            log::error!("decrypt failed for entry {}: {}", id, e);
            match e {
                VaultError::IntegrityCheckFailed => VaultError::EntryCorrupted { id },
                other => other,
            }
        })
    }

    /// Decrypt an entry's thumbnail into memory.
    pub fn decrypt_thumbnail(&self, id: Uuid) -> VaultResult<Vec<u8>> {
        let keys = self.guard_unlocked()?;
        let entry = self.entry(id)?;
        let thumb_path = entry
            .thumb_path
            .as_ref()
            .ok_or_else(|| VaultError::FileNotFound(format!("{} has no thumbnail", id)))?;
        let thumb_key = keys.derive_thumb_key(&id.to_string())?;
        let data = self.fs.read_file(thumb_path)?;
        decrypt_bytes(&thumb_key, &data)
    }

    /// Decrypt an entry to a temporary file inside the vault's tmp
    /// directory and return its path. The file appears atomically;
    /// cancellation leaves nothing behind. Temp files are wiped on
    /// lock.
    pub fn decrypt_to_temp_file(
        &self,
        id: Uuid,
        progress: Option<&ProgressSink>,
        cancel: &CancelToken,
    ) -> VaultResult<PathBuf> {
        let keys = self.guard_unlocked()?;
        let entry = self.entry(id)?;
        let _suspend = IdleSuspendGuard::new(self, "viewing");

        if let Some(p) = progress {
            p.begin(entry.file_size, 1, &format!("decrypting {}", entry.filename));
        }

        let file_key = keys.derive_file_key(&id.to_string())?;
        let dest_rel = format!("{}/{}-{}", TMP_DIR, id, entry.filename);
        let source = self.fs.open_file(&entry.ciphertext_path)?;
        let mut writer = self.fs.atomic_writer(&dest_rel)?;
        let dest = writer.dest().to_path_buf();

        StreamDecryptor::new(&file_key)
            .decrypt_with(
                std::io::BufReader::new(source),
                &mut writer,
                cancel,
                &mut |done| {
                    if let Some(p) = progress {
                        p.bytes(done);
                    }
                },
            )
            .map_err(|e| {
                log::error!("decrypt failed for entry {}: {}", id, e);
                match e {
                    VaultError::IntegrityCheckFailed => VaultError::EntryCorrupted { id },
                    other => other,
                }
            })?;
        writer.commit()?;

        if let Some(p) = progress {
            p.finish("decrypted");
        }
        Ok(dest)
    }

    /// Decrypt an entry to a caller-chosen destination outside the
    /// vault. Returns the plaintext size.
    pub fn export_entry(&self, id: Uuid, dest: &Path) -> VaultResult<u64> {
        let keys = self.guard_unlocked()?;
        let entry = self.entry(id)?;

        let file_key = keys.derive_file_key(&id.to_string())?;
        let source = self.fs.open_file(&entry.ciphertext_path)?;
        let mut writer = AtomicFile::create(dest)?;
        let written = StreamDecryptor::new(&file_key)
            .decrypt(std::io::BufReader::new(source), &mut writer)?;
        writer.commit()?;

        log::info!("exported {} to {}", id, dest.display());
        Ok(written)
    }

    // ═══════════════════════════════════════════════════════════════
    // MUTATIONS
    // ═══════════════════════════════════════════════════════════════

    pub fn rename_entry(&self, id: Uuid, new_filename: &str) -> VaultResult<()> {
        let keys = self.guard_unlocked()?;
        let mut guard = self.catalog.write();
        let catalog = guard.as_mut().ok_or(VaultError::VaultLocked)?;
        catalog.rename(id, new_filename)?;
        catalog.save(&self.fs, &keys)
    }

    pub fn set_favorite(&self, id: Uuid, favorite: bool) -> VaultResult<()> {
        let keys = self.guard_unlocked()?;
        let mut guard = self.catalog.write();
        let catalog = guard.as_mut().ok_or(VaultError::VaultLocked)?;
        catalog.set_favorite(id, favorite)?;
        catalog.save(&self.fs, &keys)
    }

    /// Delete an entry: the catalog record first (persisted), then the
    /// ciphertext and thumbnail. From the caller's view the entry is
    /// gone atomically with the catalog write; files a crash leaves
    /// behind are unreferenced and swept by [`Vault::sweep_orphans`].
    pub fn delete_entry(&self, id: Uuid, secure: bool) -> VaultResult<()> {
        let keys = self.guard_unlocked()?;

        let removed = {
            let mut guard = self.catalog.write();
            let catalog = guard.as_mut().ok_or(VaultError::VaultLocked)?;
            let removed = catalog.remove(id)?;
            catalog.save(&self.fs, &keys)?;
            removed
        };

        self.fs.delete_file(&removed.ciphertext_path, secure)?;
        if let Some(thumb) = &removed.thumb_path {
            self.fs.delete_file(thumb, secure)?;
        }

        log::info!("deleted entry {} (secure={})", id, secure);
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════
    // SETTINGS
    // ═══════════════════════════════════════════════════════════════

    pub fn set_idle_timeout(&self, secs: u64) -> VaultResult<()> {
        self.guard_unlocked()?;
        let mut guard = self.settings.write();
        let settings = guard.as_mut().ok_or(VaultError::VaultNotInitialized)?;
        settings.idle_timeout_secs = secs;
        settings.save(&self.fs)?;

        let mut idle = self.idle.lock();
        idle.set_timeout(Duration::from_secs(secs));
        idle.touch(Instant::now());
        Ok(())
    }

    pub fn set_biometric_enabled(&self, enabled: bool) -> VaultResult<()> {
        self.guard_unlocked()?;
        let mut guard = self.settings.write();
        let settings = guard.as_mut().ok_or(VaultError::VaultNotInitialized)?;
        settings.biometric_enabled = enabled;
        settings.save(&self.fs)
    }

    /// Change the vault password. Every ciphertext is re-encrypted
    /// under the new key material; settings are replaced last.
    pub fn change_password(&self, old_password: &str, new_password: &str) -> VaultResult<()> {
        let old_keys = self.guard_unlocked()?;
        let _suspend = IdleSuspendGuard::new(self, "rekeying");

        let settings = self
            .settings
            .read()
            .clone()
            .ok_or(VaultError::VaultNotInitialized)?;
        let salt = settings.decoded_salt()?;
        let stored_hash = settings.decoded_verifier_hash()?;
        let params = KdfParams {
            iterations: settings.kdf_iterations,
        };

        if kdf::verify_password(old_password.as_bytes(), &salt, &params, &stored_hash)?.is_none() {
            return Err(VaultError::InvalidPassword {
                retry_after: Duration::ZERO,
            });
        }

        let new_salt = VaultSalt::generate()?;
        let new_master = kdf::derive_master_key(new_password.as_bytes(), &new_salt, &params)?;
        let new_keys = Arc::new(KeyMaterial::expand(&new_master)?);

        let entries = self.entries()?;
        for entry in &entries {
            let entry_id = entry.id.to_string();
            self.reencrypt_file(
                &entry.ciphertext_path,
                &old_keys.derive_file_key(&entry_id)?,
                &new_keys.derive_file_key(&entry_id)?,
            )?;
            if let Some(thumb) = &entry.thumb_path {
                self.reencrypt_file(
                    thumb,
                    &old_keys.derive_thumb_key(&entry_id)?,
                    &new_keys.derive_thumb_key(&entry_id)?,
                )?;
            }
        }

        {
            let guard = self.catalog.read();
            let catalog = guard.as_ref().ok_or(VaultError::VaultLocked)?;
            catalog.save(&self.fs, &new_keys)?;
        }

        let verifier = expand_key(&new_master, labels::VERIFIER)?;
        let mut new_settings =
            VaultSettings::new(&new_salt, kdf::verifier_hash(&verifier), params.iterations);
        new_settings.idle_timeout_secs = settings.idle_timeout_secs;
        new_settings.biometric_enabled = settings.biometric_enabled;
        new_settings.created_at = settings.created_at;
        new_settings.save(&self.fs)?;

        *self.settings.write() = Some(new_settings);
        *self.keys.write() = Some(new_keys);

        log::info!("password changed, {} entries re-encrypted", entries.len());
        Ok(())
    }

    fn reencrypt_file(
        &self,
        relative_path: &str,
        old_key: &VaultKey,
        new_key: &VaultKey,
    ) -> VaultResult<()> {
        let data = self.fs.read_file(relative_path)?;
        let plaintext = Zeroizing::new(decrypt_bytes(old_key, &data)?);
        let encrypted = encrypt_bytes(new_key, &plaintext)?;
        self.fs.write_file(relative_path, &encrypted)
    }

    // ═══════════════════════════════════════════════════════════════
    // MAINTENANCE
    // ═══════════════════════════════════════════════════════════════

    /// Verify every entry's ciphertext. A bad entry is reported, not
    /// fatal; the pass continues through the whole catalog.
    pub fn verify_entries(&self) -> VaultResult<IntegrityReport> {
        let keys = self.guard_unlocked()?;
        let entries = self.entries()?;
        let _suspend = IdleSuspendGuard::new(self, "verifying");

        let mut report = IntegrityReport {
            total: entries.len(),
            ..Default::default()
        };
        for entry in &entries {
            match self.verify_single(&keys, entry) {
                Ok(()) => report.verified += 1,
                Err(e) => {
                    let kind = match &e {
                        VaultError::FileNotFound(_) => IssueKind::Missing,
                        VaultError::IncompleteFile => IssueKind::Incomplete,
                        VaultError::IntegrityCheckFailed
                        | VaultError::InvalidFileFormat(_)
                        | VaultError::UnsupportedVersion(_) => IssueKind::Corrupted,
                        _ => IssueKind::Unreadable,
                    };
                    log::warn!("entry {} failed verification: {}", entry.id, e);
                    report.issues.push(EntryIssue {
                        id: entry.id,
                        filename: entry.filename.clone(),
                        kind,
                        detail: e.to_string(),
                    });
                }
            }
        }
        Ok(report)
    }

    fn verify_single(&self, keys: &KeyMaterial, entry: &VaultEntry) -> VaultResult<()> {
        let file_key = keys.derive_file_key(&entry.id.to_string())?;
        let source = self.fs.open_file(&entry.ciphertext_path)?;
        StreamDecryptor::new(&file_key)
            .decrypt(std::io::BufReader::new(source), std::io::sink())?;
        Ok(())
    }

    /// Remove ciphertext files no catalog entry references (leftovers
    /// from a crash between catalog write and file deletion).
    pub fn sweep_orphans(&self) -> VaultResult<usize> {
        self.guard_unlocked()?;
        let guard = self.catalog.read();
        let catalog = guard.as_ref().ok_or(VaultError::VaultLocked)?;

        let mut removed = 0;
        for dir in [MEDIA_DIR, THUMBS_DIR] {
            let root = self.fs.full_path(dir);
            for file in walkdir::WalkDir::new(&root).min_depth(1) {
                let file = file.map_err(|e| VaultError::Io(e.into()))?;
                if !file.file_type().is_file() {
                    continue;
                }
                let name = file.file_name().to_string_lossy();
                let id = name
                    .strip_suffix(".enc")
                    .and_then(|stem| Uuid::parse_str(stem).ok());
                let referenced = id.map_or(false, |id| catalog.contains(id));
                if !referenced {
                    log::warn!("removing orphaned file {}", file.path().display());
                    std::fs::remove_file(file.path())?;
                    removed += 1;
                }
            }
        }
        Ok(removed)
    }

    pub fn stats(&self) -> VaultResult<VaultStats> {
        let entries = self.entries()?;
        Ok(VaultStats {
            total_entries: entries.len(),
            photos: entries
                .iter()
                .filter(|e| e.media_type == MediaType::Photo)
                .count(),
            videos: entries
                .iter()
                .filter(|e| e.media_type == MediaType::Video)
                .count(),
            favorites: entries.iter().filter(|e| e.favorite).count(),
            media_bytes: entries.iter().map(|e| e.file_size).sum(),
            disk_bytes: self.fs.total_size()?,
        })
    }

    /// Wipe decrypted temp files. Best effort; failures are logged.
    fn purge_temp_files(&self) {
        let tmp = self.fs.full_path(TMP_DIR);
        let Ok(dir) = std::fs::read_dir(&tmp) else {
            return;
        };
        for entry in dir.flatten() {
            let rel = format!("{}/{}", TMP_DIR, entry.file_name().to_string_lossy());
            if let Err(e) = self.fs.delete_file(&rel, true) {
                log::warn!("failed to purge temp file {}: {}", rel, e);
            }
        }
    }
}

impl Drop for Vault {
    fn drop(&mut self) {
        // Keys are zeroized through their own drop; this just makes
        // the teardown explicit.
        *self.keys.write() = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::biometrics::testing::StaticCapability;
    use crate::catalog::CATALOG_FILE;
    use crate::ratelimit::delay_for;
    use std::io::Cursor;
    use tempfile::tempdir;

    const PASSWORD: &str = "correct-horse-battery";

    fn fast_params() -> KdfParams {
        KdfParams { iterations: 1_000 }
    }

    fn new_vault(root: &Path) -> Vault {
        let vault = Vault::open(root).unwrap();
        vault.setup_with_params(PASSWORD, fast_params()).unwrap();
        vault.unlock(PASSWORD).unwrap();
        vault
    }

    fn sample_photo(dir: &Path, name: &str) -> PathBuf {
        let img = image::DynamicImage::new_rgb8(640, 480);
        let mut buffer = Vec::new();
        img.write_to(&mut Cursor::new(&mut buffer), image::ImageFormat::Png)
            .unwrap();
        let path = dir.join(name);
        std::fs::write(&path, &buffer).unwrap();
        path
    }

    fn sample_video(dir: &Path, name: &str, size: usize) -> PathBuf {
        let data: Vec<u8> = (0..size).map(|i| (i % 256) as u8).collect();
        let path = dir.join(name);
        std::fs::write(&path, &data).unwrap();
        path
    }

    fn import_one(vault: &Vault, source: &Path, media_type: MediaType) -> VaultEntry {
        let requests = vec![ImportRequest::from_path(source, media_type)];
        vault
            .import_items(&requests, None, &CancelToken::new())
            .unwrap()
            .remove(0)
    }

    #[test]
    fn test_setup_and_state_machine() {
        let dir = tempdir().unwrap();
        let vault = Vault::open(dir.path()).unwrap();
        assert_eq!(vault.state(), VaultState::Uninitialized);
        assert!(matches!(
            vault.unlock(PASSWORD),
            Err(VaultError::VaultNotInitialized)
        ));

        vault.setup_with_params(PASSWORD, fast_params()).unwrap();
        assert_eq!(vault.state(), VaultState::Locked);
        assert!(matches!(
            vault.setup_with_params(PASSWORD, fast_params()),
            Err(VaultError::AlreadyInitialized(_))
        ));

        vault.unlock(PASSWORD).unwrap();
        assert!(vault.is_unlocked());

        vault.lock().unwrap();
        assert_eq!(vault.state(), VaultState::Locked);
        // Locking again is a no-op.
        vault.lock().unwrap();
    }

    #[test]
    fn test_operations_require_unlock() {
        let dir = tempdir().unwrap();
        let vault = Vault::open(dir.path()).unwrap();
        vault.setup_with_params(PASSWORD, fast_params()).unwrap();

        let id = Uuid::new_v4();
        assert!(matches!(vault.entries(), Err(VaultError::VaultLocked)));
        assert!(matches!(
            vault.decrypt_to_buffer(id),
            Err(VaultError::VaultLocked)
        ));
        assert!(matches!(
            vault.delete_entry(id, false),
            Err(VaultError::VaultLocked)
        ));
        assert!(matches!(
            vault.import_items(&[], None, &CancelToken::new()),
            Err(VaultError::VaultLocked)
        ));
    }

    #[test]
    fn test_wrong_password_stays_locked() {
        let dir = tempdir().unwrap();
        let vault = Vault::open(dir.path()).unwrap();
        vault.setup_with_params(PASSWORD, fast_params()).unwrap();

        let result = vault.unlock("wrong");
        assert!(matches!(result, Err(VaultError::InvalidPassword { .. })));
        assert_eq!(vault.state(), VaultState::Locked);
    }

    #[test]
    fn test_import_and_decrypt_roundtrip() {
        let dir = tempdir().unwrap();
        let vault = new_vault(&dir.path().join("vault"));

        let photo = sample_photo(dir.path(), "IMG_001.png");
        let original = std::fs::read(&photo).unwrap();
        let entry = import_one(&vault, &photo, MediaType::Photo);

        assert_eq!(entry.file_size, original.len() as u64);
        assert!(entry.thumb_path.is_some());

        let decrypted = vault.decrypt_to_buffer(entry.id).unwrap();
        assert_eq!(decrypted, original);

        // Thumbnail decrypts to a decodable image.
        let thumb = vault.decrypt_thumbnail(entry.id).unwrap();
        assert!(image::load_from_memory(&thumb).is_ok());
    }

    #[test]
    fn test_video_imports_without_thumbnail() {
        let dir = tempdir().unwrap();
        let vault = new_vault(&dir.path().join("vault"));

        let video = sample_video(dir.path(), "clip.mp4", 10_000);
        let entry = import_one(&vault, &video, MediaType::Video);
        assert!(entry.thumb_path.is_none());
        assert!(matches!(
            vault.decrypt_thumbnail(entry.id),
            Err(VaultError::FileNotFound(_))
        ));
    }

    #[test]
    fn test_import_order_matches_input() {
        let dir = tempdir().unwrap();
        let vault = new_vault(&dir.path().join("vault"));

        let requests: Vec<ImportRequest> = (0..3)
            .map(|i| {
                let path = sample_video(dir.path(), &format!("v{}.mp4", i), 500 + i);
                ImportRequest::from_path(&path, MediaType::Video)
            })
            .collect();
        vault
            .import_items(&requests, None, &CancelToken::new())
            .unwrap();

        let names: Vec<String> = vault
            .entries()
            .unwrap()
            .iter()
            .map(|e| e.filename.clone())
            .collect();
        assert_eq!(names, vec!["v0.mp4", "v1.mp4", "v2.mp4"]);
    }

    #[test]
    fn test_import_progress_final_update() {
        let dir = tempdir().unwrap();
        let vault = new_vault(&dir.path().join("vault"));

        let video = sample_video(dir.path(), "clip.mp4", 5_000);
        let requests = vec![ImportRequest::from_path(&video, MediaType::Video)];

        let last = Arc::new(Mutex::new(crate::progress::Progress::default()));
        let seen = last.clone();
        let sink = ProgressSink::new(move |p| *seen.lock() = p.clone());

        vault
            .import_items(&requests, Some(&sink), &CancelToken::new())
            .unwrap();

        let p = last.lock();
        assert_eq!(p.bytes_processed, 5_000);
        assert_eq!(p.items_processed, 1);
        assert_eq!(p.status, "import complete");
    }

    #[test]
    fn test_cancelled_import_leaves_no_partial_files() {
        let dir = tempdir().unwrap();
        let vault = new_vault(&dir.path().join("vault"));

        let video = sample_video(dir.path(), "clip.mp4", 50_000);
        let requests = vec![ImportRequest::from_path(&video, MediaType::Video)];

        let cancel = CancelToken::new();
        cancel.cancel();
        let result = vault.import_items(&requests, None, &cancel);
        assert!(matches!(result, Err(VaultError::Cancelled)));

        assert!(vault.entries().unwrap().is_empty());
        let media_dir = vault.root().join(MEDIA_DIR);
        assert_eq!(std::fs::read_dir(media_dir).unwrap().count(), 0);
    }

    #[test]
    fn test_decrypt_to_temp_file_and_purge_on_lock() {
        let dir = tempdir().unwrap();
        let vault = new_vault(&dir.path().join("vault"));

        let video = sample_video(dir.path(), "clip.mp4", 20_000);
        let original = std::fs::read(&video).unwrap();
        let entry = import_one(&vault, &video, MediaType::Video);

        let path = vault
            .decrypt_to_temp_file(entry.id, None, &CancelToken::new())
            .unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), original);

        vault.lock().unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn test_export_entry() {
        let dir = tempdir().unwrap();
        let vault = new_vault(&dir.path().join("vault"));

        let video = sample_video(dir.path(), "clip.mp4", 4_000);
        let original = std::fs::read(&video).unwrap();
        let entry = import_one(&vault, &video, MediaType::Video);

        let dest = dir.path().join("exported.mp4");
        let written = vault.export_entry(entry.id, &dest).unwrap();
        assert_eq!(written, 4_000);
        assert_eq!(std::fs::read(&dest).unwrap(), original);
    }

    #[test]
    fn test_rename_and_favorite_persist() {
        let dir = tempdir().unwrap();
        let vault = new_vault(&dir.path().join("vault"));

        let video = sample_video(dir.path(), "clip.mp4", 1_000);
        let entry = import_one(&vault, &video, MediaType::Video);

        vault.rename_entry(entry.id, "holiday.mp4").unwrap();
        vault.set_favorite(entry.id, true).unwrap();

        vault.lock().unwrap();
        vault.unlock(PASSWORD).unwrap();

        let reloaded = vault.entry(entry.id).unwrap();
        assert_eq!(reloaded.filename, "holiday.mp4");
        assert!(reloaded.favorite);
    }

    #[test]
    fn test_delete_entry_removes_everything() {
        let dir = tempdir().unwrap();
        let vault = new_vault(&dir.path().join("vault"));

        let photo = sample_photo(dir.path(), "IMG_001.png");
        let entry = import_one(&vault, &photo, MediaType::Photo);
        let media_path = vault.root().join(&entry.ciphertext_path);
        let thumb_path = vault.root().join(entry.thumb_path.as_ref().unwrap());

        vault.delete_entry(entry.id, true).unwrap();

        assert!(!media_path.exists());
        assert!(!thumb_path.exists());
        assert!(matches!(
            vault.entry(entry.id),
            Err(VaultError::EntryNotFound(_))
        ));
    }

    #[test]
    fn test_rate_limit_scenario() {
        let dir = tempdir().unwrap();
        let vault = Vault::open(dir.path()).unwrap();
        vault.setup_with_params(PASSWORD, fast_params()).unwrap();

        // Four wrong attempts in a row; between attempts, backdate the
        // limiter so each one reaches the verifier.
        let mut last_retry = Duration::ZERO;
        for i in 1..=4u32 {
            match vault.unlock("wrong") {
                Err(VaultError::InvalidPassword { retry_after }) => {
                    assert_eq!(retry_after, delay_for(i - 1));
                    last_retry = retry_after;
                }
                other => panic!("attempt {} gave {:?}", i, other.err()),
            }
            if i < 4 {
                vault.limiter.lock().backdate_last_failure(delay_for(i - 1));
            }
        }
        // 5 * 2^3 = 40s after the fourth failure.
        assert_eq!(last_retry, Duration::from_secs(40));

        // An immediate fifth attempt is gated without touching the KDF.
        assert!(matches!(
            vault.unlock(PASSWORD),
            Err(VaultError::RateLimited { .. })
        ));

        // Once the delay elapses, the correct password unlocks and the
        // counter resets.
        vault.limiter.lock().backdate_last_failure(last_retry);
        vault.unlock(PASSWORD).unwrap();
        assert!(vault.is_unlocked());
        assert_eq!(vault.limiter.lock().failures(), 0);
    }

    #[test]
    fn test_idle_timeout_auto_locks() {
        let dir = tempdir().unwrap();
        let vault = new_vault(dir.path());
        assert!(vault.is_unlocked());

        vault.idle.lock().force_expire();
        assert!(!vault.is_unlocked());
        assert_eq!(*vault.state.read(), VaultState::Locked);
    }

    #[test]
    fn test_idle_suspension_blocks_auto_lock() {
        let dir = tempdir().unwrap();
        let vault = new_vault(dir.path());

        vault.suspend_idle_timer("viewing");
        vault.idle.lock().force_expire();
        // force_expire clears suspensions, so re-suspend to model a
        // suspension taken before expiry.
        vault.suspend_idle_timer("viewing");
        assert!(vault.is_unlocked());
        vault.resume_idle_timer("viewing");
        assert!(vault.is_unlocked());
    }

    #[test]
    fn test_catalog_tamper_fails_unlock() {
        let dir = tempdir().unwrap();
        let vault = new_vault(dir.path());
        let video = sample_video(dir.path(), "clip.mp4", 1_000);
        import_one(&vault, &video, MediaType::Video);
        vault.lock().unwrap();

        // Flip a byte of the persisted catalog outside the engine.
        let catalog_path = dir.path().join(CATALOG_FILE);
        let mut data = std::fs::read(&catalog_path).unwrap();
        let mid = data.len() / 2;
        data[mid] ^= 0x40;
        std::fs::write(&catalog_path, &data).unwrap();

        let result = vault.unlock(PASSWORD);
        assert!(matches!(result, Err(VaultError::CatalogCorrupted(_))));
        assert_eq!(vault.state(), VaultState::Locked);
    }

    #[test]
    fn test_verify_entries_classifies_damage() {
        let dir = tempdir().unwrap();
        let vault = new_vault(&dir.path().join("vault"));

        let ok = import_one(
            &vault,
            &sample_video(dir.path(), "ok.mp4", 2_000),
            MediaType::Video,
        );
        let corrupt = import_one(
            &vault,
            &sample_video(dir.path(), "corrupt.mp4", 2_000),
            MediaType::Video,
        );
        let truncated = import_one(
            &vault,
            &sample_video(dir.path(), "truncated.mp4", 2_000),
            MediaType::Video,
        );
        let missing = import_one(
            &vault,
            &sample_video(dir.path(), "missing.mp4", 2_000),
            MediaType::Video,
        );

        // Corrupt one ciphertext byte.
        let path = vault.root().join(&corrupt.ciphertext_path);
        let mut data = std::fs::read(&path).unwrap();
        data[20] ^= 0xFF;
        std::fs::write(&path, &data).unwrap();

        // Strip the completion marker from another.
        let path = vault.root().join(&truncated.ciphertext_path);
        let data = std::fs::read(&path).unwrap();
        std::fs::write(&path, &data[..data.len() - 8]).unwrap();

        // Remove the third entirely.
        std::fs::remove_file(vault.root().join(&missing.ciphertext_path)).unwrap();

        let report = vault.verify_entries().unwrap();
        assert_eq!(report.total, 4);
        assert_eq!(report.verified, 1);
        assert!(!report.is_healthy());

        let kind_of = |id: Uuid| report.issues.iter().find(|i| i.id == id).unwrap().kind;
        assert_eq!(kind_of(corrupt.id), IssueKind::Corrupted);
        assert_eq!(kind_of(truncated.id), IssueKind::Incomplete);
        assert_eq!(kind_of(missing.id), IssueKind::Missing);
        assert!(report.issues.iter().all(|i| i.id != ok.id));
    }

    #[test]
    fn test_tampered_entry_reports_corruption() {
        let dir = tempdir().unwrap();
        let vault = new_vault(&dir.path().join("vault"));

        let video = sample_video(dir.path(), "clip.mp4", 2_000);
        let entry = import_one(&vault, &video, MediaType::Video);

        let path = vault.root().join(&entry.ciphertext_path);
        let mut data = std::fs::read(&path).unwrap();
        data[30] ^= 0x01;
        std::fs::write(&path, &data).unwrap();

        let result = vault.decrypt_to_buffer(entry.id);
        match result {
            Err(VaultError::EntryCorrupted { id }) => assert_eq!(id, entry.id),
            other => panic!("unexpected {:?}", other.err()),
        }
    }

    #[test]
    fn test_sweep_orphans() {
        let dir = tempdir().unwrap();
        let vault = new_vault(&dir.path().join("vault"));

        let video = sample_video(dir.path(), "clip.mp4", 1_000);
        let entry = import_one(&vault, &video, MediaType::Video);

        // A stray ciphertext nothing references.
        let stray = format!("{}/{}.enc", MEDIA_DIR, Uuid::new_v4());
        std::fs::write(vault.root().join(&stray), b"leftover").unwrap();

        let removed = vault.sweep_orphans().unwrap();
        assert_eq!(removed, 1);
        assert!(!vault.root().join(&stray).exists());
        assert!(vault.root().join(&entry.ciphertext_path).exists());
    }

    #[test]
    fn test_change_password_reencrypts() {
        let dir = tempdir().unwrap();
        let vault = new_vault(&dir.path().join("vault"));

        let video = sample_video(dir.path(), "clip.mp4", 3_000);
        let original = std::fs::read(&video).unwrap();
        let entry = import_one(&vault, &video, MediaType::Video);

        vault.change_password(PASSWORD, "new-password-42").unwrap();

        // Still readable in the same session.
        assert_eq!(vault.decrypt_to_buffer(entry.id).unwrap(), original);

        vault.lock().unwrap();
        assert!(matches!(
            vault.unlock(PASSWORD),
            Err(VaultError::InvalidPassword { .. })
        ));
        vault.limiter.lock().backdate_last_failure(delay_for(0));
        vault.unlock("new-password-42").unwrap();
        assert_eq!(vault.decrypt_to_buffer(entry.id).unwrap(), original);
    }

    #[test]
    fn test_biometric_unlock_and_lockout() {
        let dir = tempdir().unwrap();
        let capability = StaticCapability {
            password: PASSWORD.as_bytes().to_vec(),
            expected_token: b"good-token".to_vec(),
        };
        let vault = Vault::with_capability(dir.path(), Box::new(capability)).unwrap();
        vault.setup_with_params(PASSWORD, fast_params()).unwrap();

        // Disabled until the setting is turned on.
        assert!(matches!(
            vault.unlock_biometric(b"good-token"),
            Err(VaultError::BiometricUnavailable)
        ));
        vault.unlock(PASSWORD).unwrap();
        vault.set_biometric_enabled(true).unwrap();
        vault.lock().unwrap();

        vault.unlock_biometric(b"good-token").unwrap();
        assert!(vault.is_unlocked());
        vault.lock().unwrap();

        // Three bad tokens exhaust the session cap.
        for expected_left in [2u32, 1] {
            match vault.unlock_biometric(b"bad-token") {
                Err(VaultError::BiometricFailed { attempts_left }) => {
                    assert_eq!(attempts_left, expected_left)
                }
                other => panic!("unexpected {:?}", other.err()),
            }
        }
        assert!(matches!(
            vault.unlock_biometric(b"bad-token"),
            Err(VaultError::BiometricLockedOut)
        ));
        assert!(matches!(
            vault.unlock_biometric(b"good-token"),
            Err(VaultError::BiometricLockedOut)
        ));

        // Password still works and re-arms biometric for the next session.
        vault.unlock(PASSWORD).unwrap();
        vault.lock().unwrap();
        vault.unlock_biometric(b"good-token").unwrap();
    }

    #[test]
    fn test_idle_watcher_locks_in_background() {
        let dir = tempdir().unwrap();
        let vault = Arc::new(Vault::open(dir.path()).unwrap());
        vault.setup_with_params(PASSWORD, fast_params()).unwrap();
        vault.unlock(PASSWORD).unwrap();

        let watcher = vault
            .start_idle_watcher(Duration::from_millis(10))
            .unwrap();
        vault.idle.lock().force_expire();

        let deadline = Instant::now() + Duration::from_secs(2);
        while *vault.state.read() != VaultState::Locked && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(10));
        }
        assert_eq!(*vault.state.read(), VaultState::Locked);
        drop(watcher);
    }

    #[test]
    fn test_stats() {
        let dir = tempdir().unwrap();
        let vault = new_vault(&dir.path().join("vault"));

        let photo = sample_photo(dir.path(), "IMG_001.png");
        let video = sample_video(dir.path(), "clip.mp4", 2_000);
        let p = import_one(&vault, &photo, MediaType::Photo);
        import_one(&vault, &video, MediaType::Video);
        vault.set_favorite(p.id, true).unwrap();

        let stats = vault.stats().unwrap();
        assert_eq!(stats.total_entries, 2);
        assert_eq!(stats.photos, 1);
        assert_eq!(stats.videos, 1);
        assert_eq!(stats.favorites, 1);
        assert!(stats.media_bytes > 2_000);
        assert!(stats.disk_bytes > stats.media_bytes);
    }
}
