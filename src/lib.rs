//! # Lumen Vault
//!
//! Local encrypted media vault: photos and videos go in, authenticated
//! ciphertext comes out, and nothing is readable again without the
//! password.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                       LUMEN VAULT                        │
//! │  ┌─────────────┐  ┌──────────────┐  ┌────────────────┐   │
//! │  │ KEY         │  │ STREAMING    │  │ CATALOG        │   │
//! │  │ DERIVATION  │  │ CIPHER       │  │ (HMAC-checked) │   │
//! │  │ PBKDF2+HKDF │  │ AES-256-GCM  │  │                │   │
//! │  └──────┬──────┘  └──────┬───────┘  └───────┬────────┘   │
//! │         │                │                  │            │
//! │  ┌──────┴────────────────┴──────────────────┴─────────┐  │
//! │  │                   VAULT MANAGER                    │  │
//! │  │    lock / unlock / idle timeout / rate limiting    │  │
//! │  └────────────────────────────────────────────────────┘  │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Security Model
//!
//! - All media encrypted with AES-256-GCM in 4 MiB authenticated chunks
//! - Keys derived from the password via PBKDF2-HMAC-SHA256, expanded
//!   with HKDF into independent encryption / HMAC / verifier keys
//! - Catalog protected by an HMAC integrity value, rewritten atomically
//! - Key material lives only in process memory while unlocked and is
//!   zeroized on lock
//! - Failed unlocks back off exponentially before the KDF ever runs

pub mod biometrics;
pub mod catalog;
pub mod crypto;
pub mod error;
pub mod idle;
pub mod progress;
pub mod ratelimit;
pub mod secure_fs;
pub mod settings;
pub mod thumbs;
pub mod vault;

pub use catalog::{MediaType, VaultEntry};
pub use error::{VaultError, VaultResult};
pub use progress::{CancelToken, Progress, ProgressSink};
pub use vault::{ImportRequest, IntegrityReport, Vault, VaultState};

/// Lumen Vault version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
