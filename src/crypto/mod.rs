//! Lumen Vault - Cryptography
//!
//! Password key derivation, session key material and the streaming
//! authenticated-encryption file format.

pub mod kdf;
pub mod keys;
pub mod stream;

pub use kdf::{derive_master_key, verify_password, KdfParams};
pub use keys::{KeyMaterial, VaultKey, VaultSalt};
pub use stream::{decrypt_bytes, encrypt_bytes, StreamDecryptor, StreamEncryptor};
