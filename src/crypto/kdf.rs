//! Lumen Vault - Password Key Derivation
//!
//! PBKDF2-HMAC-SHA256 with a very high iteration count turns the password
//! and the stored salt into the 32-byte master key. Password verification
//! goes through a dedicated verifier key so that a wrong guess never
//! reconstructs the encryption key.

use pbkdf2::pbkdf2_hmac;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::keys::{expand_key, labels, VaultKey, VaultSalt, KEY_LEN};
use crate::error::{VaultError, VaultResult};

/// Default PBKDF2 iteration count (~0.5s on commodity hardware)
pub const DEFAULT_ITERATIONS: u32 = 600_000;

/// Minimum iteration count accepted for new vaults
pub const MIN_ITERATIONS: u32 = 100_000;

/// PBKDF2 parameters, persisted with the vault so older vaults
/// keep deriving at their original cost.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KdfParams {
    /// Iteration count
    pub iterations: u32,
}

impl KdfParams {
    /// Create parameters for a new vault. Rejects counts weak enough
    /// to make offline brute force cheap.
    pub fn new(iterations: u32) -> VaultResult<Self> {
        if iterations < MIN_ITERATIONS {
            return Err(VaultError::KeyDerivationFailed(format!(
                "iteration count {} below minimum {}",
                iterations, MIN_ITERATIONS
            )));
        }
        Ok(Self { iterations })
    }
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            iterations: DEFAULT_ITERATIONS,
        }
    }
}

/// Derive the master key from a password and salt.
///
/// Deterministic: identical inputs always yield identical output.
pub fn derive_master_key(
    password: &[u8],
    salt: &VaultSalt,
    params: &KdfParams,
) -> VaultResult<VaultKey> {
    if password.is_empty() {
        return Err(VaultError::KeyDerivationFailed(
            "password cannot be empty".into(),
        ));
    }

    let mut key = [0u8; KEY_LEN];
    pbkdf2_hmac::<Sha256>(password, salt.as_bytes(), params.iterations, &mut key);

    Ok(VaultKey::new(key))
}

/// Hash of the verifier key, safe to persist in cleartext settings.
pub fn verifier_hash(verifier: &VaultKey) -> [u8; 32] {
    Sha256::digest(verifier.expose()).into()
}

/// Check a candidate password against the stored verifier hash.
///
/// Returns the master key on a match so the caller can expand the full
/// key material without paying for a second derivation. Only the
/// verifier key is expanded before the comparison; the comparison
/// itself is constant-time.
pub fn verify_password(
    password: &[u8],
    salt: &VaultSalt,
    params: &KdfParams,
    stored_hash: &[u8; 32],
) -> VaultResult<Option<VaultKey>> {
    let master = derive_master_key(password, salt, params)?;
    let verifier = expand_key(&master, labels::VERIFIER)?;
    let candidate = verifier_hash(&verifier);

    if constant_time_eq(&candidate, stored_hash) {
        Ok(Some(master))
    } else {
        Ok(None)
    }
}

fn constant_time_eq(a: &[u8; 32], b: &[u8; 32]) -> bool {
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    // Small count so the test suite stays fast
    fn test_params() -> KdfParams {
        KdfParams { iterations: 1_000 }
    }

    #[test]
    fn test_derive_deterministic() {
        let salt = VaultSalt::from_bytes([42u8; 32]);
        let params = test_params();

        let k1 = derive_master_key(b"hunter2-but-longer", &salt, &params).unwrap();
        let k2 = derive_master_key(b"hunter2-but-longer", &salt, &params).unwrap();

        assert_eq!(k1.expose(), k2.expose());
    }

    #[test]
    fn test_derive_different_salt() {
        let params = test_params();

        let k1 = derive_master_key(b"password", &VaultSalt::from_bytes([1u8; 32]), &params).unwrap();
        let k2 = derive_master_key(b"password", &VaultSalt::from_bytes([2u8; 32]), &params).unwrap();

        assert_ne!(k1.expose(), k2.expose());
    }

    #[test]
    fn test_derive_different_iterations() {
        let salt = VaultSalt::from_bytes([3u8; 32]);

        let k1 = derive_master_key(b"password", &salt, &KdfParams { iterations: 1_000 }).unwrap();
        let k2 = derive_master_key(b"password", &salt, &KdfParams { iterations: 2_000 }).unwrap();

        assert_ne!(k1.expose(), k2.expose());
    }

    #[test]
    fn test_empty_password_fails() {
        let salt = VaultSalt::from_bytes([9u8; 32]);
        assert!(derive_master_key(b"", &salt, &test_params()).is_err());
    }

    #[test]
    fn test_verify_password() {
        let salt = VaultSalt::from_bytes([99u8; 32]);
        let params = test_params();

        let master = derive_master_key(b"correct-horse", &salt, &params).unwrap();
        let verifier = expand_key(&master, labels::VERIFIER).unwrap();
        let stored = verifier_hash(&verifier);

        assert!(verify_password(b"correct-horse", &salt, &params, &stored)
            .unwrap()
            .is_some());
        assert!(verify_password(b"wrong-horse", &salt, &params, &stored)
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_min_iterations_enforced() {
        assert!(KdfParams::new(MIN_ITERATIONS - 1).is_err());
        assert!(KdfParams::new(MIN_ITERATIONS).is_ok());
    }
}
