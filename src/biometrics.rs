//! Lumen Vault - Authentication Capability
//!
//! Platform biometric and keychain integrations are supplied by the
//! embedding application through a capability interface, selected once
//! at startup. The core never branches on platform inline; a vault
//! without platform support gets [`NoAuthCapability`] and password-only
//! unlock.

use zeroize::Zeroizing;

use crate::error::{VaultError, VaultResult};

/// Kind of authentication capability the embedder wired in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapabilityKind {
    /// Password only
    None,
    /// Platform biometric prompt (fingerprint, face)
    PlatformBiometric,
    /// Platform keychain releasing the stored secret
    PlatformKeychain,
}

/// Authentication capability provided by the embedding application.
///
/// On success, `authenticate` releases the protected vault password so
/// the core can run its normal derivation and verification path - the
/// capability never hands out key material directly.
pub trait AuthCapability: Send + Sync {
    fn kind(&self) -> CapabilityKind;

    /// Authenticate with an opaque platform token (e.g. a biometric
    /// prompt result) and release the stored password bytes.
    fn authenticate(&self, token: &[u8]) -> VaultResult<Zeroizing<Vec<u8>>>;
}

/// Default capability: no biometric hardware, no keychain.
pub struct NoAuthCapability;

impl AuthCapability for NoAuthCapability {
    fn kind(&self) -> CapabilityKind {
        CapabilityKind::None
    }

    fn authenticate(&self, _token: &[u8]) -> VaultResult<Zeroizing<Vec<u8>>> {
        Err(VaultError::BiometricUnavailable)
    }
}
