//! Lumen Vault - Unlock Rate Limiting
//!
//! Exponential backoff on consecutive failed unlock attempts. The
//! limiter is consulted *before* the password check, so a gated attempt
//! never pays for the expensive key derivation. Biometric attempts have
//! their own small per-session cap and fall back to the password.

use std::time::{Duration, Instant};

/// Backoff base delay after the first failure
pub const BASE_DELAY: Duration = Duration::from_secs(5);

/// Backoff ceiling
pub const MAX_DELAY: Duration = Duration::from_secs(300);

/// Biometric attempts allowed per session before falling back to password
pub const BIOMETRIC_MAX_ATTEMPTS: u32 = 3;

/// Backoff delay for a given failure count:
/// `min(base * 2^failures, max)`.
pub fn delay_for(failures: u32) -> Duration {
    let secs = BASE_DELAY
        .as_secs()
        .saturating_mul(1u64 << failures.min(20));
    Duration::from_secs(secs.min(MAX_DELAY.as_secs()))
}

/// Tracks consecutive failed unlock attempts, process-wide.
#[derive(Debug)]
pub struct RateLimiter {
    consecutive_failures: u32,
    last_failure: Option<Instant>,
    biometric_failures: u32,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self {
            consecutive_failures: 0,
            last_failure: None,
            biometric_failures: 0,
        }
    }

    /// Whether an unlock attempt may proceed right now.
    /// On rejection, returns the remaining wait.
    pub fn check(&self) -> Result<(), Duration> {
        self.check_at(Instant::now())
    }

    pub fn check_at(&self, now: Instant) -> Result<(), Duration> {
        if self.consecutive_failures == 0 {
            return Ok(());
        }
        let required = delay_for(self.consecutive_failures - 1);
        let elapsed = self
            .last_failure
            .map(|t| now.saturating_duration_since(t))
            .unwrap_or(required);
        if elapsed >= required {
            Ok(())
        } else {
            Err(required - elapsed)
        }
    }

    /// Record a failed password check. Returns the wait the next
    /// attempt will face.
    pub fn record_failure(&mut self) -> Duration {
        self.record_failure_at(Instant::now())
    }

    pub fn record_failure_at(&mut self, now: Instant) -> Duration {
        self.consecutive_failures += 1;
        self.last_failure = Some(now);
        delay_for(self.consecutive_failures - 1)
    }

    /// Any successful unlock resets the counter to zero.
    pub fn record_success(&mut self) {
        self.consecutive_failures = 0;
        self.last_failure = None;
    }

    pub fn failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// Record a failed biometric attempt. Returns attempts left.
    pub fn record_biometric_failure(&mut self) -> u32 {
        self.biometric_failures += 1;
        BIOMETRIC_MAX_ATTEMPTS.saturating_sub(self.biometric_failures)
    }

    /// Whether biometric unlock is disabled for this session.
    pub fn biometric_exhausted(&self) -> bool {
        self.biometric_failures >= BIOMETRIC_MAX_ATTEMPTS
    }

    /// Re-enable biometric attempts (new session).
    pub fn reset_biometric(&mut self) {
        self.biometric_failures = 0;
    }

    #[cfg(test)]
    pub fn backdate_last_failure(&mut self, by: Duration) {
        if let Some(t) = self.last_failure {
            self.last_failure = Some(t - by);
        }
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}
