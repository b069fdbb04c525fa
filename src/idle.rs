//! Lumen Vault - Idle Timeout
//!
//! A single countdown per unlocked session. Activity re-arms it;
//! long-running work (viewing, importing) suspends it with a reason tag.
//! Suspensions are reference-counted per reason, so releasing one of
//! several concurrent suspensions does not prematurely re-arm the timer.

use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Default idle timeout for a fresh vault
pub const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 600;

/// Idle countdown with reference-counted suspensions.
#[derive(Debug)]
pub struct IdleTimer {
    timeout: Duration,
    deadline: Option<Instant>,
    suspensions: HashMap<String, usize>,
    armed: bool,
}

impl IdleTimer {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            deadline: None,
            suspensions: HashMap::new(),
            armed: false,
        }
    }

    /// Arm the countdown for a new unlocked session.
    pub fn arm(&mut self, now: Instant) {
        self.armed = true;
        self.suspensions.clear();
        self.deadline = Some(now + self.timeout);
    }

    /// Disarm on lock.
    pub fn disarm(&mut self) {
        self.armed = false;
        self.suspensions.clear();
        self.deadline = None;
    }

    /// Activity: restart the full countdown, unless suspended.
    pub fn touch(&mut self, now: Instant) {
        if self.armed && self.suspensions.is_empty() {
            self.deadline = Some(now + self.timeout);
        }
    }

    /// Pause the countdown. Multiple suspensions (same or different
    /// reasons) stack.
    pub fn suspend(&mut self, reason: &str) {
        if !self.armed {
            return;
        }
        *self.suspensions.entry(reason.to_string()).or_insert(0) += 1;
        self.deadline = None;
    }

    /// Release one suspension. Only when the last one goes does the
    /// countdown restart, from the full configured duration.
    pub fn resume(&mut self, reason: &str, now: Instant) {
        if !self.armed {
            return;
        }
        match self.suspensions.get_mut(reason) {
            Some(count) if *count > 1 => *count -= 1,
            Some(_) => {
                self.suspensions.remove(reason);
            }
            None => {
                log::warn!("idle timer resume without matching suspend: {}", reason);
                return;
            }
        }
        if self.suspensions.is_empty() {
            self.deadline = Some(now + self.timeout);
        }
    }

    /// Whether the countdown has run out.
    pub fn expired(&self, now: Instant) -> bool {
        self.armed
            && self.suspensions.is_empty()
            && self.deadline.map_or(false, |d| now >= d)
    }

    pub fn is_suspended(&self) -> bool {
        !self.suspensions.is_empty()
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Change the configured duration; takes effect at the next re-arm.
    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    #[cfg(test)]
    pub fn force_expire(&mut self) {
        if self.armed {
            self.suspensions.clear();
            self.deadline = Some(Instant::now() - Duration::from_secs(1));
        }
    }
}
