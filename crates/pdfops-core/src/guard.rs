//! Brute-force lockout for unlock attempts
//!
//! One guard belongs to one unlock session. While locked out, attempts are
//! refused before the password is ever checked.

use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{PasswordError, PdfOpsError};
use crate::loader::DocumentHandle;
use crate::security;

/// Lockout seconds indexed by the consecutive failure count.
/// Counts past the end use the last entry.
pub const DEFAULT_BACKOFF_SECS: [u32; 8] = [0, 0, 0, 60, 300, 900, 1800, 3600];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockoutPolicy {
    #[serde(default = "default_schedule")]
    pub schedule: Vec<u32>,
    /// Forget earlier failures once a lockout expires
    #[serde(default = "default_reset_on_expiry")]
    pub reset_on_expiry: bool,
}

fn default_schedule() -> Vec<u32> {
    DEFAULT_BACKOFF_SECS.to_vec()
}

fn default_reset_on_expiry() -> bool {
    true
}

impl Default for LockoutPolicy {
    fn default() -> Self {
        Self {
            schedule: default_schedule(),
            reset_on_expiry: default_reset_on_expiry(),
        }
    }
}

impl LockoutPolicy {
    /// Lockout incurred by the `failed_attempts`-th consecutive failure.
    pub fn lockout_for(&self, failed_attempts: u32) -> Duration {
        let Some(last) = self.schedule.len().checked_sub(1) else {
            return Duration::ZERO;
        };
        let index = (failed_attempts as usize).min(last);
        Duration::from_secs(u64::from(self.schedule[index]))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockoutState {
    pub failed_attempts: u32,
    pub locked_until: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardState {
    Open,
    Attempting,
    LockedOut { until: DateTime<Utc> },
}

#[derive(Debug, Default)]
pub struct BruteForceGuard {
    policy: LockoutPolicy,
    lockout: LockoutState,
    attempting: bool,
}

impl BruteForceGuard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_policy(policy: LockoutPolicy) -> Self {
        Self {
            policy,
            ..Self::default()
        }
    }

    pub fn policy(&self) -> &LockoutPolicy {
        &self.policy
    }

    pub fn lockout(&self) -> &LockoutState {
        &self.lockout
    }

    pub fn state_at(&self, now: DateTime<Utc>) -> GuardState {
        match self.lockout.locked_until {
            Some(until) if now < until => GuardState::LockedOut { until },
            _ if self.attempting => GuardState::Attempting,
            _ => GuardState::Open,
        }
    }

    /// Refuse while locked out; clear an expired lockout.
    pub fn check_at(&mut self, now: DateTime<Utc>) -> Result<(), PasswordError> {
        let Some(until) = self.lockout.locked_until else {
            return Ok(());
        };
        if now < until {
            let remaining = (until - now).to_std().unwrap_or(Duration::ZERO);
            return Err(PasswordError::Locked { remaining });
        }

        self.lockout.locked_until = None;
        if self.policy.reset_on_expiry {
            self.lockout.failed_attempts = 0;
        }
        tracing::debug!(
            failed_attempts = self.lockout.failed_attempts,
            "lockout expired"
        );
        Ok(())
    }

    /// Count a failed attempt. Returns the lockout it triggered, if any.
    pub fn record_failure_at(&mut self, now: DateTime<Utc>) -> Option<Duration> {
        self.lockout.failed_attempts = self.lockout.failed_attempts.saturating_add(1);
        let lockout = self.policy.lockout_for(self.lockout.failed_attempts);
        if lockout.is_zero() {
            return None;
        }

        let seconds = i64::try_from(lockout.as_secs()).unwrap_or(i64::MAX);
        self.lockout.locked_until =
            TimeDelta::try_seconds(seconds).and_then(|delta| now.checked_add_signed(delta));
        tracing::warn!(
            failed_attempts = self.lockout.failed_attempts,
            lockout_secs = lockout.as_secs(),
            "too many failed unlock attempts"
        );
        Some(lockout)
    }

    pub fn record_success(&mut self) {
        self.lockout = LockoutState::default();
    }

    /// Run one password attempt through the guard.
    ///
    /// `attempt` is not called at all while locked out. Only
    /// `IncorrectPassword` counts as a failure; other errors leave the
    /// counter alone.
    pub fn attempt_at<T>(
        &mut self,
        now: DateTime<Utc>,
        attempt: impl FnOnce() -> Result<T, PdfOpsError>,
    ) -> Result<T, PdfOpsError> {
        self.check_at(now)?;

        self.attempting = true;
        let result = attempt();
        self.attempting = false;

        match &result {
            Ok(_) => self.record_success(),
            Err(PdfOpsError::Password(PasswordError::IncorrectPassword)) => {
                self.record_failure_at(now);
            }
            Err(_) => {}
        }
        result
    }

    pub fn attempt<T>(
        &mut self,
        attempt: impl FnOnce() -> Result<T, PdfOpsError>,
    ) -> Result<T, PdfOpsError> {
        self.attempt_at(Utc::now(), attempt)
    }

    /// Decrypt through the guard.
    pub fn unlock_at(
        &mut self,
        now: DateTime<Utc>,
        handle: DocumentHandle,
        password: &str,
    ) -> Result<Vec<u8>, PdfOpsError> {
        self.attempt_at(now, || security::decrypt(handle, password))
    }

    pub fn unlock(
        &mut self,
        handle: DocumentHandle,
        password: &str,
    ) -> Result<Vec<u8>, PdfOpsError> {
        self.unlock_at(Utc::now(), handle, password)
    }
}
