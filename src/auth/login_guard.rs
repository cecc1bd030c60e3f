//! Login throttling: failure counting, lockouts, fail-open policy.
//!
//! Five failures inside a 15-minute rolling window lock the identifier
//! for 30 minutes. A successful login resets the count. The atomic
//! check-and-lock lives in the store; this guard owns policy and the
//! fail-open decision when the store itself is down.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::config::TrustConfig;
use crate::domain::IdentifierKind;
use crate::infra::{LoginActivityStore, Result};

/// The gate answer a login flow consults before checking credentials.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginGate {
    pub allowed: bool,
    pub locked: bool,
    /// Failures left before a lockout fires. Zero while locked.
    pub remaining_attempts: u32,
    pub lockout_ends_at: Option<DateTime<Utc>>,
}

impl LoginGate {
    fn open(remaining_attempts: u32) -> Self {
        Self {
            allowed: true,
            locked: false,
            remaining_attempts,
            lockout_ends_at: None,
        }
    }

    fn locked_until(until: DateTime<Utc>) -> Self {
        Self {
            allowed: false,
            locked: true,
            remaining_attempts: 0,
            lockout_ends_at: Some(until),
        }
    }

    /// Whole minutes until the lockout lifts, rounded up, for the
    /// "try again in N minutes" message.
    pub fn retry_after_minutes(&self, now: DateTime<Utc>) -> Option<i64> {
        self.lockout_ends_at.map(|until| {
            let seconds = (until - now).num_seconds().max(0);
            (seconds + 59) / 60
        })
    }
}

pub struct LoginGuard {
    store: Arc<dyn LoginActivityStore>,
    config: TrustConfig,
}

impl LoginGuard {
    pub fn new(store: Arc<dyn LoginActivityStore>, config: TrustConfig) -> Self {
        Self { store, config }
    }

    /// Should this identifier be allowed to attempt a login right now?
    ///
    /// A store outage fails open (with a warning) when configured to:
    /// blocking every login because the attempt tracker is down costs
    /// more than the throttle protects.
    pub async fn check_at(&self, identifier: &str, now: DateTime<Utc>) -> Result<LoginGate> {
        let gate = self.gate_at(identifier, now).await;
        match gate {
            Ok(gate) => Ok(gate),
            Err(e) if self.config.login_fail_open => {
                warn!(identifier, error = %e, "login store unreachable, failing open");
                Ok(LoginGate::open(self.config.lockout_threshold))
            }
            Err(e) => Err(e),
        }
    }

    async fn gate_at(&self, identifier: &str, now: DateTime<Utc>) -> Result<LoginGate> {
        if let Some(lockout) = self.store.lockout(identifier).await? {
            if lockout.locked_until > now {
                return Ok(LoginGate::locked_until(lockout.locked_until));
            }
            // Expired lockouts lapse silently; the next failure window
            // starts from scratch.
        }

        let failures = self
            .store
            .failures_since(identifier, now - self.config.failure_window)
            .await?;
        Ok(LoginGate::open(
            self.config.lockout_threshold.saturating_sub(failures),
        ))
    }

    /// Record a failed credential check. Crossing the threshold inside
    /// the window installs the lockout atomically with the count.
    pub async fn record_failure_at(
        &self,
        identifier: &str,
        kind: IdentifierKind,
        now: DateTime<Utc>,
    ) -> Result<LoginGate> {
        let outcome = self
            .store
            .register_failure(
                identifier,
                kind,
                now,
                now - self.config.failure_window,
                self.config.lockout_threshold,
                now + self.config.lockout_duration,
            )
            .await;

        match outcome {
            Ok(outcome) => {
                if let Some(lockout) = outcome.lockout {
                    info!(
                        identifier,
                        failures = outcome.failures,
                        until = %lockout.locked_until,
                        "identifier locked out"
                    );
                    return Ok(LoginGate::locked_until(lockout.locked_until));
                }
                Ok(LoginGate::open(
                    self.config.lockout_threshold.saturating_sub(outcome.failures),
                ))
            }
            Err(e) if self.config.login_fail_open => {
                warn!(identifier, error = %e, "could not record login failure, failing open");
                Ok(LoginGate::open(self.config.lockout_threshold))
            }
            Err(e) => Err(e),
        }
    }

    /// Record a successful login: resets the failure count and clears
    /// any lockout.
    pub async fn record_success_at(
        &self,
        identifier: &str,
        kind: IdentifierKind,
        now: DateTime<Utc>,
    ) -> Result<()> {
        match self.store.register_success(identifier, kind, now).await {
            Ok(()) => Ok(()),
            Err(e) if self.config.login_fail_open => {
                warn!(identifier, error = %e, "could not record login success");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}
