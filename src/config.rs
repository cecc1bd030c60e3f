//! Engine configuration.
//!
//! Every operational constant of the engine lives here instead of
//! inline at the call site. Defaults match the production policy;
//! tests override individual fields.

use chrono::Duration;

/// Tunable limits and windows for the trust engine.
#[derive(Debug, Clone)]
pub struct TrustConfig {
    /// Failed logins inside the window before a lockout fires.
    pub lockout_threshold: u32,
    /// How long a lockout lasts once fired.
    pub lockout_duration: Duration,
    /// Rolling window over which failures are counted.
    pub failure_window: Duration,
    /// One-time code lifetime.
    pub otp_ttl: Duration,
    /// Wrong guesses before a challenge is purged.
    pub otp_max_attempts: u32,
    /// Trial length granted at signup.
    pub trial_length: Duration,
    /// Grace window after trial expiry before the hard block.
    pub trial_grace: Duration,
    /// Warning banner threshold before trial expiry.
    pub trial_warning_window: Duration,
    /// Live refresh tokens allowed per principal; oldest pruned beyond.
    pub max_live_refresh_tokens: usize,
    /// Signed access token lifetime.
    pub access_token_ttl: Duration,
    /// Opaque refresh token lifetime.
    pub refresh_token_ttl: Duration,
    /// Bound on the upstream tax-registry call.
    pub registry_timeout: std::time::Duration,
    /// Allow logins when the attempt-tracking store is unreachable.
    ///
    /// Availability over blocking every login during a telemetry
    /// outage. Flip to false for strict enforcement.
    pub login_fail_open: bool,
}

impl Default for TrustConfig {
    fn default() -> Self {
        Self {
            lockout_threshold: 5,
            lockout_duration: Duration::minutes(30),
            failure_window: Duration::minutes(15),
            otp_ttl: Duration::minutes(10),
            otp_max_attempts: 3,
            trial_length: Duration::days(21),
            trial_grace: Duration::days(7),
            trial_warning_window: Duration::days(7),
            max_live_refresh_tokens: 5,
            access_token_ttl: Duration::hours(24),
            refresh_token_ttl: Duration::days(7),
            registry_timeout: std::time::Duration::from_secs(8),
            login_fail_open: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_policy() {
        let config = TrustConfig::default();
        assert_eq!(config.lockout_threshold, 5);
        assert_eq!(config.lockout_duration, Duration::minutes(30));
        assert_eq!(config.failure_window, Duration::minutes(15));
        assert_eq!(config.otp_ttl, Duration::minutes(10));
        assert_eq!(config.otp_max_attempts, 3);
        assert_eq!(config.trial_length, Duration::days(21));
        assert_eq!(config.max_live_refresh_tokens, 5);
        assert_eq!(config.access_token_ttl, Duration::hours(24));
        assert_eq!(config.refresh_token_ttl, Duration::days(7));
        assert!(config.login_fail_open);
    }
}
