//! One-time code lifecycle.
//!
//! Issues 6-digit codes, stores only their SHA-256, and verifies
//! candidates with a per-key atomic attempt counter. Delivery is an
//! external transport collaborator; this engine hands it the plaintext
//! exactly once and never logs a code beyond its first two digits.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
#[cfg(test)]
use mockall::automock;
use rand::Rng;
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::domain::OtpChallenge;
use crate::infra::{ChallengeStore, Result};

/// Where a code travels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OtpChannel {
    Sms,
    Email,
}

impl std::fmt::Display for OtpChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OtpChannel::Sms => f.write_str("sms"),
            OtpChannel::Email => f.write_str("email"),
        }
    }
}

/// Delivery collaborator: SMS gateway, mail sender. This engine never
/// implements transport itself.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait CodeTransport: Send + Sync {
    async fn deliver(&self, channel: OtpChannel, destination: &str, code: &str) -> Result<()>;
}

/// Delivery via the platform's messaging service: one POST per code.
pub struct WebhookTransport {
    http: reqwest::Client,
    url: String,
}

impl WebhookTransport {
    pub fn new(url: impl Into<String>, timeout: std::time::Duration) -> Self {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();
        Self {
            http,
            url: url.into(),
        }
    }
}

#[async_trait]
impl CodeTransport for WebhookTransport {
    async fn deliver(&self, channel: OtpChannel, destination: &str, code: &str) -> Result<()> {
        let body = serde_json::json!({
            "channel": channel.to_string(),
            "destination": destination,
            "code": code,
        });
        let response = self
            .http
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                crate::infra::TrustError::ProviderUnavailable(format!(
                    "code delivery failed: {e}"
                ))
            })?;
        if !response.status().is_success() {
            return Err(crate::infra::TrustError::ProviderUnavailable(format!(
                "code delivery answered {}",
                response.status()
            )));
        }
        Ok(())
    }
}

/// Dev fallback when no delivery webhook is configured. Logs the
/// destination and the code prefix only; the code goes nowhere.
pub struct LogOnlyTransport;

#[async_trait]
impl CodeTransport for LogOnlyTransport {
    async fn deliver(&self, channel: OtpChannel, destination: &str, code: &str) -> Result<()> {
        warn!(%channel, destination, code_prefix = &code[..2], "no code transport configured, dropping code");
        Ok(())
    }
}

/// Outcome of one verification attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OtpOutcome {
    /// Correct code; the challenge is consumed.
    Match,
    /// Wrong code; `remaining` guesses left before the purge.
    Mismatch { remaining: u32 },
    /// Past its TTL; the challenge is purged, re-issue required.
    Expired,
    /// Third wrong guess; the challenge is purged.
    TooManyAttempts,
    /// No live challenge for this key (never issued, consumed, or
    /// already purged).
    NotFound,
}

#[derive(Debug, Clone)]
pub struct OtpConfig {
    pub ttl: Duration,
    pub max_attempts: u32,
}

impl Default for OtpConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::minutes(10),
            max_attempts: 3,
        }
    }
}

pub struct OtpChallenges {
    store: Arc<dyn ChallengeStore>,
    transport: Arc<dyn CodeTransport>,
    config: OtpConfig,
}

fn hash_code(code: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(code.as_bytes());
    hex::encode(hasher.finalize())
}

impl OtpChallenges {
    pub fn new(
        store: Arc<dyn ChallengeStore>,
        transport: Arc<dyn CodeTransport>,
        config: OtpConfig,
    ) -> Self {
        Self {
            store,
            transport,
            config,
        }
    }

    /// Issue a fresh challenge for `subject_key`, replacing any live
    /// one, and hand the plaintext to the transport.
    pub async fn issue_at(
        &self,
        subject_key: &str,
        channel: OtpChannel,
        destination: &str,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let code = {
            let mut rng = rand::thread_rng();
            format!("{:06}", rng.gen_range(0..1_000_000u32))
        };

        self.store
            .put(
                subject_key,
                OtpChallenge {
                    code_hash: hash_code(&code),
                    expires_at: now + self.config.ttl,
                    attempts: 0,
                    issued_at: now,
                },
            )
            .await?;

        info!(subject = subject_key, %channel, code_prefix = &code[..2], "one-time code issued");
        self.transport.deliver(channel, destination, &code).await
    }

    /// Verify a candidate. One store operation increments the attempt
    /// counter, so two parallel guesses observe distinct counts and the
    /// limit always fires.
    pub async fn verify_at(
        &self,
        subject_key: &str,
        candidate: &str,
        now: DateTime<Utc>,
    ) -> Result<OtpOutcome> {
        let challenge = match self.store.begin_attempt(subject_key).await? {
            Some(challenge) => challenge,
            None => return Ok(OtpOutcome::NotFound),
        };

        if challenge.expires_at <= now {
            self.store.remove(subject_key).await?;
            debug!(subject = subject_key, "challenge expired");
            return Ok(OtpOutcome::Expired);
        }

        if challenge.code_hash == hash_code(candidate) {
            // Single use: consumed on match.
            self.store.remove(subject_key).await?;
            return Ok(OtpOutcome::Match);
        }

        if challenge.attempts >= self.config.max_attempts {
            self.store.remove(subject_key).await?;
            info!(subject = subject_key, "challenge purged after attempt limit");
            return Ok(OtpOutcome::TooManyAttempts);
        }

        Ok(OtpOutcome::Mismatch {
            remaining: self.config.max_attempts - challenge.attempts,
        })
    }

    /// Drop expired challenges; returns how many were purged.
    pub async fn purge_expired_at(&self, now: DateTime<Utc>) -> Result<u64> {
        self.store.purge_expired(now).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::MemoryChallengeStore;
    use tokio::sync::Mutex;

    /// Captures delivered codes so tests can replay them.
    struct CapturingTransport {
        delivered: Mutex<Vec<String>>,
    }

    impl CapturingTransport {
        fn new() -> Self {
            Self {
                delivered: Mutex::new(Vec::new()),
            }
        }

        async fn last_code(&self) -> String {
            self.delivered.lock().await.last().cloned().unwrap()
        }
    }

    #[async_trait]
    impl CodeTransport for CapturingTransport {
        async fn deliver(&self, _channel: OtpChannel, _destination: &str, code: &str) -> Result<()> {
            self.delivered.lock().await.push(code.to_string());
            Ok(())
        }
    }

    fn engine() -> (OtpChallenges, Arc<CapturingTransport>) {
        let transport = Arc::new(CapturingTransport::new());
        let engine = OtpChallenges::new(
            Arc::new(MemoryChallengeStore::new()),
            transport.clone(),
            OtpConfig::default(),
        );
        (engine, transport)
    }

    #[tokio::test]
    async fn correct_code_succeeds_exactly_once() {
        let (engine, transport) = engine();
        let now = Utc::now();
        engine
            .issue_at("org:phone:+549110000", OtpChannel::Sms, "+549110000", now)
            .await
            .unwrap();
        let code = transport.last_code().await;

        assert_eq!(
            engine
                .verify_at("org:phone:+549110000", &code, now)
                .await
                .unwrap(),
            OtpOutcome::Match
        );
        // Consumed: the same code no longer exists.
        assert_eq!(
            engine
                .verify_at("org:phone:+549110000", &code, now)
                .await
                .unwrap(),
            OtpOutcome::NotFound
        );
    }

    #[tokio::test]
    async fn third_wrong_guess_purges() {
        let (engine, transport) = engine();
        let now = Utc::now();
        engine
            .issue_at("k", OtpChannel::Sms, "+549110000", now)
            .await
            .unwrap();
        let code = transport.last_code().await;
        let wrong = if code == "000000" { "000001" } else { "000000" };

        assert_eq!(
            engine.verify_at("k", wrong, now).await.unwrap(),
            OtpOutcome::Mismatch { remaining: 2 }
        );
        assert_eq!(
            engine.verify_at("k", wrong, now).await.unwrap(),
            OtpOutcome::Mismatch { remaining: 1 }
        );
        assert_eq!(
            engine.verify_at("k", wrong, now).await.unwrap(),
            OtpOutcome::TooManyAttempts
        );
        // Even the right code is gone now.
        assert_eq!(
            engine.verify_at("k", &code, now).await.unwrap(),
            OtpOutcome::NotFound
        );
    }

    #[tokio::test]
    async fn expiry_wins_over_correctness() {
        let (engine, transport) = engine();
        let now = Utc::now();
        engine
            .issue_at("k", OtpChannel::Email, "a@b.com", now)
            .await
            .unwrap();
        let code = transport.last_code().await;

        let later = now + Duration::minutes(11);
        assert_eq!(
            engine.verify_at("k", &code, later).await.unwrap(),
            OtpOutcome::Expired
        );
        assert_eq!(
            engine.verify_at("k", &code, later).await.unwrap(),
            OtpOutcome::NotFound
        );
    }

    #[tokio::test]
    async fn reissue_replaces_the_live_challenge() {
        let (engine, transport) = engine();
        let now = Utc::now();
        engine
            .issue_at("k", OtpChannel::Sms, "+549110000", now)
            .await
            .unwrap();
        let first = transport.last_code().await;
        engine
            .issue_at("k", OtpChannel::Sms, "+549110000", now)
            .await
            .unwrap();
        let second = transport.last_code().await;

        if first != second {
            assert_ne!(
                engine.verify_at("k", &first, now).await.unwrap(),
                OtpOutcome::Match
            );
        }
        assert_eq!(
            engine.verify_at("k", &second, now).await.unwrap(),
            OtpOutcome::Match
        );
    }
}
