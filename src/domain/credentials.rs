//! Records backing the authentication boundary: one-time code
//! challenges, login attempts and lockouts, refresh tokens, and the
//! professional-license snapshot rows the registry scraper maintains.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{OrgId, PrincipalId, Trade};

/// A pending one-time code. Only the SHA-256 of the code is stored;
/// the plaintext exists once, on its way to the transport collaborator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OtpChallenge {
    pub code_hash: String,
    pub expires_at: DateTime<Utc>,
    /// Guesses consumed so far.
    pub attempts: u32,
    pub issued_at: DateTime<Utc>,
}

/// What kind of identifier attempted to log in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentifierKind {
    Email,
    Phone,
}

impl IdentifierKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            IdentifierKind::Email => "email",
            IdentifierKind::Phone => "phone",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "email" => Some(IdentifierKind::Email),
            "phone" => Some(IdentifierKind::Phone),
            _ => None,
        }
    }
}

impl fmt::Display for IdentifierKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Append-only record of one login attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginAttempt {
    pub identifier: String,
    pub kind: IdentifierKind,
    pub success: bool,
    pub at: DateTime<Utc>,
}

/// An active lockout for one identifier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginLockout {
    pub identifier: String,
    pub locked_at: DateTime<Utc>,
    pub locked_until: DateTime<Utc>,
}

/// Session metadata recorded alongside refresh tokens.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionMeta {
    pub user_agent: Option<String>,
    pub ip: Option<String>,
}

/// A refresh token at rest: salted hash only, never the secret.
#[derive(Debug, Clone)]
pub struct RefreshTokenRecord {
    pub id: Uuid,
    pub principal: PrincipalId,
    /// Organization the session belongs to; carried into rotated
    /// access tokens.
    pub org: OrgId,
    /// hex(SHA-256(salt ‖ secret))
    pub token_hash: String,
    /// Per-record random salt, hex.
    pub salt: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub revoked_at: Option<DateTime<Utc>>,
    /// Set when rotation replaced this record.
    pub superseded_by: Option<Uuid>,
    pub session: SessionMeta,
}

impl RefreshTokenRecord {
    /// Live = not revoked and not past expiry.
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.revoked_at.is_none() && self.expires_at > now
    }
}

/// One row of the professional-license snapshot. The scraping job that
/// refreshes these rows is an external collaborator; this engine only
/// reads them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LicenseRecord {
    pub matricula: String,
    pub trade: Trade,
    pub province: String,
    pub full_name: String,
    /// Which registry the row was scraped from.
    pub source: String,
    /// Registry-owned vocabulary ("active", "vigente", "suspended", …).
    pub status: String,
    pub scraped_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn refresh_token_liveness() {
        let now = Utc::now();
        let mut record = RefreshTokenRecord {
            id: Uuid::new_v4(),
            principal: PrincipalId::new(),
            org: OrgId::new(),
            token_hash: "ab".repeat(32),
            salt: "cd".repeat(16),
            issued_at: now,
            expires_at: now + Duration::days(7),
            revoked_at: None,
            superseded_by: None,
            session: SessionMeta::default(),
        };
        assert!(record.is_live(now));
        assert!(!record.is_live(now + Duration::days(8)));

        record.revoked_at = Some(now);
        assert!(!record.is_live(now));
    }
}
