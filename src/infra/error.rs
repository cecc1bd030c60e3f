//! Error types for the trust engine infrastructure.

use thiserror::Error;
use uuid::Uuid;

/// Errors that can cross a component boundary.
///
/// Business outcomes (a failed checksum, a registry miss, a wrong OTP
/// guess) are values, not errors; this enum is for infrastructure and
/// configuration faults, plus the terminal credential states the token
/// and OTP paths report.
#[derive(Error, Debug)]
pub enum TrustError {
    /// Database error
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Deterministically malformed input; retrying cannot help.
    #[error("invalid format: {0}")]
    FormatInvalid(String),

    /// A referenced record does not exist.
    #[error("{what} not found: {id}")]
    NotFound { what: &'static str, id: String },

    /// An upstream collaborator could not be reached or answered badly.
    #[error("provider unavailable: {0}")]
    ProviderUnavailable(String),

    /// The credential's lifetime elapsed; a new one must be issued.
    #[error("expired: {0}")]
    Expired(String),

    /// Attempt budget exhausted; terminal until re-issue.
    #[error("too many attempts: {0}")]
    TooManyAttempts(String),

    /// Rate limit exceeded
    #[error("rate limit exceeded")]
    RateLimited,

    /// Explicitly invalidated credential.
    #[error("revoked: {0}")]
    Revoked(String),

    /// Invalid subscription state transition
    #[error("invalid state transition for org {org_id}: {from} -> {to}")]
    InvalidStateTransition {
        org_id: Uuid,
        from: String,
        to: String,
    },

    /// Configuration error
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Internal error
    #[error("internal error: {0}")]
    Internal(String),
}

/// Result type for trust-engine operations
pub type Result<T> = std::result::Result<T, TrustError>;
