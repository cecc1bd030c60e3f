//! Store traits for the trust engine.
//!
//! Every piece of shared mutable state sits behind one of these seams:
//! memory implementations back tests and single-instance deployments,
//! Postgres implementations give multi-instance correctness. The
//! per-key atomic operations (OTP attempt counting, failure counting
//! with lockout) are store methods so the atomicity lives with the
//! state, not with the caller.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
#[cfg(test)]
use mockall::automock;
use uuid::Uuid;

use crate::domain::{
    ComplianceFlag, IdentifierKind, LicenseRecord, LoginAttempt, LoginLockout, OrgId,
    OrganizationSubscription, OtpChallenge, PrincipalId, RefreshTokenRecord, SubmissionStatus,
    SubscriptionEvent, Trade, VerificationSubmission,
};

use super::Result;

/// Verification submissions: created on submit, mutated only by the
/// router or manual review, terminal once approved/rejected.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait SubmissionStore: Send + Sync {
    async fn insert(&self, submission: &VerificationSubmission) -> Result<()>;

    async fn get(&self, id: Uuid) -> Result<Option<VerificationSubmission>>;

    /// Record a status transition. Implementations must refuse to
    /// overwrite a terminal status.
    async fn update_status(
        &self,
        id: Uuid,
        status: SubmissionStatus,
        reason: &str,
        evidence: Option<serde_json::Value>,
        now: DateTime<Utc>,
    ) -> Result<()>;

    async fn list_for_org(&self, org_id: OrgId) -> Result<Vec<VerificationSubmission>>;
}

/// One-time code challenges, keyed by subject.
///
/// This is the injection seam the OTP engine runs over: a single
/// in-process map for one instance, a shared cache for many. The
/// memory implementation documents its single-instance scope.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ChallengeStore: Send + Sync {
    /// Install (or replace) the challenge for a subject key.
    async fn put(&self, key: &str, challenge: OtpChallenge) -> Result<()>;

    /// Atomically increment the attempt counter and return the
    /// post-increment challenge. Two parallel guesses must observe
    /// distinct attempt numbers.
    async fn begin_attempt(&self, key: &str) -> Result<Option<OtpChallenge>>;

    async fn remove(&self, key: &str) -> Result<()>;

    /// Drop every challenge past its expiry; returns how many.
    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64>;
}

/// Outcome of [`LoginActivityStore::register_failure`].
#[derive(Debug, Clone)]
pub struct FailureOutcome {
    /// Failures counted in the rolling window, this one included.
    pub failures: u32,
    /// Set when this failure crossed the threshold.
    pub lockout: Option<LoginLockout>,
}

/// Login attempts (append-only) and lockouts.
///
/// `register_failure` is the atomic check-and-lock unit: it appends the
/// attempt, counts window failures, and installs the lockout in one
/// operation so two parallel failures cannot both observe a
/// sub-threshold count.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait LoginActivityStore: Send + Sync {
    /// Append a failed attempt and, when `threshold` failures have
    /// accumulated since `window_start` (and since the last success),
    /// install a lockout until `locked_until`.
    async fn register_failure(
        &self,
        identifier: &str,
        kind: IdentifierKind,
        now: DateTime<Utc>,
        window_start: DateTime<Utc>,
        threshold: u32,
        locked_until: DateTime<Utc>,
    ) -> Result<FailureOutcome>;

    /// Append a successful attempt, reset the failure count, and clear
    /// any lockout.
    async fn register_success(
        &self,
        identifier: &str,
        kind: IdentifierKind,
        now: DateTime<Utc>,
    ) -> Result<()>;

    async fn lockout(&self, identifier: &str) -> Result<Option<LoginLockout>>;

    /// Failed attempts since `since`, not counting anything before the
    /// most recent success.
    async fn failures_since(&self, identifier: &str, since: DateTime<Utc>) -> Result<u32>;

    async fn attempts_for(&self, identifier: &str) -> Result<Vec<LoginAttempt>>;
}

/// Refresh tokens at rest. Only salted hashes are stored; rotation is
/// one atomic unit so there is never a window where the old and new
/// token are both live, or neither is.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait RefreshTokenStore: Send + Sync {
    async fn insert(&self, record: &RefreshTokenRecord) -> Result<()>;

    async fn get(&self, id: Uuid) -> Result<Option<RefreshTokenRecord>>;

    /// Atomically revoke `old_id` (marking it superseded by the new
    /// record) and insert `new_record`.
    async fn rotate(
        &self,
        old_id: Uuid,
        new_record: &RefreshTokenRecord,
        now: DateTime<Utc>,
    ) -> Result<()>;

    /// Live records for a principal, oldest first.
    async fn live_for_principal(
        &self,
        principal: PrincipalId,
        now: DateTime<Utc>,
    ) -> Result<Vec<RefreshTokenRecord>>;

    async fn revoke(&self, id: Uuid, now: DateTime<Utc>) -> Result<()>;

    /// Revoke every live token for a principal; returns how many.
    async fn revoke_all(&self, principal: PrincipalId, now: DateTime<Utc>) -> Result<u64>;
}

/// Organization subscriptions plus their append-only transition log.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait SubscriptionStore: Send + Sync {
    async fn insert(&self, subscription: &OrganizationSubscription) -> Result<()>;

    async fn get(&self, org_id: OrgId) -> Result<Option<OrganizationSubscription>>;

    /// Persist the updated subscription and append its transition event
    /// as one atomic unit.
    async fn transition(
        &self,
        subscription: &OrganizationSubscription,
        event: &SubscriptionEvent,
    ) -> Result<()>;

    /// Subscriptions still marked trialing whose trial clock has run
    /// out at `now`.
    async fn due_for_expiry(&self, now: DateTime<Utc>) -> Result<Vec<OrganizationSubscription>>;

    async fn events_for(&self, org_id: OrgId) -> Result<Vec<SubscriptionEvent>>;
}

/// Read-only view over the professional-license snapshot the external
/// scraper maintains.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait LicenseSnapshotStore: Send + Sync {
    /// Exact case-insensitive matricula match, any trade.
    async fn find_by_matricula(&self, matricula: &str) -> Result<Vec<LicenseRecord>>;

    /// Exact case-insensitive matricula match filtered by trade.
    async fn find_by_matricula_and_trade(
        &self,
        matricula: &str,
        trade: Trade,
    ) -> Result<Option<LicenseRecord>>;

    /// Newest `scraped_at` for a trade; lets reviewers judge snapshot
    /// freshness on a miss.
    async fn newest_scraped_at(&self, trade: Trade) -> Result<Option<DateTime<Utc>>>;
}

/// Read-only view over compliance flags; flag management is an
/// external collaborator.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ComplianceStore: Send + Sync {
    async fn active_flags(&self, org_id: OrgId) -> Result<Vec<ComplianceFlag>>;
}
