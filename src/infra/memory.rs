//! In-memory store implementations.
//!
//! Each store guards its state with a single async mutex, which makes
//! the per-key atomic operations (attempt counting, check-and-lock,
//! rotation) trivially atomic. Scope is one process: a multi-instance
//! deployment needs the Postgres implementations (or a shared cache
//! behind [`ChallengeStore`]) so state is visible to every instance.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::domain::{
    ComplianceFlag, IdentifierKind, LicenseRecord, LoginAttempt, LoginLockout, OrgId,
    OrganizationSubscription, OtpChallenge, PrincipalId, RefreshTokenRecord, SubmissionStatus,
    SubscriptionEvent, Trade, VerificationSubmission,
};

use super::{
    ChallengeStore, ComplianceStore, FailureOutcome, LicenseSnapshotStore, LoginActivityStore,
    RefreshTokenStore, Result, SubmissionStore, SubscriptionStore, TrustError,
};

// ============================================================================
// Submissions
// ============================================================================

#[derive(Default)]
pub struct MemorySubmissionStore {
    rows: Mutex<HashMap<Uuid, VerificationSubmission>>,
}

impl MemorySubmissionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SubmissionStore for MemorySubmissionStore {
    async fn insert(&self, submission: &VerificationSubmission) -> Result<()> {
        let mut rows = self.rows.lock().await;
        rows.insert(submission.id, submission.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<VerificationSubmission>> {
        let rows = self.rows.lock().await;
        Ok(rows.get(&id).cloned())
    }

    async fn update_status(
        &self,
        id: Uuid,
        status: SubmissionStatus,
        reason: &str,
        evidence: Option<serde_json::Value>,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let mut rows = self.rows.lock().await;
        let row = rows.get_mut(&id).ok_or_else(|| TrustError::NotFound {
            what: "submission",
            id: id.to_string(),
        })?;
        if row.status.is_terminal() {
            return Err(TrustError::InvalidStateTransition {
                org_id: row.org_id.0,
                from: row.status.to_string(),
                to: status.to_string(),
            });
        }
        row.status = status;
        row.reason = Some(reason.to_string());
        if evidence.is_some() {
            row.evidence = evidence;
        }
        row.updated_at = now;
        Ok(())
    }

    async fn list_for_org(&self, org_id: OrgId) -> Result<Vec<VerificationSubmission>> {
        let rows = self.rows.lock().await;
        let mut out: Vec<_> = rows
            .values()
            .filter(|s| s.org_id == org_id)
            .cloned()
            .collect();
        out.sort_by_key(|s| s.created_at);
        Ok(out)
    }
}

// ============================================================================
// OTP challenges
// ============================================================================

#[derive(Default)]
pub struct MemoryChallengeStore {
    rows: Mutex<HashMap<String, OtpChallenge>>,
}

impl MemoryChallengeStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ChallengeStore for MemoryChallengeStore {
    async fn put(&self, key: &str, challenge: OtpChallenge) -> Result<()> {
        let mut rows = self.rows.lock().await;
        rows.insert(key.to_string(), challenge);
        Ok(())
    }

    async fn begin_attempt(&self, key: &str) -> Result<Option<OtpChallenge>> {
        let mut rows = self.rows.lock().await;
        Ok(rows.get_mut(key).map(|challenge| {
            challenge.attempts += 1;
            challenge.clone()
        }))
    }

    async fn remove(&self, key: &str) -> Result<()> {
        let mut rows = self.rows.lock().await;
        rows.remove(key);
        Ok(())
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64> {
        let mut rows = self.rows.lock().await;
        let before = rows.len();
        rows.retain(|_, c| c.expires_at > now);
        Ok((before - rows.len()) as u64)
    }
}

// ============================================================================
// Login activity
// ============================================================================

#[derive(Default)]
struct LoginState {
    attempts: Vec<LoginAttempt>,
    /// Timestamps of failures since the last success.
    failure_times: Vec<DateTime<Utc>>,
    lockout: Option<LoginLockout>,
}

#[derive(Default)]
pub struct MemoryLoginActivityStore {
    rows: Mutex<HashMap<String, LoginState>>,
}

impl MemoryLoginActivityStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LoginActivityStore for MemoryLoginActivityStore {
    async fn register_failure(
        &self,
        identifier: &str,
        kind: IdentifierKind,
        now: DateTime<Utc>,
        window_start: DateTime<Utc>,
        threshold: u32,
        locked_until: DateTime<Utc>,
    ) -> Result<FailureOutcome> {
        let mut rows = self.rows.lock().await;
        let state = rows.entry(identifier.to_string()).or_default();
        state.attempts.push(LoginAttempt {
            identifier: identifier.to_string(),
            kind,
            success: false,
            at: now,
        });
        state.failure_times.push(now);
        state.failure_times.retain(|t| *t >= window_start);

        let failures = state.failure_times.len() as u32;
        let lockout = if failures >= threshold {
            let lockout = LoginLockout {
                identifier: identifier.to_string(),
                locked_at: now,
                locked_until,
            };
            state.lockout = Some(lockout.clone());
            Some(lockout)
        } else {
            None
        };

        Ok(FailureOutcome { failures, lockout })
    }

    async fn register_success(
        &self,
        identifier: &str,
        kind: IdentifierKind,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let mut rows = self.rows.lock().await;
        let state = rows.entry(identifier.to_string()).or_default();
        state.attempts.push(LoginAttempt {
            identifier: identifier.to_string(),
            kind,
            success: true,
            at: now,
        });
        state.failure_times.clear();
        state.lockout = None;
        Ok(())
    }

    async fn lockout(&self, identifier: &str) -> Result<Option<LoginLockout>> {
        let rows = self.rows.lock().await;
        Ok(rows.get(identifier).and_then(|s| s.lockout.clone()))
    }

    async fn failures_since(&self, identifier: &str, since: DateTime<Utc>) -> Result<u32> {
        let rows = self.rows.lock().await;
        Ok(rows
            .get(identifier)
            .map(|s| s.failure_times.iter().filter(|t| **t >= since).count() as u32)
            .unwrap_or(0))
    }

    async fn attempts_for(&self, identifier: &str) -> Result<Vec<LoginAttempt>> {
        let rows = self.rows.lock().await;
        Ok(rows
            .get(identifier)
            .map(|s| s.attempts.clone())
            .unwrap_or_default())
    }
}

// ============================================================================
// Refresh tokens
// ============================================================================

#[derive(Default)]
pub struct MemoryRefreshTokenStore {
    rows: Mutex<HashMap<Uuid, RefreshTokenRecord>>,
}

impl MemoryRefreshTokenStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RefreshTokenStore for MemoryRefreshTokenStore {
    async fn insert(&self, record: &RefreshTokenRecord) -> Result<()> {
        let mut rows = self.rows.lock().await;
        rows.insert(record.id, record.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<RefreshTokenRecord>> {
        let rows = self.rows.lock().await;
        Ok(rows.get(&id).cloned())
    }

    async fn rotate(
        &self,
        old_id: Uuid,
        new_record: &RefreshTokenRecord,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let mut rows = self.rows.lock().await;
        let old = rows.get_mut(&old_id).ok_or_else(|| TrustError::NotFound {
            what: "refresh token",
            id: old_id.to_string(),
        })?;
        old.revoked_at = Some(now);
        old.superseded_by = Some(new_record.id);
        rows.insert(new_record.id, new_record.clone());
        Ok(())
    }

    async fn live_for_principal(
        &self,
        principal: PrincipalId,
        now: DateTime<Utc>,
    ) -> Result<Vec<RefreshTokenRecord>> {
        let rows = self.rows.lock().await;
        let mut out: Vec<_> = rows
            .values()
            .filter(|r| r.principal == principal && r.is_live(now))
            .cloned()
            .collect();
        out.sort_by_key(|r| r.issued_at);
        Ok(out)
    }

    async fn revoke(&self, id: Uuid, now: DateTime<Utc>) -> Result<()> {
        let mut rows = self.rows.lock().await;
        let row = rows.get_mut(&id).ok_or_else(|| TrustError::NotFound {
            what: "refresh token",
            id: id.to_string(),
        })?;
        row.revoked_at = Some(now);
        Ok(())
    }

    async fn revoke_all(&self, principal: PrincipalId, now: DateTime<Utc>) -> Result<u64> {
        let mut rows = self.rows.lock().await;
        let mut revoked = 0u64;
        for row in rows.values_mut() {
            if row.principal == principal && row.is_live(now) {
                row.revoked_at = Some(now);
                revoked += 1;
            }
        }
        Ok(revoked)
    }
}

// ============================================================================
// Subscriptions
// ============================================================================

#[derive(Default)]
pub struct MemorySubscriptionStore {
    subs: Mutex<HashMap<OrgId, OrganizationSubscription>>,
    events: Mutex<Vec<SubscriptionEvent>>,
}

impl MemorySubscriptionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SubscriptionStore for MemorySubscriptionStore {
    async fn insert(&self, subscription: &OrganizationSubscription) -> Result<()> {
        let mut subs = self.subs.lock().await;
        subs.insert(subscription.org_id, subscription.clone());
        Ok(())
    }

    async fn get(&self, org_id: OrgId) -> Result<Option<OrganizationSubscription>> {
        let subs = self.subs.lock().await;
        Ok(subs.get(&org_id).cloned())
    }

    async fn transition(
        &self,
        subscription: &OrganizationSubscription,
        event: &SubscriptionEvent,
    ) -> Result<()> {
        let mut subs = self.subs.lock().await;
        let mut events = self.events.lock().await;
        subs.insert(subscription.org_id, subscription.clone());
        events.push(event.clone());
        Ok(())
    }

    async fn due_for_expiry(&self, now: DateTime<Utc>) -> Result<Vec<OrganizationSubscription>> {
        let subs = self.subs.lock().await;
        Ok(subs
            .values()
            .filter(|s| s.trial_elapsed(now))
            .cloned()
            .collect())
    }

    async fn events_for(&self, org_id: OrgId) -> Result<Vec<SubscriptionEvent>> {
        let events = self.events.lock().await;
        Ok(events
            .iter()
            .filter(|e| e.org_id == org_id)
            .cloned()
            .collect())
    }
}

// ============================================================================
// License snapshot
// ============================================================================

pub struct MemoryLicenseSnapshotStore {
    rows: Mutex<Vec<LicenseRecord>>,
}

impl MemoryLicenseSnapshotStore {
    pub fn new(rows: Vec<LicenseRecord>) -> Self {
        Self {
            rows: Mutex::new(rows),
        }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new())
    }
}

#[async_trait]
impl LicenseSnapshotStore for MemoryLicenseSnapshotStore {
    async fn find_by_matricula(&self, matricula: &str) -> Result<Vec<LicenseRecord>> {
        let rows = self.rows.lock().await;
        Ok(rows
            .iter()
            .filter(|r| r.matricula.eq_ignore_ascii_case(matricula))
            .cloned()
            .collect())
    }

    async fn find_by_matricula_and_trade(
        &self,
        matricula: &str,
        trade: Trade,
    ) -> Result<Option<LicenseRecord>> {
        let rows = self.rows.lock().await;
        Ok(rows
            .iter()
            .find(|r| r.trade == trade && r.matricula.eq_ignore_ascii_case(matricula))
            .cloned())
    }

    async fn newest_scraped_at(&self, trade: Trade) -> Result<Option<DateTime<Utc>>> {
        let rows = self.rows.lock().await;
        Ok(rows
            .iter()
            .filter(|r| r.trade == trade)
            .map(|r| r.scraped_at)
            .max())
    }
}

// ============================================================================
// Compliance flags
// ============================================================================

#[derive(Default)]
pub struct MemoryComplianceStore {
    rows: Mutex<HashMap<OrgId, Vec<ComplianceFlag>>>,
}

impl MemoryComplianceStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_flags(&self, org_id: OrgId, flags: Vec<ComplianceFlag>) {
        let mut rows = self.rows.lock().await;
        rows.insert(org_id, flags);
    }
}

#[async_trait]
impl ComplianceStore for MemoryComplianceStore {
    async fn active_flags(&self, org_id: OrgId) -> Result<Vec<ComplianceFlag>> {
        let rows = self.rows.lock().await;
        Ok(rows
            .get(&org_id)
            .map(|flags| flags.iter().filter(|f| f.active).cloned().collect())
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[tokio::test]
    async fn challenge_attempts_increment_atomically() {
        let store = MemoryChallengeStore::new();
        let now = Utc::now();
        store
            .put(
                "org:phone:+5491100000000",
                OtpChallenge {
                    code_hash: "ab".repeat(32),
                    expires_at: now + Duration::minutes(10),
                    attempts: 0,
                    issued_at: now,
                },
            )
            .await
            .unwrap();

        let first = store
            .begin_attempt("org:phone:+5491100000000")
            .await
            .unwrap()
            .unwrap();
        let second = store
            .begin_attempt("org:phone:+5491100000000")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(first.attempts, 1);
        assert_eq!(second.attempts, 2);

        assert!(store.begin_attempt("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn failure_counter_resets_on_success() {
        let store = MemoryLoginActivityStore::new();
        let now = Utc::now();
        let window_start = now - Duration::minutes(15);
        let locked_until = now + Duration::minutes(30);

        for _ in 0..3 {
            store
                .register_failure(
                    "ana@example.com",
                    IdentifierKind::Email,
                    now,
                    window_start,
                    5,
                    locked_until,
                )
                .await
                .unwrap();
        }
        assert_eq!(
            store
                .failures_since("ana@example.com", window_start)
                .await
                .unwrap(),
            3
        );

        store
            .register_success("ana@example.com", IdentifierKind::Email, now)
            .await
            .unwrap();
        assert_eq!(
            store
                .failures_since("ana@example.com", window_start)
                .await
                .unwrap(),
            0
        );
        assert!(store.lockout("ana@example.com").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn terminal_submission_status_is_never_overwritten() {
        let store = MemorySubmissionStore::new();
        let now = Utc::now();
        let submission = VerificationSubmission::new(
            OrgId::new(),
            crate::domain::RequirementCode::CuitOwnership,
            "20-12345678-6",
            now,
        );
        store.insert(&submission).await.unwrap();
        store
            .update_status(submission.id, SubmissionStatus::Approved, "ok", None, now)
            .await
            .unwrap();

        let err = store
            .update_status(submission.id, SubmissionStatus::Rejected, "nope", None, now)
            .await
            .unwrap_err();
        assert!(matches!(err, TrustError::InvalidStateTransition { .. }));
    }
}
