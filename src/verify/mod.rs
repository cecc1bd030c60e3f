//! Automatic verification: dispatch, scoring, and one-time codes.
//!
//! The router owns the full life of a submission: it persists the
//! attempt, dispatches to the verifier the catalog names for the
//! requirement, and records the normalized outcome. Three invariants
//! hold everywhere: auto-approval only happens through an explicit
//! approve result, anything a verifier cannot decide lands in
//! needs-review (never a silent approve or reject), and a terminal
//! status is never overwritten.

pub mod activity;
pub mod license;
pub mod otp;
pub mod registry;

pub use activity::{ActivityCode, ActivityMatcher, ActivityMatcherConfig, ActivityScore, Recommendation, TargetActivity};
pub use license::LicenseMatcher;
pub use otp::{
    CodeTransport, LogOnlyTransport, OtpChallenges, OtpChannel, OtpConfig, OtpOutcome,
    WebhookTransport,
};
pub use registry::{AfipPadronClient, FiscalAddress, TaxRegistryClient, TaxpayerInfo, TaxpayerLookup};

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::json;
use tracing::{info, warn};

use crate::domain::{
    AutoVerifyResult, AutoVerifySource, Cuit, EntityKind, OrgId, RequirementCatalog,
    RequirementCode, SubmissionStatus, VerificationSubmission,
};
use crate::infra::{Result, SubmissionStore, TrustError};

/// Challenge key for a contact-ownership submission. One live challenge
/// per (org, requirement, destination).
fn subject_key(org_id: OrgId, code: RequirementCode, value: &str) -> String {
    format!("{org_id}:{code}:{value}")
}

pub struct VerificationRouter {
    catalog: RequirementCatalog,
    submissions: Arc<dyn SubmissionStore>,
    registry: Arc<dyn TaxRegistryClient>,
    activity: ActivityMatcher,
    licenses: LicenseMatcher,
    otp: OtpChallenges,
}

impl VerificationRouter {
    pub fn new(
        catalog: RequirementCatalog,
        submissions: Arc<dyn SubmissionStore>,
        registry: Arc<dyn TaxRegistryClient>,
        activity: ActivityMatcher,
        licenses: LicenseMatcher,
        otp: OtpChallenges,
    ) -> Self {
        Self {
            catalog,
            submissions,
            registry,
            activity,
            licenses,
            otp,
        }
    }

    /// Accept a submission, run its automatic verifier, and persist the
    /// outcome. Contact-ownership checks stay `Pending` here; they
    /// resolve in [`confirm_code_at`](Self::confirm_code_at).
    pub async fn submit_at(
        &self,
        org_id: OrgId,
        code: RequirementCode,
        value: &str,
        now: DateTime<Utc>,
    ) -> Result<(VerificationSubmission, AutoVerifyResult)> {
        let mut submission = VerificationSubmission::new(org_id, code, value, now);
        self.submissions.insert(&submission).await?;

        let requirement = match self.catalog.get(code) {
            Some(requirement) => requirement,
            None => {
                let result = AutoVerifyResult::review(
                    format!("requirement {code} is not in the active catalog"),
                    None,
                );
                self.record(&mut submission, &result, now).await?;
                return Ok((submission, result));
            }
        };

        let result = match requirement.source {
            AutoVerifySource::Manual => {
                AutoVerifyResult::review(format!("{code} requires manual review"), None)
            }
            AutoVerifySource::Sms | AutoVerifySource::Email => {
                return self
                    .issue_challenge(submission, requirement.source, value, now)
                    .await;
            }
            AutoVerifySource::Afip => self.verify_afip(code, value).await,
            AutoVerifySource::Registry => self.verify_registry(code, value, now).await?,
        };

        self.record(&mut submission, &result, now).await?;
        info!(
            org = %org_id,
            requirement = %code,
            status = %submission.status,
            "submission verified"
        );
        Ok((submission, result))
    }

    /// Confirm a contact-ownership submission with a one-time code.
    ///
    /// A match approves the submission; a third wrong guess sends it to
    /// review; a mismatch or an expired challenge leaves it pending so
    /// the holder can retry or request a new code.
    pub async fn confirm_code_at(
        &self,
        submission_id: uuid::Uuid,
        candidate: &str,
        now: DateTime<Utc>,
    ) -> Result<(VerificationSubmission, OtpOutcome)> {
        let mut submission = self
            .submissions
            .get(submission_id)
            .await?
            .ok_or(TrustError::NotFound {
                what: "submission",
                id: submission_id.to_string(),
            })?;

        let source = self
            .catalog
            .get(submission.requirement)
            .map(|r| r.source)
            .unwrap_or(AutoVerifySource::Manual);
        if !matches!(source, AutoVerifySource::Sms | AutoVerifySource::Email) {
            return Err(TrustError::FormatInvalid(format!(
                "{} is not confirmed with a code",
                submission.requirement
            )));
        }

        // Terminal submissions never change again; the challenge (if
        // any survived) is irrelevant.
        if submission.status.is_terminal() {
            return Ok((submission, OtpOutcome::NotFound));
        }

        let key = subject_key(
            submission.org_id,
            submission.requirement,
            &submission.submitted_value,
        );
        let outcome = self.otp.verify_at(&key, candidate, now).await?;

        let result = match outcome {
            OtpOutcome::Match => Some(AutoVerifyResult::approve(
                format!("{} confirmed with a one-time code", submission.requirement),
                json!({ "result": "code_match", "confirmed_at": now }),
            )),
            OtpOutcome::TooManyAttempts => Some(AutoVerifyResult::review(
                "attempt limit reached for the one-time code".to_string(),
                Some(json!({ "result": "too_many_attempts" })),
            )),
            // Retryable outcomes keep the submission pending.
            OtpOutcome::Mismatch { .. } | OtpOutcome::Expired | OtpOutcome::NotFound => None,
        };

        if let Some(result) = result {
            self.record(&mut submission, &result, now).await?;
        }
        info!(
            submission = %submission_id,
            outcome = ?outcome,
            status = %submission.status,
            "code confirmation"
        );
        Ok((submission, outcome))
    }

    pub async fn get(&self, id: uuid::Uuid) -> Result<Option<VerificationSubmission>> {
        self.submissions.get(id).await
    }

    pub async fn list_for_org(&self, org_id: OrgId) -> Result<Vec<VerificationSubmission>> {
        self.submissions.list_for_org(org_id).await
    }

    pub async fn purge_expired_challenges_at(&self, now: DateTime<Utc>) -> Result<u64> {
        self.otp.purge_expired_at(now).await
    }

    async fn issue_challenge(
        &self,
        mut submission: VerificationSubmission,
        source: AutoVerifySource,
        value: &str,
        now: DateTime<Utc>,
    ) -> Result<(VerificationSubmission, AutoVerifyResult)> {
        let channel = match source {
            AutoVerifySource::Email => OtpChannel::Email,
            _ => OtpChannel::Sms,
        };
        let key = subject_key(submission.org_id, submission.requirement, value);
        self.otp.issue_at(&key, channel, value, now).await?;

        // Not a decision yet: the submission stays pending until the
        // holder replays the code.
        let reason = format!("one-time code sent via {channel}, awaiting confirmation");
        self.submissions
            .update_status(submission.id, SubmissionStatus::Pending, &reason, None, now)
            .await?;
        submission.reason = Some(reason.clone());
        submission.updated_at = now;

        Ok((
            submission,
            AutoVerifyResult {
                success: true,
                should_approve: false,
                needs_review: false,
                reason,
                evidence: None,
            },
        ))
    }

    /// Checks resolved against the tax authority. Transport faults
    /// surface as `Unavailable` and land in review.
    async fn verify_afip(&self, code: RequirementCode, value: &str) -> AutoVerifyResult {
        let cuit = match Cuit::parse(value) {
            Ok(cuit) => cuit,
            Err(e) => {
                return AutoVerifyResult::reject(
                    format!("invalid tax identifier: {e}"),
                    json!({ "result": "format_invalid", "error": e.to_string() }),
                );
            }
        };

        // CUIL ownership is a checksum-plus-prefix check; no registry
        // call for worker identifiers.
        if code == RequirementCode::CuilOwnership {
            return match cuit.entity_kind() {
                Some(EntityKind::Company) => AutoVerifyResult::review(
                    format!("{cuit} carries a company prefix on a worker identifier"),
                    Some(json!({ "result": "prefix_mismatch", "prefix": cuit.prefix() })),
                ),
                _ => AutoVerifyResult::approve(
                    format!("{cuit} passes the verifier-digit check"),
                    json!({ "result": "checksum_ok", "cuit": cuit.formatted() }),
                ),
            };
        }

        let info = match self.registry.lookup(&cuit).await {
            TaxpayerLookup::Found(info) => info,
            TaxpayerLookup::NotFound => {
                return AutoVerifyResult::reject(
                    format!("{cuit} is not registered with the tax authority"),
                    json!({ "result": "not_registered", "cuit": cuit.formatted() }),
                );
            }
            TaxpayerLookup::Unavailable { reason } => {
                warn!(cuit = %cuit, reason, "registry unavailable, routing to review");
                return AutoVerifyResult::review(
                    format!("tax registry unavailable: {reason}"),
                    Some(json!({ "result": "provider_unavailable", "detail": reason })),
                );
            }
        };

        match code {
            RequirementCode::CuitOwnership => AutoVerifyResult::approve(
                format!("{cuit} is registered as {}", info.legal_name),
                json!({
                    "result": "registered",
                    "cuit": cuit.formatted(),
                    "legal_name": info.legal_name,
                    "tax_category": info.tax_category,
                    "active": info.active,
                }),
            ),
            RequirementCode::AfipActiveStatus => {
                if info.active {
                    AutoVerifyResult::approve(
                        format!("{} is active as {}", cuit, info.tax_category),
                        json!({
                            "result": "active",
                            "tax_category": info.tax_category,
                            "legal_name": info.legal_name,
                        }),
                    )
                } else {
                    AutoVerifyResult::reject(
                        format!("{cuit} is registered but not active"),
                        json!({ "result": "inactive", "tax_category": info.tax_category }),
                    )
                }
            }
            RequirementCode::ActivityMatch => {
                let scored = self.activity.score(&info.activities);
                let evidence = json!({
                    "result": "scored",
                    "score": scored.score,
                    "declared_activities": info.activities,
                });
                match scored.recommendation {
                    Recommendation::Approved => AutoVerifyResult::approve(
                        format!("declared activities score {} against the taxonomy", scored.score),
                        evidence,
                    ),
                    Recommendation::Review => AutoVerifyResult::review(
                        format!(
                            "declared activities score {} - related but not a direct match",
                            scored.score
                        ),
                        Some(evidence),
                    ),
                    Recommendation::Rejected => AutoVerifyResult::reject(
                        format!(
                            "declared activities score {} - no overlap with the taxonomy",
                            scored.score
                        ),
                        evidence,
                    ),
                }
            }
            RequirementCode::FiscalAddress => match info.fiscal_address {
                Some(address) => AutoVerifyResult::approve(
                    format!("fiscal address on file in {}", address.province),
                    json!({ "result": "on_file", "fiscal_address": address }),
                ),
                None => AutoVerifyResult::review(
                    format!("{cuit} has no fiscal address on file"),
                    Some(json!({ "result": "no_address" })),
                ),
            },
            // Catalog says Afip but the code has no authority-backed
            // verifier; a human untangles the misconfiguration.
            RequirementCode::CuilOwnership
            | RequirementCode::ProfessionalLicense(_)
            | RequirementCode::PhoneOwnership
            | RequirementCode::EmailOwnership => AutoVerifyResult::review(
                format!("{code} is misconfigured for authority verification"),
                None,
            ),
        }
    }

    async fn verify_registry(
        &self,
        code: RequirementCode,
        value: &str,
        now: DateTime<Utc>,
    ) -> Result<AutoVerifyResult> {
        match code {
            RequirementCode::ProfessionalLicense(trade) => {
                self.licenses.lookup(value, trade, now).await
            }
            _ => Ok(AutoVerifyResult::review(
                format!("{code} is misconfigured for registry verification"),
                None,
            )),
        }
    }

    async fn record(
        &self,
        submission: &mut VerificationSubmission,
        result: &AutoVerifyResult,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let status = result.resolved_status();
        self.submissions
            .update_status(
                submission.id,
                status,
                &result.reason,
                result.evidence.clone(),
                now,
            )
            .await?;
        submission.status = status;
        submission.reason = Some(result.reason.clone());
        submission.evidence = result.evidence.clone();
        submission.updated_at = now;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Trade;
    use crate::infra::{MemoryChallengeStore, MemoryLicenseSnapshotStore, MemorySubmissionStore};
    use crate::verify::registry::MockTaxRegistryClient;
    use async_trait::async_trait;
    use tokio::sync::Mutex;

    struct CapturingTransport {
        delivered: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl CodeTransport for CapturingTransport {
        async fn deliver(&self, _channel: OtpChannel, _destination: &str, code: &str) -> Result<()> {
            self.delivered.lock().await.push(code.to_string());
            Ok(())
        }
    }

    fn router_with(registry: MockTaxRegistryClient) -> (VerificationRouter, Arc<CapturingTransport>) {
        let transport = Arc::new(CapturingTransport {
            delivered: Mutex::new(Vec::new()),
        });
        let router = VerificationRouter::new(
            RequirementCatalog::standard(),
            Arc::new(MemorySubmissionStore::new()),
            Arc::new(registry),
            ActivityMatcher::default(),
            LicenseMatcher::new(Arc::new(MemoryLicenseSnapshotStore::empty())),
            OtpChallenges::new(
                Arc::new(MemoryChallengeStore::new()),
                transport.clone(),
                OtpConfig::default(),
            ),
        );
        (router, transport)
    }

    fn taxpayer(active: bool, activities: &[&str]) -> TaxpayerInfo {
        TaxpayerInfo {
            legal_name: "Servicios Lopez SRL".to_string(),
            tax_category: "responsable_inscripto".to_string(),
            active,
            activities: activities.iter().map(|c| ActivityCode::new(*c)).collect(),
            fiscal_address: None,
        }
    }

    #[tokio::test]
    async fn malformed_cuit_rejects_without_registry_call() {
        let mut registry = MockTaxRegistryClient::new();
        registry.expect_lookup().never();
        let (router, _) = router_with(registry);

        let (submission, result) = router
            .submit_at(
                OrgId::new(),
                RequirementCode::CuitOwnership,
                "20-12345678-7",
                Utc::now(),
            )
            .await
            .unwrap();

        assert!(!result.should_approve);
        assert!(!result.needs_review);
        assert_eq!(submission.status, SubmissionStatus::Rejected);
    }

    #[tokio::test]
    async fn registered_active_taxpayer_approves() {
        let mut registry = MockTaxRegistryClient::new();
        registry
            .expect_lookup()
            .returning(|_| TaxpayerLookup::Found(taxpayer(true, &["432200"])));
        let (router, _) = router_with(registry);

        let (submission, result) = router
            .submit_at(
                OrgId::new(),
                RequirementCode::AfipActiveStatus,
                "30-71234567-1",
                Utc::now(),
            )
            .await
            .unwrap();

        assert!(result.should_approve);
        assert_eq!(submission.status, SubmissionStatus::Approved);
    }

    #[tokio::test]
    async fn registry_outage_routes_to_review_never_approves() {
        let mut registry = MockTaxRegistryClient::new();
        registry.expect_lookup().returning(|_| TaxpayerLookup::Unavailable {
            reason: "registry request timed out".to_string(),
        });
        let (router, _) = router_with(registry);

        let (submission, result) = router
            .submit_at(
                OrgId::new(),
                RequirementCode::CuitOwnership,
                "30-71234567-1",
                Utc::now(),
            )
            .await
            .unwrap();

        assert!(result.needs_review);
        assert!(!result.should_approve);
        assert_eq!(submission.status, SubmissionStatus::NeedsReview);
    }

    #[tokio::test]
    async fn activity_mismatch_rejects_with_score_evidence() {
        let mut registry = MockTaxRegistryClient::new();
        registry
            .expect_lookup()
            .returning(|_| TaxpayerLookup::Found(taxpayer(true, &["620100"])));
        let (router, _) = router_with(registry);

        let (submission, result) = router
            .submit_at(
                OrgId::new(),
                RequirementCode::ActivityMatch,
                "30-71234567-1",
                Utc::now(),
            )
            .await
            .unwrap();

        assert_eq!(submission.status, SubmissionStatus::Rejected);
        assert_eq!(result.evidence.unwrap()["score"], 0);
    }

    #[tokio::test]
    async fn license_miss_goes_to_review() {
        let mut registry = MockTaxRegistryClient::new();
        registry.expect_lookup().never();
        let (router, _) = router_with(registry);

        let (submission, _) = router
            .submit_at(
                OrgId::new(),
                RequirementCode::ProfessionalLicense(Trade::Gas),
                "GAS-404",
                Utc::now(),
            )
            .await
            .unwrap();

        assert_eq!(submission.status, SubmissionStatus::NeedsReview);
    }

    #[tokio::test]
    async fn phone_flow_pends_then_approves_on_code_match() {
        let mut registry = MockTaxRegistryClient::new();
        registry.expect_lookup().never();
        let (router, transport) = router_with(registry);
        let now = Utc::now();

        let (submission, _) = router
            .submit_at(
                OrgId::new(),
                RequirementCode::PhoneOwnership,
                "+5491155550000",
                now,
            )
            .await
            .unwrap();
        assert_eq!(submission.status, SubmissionStatus::Pending);

        let code = transport.delivered.lock().await.last().cloned().unwrap();
        let (confirmed, outcome) = router
            .confirm_code_at(submission.id, &code, now)
            .await
            .unwrap();
        assert_eq!(outcome, OtpOutcome::Match);
        assert_eq!(confirmed.status, SubmissionStatus::Approved);
    }

    #[tokio::test]
    async fn wrong_code_keeps_submission_pending() {
        let mut registry = MockTaxRegistryClient::new();
        registry.expect_lookup().never();
        let (router, transport) = router_with(registry);
        let now = Utc::now();

        let (submission, _) = router
            .submit_at(OrgId::new(), RequirementCode::EmailOwnership, "a@b.com", now)
            .await
            .unwrap();
        let code = transport.delivered.lock().await.last().cloned().unwrap();
        let wrong = if code == "000000" { "000001" } else { "000000" };

        let (after, outcome) = router.confirm_code_at(submission.id, wrong, now).await.unwrap();
        assert_eq!(outcome, OtpOutcome::Mismatch { remaining: 2 });
        assert_eq!(after.status, SubmissionStatus::Pending);
    }

    #[tokio::test]
    async fn approved_submission_is_never_reopened_by_a_late_code() {
        let mut registry = MockTaxRegistryClient::new();
        registry.expect_lookup().never();
        let (router, transport) = router_with(registry);
        let now = Utc::now();

        let (submission, _) = router
            .submit_at(OrgId::new(), RequirementCode::EmailOwnership, "a@b.com", now)
            .await
            .unwrap();
        let code = transport.delivered.lock().await.last().cloned().unwrap();
        router.confirm_code_at(submission.id, &code, now).await.unwrap();

        let (after, outcome) = router.confirm_code_at(submission.id, &code, now).await.unwrap();
        assert_eq!(outcome, OtpOutcome::NotFound);
        assert_eq!(after.status, SubmissionStatus::Approved);
    }

    #[tokio::test]
    async fn cuil_checksum_approves_without_registry() {
        let mut registry = MockTaxRegistryClient::new();
        registry.expect_lookup().never();
        let (router, _) = router_with(registry);

        let (submission, result) = router
            .submit_at(
                OrgId::new(),
                RequirementCode::CuilOwnership,
                "20-12345678-6",
                Utc::now(),
            )
            .await
            .unwrap();

        assert!(result.should_approve);
        assert_eq!(submission.status, SubmissionStatus::Approved);
    }
}
