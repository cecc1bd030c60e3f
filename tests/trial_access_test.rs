//! Integration tests for the trial lifecycle and the access aggregator.

mod common;

use std::sync::Arc;

use chrono::{Duration, Utc};

use laburen_trust::config::TrustConfig;
use laburen_trust::domain::{
    AccessInputs, ComplianceFlag, OrgId, PlanTier, RequirementCatalog, RequirementCode,
    RequirementState, SubmissionStatus, SubscriptionSnapshot, SubscriptionStatus, Trade,
    TransitionCause,
};
use laburen_trust::infra::{MemorySubscriptionStore, TrustError};
use laburen_trust::policy::{AccessPolicy, TrialLifecycle};

use common::{build_router, installer_taxpayer, license_row, test_org, valid_cuit, RegistryScript};

fn lifecycle() -> TrialLifecycle {
    TrialLifecycle::new(Arc::new(MemorySubscriptionStore::new()), TrustConfig::default())
}

#[tokio::test]
async fn trial_runs_for_twenty_one_days_then_sweeps_to_free() {
    let trials = lifecycle();
    let org = test_org();
    let t0 = Utc::now();

    let started = trials.start_trial_at(org, t0).await.unwrap();
    assert_eq!(started.status, SubscriptionStatus::Trialing);
    assert_eq!(started.tier, PlanTier::Standard);
    assert_eq!(started.trial_ends_at, Some(t0 + Duration::days(21)));

    // Too early: nothing to expire.
    assert!(trials.expire_due_at(t0 + Duration::days(20)).await.unwrap().is_empty());

    let expired = trials.expire_due_at(t0 + Duration::days(22)).await.unwrap();
    assert_eq!(expired, vec![org]);

    let after = trials.get(org).await.unwrap().unwrap();
    assert_eq!(after.status, SubscriptionStatus::Expired);
    assert_eq!(after.tier, PlanTier::Free);

    // Idempotent: a second sweep finds nothing.
    assert!(trials.expire_due_at(t0 + Duration::days(23)).await.unwrap().is_empty());

    let causes: Vec<TransitionCause> = trials
        .events_for(org)
        .await
        .unwrap()
        .iter()
        .map(|e| e.cause)
        .collect();
    assert_eq!(causes, vec![TransitionCause::TrialStarted, TransitionCause::TrialExpired]);
}

#[tokio::test]
async fn an_org_gets_one_trial_ever() {
    let trials = lifecycle();
    let org = test_org();
    let t0 = Utc::now();

    trials.start_trial_at(org, t0).await.unwrap();
    assert!(matches!(
        trials.start_trial_at(org, t0 + Duration::days(1)).await,
        Err(TrustError::InvalidStateTransition { .. })
    ));

    // Even after expiry and conversion the answer stays no.
    trials.expire_due_at(t0 + Duration::days(22)).await.unwrap();
    assert!(matches!(
        trials.start_trial_at(org, t0 + Duration::days(30)).await,
        Err(TrustError::InvalidStateTransition { .. })
    ));
}

#[tokio::test]
async fn conversion_works_from_trialing_and_expired_only() {
    let trials = lifecycle();
    let org = test_org();
    let t0 = Utc::now();

    trials.start_trial_at(org, t0).await.unwrap();
    let converted = trials
        .convert_at(org, PlanTier::Premium, t0 + Duration::days(5))
        .await
        .unwrap();
    assert_eq!(converted.status, SubscriptionStatus::Active);
    assert_eq!(converted.tier, PlanTier::Premium);
    assert_eq!(converted.trial_ends_at, None);

    // Already active: no second conversion.
    assert!(matches!(
        trials.convert_at(org, PlanTier::Standard, t0 + Duration::days(6)).await,
        Err(TrustError::InvalidStateTransition { .. })
    ));

    // A lapsed trial can still convert.
    let other = OrgId::new();
    trials.start_trial_at(other, t0).await.unwrap();
    trials.expire_due_at(t0 + Duration::days(22)).await.unwrap();
    let late = trials
        .convert_at(other, PlanTier::Standard, t0 + Duration::days(25))
        .await
        .unwrap();
    assert_eq!(late.status, SubscriptionStatus::Active);
}

#[tokio::test]
async fn access_tightens_over_the_trial_arc() {
    let trials = lifecycle();
    let policy = AccessPolicy::new(TrustConfig::default());
    let org = test_org();
    let t0 = Utc::now();
    trials.start_trial_at(org, t0).await.unwrap();

    let evaluate_at = |snapshot: SubscriptionSnapshot, at| {
        policy.evaluate(
            &AccessInputs {
                subscription: snapshot,
                requirements: Vec::new(),
                compliance: Vec::new(),
            },
            at,
        )
    };

    let subscription = trials.get(org).await.unwrap().unwrap();

    // Day 10: clear.
    let day10 = evaluate_at(SubscriptionSnapshot::from(&subscription), t0 + Duration::days(10));
    assert!(day10.can_receive_jobs);
    assert!(day10.reasons.is_empty());

    // Day 16: warning banner, nothing blocked.
    let day16 = evaluate_at(SubscriptionSnapshot::from(&subscription), t0 + Duration::days(16));
    assert!(day16.can_receive_jobs);
    assert_eq!(day16.reasons[0].code, "trial_ending_soon");

    // Day 23, swept: grace keeps the dashboard, pauses intake.
    trials.expire_due_at(t0 + Duration::days(22)).await.unwrap();
    let swept = trials.get(org).await.unwrap().unwrap();
    let day23 = evaluate_at(SubscriptionSnapshot::from(&swept), t0 + Duration::days(23));
    assert!(day23.can_access_dashboard);
    assert!(!day23.can_receive_jobs);

    // Day 30: past grace, hard block.
    let day30 = evaluate_at(SubscriptionSnapshot::from(&swept), t0 + Duration::days(30));
    assert!(!day30.can_access_dashboard);
}

#[tokio::test]
async fn verified_active_org_is_clear_and_flags_block_it() {
    let (router, transport) = build_router(
        RegistryScript::Found(installer_taxpayer()),
        vec![license_row("MAT-1", Trade::Gas)],
    );
    let trials = lifecycle();
    let policy = AccessPolicy::new(TrustConfig::default());
    let org = test_org();
    let now = Utc::now();

    trials.start_trial_at(org, now).await.unwrap();
    trials.convert_at(org, PlanTier::Standard, now).await.unwrap();

    let cuit = valid_cuit(30, 71_234_567);
    for code in [
        RequirementCode::CuitOwnership,
        RequirementCode::AfipActiveStatus,
        RequirementCode::ActivityMatch,
        RequirementCode::FiscalAddress,
    ] {
        router.submit_at(org, code, &cuit, now).await.unwrap();
    }
    router
        .submit_at(org, RequirementCode::ProfessionalLicense(Trade::Gas), "MAT-1", now)
        .await
        .unwrap();
    for (code, value) in [
        (RequirementCode::PhoneOwnership, "+5491155550000"),
        (RequirementCode::EmailOwnership, "ana@example.com"),
    ] {
        let (submission, _) = router.submit_at(org, code, value, now).await.unwrap();
        let otp = transport.last_code().await.unwrap();
        router.confirm_code_at(submission.id, &otp, now).await.unwrap();
    }

    // Same assembly the access endpoint does: catalog rows joined with
    // approved submissions.
    let submissions = router.list_for_org(org).await.unwrap();
    let requirements: Vec<RequirementState> = RequirementCatalog::standard()
        .iter()
        .map(|requirement| RequirementState {
            code: requirement.code,
            required: requirement.required,
            approved: submissions.iter().any(|s| {
                s.requirement == requirement.code && s.status == SubmissionStatus::Approved
            }),
            expires_at: None,
        })
        .collect();

    let subscription = trials.get(org).await.unwrap().unwrap();
    let mut inputs = AccessInputs {
        subscription: SubscriptionSnapshot::from(&subscription),
        requirements,
        compliance: Vec::new(),
    };

    let clear = policy.evaluate(&inputs, now);
    assert!(clear.can_receive_jobs, "reasons: {:?}", clear.reasons);

    inputs.compliance.push(ComplianceFlag {
        code: "fraud_review".to_string(),
        detail: Some("manual fraud review in progress".to_string()),
        active: true,
        flagged_at: now,
    });
    let flagged = policy.evaluate(&inputs, now);
    assert!(!flagged.can_access_dashboard);
    assert_eq!(flagged.reasons[0].code, "compliance:fraud_review");
}
