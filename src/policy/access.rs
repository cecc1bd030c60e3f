//! The access aggregator: one pure function from three domain
//! snapshots to a decision.
//!
//! Reasons accumulate across domains; a hard block in one never hides
//! a soft block in another, so the holder sees everything standing
//! between them and full access in a single answer. The decision is
//! computed on demand and never persisted.

use chrono::{DateTime, Utc};

use crate::config::TrustConfig;
use crate::domain::{
    AccessDecision, AccessInputs, BlockReason, BlockSeverity, PolicyDomain, SubscriptionSnapshot,
    SubscriptionStatus,
};

pub struct AccessPolicy {
    config: TrustConfig,
}

impl AccessPolicy {
    pub fn new(config: TrustConfig) -> Self {
        Self { config }
    }

    /// Evaluate the gate for one organization at one instant. Pure:
    /// same inputs and clock, same decision.
    pub fn evaluate(&self, inputs: &AccessInputs, now: DateTime<Utc>) -> AccessDecision {
        let mut reasons = Vec::new();

        self.subscription_reasons(&inputs.subscription, now, &mut reasons);

        for requirement in &inputs.requirements {
            if requirement.missing() {
                reasons.push(BlockReason {
                    domain: PolicyDomain::Verification,
                    severity: BlockSeverity::Soft,
                    code: format!("requirement_missing:{}", requirement.code),
                    message: format!("required verification {} is not approved", requirement.code),
                    remediation: Some("/verifications".to_string()),
                });
            } else if requirement.expired(now) {
                reasons.push(BlockReason {
                    domain: PolicyDomain::Verification,
                    severity: BlockSeverity::Hard,
                    code: format!("requirement_expired:{}", requirement.code),
                    message: format!("verified credential {} has expired", requirement.code),
                    remediation: Some("/verifications".to_string()),
                });
            }
        }

        for flag in &inputs.compliance {
            if flag.active {
                reasons.push(BlockReason {
                    domain: PolicyDomain::Compliance,
                    severity: BlockSeverity::Hard,
                    code: format!("compliance:{}", flag.code),
                    message: flag
                        .detail
                        .clone()
                        .unwrap_or_else(|| format!("compliance flag {} is active", flag.code)),
                    remediation: Some("contact support".to_string()),
                });
            }
        }

        // Hard first, then soft, then warnings; domains in declaration
        // order inside each band. The sort is stable, so reasons from
        // one domain keep their relative order.
        reasons.sort_by_key(|r| (r.severity, r.domain));

        let any_hard = reasons.iter().any(|r| r.severity == BlockSeverity::Hard);
        let any_soft = reasons.iter().any(|r| r.severity == BlockSeverity::Soft);
        AccessDecision {
            can_access_dashboard: !any_hard,
            can_receive_jobs: !any_hard && !any_soft,
            reasons,
        }
    }

    fn subscription_reasons(
        &self,
        subscription: &SubscriptionSnapshot,
        now: DateTime<Utc>,
        reasons: &mut Vec<BlockReason>,
    ) {
        match subscription.status {
            SubscriptionStatus::Active => {}
            SubscriptionStatus::Trialing => {
                match subscription.trial_ends_at {
                    // The sweep has not recorded it yet, but the clock
                    // has run out: treat as expired now.
                    Some(ends) if ends <= now => self.trial_expired_reason(ends, now, reasons),
                    Some(ends) if ends - now <= self.config.trial_warning_window => {
                        let days_left = (ends - now).num_days().max(0) + 1;
                        reasons.push(BlockReason {
                            domain: PolicyDomain::Subscription,
                            severity: BlockSeverity::Warning,
                            code: "trial_ending_soon".to_string(),
                            message: format!("trial ends in {days_left} day(s)"),
                            remediation: Some("/billing".to_string()),
                        });
                    }
                    _ => {}
                }
            }
            SubscriptionStatus::Expired => match subscription.trial_ends_at {
                Some(ends) => self.trial_expired_reason(ends, now, reasons),
                // No trial clock on record; past the grace by definition.
                None => reasons.push(hard_trial_expired("trial expired".to_string())),
            },
            SubscriptionStatus::Cancelled => reasons.push(BlockReason {
                domain: PolicyDomain::Subscription,
                severity: BlockSeverity::Hard,
                code: "subscription_cancelled".to_string(),
                message: "subscription was cancelled".to_string(),
                remediation: Some("/billing".to_string()),
            }),
            SubscriptionStatus::PastDue => reasons.push(BlockReason {
                domain: PolicyDomain::Subscription,
                severity: BlockSeverity::Soft,
                code: "payment_past_due".to_string(),
                message: "latest payment failed; new job intake is paused".to_string(),
                remediation: Some("/billing".to_string()),
            }),
        }
    }

    /// Inside the grace window an expired trial only pauses intake;
    /// past it the dashboard goes too.
    fn trial_expired_reason(
        &self,
        ended: DateTime<Utc>,
        now: DateTime<Utc>,
        reasons: &mut Vec<BlockReason>,
    ) {
        if now - ended <= self.config.trial_grace {
            reasons.push(BlockReason {
                domain: PolicyDomain::Subscription,
                severity: BlockSeverity::Soft,
                code: "trial_expired".to_string(),
                message: "trial has ended; convert to keep receiving jobs".to_string(),
                remediation: Some("/billing".to_string()),
            });
        } else {
            reasons.push(hard_trial_expired(
                "trial ended and the grace window has passed".to_string(),
            ));
        }
    }
}

fn hard_trial_expired(message: String) -> BlockReason {
    BlockReason {
        domain: PolicyDomain::Subscription,
        severity: BlockSeverity::Hard,
        code: "trial_expired".to_string(),
        message,
        remediation: Some("/billing".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ComplianceFlag, PlanTier, RequirementCode, RequirementState};
    use chrono::Duration;

    fn policy() -> AccessPolicy {
        AccessPolicy::new(TrustConfig::default())
    }

    fn subscription(status: SubscriptionStatus, trial_ends_at: Option<DateTime<Utc>>) -> SubscriptionSnapshot {
        SubscriptionSnapshot {
            status,
            tier: PlanTier::Standard,
            trial_ends_at,
            current_period_end: None,
        }
    }

    fn inputs(subscription: SubscriptionSnapshot) -> AccessInputs {
        AccessInputs {
            subscription,
            requirements: Vec::new(),
            compliance: Vec::new(),
        }
    }

    #[test]
    fn active_and_verified_is_clear() {
        let now = Utc::now();
        let decision = policy().evaluate(&inputs(subscription(SubscriptionStatus::Active, None)), now);
        assert!(decision.can_access_dashboard);
        assert!(decision.can_receive_jobs);
        assert!(decision.reasons.is_empty());
    }

    #[test]
    fn trial_warning_inside_the_window() {
        let now = Utc::now();
        let decision = policy().evaluate(
            &inputs(subscription(
                SubscriptionStatus::Trialing,
                Some(now + Duration::days(3)),
            )),
            now,
        );
        assert!(decision.can_access_dashboard);
        assert!(decision.can_receive_jobs);
        assert_eq!(decision.reasons.len(), 1);
        assert_eq!(decision.reasons[0].code, "trial_ending_soon");
        assert_eq!(decision.reasons[0].severity, BlockSeverity::Warning);
    }

    #[test]
    fn fresh_trial_has_no_warning() {
        let now = Utc::now();
        let decision = policy().evaluate(
            &inputs(subscription(
                SubscriptionStatus::Trialing,
                Some(now + Duration::days(14)),
            )),
            now,
        );
        assert!(decision.reasons.is_empty());
    }

    #[test]
    fn expired_trial_softens_then_hardens() {
        let now = Utc::now();
        let policy = policy();

        let in_grace = policy.evaluate(
            &inputs(subscription(
                SubscriptionStatus::Expired,
                Some(now - Duration::days(3)),
            )),
            now,
        );
        assert!(in_grace.can_access_dashboard);
        assert!(!in_grace.can_receive_jobs);

        let past_grace = policy.evaluate(
            &inputs(subscription(
                SubscriptionStatus::Expired,
                Some(now - Duration::days(10)),
            )),
            now,
        );
        assert!(!past_grace.can_access_dashboard);
        assert!(!past_grace.can_receive_jobs);
    }

    #[test]
    fn elapsed_but_unswept_trial_counts_as_expired() {
        let now = Utc::now();
        let decision = policy().evaluate(
            &inputs(subscription(
                SubscriptionStatus::Trialing,
                Some(now - Duration::days(1)),
            )),
            now,
        );
        assert!(!decision.can_receive_jobs);
        assert_eq!(decision.reasons[0].code, "trial_expired");
    }

    #[test]
    fn one_domain_never_masks_another() {
        let now = Utc::now();
        let mut inputs = inputs(subscription(SubscriptionStatus::Active, None));
        inputs.requirements.push(RequirementState {
            code: RequirementCode::CuitOwnership,
            required: true,
            approved: false,
            expires_at: None,
        });
        inputs.compliance.push(ComplianceFlag {
            code: "fraud_review".to_string(),
            detail: None,
            active: true,
            flagged_at: now,
        });

        let decision = policy().evaluate(&inputs, now);
        assert_eq!(decision.reasons.len(), 2);
        // Hard compliance block sorts ahead of the soft verification one.
        assert_eq!(decision.reasons[0].domain, PolicyDomain::Compliance);
        assert_eq!(decision.reasons[0].severity, BlockSeverity::Hard);
        assert_eq!(decision.reasons[1].domain, PolicyDomain::Verification);
    }

    #[test]
    fn job_intake_implies_dashboard_access() {
        let now = Utc::now();
        let policy = policy();
        let cases = [
            subscription(SubscriptionStatus::Active, None),
            subscription(SubscriptionStatus::Trialing, Some(now + Duration::days(2))),
            subscription(SubscriptionStatus::Expired, Some(now - Duration::days(3))),
            subscription(SubscriptionStatus::Expired, Some(now - Duration::days(30))),
            subscription(SubscriptionStatus::Cancelled, None),
            subscription(SubscriptionStatus::PastDue, None),
        ];
        for snapshot in cases {
            let decision = policy.evaluate(&inputs(snapshot), now);
            if decision.can_receive_jobs {
                assert!(decision.can_access_dashboard);
            }
        }
    }

    #[test]
    fn inactive_compliance_flags_do_not_block() {
        let now = Utc::now();
        let mut inputs = inputs(subscription(SubscriptionStatus::Active, None));
        inputs.compliance.push(ComplianceFlag {
            code: "resolved_incident".to_string(),
            detail: None,
            active: false,
            flagged_at: now - Duration::days(30),
        });
        assert!(policy().evaluate(&inputs, now).reasons.is_empty());
    }

    #[test]
    fn expired_credential_is_a_hard_block() {
        let now = Utc::now();
        let mut inputs = inputs(subscription(SubscriptionStatus::Active, None));
        inputs.requirements.push(RequirementState {
            code: RequirementCode::CuitOwnership,
            required: true,
            approved: true,
            expires_at: Some(now - Duration::days(1)),
        });
        let decision = policy().evaluate(&inputs, now);
        assert!(!decision.can_access_dashboard);
        assert_eq!(decision.reasons[0].code, "requirement_expired:cuit");
    }
}
