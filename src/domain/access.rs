//! Access decisions and the snapshots they are computed from.
//!
//! A decision is computed on demand and never persisted. The three
//! input snapshots come from independent domains (billing, verification,
//! compliance); the aggregator in `policy::access` combines them without
//! letting one domain mask another's reasons.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{
    PlanTier, RequirementCode, SubscriptionStatus,
};

/// Which domain produced a block reason. Declaration order is the
/// presentation order within a severity band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyDomain {
    Subscription,
    Verification,
    Compliance,
}

/// Graduated restriction levels. `Hard` removes the dashboard; `Soft`
/// suspends new work intake while existing work continues; `Warning`
/// only surfaces a banner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockSeverity {
    Hard,
    Soft,
    Warning,
}

/// One reason an organization's access is restricted. The full list is
/// always returned; nothing is truncated because another domain also
/// blocks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockReason {
    pub domain: PolicyDomain,
    pub severity: BlockSeverity,
    /// Stable machine code (`trial_expired`, `requirement_missing:cuit`).
    pub code: String,
    /// Human-readable explanation.
    pub message: String,
    /// Where the user can fix it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remediation: Option<String>,
}

/// The computed gate for one organization at one instant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessDecision {
    /// False iff any hard block is present.
    pub can_access_dashboard: bool,
    /// False iff any soft or hard block is present (stricter: ongoing
    /// jobs continue, new intake stops).
    pub can_receive_jobs: bool,
    /// Every active reason across every domain, ordered by severity
    /// then domain.
    pub reasons: Vec<BlockReason>,
}

impl AccessDecision {
    /// Unrestricted access, no reasons.
    pub fn clear() -> Self {
        Self {
            can_access_dashboard: true,
            can_receive_jobs: true,
            reasons: Vec::new(),
        }
    }

    pub fn hard_blocks(&self) -> impl Iterator<Item = &BlockReason> {
        self.reasons
            .iter()
            .filter(|r| r.severity == BlockSeverity::Hard)
    }

    pub fn soft_blocks(&self) -> impl Iterator<Item = &BlockReason> {
        self.reasons
            .iter()
            .filter(|r| r.severity == BlockSeverity::Soft)
    }
}

/// Billing-domain input: the subscription as the store currently has it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscriptionSnapshot {
    pub status: SubscriptionStatus,
    pub tier: PlanTier,
    pub trial_ends_at: Option<DateTime<Utc>>,
    pub current_period_end: Option<DateTime<Utc>>,
}

impl From<&crate::domain::OrganizationSubscription> for SubscriptionSnapshot {
    fn from(sub: &crate::domain::OrganizationSubscription) -> Self {
        Self {
            status: sub.status,
            tier: sub.tier,
            trial_ends_at: sub.trial_ends_at,
            current_period_end: sub.current_period_end,
        }
    }
}

/// Verification-domain input: one row per configured requirement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequirementState {
    pub code: RequirementCode,
    pub required: bool,
    /// Whether an approved submission exists for this requirement.
    pub approved: bool,
    /// Expiry of the approved credential, when it has one (licenses,
    /// insurance documents).
    pub expires_at: Option<DateTime<Utc>>,
}

impl RequirementState {
    pub fn missing(&self) -> bool {
        self.required && !self.approved
    }

    pub fn expired(&self, now: DateTime<Utc>) -> bool {
        self.required && self.approved && self.expires_at.is_some_and(|t| t <= now)
    }
}

/// Compliance-domain input, owned by an external collaborator; any
/// active flag is a hard block with no softer tier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComplianceFlag {
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    pub active: bool,
    pub flagged_at: DateTime<Utc>,
}

/// Everything [`crate::policy::AccessPolicy::evaluate`] needs; callers
/// assemble it from the stores.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessInputs {
    pub subscription: SubscriptionSnapshot,
    pub requirements: Vec<RequirementState>,
    pub compliance: Vec<ComplianceFlag>,
}
