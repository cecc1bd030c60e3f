//! Subscription state for organizations, plus the append-only
//! transition log the trial lifecycle writes.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::OrgId;

/// Plan tiers. Trials grant `Standard` (the entry paid tier); expiry
/// downgrades to `Free`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanTier {
    Free,
    Standard,
    Premium,
}

impl PlanTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlanTier::Free => "free",
            PlanTier::Standard => "standard",
            PlanTier::Premium => "premium",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "free" => Some(PlanTier::Free),
            "standard" => Some(PlanTier::Standard),
            "premium" => Some(PlanTier::Premium),
            _ => None,
        }
    }
}

impl fmt::Display for PlanTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Subscription lifecycle states. `Trialing` and `Expired` belong to the
/// trial machine here; `Active`, `PastDue` and `Cancelled` are written
/// by the billing collaborator and consumed as inputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Trialing,
    Active,
    Expired,
    Cancelled,
    PastDue,
}

impl SubscriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::Trialing => "trialing",
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::Expired => "expired",
            SubscriptionStatus::Cancelled => "cancelled",
            SubscriptionStatus::PastDue => "past_due",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "trialing" => Some(SubscriptionStatus::Trialing),
            "active" => Some(SubscriptionStatus::Active),
            "expired" => Some(SubscriptionStatus::Expired),
            "cancelled" => Some(SubscriptionStatus::Cancelled),
            "past_due" => Some(SubscriptionStatus::PastDue),
            _ => None,
        }
    }
}

impl fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One organization's subscription row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrganizationSubscription {
    pub org_id: OrgId,
    pub tier: PlanTier,
    pub status: SubscriptionStatus,
    /// Set while trialing; cleared on conversion.
    pub trial_ends_at: Option<DateTime<Utc>>,
    pub current_period_start: Option<DateTime<Utc>>,
    pub current_period_end: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl OrganizationSubscription {
    /// Whether the trial clock has run out (regardless of whether the
    /// sweep has recorded the transition yet).
    pub fn trial_elapsed(&self, now: DateTime<Utc>) -> bool {
        matches!(self.status, SubscriptionStatus::Trialing)
            && self.trial_ends_at.is_some_and(|t| t <= now)
    }
}

/// Why a subscription transitioned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionCause {
    TrialStarted,
    TrialExpired,
    TrialConverted,
}

impl TransitionCause {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransitionCause::TrialStarted => "trial_started",
            TransitionCause::TrialExpired => "trial_expired",
            TransitionCause::TrialConverted => "trial_converted",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "trial_started" => Some(TransitionCause::TrialStarted),
            "trial_expired" => Some(TransitionCause::TrialExpired),
            "trial_converted" => Some(TransitionCause::TrialConverted),
            _ => None,
        }
    }
}

impl fmt::Display for TransitionCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable audit record, appended on every lifecycle transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscriptionEvent {
    pub id: Uuid,
    pub org_id: OrgId,
    pub from_status: SubscriptionStatus,
    pub to_status: SubscriptionStatus,
    pub cause: TransitionCause,
    pub at: DateTime<Utc>,
}

impl SubscriptionEvent {
    pub fn new(
        org_id: OrgId,
        from_status: SubscriptionStatus,
        to_status: SubscriptionStatus,
        cause: TransitionCause,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            org_id,
            from_status,
            to_status,
            cause,
            at,
        }
    }
}
