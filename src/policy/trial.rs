//! Trial lifecycle: start, sweep-to-expired, convert.
//!
//! Trials grant the Standard tier for 21 days. Expiry is recorded by a
//! periodic sweep rather than computed-on-read, so the transition log
//! is the source of truth; the access policy still treats an elapsed
//! but unswept trial as expired. Every transition appends an immutable
//! event in the same atomic unit as the row update.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::info;

use crate::config::TrustConfig;
use crate::domain::{
    OrgId, OrganizationSubscription, PlanTier, SubscriptionEvent, SubscriptionStatus,
    TransitionCause,
};
use crate::infra::{Result, SubscriptionStore, TrustError};

pub struct TrialLifecycle {
    store: Arc<dyn SubscriptionStore>,
    config: TrustConfig,
}

impl TrialLifecycle {
    pub fn new(store: Arc<dyn SubscriptionStore>, config: TrustConfig) -> Self {
        Self { store, config }
    }

    /// Start a trial for an organization that has never had a
    /// subscription. One subscription per organization; an existing row
    /// of any status refuses the start.
    pub async fn start_trial_at(
        &self,
        org_id: OrgId,
        now: DateTime<Utc>,
    ) -> Result<OrganizationSubscription> {
        if let Some(existing) = self.store.get(org_id).await? {
            return Err(TrustError::InvalidStateTransition {
                org_id: org_id.0,
                from: existing.status.to_string(),
                to: SubscriptionStatus::Trialing.to_string(),
            });
        }

        let subscription = OrganizationSubscription {
            org_id,
            tier: PlanTier::Standard,
            status: SubscriptionStatus::Trialing,
            trial_ends_at: Some(now + self.config.trial_length),
            current_period_start: None,
            current_period_end: None,
            created_at: now,
            updated_at: now,
        };
        self.store.insert(&subscription).await?;
        self.store
            .transition(
                &subscription,
                &SubscriptionEvent::new(
                    org_id,
                    SubscriptionStatus::Trialing,
                    SubscriptionStatus::Trialing,
                    TransitionCause::TrialStarted,
                    now,
                ),
            )
            .await?;

        info!(org = %org_id, ends = %subscription.trial_ends_at.unwrap(), "trial started");
        Ok(subscription)
    }

    /// Sweep every trial whose clock has run out into `Expired` on the
    /// `Free` tier. Idempotent: an already-expired row is no longer
    /// trialing and will not be picked up again.
    pub async fn expire_due_at(&self, now: DateTime<Utc>) -> Result<Vec<OrgId>> {
        let due = self.store.due_for_expiry(now).await?;
        let mut expired = Vec::with_capacity(due.len());

        for mut subscription in due {
            let from = subscription.status;
            subscription.status = SubscriptionStatus::Expired;
            subscription.tier = PlanTier::Free;
            subscription.updated_at = now;

            self.store
                .transition(
                    &subscription,
                    &SubscriptionEvent::new(
                        subscription.org_id,
                        from,
                        SubscriptionStatus::Expired,
                        TransitionCause::TrialExpired,
                        now,
                    ),
                )
                .await?;
            info!(org = %subscription.org_id, "trial expired");
            expired.push(subscription.org_id);
        }

        Ok(expired)
    }

    /// Convert a trial (running or already expired) into a paid
    /// subscription. Any other starting state is a refused transition.
    pub async fn convert_at(
        &self,
        org_id: OrgId,
        tier: PlanTier,
        now: DateTime<Utc>,
    ) -> Result<OrganizationSubscription> {
        let mut subscription = self.store.get(org_id).await?.ok_or(TrustError::NotFound {
            what: "subscription",
            id: org_id.to_string(),
        })?;

        let from = subscription.status;
        if !matches!(
            from,
            SubscriptionStatus::Trialing | SubscriptionStatus::Expired
        ) {
            return Err(TrustError::InvalidStateTransition {
                org_id: org_id.0,
                from: from.to_string(),
                to: SubscriptionStatus::Active.to_string(),
            });
        }

        subscription.status = SubscriptionStatus::Active;
        subscription.tier = tier;
        subscription.trial_ends_at = None;
        subscription.current_period_start = Some(now);
        subscription.updated_at = now;

        self.store
            .transition(
                &subscription,
                &SubscriptionEvent::new(
                    org_id,
                    from,
                    SubscriptionStatus::Active,
                    TransitionCause::TrialConverted,
                    now,
                ),
            )
            .await?;

        info!(org = %org_id, tier = %tier, "trial converted");
        Ok(subscription)
    }

    pub async fn get(&self, org_id: OrgId) -> Result<Option<OrganizationSubscription>> {
        self.store.get(org_id).await
    }

    pub async fn events_for(&self, org_id: OrgId) -> Result<Vec<SubscriptionEvent>> {
        self.store.events_for(org_id).await
    }
}
