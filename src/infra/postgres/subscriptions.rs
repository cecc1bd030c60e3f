//! PostgreSQL-backed subscription store with its append-only event log.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPool;
use uuid::Uuid;

use crate::domain::{
    OrgId, OrganizationSubscription, PlanTier, SubscriptionEvent, SubscriptionStatus,
    TransitionCause,
};
use crate::infra::{Result, SubscriptionStore, TrustError};

pub struct PgSubscriptionStore {
    pool: PgPool,
}

impl PgSubscriptionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

type SubscriptionRow = (
    Uuid,
    String,
    String,
    Option<DateTime<Utc>>,
    Option<DateTime<Utc>>,
    Option<DateTime<Utc>>,
    DateTime<Utc>,
    DateTime<Utc>,
);

fn row_to_subscription(row: SubscriptionRow) -> Result<OrganizationSubscription> {
    let (org_id, tier, status, trial_ends_at, period_start, period_end, created_at, updated_at) = row;
    let tier = PlanTier::parse(&tier)
        .ok_or_else(|| TrustError::Internal(format!("unknown plan tier in row: {tier}")))?;
    let status = SubscriptionStatus::parse(&status)
        .ok_or_else(|| TrustError::Internal(format!("unknown subscription status in row: {status}")))?;
    Ok(OrganizationSubscription {
        org_id: OrgId::from_uuid(org_id),
        tier,
        status,
        trial_ends_at,
        current_period_start: period_start,
        current_period_end: period_end,
        created_at,
        updated_at,
    })
}

#[async_trait]
impl SubscriptionStore for PgSubscriptionStore {
    async fn insert(&self, subscription: &OrganizationSubscription) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO organization_subscriptions
                (org_id, tier, status, trial_ends_at, current_period_start, current_period_end, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(subscription.org_id.0)
        .bind(subscription.tier.as_str())
        .bind(subscription.status.as_str())
        .bind(subscription.trial_ends_at)
        .bind(subscription.current_period_start)
        .bind(subscription.current_period_end)
        .bind(subscription.created_at)
        .bind(subscription.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get(&self, org_id: OrgId) -> Result<Option<OrganizationSubscription>> {
        let row: Option<SubscriptionRow> = sqlx::query_as(
            r#"
            SELECT org_id, tier, status, trial_ends_at, current_period_start, current_period_end, created_at, updated_at
            FROM organization_subscriptions
            WHERE org_id = $1
            "#,
        )
        .bind(org_id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.map(row_to_subscription).transpose()
    }

    async fn transition(
        &self,
        subscription: &OrganizationSubscription,
        event: &SubscriptionEvent,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            UPDATE organization_subscriptions
            SET tier = $2, status = $3, trial_ends_at = $4,
                current_period_start = $5, current_period_end = $6, updated_at = $7
            WHERE org_id = $1
            "#,
        )
        .bind(subscription.org_id.0)
        .bind(subscription.tier.as_str())
        .bind(subscription.status.as_str())
        .bind(subscription.trial_ends_at)
        .bind(subscription.current_period_start)
        .bind(subscription.current_period_end)
        .bind(subscription.updated_at)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO subscription_events (id, org_id, from_status, to_status, cause, at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(event.id)
        .bind(event.org_id.0)
        .bind(event.from_status.as_str())
        .bind(event.to_status.as_str())
        .bind(event.cause.as_str())
        .bind(event.at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn due_for_expiry(&self, now: DateTime<Utc>) -> Result<Vec<OrganizationSubscription>> {
        let rows: Vec<SubscriptionRow> = sqlx::query_as(
            r#"
            SELECT org_id, tier, status, trial_ends_at, current_period_start, current_period_end, created_at, updated_at
            FROM organization_subscriptions
            WHERE status = 'trialing' AND trial_ends_at <= $1
            "#,
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(row_to_subscription).collect()
    }

    async fn events_for(&self, org_id: OrgId) -> Result<Vec<SubscriptionEvent>> {
        let rows: Vec<(Uuid, Uuid, String, String, String, DateTime<Utc>)> = sqlx::query_as(
            r#"
            SELECT id, org_id, from_status, to_status, cause, at
            FROM subscription_events
            WHERE org_id = $1
            ORDER BY at ASC
            "#,
        )
        .bind(org_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|(id, org_id, from_status, to_status, cause, at)| {
                let from_status = SubscriptionStatus::parse(&from_status).ok_or_else(|| {
                    TrustError::Internal(format!("unknown status in event row: {from_status}"))
                })?;
                let to_status = SubscriptionStatus::parse(&to_status).ok_or_else(|| {
                    TrustError::Internal(format!("unknown status in event row: {to_status}"))
                })?;
                let cause = TransitionCause::parse(&cause).ok_or_else(|| {
                    TrustError::Internal(format!("unknown cause in event row: {cause}"))
                })?;
                Ok(SubscriptionEvent {
                    id,
                    org_id: OrgId::from_uuid(org_id),
                    from_status,
                    to_status,
                    cause,
                    at,
                })
            })
            .collect()
    }
}
