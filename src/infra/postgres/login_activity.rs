//! PostgreSQL-backed login activity store.
//!
//! Attempts are append-only. The check-and-lock unit runs inside a
//! transaction holding a per-identifier advisory lock, so two parallel
//! failures on different instances cannot both observe a sub-threshold
//! count.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPool;

use crate::domain::{IdentifierKind, LoginAttempt, LoginLockout};
use crate::infra::{FailureOutcome, LoginActivityStore, Result, TrustError};

pub struct PgLoginActivityStore {
    pool: PgPool,
}

impl PgLoginActivityStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LoginActivityStore for PgLoginActivityStore {
    async fn register_failure(
        &self,
        identifier: &str,
        kind: IdentifierKind,
        now: DateTime<Utc>,
        window_start: DateTime<Utc>,
        threshold: u32,
        locked_until: DateTime<Utc>,
    ) -> Result<FailureOutcome> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
            .bind(identifier)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            r#"
            INSERT INTO login_attempts (identifier, kind, success, at)
            VALUES ($1, $2, FALSE, $3)
            "#,
        )
        .bind(identifier)
        .bind(kind.as_str())
        .bind(now)
        .execute(&mut *tx)
        .await?;

        // Failures in the rolling window, not counting anything before
        // the most recent success.
        let (failures,): (i64,) = sqlx::query_as(
            r#"
            SELECT COUNT(*)
            FROM login_attempts
            WHERE identifier = $1
              AND success = FALSE
              AND at >= $2
              AND at > COALESCE(
                    (SELECT MAX(at) FROM login_attempts WHERE identifier = $1 AND success),
                    'epoch'::timestamptz)
            "#,
        )
        .bind(identifier)
        .bind(window_start)
        .fetch_one(&mut *tx)
        .await?;

        let failures = failures as u32;
        let lockout = if failures >= threshold {
            sqlx::query(
                r#"
                INSERT INTO login_lockouts (identifier, locked_at, locked_until)
                VALUES ($1, $2, $3)
                ON CONFLICT (identifier)
                DO UPDATE SET locked_at = $2, locked_until = $3
                "#,
            )
            .bind(identifier)
            .bind(now)
            .bind(locked_until)
            .execute(&mut *tx)
            .await?;
            Some(LoginLockout {
                identifier: identifier.to_string(),
                locked_at: now,
                locked_until,
            })
        } else {
            None
        };

        tx.commit().await?;
        Ok(FailureOutcome { failures, lockout })
    }

    async fn register_success(
        &self,
        identifier: &str,
        kind: IdentifierKind,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO login_attempts (identifier, kind, success, at)
            VALUES ($1, $2, TRUE, $3)
            "#,
        )
        .bind(identifier)
        .bind(kind.as_str())
        .bind(now)
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM login_lockouts WHERE identifier = $1")
            .bind(identifier)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn lockout(&self, identifier: &str) -> Result<Option<LoginLockout>> {
        let row: Option<(DateTime<Utc>, DateTime<Utc>)> = sqlx::query_as(
            r#"
            SELECT locked_at, locked_until
            FROM login_lockouts
            WHERE identifier = $1
            "#,
        )
        .bind(identifier)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|(locked_at, locked_until)| LoginLockout {
            identifier: identifier.to_string(),
            locked_at,
            locked_until,
        }))
    }

    async fn failures_since(&self, identifier: &str, since: DateTime<Utc>) -> Result<u32> {
        let (failures,): (i64,) = sqlx::query_as(
            r#"
            SELECT COUNT(*)
            FROM login_attempts
            WHERE identifier = $1
              AND success = FALSE
              AND at >= $2
              AND at > COALESCE(
                    (SELECT MAX(at) FROM login_attempts WHERE identifier = $1 AND success),
                    'epoch'::timestamptz)
            "#,
        )
        .bind(identifier)
        .bind(since)
        .fetch_one(&self.pool)
        .await?;

        Ok(failures as u32)
    }

    async fn attempts_for(&self, identifier: &str) -> Result<Vec<LoginAttempt>> {
        let rows: Vec<(String, String, bool, DateTime<Utc>)> = sqlx::query_as(
            r#"
            SELECT identifier, kind, success, at
            FROM login_attempts
            WHERE identifier = $1
            ORDER BY at ASC
            "#,
        )
        .bind(identifier)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|(identifier, kind, success, at)| {
                let kind = IdentifierKind::parse(&kind).ok_or_else(|| {
                    TrustError::Internal(format!("unknown identifier kind in row: {kind}"))
                })?;
                Ok(LoginAttempt {
                    identifier,
                    kind,
                    success,
                    at,
                })
            })
            .collect()
    }
}
