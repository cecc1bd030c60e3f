//! PostgreSQL-backed one-time code challenge store.
//!
//! Gives multi-instance deployments the same atomic attempt counting
//! the in-memory store gives a single process: `begin_attempt` is one
//! `UPDATE ... RETURNING`, so two parallel guesses observe distinct
//! post-increment counts.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPool;

use crate::domain::OtpChallenge;
use crate::infra::{ChallengeStore, Result};

pub struct PgChallengeStore {
    pool: PgPool,
}

impl PgChallengeStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ChallengeStore for PgChallengeStore {
    async fn put(&self, key: &str, challenge: OtpChallenge) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO otp_challenges (subject_key, code_hash, expires_at, attempts, issued_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (subject_key) DO UPDATE
            SET code_hash = EXCLUDED.code_hash,
                expires_at = EXCLUDED.expires_at,
                attempts = EXCLUDED.attempts,
                issued_at = EXCLUDED.issued_at
            "#,
        )
        .bind(key)
        .bind(&challenge.code_hash)
        .bind(challenge.expires_at)
        .bind(challenge.attempts as i32)
        .bind(challenge.issued_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn begin_attempt(&self, key: &str) -> Result<Option<OtpChallenge>> {
        let row: Option<(String, DateTime<Utc>, i32, DateTime<Utc>)> = sqlx::query_as(
            r#"
            UPDATE otp_challenges
            SET attempts = attempts + 1
            WHERE subject_key = $1
            RETURNING code_hash, expires_at, attempts, issued_at
            "#,
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|(code_hash, expires_at, attempts, issued_at)| OtpChallenge {
            code_hash,
            expires_at,
            attempts: attempts as u32,
            issued_at,
        }))
    }

    async fn remove(&self, key: &str) -> Result<()> {
        sqlx::query("DELETE FROM otp_challenges WHERE subject_key = $1")
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query("DELETE FROM otp_challenges WHERE expires_at <= $1")
            .bind(now)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
