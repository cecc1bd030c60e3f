//! PostgreSQL-backed refresh token store.
//!
//! Only salted hashes are stored. Rotation is one transaction: the old
//! record is revoked and marked superseded, the new one inserted, and
//! either both land or neither does.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPool;
use uuid::Uuid;

use crate::domain::{OrgId, PrincipalId, RefreshTokenRecord, SessionMeta};
use crate::infra::{RefreshTokenStore, Result, TrustError};

pub struct PgRefreshTokenStore {
    pool: PgPool,
}

impl PgRefreshTokenStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

type TokenRow = (
    Uuid,
    Uuid,
    Uuid,
    String,
    String,
    DateTime<Utc>,
    DateTime<Utc>,
    Option<DateTime<Utc>>,
    Option<Uuid>,
    Option<String>,
    Option<String>,
);

fn row_to_record(row: TokenRow) -> RefreshTokenRecord {
    let (id, principal, org, token_hash, salt, issued_at, expires_at, revoked_at, superseded_by, user_agent, ip) =
        row;
    RefreshTokenRecord {
        id,
        principal: PrincipalId::from_uuid(principal),
        org: OrgId::from_uuid(org),
        token_hash,
        salt,
        issued_at,
        expires_at,
        revoked_at,
        superseded_by,
        session: SessionMeta { user_agent, ip },
    }
}

#[async_trait]
impl RefreshTokenStore for PgRefreshTokenStore {
    async fn insert(&self, record: &RefreshTokenRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO refresh_tokens
                (id, principal_id, org_id, token_hash, salt, issued_at, expires_at, revoked_at, superseded_by, user_agent, ip)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(record.id)
        .bind(record.principal.0)
        .bind(record.org.0)
        .bind(&record.token_hash)
        .bind(&record.salt)
        .bind(record.issued_at)
        .bind(record.expires_at)
        .bind(record.revoked_at)
        .bind(record.superseded_by)
        .bind(&record.session.user_agent)
        .bind(&record.session.ip)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<RefreshTokenRecord>> {
        let row: Option<TokenRow> = sqlx::query_as(
            r#"
            SELECT id, principal_id, org_id, token_hash, salt, issued_at, expires_at, revoked_at, superseded_by, user_agent, ip
            FROM refresh_tokens
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(row_to_record))
    }

    async fn rotate(
        &self,
        old_id: Uuid,
        new_record: &RefreshTokenRecord,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            UPDATE refresh_tokens
            SET revoked_at = $2, superseded_by = $3
            WHERE id = $1 AND revoked_at IS NULL
            "#,
        )
        .bind(old_id)
        .bind(now)
        .bind(new_record.id)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            // Already revoked or missing; the caller's replay check runs
            // outside the transaction, so this is the race backstop.
            return Err(TrustError::Revoked(format!("refresh token {old_id}")));
        }

        sqlx::query(
            r#"
            INSERT INTO refresh_tokens
                (id, principal_id, org_id, token_hash, salt, issued_at, expires_at, revoked_at, superseded_by, user_agent, ip)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(new_record.id)
        .bind(new_record.principal.0)
        .bind(new_record.org.0)
        .bind(&new_record.token_hash)
        .bind(&new_record.salt)
        .bind(new_record.issued_at)
        .bind(new_record.expires_at)
        .bind(new_record.revoked_at)
        .bind(new_record.superseded_by)
        .bind(&new_record.session.user_agent)
        .bind(&new_record.session.ip)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn live_for_principal(
        &self,
        principal: PrincipalId,
        now: DateTime<Utc>,
    ) -> Result<Vec<RefreshTokenRecord>> {
        let rows: Vec<TokenRow> = sqlx::query_as(
            r#"
            SELECT id, principal_id, org_id, token_hash, salt, issued_at, expires_at, revoked_at, superseded_by, user_agent, ip
            FROM refresh_tokens
            WHERE principal_id = $1 AND revoked_at IS NULL AND expires_at > $2
            ORDER BY issued_at ASC
            "#,
        )
        .bind(principal.0)
        .bind(now)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(row_to_record).collect())
    }

    async fn revoke(&self, id: Uuid, now: DateTime<Utc>) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE refresh_tokens SET revoked_at = $2
            WHERE id = $1 AND revoked_at IS NULL
            "#,
        )
        .bind(id)
        .bind(now)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(TrustError::NotFound {
                what: "refresh token",
                id: id.to_string(),
            });
        }
        Ok(())
    }

    async fn revoke_all(&self, principal: PrincipalId, now: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE refresh_tokens SET revoked_at = $2
            WHERE principal_id = $1 AND revoked_at IS NULL AND expires_at > $2
            "#,
        )
        .bind(principal.0)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}
