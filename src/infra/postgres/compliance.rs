//! Read-only view over compliance flags; flag management belongs to an
//! external collaborator.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPool;

use crate::domain::{ComplianceFlag, OrgId};
use crate::infra::{ComplianceStore, Result};

pub struct PgComplianceStore {
    pool: PgPool,
}

impl PgComplianceStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ComplianceStore for PgComplianceStore {
    async fn active_flags(&self, org_id: OrgId) -> Result<Vec<ComplianceFlag>> {
        let rows: Vec<(String, Option<String>, bool, DateTime<Utc>)> = sqlx::query_as(
            r#"
            SELECT code, detail, active, flagged_at
            FROM compliance_flags
            WHERE org_id = $1 AND active
            ORDER BY flagged_at ASC
            "#,
        )
        .bind(org_id.0)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(code, detail, active, flagged_at)| ComplianceFlag {
                code,
                detail,
                active,
                flagged_at,
            })
            .collect())
    }
}
