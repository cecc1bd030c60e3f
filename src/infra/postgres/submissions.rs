//! PostgreSQL-backed verification submission store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPool;
use uuid::Uuid;

use crate::domain::{OrgId, SubmissionStatus, VerificationSubmission};
use crate::infra::{Result, SubmissionStore, TrustError};

pub struct PgSubmissionStore {
    pool: PgPool,
}

impl PgSubmissionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_submission(
        row: (
            Uuid,
            Uuid,
            String,
            String,
            String,
            Option<serde_json::Value>,
            Option<String>,
            DateTime<Utc>,
            DateTime<Utc>,
        ),
    ) -> Result<VerificationSubmission> {
        let (id, org_id, requirement, submitted_value, status, evidence, reason, created_at, updated_at) =
            row;
        let requirement = requirement
            .parse()
            .map_err(|_| TrustError::Internal(format!("unknown requirement code in row: {requirement}")))?;
        let status = SubmissionStatus::parse(&status)
            .ok_or_else(|| TrustError::Internal(format!("unknown submission status in row: {status}")))?;
        Ok(VerificationSubmission {
            id,
            org_id: OrgId::from_uuid(org_id),
            requirement,
            submitted_value,
            status,
            evidence,
            reason,
            created_at,
            updated_at,
        })
    }
}

type SubmissionRow = (
    Uuid,
    Uuid,
    String,
    String,
    String,
    Option<serde_json::Value>,
    Option<String>,
    DateTime<Utc>,
    DateTime<Utc>,
);

#[async_trait]
impl SubmissionStore for PgSubmissionStore {
    async fn insert(&self, submission: &VerificationSubmission) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO verification_submissions
                (id, org_id, requirement, submitted_value, status, evidence, reason, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(submission.id)
        .bind(submission.org_id.0)
        .bind(submission.requirement.as_string())
        .bind(&submission.submitted_value)
        .bind(submission.status.as_str())
        .bind(&submission.evidence)
        .bind(&submission.reason)
        .bind(submission.created_at)
        .bind(submission.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<VerificationSubmission>> {
        let row: Option<SubmissionRow> = sqlx::query_as(
            r#"
            SELECT id, org_id, requirement, submitted_value, status, evidence, reason, created_at, updated_at
            FROM verification_submissions
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_submission).transpose()
    }

    async fn update_status(
        &self,
        id: Uuid,
        status: SubmissionStatus,
        reason: &str,
        evidence: Option<serde_json::Value>,
        now: DateTime<Utc>,
    ) -> Result<()> {
        // Terminal statuses are never overwritten; the predicate makes
        // that hold even under concurrent reviewers.
        let result = sqlx::query(
            r#"
            UPDATE verification_submissions
            SET status = $2, reason = $3, evidence = COALESCE($4, evidence), updated_at = $5
            WHERE id = $1 AND status NOT IN ('approved', 'rejected')
            "#,
        )
        .bind(id)
        .bind(status.as_str())
        .bind(reason)
        .bind(&evidence)
        .bind(now)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            let existing = self.get(id).await?;
            return match existing {
                Some(row) => Err(TrustError::InvalidStateTransition {
                    org_id: row.org_id.0,
                    from: row.status.to_string(),
                    to: status.to_string(),
                }),
                None => Err(TrustError::NotFound {
                    what: "submission",
                    id: id.to_string(),
                }),
            };
        }
        Ok(())
    }

    async fn list_for_org(&self, org_id: OrgId) -> Result<Vec<VerificationSubmission>> {
        let rows: Vec<SubmissionRow> = sqlx::query_as(
            r#"
            SELECT id, org_id, requirement, submitted_value, status, evidence, reason, created_at, updated_at
            FROM verification_submissions
            WHERE org_id = $1
            ORDER BY created_at ASC
            "#,
        )
        .bind(org_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_submission).collect()
    }
}
