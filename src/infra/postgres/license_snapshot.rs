//! Read-only view over the `license_snapshot` table the registry
//! scraper refreshes.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPool;

use crate::domain::{LicenseRecord, Trade};
use crate::infra::{LicenseSnapshotStore, Result, TrustError};

pub struct PgLicenseSnapshotStore {
    pool: PgPool,
}

impl PgLicenseSnapshotStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

type LicenseRow = (String, String, String, String, String, String, DateTime<Utc>);

fn row_to_record(row: LicenseRow) -> Result<LicenseRecord> {
    let (matricula, trade, province, full_name, source, status, scraped_at) = row;
    let trade = trade
        .parse()
        .map_err(|_| TrustError::Internal(format!("unknown trade in snapshot row: {trade}")))?;
    Ok(LicenseRecord {
        matricula,
        trade,
        province,
        full_name,
        source,
        status,
        scraped_at,
    })
}

#[async_trait]
impl LicenseSnapshotStore for PgLicenseSnapshotStore {
    async fn find_by_matricula(&self, matricula: &str) -> Result<Vec<LicenseRecord>> {
        let rows: Vec<LicenseRow> = sqlx::query_as(
            r#"
            SELECT matricula, trade, province, full_name, source, status, scraped_at
            FROM license_snapshot
            WHERE LOWER(matricula) = LOWER($1)
            "#,
        )
        .bind(matricula)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(row_to_record).collect()
    }

    async fn find_by_matricula_and_trade(
        &self,
        matricula: &str,
        trade: Trade,
    ) -> Result<Option<LicenseRecord>> {
        let row: Option<LicenseRow> = sqlx::query_as(
            r#"
            SELECT matricula, trade, province, full_name, source, status, scraped_at
            FROM license_snapshot
            WHERE LOWER(matricula) = LOWER($1) AND trade = $2
            "#,
        )
        .bind(matricula)
        .bind(trade.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(row_to_record).transpose()
    }

    async fn newest_scraped_at(&self, trade: Trade) -> Result<Option<DateTime<Utc>>> {
        let row: Option<(Option<DateTime<Utc>>,)> = sqlx::query_as(
            r#"
            SELECT MAX(scraped_at) FROM license_snapshot WHERE trade = $1
            "#,
        )
        .bind(trade.as_str())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.and_then(|(max,)| max))
    }
}
