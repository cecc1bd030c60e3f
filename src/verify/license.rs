//! Professional-license lookup against the registry snapshot.
//!
//! Exact case-insensitive matricula + trade match first; on miss, the
//! matricula alone (the holder may have picked the wrong trade); on a
//! full miss, needs-review with a `not_found` evidence record that
//! carries query provenance so staff can judge snapshot freshness from
//! `scraped_at`. Never mutates the snapshot.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::json;

use crate::domain::{AutoVerifyResult, LicenseRecord, Trade};
use crate::infra::{LicenseSnapshotStore, Result};

/// Registry statuses we accept as a license in good standing.
const ACTIVE_STATUSES: [&str; 3] = ["active", "vigente", "habilitado"];

pub struct LicenseMatcher {
    store: Arc<dyn LicenseSnapshotStore>,
}

impl LicenseMatcher {
    pub fn new(store: Arc<dyn LicenseSnapshotStore>) -> Self {
        Self { store }
    }

    pub async fn lookup(
        &self,
        matricula: &str,
        trade: Trade,
        now: DateTime<Utc>,
    ) -> Result<AutoVerifyResult> {
        let matricula = matricula.trim();
        if matricula.is_empty() {
            return Ok(AutoVerifyResult::reject(
                "matricula is empty",
                json!({ "result": "format_invalid" }),
            ));
        }

        if let Some(record) = self
            .store
            .find_by_matricula_and_trade(matricula, trade)
            .await?
        {
            return Ok(self.resolve_match(&record, matricula, trade));
        }

        // Same matricula under another trade: a human should decide
        // whether the holder picked the wrong registry.
        let other_trades = self.store.find_by_matricula(matricula).await?;
        if let Some(record) = other_trades.first() {
            return Ok(AutoVerifyResult::review(
                format!(
                    "matricula {} is registered for {}, not {}",
                    matricula, record.trade, trade
                ),
                Some(json!({
                    "result": "trade_mismatch",
                    "queried_matricula": matricula,
                    "queried_trade": trade,
                    "found_trade": record.trade,
                    "source": record.source,
                    "scraped_at": record.scraped_at,
                })),
            ));
        }

        let newest = self.store.newest_scraped_at(trade).await?;
        Ok(AutoVerifyResult::review(
            format!("matricula {matricula} not found in the {trade} registry snapshot"),
            Some(json!({
                "result": "not_found",
                "queried_matricula": matricula,
                "queried_trade": trade,
                "queried_at": now,
                "snapshot_newest_scraped_at": newest,
            })),
        ))
    }

    fn resolve_match(
        &self,
        record: &LicenseRecord,
        matricula: &str,
        trade: Trade,
    ) -> AutoVerifyResult {
        let provenance = json!({
            "result": "match",
            "queried_matricula": matricula,
            "queried_trade": trade,
            "matricula": record.matricula,
            "full_name": record.full_name,
            "province": record.province,
            "registry_status": record.status,
            "source": record.source,
            "scraped_at": record.scraped_at,
        });

        let status = record.status.to_ascii_lowercase();
        if ACTIVE_STATUSES.contains(&status.as_str()) {
            AutoVerifyResult::approve(
                format!(
                    "matricula {} verified against {} ({})",
                    record.matricula, record.source, record.status
                ),
                provenance,
            )
        } else {
            // Registered but suspended/lapsed: the registry answer is a
            // fact, whether it disqualifies is a reviewer's call.
            AutoVerifyResult::review(
                format!(
                    "matricula {} found but registry status is '{}'",
                    record.matricula, record.status
                ),
                Some(provenance),
            )
        }
    }
}
