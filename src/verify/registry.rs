//! Client for the AFIP-like taxpayer registry.
//!
//! Only invoked after a [`Cuit`] has parsed, so malformed input never
//! costs an external call. The lookup never fails across this boundary:
//! timeouts, transport faults, and 5xx answers become
//! [`TaxpayerLookup::Unavailable`], which the router maps to
//! needs-review, never to silent approval.

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::domain::Cuit;

use super::activity::ActivityCode;

/// Registered fiscal address, as the authority has it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FiscalAddress {
    pub street: String,
    pub city: String,
    pub province: String,
    pub postal_code: String,
}

/// What the authority knows about a taxpayer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaxpayerInfo {
    pub legal_name: String,
    /// Authority-owned vocabulary ("monotributo", "responsable_inscripto", …).
    pub tax_category: String,
    pub active: bool,
    pub activities: Vec<ActivityCode>,
    pub fiscal_address: Option<FiscalAddress>,
}

/// Outcome of a registry lookup. A closed set: callers match it
/// exhaustively instead of catching exceptions.
#[derive(Debug, Clone)]
pub enum TaxpayerLookup {
    Found(TaxpayerInfo),
    NotFound,
    Unavailable { reason: String },
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait TaxRegistryClient: Send + Sync {
    async fn lookup(&self, cuit: &Cuit) -> TaxpayerLookup;
}

/// HTTP client for the padron-style lookup service.
pub struct AfipPadronClient {
    http: reqwest::Client,
    base_url: String,
}

/// Wire shape of the upstream answer.
#[derive(Debug, Deserialize)]
struct PadronResponse {
    #[serde(rename = "razonSocial")]
    legal_name: String,
    #[serde(rename = "categoria")]
    tax_category: String,
    #[serde(rename = "estadoActivo")]
    active: bool,
    #[serde(rename = "actividades", default)]
    activities: Vec<String>,
    #[serde(rename = "domicilioFiscal")]
    fiscal_address: Option<PadronAddress>,
}

#[derive(Debug, Deserialize)]
struct PadronAddress {
    #[serde(rename = "calle")]
    street: String,
    #[serde(rename = "localidad")]
    city: String,
    #[serde(rename = "provincia")]
    province: String,
    #[serde(rename = "codigoPostal")]
    postal_code: String,
}

impl AfipPadronClient {
    /// `timeout` bounds every request; on expiry the lookup degrades to
    /// `Unavailable` rather than hanging the submission.
    pub fn new(base_url: impl Into<String>, timeout: std::time::Duration) -> Self {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();
        Self {
            http,
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl TaxRegistryClient for AfipPadronClient {
    async fn lookup(&self, cuit: &Cuit) -> TaxpayerLookup {
        let url = format!("{}/persona/{}", self.base_url, cuit.as_digits());

        let response = match self.http.get(&url).send().await {
            Ok(response) => response,
            Err(e) => {
                warn!(cuit = %cuit, error = %e, "tax registry unreachable");
                return TaxpayerLookup::Unavailable {
                    reason: if e.is_timeout() {
                        "registry request timed out".to_string()
                    } else {
                        "registry unreachable".to_string()
                    },
                };
            }
        };

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return TaxpayerLookup::NotFound;
        }
        if !response.status().is_success() {
            warn!(cuit = %cuit, status = %response.status(), "tax registry error answer");
            return TaxpayerLookup::Unavailable {
                reason: format!("registry answered {}", response.status()),
            };
        }

        match response.json::<PadronResponse>().await {
            Ok(body) => TaxpayerLookup::Found(TaxpayerInfo {
                legal_name: body.legal_name,
                tax_category: body.tax_category,
                active: body.active,
                activities: body.activities.into_iter().map(ActivityCode::new).collect(),
                fiscal_address: body.fiscal_address.map(|a| FiscalAddress {
                    street: a.street,
                    city: a.city,
                    province: a.province,
                    postal_code: a.postal_code,
                }),
            }),
            Err(e) => {
                warn!(cuit = %cuit, error = %e, "tax registry answer did not parse");
                TaxpayerLookup::Unavailable {
                    reason: "registry answer did not parse".to_string(),
                }
            }
        }
    }
}
