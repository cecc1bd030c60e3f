//! Verification requirements, submissions, and normalized results.
//!
//! A requirement describes one credential check an organization must
//! pass (tax ID, professional license, phone ownership). A submission is
//! one attempt at satisfying a requirement. The router turns submissions
//! into [`AutoVerifyResult`]s; everything user-visible carries a
//! human-readable reason next to the machine outcome.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::OrgId;

/// Which automatic verifier a requirement routes to. `Manual` (stored as
/// `none`) means no verifier claims it and a reviewer must decide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AutoVerifySource {
    Afip,
    Sms,
    Email,
    Registry,
    #[serde(rename = "none")]
    Manual,
}

impl AutoVerifySource {
    pub fn as_str(&self) -> &'static str {
        match self {
            AutoVerifySource::Afip => "afip",
            AutoVerifySource::Sms => "sms",
            AutoVerifySource::Email => "email",
            AutoVerifySource::Registry => "registry",
            AutoVerifySource::Manual => "none",
        }
    }
}

impl fmt::Display for AutoVerifySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A licensed trade with its own professional registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trade {
    Gas,
    Electrical,
    Plumbing,
    Refrigeration,
}

impl Trade {
    pub fn as_str(&self) -> &'static str {
        match self {
            Trade::Gas => "gas",
            Trade::Electrical => "electrical",
            Trade::Plumbing => "plumbing",
            Trade::Refrigeration => "refrigeration",
        }
    }

    pub const ALL: [Trade; 4] = [
        Trade::Gas,
        Trade::Electrical,
        Trade::Plumbing,
        Trade::Refrigeration,
    ];
}

impl fmt::Display for Trade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Trade {
    type Err = UnknownCode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "gas" => Ok(Trade::Gas),
            "electrical" => Ok(Trade::Electrical),
            "plumbing" => Ok(Trade::Plumbing),
            "refrigeration" => Ok(Trade::Refrigeration),
            _ => Err(UnknownCode(s.to_string())),
        }
    }
}

/// Error for requirement/trade codes the engine does not know.
///
/// An unknown code is not an internal fault: the router maps it to
/// needs-review instead of guessing.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown code: {0}")]
pub struct UnknownCode(pub String);

/// The closed set of credential checks the engine can run.
///
/// Being an enum (rather than string dispatch) means a newly added check
/// is a compile-time exhaustiveness error in the router, not a silently
/// unmatched branch at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequirementCode {
    /// CUIT format + checksum + registry existence.
    CuitOwnership,
    /// CUIL: same checksum, worker identifier.
    CuilOwnership,
    /// Taxpayer must be registered AND active with the authority.
    AfipActiveStatus,
    /// Declared activity codes must match the service taxonomy.
    ActivityMatch,
    /// Fiscal address on file with the authority.
    FiscalAddress,
    /// Matricula lookup in the trade's registry snapshot.
    ProfessionalLicense(Trade),
    /// One-time code to the declared phone number.
    PhoneOwnership,
    /// One-time code to the declared email address.
    EmailOwnership,
}

impl RequirementCode {
    pub fn as_string(&self) -> String {
        match self {
            RequirementCode::CuitOwnership => "cuit".to_string(),
            RequirementCode::CuilOwnership => "cuil".to_string(),
            RequirementCode::AfipActiveStatus => "afip_active".to_string(),
            RequirementCode::ActivityMatch => "activity_match".to_string(),
            RequirementCode::FiscalAddress => "fiscal_address".to_string(),
            RequirementCode::ProfessionalLicense(trade) => format!("license_{trade}"),
            RequirementCode::PhoneOwnership => "phone".to_string(),
            RequirementCode::EmailOwnership => "email".to_string(),
        }
    }
}

impl fmt::Display for RequirementCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_string())
    }
}

impl FromStr for RequirementCode {
    type Err = UnknownCode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cuit" => Ok(RequirementCode::CuitOwnership),
            "cuil" => Ok(RequirementCode::CuilOwnership),
            "afip_active" => Ok(RequirementCode::AfipActiveStatus),
            "activity_match" => Ok(RequirementCode::ActivityMatch),
            "fiscal_address" => Ok(RequirementCode::FiscalAddress),
            "phone" => Ok(RequirementCode::PhoneOwnership),
            "email" => Ok(RequirementCode::EmailOwnership),
            other => match other.strip_prefix("license_") {
                Some(trade) => Ok(RequirementCode::ProfessionalLicense(trade.parse()?)),
                None => Err(UnknownCode(other.to_string())),
            },
        }
    }
}

impl Serialize for RequirementCode {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.as_string())
    }
}

impl<'de> Deserialize<'de> for RequirementCode {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Broad grouping used for presentation and tier bundles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequirementCategory {
    Identity,
    Fiscal,
    Professional,
    Contact,
}

/// One credential check in the catalog. Configuration: created at
/// bootstrap, rarely mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationRequirement {
    pub code: RequirementCode,
    pub category: RequirementCategory,
    /// Capability level this check belongs to (1 = entry bundle).
    pub tier: u8,
    /// Required checks gate access; optional ones only add badges.
    pub required: bool,
    pub source: AutoVerifySource,
}

/// The configured set of requirements, looked up by code.
#[derive(Debug, Clone, Default)]
pub struct RequirementCatalog {
    entries: Vec<VerificationRequirement>,
}

impl RequirementCatalog {
    pub fn new(entries: Vec<VerificationRequirement>) -> Self {
        Self { entries }
    }

    pub fn get(&self, code: RequirementCode) -> Option<&VerificationRequirement> {
        self.entries.iter().find(|r| r.code == code)
    }

    pub fn iter(&self) -> impl Iterator<Item = &VerificationRequirement> {
        self.entries.iter()
    }

    /// The standard catalog: fiscal identity and activity checks via the
    /// tax authority, per-trade licenses via registry snapshots, contact
    /// ownership via one-time codes.
    pub fn standard() -> Self {
        let mut entries = vec![
            VerificationRequirement {
                code: RequirementCode::CuitOwnership,
                category: RequirementCategory::Fiscal,
                tier: 1,
                required: true,
                source: AutoVerifySource::Afip,
            },
            VerificationRequirement {
                code: RequirementCode::CuilOwnership,
                category: RequirementCategory::Identity,
                tier: 1,
                required: false,
                source: AutoVerifySource::Afip,
            },
            VerificationRequirement {
                code: RequirementCode::AfipActiveStatus,
                category: RequirementCategory::Fiscal,
                tier: 1,
                required: true,
                source: AutoVerifySource::Afip,
            },
            VerificationRequirement {
                code: RequirementCode::ActivityMatch,
                category: RequirementCategory::Fiscal,
                tier: 2,
                required: false,
                source: AutoVerifySource::Afip,
            },
            VerificationRequirement {
                code: RequirementCode::FiscalAddress,
                category: RequirementCategory::Fiscal,
                tier: 2,
                required: false,
                source: AutoVerifySource::Afip,
            },
            VerificationRequirement {
                code: RequirementCode::PhoneOwnership,
                category: RequirementCategory::Contact,
                tier: 1,
                required: true,
                source: AutoVerifySource::Sms,
            },
            VerificationRequirement {
                code: RequirementCode::EmailOwnership,
                category: RequirementCategory::Contact,
                tier: 1,
                required: true,
                source: AutoVerifySource::Email,
            },
        ];
        for trade in Trade::ALL {
            entries.push(VerificationRequirement {
                code: RequirementCode::ProfessionalLicense(trade),
                category: RequirementCategory::Professional,
                tier: 2,
                required: false,
                source: AutoVerifySource::Registry,
            });
        }
        Self { entries }
    }
}

/// Lifecycle state of a submission. `Approved` and `Rejected` are
/// terminal; the router never overwrites them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionStatus {
    Pending,
    Approved,
    Rejected,
    NeedsReview,
}

impl SubmissionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SubmissionStatus::Approved | SubmissionStatus::Rejected)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SubmissionStatus::Pending => "pending",
            SubmissionStatus::Approved => "approved",
            SubmissionStatus::Rejected => "rejected",
            SubmissionStatus::NeedsReview => "needs_review",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(SubmissionStatus::Pending),
            "approved" => Some(SubmissionStatus::Approved),
            "rejected" => Some(SubmissionStatus::Rejected),
            "needs_review" => Some(SubmissionStatus::NeedsReview),
            _ => None,
        }
    }
}

impl fmt::Display for SubmissionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One attempt at satisfying a requirement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationSubmission {
    pub id: Uuid,
    pub org_id: OrgId,
    pub requirement: RequirementCode,
    /// The raw credential as the user typed it (CUIT, matricula, phone).
    pub submitted_value: String,
    pub status: SubmissionStatus,
    /// Opaque evidence from the verifier that approved/flagged it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub evidence: Option<serde_json::Value>,
    /// Human-readable reason for the current status.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl VerificationSubmission {
    pub fn new(
        org_id: OrgId,
        requirement: RequirementCode,
        submitted_value: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            org_id,
            requirement,
            submitted_value: submitted_value.into(),
            status: SubmissionStatus::Pending,
            evidence: None,
            reason: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Normalized outcome of one automatic verification attempt.
///
/// Business failures (not found, low confidence, provider unreachable)
/// are values here, never errors: `should_approve` is the only path to
/// auto-approval, and anything the verifier cannot decide sets
/// `needs_review` instead of silently approving or rejecting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutoVerifyResult {
    /// The check itself ran to a decision (false = the credential failed
    /// a deterministic test and can never pass unchanged).
    pub success: bool,
    /// Explicit auto-approval. A submission only reaches `Approved`
    /// through this flag or manual review.
    pub should_approve: bool,
    /// Route to a human. Mutually exclusive with `should_approve`.
    pub needs_review: bool,
    /// Human-readable explanation, always present.
    pub reason: String,
    /// Opaque evidence for reviewers (registry answers, provenance).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub evidence: Option<serde_json::Value>,
}

impl AutoVerifyResult {
    pub fn approve(reason: impl Into<String>, evidence: serde_json::Value) -> Self {
        Self {
            success: true,
            should_approve: true,
            needs_review: false,
            reason: reason.into(),
            evidence: Some(evidence),
        }
    }

    pub fn reject(reason: impl Into<String>, evidence: serde_json::Value) -> Self {
        Self {
            success: false,
            should_approve: false,
            needs_review: false,
            reason: reason.into(),
            evidence: Some(evidence),
        }
    }

    pub fn review(reason: impl Into<String>, evidence: Option<serde_json::Value>) -> Self {
        Self {
            success: true,
            should_approve: false,
            needs_review: true,
            reason: reason.into(),
            evidence,
        }
    }

    /// The submission status this result resolves to.
    pub fn resolved_status(&self) -> SubmissionStatus {
        if self.should_approve {
            SubmissionStatus::Approved
        } else if self.needs_review {
            SubmissionStatus::NeedsReview
        } else {
            SubmissionStatus::Rejected
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn requirement_codes_round_trip() {
        let codes = [
            RequirementCode::CuitOwnership,
            RequirementCode::CuilOwnership,
            RequirementCode::AfipActiveStatus,
            RequirementCode::ActivityMatch,
            RequirementCode::FiscalAddress,
            RequirementCode::ProfessionalLicense(Trade::Gas),
            RequirementCode::ProfessionalLicense(Trade::Refrigeration),
            RequirementCode::PhoneOwnership,
            RequirementCode::EmailOwnership,
        ];
        for code in codes {
            let s = code.as_string();
            assert_eq!(s.parse::<RequirementCode>().unwrap(), code, "{s}");
        }
    }

    #[test]
    fn unknown_codes_are_errors_not_panics() {
        assert!("dni_scan".parse::<RequirementCode>().is_err());
        assert!("license_masonry".parse::<RequirementCode>().is_err());
        assert!("".parse::<RequirementCode>().is_err());
    }

    #[test]
    fn standard_catalog_covers_every_trade() {
        let catalog = RequirementCatalog::standard();
        for trade in Trade::ALL {
            assert!(catalog
                .get(RequirementCode::ProfessionalLicense(trade))
                .is_some());
        }
        assert!(catalog.get(RequirementCode::CuitOwnership).unwrap().required);
    }

    #[test]
    fn terminal_statuses() {
        assert!(SubmissionStatus::Approved.is_terminal());
        assert!(SubmissionStatus::Rejected.is_terminal());
        assert!(!SubmissionStatus::Pending.is_terminal());
        assert!(!SubmissionStatus::NeedsReview.is_terminal());
    }

    #[test]
    fn result_resolves_to_status() {
        let a = AutoVerifyResult::approve("ok", serde_json::json!({}));
        assert_eq!(a.resolved_status(), SubmissionStatus::Approved);
        let r = AutoVerifyResult::review("needs a look", None);
        assert_eq!(r.resolved_status(), SubmissionStatus::NeedsReview);
        let x = AutoVerifyResult::reject("checksum failed", serde_json::json!({}));
        assert_eq!(x.resolved_status(), SubmissionStatus::Rejected);
    }
}
