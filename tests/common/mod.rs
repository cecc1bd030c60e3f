//! Common test utilities and fixtures for integration tests

#![allow(dead_code)]

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;
use uuid::Uuid;

use laburen_trust::domain::{Cuit, LicenseRecord, OrgId, PrincipalId, RequirementCatalog, Trade};
use laburen_trust::infra::{
    MemoryChallengeStore, MemoryLicenseSnapshotStore, MemorySubmissionStore, Result,
};
use laburen_trust::verify::{
    ActivityCode, ActivityMatcher, CodeTransport, FiscalAddress, LicenseMatcher, OtpChallenges,
    OtpChannel, OtpConfig, TaxRegistryClient, TaxpayerInfo, TaxpayerLookup, VerificationRouter,
};

/// Test organization ID
pub fn test_org() -> OrgId {
    OrgId::from_uuid(Uuid::parse_str("11111111-1111-1111-1111-111111111111").unwrap())
}

/// Test principal ID
pub fn test_principal() -> PrincipalId {
    PrincipalId::from_uuid(Uuid::parse_str("22222222-2222-2222-2222-222222222222").unwrap())
}

/// Build a checksum-valid identifier from a kind prefix and an 8-digit
/// base, bumping the base past any unassignable gap.
pub fn valid_cuit(prefix: u8, base: u32) -> String {
    let mut base = base;
    loop {
        let mut first_ten = [0u8; 10];
        first_ten[0] = prefix / 10;
        first_ten[1] = prefix % 10;
        let mut rest = base;
        for i in (2..10).rev() {
            first_ten[i] = (rest % 10) as u8;
            rest /= 10;
        }
        if let Some(dv) = Cuit::check_digit(&first_ten) {
            let digits: String = first_ten.iter().map(|d| (d + b'0') as char).collect();
            return format!("{digits}{dv}");
        }
        base += 1;
    }
}

/// A registered, active installer taxpayer.
pub fn installer_taxpayer() -> TaxpayerInfo {
    TaxpayerInfo {
        legal_name: "Instalaciones Gomez SRL".to_string(),
        tax_category: "responsable_inscripto".to_string(),
        active: true,
        activities: vec![ActivityCode::new("432200")],
        fiscal_address: Some(FiscalAddress {
            street: "Av. Corrientes 1234".to_string(),
            city: "Buenos Aires".to_string(),
            province: "CABA".to_string(),
            postal_code: "C1043".to_string(),
        }),
    }
}

/// An active license-registry row.
pub fn license_row(matricula: &str, trade: Trade) -> LicenseRecord {
    LicenseRecord {
        matricula: matricula.to_string(),
        trade,
        province: "Buenos Aires".to_string(),
        full_name: "Juan Gomez".to_string(),
        source: "ergas".to_string(),
        status: "active".to_string(),
        scraped_at: Utc::now(),
    }
}

/// What the scripted registry answers with, regardless of the queried
/// identifier.
pub enum RegistryScript {
    Found(TaxpayerInfo),
    NotFound,
    Unavailable,
}

/// Deterministic stand-in for the tax authority.
pub struct ScriptedRegistry {
    script: RegistryScript,
}

impl ScriptedRegistry {
    pub fn new(script: RegistryScript) -> Self {
        Self { script }
    }
}

#[async_trait]
impl TaxRegistryClient for ScriptedRegistry {
    async fn lookup(&self, _cuit: &Cuit) -> TaxpayerLookup {
        match &self.script {
            RegistryScript::Found(info) => TaxpayerLookup::Found(info.clone()),
            RegistryScript::NotFound => TaxpayerLookup::NotFound,
            RegistryScript::Unavailable => TaxpayerLookup::Unavailable {
                reason: "registry request timed out".to_string(),
            },
        }
    }
}

/// Captures delivered one-time codes so tests can replay them.
pub struct RecordingTransport {
    pub delivered: Mutex<Vec<(OtpChannel, String, String)>>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self {
            delivered: Mutex::new(Vec::new()),
        }
    }

    pub async fn last_code(&self) -> Option<String> {
        self.delivered
            .lock()
            .await
            .last()
            .map(|(_, _, code)| code.clone())
    }
}

#[async_trait]
impl CodeTransport for RecordingTransport {
    async fn deliver(&self, channel: OtpChannel, destination: &str, code: &str) -> Result<()> {
        self.delivered
            .lock()
            .await
            .push((channel, destination.to_string(), code.to_string()));
        Ok(())
    }
}

/// A full verification router over in-memory stores.
pub fn build_router(
    script: RegistryScript,
    licenses: Vec<LicenseRecord>,
) -> (VerificationRouter, Arc<RecordingTransport>) {
    let transport = Arc::new(RecordingTransport::new());
    let router = VerificationRouter::new(
        RequirementCatalog::standard(),
        Arc::new(MemorySubmissionStore::new()),
        Arc::new(ScriptedRegistry::new(script)),
        ActivityMatcher::default(),
        LicenseMatcher::new(Arc::new(MemoryLicenseSnapshotStore::new(licenses))),
        OtpChallenges::new(
            Arc::new(MemoryChallengeStore::new()),
            transport.clone(),
            OtpConfig::default(),
        ),
    );
    (router, transport)
}
