//! Laburen Trust Engine Library
//!
//! Trust and access decisioning for a trades marketplace: tax-id
//! validation and registry verification, one-time code challenges,
//! login throttling, session tokens, trial lifecycle, and the access
//! policy that aggregates all of it into one decision.
//!
//! ## Modules
//!
//! - [`domain`] - Core domain types (tax ids, submissions, subscriptions, access decisions)
//! - [`infra`] - Infrastructure implementations (store traits, in-memory, PostgreSQL)
//! - [`verify`] - Verification routing (AFIP registry, license registry, one-time codes)
//! - [`auth`] - Login throttling and session tokens
//! - [`policy`] - Trial lifecycle and the access aggregator
//! - [`metrics`] - Observability counters and gauges
//! - [`api`] - REST API routes
//! - [`server`] - Process wiring and the HTTP entrypoint

pub mod api;
pub mod auth;
pub mod config;
pub mod domain;
pub mod infra;
pub mod metrics;
pub mod migrations;
pub mod policy;
pub mod server;
pub mod verify;

// Re-export commonly used types
pub use config::TrustConfig;
pub use domain::{
    AccessDecision, BlockReason, BlockSeverity, Cuit, CuitError, EntityKind, OrgId, PlanTier,
    PrincipalId, RequirementCatalog, RequirementCode, SubmissionStatus, SubscriptionStatus,
    VerificationSubmission,
};
pub use infra::{Result, TrustError};
