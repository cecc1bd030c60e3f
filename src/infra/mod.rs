//! Infrastructure layer for the trust engine.
//!
//! Contains the error taxonomy, the store traits every stateful
//! component runs over, in-memory implementations for tests and
//! single-instance deployments, and PostgreSQL implementations for
//! production.

mod error;
mod memory;
pub mod postgres;
mod traits;

pub use error::*;
pub use memory::{
    MemoryChallengeStore, MemoryComplianceStore, MemoryLicenseSnapshotStore,
    MemoryLoginActivityStore, MemoryRefreshTokenStore, MemorySubmissionStore,
    MemorySubscriptionStore,
};
pub use postgres::{
    PgChallengeStore, PgComplianceStore, PgLicenseSnapshotStore, PgLoginActivityStore,
    PgRefreshTokenStore, PgSubmissionStore, PgSubscriptionStore,
};
pub use traits::*;
