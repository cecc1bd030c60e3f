//! PostgreSQL store implementations.
//!
//! All SQL is bind-parameterized; per-identifier atomic operations use
//! transactions plus advisory locks so they hold across instances.

mod challenges;
mod compliance;
mod license_snapshot;
mod login_activity;
mod refresh_tokens;
mod submissions;
mod subscriptions;

pub use challenges::PgChallengeStore;
pub use compliance::PgComplianceStore;
pub use license_snapshot::PgLicenseSnapshotStore;
pub use login_activity::PgLoginActivityStore;
pub use refresh_tokens::PgRefreshTokenStore;
pub use submissions::PgSubmissionStore;
pub use subscriptions::PgSubscriptionStore;
