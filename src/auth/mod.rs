//! Authentication: login throttling and token issuance.
//!
//! Two collaborating pieces. [`LoginGuard`] answers "may this
//! identifier attempt a login right now" and tracks the failures that
//! feed lockouts. [`TokenIssuer`] mints the signed access token and
//! opaque refresh token a successful login earns, and owns rotation
//! and revocation. Password checking itself lives with the identity
//! provider, not here.

mod login_guard;
mod tokens;

pub use login_guard::{LoginGate, LoginGuard};
pub use tokens::{AccessClaims, TokenIssuer, TokenPair};
