//! Subscription lifecycle and the access gate computed from it.

mod access;
mod trial;

pub use access::AccessPolicy;
pub use trial::TrialLifecycle;
