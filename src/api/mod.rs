//! HTTP API layer for the trust engine.

pub mod error;
mod rest;

pub use error::{ApiError, ErrorCode};
pub use rest::router;
