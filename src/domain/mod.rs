//! Domain models for the Laburen trust engine.
//!
//! Pure types: identifiers, the CUIT/CUIL value type, verification
//! requirements and submissions, subscription state, and access
//! decisions. Nothing here does I/O.

mod access;
mod credentials;
mod cuit;
mod ids;
mod subscription;
mod verification;

pub use access::*;
pub use credentials::*;
pub use cuit::*;
pub use ids::*;
pub use subscription::*;
pub use verification::*;
