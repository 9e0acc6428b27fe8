//! Domain identifiers and the rank that owns each domain.
//!
//! A domain is one block of the decomposition at one time step. Tables keyed
//! by domain are a single row-major vector indexed by `(time_step, block)`.

pub mod domain;
pub mod ownership;

pub use domain::{DomainId, DomainTable};
pub use ownership::DomainOwnership;
