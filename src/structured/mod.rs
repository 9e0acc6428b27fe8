//! Ghost-zone resolution for structured multi-block meshes.
//!
//! Adjacency facts (which blocks touch, on which face, with which relative
//! orientation) go in; per-block [`Boundary`] records describing the ghosted
//! index space and the index translation between neighbors come out.

pub mod boundary;
pub mod domain_boundaries;
pub mod ghost_exchange;

pub use boundary::{Boundary, FaceType, IMAX, IMIN, JMAX, JMIN, KMAX, KMIN, Neighbor};
pub use domain_boundaries::StructuredDomainBoundaries;
pub use ghost_exchange::GhostedZones;
