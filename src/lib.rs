#![cfg_attr(docsrs, feature(doc_cfg))]
//! # mesh-advect
//!
//! Distributed integral-curve (streamline / particle) advection over a
//! domain-decomposed mesh, plus ghost-zone resolution for structured
//! multi-block meshes.
//!
//! ## Features
//! - [`ParallelAdvection`](advect::ParallelAdvection): each rank advances the
//!   curves in the domains it owns and hands curves across domain boundaries
//!   with point-to-point messages; global quiescence is detected by counting,
//!   without a barrier in the steady state
//! - [`StructuredDomainBoundaries`](structured::StructuredDomainBoundaries):
//!   per-block ghost extents and neighbor index translation
//! - Pluggable communication backends (single rank, in-process threads, MPI)
//!
//! ## Usage
//!
//! ```toml
//! [dependencies]
//! mesh-advect = "0.3"
//! # Optional features:
//! # features = ["mpi-support", "rayon"]
//! ```
//!
//! Geometric ambiguity at domain seams (a curve claimed by zero or several
//! ranks) is reconciled in-band and logged through the `log` facade; it never
//! surfaces as an error.

pub mod advect;
pub mod algs;
pub mod debug_invariants;
pub mod geometry;
pub mod mesh_error;
pub mod structured;
pub mod topology;

pub use debug_invariants::DebugInvariants;

/// A convenient prelude to import the most-used traits & types:
pub mod prelude {
    pub use crate::advect::{
        AdvectConfig, AdvectStats, Advector, CurveId, CurveStatus, IntegralCurve,
        ParallelAdvection, ProgressSink, TerminationReason,
    };
    #[cfg(feature = "mpi-support")]
    pub use crate::algs::communicator::MpiComm;
    pub use crate::algs::communicator::{Communicator, NoComm, RayonComm};
    pub use crate::debug_invariants::DebugInvariants;
    pub use crate::geometry::locator::{CellLocator, CellWeights, PlacementResult};
    pub use crate::geometry::rectilinear::{RectilinearBlock, RectilinearLocator};
    pub use crate::mesh_error::MeshAdvectError;
    pub use crate::structured::{Boundary, Neighbor, StructuredDomainBoundaries};
    pub use crate::topology::{DomainId, DomainOwnership};
}
