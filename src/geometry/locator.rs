//! Point-location contract consumed by the advection loop.
//!
//! The mesh layer answers two questions for the advection core:
//! which domains *could* hold a point (a coarse, bounding-box style query that
//! may return several candidates near seams), and whether a given domain
//! *actually* holds it (a point-in-cell test that also yields interpolation
//! weights). A boundary miss is a routine outcome on every domain crossing, so
//! it is reported as a [`PlacementResult`] value, not as an error.

use crate::topology::domain::DomainId;

/// Cell index and interpolation weights of a located point.
#[derive(Clone, Debug, PartialEq)]
pub struct CellWeights {
    /// Zone index inside the domain (row-major, `i` fastest).
    pub cell: usize,
    /// One weight per cell node, summing to one.
    pub weights: Vec<f64>,
}

/// Outcome of a point-in-cell query.
#[derive(Clone, Debug, PartialEq)]
pub enum PlacementResult {
    /// The point lies in a cell of the domain.
    Found(CellWeights),
    /// The domain is known here but no cell contains the point.
    NotFound,
    /// The domain cannot be queried on this rank (not loaded, out of range).
    Invalid,
}

impl PlacementResult {
    #[inline]
    pub fn is_found(&self) -> bool {
        matches!(self, PlacementResult::Found(_))
    }
}

/// Per-block point location, provided by the mesh/database layer.
pub trait CellLocator {
    /// Ordered list of domains at `time_step` whose coarse bounds contain `point`.
    ///
    /// The order must be deterministic: every rank evaluates it independently
    /// and must agree on it.
    fn candidate_domains(&self, point: &[f64; 3], time_step: u32) -> Vec<DomainId>;

    /// Exact containment test inside one domain.
    fn test_point_in_cell(&self, domain: DomainId, point: &[f64; 3]) -> PlacementResult;

    /// Shorthand for `test_point_in_cell(..).is_found()`.
    fn contains(&self, domain: DomainId, point: &[f64; 3]) -> bool {
        self.test_point_in_cell(domain, point).is_found()
    }
}

impl<L: CellLocator + ?Sized> CellLocator for &L {
    fn candidate_domains(&self, point: &[f64; 3], time_step: u32) -> Vec<DomainId> {
        (**self).candidate_domains(point, time_step)
    }

    fn test_point_in_cell(&self, domain: DomainId, point: &[f64; 3]) -> PlacementResult {
        (**self).test_point_in_cell(domain, point)
    }
}

impl<L: CellLocator + ?Sized> CellLocator for std::sync::Arc<L> {
    fn candidate_domains(&self, point: &[f64; 3], time_step: u32) -> Vec<DomainId> {
        (**self).candidate_domains(point, time_step)
    }

    fn test_point_in_cell(&self, domain: DomainId, point: &[f64; 3]) -> PlacementResult {
        (**self).test_point_in_cell(domain, point)
    }
}
