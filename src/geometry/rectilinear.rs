//! Axis-aligned rectilinear blocks as a concrete [`CellLocator`].
//!
//! Each block stores one monotone coordinate array per axis; a single-entry
//! array is a degenerate (planar) axis. Cells can be blanked to model a
//! bounding box that is not fully covered by cells, which is exactly the
//! situation the placement reconciliation has to survive.
//!
//! Node ordering of the trilinear weights follows the reference hexahedron:
//! `(0,0,0) (1,0,0) (1,1,0) (0,1,0) (0,0,1) (1,0,1) (1,1,1) (0,1,1)`.

use crate::geometry::locator::{CellLocator, CellWeights, PlacementResult};
use crate::mesh_error::MeshAdvectError;
use crate::topology::domain::{DomainId, DomainTable};
use crate::topology::ownership::DomainOwnership;
use hashbrown::HashSet;

const EPS: f64 = 1e-12;

#[derive(Clone, Debug, PartialEq)]
pub struct RectilinearBlock {
    coords: [Vec<f64>; 3],
    blanked: HashSet<usize>,
}

impl RectilinearBlock {
    /// Build from per-axis node coordinates (strictly increasing, at least one each).
    pub fn new(x: Vec<f64>, y: Vec<f64>, z: Vec<f64>) -> Result<Self, MeshAdvectError> {
        for (axis, c) in [&x, &y, &z].into_iter().enumerate() {
            if c.is_empty() {
                return Err(MeshAdvectError::InvalidConfig(format!(
                    "axis {axis} has no coordinates"
                )));
            }
            if c.windows(2).any(|w| !(w[1] > w[0])) {
                return Err(MeshAdvectError::InvalidConfig(format!(
                    "axis {axis} coordinates are not strictly increasing"
                )));
            }
        }
        Ok(Self {
            coords: [x, y, z],
            blanked: HashSet::new(),
        })
    }

    /// Uniform block with `nodes[a]` nodes spaced `spacing[a]` from `origin[a]`.
    pub fn uniform(
        origin: [f64; 3],
        spacing: [f64; 3],
        nodes: [usize; 3],
    ) -> Result<Self, MeshAdvectError> {
        let axis = |a: usize| -> Vec<f64> {
            (0..nodes[a])
                .map(|n| origin[a] + spacing[a] * n as f64)
                .collect()
        };
        Self::new(axis(0), axis(1), axis(2))
    }

    pub fn node_dims(&self) -> [usize; 3] {
        [0, 1, 2].map(|a| self.coords[a].len())
    }

    /// `max(node_dim - 1, 1)` per axis.
    pub fn zone_dims(&self) -> [usize; 3] {
        self.node_dims().map(|n| n.saturating_sub(1).max(1))
    }

    /// `[xmin, xmax, ymin, ymax, zmin, zmax]`.
    pub fn bounds(&self) -> [f64; 6] {
        let mut b = [0.0; 6];
        for a in 0..3 {
            let c = &self.coords[a];
            b[2 * a] = c[0];
            b[2 * a + 1] = c[c.len() - 1];
        }
        b
    }

    /// Remove a cell from the block; points inside it are no longer located.
    pub fn blank_cell(&mut self, ijk: [usize; 3]) {
        let zd = self.zone_dims();
        if ijk.iter().zip(zd.iter()).all(|(i, d)| i < d) {
            self.blanked.insert(ijk[0] + zd[0] * (ijk[1] + zd[1] * ijk[2]));
        }
    }

    /// Locate `p`, returning the cell and trilinear weights.
    pub fn locate(&self, p: &[f64; 3]) -> PlacementResult {
        let mut idx = [0usize; 3];
        let mut t = [0.0f64; 3];
        for a in 0..3 {
            let c = &self.coords[a];
            let (lo, hi) = (c[0], c[c.len() - 1]);
            let tol = EPS * (1.0 + lo.abs().max(hi.abs()));
            if !p[a].is_finite() {
                return PlacementResult::NotFound;
            }
            if c.len() == 1 {
                if (p[a] - lo).abs() > tol {
                    return PlacementResult::NotFound;
                }
                continue;
            }
            if p[a] < lo - tol || p[a] > hi + tol {
                return PlacementResult::NotFound;
            }
            let i = c
                .partition_point(|&x| x <= p[a])
                .saturating_sub(1)
                .min(c.len() - 2);
            idx[a] = i;
            t[a] = ((p[a] - c[i]) / (c[i + 1] - c[i])).clamp(0.0, 1.0);
        }
        let zd = self.zone_dims();
        let cell = idx[0] + zd[0] * (idx[1] + zd[1] * idx[2]);
        if self.blanked.contains(&cell) {
            return PlacementResult::NotFound;
        }
        let [r, s, u] = t;
        let (rm, sm, um) = (1.0 - r, 1.0 - s, 1.0 - u);
        PlacementResult::Found(CellWeights {
            cell,
            weights: vec![
                rm * sm * um,
                r * sm * um,
                r * s * um,
                rm * s * um,
                rm * sm * u,
                r * sm * u,
                r * s * u,
                rm * s * u,
            ],
        })
    }
}

/// Locator over a decomposition of rectilinear blocks.
///
/// Every rank knows the coarse bounds of every domain, but only holds the
/// cell data of the domains it has loaded; querying any other domain yields
/// [`PlacementResult::Invalid`].
#[derive(Clone, Debug)]
pub struct RectilinearLocator {
    bounds: DomainTable<Option<[f64; 6]>>,
    blocks: DomainTable<Option<RectilinearBlock>>,
}

impl RectilinearLocator {
    pub fn new(n_time_steps: usize, n_blocks: usize) -> Self {
        Self {
            bounds: DomainTable::filled(n_time_steps, n_blocks, None),
            blocks: DomainTable::filled(n_time_steps, n_blocks, None),
        }
    }

    /// Load a block; its bounds become the domain's coarse bounds.
    pub fn insert(&mut self, domain: DomainId, block: RectilinearBlock) -> Result<(), MeshAdvectError> {
        self.set_bounds(domain, block.bounds())?;
        let slot = self
            .blocks
            .get_mut(domain)
            .ok_or_else(|| MeshAdvectError::InvalidConfig(format!("domain {domain} out of range")))?;
        *slot = Some(block);
        Ok(())
    }

    /// Override the coarse bounds of a domain (e.g. a partition's bounding box).
    pub fn set_bounds(&mut self, domain: DomainId, bounds: [f64; 6]) -> Result<(), MeshAdvectError> {
        let slot = self
            .bounds
            .get_mut(domain)
            .ok_or_else(|| MeshAdvectError::InvalidConfig(format!("domain {domain} out of range")))?;
        *slot = Some(bounds);
        Ok(())
    }

    pub fn block_mut(&mut self, domain: DomainId) -> Option<&mut RectilinearBlock> {
        self.blocks.get_mut(domain).and_then(Option::as_mut)
    }

    /// Drop the cell data of every domain this rank does not own. Bounds stay.
    pub fn restrict_to(mut self, ownership: &DomainOwnership) -> Self {
        let foreign: Vec<DomainId> = self
            .blocks
            .iter()
            .filter(|(id, b)| b.is_some() && !ownership.owns_domain(*id))
            .map(|(id, _)| id)
            .collect();
        for id in foreign {
            if let Some(slot) = self.blocks.get_mut(id) {
                *slot = None;
            }
        }
        self
    }
}

fn bbox_contains(b: &[f64; 6], p: &[f64; 3]) -> bool {
    (0..3).all(|a| {
        let tol = EPS * (1.0 + b[2 * a].abs().max(b[2 * a + 1].abs()));
        p[a] >= b[2 * a] - tol && p[a] <= b[2 * a + 1] + tol
    })
}

impl CellLocator for RectilinearLocator {
    fn candidate_domains(&self, point: &[f64; 3], time_step: u32) -> Vec<DomainId> {
        self.bounds
            .time_step(time_step)
            .filter_map(|(id, b)| b.as_ref().filter(|b| bbox_contains(b, point)).map(|_| id))
            .collect()
    }

    fn test_point_in_cell(&self, domain: DomainId, point: &[f64; 3]) -> PlacementResult {
        match self.blocks.get(domain) {
            Some(Some(block)) => block.locate(point),
            _ => PlacementResult::Invalid,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_block(x0: f64) -> RectilinearBlock {
        RectilinearBlock::uniform([x0, 0.0, 0.0], [0.5, 0.5, 0.5], [3, 3, 3]).unwrap()
    }

    #[test]
    fn weights_sum_to_one() {
        let b = unit_block(0.0);
        match b.locate(&[0.3, 0.7, 0.1]) {
            PlacementResult::Found(w) => {
                let s: f64 = w.weights.iter().sum();
                assert!((s - 1.0).abs() < 1e-12);
                // i=0 (0.3 in [0,0.5)), j=1, k=0
                assert_eq!(w.cell, 0 + 2 * 1);
            }
            other => panic!("expected Found, got {other:?}"),
        }
    }

    #[test]
    fn outside_and_blanked_are_not_found() {
        let mut b = unit_block(0.0);
        assert_eq!(b.locate(&[1.5, 0.5, 0.5]), PlacementResult::NotFound);
        b.blank_cell([1, 1, 1]);
        assert_eq!(b.locate(&[0.75, 0.75, 0.75]), PlacementResult::NotFound);
        assert!(b.locate(&[0.25, 0.25, 0.25]).is_found());
    }

    #[test]
    fn planar_axis() {
        let b = RectilinearBlock::new(vec![0.0, 1.0], vec![0.0, 1.0], vec![0.0]).unwrap();
        assert_eq!(b.zone_dims(), [1, 1, 1]);
        assert!(b.locate(&[0.5, 0.5, 0.0]).is_found());
        assert_eq!(b.locate(&[0.5, 0.5, 0.1]), PlacementResult::NotFound);
    }

    #[test]
    fn rejects_non_monotone() {
        assert!(RectilinearBlock::new(vec![0.0, 0.0], vec![0.0], vec![0.0]).is_err());
        assert!(RectilinearBlock::new(vec![], vec![0.0], vec![0.0]).is_err());
    }

    #[test]
    fn seam_point_has_two_candidates_and_remote_blocks_are_invalid() {
        let mut loc = RectilinearLocator::new(1, 2);
        loc.insert(DomainId::new(0, 0), unit_block(0.0)).unwrap();
        loc.insert(DomainId::new(1, 0), unit_block(1.0)).unwrap();
        let c = loc.candidate_domains(&[1.0, 0.5, 0.5], 0);
        assert_eq!(c, vec![DomainId::new(0, 0), DomainId::new(1, 0)]);

        let own = DomainOwnership::from_owners(&[0, 1], 1, 0, 2).unwrap();
        let loc = loc.restrict_to(&own);
        assert!(loc.contains(DomainId::new(0, 0), &[0.5, 0.5, 0.5]));
        assert_eq!(
            loc.test_point_in_cell(DomainId::new(1, 0), &[1.5, 0.5, 0.5]),
            PlacementResult::Invalid
        );
        // Bounds survive restriction.
        assert_eq!(loc.candidate_domains(&[1.5, 0.5, 0.5], 0), vec![DomainId::new(1, 0)]);
    }
}
