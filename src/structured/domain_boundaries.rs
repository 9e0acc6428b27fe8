//! The multi-block resolver: one [`Boundary`] per block, with reciprocal
//! neighbor bookkeeping maintained across blocks.

use crate::debug_invariants::DebugInvariants;
use crate::mesh_error::MeshAdvectError;
use crate::structured::boundary::{Boundary, Neighbor, decode_orient};
use serde::{Deserialize, Serialize};

const IDENTITY: [i8; 3] = [1, 2, 3];

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructuredDomainBoundaries {
    blocks: Vec<Boundary>,
    /// Global node extents per block, for rectilinear auto-detection.
    rect_extents: Vec<Option<[i64; 6]>>,
}

impl StructuredDomainBoundaries {
    pub fn new(n_blocks: usize) -> Self {
        Self {
            blocks: (0..n_blocks).map(Boundary::new).collect(),
            rect_extents: vec![None; n_blocks],
        }
    }

    pub fn n_blocks(&self) -> usize {
        self.blocks.len()
    }

    fn check_block(&self, block: usize) -> Result<(), MeshAdvectError> {
        if block < self.blocks.len() {
            Ok(())
        } else {
            Err(MeshAdvectError::BlockOutOfRange {
                block,
                n_blocks: self.blocks.len(),
            })
        }
    }

    pub fn boundary(&self, block: usize) -> Result<&Boundary, MeshAdvectError> {
        self.check_block(block)?;
        Ok(&self.blocks[block])
    }

    pub fn boundaries(&self) -> &[Boundary] {
        &self.blocks
    }

    /// Neighbor entry at `slot` of `block`.
    pub fn neighbor(&self, block: usize, slot: usize) -> Result<&Neighbor, MeshAdvectError> {
        let b = self.boundary(block)?;
        b.neighbors
            .get(slot)
            .ok_or(MeshAdvectError::NeighborOutOfRange {
                block,
                slot,
                len: b.neighbors.len(),
            })
    }

    /// The entry on the other block that points back at `(block, slot)`.
    pub fn reciprocal(&self, block: usize, slot: usize) -> Result<&Neighbor, MeshAdvectError> {
        let n = self.neighbor(block, slot)?;
        let back = self
            .neighbor(n.domain, n.match_index)
            .map_err(|_| MeshAdvectError::Reciprocity {
                block,
                slot,
                neighbor: n.domain,
            })?;
        if back.domain != block || back.match_index != slot {
            return Err(MeshAdvectError::Reciprocity {
                block,
                slot,
                neighbor: n.domain,
            });
        }
        Ok(back)
    }

    pub fn set_extents(&mut self, block: usize, extents: [i64; 6]) -> Result<(), MeshAdvectError> {
        self.check_block(block)?;
        self.blocks[block].set_extents(extents)
    }

    pub fn add_neighbor(
        &mut self,
        block: usize,
        neighbor: usize,
        match_index: usize,
        orient: [i8; 3],
        extents: [i64; 6],
    ) -> Result<usize, MeshAdvectError> {
        self.check_block(block)?;
        self.check_block(neighbor)?;
        self.blocks[block].add_neighbor(neighbor, match_index, orient, extents)
    }

    /// Drop every entry of `block` that refers to `neighbor`, then shift the
    /// `match` of entries elsewhere that pointed past a removed slot.
    ///
    /// Entries on `neighbor` that pointed at a removed slot are left for the
    /// reciprocal call (see [`disconnect`](Self::disconnect)). Deleting a
    /// neighbor that is not present is a no-op. Returns the number removed.
    pub fn delete_neighbor(&mut self, block: usize, neighbor: usize) -> Result<usize, MeshAdvectError> {
        self.check_block(block)?;
        let removed = self.blocks[block].remove_neighbor_entries(neighbor);
        if removed.is_empty() {
            return Ok(0);
        }
        for other in &mut self.blocks {
            for n in other.neighbors.iter_mut().filter(|n| n.domain == block) {
                let shift = removed.iter().filter(|&&s| s < n.match_index).count();
                n.match_index -= shift;
            }
        }
        log::debug!(
            "block {block}: removed {} entries for neighbor {neighbor}",
            removed.len()
        );
        Ok(removed.len())
    }

    /// Remove the adjacency between `a` and `b` in both directions.
    pub fn disconnect(&mut self, a: usize, b: usize) -> Result<usize, MeshAdvectError> {
        self.check_block(b)?;
        let n = self.delete_neighbor(a, b)? + self.delete_neighbor(b, a)?;
        self.debug_assert_invariants();
        Ok(n)
    }

    /// Recompute the new extents of every block. Idempotent.
    pub fn finish(&mut self) {
        for b in &mut self.blocks {
            b.finish();
        }
    }

    /// Check that every entry has a reciprocal pointing back at it, on the
    /// face the orientation predicts.
    pub fn validate_reciprocity(&self) -> Result<(), MeshAdvectError> {
        for (a, boundary) in self.blocks.iter().enumerate() {
            for (slot, n) in boundary.neighbors.iter().enumerate() {
                let back = self.reciprocal(a, slot)?;
                let bad = || MeshAdvectError::Reciprocity {
                    block: a,
                    slot,
                    neighbor: n.domain,
                };
                for axis in n.normal_axes() {
                    let (b_axis, sign) = decode_orient(n.orient[axis]).ok_or_else(bad)?;
                    // Leaving through MAX enters through MIN unless the axis is reflected.
                    let expected = -n.side(axis) * sign;
                    if back.side(b_axis) != expected {
                        return Err(bad());
                    }
                }
            }
        }
        Ok(())
    }

    /// Register a block of a rectilinear grid by its global node extents.
    pub fn set_indices_for_rect_grid(&mut self, block: usize, extents: [i64; 6]) -> Result<(), MeshAdvectError> {
        self.set_extents(block, extents)?;
        self.rect_extents[block] = Some(extents);
        Ok(())
    }

    /// Detect face-adjacent blocks among those registered with
    /// [`set_indices_for_rect_grid`](Self::set_indices_for_rect_grid) and add
    /// both directions with identity orientation.
    pub fn calculate_boundaries(&mut self) -> Result<usize, MeshAdvectError> {
        let registered: Vec<(usize, [i64; 6])> = self
            .rect_extents
            .iter()
            .enumerate()
            .filter_map(|(i, e)| e.map(|e| (i, e)))
            .collect();
        let mut faces = 0;
        for (x, &(a, ea)) in registered.iter().enumerate() {
            for &(b, eb) in &registered[x + 1..] {
                let Some(shared) = shared_face(&ea, &eb) else {
                    continue;
                };
                let slot_a = self.blocks[a].neighbors.len();
                let slot_b = self.blocks[b].neighbors.len();
                self.blocks[a].add_neighbor(b, slot_b, IDENTITY, shared)?;
                if let Err(e) = self.blocks[b].add_neighbor(a, slot_a, IDENTITY, shared) {
                    self.blocks[a].neighbors.pop();
                    return Err(e);
                }
                faces += 1;
            }
        }
        self.finish();
        self.debug_assert_invariants();
        log::debug!("rectilinear grid: {faces} shared faces among {} blocks", registered.len());
        Ok(faces)
    }
}

/// The face two rectilinear blocks share, if they touch across exactly one
/// axis with a face of positive area.
fn shared_face(a: &[i64; 6], b: &[i64; 6]) -> Option<[i64; 6]> {
    let mut touch = None;
    let mut out = [0i64; 6];
    for ax in 0..3 {
        let lo = a[2 * ax].max(b[2 * ax]);
        let hi = a[2 * ax + 1].min(b[2 * ax + 1]);
        if lo > hi {
            return None;
        }
        let a_flat = a[2 * ax] == a[2 * ax + 1];
        let b_flat = b[2 * ax] == b[2 * ax + 1];
        if lo == hi && !(a_flat && b_flat) {
            if touch.is_some() {
                return None;
            }
            touch = Some(ax);
        }
        out[2 * ax] = lo;
        out[2 * ax + 1] = hi;
    }
    touch.map(|_| out)
}

impl DebugInvariants for StructuredDomainBoundaries {
    fn debug_assert_invariants(&self) {
        crate::debug_invariants!(self.validate_invariants(), "StructuredDomainBoundaries");
    }

    fn validate_invariants(&self) -> Result<(), MeshAdvectError> {
        for b in &self.blocks {
            b.validate_invariants()?;
        }
        self.validate_reciprocity()
    }
}
