//! Per-block ghost-zone bookkeeping for structured multi-block meshes.
//!
//! Extents are stored as `[imin, imax, jmin, jmax, kmin, kmax]` in global
//! (inclusive) index space. Node extents come from the caller; zone extents
//! are derived as `[min, max - 1]` on every axis with more than one node and
//! `[min, min]` on a degenerate axis, so `zone_dim = max(node_dim - 1, 1)`.
//!
//! A [`Neighbor`] describes one shared face in *this* block's index space:
//! its node extents are a single plane on the face-normal axis. The zone
//! extents recorded for it are the layer of this block's own zones touching
//! that face; the ghost layer a neighbor contributes sits one index further
//! out. Ghost layers are always exactly one deep.

use crate::debug_invariants::DebugInvariants;
use crate::mesh_error::MeshAdvectError;
use serde::{Deserialize, Serialize};

/// Face bitmask of a [`Neighbor`], relative to the block that stores it.
pub type FaceType = u8;

pub const IMIN: FaceType = 0x01;
pub const IMAX: FaceType = 0x02;
pub const JMIN: FaceType = 0x04;
pub const JMAX: FaceType = 0x08;
pub const KMIN: FaceType = 0x10;
pub const KMAX: FaceType = 0x20;

/// `FACE_BITS[axis] = (min flag, max flag)`.
pub const FACE_BITS: [(FaceType, FaceType); 3] = [(IMIN, IMAX), (JMIN, JMAX), (KMIN, KMAX)];

/// `(neighbor axis, sign)` for `orient + 3`; slot 3 (orient 0) is invalid.
const ORIENT_TABLE: [Option<(usize, i64)>; 7] = [
    Some((2, -1)),
    Some((1, -1)),
    Some((0, -1)),
    None,
    Some((0, 1)),
    Some((1, 1)),
    Some((2, 1)),
];

/// Decode a signed 1-based axis into `(axis, sign)`.
pub fn decode_orient(o: i8) -> Option<(usize, i64)> {
    let slot = o as i64 + 3;
    if (0..7).contains(&slot) {
        ORIENT_TABLE[slot as usize]
    } else {
        None
    }
}

pub(crate) fn dims_of(ext: &[i64; 6]) -> [usize; 3] {
    [0, 1, 2].map(|a| (ext[2 * a + 1] - ext[2 * a] + 1).max(0) as usize)
}

fn zones_of(nodes: &[i64; 6]) -> [i64; 6] {
    let mut z = *nodes;
    for a in 0..3 {
        if nodes[2 * a + 1] > nodes[2 * a] {
            z[2 * a + 1] = nodes[2 * a + 1] - 1;
        }
    }
    z
}

/// Row-major (`i` fastest) offset of `ijk` within `ext`, if inside.
pub(crate) fn linear_index(ext: &[i64; 6], ijk: [i64; 3]) -> Option<usize> {
    let d = dims_of(ext);
    let mut off = [0usize; 3];
    for a in 0..3 {
        if ijk[a] < ext[2 * a] || ijk[a] > ext[2 * a + 1] {
            return None;
        }
        off[a] = (ijk[a] - ext[2 * a]) as usize;
    }
    Some(off[0] + d[0] * (off[1] + d[1] * off[2]))
}

/// One face shared with another block.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Neighbor {
    /// Block on the other side.
    pub domain: usize,
    /// Slot of the reciprocal entry in `domain`'s neighbor list.
    #[serde(rename = "match")]
    pub match_index: usize,
    /// Signed 1-based mapping of this block's axes onto the neighbor's.
    pub orient: [i8; 3],
    pub nextents: [i64; 6],
    pub zextents: [i64; 6],
    pub face: FaceType,
}

impl Neighbor {
    pub fn ndims(&self) -> [usize; 3] {
        dims_of(&self.nextents)
    }

    pub fn zdims(&self) -> [usize; 3] {
        dims_of(&self.zextents)
    }

    pub fn npts(&self) -> usize {
        self.ndims().iter().product()
    }

    pub fn ncells(&self) -> usize {
        self.zdims().iter().product()
    }

    /// Axes on which this face is the normal.
    pub fn normal_axes(&self) -> impl Iterator<Item = usize> + '_ {
        (0..3).filter(|&a| self.face & (FACE_BITS[a].0 | FACE_BITS[a].1) != 0)
    }

    /// `+1` if the face is the MIN side on `axis`, `-1` if MAX, `0` otherwise.
    pub fn side(&self, axis: usize) -> i64 {
        let (lo, hi) = FACE_BITS[axis];
        if self.face & lo != 0 {
            1
        } else if self.face & hi != 0 {
            -1
        } else {
            0
        }
    }

    fn orient_axes(&self, block: usize) -> Result<[(usize, i64); 3], MeshAdvectError> {
        let mut out = [(0, 1); 3];
        let mut used = [false; 3];
        for a in 0..3 {
            let (b, s) = decode_orient(self.orient[a]).ok_or_else(|| {
                MeshAdvectError::topology(block, format!("invalid orientation {:?}", self.orient))
            })?;
            if used[b] {
                return Err(MeshAdvectError::topology(
                    block,
                    format!("orientation {:?} is not a permutation", self.orient),
                ));
            }
            used[b] = true;
            out[a] = (b, s);
        }
        Ok(out)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Boundary {
    pub domain: usize,
    pub expand: [bool; 6],
    pub neighbors: Vec<Neighbor>,
    pub oldnextents: [i64; 6],
    pub oldzextents: [i64; 6],
    pub newnextents: [i64; 6],
    pub newzextents: [i64; 6],
}

impl Boundary {
    pub fn new(domain: usize) -> Self {
        Self {
            domain,
            ..Self::default()
        }
    }

    /// Record the block's own node extents and reset ghost expansion.
    pub fn set_extents(&mut self, extents: [i64; 6]) -> Result<(), MeshAdvectError> {
        for a in 0..3 {
            if extents[2 * a + 1] < extents[2 * a] {
                return Err(MeshAdvectError::topology(
                    self.domain,
                    format!("inverted extents {extents:?}"),
                ));
            }
        }
        self.oldnextents = extents;
        self.oldzextents = zones_of(&extents);
        self.expand = [false; 6];
        self.finish();
        Ok(())
    }

    pub fn oldndims(&self) -> [usize; 3] {
        dims_of(&self.oldnextents)
    }

    pub fn oldzdims(&self) -> [usize; 3] {
        dims_of(&self.oldzextents)
    }

    pub fn newndims(&self) -> [usize; 3] {
        dims_of(&self.newnextents)
    }

    pub fn newzdims(&self) -> [usize; 3] {
        dims_of(&self.newzextents)
    }

    pub fn oldnpts(&self) -> usize {
        self.oldndims().iter().product()
    }

    pub fn oldncells(&self) -> usize {
        self.oldzdims().iter().product()
    }

    pub fn newnpts(&self) -> usize {
        self.newndims().iter().product()
    }

    pub fn newncells(&self) -> usize {
        self.newzdims().iter().product()
    }

    fn is_degenerate(&self, axis: usize) -> bool {
        self.oldnextents[2 * axis] == self.oldnextents[2 * axis + 1]
    }

    /// Classify and append a neighbor face; returns its slot.
    ///
    /// `extents` is the shared face in this block's node index space.
    pub fn add_neighbor(
        &mut self,
        domain: usize,
        match_index: usize,
        orient: [i8; 3],
        extents: [i64; 6],
    ) -> Result<usize, MeshAdvectError> {
        let mut n = Neighbor {
            domain,
            match_index,
            orient,
            nextents: extents,
            zextents: zones_of(&extents),
            face: 0,
        };
        n.orient_axes(self.domain)?;

        let mut expand = self.expand;
        for a in 0..3 {
            let (lo, hi) = (extents[2 * a], extents[2 * a + 1]);
            let (own_lo, own_hi) = (self.oldnextents[2 * a], self.oldnextents[2 * a + 1]);
            if self.is_degenerate(a) {
                if lo != own_lo || hi != own_hi {
                    return Err(MeshAdvectError::topology(
                        self.domain,
                        format!(
                            "neighbor {domain} spans [{lo}, {hi}] on axis {a}, where the block is a single plane at {own_lo}"
                        ),
                    ));
                }
                continue;
            }
            if lo < own_lo || hi > own_hi || hi < lo {
                return Err(MeshAdvectError::topology(
                    self.domain,
                    format!("neighbor {domain} extents {extents:?} exceed the block's {:?}", self.oldnextents),
                ));
            }
            if lo != hi {
                continue;
            }
            let (min_bit, max_bit) = FACE_BITS[a];
            if lo == own_lo {
                n.face |= min_bit;
                expand[2 * a] = true;
            } else if lo == own_hi {
                n.face |= max_bit;
                expand[2 * a + 1] = true;
                n.zextents[2 * a] -= 1;
                n.zextents[2 * a + 1] -= 1;
            }
        }

        if n.face == 0 {
            return Err(MeshAdvectError::topology(
                self.domain,
                format!("neighbor {domain} extents {extents:?} do not lie on any face"),
            ));
        }
        self.expand = expand;
        log::trace!(
            "block {}: neighbor {domain} on face {:#04x} (match {match_index})",
            self.domain,
            n.face
        );
        self.neighbors.push(n);
        Ok(self.neighbors.len() - 1)
    }

    /// Remove every entry for `domain`, returning the removed slots in
    /// ascending order. Expansion flags and new extents are recomputed.
    pub(crate) fn remove_neighbor_entries(&mut self, domain: usize) -> Vec<usize> {
        let removed: Vec<usize> = self
            .neighbors
            .iter()
            .enumerate()
            .filter(|(_, n)| n.domain == domain)
            .map(|(s, _)| s)
            .collect();
        if removed.is_empty() {
            return removed;
        }
        self.neighbors.retain(|n| n.domain != domain);
        self.recompute_expand();
        self.finish();
        removed
    }

    fn recompute_expand(&mut self) {
        self.expand = [false; 6];
        for n in &self.neighbors {
            for a in 0..3 {
                let (lo, hi) = FACE_BITS[a];
                self.expand[2 * a] |= n.face & lo != 0;
                self.expand[2 * a + 1] |= n.face & hi != 0;
            }
        }
    }

    /// Grow the new extents outward by the expansion flags. Idempotent.
    pub fn finish(&mut self) {
        for a in 0..3 {
            let lo = self.expand[2 * a] as i64;
            let hi = self.expand[2 * a + 1] as i64;
            self.newnextents[2 * a] = self.oldnextents[2 * a] - lo;
            self.newnextents[2 * a + 1] = self.oldnextents[2 * a + 1] + hi;
            self.newzextents[2 * a] = self.oldzextents[2 * a] - lo;
            self.newzextents[2 * a + 1] = self.oldzextents[2 * a + 1] + hi;
        }
        self.debug_assert_invariants();
    }

    pub fn is_ghost_zone(&self, ijk: [i64; 3]) -> bool {
        (0..3).any(|a| ijk[a] < self.oldzextents[2 * a] || ijk[a] > self.oldzextents[2 * a + 1])
    }

    pub fn is_ghost_point(&self, ijk: [i64; 3]) -> bool {
        (0..3).any(|a| ijk[a] < self.oldnextents[2 * a] || ijk[a] > self.oldnextents[2 * a + 1])
    }

    pub fn new_point_index(&self, ijk: [i64; 3]) -> Option<usize> {
        linear_index(&self.newnextents, ijk)
    }

    pub fn new_cell_index(&self, ijk: [i64; 3]) -> Option<usize> {
        linear_index(&self.newzextents, ijk)
    }

    pub fn old_point_index(&self, ijk: [i64; 3]) -> Option<usize> {
        linear_index(&self.oldnextents, ijk)
    }

    pub fn old_cell_index(&self, ijk: [i64; 3]) -> Option<usize> {
        linear_index(&self.oldzextents, ijk)
    }

    /// Ghost zones `from` contributes to this block, in its index space.
    pub fn ghost_zone_range(&self, from: &Neighbor) -> [i64; 6] {
        let mut r = from.zextents;
        for a in from.normal_axes() {
            let shift = -from.side(a);
            r[2 * a] += shift;
            r[2 * a + 1] += shift;
        }
        r
    }

    /// Map a zone index of this block onto the matching zone of the
    /// neighbor described by `from`, whose reciprocal entry is `back`.
    ///
    /// The face-normal axis is clamped to the neighbor's zone layer on the
    /// shared face, so a ghost zone maps onto the neighbor's own data.
    pub fn translated_cell_index(
        &self,
        from: &Neighbor,
        back: &Neighbor,
        ijk: [i64; 3],
    ) -> Result<[i64; 3], MeshAdvectError> {
        let axes = from.orient_axes(self.domain)?;
        let mut out = [0i64; 3];
        for a in 0..3 {
            let (b, s) = axes[a];
            let (lo, hi) = (from.zextents[2 * a], from.zextents[2 * a + 1]);
            let off = (ijk[a] - lo).clamp(0, hi - lo);
            out[b] = if s > 0 {
                back.zextents[2 * b] + off
            } else {
                back.zextents[2 * b + 1] - off
            };
        }
        Ok(out)
    }

    /// Map a node index of this block onto the neighbor described by `from`.
    ///
    /// A ghost node one layer past the shared face maps onto the neighbor
    /// node one layer inside it; nodes on the face map onto the face.
    pub fn translated_point_index(
        &self,
        from: &Neighbor,
        back: &Neighbor,
        ijk: [i64; 3],
    ) -> Result<[i64; 3], MeshAdvectError> {
        let axes = from.orient_axes(self.domain)?;
        let mut out = [0i64; 3];
        for a in 0..3 {
            let (b, s) = axes[a];
            let (lo, hi) = (from.nextents[2 * a], from.nextents[2 * a + 1]);
            let inward = back.side(b);
            if from.side(a) != 0 && inward != 0 {
                let depth = (ijk[a] - lo).abs().min(1);
                out[b] = back.nextents[2 * b] + inward * depth;
                continue;
            }
            let off = (ijk[a] - lo).clamp(0, hi - lo);
            out[b] = if s > 0 {
                back.nextents[2 * b] + off
            } else {
                back.nextents[2 * b + 1] - off
            };
        }
        Ok(out)
    }

    /// Linear index of the nearest populated node, walking from `ijk` one
    /// step per iteration toward the original extents.
    pub fn closest_existing_new_point_index(
        &self,
        exists: &[bool],
        ijk: [i64; 3],
    ) -> Result<usize, MeshAdvectError> {
        closest_existing(self.domain, &self.newnextents, &self.oldnextents, exists, ijk)
    }

    /// Zone counterpart of [`closest_existing_new_point_index`](Self::closest_existing_new_point_index).
    pub fn closest_existing_new_cell_index(
        &self,
        exists: &[bool],
        ijk: [i64; 3],
    ) -> Result<usize, MeshAdvectError> {
        closest_existing(self.domain, &self.newzextents, &self.oldzextents, exists, ijk)
    }
}

fn closest_existing(
    block: usize,
    new: &[i64; 6],
    old: &[i64; 6],
    exists: &[bool],
    ijk: [i64; 3],
) -> Result<usize, MeshAdvectError> {
    let expected = dims_of(new).iter().product::<usize>();
    if exists.len() != expected {
        return Err(MeshAdvectError::ArrayLength {
            block,
            expected,
            actual: exists.len(),
        });
    }
    let mut cur = [0, 1, 2].map(|a| ijk[a].clamp(new[2 * a], new[2 * a + 1]));
    loop {
        let idx = linear_index(new, cur)
            .ok_or_else(|| MeshAdvectError::topology(block, format!("index {cur:?} outside {new:?}")))?;
        let mut moved = false;
        if !exists[idx] {
            for a in 0..3 {
                if cur[a] < old[2 * a] {
                    cur[a] += 1;
                    moved = true;
                } else if cur[a] > old[2 * a + 1] {
                    cur[a] -= 1;
                    moved = true;
                }
            }
        }
        if !moved {
            return Ok(idx);
        }
    }
}

impl DebugInvariants for Boundary {
    fn debug_assert_invariants(&self) {
        crate::debug_invariants!(self.validate_invariants(), "Boundary");
    }

    fn validate_invariants(&self) -> Result<(), MeshAdvectError> {
        let old = self.oldzdims();
        let new = self.newzdims();
        for a in 0..3 {
            let grow = self.expand[2 * a] as usize + self.expand[2 * a + 1] as usize;
            if new[a] != old[a] + grow {
                return Err(MeshAdvectError::topology(
                    self.domain,
                    format!("axis {a}: new zone dim {} != {} + {grow}", new[a], old[a]),
                ));
            }
        }
        for (slot, n) in self.neighbors.iter().enumerate() {
            if n.face == 0 {
                return Err(MeshAdvectError::topology(
                    self.domain,
                    format!("neighbor slot {slot} has no face"),
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cube(lo: [i64; 3], zones: i64) -> Boundary {
        let mut b = Boundary::new(0);
        b.set_extents([lo[0], lo[0] + zones, lo[1], lo[1] + zones, lo[2], lo[2] + zones])
            .unwrap();
        b
    }

    #[test]
    fn orientation_table() {
        assert_eq!(decode_orient(1), Some((0, 1)));
        assert_eq!(decode_orient(-3), Some((2, -1)));
        assert_eq!(decode_orient(0), None);
        assert_eq!(decode_orient(4), None);
    }

    #[test]
    fn zone_extents_guard_degenerate_axes() {
        let mut b = Boundary::new(3);
        b.set_extents([0, 4, 0, 2, 5, 5]).unwrap();
        assert_eq!(b.oldzextents, [0, 3, 0, 1, 5, 5]);
        assert_eq!(b.oldzdims(), [4, 2, 1]);
        assert_eq!(b.oldndims(), [5, 3, 1]);
    }

    #[test]
    fn max_face_shrinks_zone_layer() {
        let mut b = cube([0, 0, 0], 4);
        b.add_neighbor(1, 0, [1, 2, 3], [4, 4, 0, 4, 0, 4]).unwrap();
        let n = &b.neighbors[0].clone();
        assert_eq!(n.face, IMAX);
        assert_eq!(n.zextents, [3, 3, 0, 3, 0, 3]);
        assert!(b.expand[1] && !b.expand[0]);
        b.finish();
        assert_eq!(b.newzextents, [0, 4, 0, 3, 0, 3]);
        assert_eq!(b.newzdims(), [5, 4, 4]);
        assert_eq!(b.ghost_zone_range(n), [4, 4, 0, 3, 0, 3]);
    }

    #[test]
    fn interior_plane_is_rejected() {
        let mut b = cube([0, 0, 0], 4);
        let err = b.add_neighbor(1, 0, [1, 2, 3], [2, 2, 0, 4, 0, 4]).unwrap_err();
        assert!(matches!(err, MeshAdvectError::Topology { block: 0, .. }));
        assert!(b.add_neighbor(1, 0, [1, 1, 3], [4, 4, 0, 4, 0, 4]).is_err());
        assert!(b.neighbors.is_empty());
    }

    #[test]
    fn planar_block_ignores_its_flat_axis() {
        let mut b = Boundary::new(0);
        b.set_extents([0, 4, 0, 4, 0, 0]).unwrap();
        b.add_neighbor(1, 0, [1, 2, 3], [0, 0, 0, 4, 0, 0]).unwrap();
        assert_eq!(b.neighbors[0].face, IMIN);
        b.finish();
        assert_eq!(b.newzdims(), [5, 4, 1]);
        // The neighbor must be flat where the block is.
        assert!(b.add_neighbor(2, 0, [1, 2, 3], [4, 4, 0, 4, 0, 1]).is_err());
    }

    #[test]
    fn finish_is_idempotent() {
        let mut b = cube([0, 0, 0], 4);
        b.add_neighbor(1, 0, [1, 2, 3], [0, 0, 0, 4, 0, 4]).unwrap();
        b.finish();
        let first = (b.newnextents, b.newzextents);
        b.finish();
        assert_eq!((b.newnextents, b.newzextents), first);
    }

    #[cfg(debug_assertions)]
    #[test]
    #[should_panic(expected = "[invariants] Boundary")]
    fn finish_checks_face_assignments() {
        let mut b = cube([0, 0, 0], 4);
        b.add_neighbor(1, 0, [1, 2, 3], [0, 0, 0, 4, 0, 4]).unwrap();
        b.neighbors[0].face = 0;
        b.finish();
    }

    #[test]
    fn cell_translation_with_identity_orientation() {
        // Block A = zones [0,3], block B = zones [4,7] along i (global indices).
        let mut a = cube([0, 0, 0], 4);
        let mut b = cube([4, 0, 0], 4);
        a.add_neighbor(1, 0, [1, 2, 3], [4, 4, 0, 4, 0, 4]).unwrap();
        b.add_neighbor(0, 0, [1, 2, 3], [4, 4, 0, 4, 0, 4]).unwrap();
        a.finish();
        b.finish();
        // Ghost zone of A at i=4 is B's first zone.
        let t = a
            .translated_cell_index(&a.neighbors[0], &b.neighbors[0], [4, 2, 1])
            .unwrap();
        assert_eq!(t, [4, 2, 1]);
        // Ghost zone of B at i=3 is A's last zone.
        let t = b
            .translated_cell_index(&b.neighbors[0], &a.neighbors[0], [3, 0, 3])
            .unwrap();
        assert_eq!(t, [3, 0, 3]);
        assert!(a.is_ghost_zone([4, 0, 0]));
        assert!(!a.is_ghost_zone([3, 0, 0]));
    }

    #[test]
    fn reflected_and_permuted_orientation() {
        // A's IMAX face (i=4) touches B's JMIN face (j=0). A's i maps to B's j,
        // A's j maps to B's reflected i, k to k.
        let mut a = cube([0, 0, 0], 4);
        let mut b = cube([0, 0, 0], 4);
        a.add_neighbor(1, 0, [2, -1, 3], [4, 4, 0, 4, 0, 4]).unwrap();
        b.add_neighbor(0, 0, [-2, 1, 3], [0, 4, 0, 0, 0, 4]).unwrap();
        assert_eq!(b.neighbors[0].face, JMIN);
        let t = a
            .translated_cell_index(&a.neighbors[0], &b.neighbors[0], [4, 0, 2])
            .unwrap();
        // j=0 on A is the high end of B's i range.
        assert_eq!(t, [3, 0, 2]);

        let p = a
            .translated_point_index(&a.neighbors[0], &b.neighbors[0], [5, 1, 2])
            .unwrap();
        // One node past A's face is one node inside B, at B's i = 4 - 1.
        assert_eq!(p, [3, 1, 2]);
        let on_face = a
            .translated_point_index(&a.neighbors[0], &b.neighbors[0], [4, 1, 2])
            .unwrap();
        assert_eq!(on_face, [3, 0, 2]);
    }

    #[test]
    fn closest_existing_walks_inward() {
        let mut b = cube([0, 0, 0], 2);
        b.add_neighbor(1, 0, [1, 2, 3], [0, 0, 0, 2, 0, 2]).unwrap();
        b.add_neighbor(2, 0, [1, 2, 3], [0, 2, 0, 0, 0, 2]).unwrap();
        b.finish();
        assert_eq!(b.newzextents, [-1, 1, -1, 1, 0, 1]);
        let n = b.newncells();
        let mut exists = vec![true; n];
        // The (i=-1, j=-1) edge column is covered by no face neighbor.
        for k in 0..2 {
            let idx = b.new_cell_index([-1, -1, k]).unwrap();
            exists[idx] = false;
        }
        let got = b.closest_existing_new_cell_index(&exists, [-1, -1, 1]).unwrap();
        assert_eq!(got, b.new_cell_index([0, 0, 1]).unwrap());
        let direct = b.closest_existing_new_cell_index(&exists, [-1, 0, 0]).unwrap();
        assert_eq!(direct, b.new_cell_index([-1, 0, 0]).unwrap());
        assert!(matches!(
            b.closest_existing_new_cell_index(&exists[1..], [0, 0, 0]),
            Err(MeshAdvectError::ArrayLength { .. })
        ));
    }
}
