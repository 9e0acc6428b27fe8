//! Building ghosted zone arrays from a resolved decomposition.

use crate::mesh_error::MeshAdvectError;
use crate::structured::boundary::{Boundary, linear_index};
use crate::structured::domain_boundaries::StructuredDomainBoundaries;
use num_traits::Zero;

#[cfg(feature = "rayon")]
use rayon::prelude::*;

/// A zone field over one block's new (ghosted) extents.
#[derive(Clone, Debug, PartialEq)]
pub struct GhostedZones<T> {
    pub values: Vec<T>,
    /// Whether each entry was filled from real data (own or a neighbor's).
    /// Entries that are `false` were filled from the closest existing entry.
    pub exists: Vec<bool>,
}

fn zone_indices(ext: [i64; 6]) -> impl Iterator<Item = [i64; 3]> {
    (ext[4]..=ext[5]).flat_map(move |k| {
        (ext[2]..=ext[3]).flat_map(move |j| (ext[0]..=ext[1]).map(move |i| [i, j, k]))
    })
}

impl StructuredDomainBoundaries {
    /// `1` for ghost zones, `0` for the block's own, over the new zone extents.
    pub fn ghost_zone_mask(&self, block: usize) -> Result<Vec<u8>, MeshAdvectError> {
        let b = self.boundary(block)?;
        Ok(zone_indices(b.newzextents)
            .map(|ijk| b.is_ghost_zone(ijk) as u8)
            .collect())
    }

    /// Expand per-block zone fields (over original extents) onto ghosted
    /// extents, copying ghost values from the matching neighbor zones.
    pub fn exchange_zone_field<T>(&self, fields: &[Vec<T>]) -> Result<Vec<GhostedZones<T>>, MeshAdvectError>
    where
        T: Copy + Zero + Send + Sync,
    {
        if fields.len() != self.n_blocks() {
            return Err(MeshAdvectError::InvalidConfig(format!(
                "{} zone fields for {} blocks",
                fields.len(),
                self.n_blocks()
            )));
        }
        for (block, f) in fields.iter().enumerate() {
            let expected = self.boundaries()[block].oldncells();
            if f.len() != expected {
                return Err(MeshAdvectError::ArrayLength {
                    block,
                    expected,
                    actual: f.len(),
                });
            }
        }

        #[cfg(feature = "rayon")]
        let out = (0..self.n_blocks())
            .into_par_iter()
            .map(|b| self.ghost_block(b, fields))
            .collect();
        #[cfg(not(feature = "rayon"))]
        let out = (0..self.n_blocks()).map(|b| self.ghost_block(b, fields)).collect();
        out
    }

    fn ghost_block<T>(&self, block: usize, fields: &[Vec<T>]) -> Result<GhostedZones<T>, MeshAdvectError>
    where
        T: Copy + Zero,
    {
        let me: &Boundary = self.boundary(block)?;
        let n = me.newncells();
        let mut values = vec![T::zero(); n];
        let mut exists = vec![false; n];

        for ijk in zone_indices(me.oldzextents) {
            let (Some(dst), Some(src)) = (me.new_cell_index(ijk), me.old_cell_index(ijk)) else {
                continue;
            };
            values[dst] = fields[block][src];
            exists[dst] = true;
        }

        for slot in 0..me.neighbors.len() {
            let nbr = &me.neighbors[slot];
            let back = self.reciprocal(block, slot)?;
            let other = self.boundary(nbr.domain)?;
            for ijk in zone_indices(me.ghost_zone_range(nbr)) {
                let Some(dst) = me.new_cell_index(ijk) else {
                    continue;
                };
                let src_ijk = me.translated_cell_index(nbr, back, ijk)?;
                let src = linear_index(&other.oldzextents, src_ijk).ok_or_else(|| {
                    MeshAdvectError::topology(
                        block,
                        format!("ghost zone {ijk:?} maps to {src_ijk:?}, outside block {}", nbr.domain),
                    )
                })?;
                values[dst] = fields[nbr.domain][src];
                exists[dst] = true;
            }
        }

        let missing = exists.iter().filter(|e| !**e).count();
        if missing > 0 {
            log::trace!("block {block}: {missing} ghost zones filled from the closest existing zone");
            for ijk in zone_indices(me.newzextents) {
                let Some(idx) = me.new_cell_index(ijk) else {
                    continue;
                };
                if !exists[idx] {
                    let from = me.closest_existing_new_cell_index(&exists, ijk)?;
                    values[idx] = values[from];
                }
            }
        }
        Ok(GhostedZones { values, exists })
    }
}
