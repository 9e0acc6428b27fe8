//! `DomainId`: which block (at which time step) a curve claims to be in
//!
//! A decomposed mesh is a set of blocks per time step. Every curve carries a
//! `DomainId` naming the block it currently believes it is inside, and an
//! ordered list of candidate `DomainId`s its location could belong to.
//!
//! This module provides:
//! - The `DomainId` pair with a reserved [`DomainId::EXITED`] sentinel used
//!   for curves that are permanently done.
//! - [`DomainTable`], a row-major `(time_step, block)` table that performs
//!   bounds checking in one place instead of at every call site.

use std::fmt;

/// A `(domain, time_step)` pair identifying one block of one time step.
#[derive(
    Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize,
)]
pub struct DomainId {
    pub domain: u32,
    pub time_step: u32,
}

static_assertions::assert_eq_size!(DomainId, u64);

impl DomainId {
    /// Sentinel for curves that left the mesh (or otherwise can never be continued).
    pub const EXITED: DomainId = DomainId {
        domain: u32::MAX,
        time_step: u32::MAX,
    };

    #[inline]
    pub const fn new(domain: u32, time_step: u32) -> Self {
        Self { domain, time_step }
    }

    /// True for the [`DomainId::EXITED`] sentinel.
    #[inline]
    pub const fn is_exited(self) -> bool {
        self.domain == u32::MAX
    }
}

// -----------------------------------------------------------------------------
// Formatting traits
// -----------------------------------------------------------------------------

impl fmt::Debug for DomainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_exited() {
            f.write_str("DomainId(EXITED)")
        } else {
            f.debug_tuple("DomainId")
                .field(&self.domain)
                .field(&self.time_step)
                .finish()
        }
    }
}

/// Prints `domain@time_step`, or `exited` for the sentinel.
impl fmt::Display for DomainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_exited() {
            f.write_str("exited")
        } else {
            write!(f, "{}@{}", self.domain, self.time_step)
        }
    }
}

// -----------------------------------------------------------------------------
// (time_step, block) table
// -----------------------------------------------------------------------------

/// Dense `(time_step, block)` table stored row-major in one vector.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct DomainTable<T> {
    n_blocks: usize,
    n_time_steps: usize,
    cells: Vec<T>,
}

impl<T: Clone> DomainTable<T> {
    /// Create a table with every slot set to `fill`.
    pub fn filled(n_time_steps: usize, n_blocks: usize, fill: T) -> Self {
        Self {
            n_blocks,
            n_time_steps,
            cells: vec![fill; n_blocks * n_time_steps],
        }
    }
}

impl<T> DomainTable<T> {
    /// Build a table from one row per time step. All rows must have equal length.
    pub fn from_rows(rows: Vec<Vec<T>>) -> Option<Self> {
        let n_time_steps = rows.len();
        let n_blocks = rows.first().map_or(0, Vec::len);
        if rows.iter().any(|r| r.len() != n_blocks) {
            return None;
        }
        let cells = rows.into_iter().flatten().collect();
        Some(Self {
            n_blocks,
            n_time_steps,
            cells,
        })
    }

    #[inline]
    pub fn n_blocks(&self) -> usize {
        self.n_blocks
    }

    #[inline]
    pub fn n_time_steps(&self) -> usize {
        self.n_time_steps
    }

    #[inline]
    fn slot(&self, id: DomainId) -> Option<usize> {
        let (d, t) = (id.domain as usize, id.time_step as usize);
        if id.is_exited() || d >= self.n_blocks || t >= self.n_time_steps {
            None
        } else {
            Some(t * self.n_blocks + d)
        }
    }

    pub fn get(&self, id: DomainId) -> Option<&T> {
        self.slot(id).map(|s| &self.cells[s])
    }

    pub fn get_mut(&mut self, id: DomainId) -> Option<&mut T> {
        self.slot(id).map(move |s| &mut self.cells[s])
    }

    /// Iterate `(DomainId, &T)` in row-major order.
    pub fn iter(&self) -> impl Iterator<Item = (DomainId, &T)> + '_ {
        let n_blocks = self.n_blocks.max(1);
        self.cells.iter().enumerate().map(move |(s, v)| {
            (
                DomainId::new((s % n_blocks) as u32, (s / n_blocks) as u32),
                v,
            )
        })
    }

    /// Every block of one time step.
    pub fn time_step(&self, time_step: u32) -> impl Iterator<Item = (DomainId, &T)> + '_ {
        self.iter().filter(move |(id, _)| id.time_step == time_step)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sentinel_is_exited() {
        assert!(DomainId::EXITED.is_exited());
        assert!(!DomainId::new(3, 0).is_exited());
        assert_eq!(format!("{}", DomainId::EXITED), "exited");
        assert_eq!(format!("{}", DomainId::new(3, 1)), "3@1");
        assert_eq!(format!("{:?}", DomainId::new(3, 1)), "DomainId(3, 1)");
    }

    #[test]
    fn table_is_row_major_and_bounds_checked() {
        let t = DomainTable::from_rows(vec![vec!['a', 'b'], vec!['c', 'd']]).unwrap();
        assert_eq!(t.get(DomainId::new(1, 0)), Some(&'b'));
        assert_eq!(t.get(DomainId::new(0, 1)), Some(&'c'));
        assert_eq!(t.get(DomainId::new(2, 0)), None);
        assert_eq!(t.get(DomainId::new(0, 2)), None);
        assert_eq!(t.get(DomainId::EXITED), None);
        let ids: Vec<_> = t.time_step(1).map(|(id, _)| id).collect();
        assert_eq!(ids, vec![DomainId::new(0, 1), DomainId::new(1, 1)]);
    }

    #[test]
    fn ragged_rows_rejected() {
        assert!(DomainTable::from_rows(vec![vec![1], vec![1, 2]]).is_none());
    }

    #[test]
    fn bincode_is_two_words() {
        let d = DomainId::new(3, 1);
        let bytes = bincode::serialize(&d).unwrap();
        assert_eq!(bytes.len(), 8);
        assert_eq!(bincode::deserialize::<DomainId>(&bytes).unwrap(), d);
    }

    #[test]
    fn json_roundtrip() {
        let d = DomainId::new(7, 2);
        let s = serde_json::to_string(&d).unwrap();
        let back: DomainId = serde_json::from_str(&s).unwrap();
        assert_eq!(back, d);
    }
}
