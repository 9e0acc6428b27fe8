//! Ownership metadata for mesh domains.
//!
//! The [`DomainOwnership`] map records the owning rank of every
//! `(block, time_step)` domain, enabling the two queries the advection loop
//! needs: which rank to hand a curve to, and whether this rank may accept it.
//! Ownership is assumed static for one run; it may change between time steps.

use crate::mesh_error::MeshAdvectError;
use crate::topology::domain::{DomainId, DomainTable};
use itertools::Itertools;

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct DomainOwnership {
    my_rank: usize,
    n_ranks: usize,
    owners: DomainTable<Option<usize>>,
}

impl DomainOwnership {
    /// Create an ownership map with no owners assigned yet.
    pub fn new(n_time_steps: usize, n_blocks: usize, my_rank: usize, n_ranks: usize) -> Self {
        Self {
            my_rank,
            n_ranks,
            owners: DomainTable::filled(n_time_steps, n_blocks, None),
        }
    }

    /// Block `b` of every time step goes to rank `b % n_ranks`.
    pub fn round_robin(n_time_steps: usize, n_blocks: usize, my_rank: usize, n_ranks: usize) -> Self {
        let rows = (0..n_time_steps)
            .map(|_| (0..n_blocks).map(|b| Some(b % n_ranks.max(1))).collect())
            .collect();
        Self {
            my_rank,
            n_ranks,
            owners: DomainTable::from_rows(rows).unwrap_or_else(|| DomainTable::filled(0, 0, None)),
        }
    }

    /// One owner per block, shared by every time step.
    pub fn from_owners(
        owners: &[usize],
        n_time_steps: usize,
        my_rank: usize,
        n_ranks: usize,
    ) -> Result<Self, MeshAdvectError> {
        if let Some(&bad) = owners.iter().find(|&&r| r >= n_ranks) {
            return Err(MeshAdvectError::InvalidConfig(format!(
                "owner rank {bad} >= n_ranks {n_ranks}"
            )));
        }
        let row: Vec<Option<usize>> = owners.iter().copied().map(Some).collect();
        let owners = DomainTable::from_rows(vec![row; n_time_steps])
            .ok_or_else(|| MeshAdvectError::InvalidConfig("ragged owner table".into()))?;
        Ok(Self {
            my_rank,
            n_ranks,
            owners,
        })
    }

    /// Insert or update the owner of `domain`.
    pub fn set(&mut self, domain: DomainId, owner: usize) -> Result<(), MeshAdvectError> {
        if owner >= self.n_ranks {
            return Err(MeshAdvectError::InvalidConfig(format!(
                "owner rank {owner} >= n_ranks {}",
                self.n_ranks
            )));
        }
        let slot = self
            .owners
            .get_mut(domain)
            .ok_or(MeshAdvectError::MissingOwnership(domain))?;
        *slot = Some(owner);
        Ok(())
    }

    #[inline]
    pub fn my_rank(&self) -> usize {
        self.my_rank
    }

    #[inline]
    pub fn n_ranks(&self) -> usize {
        self.n_ranks
    }

    /// Retrieve the owning rank for a domain.
    pub fn owner(&self, domain: DomainId) -> Option<usize> {
        self.owners.get(domain).copied().flatten()
    }

    /// Retrieve the owning rank or return an error if missing.
    pub fn owning_rank(&self, domain: DomainId) -> Result<usize, MeshAdvectError> {
        self.owner(domain)
            .ok_or(MeshAdvectError::MissingOwnership(domain))
    }

    /// Returns true if this rank owns `domain`.
    pub fn owns_domain(&self, domain: DomainId) -> bool {
        self.owner(domain) == Some(self.my_rank)
    }

    /// Domains owned by this rank at `time_step`.
    pub fn owned_domains(&self, time_step: u32) -> impl Iterator<Item = DomainId> + '_ {
        self.owners
            .time_step(time_step)
            .filter(|(_, o)| **o == Some(self.my_rank))
            .map(|(id, _)| id)
    }

    /// Distinct ranks owning any of `domains`, in first-seen order.
    pub fn owning_ranks<'a, I>(&self, domains: I) -> Result<Vec<usize>, MeshAdvectError>
    where
        I: IntoIterator<Item = &'a DomainId>,
    {
        let ranks = domains
            .into_iter()
            .map(|&d| self.owning_rank(d))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ranks.into_iter().unique().collect())
    }
}
