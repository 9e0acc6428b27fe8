//! MeshAdvectError: Unified error type for mesh-advect public APIs
//!
//! Geometric ambiguity during advection (a curve landing in zero or several
//! candidate domains) is *not* an error: it is reconciled in-band by the
//! acknowledgement protocol. Everything here is either a configuration error
//! that must abort the caller, or a transport/decoding failure.

use crate::topology::domain::DomainId;
use thiserror::Error;

/// Unified error type for mesh-advect operations.
#[derive(Debug, Error)]
pub enum MeshAdvectError {
    /// Structured topology the boundary resolver cannot index correctly.
    #[error("Topology error on block {block}: {reason}")]
    Topology { block: usize, reason: String },
    /// A neighbor entry has no valid reciprocal entry on the other block.
    #[error(
        "Reciprocity violated: block {block} neighbor slot {slot} (domain {neighbor}) has no matching back-reference"
    )]
    Reciprocity {
        block: usize,
        slot: usize,
        neighbor: usize,
    },
    /// Block index outside the decomposition.
    #[error("Block {block} out of range (decomposition has {n_blocks} blocks)")]
    BlockOutOfRange { block: usize, n_blocks: usize },
    /// Neighbor slot index outside a block's neighbor list.
    #[error("Neighbor slot {slot} out of range for block {block} ({len} neighbors)")]
    NeighborOutOfRange { block: usize, slot: usize, len: usize },
    /// Index array handed to a ghost helper does not match the new extents.
    #[error("Array length mismatch for block {block}: expected {expected}, got {actual}")]
    ArrayLength {
        block: usize,
        expected: usize,
        actual: usize,
    },
    /// No owner registered for a domain.
    #[error("No owning rank registered for domain {0}")]
    MissingOwnership(DomainId),
    /// A malformed or incompatible wire record.
    #[error("Wire decode error: {0}")]
    Wire(String),
    /// Communication failure with a peer rank.
    #[error("Communication error with neighbor {neighbor}: {source}")]
    CommError {
        neighbor: usize,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// Rejected configuration value.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl MeshAdvectError {
    pub(crate) fn topology(block: usize, reason: impl Into<String>) -> Self {
        Self::Topology {
            block,
            reason: reason.into(),
        }
    }
}
