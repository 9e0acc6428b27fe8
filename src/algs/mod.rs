//! Communication plumbing shared by the distributed algorithms.

pub mod communicator;
pub mod wire;
