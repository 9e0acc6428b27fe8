//! Point location against the domain decomposition.
//!
//! [`CellLocator`](locator::CellLocator) is the capability the advection loop
//! consumes; [`rectilinear`] is a concrete implementation over axis-aligned
//! blocks.

pub mod locator;
pub mod rectilinear;
