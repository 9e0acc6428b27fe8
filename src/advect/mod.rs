//! Distributed integral-curve advection over a domain decomposition.
//!
//! Curves are seeded on the rank owning the domain that contains them and
//! handed between ranks as they cross domain boundaries. See
//! [`algorithm`] for the control loop and its termination protocol.

pub mod algorithm;
pub mod config;
pub mod curve;
pub mod pending;
pub mod progress;

pub use algorithm::{Advector, ParallelAdvection, StepOutcome};
pub use config::{AdvectCommTags, AdvectConfig};
pub use curve::{CurveId, CurveStatus, IntegralCurve, TerminationReason};
pub use pending::{AckOutcome, PendingAcks};
pub use progress::{AdvectStats, NoProgress, ProgressSink};
