//! The integral-curve work item.
//!
//! A curve is owned by exactly one rank at a time. It moves between ranks by
//! being serialized, sent and dropped locally; `counter` is bumped on every
//! send so that acknowledgements can be matched to one particular hand-off.

use crate::topology::domain::DomainId;
use std::fmt;

/// Stable identity of a curve, assigned at seed time and identical on every rank.
#[derive(
    Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize,
)]
#[repr(transparent)]
pub struct CurveId(pub u64);

impl fmt::Display for CurveId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ic#{}", self.0)
    }
}

/// Why a curve stopped.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum TerminationReason {
    /// Left every domain of the mesh.
    ExitedMesh,
    /// Reached the configured step limit.
    MaxSteps,
    /// Reached the end of the current time interval; may be continued.
    TimeLimit,
    /// Velocity vanished.
    Stagnated,
    /// Could not be placed in any candidate domain after a hand-off.
    Lost,
}

impl TerminationReason {
    /// Permanent reasons park the curve on [`DomainId::EXITED`].
    pub fn is_permanent(self) -> bool {
        !matches!(self, TerminationReason::TimeLimit)
    }

    pub(crate) fn to_wire(self) -> u8 {
        match self {
            TerminationReason::ExitedMesh => 1,
            TerminationReason::MaxSteps => 2,
            TerminationReason::TimeLimit => 3,
            TerminationReason::Stagnated => 4,
            TerminationReason::Lost => 5,
        }
    }

    pub(crate) fn from_wire(w: u8) -> Option<Self> {
        Some(match w {
            1 => TerminationReason::ExitedMesh,
            2 => TerminationReason::MaxSteps,
            3 => TerminationReason::TimeLimit,
            4 => TerminationReason::Stagnated,
            5 => TerminationReason::Lost,
            _ => return None,
        })
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum CurveStatus {
    Ok,
    /// Transient: the last step left the claimed domain.
    OutOfBounds,
    Terminated(TerminationReason),
}

impl CurveStatus {
    #[inline]
    pub fn is_terminated(self) -> bool {
        matches!(self, CurveStatus::Terminated(_))
    }
}

/// One particle/streamline being advected.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct IntegralCurve {
    pub id: CurveId,
    pub counter: u32,
    pub originating_rank: usize,
    pub location: [f64; 3],
    pub time: f64,
    pub domain: DomainId,
    pub seed_pt_domain_list: Vec<DomainId>,
    pub status: CurveStatus,
    pub steps_taken: u32,
    /// Every accepted location, seed first.
    pub history: Vec<[f64; 3]>,
}

impl IntegralCurve {
    /// A fresh curve at `location`; domain and candidates are filled in at seeding.
    pub fn new(id: CurveId, location: [f64; 3], time: f64, originating_rank: usize) -> Self {
        Self {
            id,
            counter: 0,
            originating_rank,
            location,
            time,
            domain: DomainId::EXITED,
            seed_pt_domain_list: Vec::new(),
            status: CurveStatus::Ok,
            steps_taken: 0,
            history: vec![location],
        }
    }

    /// Move to `location` at `time`, appending it to the trajectory.
    pub fn move_to(&mut self, location: [f64; 3], time: f64) {
        self.location = location;
        self.time = time;
        self.steps_taken += 1;
        self.history.push(location);
    }

    /// Mark terminated; permanent reasons also park the curve on the sentinel domain.
    pub fn terminate(&mut self, reason: TerminationReason) {
        self.status = CurveStatus::Terminated(reason);
        if reason.is_permanent() {
            self.domain = DomainId::EXITED;
        }
    }

    /// `(id, counter)`: the key acknowledgements refer to.
    #[inline]
    pub fn ack_key(&self) -> (CurveId, u32) {
        (self.id, self.counter)
    }
}
