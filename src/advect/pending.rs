//! Curves offered to other ranks and awaiting acknowledgement.
//!
//! A curve that left this rank's domains is offered to the remote owners of its
//! candidate domains one rank at a time, in candidate order. Each offer bumps
//! the curve's `counter` and is keyed by `(id, counter)`. Once the rank holding
//! the offer has answered, the hand-off resolves against the global live-curve
//! count as:
//!
//! | claimants                    | correction |
//! |------------------------------|------------|
//! | 1                            | 0          |
//! | 0 (every candidate declined) | −1 (lost)  |
//!
//! At most one offer of a curve is outstanding, so two ranks never both claim
//! it and the count is never corrected upwards. Every change of the global
//! count is then a termination, and no rank's view of it can fall below the
//! true count in whatever order messages from different ranks arrive.

use crate::advect::curve::{CurveId, IntegralCurve};
use hashbrown::HashMap;
use std::collections::VecDeque;

#[derive(Clone, Debug)]
struct Offer {
    curve: IntegralCurve,
    holder: usize,
    untried: VecDeque<usize>,
    offers: usize,
}

/// Outcome of feeding one acknowledgement into [`PendingAcks`].
#[derive(Clone, Debug, PartialEq)]
pub enum AckOutcome {
    /// The holder placed the curve; `offers` ranks were asked in total.
    Claimed { offers: usize },
    /// The holder declined; offer `curve` (its counter already bumped) to `to`.
    Reoffer { to: usize, curve: IntegralCurve },
    /// Every candidate owner declined.
    Lost { curve: IntegralCurve, offers: usize },
    /// No offer is pending under this key, or `from` does not hold it.
    Unexpected,
}

#[derive(Clone, Debug, Default)]
pub struct PendingAcks {
    entries: HashMap<(CurveId, u32), Offer>,
}

impl PendingAcks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `curve` (with the counter of this offer) was sent to
    /// `holder`; `fallback` ranks are tried in order if it declines.
    pub fn insert<I>(&mut self, curve: IntegralCurve, holder: usize, fallback: I)
    where
        I: IntoIterator<Item = usize>,
    {
        let key = curve.ack_key();
        self.entries.insert(
            key,
            Offer {
                curve,
                holder,
                untried: fallback.into_iter().collect(),
                offers: 1,
            },
        );
    }

    /// Feed the answer of `from` for `(id, counter)`.
    pub fn acknowledge(&mut self, id: CurveId, counter: u32, from: usize, used: bool) -> AckOutcome {
        let key = (id, counter);
        match self.entries.get(&key) {
            Some(offer) if offer.holder == from => {}
            _ => return AckOutcome::Unexpected,
        }
        let Some(mut offer) = self.entries.remove(&key) else {
            return AckOutcome::Unexpected;
        };
        if used {
            return AckOutcome::Claimed { offers: offer.offers };
        }
        let Some(next) = offer.untried.pop_front() else {
            return AckOutcome::Lost {
                curve: offer.curve,
                offers: offer.offers,
            };
        };
        offer.curve.counter += 1;
        offer.holder = next;
        offer.offers += 1;
        let curve = offer.curve.clone();
        self.entries.insert(curve.ack_key(), offer);
        AckOutcome::Reoffer { to: next, curve }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Rank currently holding the offer `(id, counter)`.
    pub fn holder(&self, id: CurveId, counter: u32) -> Option<usize> {
        self.entries.get(&(id, counter)).map(|o| o.holder)
    }
}
