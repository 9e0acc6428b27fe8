//! Distributed advection control loop.
//!
//! Each rank owns a queue of curves it has claimed. It advances a bounded batch
//! of them, hands curves that left its domains to the owners of their new
//! candidate domains, and services inbound traffic. Termination is detected by
//! a per-rank view of the global live-curve count, kept current by signed
//! `TERMINATE_COUNT` deltas and by the acknowledgement reconciliation in
//! [`PendingAcks`]. The only collective calls are the sums at seeding and at
//! continuation; the steady-state loop is purely point-to-point.
//!
//! A curve with several remote candidate owners is offered to them one at a
//! time (see [`PendingAcks`]). The count therefore only ever decreases, each
//! decrease is a real termination, and no rank's view of it can fall below the
//! true count, so no rank mistakes a transient zero for quiescence while a
//! curve addressed to it is still in flight.
//!
//! The one blocking receive happens when the local queue is empty while work is
//! still outstanding somewhere (global count > 0, or hand-offs of this rank
//! awaiting acknowledgement). Any unflushed count delta is sent before that.

use crate::advect::config::{AdvectCommTags, AdvectConfig};
use crate::advect::curve::{CurveId, CurveStatus, IntegralCurve, TerminationReason};
use crate::advect::pending::{AckOutcome, PendingAcks};
use crate::advect::progress::{AdvectStats, NoProgress, ProgressSink};
use crate::algs::communicator::{Communicator, Envelope};
use crate::algs::wire::{ControlMessage, decode_control, decode_curves, encode_control, encode_curves};
use crate::debug_invariants::DebugInvariants;
use crate::geometry::locator::CellLocator;
use crate::mesh_error::MeshAdvectError;
use crate::topology::domain::DomainId;
use crate::topology::ownership::DomainOwnership;
use hashbrown::HashSet;
use std::collections::VecDeque;

/// External single-step integrator.
///
/// An implementation moves the curve (usually through
/// [`IntegralCurve::move_to`]) and may set its status to `Terminated` or
/// `OutOfBounds`. A curve left `Ok` is re-checked against its claimed domain.
pub trait Advector {
    fn advance(&mut self, curve: &mut IntegralCurve);
}

impl<F: FnMut(&mut IntegralCurve)> Advector for F {
    fn advance(&mut self, curve: &mut IntegralCurve) {
        self(curve)
    }
}

/// What one call to [`ParallelAdvection::step`] did.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct StepOutcome {
    pub advanced: usize,
    pub messages: usize,
    pub done: bool,
}

pub struct ParallelAdvection<C, L, A, P = NoProgress> {
    comm: C,
    locator: L,
    advector: A,
    ownership: DomainOwnership,
    config: AdvectConfig,
    tags: AdvectCommTags,
    progress: P,
    time_step: u32,
    active: VecDeque<IntegralCurve>,
    terminated: Vec<IntegralCurve>,
    set_aside: Vec<IntegralCurve>,
    pending: PendingAcks,
    global_total: i64,
    initial_total: i64,
    num_ic_change: i64,
    stats: AdvectStats,
}

impl<C, L, A> ParallelAdvection<C, L, A, NoProgress>
where
    C: Communicator,
    L: CellLocator,
    A: Advector,
{
    pub fn new(
        comm: C,
        locator: L,
        advector: A,
        ownership: DomainOwnership,
        config: AdvectConfig,
    ) -> Result<Self, MeshAdvectError> {
        config.validate()?;
        if ownership.my_rank() != comm.rank() || ownership.n_ranks() != comm.size() {
            return Err(MeshAdvectError::InvalidConfig(format!(
                "ownership map is for rank {}/{} but communicator is rank {}/{}",
                ownership.my_rank(),
                ownership.n_ranks(),
                comm.rank(),
                comm.size()
            )));
        }
        let tags = config.tags();
        Ok(Self {
            comm,
            locator,
            advector,
            ownership,
            config,
            tags,
            progress: NoProgress,
            time_step: 0,
            active: VecDeque::new(),
            terminated: Vec::new(),
            set_aside: Vec::new(),
            pending: PendingAcks::new(),
            global_total: 0,
            initial_total: 0,
            num_ic_change: 0,
            stats: AdvectStats::default(),
        })
    }
}

impl<C, L, A, P> ParallelAdvection<C, L, A, P>
where
    C: Communicator,
    L: CellLocator,
    A: Advector,
    P: ProgressSink,
{
    /// Replace the progress sink.
    pub fn with_progress<Q: ProgressSink>(self, progress: Q) -> ParallelAdvection<C, L, A, Q> {
        ParallelAdvection {
            comm: self.comm,
            locator: self.locator,
            advector: self.advector,
            ownership: self.ownership,
            config: self.config,
            tags: self.tags,
            progress,
            time_step: self.time_step,
            active: self.active,
            terminated: self.terminated,
            set_aside: self.set_aside,
            pending: self.pending,
            global_total: self.global_total,
            initial_total: self.initial_total,
            num_ic_change: self.num_ic_change,
            stats: self.stats,
        }
    }

    /// Time step whose decomposition candidate lists are computed against.
    pub fn set_time_step(&mut self, time_step: u32) {
        self.time_step = time_step;
    }

    // ----------------------------------------------------------------------
    // Accessors
    // ----------------------------------------------------------------------

    pub fn rank(&self) -> usize {
        self.comm.rank()
    }

    pub fn global_total(&self) -> i64 {
        self.global_total
    }

    pub fn initial_total(&self) -> i64 {
        self.initial_total
    }

    /// Count delta accumulated locally and not yet flushed.
    pub fn pending_delta(&self) -> i64 {
        self.num_ic_change
    }

    pub fn pending_acks(&self) -> &PendingAcks {
        &self.pending
    }

    pub fn active_curves(&self) -> impl ExactSizeIterator<Item = &IntegralCurve> + '_ {
        self.active.iter()
    }

    /// `(id, counter)` of every active curve.
    pub fn active_keys(&self) -> Vec<(CurveId, u32)> {
        self.active.iter().map(IntegralCurve::ack_key).collect()
    }

    pub fn terminated_curves(&self) -> &[IntegralCurve] {
        &self.terminated
    }

    /// Drain the terminated stream for the downstream consumer.
    pub fn take_terminated(&mut self) -> Vec<IntegralCurve> {
        std::mem::take(&mut self.terminated)
    }

    /// Curves permanently done and excluded from continuation.
    pub fn set_aside_curves(&self) -> &[IntegralCurve] {
        &self.set_aside
    }

    pub fn stats(&self) -> AdvectStats {
        self.stats
    }

    pub fn communicator(&self) -> &C {
        &self.comm
    }

    /// Nothing left to do on this rank, and no work anywhere as far as it knows.
    pub fn is_quiescent(&self) -> bool {
        self.global_total <= 0
            && self.active.is_empty()
            && self.pending.is_empty()
            && self.num_ic_change == 0
    }

    // ----------------------------------------------------------------------
    // Seeding
    // ----------------------------------------------------------------------

    /// Claim the seeds whose location lies in a domain owned here, then sum the
    /// claimed counts across ranks. Returns the global total.
    ///
    /// Every rank must call this with the same seeds, in the same order.
    pub fn initialize<I>(&mut self, seeds: I) -> Result<i64, MeshAdvectError>
    where
        I: IntoIterator<Item = IntegralCurve>,
    {
        let me = self.comm.rank();
        let mut offered = 0usize;
        for mut seed in seeds {
            offered += 1;
            seed.seed_pt_domain_list = self
                .locator
                .candidate_domains(&seed.location, self.time_step);
            match self.first_owned_containing(&seed.seed_pt_domain_list, &seed.location) {
                Some(domain) => {
                    seed.domain = domain;
                    seed.status = CurveStatus::Ok;
                    seed.originating_rank = me;
                    if !self.config.record_history {
                        seed.history.truncate(1);
                    }
                    self.active.push_back(seed);
                }
                None => log::trace!(
                    "rank {me}: seed {} at {:?} not in any owned domain",
                    seed.id,
                    seed.location
                ),
            }
        }
        let local = self.active.len() as i64;
        self.global_total = self.comm.all_reduce_sum(local)?;
        self.initial_total = self.global_total;
        log::debug!(
            "rank {me}: claimed {local} of {offered} seeds, global total {}",
            self.global_total
        );
        self.report_progress();
        self.debug_assert_invariants();
        Ok(self.global_total)
    }

    fn first_owned_containing(&self, candidates: &[DomainId], point: &[f64; 3]) -> Option<DomainId> {
        candidates
            .iter()
            .copied()
            .find(|&d| self.ownership.owns_domain(d) && self.locator.contains(d, point))
    }

    // ----------------------------------------------------------------------
    // Main loop
    // ----------------------------------------------------------------------

    /// Run until this rank observes global quiescence.
    pub fn run_algorithm(&mut self) -> Result<(), MeshAdvectError> {
        while !self.is_quiescent() {
            self.step(true)?;
        }
        log::debug!(
            "rank {}: quiescent after {} advances, {} terminated locally",
            self.comm.rank(),
            self.stats.advanced,
            self.terminated.len()
        );
        Ok(())
    }

    /// One iteration: advance a batch, flush the count delta if idle, service
    /// inbound messages. With `allow_block`, an idle rank waits for a message.
    pub fn step(&mut self, allow_block: bool) -> Result<StepOutcome, MeshAdvectError> {
        let mut outcome = StepOutcome::default();
        while outcome.advanced < self.config.max_count {
            let Some(curve) = self.active.pop_front() else {
                break;
            };
            self.advance_one(curve)?;
            outcome.advanced += 1;
        }

        if self.active.is_empty() && self.num_ic_change != 0 {
            self.flush_count();
        }

        let block = allow_block
            && self.active.is_empty()
            && (self.global_total > 0 || !self.pending.is_empty());
        outcome.messages = self.receive(block)?;
        outcome.done = self.is_quiescent();
        self.debug_assert_invariants();
        Ok(outcome)
    }

    fn advance_one(&mut self, mut curve: IntegralCurve) -> Result<(), MeshAdvectError> {
        self.advector.advance(&mut curve);
        self.stats.advanced += 1;
        if !self.config.record_history && curve.history.len() > 1 {
            let keep = curve.history.len() - 1;
            curve.history.drain(..keep);
        }
        if let Some(max) = self.config.max_steps {
            if curve.steps_taken >= max && !curve.status.is_terminated() {
                curve.terminate(TerminationReason::MaxSteps);
            }
        }
        match curve.status {
            CurveStatus::Terminated(_) => self.retire(curve),
            CurveStatus::OutOfBounds => self.handle_out_of_bounds_curve(curve)?,
            CurveStatus::Ok => {
                if self.locator.contains(curve.domain, &curve.location) {
                    self.active.push_back(curve);
                } else {
                    curve.status = CurveStatus::OutOfBounds;
                    self.handle_out_of_bounds_curve(curve)?;
                }
            }
        }
        Ok(())
    }

    fn retire(&mut self, curve: IntegralCurve) {
        log::trace!(
            "rank {}: {} terminated ({:?}) after {} steps",
            self.comm.rank(),
            curve.id,
            curve.status,
            curve.steps_taken
        );
        self.stats.terminated += 1;
        self.num_ic_change -= 1;
        self.terminated.push(curve);
    }

    /// Route a curve that left its claimed domain.
    ///
    /// Placement in a domain owned here wins and nothing is sent. Otherwise the
    /// curve is offered to the first distinct remote owner of a candidate
    /// domain, and to the next one each time an owner declines. The local copy
    /// is kept only for re-offering and is never advanced here.
    pub fn handle_out_of_bounds_curve(&mut self, mut curve: IntegralCurve) -> Result<(), MeshAdvectError> {
        let me = self.comm.rank();
        curve.seed_pt_domain_list = self
            .locator
            .candidate_domains(&curve.location, self.time_step);
        if curve.seed_pt_domain_list.is_empty() {
            curve.terminate(TerminationReason::ExitedMesh);
            self.retire(curve);
            return Ok(());
        }

        if let Some(domain) = self.first_owned_containing(&curve.seed_pt_domain_list, &curve.location) {
            curve.domain = domain;
            curve.status = CurveStatus::Ok;
            self.active.push_back(curve);
            return Ok(());
        }

        let remote: Vec<usize> = self
            .ownership
            .owning_ranks(curve.seed_pt_domain_list.iter())?
            .into_iter()
            .filter(|&r| r != me)
            .collect();
        if remote.is_empty() {
            log::debug!(
                "rank {me}: {} at {:?} falls between owned candidates {:?}",
                curve.id,
                curve.location,
                curve.seed_pt_domain_list
            );
            self.stats.lost += 1;
            curve.terminate(TerminationReason::Lost);
            self.retire(curve);
            return Ok(());
        }

        curve.counter += 1;
        curve.originating_rank = me;
        curve.status = CurveStatus::Ok;
        if remote.len() > 1 {
            log::trace!(
                "rank {me}: {} (counter {}) has candidate owners {:?}",
                curve.id,
                curve.counter,
                remote
            );
        }
        let holder = remote[0];
        self.send_curve(holder, &curve);
        self.pending.insert(curve, holder, remote[1..].iter().copied());
        Ok(())
    }

    fn send_curve(&mut self, to: usize, curve: &IntegralCurve) {
        self.comm.isend(to, self.tags.curves, &encode_curves([curve]));
        self.stats.sent += 1;
    }

    /// Place a curve received from `sender` and acknowledge it.
    pub fn process_incoming_curve(&mut self, mut curve: IntegralCurve, sender: usize) {
        self.stats.received += 1;
        curve.seed_pt_domain_list = self
            .locator
            .candidate_domains(&curve.location, self.time_step);
        let (id, counter) = curve.ack_key();
        let reply = match self.first_owned_containing(&curve.seed_pt_domain_list, &curve.location) {
            Some(domain) => {
                curve.domain = domain;
                curve.status = CurveStatus::Ok;
                self.active.push_back(curve);
                self.stats.accepted += 1;
                ControlMessage::Used { id, counter }
            }
            None => {
                log::debug!(
                    "rank {}: {id} (counter {counter}) from rank {sender} not placeable here",
                    self.comm.rank()
                );
                self.stats.rejected += 1;
                ControlMessage::NotUsed { id, counter }
            }
        };
        self.comm
            .isend(sender, self.tags.control, &encode_control(reply));
    }

    /// Apply a count delta or an acknowledgement from `from`.
    pub fn process_incoming_control_message(&mut self, msg: ControlMessage, from: usize) {
        let (id, counter, used) = match msg {
            ControlMessage::TerminateCount(delta) => {
                self.apply_total_delta(delta);
                return;
            }
            ControlMessage::Used { id, counter } => (id, counter, true),
            ControlMessage::NotUsed { id, counter } => (id, counter, false),
        };
        match self.pending.acknowledge(id, counter, from, used) {
            AckOutcome::Claimed { offers } => {
                if offers > 1 {
                    log::debug!(
                        "rank {}: {id} claimed by rank {from} after {offers} offers",
                        self.comm.rank()
                    );
                }
            }
            AckOutcome::Reoffer { to, curve } => {
                log::debug!(
                    "rank {}: {id} (counter {counter}) declined by rank {from}, offering to rank {to}",
                    self.comm.rank()
                );
                self.stats.reoffered += 1;
                self.send_curve(to, &curve);
            }
            AckOutcome::Lost { mut curve, offers } => {
                log::warn!(
                    "rank {}: {id} was declined by all {offers} candidate owners; counted as lost",
                    self.comm.rank()
                );
                self.stats.lost += 1;
                curve.terminate(TerminationReason::Lost);
                self.retire(curve);
            }
            AckOutcome::Unexpected => log::warn!(
                "rank {}: stray acknowledgement for {id} (counter {counter}) from rank {from}",
                self.comm.rank()
            ),
        }
    }

    fn dispatch(&mut self, env: Envelope) -> Result<(), MeshAdvectError> {
        if env.tag == self.tags.curves {
            for curve in decode_curves(&env.payload)? {
                self.process_incoming_curve(curve, env.source);
            }
        } else if env.tag == self.tags.control {
            let msg = decode_control(&env.payload)?;
            self.process_incoming_control_message(msg, env.source);
        } else {
            log::warn!(
                "rank {}: ignoring message with tag {:?} from rank {}",
                self.comm.rank(),
                env.tag,
                env.source
            );
        }
        Ok(())
    }

    /// Drain the mailbox; the first receive blocks when `block` is set.
    fn receive(&mut self, block: bool) -> Result<usize, MeshAdvectError> {
        let mut n = 0;
        let mut next = self.comm.recv_any(block)?;
        while let Some(env) = next {
            self.dispatch(env)?;
            n += 1;
            next = self.comm.recv_any(false)?;
        }
        Ok(n)
    }

    fn flush_count(&mut self) {
        let delta = std::mem::take(&mut self.num_ic_change);
        let bytes = encode_control(ControlMessage::TerminateCount(delta));
        let me = self.comm.rank();
        for r in (0..self.comm.size()).filter(|&r| r != me) {
            self.comm.isend(r, self.tags.control, &bytes);
            self.stats.count_messages += 1;
        }
        self.apply_total_delta(delta);
    }

    fn apply_total_delta(&mut self, delta: i64) {
        if delta == 0 {
            return;
        }
        self.global_total += delta;
        self.report_progress();
    }

    fn report_progress(&mut self) {
        let total = self.global_total.max(0) as u64;
        let completed = self.initial_total.saturating_sub(self.global_total).max(0) as u64;
        self.progress.update_progress(completed, total);
    }

    // ----------------------------------------------------------------------
    // Continuation
    // ----------------------------------------------------------------------

    /// Prepare the terminated curves for another run at `time_step`.
    ///
    /// Curves on the exit sentinel are set aside for good; the rest are reset
    /// and routed through the out-of-bounds path against the new
    /// decomposition. Collective: every rank must call it after its previous
    /// [`run_algorithm`](Self::run_algorithm) returned. Returns the new global
    /// total.
    ///
    /// The new total is summed across ranks before any curve is routed. That
    /// sum doubles as a barrier: every rank is on `time_step` before any curve
    /// of `time_step` can reach it.
    pub fn reset_integral_curves_for_continue_execute(&mut self, time_step: u32) -> Result<i64, MeshAdvectError> {
        self.time_step = time_step;
        let mut keep = Vec::new();
        for curve in self.terminated.drain(..) {
            if curve.domain.is_exited() {
                self.set_aside.push(curve);
            } else {
                keep.push(curve);
            }
        }
        let local = keep.len() as i64;
        self.global_total = self.comm.all_reduce_sum(local)?;
        self.initial_total = self.global_total;
        log::debug!(
            "rank {}: continuing {local} curves at time step {time_step}, global total {}",
            self.comm.rank(),
            self.global_total
        );
        self.report_progress();
        for mut curve in keep {
            curve.status = CurveStatus::Ok;
            self.handle_out_of_bounds_curve(curve)?;
        }
        self.debug_assert_invariants();
        Ok(self.global_total)
    }
}

impl<C, L, A, P> DebugInvariants for ParallelAdvection<C, L, A, P>
where
    C: Communicator,
{
    fn debug_assert_invariants(&self) {
        crate::debug_invariants!(self.validate_invariants(), "ParallelAdvection");
    }

    fn validate_invariants(&self) -> Result<(), MeshAdvectError> {
        let mut seen = HashSet::new();
        for c in &self.active {
            if !seen.insert(c.ack_key()) {
                return Err(MeshAdvectError::InvalidConfig(format!(
                    "{} (counter {}) queued twice on rank {}",
                    c.id,
                    c.counter,
                    self.comm.rank()
                )));
            }
            if !self.ownership.owns_domain(c.domain) {
                return Err(MeshAdvectError::InvalidConfig(format!(
                    "{} claims domain {} not owned by rank {}",
                    c.id,
                    c.domain,
                    self.comm.rank()
                )));
            }
            if c.status.is_terminated() {
                return Err(MeshAdvectError::InvalidConfig(format!(
                    "{} is terminated but still active",
                    c.id
                )));
            }
        }
        if let Some(c) = self.terminated.iter().find(|c| !c.status.is_terminated()) {
            return Err(MeshAdvectError::InvalidConfig(format!(
                "{} is in the terminated list with status {:?}",
                c.id, c.status
            )));
        }
        Ok(())
    }
}
