//! The CP reasoner: a generic scheduler that wakes constraint propagators
//! when the bounds or literals they watch change, in priority order.

pub mod all_different;
pub mod cumulative;
pub mod disjunctive;
pub mod linear;

mod propagator;
pub use propagator::*;

use std::collections::VecDeque;
use std::sync::Arc;

use smallvec::SmallVec;

use crate::backtrack::{Backtrack, DecLvl, ObsTrailCursor};
use crate::collections::ref_store::{IterableRefMap, RefMap, RefVec};
use crate::collections::set::{IterableRefSet, RefSet};
use crate::core::state::{Domains, DomainsSnapshot, Event, Explanation, InferenceCause};
use crate::core::{IAtom, Lit, SignedVar, VarRef};
use crate::reasoners::{Contradiction, ReasonerId, Theory};

/// A watch on the upper bound of a signed variable: the propagator to wake
/// and the payload it asked to receive for this particular watch.
#[derive(Copy, Clone, Debug)]
struct BoundWatch {
    propagator: PropagatorId,
    payload: u32,
}

/// Watch registration surface handed to propagators during setup.
#[derive(Clone, Default)]
pub struct Watches {
    on_bound: RefMap<SignedVar, SmallVec<[BoundWatch; 4]>>,
}

impl Watches {
    /// Wakes `propagator` on every change of either bound of `watched`.
    pub fn add_watch(&mut self, watched: VarRef, propagator: PropagatorId) {
        self.add_ub_watch(watched, propagator);
        self.add_lb_watch(watched, propagator);
    }

    /// Wakes `propagator` on every upper bound change of the signed view.
    pub fn add_ub_watch(&mut self, watched: impl Into<SignedVar>, propagator: PropagatorId) {
        self.add_ub_watch_with_payload(watched, propagator, u32::MAX);
    }

    /// Same as [`Self::add_ub_watch`], tagging wake-ups with `payload` so an
    /// incremental propagator knows which watched item changed.
    pub fn add_ub_watch_with_payload(&mut self, watched: impl Into<SignedVar>, propagator: PropagatorId, payload: u32) {
        self.on_bound
            .get_mut_or_insert(watched.into(), SmallVec::new)
            .push(BoundWatch { propagator, payload });
    }

    /// Wakes `propagator` on every lower bound change of the signed view.
    pub fn add_lb_watch(&mut self, watched: impl Into<SignedVar>, propagator: PropagatorId) {
        self.add_ub_watch(watched.into().neg(), propagator);
    }

    pub fn add_lb_watch_with_payload(&mut self, watched: impl Into<SignedVar>, propagator: PropagatorId, payload: u32) {
        self.add_ub_watch_with_payload(watched.into().neg(), propagator, payload);
    }

    /// Wakes `propagator` when `watched` becomes true. The current
    /// implementation is not finer grained than bound watches: wake-ups may
    /// occur on any upper bound change of the underlying view.
    pub fn add_lit_watch(&mut self, watched: Lit, propagator: PropagatorId) {
        self.add_ub_watch(watched.svar(), propagator);
    }

    /// Wakes `propagator` on any change of the affine expression, i.e. on
    /// both bounds of its variable.
    pub fn add_affine_watch(&mut self, watched: IAtom, propagator: PropagatorId) {
        self.add_watch(watched.var, propagator);
    }

    fn get_ub_watches(&self, var: SignedVar) -> &[BoundWatch] {
        self.on_bound.get(var).map(|v| v.as_slice()).unwrap_or(&[])
    }
}

#[derive(Clone, Default)]
pub struct Stats {
    pub num_propagations: u64,
    pub num_wake_ups: u64,
}

/// The scheduler. Propagators are registered once and receive a dense
/// identifier; each time a watched bound changes they are queued at their
/// priority level and run lowest level first, FIFO within a level.
///
/// When a propagator produces new bound events the scan restarts from the
/// lowest priority, so cheap propagators always see the latest bounds before
/// an expensive one resumes.
#[derive(Clone)]
pub struct Cp {
    id: ReasonerId,
    constraints: RefVec<PropagatorId, DynPropagator>,
    priorities: RefVec<PropagatorId, PriorityLevel>,
    model_events: ObsTrailCursor<Event>,
    watches: Watches,
    saved: DecLvl,
    /// Propagators never run so far: they are propagated once at the root.
    pending_first_propagation: Vec<PropagatorId>,
    /// Propagators to call again at every root-level propagation.
    always_at_root: Vec<PropagatorId>,
    /// FIFO queue per priority level.
    queues: [VecDeque<PropagatorId>; NUM_PRIORITY_LEVELS],
    /// Propagators currently queued.
    in_queue: RefSet<PropagatorId>,
    /// Watch payloads recorded for queued propagators. An entry containing
    /// `u32::MAX` requests a full (non-incremental) propagation.
    payloads: IterableRefMap<PropagatorId, Vec<u32>>,
    /// Variables tightened since the last root fixed point.
    root_modified: IterableRefSet<VarRef>,
    /// Callback invoked with those variables on every root fixed point.
    root_modified_callback: Option<Arc<dyn Fn(&[VarRef]) + Send + Sync>>,
    /// External kill switch checked between propagator runs; when it fires,
    /// the level is left partially propagated.
    stop_propagation: Option<Arc<dyn Fn() -> bool + Send + Sync>>,
    pub stats: Stats,
}

impl Cp {
    pub fn new(id: ReasonerId) -> Cp {
        Cp {
            id,
            constraints: Default::default(),
            priorities: Default::default(),
            model_events: ObsTrailCursor::new(),
            watches: Default::default(),
            saved: DecLvl::ROOT,
            pending_first_propagation: Default::default(),
            always_at_root: Default::default(),
            queues: Default::default(),
            in_queue: Default::default(),
            payloads: Default::default(),
            root_modified: Default::default(),
            root_modified_callback: None,
            stop_propagation: None,
            stats: Default::default(),
        }
    }

    /// Registers a propagator with the given priority and returns its id.
    /// It will be propagated once on the next (root level) propagation.
    pub fn add_propagator(&mut self, propagator: impl Into<DynPropagator>, priority: PriorityLevel) -> PropagatorId {
        let mut propagator = propagator.into();
        let propagator_id = self.constraints.next_key();
        propagator.constraint.setup(propagator_id, &mut self.watches);
        self.constraints.set_next(propagator_id, propagator);
        self.priorities.set_next(propagator_id, priority);
        self.pending_first_propagation.push(propagator_id);
        propagator_id
    }

    pub fn set_propagator_priority(&mut self, id: PropagatorId, priority: PriorityLevel) {
        self.priorities[id] = priority;
    }

    /// Requests that `id` be propagated on every root-level propagation,
    /// regardless of watches.
    pub fn always_call_at_level_zero(&mut self, id: PropagatorId) {
        self.always_at_root.push(id);
    }

    /// Installs a callback receiving, at each root fixed point, the
    /// variables whose bounds were tightened since the previous one.
    pub fn on_root_level_modifications(&mut self, callback: Arc<dyn Fn(&[VarRef]) + Send + Sync>) {
        self.root_modified_callback = Some(callback);
    }

    /// Installs a kill switch polled between propagator runs.
    pub fn set_stop_propagation(&mut self, stop: Arc<dyn Fn() -> bool + Send + Sync>) {
        self.stop_propagation = Some(stop);
    }

    fn enqueue(&mut self, propagator: PropagatorId, payload: u32) {
        if !self.in_queue.contains(propagator) {
            self.in_queue.insert(propagator);
            self.queues[self.priorities[propagator] as usize].push_back(propagator);
        }
        self.payloads.get_mut_or_insert(propagator, Vec::new).push(payload);
    }

    /// Drains new domain events, waking the propagators that watch them.
    fn collect_wake_ups(&mut self, domains: &Domains) {
        let at_root = domains.current_decision_level() == DecLvl::ROOT;
        loop {
            let Some(event) = self.model_events.pop(domains.trail()).copied() else {
                break;
            };
            if at_root {
                self.root_modified.insert(event.affected_bound.variable());
            }
            let watches = self.watches.get_ub_watches(event.affected_bound).to_vec();
            for watch in watches {
                self.stats.num_wake_ups += 1;
                self.enqueue(watch.propagator, watch.payload);
            }
        }
    }

    fn next_in_queue(&mut self) -> Option<PropagatorId> {
        for queue in self.queues.iter_mut() {
            if let Some(p) = queue.pop_front() {
                return Some(p);
            }
        }
        None
    }

    fn should_stop(&self) -> bool {
        self.stop_propagation.as_ref().map(|f| f()).unwrap_or(false)
    }
}

impl Theory for Cp {
    fn identity(&self) -> ReasonerId {
        self.id
    }

    fn propagate(&mut self, domains: &mut Domains) -> Result<(), Contradiction> {
        let at_root = domains.current_decision_level() == DecLvl::ROOT;

        // first-time propagators and root-recurring ones
        for propagator in std::mem::take(&mut self.pending_first_propagation) {
            debug_assert!(at_root, "first propagation must occur at the root");
            self.enqueue(propagator, u32::MAX);
        }
        if at_root {
            for propagator in self.always_at_root.clone() {
                self.enqueue(propagator, u32::MAX);
            }
        }

        self.collect_wake_ups(domains);

        while let Some(propagator) = self.next_in_queue() {
            if self.should_stop() {
                // exit cleanly: the propagator stays queued for the next call
                // and the level is flagged as partially propagated
                self.queues[self.priorities[propagator] as usize].push_front(propagator);
                domains.mark_incomplete_propagation();
                return Ok(());
            }
            let idempotent = self.constraints[propagator].constraint.is_idempotent();
            let cause = self.id.cause(propagator);
            self.stats.num_propagations += 1;

            let payloads = self.payloads.get(propagator).cloned().unwrap_or_default();
            let full = payloads.iter().any(|&p| p == u32::MAX);

            // an idempotent propagator must not be woken by its own updates:
            // clear its queue entry only after the call; a non-idempotent one
            // is cleared before so that it can reschedule itself
            if !idempotent {
                self.in_queue.remove(propagator);
                if let Some(p) = self.payloads.get_mut(propagator) {
                    p.clear();
                }
            }

            let constraint = self.constraints[propagator].constraint.as_mut();
            let result = if full {
                constraint.propagate(domains, cause)
            } else {
                constraint.incremental_propagate(domains, cause, &payloads)
            };
            result?;

            self.collect_wake_ups(domains);

            if idempotent {
                // discard any wake-up the propagator caused on itself
                self.in_queue.remove(propagator);
                if let Some(p) = self.payloads.get_mut(propagator) {
                    p.clear();
                }
                for queue in self.queues.iter_mut() {
                    queue.retain(|&p| p != propagator);
                }
            }
        }

        if at_root && self.root_modified.len() > 0 {
            if let Some(callback) = &self.root_modified_callback {
                let vars: Vec<VarRef> = self.root_modified.iter().collect();
                callback(&vars);
            }
            self.root_modified.clear();
        }

        Ok(())
    }

    fn explain(
        &mut self,
        literal: Lit,
        context: InferenceCause,
        state: &DomainsSnapshot,
        out_explanation: &mut Explanation,
    ) {
        let constraint_id = PropagatorId::from(context.payload);
        let constraint = self.constraints[constraint_id].constraint.as_ref();
        constraint.explain(literal, state, out_explanation);
    }

    fn print_stats(&self) {
        println!("# constraints: {}", self.constraints.len());
        println!("# propagations: {}", self.stats.num_propagations);
    }

    fn clone_box(&self) -> Box<dyn Theory> {
        Box::new(self.clone())
    }
}

impl Backtrack for Cp {
    fn save_state(&mut self) -> DecLvl {
        self.saved += 1;
        self.saved
    }

    fn num_saved(&self) -> u32 {
        self.saved.to_int()
    }

    fn restore_last(&mut self) {
        self.saved -= 1;
    }
}

#[cfg(test)]
mod tests {
    use super::propagator::test_propagator::ImpliesProp;
    use super::*;
    use crate::core::state::Cause;

    #[test]
    fn scheduler_wakes_watching_propagators() {
        let mut domains = Domains::new();
        let a = domains.new_var(0, 1).geq(1);
        let b = domains.new_var(0, 1).geq(1);
        let c = domains.new_var(0, 1).geq(1);
        let mut cp = Cp::new(ReasonerId::Cp);
        let _ = cp.add_propagator(ImpliesProp { a, b }, PriorityLevel::Fast);
        let _ = cp.add_propagator(ImpliesProp { a: b, b: c }, PriorityLevel::Fast);

        // initial propagation at root: no-op
        cp.propagate(&mut domains).unwrap();
        assert_eq!(domains.value(b), None);

        let _ = domains.save_state();
        let _ = cp.save_state();
        domains.decide(a).unwrap();
        cp.propagate(&mut domains).unwrap();
        // the chain a => b => c is propagated in a single call, as the
        // second propagator is woken by the first one's update
        assert_eq!(domains.value(b), Some(true));
        assert_eq!(domains.value(c), Some(true));
    }

    #[test]
    fn conflict_is_surfaced() {
        let mut domains = Domains::new();
        let a = domains.new_var(0, 1).geq(1);
        let b = domains.new_var(0, 1).geq(1);
        let mut cp = Cp::new(ReasonerId::Cp);
        let _ = cp.add_propagator(ImpliesProp { a, b }, PriorityLevel::Fast);

        cp.propagate(&mut domains).unwrap();
        let _ = domains.save_state();
        let _ = cp.save_state();
        domains.decide(!b).unwrap();
        domains.set(a, Cause::Decision).unwrap();
        assert!(cp.propagate(&mut domains).is_err());
    }
}
