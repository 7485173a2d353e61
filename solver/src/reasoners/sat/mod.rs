//! Clausal reasoning: clause database, two-watched-literal unit propagation
//! and learnt-clause management.

mod clauses;

pub use clauses::{Clause, ClauseDb, ClauseId, ClausesParams};

use std::collections::VecDeque;

use crate::backtrack::{Backtrack, DecLvl, ObsTrailCursor, Trail};
use crate::collections::set::RefSet;
use crate::core::literals::{Disjunction, WatchSet, Watches};
use crate::core::state::{Domains, DomainsSnapshot, Event, Explanation, InferenceCause};
use crate::core::*;
use crate::reasoners::{Contradiction, ReasonerId, Theory};

/// Tracks which clauses are locked: a clause that asserted a literal must
/// stay in the database as it may be needed for an explanation.
#[derive(Clone)]
struct ClauseLocks {
    locked: RefSet<ClauseId>,
    count: usize,
}

impl ClauseLocks {
    fn new() -> Self {
        ClauseLocks {
            locked: Default::default(),
            count: 0,
        }
    }

    fn contains(&self, clause: ClauseId) -> bool {
        self.locked.contains(clause)
    }

    fn lock(&mut self, clause: ClauseId) {
        debug_assert!(!self.locked.contains(clause));
        self.locked.insert(clause);
        self.count += 1;
    }

    fn unlock(&mut self, clause: ClauseId) {
        debug_assert!(self.locked.contains(clause));
        self.locked.remove(clause);
        self.count -= 1;
    }
}

#[derive(Clone)]
enum SatEvent {
    Lock(ClauseId),
}

/// Growth policy of the learnt-clause database.
#[derive(Clone)]
pub struct SearchParams {
    /// With N problem clauses, the initial learnt capacity is
    /// `init_learnt_base + N * init_learnt_ratio`.
    init_learnt_ratio: f64,
    init_learnt_base: f64,
    /// Capacity multiplier applied on each expansion.
    db_expansion_ratio: f64,
    /// Multiplier on the number of conflicts between two expansions.
    increase_ratio_of_conflicts_before_db_expansion: f64,
}

impl Default for SearchParams {
    fn default() -> Self {
        SearchParams {
            init_learnt_ratio: 1_f64 / 3_f64,
            init_learnt_base: 1000_f64,
            db_expansion_ratio: 1.05_f64,
            increase_ratio_of_conflicts_before_db_expansion: 1.5_f64,
        }
    }
}

#[derive(Clone)]
struct SearchState {
    allowed_learnt: f64,
    conflicts_at_last_db_expansion: u64,
    allowed_conflicts_before_db_expansion: u64,
}

impl Default for SearchState {
    fn default() -> Self {
        SearchState {
            allowed_learnt: f64::NAN,
            conflicts_at_last_db_expansion: 0,
            allowed_conflicts_before_db_expansion: 100,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Stats {
    pub conflicts: u64,
    pub propagations: u64,
}

/// A clause recorded but not yet integrated into the watch lists.
#[derive(Copy, Clone)]
struct PendingClause {
    clause: ClauseId,
    /// When set, this literal is entailed by the clause at the current level
    /// and must be asserted with the clause as its cause, even if the clause
    /// is not unit (asserting clauses from conflict analysis).
    asserted_literal: Option<Lit>,
}

/// The clausal reasoner: unit propagation over the shared domain store.
#[derive(Clone)]
pub struct SatSolver {
    clauses: ClauseDb,
    watches: Watches<ClauseId>,
    events_stream: ObsTrailCursor<Event>,
    identity: ReasonerId,
    /// Clauses added to the database but not yet processed.
    pending_clauses: VecDeque<PendingClause>,
    locks: ClauseLocks,
    trail: Trail<SatEvent>,
    params: SearchParams,
    state: SearchState,
    pub stats: Stats,
    /// Working buffer, kept to avoid reallocation during propagation.
    working_watches: WatchSet<ClauseId>,
}

impl SatSolver {
    pub fn new(identity: ReasonerId) -> SatSolver {
        SatSolver {
            clauses: ClauseDb::new(ClausesParams::default()),
            watches: Watches::default(),
            events_stream: ObsTrailCursor::new(),
            identity,
            pending_clauses: Default::default(),
            locks: ClauseLocks::new(),
            trail: Default::default(),
            params: Default::default(),
            state: Default::default(),
            stats: Default::default(),
            working_watches: Default::default(),
        }
    }

    /// Adds a clause of the problem definition.
    /// Returns a stable identifier for it.
    pub fn add_clause(&mut self, clause: impl Into<Disjunction>) -> ClauseId {
        self.add_clause_impl(clause.into(), false)
    }

    /// Adds the clause `!from v to`.
    pub fn add_implication(&mut self, from: Lit, to: Lit) -> ClauseId {
        self.add_clause([!from, to])
    }

    /// Adds a clause that is implied by the problem clauses, and that the
    /// solver may forget when trimming its database.
    pub fn add_forgettable_clause(&mut self, clause: impl Into<Disjunction>) {
        let _ = self.add_clause_impl(clause.into(), true);
    }

    /// Adds an asserting clause produced by conflict analysis. On the next
    /// propagation the `asserted` literal will be set with this clause as
    /// its cause.
    pub fn add_learnt_clause(&mut self, clause: impl Into<Disjunction>, asserted: Lit) {
        self.stats.conflicts += 1;
        let clause = clause.into();
        debug_assert!(clause.contains(asserted));
        let cl_id = self.clauses.add_clause(Clause::new(clause), true);
        self.pending_clauses.push_back(PendingClause {
            clause: cl_id,
            asserted_literal: Some(asserted),
        });
    }

    fn add_clause_impl(&mut self, clause: Disjunction, learnt: bool) -> ClauseId {
        let cl_id = self.clauses.add_clause(Clause::new(clause), learnt);
        self.pending_clauses.push_back(PendingClause {
            clause: cl_id,
            asserted_literal: None,
        });
        cl_id
    }

    /// Integrates a newly added clause, making no assumption on its current
    /// status. Returns the clause if it is violated.
    fn process_arbitrary_clause(&mut self, cl_id: ClauseId, model: &mut Domains) -> Option<ClauseId> {
        let clause = &self.clauses[cl_id];
        if clause.has_single_literal() {
            let l = clause.watch1;
            self.watches.add_watch(cl_id, !l);
            return match model.value(l) {
                None => {
                    self.set_from_unit_propagation(l, cl_id, model);
                    None
                }
                Some(true) => None,
                Some(false) => Some(cl_id),
            };
        }
        debug_assert!(clause.len() >= 2);

        // select the two most relevant literals to watch
        self.move_watches_front(cl_id, model);
        let clause = &self.clauses[cl_id];
        let l0 = clause.watch1;
        let l1 = clause.watch2;

        if model.entails(l0) {
            // satisfied: set up watches and leave the state unchanged
            self.set_watch_on_first_literals(cl_id);
            None
        } else if model.entails(!l0) {
            // violated
            self.set_watch_on_first_literals(cl_id);
            Some(cl_id)
        } else if model.value(l1).is_none() {
            // pending: both watches unset
            self.set_watch_on_first_literals(cl_id);
            None
        } else {
            // unit: set the only unset literal
            debug_assert!(model.value(l0).is_none());
            self.set_watch_on_first_literals(cl_id);
            self.set_from_unit_propagation(l0, cl_id, model);
            None
        }
    }

    fn move_watches_front(&mut self, cl_id: ClauseId, model: &Domains) {
        self.clauses[cl_id].move_watches_front(
            |l| model.value(l),
            |l| {
                debug_assert_eq!(model.value(l), Some(true));
                model.implying_event(l)
            },
        );
    }

    /// Watches the negations of the two first literals.
    fn set_watch_on_first_literals(&mut self, cl_id: ClauseId) {
        let clause = &self.clauses[cl_id];
        debug_assert!(clause.len() >= 2);
        self.watches.add_watch(cl_id, !clause.watch1);
        self.watches.add_watch(cl_id, !clause.watch2);
    }

    pub fn propagate(&mut self, model: &mut Domains) -> Result<(), Explanation> {
        match self.propagate_impl(model) {
            Ok(()) => Ok(()),
            Err(violated) => {
                let clause = &self.clauses[violated];
                let mut explanation = Explanation::with_capacity(clause.len());
                for b in clause.literals() {
                    explanation.push(!b);
                }
                self.clauses.bump_activity(violated);
                Err(explanation)
            }
        }
    }

    fn propagate_impl(&mut self, model: &mut Domains) -> Result<(), ClauseId> {
        // integrate all clauses added since the last propagation
        while let Some(PendingClause {
            clause,
            asserted_literal,
        }) = self.pending_clauses.pop_front()
        {
            if let Some(conflict) = self.process_arbitrary_clause(clause, model) {
                return Err(conflict);
            }
            if let Some(asserted) = asserted_literal {
                if !model.entails(asserted) {
                    debug_assert!(!model.entails(!asserted));
                    self.set_from_unit_propagation(asserted, clause, model);
                }
            }
        }
        self.scale_database();
        self.propagate_enqueued(model)
    }

    /// Propagates all outstanding domain events through the watch lists.
    fn propagate_enqueued(&mut self, model: &mut Domains) -> Result<(), ClauseId> {
        debug_assert!(self.pending_clauses.is_empty());
        // take ownership of the working watch set to sidestep the borrow of self
        let mut working_watches = WatchSet::new();
        std::mem::swap(&mut self.working_watches, &mut working_watches);

        let mut result = Ok(());
        while let Some(&ev) = self.events_stream.pop(model.trail()) {
            let new_lit = ev.new_literal();

            working_watches.clear();
            self.watches.move_watches_to(new_lit, &mut working_watches);

            let mut contradicting_clause = None;
            for watch in working_watches.all_watches() {
                let watched_literal = watch.to_lit(new_lit.svar());
                let clause = watch.watcher;
                if self.clauses.is_dead(clause) {
                    continue; // reclaimed while its watch was queued
                }
                if contradicting_clause.is_none() && ev.makes_true(watched_literal) {
                    if !self.propagate_clause(clause, new_lit, model) {
                        contradicting_clause = Some(clause);
                    }
                } else {
                    // not triggered (or a conflict already occurred): restore the watch
                    self.watches.add_watch(clause, watched_literal);
                }
            }
            if let Some(violated) = contradicting_clause {
                result = Err(violated);
                break;
            }
        }
        std::mem::swap(&mut self.working_watches, &mut working_watches);
        result
    }

    /// Propagates the clause that was watching `p`, which just became true.
    /// The watch was removed; this method is responsible for resetting a
    /// valid one. Returns false if the clause is violated.
    fn propagate_clause(&mut self, clause_id: ClauseId, p: Lit, model: &mut Domains) -> bool {
        debug_assert_eq!(model.value(p), Some(true));
        debug_assert!(!self.watches.is_watched_by(p, clause_id));
        let clause = &mut self.clauses[clause_id];
        if clause.has_single_literal() {
            debug_assert!(p.entails(!clause.watch1));
            self.watches.add_watch(clause_id, p);
            return false;
        }
        if p.entails(!clause.watch1) {
            clause.swap_watches();
        }
        debug_assert!(p.entails(!clause.watch2));

        if model.entails(clause.watch1) {
            // satisfied: restore the watch and exit
            self.watches.add_watch(clause_id, !clause.watch2);
            return true;
        }
        // search the unwatched literals for a replacement watch
        for i in 0..clause.unwatched().len() {
            let lit = clause.unwatched()[i];
            if !model.entails(!lit) {
                clause.set_watch2(i);
                self.watches.add_watch(clause_id, !lit);
                return true;
            }
        }
        // no replacement: the clause is unit or violated
        self.watches.add_watch(clause_id, !clause.watch2);
        let first_lit = clause.watch1;
        match model.value(first_lit) {
            Some(true) => true,
            Some(false) => false,
            None => {
                self.set_from_unit_propagation(first_lit, clause_id, model);
                true
            }
        }
    }

    fn set_from_unit_propagation(&mut self, literal: Lit, propagating_clause: ClauseId, model: &mut Domains) {
        // from the invariants of unit propagation, the update cannot fail
        let changed_something = model.set(literal, self.identity.cause(propagating_clause)).unwrap();
        if changed_something {
            // lock the clause: it may be needed to explain the assignment
            self.lock(propagating_clause);
            self.stats.propagations += 1;
        }
    }

    fn lock(&mut self, clause: ClauseId) {
        self.locks.lock(clause);
        self.trail.push(SatEvent::Lock(clause));
    }

    /// Reclaims learnt clauses if their number exceeds the current allowance.
    fn scale_database(&mut self) {
        if self.state.allowed_learnt.is_nan() {
            let initial_clauses = self.clauses.num_clauses() - self.clauses.num_learnt();
            self.state.allowed_learnt =
                self.params.init_learnt_base + initial_clauses as f64 * self.params.init_learnt_ratio;
        }
        if self.clauses.num_learnt() as i64 - self.locks.count as i64 >= self.state.allowed_learnt as i64 {
            let locks = &self.locks;
            let watches = &mut self.watches;
            self.clauses.reduce_db(
                |cl| locks.contains(cl),
                &mut |cl, w1, w2| {
                    watches.remove_watch(cl, w1);
                    if w1 != w2 {
                        watches.remove_watch(cl, w2);
                    }
                },
            );
            if self.stats.conflicts - self.state.conflicts_at_last_db_expansion
                >= self.state.allowed_conflicts_before_db_expansion
            {
                self.state.allowed_learnt *= self.params.db_expansion_ratio;
                self.state.conflicts_at_last_db_expansion = self.stats.conflicts;
                self.state.allowed_conflicts_before_db_expansion = (self.state.allowed_conflicts_before_db_expansion
                    as f64
                    * self.params.increase_ratio_of_conflicts_before_db_expansion)
                    as u64;
            }
        }
    }
}

impl Theory for SatSolver {
    fn identity(&self) -> ReasonerId {
        self.identity
    }

    fn propagate(&mut self, model: &mut Domains) -> Result<(), Contradiction> {
        SatSolver::propagate(self, model).map_err(Contradiction::Explanation)
    }

    fn explain(
        &mut self,
        literal: Lit,
        context: InferenceCause,
        _model: &DomainsSnapshot,
        out_explanation: &mut Explanation,
    ) {
        debug_assert_eq!(context.writer, self.identity);
        let clause_id = ClauseId::from(context.payload);
        // bump: clauses participating in conflicts are valuable
        self.clauses.bump_activity(clause_id);
        let clause = &self.clauses[clause_id];
        // the premises are the negations of all literals but the propagated one
        for b in clause.literals() {
            if !b.entails(literal) {
                out_explanation.push(!b);
            }
        }
    }

    fn print_stats(&self) {
        println!("# clauses: {}", self.clauses.num_clauses());
        println!("# learnt: {}", self.clauses.num_learnt());
        println!("# propagations: {}", self.stats.propagations);
    }

    fn clone_box(&self) -> Box<dyn Theory> {
        Box::new(self.clone())
    }
}

impl Backtrack for SatSolver {
    fn save_state(&mut self) -> DecLvl {
        self.trail.save_state()
    }

    fn num_saved(&self) -> u32 {
        self.trail.num_saved()
    }

    fn restore_last(&mut self) {
        let locks = &mut self.locks;
        self.trail.restore_last_with(|SatEvent::Lock(cl)| locks.unlock(cl));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::state::Cause;

    fn new_bool(model: &mut Domains) -> Lit {
        model.new_var(0, 1).geq(1)
    }

    #[test]
    fn unit_propagation_chain() {
        let mut model = Domains::new();
        let a = new_bool(&mut model);
        let b = new_bool(&mut model);
        let c = new_bool(&mut model);
        let mut sat = SatSolver::new(ReasonerId::Sat);
        let _ = sat.add_clause([!a, b]);
        let _ = sat.add_clause([!b, c]);

        sat.propagate(&mut model).unwrap();
        assert_eq!(model.value(b), None);

        let _ = model.save_state();
        let _ = sat.save_state();
        model.decide(a).unwrap();
        sat.propagate(&mut model).unwrap();
        assert_eq!(model.value(b), Some(true));
        assert_eq!(model.value(c), Some(true));

        model.restore_last();
        sat.restore_last();
        assert_eq!(model.value(b), None);
        assert_eq!(model.value(c), None);
    }

    #[test]
    fn violated_clause_is_reported() {
        let mut model = Domains::new();
        let a = new_bool(&mut model);
        let b = new_bool(&mut model);
        let mut sat = SatSolver::new(ReasonerId::Sat);
        let _ = sat.add_clause([a, b]);

        let _ = model.save_state();
        model.decide(!a).unwrap();
        model.decide(!b).unwrap();
        let explanation = sat.propagate(&mut model).unwrap_err();
        let mut premises = explanation.lits.clone();
        premises.sort();
        let mut expected = vec![!a, !b];
        expected.sort();
        assert_eq!(premises, expected);
    }

    #[test]
    fn clauses_over_integer_bounds() {
        let mut model = Domains::new();
        let x = model.new_var(0, 10);
        let y = model.new_var(0, 10);
        let mut sat = SatSolver::new(ReasonerId::Sat);
        // (x >= 5) v (y >= 5)
        let _ = sat.add_clause([x.geq(5), y.geq(5)]);

        sat.propagate(&mut model).unwrap();
        let _ = model.save_state();
        let _ = sat.save_state();
        model.set(x.leq(3), Cause::Decision).unwrap();
        sat.propagate(&mut model).unwrap();
        assert_eq!(model.lb(y), 5);
    }
}
