use std::fmt::Formatter;
use std::sync::Arc;
use std::time::Instant;

use crossbeam_channel::Sender;
use env_param::EnvParam;
use itertools::Itertools;
use tracing::{debug, instrument, trace};

use crate::backtrack::{Backtrack, DecLvl};
use crate::collections::set::IterableRefSet;
use crate::core::literals::Disjunction;
use crate::core::state::*;
use crate::core::*;
use crate::encoding::IntEncoder;
use crate::reasoners::cp::{DynPropagator, PriorityLevel, PropagatorId};
use crate::reasoners::{Contradiction, Reasoners};
use crate::solver::search::{default_brancher, Decision, SearchControl};
use crate::solver::signals::{InputSignal, InputStream, SavedAssignment, SolverOutput, Synchro};
use crate::solver::stats::Stats;

/// If true, decisions are logged through `tracing` at the debug level.
static LOG_DECISIONS: EnvParam<bool> = EnvParam::new("VELA_LOG_DECISIONS", "false");

macro_rules! log_dec {
    ($($arg:tt)+) => {
        if LOG_DECISIONS.get() {
            debug!($($arg)+);
        }
    }
}

/// Result of the internal `search` method.
enum SearchResult {
    /// The solver's current assignment is a solution.
    AtSolution,
    /// A solution was received from the input channel.
    ExternalSolution(Arc<SavedAssignment>),
    /// The search space below the assumptions is exhausted.
    Unsat(Conflict),
}

/// An unsat core: a set of assumptions that cannot jointly hold.
pub type UnsatCore = Explanation;

/// Reasons for search interruption.
#[derive(Debug)]
pub enum Exit {
    Interrupted,
}
impl std::fmt::Display for Exit {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "Solver interrupted.")
    }
}
impl std::error::Error for Exit {}

/// Build-time misuse of the solver API.
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("variable created with an empty domain")]
    EmptyDomain,
    #[error("the model was proven unsatisfiable at the root level")]
    ModelUnsat,
}

/// A complete solver instance: domains, encoder, reasoners and search.
pub struct Solver {
    pub state: Domains,
    pub encoder: IntEncoder,
    pub brancher: Box<dyn SearchControl + Send>,
    pub reasoners: Reasoners,
    /// Current decision level (the number of saved states).
    /// Assumption levels all precede decision levels.
    decision_level: DecLvl,
    /// Last level that holds an assumption (ROOT if none).
    last_assumption_level: DecLvl,
    /// Set once the root level is proven inconsistent; all subsequent
    /// operations are answered with `ModelUnsat` without any work.
    unsat: bool,
    pub stats: Stats,
    sync: Synchro,
}

impl Solver {
    pub fn new() -> Solver {
        Solver {
            state: Domains::new(),
            encoder: IntEncoder::new(),
            brancher: default_brancher(),
            reasoners: Reasoners::new(),
            decision_level: DecLvl::ROOT,
            last_assumption_level: DecLvl::ROOT,
            unsat: false,
            stats: Default::default(),
            sync: Synchro::new(),
        }
    }

    pub fn set_brancher(&mut self, brancher: impl SearchControl + 'static + Send) {
        self.brancher = Box::new(brancher);
    }

    pub fn set_brancher_boxed(&mut self, brancher: Box<dyn SearchControl + 'static + Send>) {
        self.brancher = brancher;
    }

    pub fn input_stream(&self) -> InputStream {
        self.sync.input_stream()
    }

    pub fn set_solver_output(&mut self, output: Sender<SolverOutput>) {
        self.sync.set_output(output);
    }

    // ========================= model construction ==========================

    pub fn add_variable(&mut self, lb: IntCst, ub: IntCst) -> VarRef {
        self.state.new_var(lb, ub)
    }

    pub fn add_variable_with_domain(&mut self, domain: Domain) -> Result<VarRef, ModelError> {
        self.state.new_var_with_domain(domain).map_err(|_| ModelError::EmptyDomain)
    }

    /// Restricts the initial domain of a variable (root level only).
    pub fn update_initial_domain(&mut self, var: VarRef, domain: &Domain) -> Result<(), ModelError> {
        match self.state.update_initial_domain(var, domain) {
            Ok(_) => Ok(()),
            Err(_) => {
                self.unsat = true;
                Err(ModelError::ModelUnsat)
            }
        }
    }

    /// Adds a clause to the problem definition.
    pub fn add_clause(&mut self, clause: impl Into<Disjunction>) {
        assert_eq!(self.current_decision_level(), DecLvl::ROOT);
        let clause = clause.into();
        if let Some(clause) = Disjunction::new_non_tautological(clause.into()) {
            let _ = self.reasoners.sat.add_clause(clause);
        }
    }

    /// Enforces a literal at the root level.
    pub fn post(&mut self, lit: Lit) -> Result<(), ModelError> {
        assert_eq!(self.current_decision_level(), DecLvl::ROOT);
        match self.state.set(lit, Cause::Encoding) {
            Ok(_) => Ok(()),
            Err(_) => {
                self.unsat = true;
                Err(ModelError::ModelUnsat)
            }
        }
    }

    /// Registers a constraint propagator at the given priority.
    pub fn add_propagator(&mut self, propagator: impl Into<DynPropagator>, priority: PriorityLevel) -> PropagatorId {
        assert_eq!(self.current_decision_level(), DecLvl::ROOT);
        self.reasoners.cp.add_propagator(propagator, priority)
    }

    // ============================ search ===================================

    /// Searches for a satisfying assignment.
    /// Returns `None` if the search space was exhausted without a solution.
    pub fn solve(&mut self) -> Result<Option<Arc<SavedAssignment>>, Exit> {
        if self.unsat {
            return Ok(None);
        }
        match self.search()? {
            SearchResult::AtSolution => Ok(Some(Arc::new(self.state.clone()))),
            SearchResult::ExternalSolution(s) => Ok(Some(s)),
            SearchResult::Unsat(_) => Ok(None),
        }
    }

    /// Solves under the given assumptions. On unsatisfiability, returns an
    /// unsat core: a subset of the assumptions that cannot jointly hold.
    ///
    /// The solver must be at the root level.
    pub fn solve_with_assumptions(
        &mut self,
        assumptions: &[Lit],
    ) -> Result<Result<Arc<SavedAssignment>, UnsatCore>, Exit> {
        assert_eq!(self.decision_level, DecLvl::ROOT);
        if self.unsat {
            return Ok(Err(Explanation::new()));
        }
        self.brancher.import_vars(&self.state);

        match self.propagate_and_backtrack_to_consistent() {
            Ok(()) => (),
            Err(conflict) => {
                debug_assert!(conflict.is_empty());
                self.unsat = true;
                return Ok(Err(Explanation::new()));
            }
        }
        for &lit in assumptions {
            if let Err(unsat_core) = self.assume_and_propagate(lit) {
                self.reset_search();
                return Ok(Err(unsat_core));
            }
        }
        let result = match self.search()? {
            SearchResult::AtSolution => Ok(Arc::new(self.state.clone())),
            SearchResult::ExternalSolution(s) => Ok(s),
            SearchResult::Unsat(conflict) => Err(self
                .state
                .extract_unsat_core_after_conflict(conflict, &mut self.reasoners)),
        };
        // pop the assumptions so that the solver can be reused
        self.reset_search();
        self.restore(DecLvl::ROOT);
        self.last_assumption_level = DecLvl::ROOT;
        Ok(result)
    }

    /// Minimizes `objective`, calling `on_new_solution` on every improving
    /// assignment. Returns the optimal value and assignment, or `None` if
    /// the problem is unsatisfiable.
    pub fn minimize(&mut self, objective: impl Into<IAtom>) -> Result<Option<(IntCst, Arc<SavedAssignment>)>, Exit> {
        self.minimize_with_callback(objective, |_, _| ())
    }

    pub fn minimize_with_callback(
        &mut self,
        objective: impl Into<IAtom>,
        mut on_new_solution: impl FnMut(IntCst, &SavedAssignment),
    ) -> Result<Option<(IntCst, Arc<SavedAssignment>)>, Exit> {
        let objective = objective.into();
        assert_eq!(self.decision_level, DecLvl::ROOT);
        if self.unsat {
            return Ok(None);
        }
        let mut best: Option<(IntCst, Arc<SavedAssignment>)> = None;

        loop {
            let sol = match self.search()? {
                SearchResult::AtSolution => {
                    let sol = Arc::new(self.state.clone());
                    let objective_value = sol.lb(objective.var) + objective.shift;
                    self.sync.notify_solution_found(Some(objective_value), sol.clone());
                    on_new_solution(objective_value, &sol);
                    sol
                }
                SearchResult::ExternalSolution(sol) => sol,
                SearchResult::Unsat(_) => return Ok(best),
            };

            let objective_value = sol.lb(objective.var) + objective.shift;
            let is_improvement = best.as_ref().map(|(prev, _)| objective_value < *prev).unwrap_or(true);
            if is_improvement {
                self.brancher.new_assignment_found(objective_value, sol.clone());
                self.stats.add_solution(objective_value);
                best = Some((objective_value, sol));

                // force future solutions to improve
                let improvement = objective.lt_lit(objective_value);
                self.reset_search();
                if self.assume_and_propagate(improvement).is_err() {
                    return Ok(best);
                }
            }
        }
    }

    /// Searches below the current assumptions. Stops at a solution, on
    /// exhaustion, on an interrupt signal or on an external solution.
    ///
    /// On exit the reasoners are fully propagated.
    fn search(&mut self) -> Result<SearchResult, Exit> {
        self.brancher.import_vars(&self.state);
        let start_time = Instant::now();
        loop {
            if let Err(conflict) = self.propagate_and_backtrack_to_consistent() {
                self.stats.solve_time += start_time.elapsed();
                return Ok(SearchResult::Unsat(conflict));
            }

            let mut requires_new_propagation = false;
            while let Ok(signal) = self.sync.signals.try_recv() {
                match signal {
                    InputSignal::Interrupt => {
                        self.stats.solve_time += start_time.elapsed();
                        return Err(Exit::Interrupted);
                    }
                    InputSignal::LearnedClause(cl) => {
                        self.reasoners.sat.add_forgettable_clause(cl.as_ref());
                        requires_new_propagation = true;
                    }
                    InputSignal::SolutionFound(assignment) => {
                        self.stats.solve_time += start_time.elapsed();
                        return Ok(SearchResult::ExternalSolution(assignment));
                    }
                }
            }
            if requires_new_propagation {
                continue;
            }
            match self.brancher.next_decision(&self.stats, &self.state) {
                Some(Decision::SetLiteral(lit)) => {
                    self.decide(lit);
                }
                Some(Decision::Restart) => {
                    self.reset_search();
                    self.stats.add_restart();
                }
                None => {
                    log_dec!("=> SOLUTION");
                    self.stats.solve_time += start_time.elapsed();
                    return Ok(SearchResult::AtSolution);
                }
            }
        }
    }

    pub fn decide(&mut self, decision: Lit) {
        let _ = self.save_state();
        log_dec!(
            "decision {:?}: {:?} (dom {:?})",
            self.decision_level,
            decision,
            self.state.bounds(decision.variable())
        );
        let res = self.state.decide(decision);
        assert_eq!(res, Ok(true), "decision did not result in a valid modification");
        self.stats.add_decision(decision);
    }

    /// Posts an assumption on a new level. Fails with an unsat core if the
    /// assumption is inconsistent with the current state (no propagation is
    /// run).
    pub fn assume(&mut self, assumption: Lit) -> Result<bool, UnsatCore> {
        assert_eq!(self.last_assumption_level, self.decision_level);
        debug_assert!(
            self.state.decisions().is_empty(),
            "assumptions must precede all decisions"
        );
        let _ = self.save_state();
        self.last_assumption_level = self.decision_level;
        match self.state.assume(assumption) {
            Ok(status) => Ok(status),
            Err(invalid) => Err(self
                .state
                .extract_unsat_core_after_invalid_assumption(invalid, &mut self.reasoners)),
        }
    }

    /// Posts an assumption and runs all propagators, returning an unsat core
    /// if an inconsistency surfaces.
    pub fn assume_and_propagate(&mut self, assumption: Lit) -> Result<bool, UnsatCore> {
        if self.assume(assumption)? {
            match self.propagate_and_backtrack_to_consistent() {
                Ok(_) => Ok(true),
                Err(conflict) => Err(self
                    .state
                    .extract_unsat_core_after_conflict(conflict, &mut self.reasoners)),
            }
        } else {
            Ok(false)
        }
    }

    /// Earliest level at which the clause is unit (the level to backtrack to
    /// for asserting it). `None` if the clause is still violated at the last
    /// assumption level: the problem is unsat under the assumptions.
    fn backtrack_level_for_clause(&self, clause: &[Lit]) -> Option<DecLvl> {
        debug_assert_eq!(self.state.value_of_clause(clause.iter()), Some(false));
        let mut max = self.last_assumption_level;
        let mut max_next = self.last_assumption_level;
        for &lit in clause {
            debug_assert!(self.state.entails(!lit));
            if let Some(ev) = self.state.implying_event(!lit) {
                let dl = self.state.trail().decision_level(ev);
                if dl > max {
                    max_next = max;
                    max = dl;
                } else if dl > max_next {
                    max_next = dl;
                }
            }
        }
        if max == self.last_assumption_level {
            None
        } else if max == max_next {
            // not asserting: backtrack below the latest falsifier
            Some(max - 1)
        } else {
            Some(max_next)
        }
    }

    /// Integrates a conflict clause and backtracks to its asserting level.
    /// Returns false if the clause proves unsatisfiability under the current
    /// assumptions.
    #[must_use]
    fn add_conflicting_clause_and_backtrack(&mut self, conflict: &Conflict) -> bool {
        let Some(dl) = self.backtrack_level_for_clause(conflict.literals()) else {
            return false;
        };
        // find the literal entailed once we backtrack, to assert it
        let mut asserted = None;
        let mut unique = true;
        for &l in conflict.literals() {
            let lvl = self.state.entailing_level(!l);
            if lvl > dl {
                unique &= asserted.is_none();
                asserted = Some(l);
            }
        }
        self.brancher.conflict(conflict, &self.state, dl);
        self.restore(dl);
        debug_assert_eq!(self.state.value_of_clause(&conflict.clause), None);

        match asserted {
            Some(asserted) if unique => {
                self.reasoners.sat.add_learnt_clause(&conflict.clause, asserted);
            }
            _ => {
                // not asserting after the backtrack (several literals were
                // falsified at the latest level): integrate as a regular
                // clause, unit propagation will pick it up
                self.reasoners.sat.add_forgettable_clause(&conflict.clause);
            }
        }
        true
    }

    /// Propagates to a consistent state, learning clauses and backtracking
    /// on conflicts. An `Err` is the final conflict proving unsatisfiability
    /// under the current assumptions.
    pub fn propagate_and_backtrack_to_consistent(&mut self) -> Result<(), Conflict> {
        loop {
            match self.propagate() {
                Ok(()) => return Ok(()),
                Err(conflict) => {
                    log_dec!(
                        "CONFLICT {:?} (size {}) > {:?}",
                        self.decision_level,
                        conflict.clause.len(),
                        conflict.literals().iter().format(" | ")
                    );
                    self.sync.notify_learnt(&conflict.clause);
                    if self.add_conflicting_clause_and_backtrack(&conflict) {
                        // keep propagating from the backjump level
                    } else {
                        if self.last_assumption_level == DecLvl::ROOT {
                            self.unsat = true;
                        }
                        return Err(conflict);
                    }
                }
            }
        }
    }

    /// Number of distinct decision levels involved in a clause.
    fn lbd(&self, clause: &Conflict) -> u32 {
        let mut levels = IterableRefSet::new();
        for &l in clause.literals() {
            if self.state.entails(!l) {
                let lvl = self.state.entailing_level(!l);
                if lvl != DecLvl::ROOT {
                    levels.insert(lvl);
                }
            }
        }
        levels.len() as u32
    }

    /// Runs every reasoner to its fixed point, in priority order (SAT first),
    /// until none has anything left to propagate.
    #[instrument(level = "trace", skip(self))]
    pub fn propagate(&mut self) -> Result<(), Conflict> {
        loop {
            let num_events_at_start = self.state.num_events();
            for &i in self.reasoners.writers() {
                let trail_size = self.state.trail().len() as u64;
                self.stats[i].propagation_loops += 1;
                let th = self.reasoners.reasoner_mut(i);
                match th.propagate(&mut self.state) {
                    Ok(()) => (),
                    Err(contradiction) => {
                        let num_updates = self.state.trail().len() as u64 - trail_size;
                        self.stats[i].dom_updates += num_updates;
                        self.stats.num_dom_updates += num_updates;
                        // refine into a 1UIP clause
                        let clause = match contradiction {
                            Contradiction::InvalidUpdate(fail) => {
                                self.state.clause_for_invalid_update(fail, &mut self.reasoners)
                            }
                            Contradiction::Explanation(expl) => {
                                self.state.refine_explanation(expl, &mut self.reasoners)
                            }
                        };
                        trace!("conflict clause (lbd {}): {:?}", self.lbd(&clause), clause);
                        self.stats.add_conflict(self.current_decision_level(), clause.len());
                        self.stats[i].conflicts += 1;
                        return Err(clause);
                    }
                }
                let num_updates = self.state.trail().len() as u64 - trail_size;
                self.stats[i].dom_updates += num_updates;
                self.stats.num_dom_updates += num_updates;
            }
            if num_events_at_start == self.state.num_events() {
                return Ok(());
            }
        }
    }

    pub fn print_stats(&self) {
        println!("{}", self.stats);
        for (i, th) in self.reasoners.theories() {
            println!("====== {i} =====");
            th.print_stats();
        }
    }

    /// Undoes all decisions, backtracking to the last assumption level.
    pub fn reset_search(&mut self) {
        self.restore(self.last_assumption_level);
    }
}

impl Default for Solver {
    fn default() -> Self {
        Self::new()
    }
}

impl Backtrack for Solver {
    fn save_state(&mut self) -> DecLvl {
        self.decision_level += 1;
        let n = self.decision_level;
        assert_eq!(self.state.save_state(), n);
        assert_eq!(self.brancher.save_state(), n);
        for w in self.reasoners.writers() {
            let th = self.reasoners.reasoner_mut(*w);
            assert_eq!(th.save_state(), n);
        }
        n
    }

    fn num_saved(&self) -> u32 {
        self.decision_level.to_int()
    }

    fn restore_last(&mut self) {
        assert!(self.decision_level > DecLvl::ROOT);
        self.restore(self.decision_level - 1);
    }

    fn restore(&mut self, saved_id: DecLvl) {
        self.decision_level = saved_id;
        if self.last_assumption_level > saved_id {
            self.last_assumption_level = saved_id;
        }
        self.state.restore(saved_id);
        self.brancher.restore(saved_id);
        for w in self.reasoners.writers() {
            let th = self.reasoners.reasoner_mut(*w);
            th.restore(saved_id);
        }
        debug_assert_eq!(self.current_decision_level(), saved_id);
    }
}

impl Clone for Solver {
    fn clone(&self) -> Self {
        Solver {
            state: self.state.clone(),
            encoder: self.encoder.clone(),
            brancher: self.brancher.clone_to_box(),
            reasoners: self.reasoners.clone(),
            decision_level: self.decision_level,
            last_assumption_level: self.last_assumption_level,
            unsat: self.unsat,
            stats: self.stats.clone(),
            sync: self.sync.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reasoners::cp::linear::{LinearSumLeq, SumElem};
    use crate::solver::search::LexicalMinValue;

    fn bool_var(solver: &mut Solver) -> Lit {
        solver.add_variable(0, 1).geq(1)
    }

    #[test]
    fn sat_solving_with_clauses() {
        let mut solver = Solver::new();
        let a = bool_var(&mut solver);
        let b = bool_var(&mut solver);
        let c = bool_var(&mut solver);
        solver.add_clause([a, b]);
        solver.add_clause([!a, c]);
        solver.add_clause([!b, c]);
        solver.set_brancher(LexicalMinValue::new());
        let solution = solver.solve().unwrap().expect("satisfiable");
        assert_eq!(solution.value(c), Some(true));
    }

    #[test]
    fn unsat_is_reported_and_sticky() {
        let mut solver = Solver::new();
        let a = bool_var(&mut solver);
        solver.add_clause([a]);
        solver.add_clause([!a]);
        assert!(solver.solve().unwrap().is_none());
        // subsequent calls answer immediately
        assert!(solver.solve().unwrap().is_none());
    }

    #[test]
    fn assumptions_produce_cores() {
        let mut solver = Solver::new();
        let a = bool_var(&mut solver);
        let b = bool_var(&mut solver);
        let c = bool_var(&mut solver);
        // a & b are incompatible; c is free
        solver.add_clause([!a, !b]);

        let result = solver.solve_with_assumptions(&[a, b, c]).unwrap();
        let core = result.unwrap_err();
        let core: Vec<Lit> = core.literals().to_vec();
        assert!(core.contains(&a));
        assert!(core.contains(&b));
        assert!(!core.contains(&c));

        // the solver is reusable after a core
        let result = solver.solve_with_assumptions(&[a, c]).unwrap();
        let solution = result.unwrap();
        assert_eq!(solution.value(a), Some(true));
        assert_eq!(solution.value(b), Some(false));
        assert_eq!(solution.value(c), Some(true));
    }

    #[test]
    fn minimize_with_linear_constraint() {
        let mut solver = Solver::new();
        let x = solver.add_variable(0, 10);
        let y = solver.add_variable(0, 10);
        // x + y >= 7, i.e. -x - y <= -7
        let _ = solver.add_propagator(
            LinearSumLeq::new(vec![SumElem::new(-1, x), SumElem::new(-1, y)], -7),
            LinearSumLeq::priority(),
        );
        // minimize x through an objective variable obj = x
        solver.set_brancher(LexicalMinValue::new());
        let (value, solution) = solver.minimize(x).unwrap().expect("satisfiable");
        assert_eq!(value, 0);
        assert_eq!(solution.lb(y), 7);
    }

    #[test]
    fn backtrack_restores_all_levels() {
        // scenario: push a bound at level 1 and return to the root
        let mut solver = Solver::new();
        let x = solver.add_variable(0, 10);
        solver.propagate().unwrap();
        solver.decide(x.geq(4));
        solver.propagate().unwrap();
        assert_eq!(solver.state.lb(x), 4);
        solver.restore(DecLvl::ROOT);
        assert_eq!(solver.state.lb(x), 0);
        assert_eq!(solver.state.initial_lb(x), 0);
    }
}
