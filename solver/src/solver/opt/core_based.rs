//! Core-based optimization of a linear objective with non-negative weights.
//!
//! The driver repeatedly assumes every objective term at its lower bound; an
//! unsat core over those assumptions proves that the terms of the core
//! cannot all stay put, which is condensed into a fresh summary variable
//! carrying the core's minimal weight. Heavy terms are processed first
//! (stratification) and the proven lower bound never decreases.

use std::sync::Arc;

use itertools::Itertools;
use num_integer::div_floor;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

use crate::backtrack::{Backtrack, DecLvl};
use crate::core::state::Explanation;
use crate::core::*;
use crate::reasoners::cp::linear::{LinearSumLeq, SumElem};
use crate::solver::opt::OptimizationStatus;
use crate::solver::signals::SavedAssignment;
use crate::solver::solver_impl::{Exit, Solver};

/// One term `weight * var` of the objective under optimization.
#[derive(Clone, Debug)]
pub struct ObjectiveTerm {
    pub var: VarRef,
    pub weight: IntCst,
    /// 0 for original terms, incremented on every condensation layer.
    pub depth: u32,
}

#[derive(Clone, Debug)]
pub struct CoreOptimizerParams {
    /// Extract several cores per stratum by dropping one literal of each
    /// core (at random) and re-solving.
    pub find_multiple_cores: bool,
    /// Probe the upper bound of condensed terms by propagation.
    pub cover_optimization: bool,
    /// Stop after this many calls to the underlying solver.
    pub max_solver_calls: u64,
    pub seed: u64,
}

impl Default for CoreOptimizerParams {
    fn default() -> Self {
        CoreOptimizerParams {
            find_multiple_cores: true,
            cover_optimization: true,
            max_solver_calls: u64::MAX,
            seed: 0x5EED,
        }
    }
}

/// Core-guided minimization of `offset + sum of weight * var`.
pub struct CoreBasedOptimizer {
    terms: Vec<ObjectiveTerm>,
    offset: IntCst,
    params: CoreOptimizerParams,
    rng: SmallRng,
    /// Objective value of the best solution found.
    best_value: Option<IntCst>,
    best_solution: Option<Arc<SavedAssignment>>,
    /// Monotone non-decreasing proven bound.
    lower_bound: IntCst,
    solver_calls: u64,
}

impl CoreBasedOptimizer {
    /// Builds the optimizer for `sum of weight * var`. All weights must be
    /// positive (sign normalization belongs to the modelling layer).
    pub fn new(objective: impl IntoIterator<Item = (VarRef, IntCst)>) -> Self {
        Self::with_params(objective, CoreOptimizerParams::default())
    }

    pub fn with_params(
        objective: impl IntoIterator<Item = (VarRef, IntCst)>,
        params: CoreOptimizerParams,
    ) -> Self {
        let terms = objective
            .into_iter()
            .map(|(var, weight)| {
                assert!(weight > 0, "objective weights must be positive");
                ObjectiveTerm { var, weight, depth: 0 }
            })
            .collect_vec();
        let rng = SmallRng::seed_from_u64(params.seed);
        CoreBasedOptimizer {
            terms,
            offset: 0,
            params,
            rng,
            best_value: None,
            best_solution: None,
            lower_bound: 0,
            solver_calls: 0,
        }
    }

    pub fn lower_bound(&self) -> IntCst {
        self.lower_bound
    }

    pub fn best_solution(&self) -> Option<(IntCst, Arc<SavedAssignment>)> {
        self.best_value.map(|v| (v, self.best_solution.clone().unwrap()))
    }

    /// Groups of boolean objective terms of equal weight of which at most one
    /// can be false (from the implication graph) are replaced by a single
    /// boolean: at least `g - 1` of them are true in any solution, which
    /// moves into the offset.
    fn at_most_one_presolve(&mut self, solver: &mut Solver) {
        let is_bool = |solver: &Solver, v: VarRef| solver.state.initial_lb(v) == 0 && solver.state.initial_ub(v) == 1;
        let mut grouped = vec![false; self.terms.len()];
        let mut replacements: Vec<ObjectiveTerm> = Vec::new();
        let mut removed = vec![false; self.terms.len()];

        for i in 0..self.terms.len() {
            if grouped[i] || !is_bool(solver, self.terms[i].var) || self.terms[i].depth > 0 {
                continue;
            }
            let w = self.terms[i].weight;
            let mut group = vec![i];
            for j in i + 1..self.terms.len() {
                if grouped[j] || self.terms[j].weight != w || !is_bool(solver, self.terms[j].var) {
                    continue;
                }
                // the group is pairwise "at least one of the two is true"
                let compatible = group.iter().all(|&k| {
                    let x = self.terms[k].var.geq(1);
                    let y = self.terms[j].var.geq(1);
                    solver.state.implications().implies(!x, y)
                });
                if compatible {
                    group.push(j);
                    grouped[j] = true;
                }
            }
            if group.len() >= 2 {
                let g = group.len() as IntCst;
                // at least g - 1 terms are true in every solution
                self.offset += w * (g - 1);
                // z is 1 when all terms of the group are true
                let z = solver.add_variable(0, 1);
                let mut clause: Vec<Lit> = group.iter().map(|&k| self.terms[k].var.leq(0)).collect();
                clause.push(z.geq(1));
                solver.add_clause(clause);
                replacements.push(ObjectiveTerm { var: z, weight: w, depth: 0 });
                for &k in &group {
                    removed[k] = true;
                }
                grouped[i] = true;
            }
        }
        let mut idx = 0;
        self.terms.retain(|_| {
            let keep = !removed[idx];
            idx += 1;
            keep
        });
        self.terms.extend(replacements);
    }

    /// Recomputes the implied objective bound and hardens the terms against
    /// the best known solution, until the fixed point.
    fn propagate_objective_bounds(&mut self, solver: &mut Solver) -> Result<(), ()> {
        loop {
            if solver.propagate_and_backtrack_to_consistent().is_err() {
                return Err(());
            }
            let implied: IntCst = self.offset + self.terms.iter().map(|t| t.weight * solver.state.lb(t.var)).sum::<IntCst>();
            if implied > self.lower_bound {
                debug!("objective lower bound raised to {implied}");
                self.lower_bound = implied;
            }
            let Some(best) = self.best_value else {
                return Ok(());
            };
            // hardening: no term may exceed its share of the remaining gap
            let gap = best - 1 - self.lower_bound;
            if gap < 0 {
                return Ok(()); // the incumbent is proven optimal
            }
            let mut change = false;
            for t in &self.terms {
                let lb = solver.state.lb(t.var);
                let allowed = lb + div_floor(gap, t.weight);
                if allowed < solver.state.ub(t.var) {
                    if solver.post(t.var.leq(allowed)).is_err() {
                        return Err(());
                    }
                    change = true;
                }
            }
            if !change {
                return Ok(());
            }
        }
    }

    /// Propagation-bounded probing of condensed terms: assuming a summary
    /// variable below its upper bound must not contradict; when it does, the
    /// variable is fixed to that upper bound.
    fn cover_optimization(&mut self, solver: &mut Solver) -> Result<(), ()> {
        let targets: Vec<(VarRef, IntCst)> = self
            .terms
            .iter()
            .filter(|t| t.depth >= 1)
            .map(|t| (t.var, solver.state.ub(t.var)))
            .collect();
        for (var, ub) in targets {
            if solver.state.lb(var) >= ub {
                continue;
            }
            let result = solver.assume_and_propagate(var.leq(ub - 1));
            solver.restore(DecLvl::ROOT);
            if result.is_err() && solver.post(var.geq(ub)).is_err() {
                return Err(());
            }
        }
        Ok(())
    }

    /// Condenses one core: introduces the summary variable, transfers the
    /// minimal weight and posts the linking constraint.
    ///
    /// Each core literal is an assumption `[v <= c]` where `c` was the lower
    /// bound of `v` when the assumptions were built: the core proves
    /// `sum v >= sum c + 1`. Returns false if a core variable has no
    /// remaining weight (stale core from an overlapping batch): it is
    /// skipped and will be rediscovered with fresh assumptions if relevant.
    fn condense_core(&mut self, solver: &mut Solver, core: &[Lit]) -> bool {
        // map core literals back to term indices; the assumed bound is the
        // literal's own value
        let mut core_terms: Vec<(usize, IntCst)> = Vec::with_capacity(core.len());
        for &l in core {
            match self.terms.iter().position(|t| t.var == l.variable()) {
                Some(i) => core_terms.push((i, l.value())),
                None => return false,
            }
        }
        debug_assert!(!core_terms.is_empty());
        if core_terms.len() == 1 {
            // unit core: the term cannot stay at the assumed bound
            let (i, c) = core_terms[0];
            let _ = solver.post(self.terms[i].var.geq(c + 1));
            return true;
        }

        let min_weight = core_terms.iter().map(|&(i, _)| self.terms[i].weight).min().unwrap();
        let max_depth = core_terms.iter().map(|&(i, _)| self.terms[i].depth).max().unwrap();
        let sum_assumed: IntCst = core_terms.iter().map(|&(_, c)| c).sum();
        let sum_ub: IntCst = core_terms.iter().map(|&(i, _)| solver.state.ub(self.terms[i].var)).sum();

        // s bounds the excess of the core variables over their assumed
        // bounds, and the core proves the excess is at least one
        let span: IntCst = (sum_ub - sum_assumed).max(1);
        let s = solver.add_variable(1, span);
        let mut elements: Vec<SumElem> = core_terms.iter().map(|&(i, _)| SumElem::new(1, self.terms[i].var)).collect();
        elements.push(SumElem::new(-1, s));
        let _ = solver.add_propagator(LinearSumLeq::new(elements, sum_assumed), LinearSumLeq::priority());

        // transfer min_weight to the summary term
        self.offset += min_weight * sum_assumed;
        for &(i, _) in &core_terms {
            self.terms[i].weight -= min_weight;
        }
        self.terms.retain(|t| t.weight > 0);
        self.terms.push(ObjectiveTerm {
            var: s,
            weight: min_weight,
            depth: max_depth + 1,
        });
        true
    }

    /// Runs the optimization on `solver`, reporting every improving solution
    /// to `on_solution`.
    pub fn optimize(
        &mut self,
        solver: &mut Solver,
        mut on_solution: impl FnMut(IntCst, &SavedAssignment),
    ) -> Result<OptimizationStatus, Exit> {
        self.at_most_one_presolve(solver);
        if self.propagate_objective_bounds(solver).is_err() {
            return Ok(OptimizationStatus::Infeasible);
        }

        let mut stratification_threshold = self.terms.iter().map(|t| t.weight).max().unwrap_or(0);
        loop {
            if self.propagate_objective_bounds(solver).is_err() {
                return Ok(self.final_status(true));
            }
            if self.params.cover_optimization && self.cover_optimization(solver).is_err() {
                return Ok(self.final_status(true));
            }
            if let Some(best) = self.best_value {
                if best <= self.lower_bound {
                    return Ok(OptimizationStatus::Optimal(best));
                }
            }

            // assumptions: every non-fixed term of the stratum at its bound
            let mut skipped_light_terms = false;
            let mut assumptions: Vec<Lit> = Vec::new();
            for t in &self.terms {
                let (lb, ub) = solver.state.bounds(t.var);
                if lb == ub {
                    continue;
                }
                if t.weight >= stratification_threshold {
                    assumptions.push(t.var.leq(lb));
                } else {
                    skipped_light_terms = true;
                }
            }
            if assumptions.is_empty() {
                // lower the threshold to the heaviest skipped weight
                let next = self
                    .terms
                    .iter()
                    .filter(|t| t.weight < stratification_threshold)
                    .map(|t| t.weight)
                    .max();
                match next {
                    Some(weight) => {
                        stratification_threshold = weight;
                        continue;
                    }
                    None => {
                        // every term is fixed: one final feasibility check
                        // settles optimality at the proven bound
                        self.solver_calls += 1;
                        return match solver.solve_with_assumptions(&[])? {
                            Ok(solution) => {
                                let value = self.offset
                                    + self
                                        .terms
                                        .iter()
                                        .map(|t| t.weight * solution.lb(t.var))
                                        .sum::<IntCst>();
                                if self.best_value.map(|b| value < b).unwrap_or(true) {
                                    self.best_value = Some(value);
                                    self.best_solution = Some(solution.clone());
                                    on_solution(value, &solution);
                                }
                                Ok(self.final_status(true))
                            }
                            Err(_) => Ok(self.final_status(true)),
                        };
                    }
                }
            }

            // find one or several cores under the assumptions
            let mut cores: Vec<Vec<Lit>> = Vec::new();
            let mut sat_under_assumptions = false;
            loop {
                if self.solver_calls >= self.params.max_solver_calls {
                    return Ok(self.final_status(false));
                }
                self.solver_calls += 1;
                match solver.solve_with_assumptions(&assumptions)? {
                    Ok(solution) => {
                        let value = self.offset
                            + self
                                .terms
                                .iter()
                                .map(|t| t.weight * solution.lb(t.var))
                                .sum::<IntCst>();
                        if self.best_value.map(|b| value < b).unwrap_or(true) {
                            debug!("improving solution of value {value}");
                            self.best_value = Some(value);
                            self.best_solution = Some(solution.clone());
                            on_solution(value, &solution);
                        }
                        sat_under_assumptions = true;
                        break;
                    }
                    Err(core) => {
                        let core: Vec<Lit> = core_literals(&core, &assumptions);
                        if core.is_empty() {
                            // inconsistent without the assumptions
                            return Ok(self.final_status(true));
                        }
                        // relax one literal of the core (at random) and
                        // re-solve to collect further inconsistencies
                        let dropped = core[self.rng.gen_range(0..core.len())];
                        assumptions.retain(|&l| l != dropped);
                        cores.push(core);
                        if !self.params.find_multiple_cores || assumptions.is_empty() {
                            break;
                        }
                    }
                }
            }
            for core in &cores {
                let _ = self.condense_core(solver, core);
            }

            if sat_under_assumptions && cores.is_empty() {
                if skipped_light_terms {
                    // explore the lighter strata before concluding
                    let next = self
                        .terms
                        .iter()
                        .filter(|t| t.weight < stratification_threshold)
                        .map(|t| t.weight)
                        .max();
                    match next {
                        Some(weight) => stratification_threshold = weight,
                        None => return Ok(self.final_status(false)),
                    }
                } else {
                    // all terms were assumed at their bound and a solution
                    // exists there: it is optimal
                    debug_assert!(self.best_value.is_some());
                    return Ok(self.final_status(true));
                }
            }
        }
    }

    fn final_status(&mut self, proven_exhausted: bool) -> OptimizationStatus {
        match (self.best_value, proven_exhausted) {
            (Some(v), true) => {
                // proven optimal: the bound meets the incumbent
                self.lower_bound = self.lower_bound.max(v);
                OptimizationStatus::Optimal(v)
            }
            (Some(v), false) => OptimizationStatus::Feasible(v),
            (None, true) => OptimizationStatus::Infeasible,
            (None, false) => OptimizationStatus::LimitReached,
        }
    }
}

/// Restricts an extracted unsat core to the assumption literals, in the
/// assumptions' order.
fn core_literals(core: &Explanation, assumptions: &[Lit]) -> Vec<Lit> {
    assumptions
        .iter()
        .copied()
        .filter(|a| core.literals().iter().any(|l| l == a || a.entails(*l) || l.entails(*a)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::solver::search::LexicalMinValue;

    /// The scenario of the specification: minimize x + 2y + 3z subject to
    /// (x | y | z) with boolean variables.
    #[test]
    fn core_condensation_on_clause() {
        let mut solver = Solver::new();
        let x = solver.add_variable(0, 1);
        let y = solver.add_variable(0, 1);
        let z = solver.add_variable(0, 1);
        solver.add_clause([x.geq(1), y.geq(1), z.geq(1)]);
        solver.set_brancher(LexicalMinValue::new());

        let mut optimizer = CoreBasedOptimizer::new(vec![(x, 1), (y, 2), (z, 3)]);
        let mut solutions = Vec::new();
        let status = optimizer
            .optimize(&mut solver, |value, _| solutions.push(value))
            .unwrap();
        // the optimum sets x = 1 alone
        assert_eq!(status, OptimizationStatus::Optimal(1));
        assert_eq!(optimizer.lower_bound(), 1);
        let (value, solution) = optimizer.best_solution().unwrap();
        assert_eq!(value, 1);
        assert_eq!(solution.lb(x), 1);
        assert_eq!(solution.lb(y), 0);
        assert_eq!(solution.lb(z), 0);
        assert!(solutions.contains(&1));
    }

    #[test]
    fn pairwise_clauses_force_two_payments() {
        let mut solver = Solver::new();
        let vars: Vec<VarRef> = (0..4).map(|_| solver.add_variable(0, 1)).collect();
        // pairwise at-least-one over the first three variables
        solver.add_clause([vars[0].geq(1), vars[1].geq(1)]);
        solver.add_clause([vars[1].geq(1), vars[2].geq(1)]);
        solver.add_clause([vars[0].geq(1), vars[2].geq(1)]);
        solver.set_brancher(LexicalMinValue::new());

        let mut optimizer = CoreBasedOptimizer::new(vars.iter().map(|&v| (v, 1)).collect_vec());
        let status = optimizer.optimize(&mut solver, |_, _| ()).unwrap();
        // at least two of the three constrained variables are true, the
        // fourth stays free
        assert_eq!(status, OptimizationStatus::Optimal(2));
        assert_eq!(optimizer.lower_bound(), 2);
    }

    #[test]
    fn infeasible_objective() {
        let mut solver = Solver::new();
        let x = solver.add_variable(0, 1);
        solver.add_clause([x.geq(1)]);
        solver.add_clause([x.leq(0)]);
        let mut optimizer = CoreBasedOptimizer::new(vec![(x, 1)]);
        let status = optimizer.optimize(&mut solver, |_, _| ()).unwrap();
        assert_eq!(status, OptimizationStatus::Infeasible);
    }

    #[test]
    fn at_most_one_groups_are_condensed() {
        let mut solver = Solver::new();
        let a = solver.add_variable(0, 1);
        let b = solver.add_variable(0, 1);
        // at least one of a, b is true, recorded in the implication graph
        solver.state.add_implication(a.leq(0), b.geq(1));
        solver.add_clause([a.geq(1), b.geq(1)]);
        solver.set_brancher(LexicalMinValue::new());

        let mut optimizer = CoreBasedOptimizer::new(vec![(a, 2), (b, 2)]);
        let status = optimizer.optimize(&mut solver, |_, _| ()).unwrap();
        // one of the two must be paid for
        assert_eq!(status, OptimizationStatus::Optimal(2));
        // the presolve moved the unavoidable cost into the offset
        assert_eq!(optimizer.offset, 2);
    }
}
