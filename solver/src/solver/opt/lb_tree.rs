//! Lower-bound driven tree search.
//!
//! An explicit binary decision tree is kept in memory; each node carries a
//! monotone objective lower bound per branch, refined by propagation, by the
//! linear relaxation's certificates (reduced-cost conditional bounds) and by
//! conflict analysis. The driver repeatedly dives along the branch of least
//! bound: the minimum over the tree is a valid objective lower bound, which
//! is pushed back at the root so that every reasoner sees it.

use std::sync::Arc;

use env_param::EnvParam;
use tracing::debug;

use crate::backtrack::{Backtrack, DecLvl};
use crate::collections::ref_store::RefVec;
use crate::core::state::Origin;
use crate::core::*;
use crate::create_ref_type;
use crate::solver::opt::relaxation::{integer_lower_bound, Basis, LinearRelaxation};
use crate::solver::opt::OptimizationStatus;
use crate::solver::search::pseudo_costs::PseudoCosts;
use crate::solver::signals::SavedAssignment;
use crate::solver::solver_impl::{Exit, Solver};

/// Number of full restarts performed in the early part of the search.
static MAX_NUM_INITIAL_RESTARTS: EnvParam<u32> = EnvParam::new("VELA_LB_TREE_MAX_INITIAL_RESTARTS", "3");
/// Decisions taken before the initial restarts start firing.
static NUM_DECISIONS_BEFORE_INITIAL_RESTARTS: EnvParam<u64> =
    EnvParam::new("VELA_LB_TREE_DECISIONS_BEFORE_RESTARTS", "50");

create_ref_type!(NodeIndex);

/// A node of the explicit search tree.
#[derive(Clone)]
struct Node {
    /// Decision literal of the node: the true branch decides it, the false
    /// branch decides its negation.
    literal: Lit,
    /// Objective lower bound when taking the true branch. Monotone.
    true_bound: IntCst,
    /// Objective lower bound when taking the false branch. Monotone.
    false_bound: IntCst,
    true_child: Option<NodeIndex>,
    false_child: Option<NodeIndex>,
    /// Saved warm-start basis, stamped with the relaxation's change counter.
    basis: Option<(u64, Basis)>,
}

impl Node {
    fn new(literal: Lit, bound: IntCst) -> Node {
        Node {
            literal,
            true_bound: bound,
            false_bound: bound,
            true_child: None,
            false_child: None,
            basis: None,
        }
    }

    /// Lower bound of the subtree rooted here.
    fn bound(&self) -> IntCst {
        self.true_bound.min(self.false_bound)
    }

    fn branch_bound(&self, branch: bool) -> IntCst {
        if branch {
            self.true_bound
        } else {
            self.false_bound
        }
    }

    fn raise_branch_bound(&mut self, branch: bool, bound: IntCst) {
        if branch {
            self.true_bound = self.true_bound.max(bound);
        } else {
            self.false_bound = self.false_bound.max(bound);
        }
    }

    fn child(&self, branch: bool) -> Option<NodeIndex> {
        if branch {
            self.true_child
        } else {
            self.false_child
        }
    }

    fn set_child(&mut self, branch: bool, child: NodeIndex) {
        if branch {
            self.true_child = Some(child);
        } else {
            self.false_child = Some(child);
        }
    }
}

#[derive(Clone, Debug)]
pub struct TreeSearchParams {
    pub max_iterations: u64,
    pub max_initial_restarts: u32,
    pub decisions_before_initial_restarts: u64,
}

impl Default for TreeSearchParams {
    fn default() -> Self {
        TreeSearchParams {
            max_iterations: u64::MAX,
            max_initial_restarts: MAX_NUM_INITIAL_RESTARTS.get(),
            decisions_before_initial_restarts: NUM_DECISIONS_BEFORE_INITIAL_RESTARTS.get(),
        }
    }
}

/// The driver. Minimizes `objective` using the tree, the relaxation and the
/// pseudo-cost branching records.
pub struct LbTreeSearch {
    objective: IAtom,
    relaxation: Box<dyn LinearRelaxation>,
    params: TreeSearchParams,
    nodes: RefVec<NodeIndex, Node>,
    root: Option<NodeIndex>,
    pseudo_costs: PseudoCosts,
    num_restarts: u32,
    num_decisions: u64,
    best: Option<(IntCst, Arc<SavedAssignment>)>,
}

impl LbTreeSearch {
    pub fn new(objective: impl Into<IAtom>, relaxation: Box<dyn LinearRelaxation>) -> Self {
        Self::with_params(objective, relaxation, TreeSearchParams::default())
    }

    pub fn with_params(
        objective: impl Into<IAtom>,
        relaxation: Box<dyn LinearRelaxation>,
        params: TreeSearchParams,
    ) -> Self {
        LbTreeSearch {
            objective: objective.into(),
            relaxation,
            params,
            nodes: Default::default(),
            root: None,
            pseudo_costs: PseudoCosts::new(),
            num_restarts: 0,
            num_decisions: 0,
            best: None,
        }
    }

    fn objective_lb(&self, solver: &Solver) -> IntCst {
        solver.state.lb(self.objective.var) + self.objective.shift
    }

    /// Forgets the whole tree, keeping the learnt clauses and bounds.
    fn full_restart(&mut self) {
        debug!("lb-tree: full restart");
        self.nodes = Default::default();
        self.root = None;
        self.num_restarts += 1;
    }

    /// Chooses the literal of a fresh node: pseudo-costs when reliable, else
    /// the first unbound variable split at its midpoint.
    fn branching_literal(&self, solver: &Solver) -> Option<Lit> {
        if let Some((_, lit)) = self.pseudo_costs.best_decision(&solver.state) {
            return Some(lit);
        }
        solver.state.variables().find_map(|v| {
            let (lb, ub) = solver.state.bounds(v);
            if lb < ub {
                Some(Lit::leq(v, lb + (ub - lb) / 2))
            } else {
                None
            }
        })
    }

    /// Runs the relaxation at the current node, updating the node bound, the
    /// per-branch bounds of the ancestors on the dive (reduced costs) and
    /// saving the basis for warm starts.
    fn exploit_relaxation(
        &mut self,
        solver: &Solver,
        node: NodeIndex,
        branch: bool,
        dive: &[(NodeIndex, bool)],
    ) -> Result<bool, Exit> {
        // warm start from the nearest ancestor with a fresh basis
        let stamp = self.relaxation.change_stamp();
        if let Some((_, basis)) = dive
            .iter()
            .rev()
            .filter_map(|&(n, _)| self.nodes[n].basis.as_ref())
            .find(|(s, _)| *s == stamp)
        {
            let basis = basis.clone();
            self.relaxation.load_basis(&basis);
        }

        let Ok(solution) = self.relaxation.solve(&solver.state) else {
            // backend failure: ignore the relaxation for this node
            return Ok(true);
        };
        let Some(solution) = solution else {
            // relaxation infeasible: so is this branch
            self.nodes[node].raise_branch_bound(branch, INT_CST_MAX);
            return Ok(false);
        };

        let bound = integer_lower_bound(solution.objective_bound);
        self.nodes[node].raise_branch_bound(branch, bound);
        self.nodes[node].basis = Some((stamp, solution.basis.clone()));

        // reduced costs: conditional bounds for the literals driving the dive
        for cond in &solution.conditional {
            for &(n, _) in dive.iter().chain(std::iter::once(&(node, branch))) {
                let n_lit = self.nodes[n].literal;
                if n_lit == cond.literal {
                    self.nodes[n].raise_branch_bound(true, integer_lower_bound(cond.if_true));
                    self.nodes[n].raise_branch_bound(false, integer_lower_bound(cond.if_false));
                } else if n_lit == !cond.literal {
                    self.nodes[n].raise_branch_bound(false, integer_lower_bound(cond.if_true));
                    self.nodes[n].raise_branch_bound(true, integer_lower_bound(cond.if_false));
                }
            }
        }
        Ok(true)
    }

    /// Analyses the reason of the current objective bound: the minimal set
    /// of decisions supporting `[objective >= bound]` is extracted from the
    /// implication closure (first-UIP style), and the bound is attributed to
    /// the shallowest dive prefix containing that support. This coalesces
    /// what the dive learned through many levels into a single tree bound,
    /// pruning whole branches on later dives.
    fn attribute_bound_to_support(&mut self, solver: &mut Solver, dive: &[(NodeIndex, bool)], bound: IntCst) {
        let lb_lit = self.objective.ge_lit(bound);
        if !solver.state.entails(lb_lit) {
            return;
        }
        // gather the decisions in the implication closure of the bound
        let mut support: Vec<Lit> = Vec::new();
        let mut queue: Vec<Lit> = vec![lb_lit];
        let mut guard = 0;
        while let Some(l) = queue.pop() {
            guard += 1;
            if guard > 1024 {
                return; // pathological closure: attribution is best-effort
            }
            let Some(event) = solver.state.implying_event(l) else {
                continue;
            };
            match solver.state.get_event(event).cause {
                Origin::Decision => {
                    let decision = solver.state.get_event(event).new_literal();
                    if !support.contains(&decision) {
                        support.push(decision);
                    }
                }
                _ => {
                    let Solver { state, reasoners, .. } = solver;
                    if let Some(premises) = state.implying_literals(l, reasoners) {
                        queue.extend(premises);
                    }
                }
            }
        }
        // the shallowest prefix of the dive containing the whole support
        // already implies the bound: record it there
        for &(node, branch) in dive {
            let decision = if branch {
                self.nodes[node].literal
            } else {
                !self.nodes[node].literal
            };
            support.retain(|l| !decision.entails(*l));
            if support.is_empty() {
                self.nodes[node].raise_branch_bound(branch, bound);
                return;
            }
        }
    }

    /// Propagates branch bounds from the dive's leaf back to the root.
    fn update_branch_bounds(&mut self, dive: &[(NodeIndex, bool)]) {
        for window in dive.windows(2).rev() {
            let (parent, branch) = window[0];
            let (child, _) = window[1];
            let child_bound = self.nodes[child].bound();
            self.nodes[parent].raise_branch_bound(branch, child_bound);
        }
    }

    /// Minimizes the objective. `on_solution` observes every improvement.
    pub fn optimize(
        &mut self,
        solver: &mut Solver,
        mut on_solution: impl FnMut(IntCst, &SavedAssignment),
    ) -> Result<OptimizationStatus, Exit> {
        assert_eq!(solver.current_decision_level(), DecLvl::ROOT);

        for _iteration in 0..self.params.max_iterations {
            // keep the shared state consistent; conflicts at the root close
            // the search
            if solver.propagate_and_backtrack_to_consistent().is_err() {
                return Ok(self.final_status(true));
            }
            let root_lb = self.objective_lb(solver);
            if let Some((best, _)) = &self.best {
                if root_lb >= *best {
                    return Ok(OptimizationStatus::Optimal(*best));
                }
            }

            // initial restart schedule
            if self.num_restarts < self.params.max_initial_restarts
                && self.num_decisions >= self.params.decisions_before_initial_restarts * (self.num_restarts as u64 + 1)
            {
                self.full_restart();
            }

            // make sure the tree has a root
            if self.root.is_none() {
                let Some(literal) = self.branching_literal(solver) else {
                    // everything is bound: the current state is a solution
                    let value = self.objective_lb(solver);
                    self.record_solution(solver, value, &mut on_solution);
                    return Ok(OptimizationStatus::Optimal(value));
                };
                self.root = Some(self.nodes.push(Node::new(literal, root_lb)));
            }

            // dive from the root, following the branch of least bound
            let mut dive: Vec<(NodeIndex, bool)> = Vec::new();
            let mut current = self.root.unwrap();
            let _outcome = loop {
                let node = &self.nodes[current];
                // prefer the cheaper branch; ties go to the polarity that the
                // current state already satisfies
                let branch = if node.true_bound != node.false_bound {
                    node.true_bound < node.false_bound
                } else {
                    !solver.state.entails(!node.literal)
                };
                let first_visit = node.child(branch).is_none();
                let decision = if branch { node.literal } else { !node.literal };

                if solver.state.entails(!decision) {
                    // branch already refuted by propagation
                    self.nodes[current].raise_branch_bound(branch, INT_CST_MAX);
                    break DiveOutcome::Refuted;
                }
                if !solver.state.entails(decision) {
                    let obj_before = self.objective_lb(solver);
                    solver.decide(decision);
                    self.num_decisions += 1;
                    let changes = PseudoCosts::bound_changes(decision, &solver.state);
                    self.pseudo_costs.before_propagation(obj_before, changes);
                    if solver.propagate_and_backtrack_to_consistent().is_err() {
                        // exhausted under the root: the remaining gap is empty
                        return Ok(self.final_status(true));
                    }
                    self.pseudo_costs.after_propagation(self.objective_lb(solver));
                    if solver.state.entails(!decision) {
                        // conflict analysis refuted the branch
                        self.nodes[current].raise_branch_bound(branch, INT_CST_MAX);
                        break DiveOutcome::Refuted;
                    }
                    if !solver.state.entails(decision) {
                        // a backjump undid the decision: restart the dive with
                        // the refreshed bounds
                        break DiveOutcome::Backjumped;
                    }
                }
                dive.push((current, branch));
                let obj_now = self.objective_lb(solver);
                self.nodes[current].raise_branch_bound(branch, obj_now);

                if first_visit {
                    // solve the relaxation before committing deeper
                    if !self.exploit_relaxation(solver, current, branch, &dive[..dive.len() - 1])? {
                        break DiveOutcome::Refuted;
                    }
                }

                match self.nodes[current].child(branch) {
                    Some(child) => current = child,
                    None => {
                        // the dive reached a leaf: coalesce what propagation
                        // proved into the shallowest supporting prefix
                        if obj_now > root_lb {
                            self.attribute_bound_to_support(solver, &dive, obj_now);
                        }
                        // extend the tree or conclude with a solution
                        match self.branching_literal(solver) {
                            Some(literal) => {
                                let child = self.nodes.push(Node::new(literal, self.objective_lb(solver)));
                                self.nodes[current].set_child(branch, child);
                                current = child;
                            }
                            None => {
                                let value = self.objective_lb(solver);
                                self.record_solution(solver, value, &mut on_solution);
                                // this branch cannot produce anything better
                                self.nodes[current].raise_branch_bound(branch, value);
                                break DiveOutcome::Solution;
                            }
                        }
                    }
                }
            };
            self.update_branch_bounds(&dive);
            // return to the root: the next dive follows the updated bounds
            solver.restore(DecLvl::ROOT);

            // share the proven bound with the reasoners
            let tree_bound = self.root.map(|r| self.nodes[r].bound()).unwrap_or(root_lb);
            if tree_bound > self.objective_lb(solver) && tree_bound < INT_CST_MAX {
                if solver.post(self.objective.ge_lit(tree_bound)).is_err() {
                    return Ok(self.final_status(true));
                }
            } else if tree_bound == INT_CST_MAX {
                // the whole tree is refuted
                return Ok(self.final_status(true));
            }
        }
        Ok(self.final_status(false))
    }

    fn record_solution(
        &mut self,
        solver: &Solver,
        value: IntCst,
        on_solution: &mut impl FnMut(IntCst, &SavedAssignment),
    ) {
        if self.best.as_ref().map(|(b, _)| value < *b).unwrap_or(true) {
            debug!("lb-tree: solution of value {value}");
            let assignment = Arc::new(solver.state.clone());
            on_solution(value, &assignment);
            self.best = Some((value, assignment));
        }
    }

    fn final_status(&self, proven_exhausted: bool) -> OptimizationStatus {
        match (&self.best, proven_exhausted) {
            (Some((v, _)), true) => OptimizationStatus::Optimal(*v),
            (Some((v, _)), false) => OptimizationStatus::Feasible(*v),
            (None, true) => OptimizationStatus::Infeasible,
            (None, false) => OptimizationStatus::LimitReached,
        }
    }

    pub fn best_solution(&self) -> Option<(IntCst, Arc<SavedAssignment>)> {
        self.best.clone()
    }
}

enum DiveOutcome {
    Solution,
    Refuted,
    Backjumped,
}

#[cfg(test)]
mod tests {
    use num_rational::Rational64;

    use super::*;
    use crate::core::state::Domains;
    use crate::reasoners::cp::linear::{LinearSumLeq, SumElem};
    use crate::solver::opt::relaxation::{ConditionalBounds, LpSolution};

    /// Relaxation stub for `min x + y` under `3x + 2y >= 7`: the continuous
    /// optimum and the conditional bounds of `[x <= 2]` are hard-wired, as a
    /// backend would derive them from its reduced costs.
    struct StubRelaxation {
        obj_x: VarRef,
        x: VarRef,
        y: VarRef,
    }

    impl LinearRelaxation for StubRelaxation {
        fn solve(&mut self, domains: &Domains) -> anyhow::Result<Option<LpSolution>> {
            let (x_lb, x_ub) = domains.bounds(self.x);
            let (y_lb, _) = domains.bounds(self.y);
            let _ = self.obj_x;
            let rat = Rational64::from_integer;
            // the continuous optimum puts as much as possible on x (3 units
            // of constraint per objective unit, against 2 for y)
            let x_star = rat(x_ub)
                .min((rat(7) - rat(2) * rat(y_lb)) / rat(3))
                .max(rat(x_lb));
            let y_star = ((rat(7) - rat(3) * x_star) / rat(2)).max(rat(y_lb));
            let objective_bound = x_star + y_star;
            // reduced cost view of the branching literal [x <= 2]: under it
            // the bound moves to 2 + 1/2, otherwise it stays at 7/3
            let conditional = vec![ConditionalBounds {
                literal: self.x.leq(2),
                if_true: Rational64::new(5, 2),
                if_false: Rational64::new(7, 3),
            }];
            Ok(Some(LpSolution {
                objective_bound,
                conditional,
                basis: Basis(vec![]),
            }))
        }

        fn load_basis(&mut self, _basis: &Basis) {}

        fn change_stamp(&self) -> u64 {
            0
        }
    }

    /// The reduced-cost scenario: minimize x + y with 3x + 2y >= 7 over
    /// [0, 5] boxes. The integer optimum is 3.
    #[test]
    fn reduced_costs_guide_the_tree() {
        let mut solver = Solver::new();
        let x = solver.add_variable(0, 5);
        let y = solver.add_variable(0, 5);
        let obj = solver.add_variable(0, 10);
        // obj = x + y encoded as two inequalities
        let _ = solver.add_propagator(
            LinearSumLeq::new(vec![SumElem::new(1, x), SumElem::new(1, y), SumElem::new(-1, obj)], 0),
            LinearSumLeq::priority(),
        );
        let _ = solver.add_propagator(
            LinearSumLeq::new(vec![SumElem::new(-1, x), SumElem::new(-1, y), SumElem::new(1, obj)], 0),
            LinearSumLeq::priority(),
        );
        // 3x + 2y >= 7
        let _ = solver.add_propagator(
            LinearSumLeq::new(vec![SumElem::new(-3, x), SumElem::new(-2, y)], -7),
            LinearSumLeq::priority(),
        );

        let relaxation = Box::new(StubRelaxation { obj_x: obj, x, y });
        let mut search = LbTreeSearch::new(obj, relaxation);
        let status = search.optimize(&mut solver, |_, _| ()).unwrap();
        assert_eq!(status, OptimizationStatus::Optimal(3));
        let (value, solution) = search.best_solution().unwrap();
        assert_eq!(value, 3);
        // the solution satisfies the constraint
        assert!(3 * solution.lb(x) + 2 * solution.lb(y) >= 7);
    }

    #[test]
    fn tree_search_without_relaxation_guidance() {
        /// A backend whose only certificate is the trivially implied bound.
        struct TrivialRelaxation(VarRef);
        impl LinearRelaxation for TrivialRelaxation {
            fn solve(&mut self, domains: &Domains) -> anyhow::Result<Option<LpSolution>> {
                Ok(Some(LpSolution {
                    objective_bound: Rational64::from_integer(domains.lb(self.0)),
                    conditional: vec![],
                    basis: Basis(vec![]),
                }))
            }
            fn load_basis(&mut self, _basis: &Basis) {}
            fn change_stamp(&self) -> u64 {
                0
            }
        }

        // minimizing a single variable with no constraints
        let mut solver = Solver::new();
        let x = solver.add_variable(2, 9);
        let mut search = LbTreeSearch::new(x, Box::new(TrivialRelaxation(x)));
        let status = search.optimize(&mut solver, |_, _| ()).unwrap();
        assert_eq!(status, OptimizationStatus::Optimal(2));
    }
}
