//! All-different propagation, at two consistency levels:
//!
//! - [`AllDifferentOnBounds`]: bound consistency through Hall intervals;
//! - [`AllDifferentAc`]: arc consistency through a maximum matching in the
//!   variable/value graph and its residual strongly connected components.

use bit_set::BitSet;
use hashbrown::HashMap;
use itertools::Itertools;

use crate::core::state::{Cause, Domains, DomainsSnapshot, Explanation};
use crate::core::*;
use crate::encoding::IntEncoder;
use crate::reasoners::cp::{PriorityLevel, Propagator, PropagatorId, Watches};
use crate::reasoners::sat::SatSolver;
use crate::reasoners::Contradiction;

// ================================ Bounds =====================================

/// Bounds of one view during a pass, in pass orientation.
#[derive(Copy, Clone, Debug)]
struct PassItem {
    svar: SignedVar,
    lb: IntCst,
    ub: IntCst,
}

/// Outcome of one sweep of the Hall-interval pass, as a pure function of the
/// input bounds. Both propagation and explanation replay the sweep.
#[derive(Debug)]
enum PassEvent {
    /// The view in `item` had its lower bound pushed to `hall_end + 1`
    /// because of the Hall interval `[hall_start, hall_end]`.
    Push {
        item: PassItem,
        hall_start: IntCst,
        hall_end: IntCst,
    },
    /// Too many views compete for `[hall_start, blocked_ub]`.
    Overflow {
        hall_start: IntCst,
        blocked_ub: IntCst,
    },
}

/// Union-find over values: `find(v)` returns the smallest non-occupied value
/// `>= v`. Sparse, so arbitrarily spread bounds need no windowing.
#[derive(Default)]
struct SlotAllocator {
    next_free: HashMap<IntCst, IntCst>,
    /// start of the occupied cluster that ends at the key value
    cluster_start_of_end: HashMap<IntCst, IntCst>,
    /// end of the occupied cluster that starts at the key value
    cluster_end_of_start: HashMap<IntCst, IntCst>,
}

impl SlotAllocator {
    fn find(&mut self, value: IntCst) -> IntCst {
        match self.next_free.get(&value) {
            None => value,
            Some(&next) => {
                let root = self.find(next);
                let _ = self.next_free.insert(value, root); // path compression
                root
            }
        }
    }

    /// Occupies `value` (must be free) and returns the bounds of the
    /// occupied cluster it now belongs to.
    fn occupy(&mut self, value: IntCst) -> (IntCst, IntCst) {
        debug_assert!(!self.next_free.contains_key(&value));
        let _ = self.next_free.insert(value, value + 1);
        let start = self.cluster_start_of_end.remove(&(value - 1)).unwrap_or(value);
        let end = match self.cluster_end_of_start.remove(&(value + 1)) {
            Some(end) => end,
            None => value,
        };
        let _ = self.cluster_start_of_end.insert(end, start);
        let _ = self.cluster_end_of_start.insert(start, end);
        (start, end)
    }
}

/// Replays the Hall-interval sweep on the given bounds (tightening the lower
/// bounds of the views). Pushes are reflected in the remainder of the sweep;
/// the sweep stops at the first overflow.
fn hall_sweep(items: &[PassItem]) -> Vec<PassEvent> {
    let mut events = Vec::new();
    let mut slots = SlotAllocator::default();
    // Hall intervals discovered so far, sorted and disjoint
    let mut halls: Vec<(IntCst, IntCst)> = Vec::new();

    let order = items.iter().copied().sorted_by_key(|it| it.ub);
    for mut item in order {
        // a Hall interval covering the lower bound forbids all its values
        let idx = halls.partition_point(|&(_, he)| he < item.lb);
        if idx < halls.len() {
            let (hs, he) = halls[idx];
            if hs <= item.lb {
                events.push(PassEvent::Push {
                    item,
                    hall_start: hs,
                    hall_end: he,
                });
                item.lb = he + 1;
            }
        }
        let slot = slots.find(item.lb);
        if slot > item.ub {
            // the cluster blocking [item.lb, item.ub] holds too many views
            let start = slots
                .cluster_start_of_end
                .get(&(slot - 1))
                .copied()
                .unwrap_or(item.lb)
                .min(item.lb);
            events.push(PassEvent::Overflow {
                hall_start: start,
                blocked_ub: item.ub,
            });
            return events;
        }
        let (start, end) = slots.occupy(slot);
        if end == item.ub {
            // every value of [start, end] is taken by a view with bounds
            // inside it: a new Hall interval, subsuming any enclosed one
            halls.retain(|&(hs, he)| !(start <= hs && he <= end));
            let idx = halls.partition_point(|&(hs, _)| hs < start);
            halls.insert(idx, (start, end));
        }
    }
    events
}

/// Bound-consistent all-different over a set of variables.
///
/// Two sweeps per propagation: a forward one tightening lower bounds and a
/// backward one running the same algorithm on the negated views.
#[derive(Clone)]
pub struct AllDifferentOnBounds {
    vars: Vec<VarRef>,
}

impl AllDifferentOnBounds {
    pub fn new(vars: impl IntoIterator<Item = VarRef>) -> Self {
        AllDifferentOnBounds {
            vars: vars.into_iter().collect(),
        }
    }

    pub fn priority() -> PriorityLevel {
        PriorityLevel::Medium
    }

    fn pass_items(&self, bounds: impl Fn(SignedVar) -> (IntCst, IntCst), forward: bool) -> Vec<PassItem> {
        self.vars
            .iter()
            .map(|&v| {
                let svar = if forward { SignedVar::plus(v) } else { SignedVar::minus(v) };
                let (lb, ub) = bounds(svar);
                PassItem { svar, lb, ub }
            })
            .collect()
    }

    /// Reason of a push or overflow: the bounds of every view lying inside
    /// the Hall interval, plus the pushed view's own lower bound.
    fn hall_reason(
        items: &[PassItem],
        pushed: Option<PassItem>,
        hall_start: IntCst,
        hall_end: IntCst,
        out: &mut Explanation,
    ) {
        for it in items {
            if Some(it.svar) == pushed.map(|p| p.svar) {
                continue;
            }
            if hall_start <= it.lb && it.ub <= hall_end {
                out.push(it.svar.geq(hall_start));
                out.push(it.svar.leq(hall_end));
            }
        }
        if let Some(p) = pushed {
            out.push(p.svar.geq(hall_start));
        }
    }

    fn run(&self, domains: &mut Domains, cause: Cause, forward: bool) -> Result<bool, Contradiction> {
        let items = self.pass_items(|sv| (domains.lb(sv), domains.ub(sv)), forward);
        let events = hall_sweep(&items);
        let mut change = false;
        for event in events {
            match event {
                PassEvent::Push { item, hall_end, .. } => {
                    change |= domains.set_lb(item.svar, hall_end + 1, cause)?;
                }
                PassEvent::Overflow {
                    hall_start,
                    blocked_ub,
                } => {
                    // more views than values in [hall_start, blocked_ub]
                    let mut explanation = Explanation::new();
                    for it in &items {
                        if hall_start <= it.lb && it.ub <= blocked_ub {
                            explanation.push(it.svar.geq(hall_start));
                            explanation.push(it.svar.leq(blocked_ub));
                        }
                    }
                    return Err(explanation.into());
                }
            }
        }
        Ok(change)
    }
}

impl Propagator for AllDifferentOnBounds {
    fn setup(&mut self, id: PropagatorId, context: &mut Watches) {
        for &v in &self.vars {
            context.add_watch(v, id);
        }
    }

    fn propagate(&mut self, domains: &mut Domains, cause: Cause) -> Result<(), Contradiction> {
        // sweep in both directions until neither tightens anything
        loop {
            let mut change = self.run(domains, cause, true)?;
            change |= self.run(domains, cause, false)?;
            if !change {
                return Ok(());
            }
        }
    }

    fn explain(&self, literal: Lit, state: &DomainsSnapshot, out_explanation: &mut Explanation) {
        // the pushed view is the negation of the literal's signed variable
        let view = literal.svar().neg();
        let target_lb = -literal.ub_value();
        for forward in [true, false] {
            let items = self.pass_items(|sv| (state.lb(sv), state.ub(sv)), forward);
            if !items.iter().any(|it| it.svar == view) {
                continue;
            }
            for event in hall_sweep(&items) {
                if let PassEvent::Push {
                    item,
                    hall_start,
                    hall_end,
                } = event
                {
                    if item.svar == view && hall_end + 1 >= target_lb {
                        Self::hall_reason(&items, Some(item), hall_start, hall_end, out_explanation);
                        return;
                    }
                }
            }
        }
        panic!("asked to explain a push that the sweep does not reproduce");
    }

    fn clone_box(&self) -> Box<dyn Propagator> {
        Box::new(self.clone())
    }
}

// ============================= Arc consistency ===============================

/// Arc-consistent all-different, maintained by matching in the bipartite
/// variable/value graph whose edges carry the equality literals of the
/// involved variables.
///
/// Instances on one or two variables are decomposed into pairwise
/// difference clauses at construction and the propagator itself is inert.
#[derive(Clone)]
pub struct AllDifferentAc {
    vars: Vec<VarRef>,
    /// Dense remap of the values appearing in any domain.
    values: Vec<IntCst>,
    /// For each variable, its `(value_index, literal)` edges sorted by value index.
    edges: Vec<Vec<(usize, Lit)>>,
    /// Matching from the previous call: value index -> variable index.
    val_match: Vec<Option<usize>>,
    /// Reverse mapping from an edge literal to its `(variable, value)` indices.
    edge_of_lit: HashMap<Lit, (usize, usize)>,
    /// Instance small enough to be fully decomposed into clauses.
    trivial: bool,
}

impl AllDifferentAc {
    /// Builds the value graph, fully encoding every variable. Must be called
    /// at the root level.
    pub fn new(
        vars: impl IntoIterator<Item = VarRef>,
        domains: &mut Domains,
        sat: &mut SatSolver,
        encoder: &mut IntEncoder,
    ) -> Self {
        let vars: Vec<VarRef> = vars.into_iter().collect();

        let mut values: Vec<IntCst> = vars
            .iter()
            .flat_map(|&v| domains.initial_domain(v).values().collect_vec())
            .collect();
        values.sort_unstable();
        values.dedup();

        let trivial = vars.len() <= 2;
        if trivial {
            // pairwise decomposition: no two variables take the same value
            for (i, &x) in vars.iter().enumerate() {
                for &y in &vars[i + 1..] {
                    for &value in &values {
                        let lx = encoder.eq_literal(domains, sat, x, value);
                        let ly = encoder.eq_literal(domains, sat, y, value);
                        if lx != Lit::FALSE && ly != Lit::FALSE {
                            let _ = sat.add_clause([!lx, !ly]);
                        }
                    }
                }
            }
            return AllDifferentAc {
                vars,
                values,
                edges: Vec::new(),
                val_match: Vec::new(),
                edge_of_lit: HashMap::new(),
                trivial,
            };
        }

        let mut edges = Vec::with_capacity(vars.len());
        let mut edge_of_lit = HashMap::new();
        for (var_idx, &v) in vars.iter().enumerate() {
            let mut var_edges = Vec::new();
            for (val_idx, &value) in values.iter().enumerate() {
                let lit = encoder.eq_literal(domains, sat, v, value);
                if lit == Lit::FALSE {
                    continue; // value not in this variable's domain
                }
                var_edges.push((val_idx, lit));
                if lit != Lit::TRUE {
                    let _ = edge_of_lit.insert(lit, (var_idx, val_idx));
                }
            }
            edges.push(var_edges);
        }
        let val_match = vec![None; values.len()];
        AllDifferentAc {
            vars,
            values,
            edges,
            val_match,
            edge_of_lit,
            trivial,
        }
    }

    pub fn priority() -> PriorityLevel {
        PriorityLevel::Slow
    }

    fn num_vars(&self) -> usize {
        self.vars.len()
    }

    /// DFS augmenting path search for `var`; `visited` collects value indices.
    fn augment(
        edges: &[Vec<(usize, Lit)>],
        present: &impl Fn(usize, usize, Lit) -> bool,
        val_match: &mut [Option<usize>],
        visited: &mut BitSet,
        var: usize,
    ) -> bool {
        for &(val, lit) in &edges[var] {
            if !present(var, val, lit) || visited.contains(val) {
                continue;
            }
            let _ = visited.insert(val);
            let reassigned = match val_match[val] {
                None => true,
                Some(owner) => Self::augment(edges, present, val_match, visited, owner),
            };
            if reassigned {
                val_match[val] = Some(var);
                return true;
            }
        }
        false
    }

    /// Computes a maximum matching covering all variables. On failure,
    /// returns the unmatchable variable, the value set reached by the failed
    /// search and the partial matching at that point.
    #[allow(clippy::type_complexity)]
    fn full_matching(
        edges: &[Vec<(usize, Lit)>],
        num_values: usize,
        present: &impl Fn(usize, usize, Lit) -> bool,
        seed: &[Option<usize>],
    ) -> Result<Vec<Option<usize>>, (usize, BitSet, Vec<Option<usize>>)> {
        let mut val_match: Vec<Option<usize>> = vec![None; num_values];
        // seed from the previous matching where still valid
        for (val, &owner) in seed.iter().enumerate() {
            if let Some(var) = owner {
                if val_match[val].is_none()
                    && edges[var].iter().any(|&(v, lit)| v == val && present(var, v, lit))
                {
                    val_match[val] = Some(var);
                }
            }
        }
        let mut matched = BitSet::with_capacity(edges.len());
        for &owner in val_match.iter().flatten() {
            let _ = matched.insert(owner);
        }
        let mut visited = BitSet::with_capacity(num_values);
        for var in 0..edges.len() {
            if matched.contains(var) {
                continue;
            }
            visited.clear();
            if !Self::augment(edges, present, &mut val_match, &mut visited, var) {
                return Err((var, visited, val_match));
            }
        }
        Ok(val_match)
    }

    /// Premises of a Hall violation: the falsified edge literals leaving the
    /// reached variables towards unreached values.
    ///
    /// `skip_var` and `skip_val` exclude the edges whose absence follows from
    /// a pinning assumption (when explaining a pruning) rather than from the
    /// state: those are implied by the constraint itself.
    #[allow(clippy::too_many_arguments)]
    fn hall_premises(
        &self,
        failed_var: usize,
        reached_values: &BitSet,
        present: &impl Fn(usize, usize, Lit) -> bool,
        val_match: &[Option<usize>],
        skip_var: Option<usize>,
        skip_val: Option<usize>,
        out: &mut Explanation,
    ) {
        let mut reached_vars = BitSet::with_capacity(self.num_vars());
        let _ = reached_vars.insert(failed_var);
        for val in reached_values.iter() {
            if let Some(owner) = val_match[val] {
                let _ = reached_vars.insert(owner);
            }
        }
        for var in reached_vars.iter() {
            if skip_var == Some(var) {
                continue;
            }
            for &(val, lit) in &self.edges[var] {
                if skip_val == Some(val) {
                    continue;
                }
                if !reached_values.contains(val) && !present(var, val, lit) {
                    out.push(!lit);
                }
            }
        }
    }

    /// Iterative Tarjan SCC on the residual graph. Nodes: variables, then
    /// values, then an optional dummy that channels the free values.
    fn sccs(&self, val_match: &[Option<usize>], present: &impl Fn(usize, usize, Lit) -> bool) -> Vec<u32> {
        let n = self.num_vars();
        let m = self.values.len();
        let has_dummy = n < m;
        let num_nodes = n + m + usize::from(has_dummy);
        let dummy = n + m;

        let mut successors: Vec<Vec<usize>> = vec![Vec::new(); num_nodes];
        for (var, var_edges) in self.edges.iter().enumerate() {
            for &(val, lit) in var_edges {
                if !present(var, val, lit) {
                    continue;
                }
                if val_match[val] == Some(var) {
                    // matched edge: value -> variable
                    successors[n + val].push(var);
                } else {
                    // possible edge: variable -> value
                    successors[var].push(n + val);
                }
            }
        }
        if has_dummy {
            for val in 0..m {
                if val_match[val].is_none() {
                    successors[n + val].push(dummy);
                } else {
                    successors[dummy].push(n + val);
                }
            }
        }

        // Tarjan, iterative
        const UNSET: u32 = u32::MAX;
        let mut index = vec![UNSET; num_nodes];
        let mut low = vec![0u32; num_nodes];
        let mut on_stack = BitSet::with_capacity(num_nodes);
        let mut scc_of = vec![UNSET; num_nodes];
        let mut stack: Vec<usize> = Vec::new();
        let mut next_index = 0u32;
        let mut num_sccs = 0u32;
        // call stack of (node, next successor position)
        let mut call_stack: Vec<(usize, usize)> = Vec::new();

        fn open(node: usize, next_index: &mut u32, index: &mut [u32], low: &mut [u32], stack: &mut Vec<usize>, on_stack: &mut BitSet) {
            index[node] = *next_index;
            low[node] = *next_index;
            *next_index += 1;
            stack.push(node);
            let _ = on_stack.insert(node);
        }

        for root in 0..num_nodes {
            if index[root] != UNSET {
                continue;
            }
            open(root, &mut next_index, &mut index, &mut low, &mut stack, &mut on_stack);
            call_stack.push((root, 0));
            while let Some(&(node, pos)) = call_stack.last() {
                if let Some(&succ) = successors[node].get(pos) {
                    call_stack.last_mut().unwrap().1 += 1;
                    if index[succ] == UNSET {
                        open(succ, &mut next_index, &mut index, &mut low, &mut stack, &mut on_stack);
                        call_stack.push((succ, 0));
                    } else if on_stack.contains(succ) {
                        low[node] = low[node].min(index[succ]);
                    }
                } else {
                    // node is fully explored
                    if low[node] == index[node] {
                        loop {
                            let w = stack.pop().unwrap();
                            on_stack.remove(w);
                            scc_of[w] = num_sccs;
                            if w == node {
                                break;
                            }
                        }
                        num_sccs += 1;
                    }
                    let _ = call_stack.pop();
                    if let Some(&(parent, _)) = call_stack.last() {
                        low[parent] = low[parent].min(low[node]);
                    }
                }
            }
        }
        scc_of
    }
}

impl Propagator for AllDifferentAc {
    fn setup(&mut self, id: PropagatorId, context: &mut Watches) {
        for &v in &self.vars {
            context.add_watch(v, id);
        }
        for &lit in self.edge_of_lit.keys() {
            context.add_lit_watch(!lit, id);
        }
    }

    fn propagate(&mut self, domains: &mut Domains, cause: Cause) -> Result<(), Contradiction> {
        if self.trivial {
            return Ok(()); // decomposed into clauses at construction
        }
        let num_values = self.values.len();
        let n = self.num_vars();

        // read-only phase: matching, SCCs and the edges to prune
        let to_remove: Vec<Lit> = {
            let present = |_: usize, _: usize, lit: Lit| !domains.entails(!lit);

            let val_match = match Self::full_matching(&self.edges, num_values, &present, &self.val_match) {
                Ok(matching) => matching,
                Err((failed_var, reached, partial)) => {
                    // Hall violation: no perfect matching exists
                    let mut explanation = Explanation::new();
                    self.hall_premises(failed_var, &reached, &present, &partial, None, None, &mut explanation);
                    return Err(explanation.into());
                }
            };
            // matched edges stay; an unmatched edge survives only inside its SCC
            let scc = self.sccs(&val_match, &present);
            let mut to_remove = Vec::new();
            for (var, var_edges) in self.edges.iter().enumerate() {
                for &(val, lit) in var_edges {
                    if !present(var, val, lit) || val_match[val] == Some(var) {
                        continue;
                    }
                    if scc[var] != scc[n + val] {
                        to_remove.push(lit);
                    }
                }
            }
            self.val_match = val_match;
            to_remove
        };

        for lit in to_remove {
            let _ = domains.set(!lit, cause)?;
        }
        Ok(())
    }

    fn explain(&self, literal: Lit, state: &DomainsSnapshot, out_explanation: &mut Explanation) {
        // `literal` is the negation of an edge literal: pruning (x = val)
        let edge_lit = !literal;
        let &(x, val) = self
            .edge_of_lit
            .get(&edge_lit)
            .expect("explaining a literal this propagator does not manage");

        // premises: forcing x = val makes the matching infeasible in `state`
        let present = |var: usize, v: usize, lit: Lit| {
            if var == x {
                v == val // x is pinned to val
            } else if v == val {
                false // val is taken
            } else {
                !state.entails(!lit)
            }
        };
        let seed = vec![None; self.values.len()];
        match Self::full_matching(&self.edges, self.values.len(), &present, &seed) {
            Err((failed_var, reached, partial)) => {
                // x's missing edges and the other uses of `val` are implied by
                // the pinning, not by the state
                self.hall_premises(failed_var, &reached, &present, &partial, Some(x), Some(val), out_explanation);
            }
            Ok(_) => panic!("pruned edge is consistent in the explanation state"),
        }
    }

    fn clone_box(&self) -> Box<dyn Propagator> {
        Box::new(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backtrack::Backtrack;
    use crate::reasoners::cp::Cp;
    use crate::reasoners::{ReasonerId, Theory};

    fn setup(n: usize, lb: IntCst, ub: IntCst) -> (Domains, Vec<VarRef>) {
        let mut domains = Domains::new();
        let vars = (0..n).map(|_| domains.new_var(lb, ub)).collect();
        (domains, vars)
    }

    #[test]
    fn hall_sweep_pushes_out_of_full_interval() {
        // x, y in [0, 1]; z in [0, 2]: z must leave {0, 1}
        let items = vec![
            PassItem { svar: SignedVar::plus(VarRef::from_u32(1)), lb: 0, ub: 1 },
            PassItem { svar: SignedVar::plus(VarRef::from_u32(2)), lb: 0, ub: 1 },
            PassItem { svar: SignedVar::plus(VarRef::from_u32(3)), lb: 0, ub: 2 },
        ];
        let events = hall_sweep(&items);
        assert_eq!(events.len(), 1);
        match &events[0] {
            PassEvent::Push { item, hall_start, hall_end } => {
                assert_eq!(item.svar.variable(), VarRef::from_u32(3));
                assert_eq!((*hall_start, *hall_end), (0, 1));
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn hall_sweep_detects_overflow() {
        let items: Vec<PassItem> = (1..=3)
            .map(|i| PassItem { svar: SignedVar::plus(VarRef::from_u32(i)), lb: 0, ub: 1 })
            .collect();
        let events = hall_sweep(&items);
        assert!(matches!(events.last(), Some(PassEvent::Overflow { .. })));
    }

    #[test]
    fn bounds_scenario_three_vars() {
        // x, y, z in [0, 2], all different; then [x >= 2]
        let (mut domains, vars) = setup(3, 0, 2);
        let mut cp = Cp::new(ReasonerId::Cp);
        let _ = cp.add_propagator(
            AllDifferentOnBounds::new(vars.clone()),
            AllDifferentOnBounds::priority(),
        );
        cp.propagate(&mut domains).unwrap();
        for &v in &vars {
            assert_eq!(domains.bounds(v), (0, 2));
        }

        let _ = domains.save_state();
        let _ = cp.save_state();
        domains.decide(vars[0].geq(2)).unwrap();
        cp.propagate(&mut domains).unwrap();
        // only 0 and 1 remain for y and z
        assert_eq!(domains.bounds(vars[1]), (0, 1));
        assert_eq!(domains.bounds(vars[2]), (0, 1));
        assert_eq!(domains.bounds(vars[0]), (2, 2));
    }

    #[test]
    fn bounds_overflow_is_a_conflict() {
        let (mut domains, vars) = setup(4, 0, 2);
        let mut cp = Cp::new(ReasonerId::Cp);
        let _ = cp.add_propagator(AllDifferentOnBounds::new(vars), AllDifferentOnBounds::priority());
        assert!(cp.propagate(&mut domains).is_err());
    }

    #[test]
    fn bounds_push_is_explainable() {
        let (mut domains, vars) = setup(3, 0, 2);
        let mut prop = AllDifferentOnBounds::new(vars.clone());
        let _ = domains.save_state();
        domains.decide(vars[1].leq(1)).unwrap();
        domains.decide(vars[2].leq(1)).unwrap();
        let cause = Cause::inference(ReasonerId::Cp, 0u32);
        prop.propagate(&mut domains, cause).unwrap();
        assert_eq!(domains.lb(vars[0]), 2);

        let snapshot = DomainsSnapshot::preceding(&domains, vars[0].geq(2));
        let mut expl = Explanation::new();
        prop.explain(vars[0].geq(2), &snapshot, &mut expl);
        // premises: y and z confined to [0, 1], x >= 0
        assert!(expl.lits.contains(&vars[1].leq(1)));
        assert!(expl.lits.contains(&vars[2].leq(1)));
        for &l in &expl.lits {
            assert!(snapshot.entails(l), "{l:?} does not hold in the snapshot");
        }
    }

    fn ac_setup(n: usize, lb: IntCst, ub: IntCst) -> (Domains, SatSolver, IntEncoder, Vec<VarRef>, Cp) {
        let mut domains = Domains::new();
        let vars: Vec<VarRef> = (0..n).map(|_| domains.new_var(lb, ub)).collect();
        let sat = SatSolver::new(ReasonerId::Sat);
        let enc = IntEncoder::new();
        let cp = Cp::new(ReasonerId::Cp);
        (domains, sat, enc, vars, cp)
    }

    fn propagate_all(domains: &mut Domains, sat: &mut SatSolver, cp: &mut Cp) -> Result<(), Contradiction> {
        loop {
            let before = domains.num_events();
            Theory::propagate(sat, domains)?;
            Theory::propagate(cp, domains)?;
            if domains.num_events() == before {
                return Ok(());
            }
        }
    }

    #[test]
    fn ac_prunes_to_a_matchable_graph() {
        let (mut domains, mut sat, mut enc, vars, mut cp) = ac_setup(3, 0, 2);
        let prop = AllDifferentAc::new(vars.clone(), &mut domains, &mut sat, &mut enc);
        let _ = cp.add_propagator(prop, AllDifferentAc::priority());
        propagate_all(&mut domains, &mut sat, &mut cp).unwrap();

        // fix x = 1: the value disappears from y and z
        let _ = domains.save_state();
        let _ = sat.save_state();
        let _ = cp.save_state();
        let x_is_1 = enc.eq_literal(&mut domains, &mut sat, vars[0], 1);
        domains.decide(x_is_1).unwrap();
        propagate_all(&mut domains, &mut sat, &mut cp).unwrap();
        let y_is_1 = enc.eq_literal(&mut domains, &mut sat, vars[1], 1);
        let z_is_1 = enc.eq_literal(&mut domains, &mut sat, vars[2], 1);
        assert_eq!(domains.value(y_is_1), Some(false));
        assert_eq!(domains.value(z_is_1), Some(false));
    }

    #[test]
    fn ac_detects_hall_conflict() {
        let (mut domains, mut sat, mut enc, vars, mut cp) = ac_setup(3, 0, 2);
        let prop = AllDifferentAc::new(vars.clone(), &mut domains, &mut sat, &mut enc);
        let _ = cp.add_propagator(prop, AllDifferentAc::priority());
        propagate_all(&mut domains, &mut sat, &mut cp).unwrap();

        // squeeze all three variables into {0, 1}
        let _ = domains.save_state();
        let _ = sat.save_state();
        let _ = cp.save_state();
        for &v in &vars {
            domains.decide(v.leq(1)).unwrap();
        }
        assert!(propagate_all(&mut domains, &mut sat, &mut cp).is_err());
    }

    #[test]
    fn ac_pairwise_fallback() {
        let (mut domains, mut sat, mut enc, vars, mut cp) = ac_setup(2, 0, 1);
        let prop = AllDifferentAc::new(vars.clone(), &mut domains, &mut sat, &mut enc);
        let _ = cp.add_propagator(prop, AllDifferentAc::priority());
        propagate_all(&mut domains, &mut sat, &mut cp).unwrap();

        let _ = domains.save_state();
        let _ = sat.save_state();
        let _ = cp.save_state();
        // x = 0 forces y = 1 through the pairwise clauses
        domains.decide(vars[0].leq(0)).unwrap();
        propagate_all(&mut domains, &mut sat, &mut cp).unwrap();
        assert_eq!(domains.lb(vars[1]), 1);
    }
}
