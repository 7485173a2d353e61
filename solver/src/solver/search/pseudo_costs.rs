//! Pseudo-costs: running averages of the objective improvement obtained per
//! unit of bound change, per variable and per direction. Used as a branching
//! heuristic by the lower-bound tree search.

use env_param::EnvParam;

use crate::collections::ref_store::RefMap;
use crate::core::state::{Domains, Origin};
use crate::core::*;

/// Number of recorded updates (variable + its negation) before a variable is
/// considered to have reliable pseudo-costs.
static PSEUDO_COST_RELIABILITY: EnvParam<u32> = EnvParam::new("VELA_PSEUDO_COST_RELIABILITY_THRESHOLD", "2");

/// Floor applied to each direction's average when scoring, so that an
/// unexplored direction does not zero the product.
const EPSILON: f64 = 0.1;

#[derive(Copy, Clone, Default)]
struct IncrementalAverage {
    average: f64,
    count: u32,
}

impl IncrementalAverage {
    fn add(&mut self, value: f64) {
        self.count += 1;
        self.average += (value - self.average) / f64::from(self.count);
    }
}

/// A signed-variable bound increase caused by a decision.
#[derive(Copy, Clone, Debug)]
pub struct BoundChange {
    /// View whose lower bound increased (the decision variable, or a variable
    /// it directly constrained).
    pub var: SignedVar,
    pub delta: IntCst,
}

/// Per-direction pseudo-cost table.
///
/// The positive view of a variable records the cost of increasing its lower
/// bound, the negative view that of decreasing its upper bound.
#[derive(Clone, Default)]
pub struct PseudoCosts {
    costs: RefMap<SignedVar, IncrementalAverage>,
    /// Objective lower bound snapshotted before the pending decision.
    saved_objective_lb: Option<IntCst>,
    /// Bound changes of the pending decision.
    saved_changes: Vec<BoundChange>,
}

impl PseudoCosts {
    pub fn new() -> Self {
        Self::default()
    }

    /// The lower-bound increases that deciding `decision` would cause,
    /// read from the trail events of the current level.
    ///
    /// Call after the decision was applied but before propagation, so the
    /// recorded deltas are those of the decision itself.
    pub fn bound_changes(decision: Lit, domains: &Domains) -> Vec<BoundChange> {
        let mut changes = Vec::with_capacity(4);
        // walk the tail of the trail: the implications of the decision come
        // first (in reverse order), then the decision event itself
        for ev in domains.trail().events().iter().rev() {
            let is_decision = ev.cause == Origin::Decision;
            if !is_decision && !matches!(ev.cause, Origin::ImplicationPropagation(_)) {
                break;
            }
            // an upper bound decrease of `v` is a lower bound increase of `-v`
            let var = ev.affected_bound.neg();
            let delta = ev.previous.upper_bound.as_int() - ev.new_upper_bound;
            if delta > 0 {
                changes.push(BoundChange { var, delta });
            }
            if is_decision {
                break;
            }
        }
        debug_assert!(
            changes.iter().any(|c| c.var == decision.svar().neg()) || changes.is_empty(),
            "the decision literal itself should appear in its bound changes"
        );
        changes
    }

    /// Snapshots the objective bound and the changes of a decision about to
    /// be propagated.
    pub fn before_propagation(&mut self, objective_lb: IntCst, changes: Vec<BoundChange>) {
        self.saved_objective_lb = Some(objective_lb);
        self.saved_changes = changes;
    }

    /// Records the objective movement observed after propagating the
    /// decision snapshotted by [`Self::before_propagation`].
    pub fn after_propagation(&mut self, objective_lb: IntCst) {
        let Some(previous) = self.saved_objective_lb.take() else {
            return;
        };
        let objective_delta = (objective_lb - previous).max(0) as f64;
        for change in self.saved_changes.drain(..) {
            debug_assert!(change.delta > 0);
            let unit_cost = objective_delta / change.delta as f64;
            self.costs.get_mut_or_insert(change.var, Default::default).add(unit_cost);
        }
    }

    fn cost(&self, var: SignedVar) -> IncrementalAverage {
        self.costs.get(var).copied().unwrap_or_default()
    }

    /// True if enough updates were recorded on the variable (both directions
    /// together) for its score to be meaningful.
    pub fn is_relevant(&self, var: VarRef) -> bool {
        let records = self.cost(SignedVar::plus(var)).count + self.cost(SignedVar::minus(var)).count;
        records >= PSEUDO_COST_RELIABILITY.get()
    }

    /// Score of a variable: the product of its per-direction costs, floored
    /// to avoid collapsing on unexplored directions.
    pub fn score(&self, var: VarRef) -> f64 {
        let up = self.cost(SignedVar::plus(var)).average; // lb increase
        let down = self.cost(SignedVar::minus(var)).average; // ub decrease
        up.max(EPSILON) * down.max(EPSILON)
    }

    /// The relevant unbound variable with the best score, and the branch of
    /// least expected objective cost: `true` to explore the lower half
    /// first.
    pub fn best_decision(&self, domains: &Domains) -> Option<(VarRef, Lit)> {
        let mut best: Option<(VarRef, f64)> = None;
        for var in domains.variables() {
            if domains.is_bound(var) || !self.is_relevant(var) {
                continue;
            }
            let score = self.score(var);
            if best.map(|(_, s)| score > s).unwrap_or(true) {
                best = Some((var, score));
            }
        }
        let (var, _) = best?;
        let (lb, ub) = domains.bounds(var);
        let mid = lb + (ub - lb) / 2;
        // branch towards the cheaper side
        let up_cost = self.cost(SignedVar::plus(var)).average;
        let down_cost = self.cost(SignedVar::minus(var)).average;
        let lit = if down_cost <= up_cost {
            Lit::leq(var, mid)
        } else {
            Lit::geq(var, mid + 1)
        };
        Some((var, lit))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backtrack::Backtrack;
    use crate::core::state::Cause;

    #[test]
    fn averages_accumulate_per_direction() {
        let mut pc = PseudoCosts::new();
        let mut domains = Domains::new();
        let x = domains.new_var(0, 10);

        // two decisions increasing the lower bound of x, with objective
        // gains of 4 then 0
        for (delta, gain) in [(2, 4), (2, 0)] {
            let _ = domains.save_state();
            let lb = domains.lb(x);
            domains.decide(x.geq(lb + delta)).unwrap();
            let changes = PseudoCosts::bound_changes(x.geq(lb + delta), &domains);
            assert_eq!(changes.len(), 1);
            assert_eq!(changes[0].delta, delta);
            pc.before_propagation(0, changes);
            pc.after_propagation(gain);
        }
        // average of 4/2 and 0/2
        let up = pc.cost(SignedVar::plus(x)).average;
        assert!((up - 1.0).abs() < 1e-9);
        assert!(pc.is_relevant(x));
        assert_eq!(pc.cost(SignedVar::minus(x)).count, 0);
    }

    #[test]
    fn branches_toward_cheaper_side() {
        let mut pc = PseudoCosts::new();
        let mut domains = Domains::new();
        let x = domains.new_var(0, 9);

        // raising the lower bound of x is expensive, lowering its upper
        // bound is free
        pc.costs.get_mut_or_insert(SignedVar::plus(x), Default::default).add(5.0);
        pc.costs.get_mut_or_insert(SignedVar::minus(x), Default::default).add(0.0);

        let (var, lit) = pc.best_decision(&domains).unwrap();
        assert_eq!(var, x);
        assert_eq!(lit, x.leq(4));
    }
}
