use std::sync::Arc;

use env_param::EnvParam;

use crate::backtrack::{Backtrack, DecLvl, Trail};
use crate::collections::heap::IdxHeap;
use crate::collections::ref_store::RefMap;
use crate::core::state::{Conflict, Domains};
use crate::core::{IntCst, Lit, VarRef};
use crate::solver::search::{Decision, SearchControl};
use crate::solver::signals::SavedAssignment;
use crate::solver::stats::Stats;

pub static PREFER_MIN_VALUE: EnvParam<bool> = EnvParam::new("VELA_PREFER_MIN_VALUE", "true");
pub static INITIALLY_ALLOWED_CONFLICTS: EnvParam<u64> = EnvParam::new("VELA_INITIALLY_ALLOWED_CONFLICTS", "100");
pub static INCREASE_RATIO_FOR_ALLOWED_CONFLICTS: EnvParam<f32> =
    EnvParam::new("VELA_INCREASE_RATIO_FOR_ALLOWED_CONFLICTS", "1.5");
pub static USE_LNS: EnvParam<bool> = EnvParam::new("VELA_ACTIVITY_USES_LNS", "true");

#[derive(Clone)]
pub struct BranchingParams {
    pub prefer_min_value: bool,
    pub allowed_conflicts: u64,
    pub increase_ratio_for_allowed_conflicts: f32,
    pub var_inc: f32,
    pub var_decay: f32,
}

impl Default for BranchingParams {
    fn default() -> Self {
        BranchingParams {
            prefer_min_value: PREFER_MIN_VALUE.get(),
            allowed_conflicts: INITIALLY_ALLOWED_CONFLICTS.get(),
            increase_ratio_for_allowed_conflicts: INCREASE_RATIO_FOR_ALLOWED_CONFLICTS.get(),
            var_inc: 1_f32,
            var_decay: 0.95_f32,
        }
    }
}

/// Heap removals are trailed so that backtracking restores the queue.
#[derive(Copy, Clone)]
enum HeapEvent {
    Removal(VarRef),
}

#[derive(Clone, Default)]
struct DefaultValues {
    /// Objective value of the assignment these defaults come from.
    objective_found: Option<IntCst>,
    /// Preferred value of each variable, if any.
    values: RefMap<VarRef, IntCst>,
}

/// Activity-based branching: variables recently involved in conflicts are
/// selected first; values come from the best known assignment when
/// available (LNS style), else from the preferred bound.
#[derive(Clone)]
pub struct ActivityBrancher {
    pub params: BranchingParams,
    heap: IdxHeap<VarRef, f32>,
    default_assignment: DefaultValues,
    conflicts_at_last_restart: u64,
    num_processed_vars: usize,
    trail: Trail<HeapEvent>,
}

impl ActivityBrancher {
    pub fn new() -> Self {
        Self::with_params(Default::default())
    }

    pub fn with_params(params: BranchingParams) -> Self {
        ActivityBrancher {
            params,
            heap: IdxHeap::new(),
            default_assignment: DefaultValues::default(),
            conflicts_at_last_restart: 0,
            num_processed_vars: 0,
            trail: Trail::default(),
        }
    }

    pub fn import_vars(&mut self, domains: &Domains) {
        let mut count = 0;
        for var in domains.variables().skip(self.num_processed_vars) {
            debug_assert!(!self.heap.is_declared(var));
            self.heap.declare_element(var, self.params.var_inc);
            self.heap.enqueue(var);
            count += 1;
        }
        self.num_processed_vars += count;
    }

    /// Selects the next decision, keeping the invariant that any unbound
    /// variable remains in the queue: only bound variables are popped, so
    /// backtracking past the binding re-enqueues exactly what is needed.
    pub fn next_decision(&mut self, stats: &Stats, domains: &Domains) -> Option<Decision> {
        self.import_vars(domains);

        // drop bound variables from the queue until an unbound one surfaces
        let next_unset = loop {
            match self.heap.peek() {
                Some(&v) => {
                    if domains.is_bound(v) {
                        let _ = self.heap.pop().unwrap();
                        self.trail.push(HeapEvent::Removal(v));
                    } else {
                        break Some(v);
                    }
                }
                None => break None,
            }
        };
        let v = next_unset?;

        if stats.num_conflicts - self.conflicts_at_last_restart >= self.params.allowed_conflicts {
            // too many conflicts in this tree: restart with a larger allowance
            self.conflicts_at_last_restart = stats.num_conflicts;
            self.params.allowed_conflicts =
                (self.params.allowed_conflicts as f32 * self.params.increase_ratio_for_allowed_conflicts) as u64;
            return Some(Decision::Restart);
        }

        let (lb, ub) = domains.bounds(v);
        debug_assert!(lb < ub);
        let value = self
            .default_assignment
            .values
            .get(v)
            .copied()
            .unwrap_or(if self.params.prefer_min_value { lb } else { ub });

        let literal = if value < lb || value > ub {
            if self.params.prefer_min_value {
                Lit::leq(v, lb)
            } else {
                Lit::geq(v, ub)
            }
        } else if ub > value && self.params.prefer_min_value {
            Lit::leq(v, value)
        } else if lb < value {
            Lit::geq(v, value)
        } else {
            Lit::leq(v, value)
        };
        Some(Decision::SetLiteral(literal))
    }

    pub fn set_default_value(&mut self, var: VarRef, val: IntCst) {
        self.default_assignment.values.insert(var, val);
    }

    pub fn bump_activity(&mut self, var: VarRef) {
        let var_inc = self.params.var_inc;
        if self.heap.is_declared(var) {
            self.heap.change_priority(var, |p| *p += var_inc);
            if self.heap.priority(var) > 1e30_f32 {
                self.rescale_activities();
            }
        }
    }

    pub fn decay_activities(&mut self) {
        self.params.var_inc /= self.params.var_decay;
    }

    fn rescale_activities(&mut self) {
        // uniform scaling preserves the heap order
        self.heap.change_all_priorities_in_place(|p| *p *= 1e-30_f32);
        self.params.var_inc *= 1e-30_f32;
    }
}

impl Default for ActivityBrancher {
    fn default() -> Self {
        Self::new()
    }
}

impl Backtrack for ActivityBrancher {
    fn save_state(&mut self) -> DecLvl {
        self.trail.save_state()
    }

    fn num_saved(&self) -> u32 {
        self.trail.num_saved()
    }

    fn restore_last(&mut self) {
        let heap = &mut self.heap;
        self.trail.restore_last_with(|HeapEvent::Removal(var)| {
            heap.enqueue(var);
        });
    }
}

impl SearchControl for ActivityBrancher {
    fn next_decision(&mut self, stats: &Stats, domains: &Domains) -> Option<Decision> {
        self.next_decision(stats, domains)
    }

    fn import_vars(&mut self, domains: &Domains) {
        self.import_vars(domains)
    }

    fn conflict(&mut self, conflict: &Conflict, _domains: &Domains, _backtrack_to: DecLvl) {
        // the variables of the clause and of the resolved intermediates
        // drove the conflict: raise their priority
        for &l in conflict.literals() {
            self.bump_activity(l.variable());
        }
        for l in conflict.resolved.literals() {
            self.bump_activity(l.variable());
        }
        self.decay_activities();
    }

    fn new_assignment_found(&mut self, objective: IntCst, assignment: Arc<SavedAssignment>) {
        // keep the values of the best assignment as preferred values
        let is_improvement = self
            .default_assignment
            .objective_found
            .map(|prev| objective < prev)
            .unwrap_or(true);
        if USE_LNS.get() && is_improvement {
            self.default_assignment.objective_found = Some(objective);
            for (var, val) in assignment.bound_variables() {
                self.set_default_value(var, val);
            }
        }
    }

    fn clone_to_box(&self) -> Box<dyn SearchControl + Send> {
        Box::new(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::state::Cause;

    #[test]
    fn bound_variables_are_skipped() {
        let mut domains = Domains::new();
        let a = domains.new_var(0, 3);
        let b = domains.new_var(0, 3);
        let mut brancher = ActivityBrancher::new();
        let stats = Stats::new();

        let _ = domains.save_state();
        let _ = brancher.save_state();
        domains.set_lb(a, 3, Cause::Decision).unwrap();

        // `a` is bound: the proposed decision is on `b`
        match brancher.next_decision(&stats, &domains) {
            Some(Decision::SetLiteral(l)) => assert_eq!(l.variable(), b),
            other => panic!("unexpected decision {other:?}"),
        }

        // after backtracking, `a` becomes available again
        domains.restore_last();
        brancher.restore_last();
        brancher.bump_activity(a);
        match brancher.next_decision(&stats, &domains) {
            Some(Decision::SetLiteral(l)) => assert_eq!(l.variable(), a),
            other => panic!("unexpected decision {other:?}"),
        }
    }
}
