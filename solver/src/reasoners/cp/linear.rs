//! Bound propagation of linear inequalities `sum a_i * x_i <= ub`.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::fmt::{Debug, Formatter};

use num_integer::div_floor;

use crate::backtrack::EventIndex;
use crate::core::state::{Cause, Domains, DomainsSnapshot, Event, Explanation};
use crate::core::*;
use crate::reasoners::cp::{PriorityLevel, Propagator, PropagatorId, Watches};
use crate::reasoners::Contradiction;

/// One element `factor * var` of a linear sum. The factor is kept positive
/// by switching to the negated view of the variable when needed.
#[derive(Clone, Copy, Eq, PartialEq)]
pub struct SumElem {
    factor: IntCst,
    var: SignedVar,
}

impl std::fmt::Display for SumElem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        debug_assert!(self.factor >= 0);
        write!(f, "{:?}", self.var)?;
        if self.factor != 1 {
            write!(f, " * {}", self.factor)?;
        }
        Ok(())
    }
}

impl Debug for SumElem {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self}")
    }
}

impl SumElem {
    pub fn new(factor: IntCst, var: VarRef) -> Self {
        debug_assert_ne!(factor, 0);
        if factor > 0 {
            Self {
                factor,
                var: SignedVar::plus(var),
            }
        } else {
            Self {
                factor: -factor,
                var: SignedVar::minus(var),
            }
        }
    }

    fn get_lower_bound(&self, domains: &Domains) -> LongCst {
        debug_assert!(self.factor > 0);
        cst_int_to_long(domains.lb(self.var)).saturating_mul(cst_int_to_long(self.factor))
    }

    fn get_upper_bound(&self, domains: &Domains) -> LongCst {
        debug_assert!(self.factor > 0);
        cst_int_to_long(domains.ub(self.var)).saturating_mul(cst_int_to_long(self.factor))
    }

    fn set_ub(&self, ub: LongCst, domains: &mut Domains, cause: Cause) -> Result<bool, crate::core::state::InvalidUpdate> {
        debug_assert!(self.factor > 0);
        // enforce `var * factor <= ub` i.e. `var <= floor(ub / factor)`
        let ub = div_floor(ub, cst_int_to_long(self.factor));
        let ub = cst_long_to_int(ub.clamp(cst_int_to_long(INT_CST_MIN), cst_int_to_long(INT_CST_MAX)));
        domains.set_ub(self.var, ub, cause)
    }
}

/// A lower bound event on a sum element, ordered by trail index. Walking
/// the per-variable event chain backwards yields the successively weaker
/// bounds that the explanation relaxation explores.
struct LbBoundEvent<'a> {
    elem: &'a SumElem,
    event: EventIndex,
    domains: &'a DomainsSnapshot<'a>,
}

impl<'a> LbBoundEvent<'a> {
    fn new(elem: &'a SumElem, domains: &'a DomainsSnapshot) -> Option<Self> {
        let var_lb = domains.lb(elem.var);
        let lit = elem.var.geq(var_lb);
        let event = domains.implying_event(lit)?;
        Some(Self { elem, event, domains })
    }

    fn event(&self) -> &Event {
        self.domains.get_event(self.event)
    }

    fn literal(&self) -> Lit {
        self.event().new_literal()
    }

    /// Contribution of the element to the sum's lower bound, as entailed by
    /// this event.
    fn lb(&self) -> LongCst {
        // a lower bound event lives on the negated view
        debug_assert_eq!(self.elem.var, -self.event().affected_bound);
        let var_lb = -cst_int_to_long(self.event().new_upper_bound);
        var_lb.saturating_mul(cst_int_to_long(self.elem.factor))
    }

    /// Contribution of the element before this event.
    fn previous_lb(&self) -> LongCst {
        let previous_var_lb = -cst_int_to_long(self.event().previous.upper_bound.as_int());
        previous_var_lb.saturating_mul(cst_int_to_long(self.elem.factor))
    }

    /// The event that set the previous bound, `None` if it held at the root.
    fn into_previous(self) -> Option<Self> {
        let index = self.event().previous.cause?;
        Some(Self {
            elem: self.elem,
            event: index,
            domains: self.domains,
        })
    }
}

impl<'a> PartialEq for LbBoundEvent<'a> {
    fn eq(&self, other: &Self) -> bool {
        self.elem == other.elem && self.event == other.event
    }
}
impl<'a> Eq for LbBoundEvent<'a> {}
impl<'a> PartialOrd for LbBoundEvent<'a> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl<'a> Ord for LbBoundEvent<'a> {
    fn cmp(&self, other: &Self) -> Ordering {
        // later events first
        self.event.cmp(&other.event)
    }
}

/// Propagator of `sum elements <= ub`, optionally conditioned on an `active`
/// literal: the constraint only propagates when `active` holds and is
/// deactivated when its left-hand side cannot fit.
#[derive(Clone, Debug)]
pub struct LinearSumLeq {
    elements: Vec<SumElem>,
    ub: IntCst,
    active: Lit,
}

impl LinearSumLeq {
    pub fn new(elements: Vec<SumElem>, ub: IntCst) -> Self {
        LinearSumLeq {
            elements,
            ub,
            active: Lit::TRUE,
        }
    }

    pub fn new_half_reified(elements: Vec<SumElem>, ub: IntCst, active: Lit) -> Self {
        LinearSumLeq { elements, ub, active }
    }

    /// Recommended scheduling priority for this propagator.
    pub fn priority() -> PriorityLevel {
        PriorityLevel::Fast
    }
}

impl std::fmt::Display for LinearSumLeq {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.active != Lit::TRUE {
            write!(f, "[{:?}] ", self.active)?;
        }
        for (i, e) in self.elements.iter().enumerate() {
            if i != 0 {
                write!(f, " + ")?;
            }
            write!(f, "{e}")?;
        }
        write!(f, " <= {}", self.ub)
    }
}

impl Propagator for LinearSumLeq {
    fn setup(&mut self, id: PropagatorId, context: &mut Watches) {
        if self.active != Lit::TRUE {
            context.add_lit_watch(self.active, id);
        }
        for e in &self.elements {
            context.add_lb_watch(e.var, id);
        }
    }

    fn propagate(&mut self, domains: &mut Domains, cause: Cause) -> Result<(), Contradiction> {
        if domains.entails(!self.active) {
            return Ok(()); // constraint is inactive
        }
        let sum_lb: LongCst = self.elements.iter().map(|e| e.get_lower_bound(domains)).sum();
        let f = cst_int_to_long(self.ub) - sum_lb;

        if f < 0 {
            // the sum cannot fit: the constraint must be inactive.
            // when `active` is TRUE this surfaces the conflict
            let changed = domains.set(!self.active, cause)?;
            debug_assert!(changed, "inconsistent constraint neither conflicted nor deactivated");
            return Ok(());
        }

        if domains.entails(self.active) {
            for e in &self.elements {
                let lb = e.get_lower_bound(domains);
                let ub = e.get_upper_bound(domains);
                debug_assert!(lb <= ub);
                if ub - lb > f {
                    let _ = e.set_ub(f + lb, domains, cause)?;
                }
            }
        }
        Ok(())
    }

    /// Explains either the deactivation of the constraint or an upper bound
    /// pushed on one of the elements.
    ///
    /// The explanation does not simply take the current lower bound of every
    /// other element: each bound is relaxed to the weakest earlier bound of
    /// the same variable that still supports the inference, by walking the
    /// per-variable event chains from the most recent event down. Weaker
    /// premises yield shorter, more reusable clauses.
    fn explain(&self, literal: Lit, domains: &DomainsSnapshot, out_explanation: &mut Explanation) {
        // total slack available for relaxing the premises:
        //   inference:    sum_{e != target} lb(e) > ub - ub(target)
        //   deactivation: sum_e lb(e) > ub
        let mut ub = cst_int_to_long(self.ub);

        if literal == !self.active {
            // explaining the deactivation: lower bounds must exceed ub by 1
            ub += 1;
        } else {
            debug_assert!(self.elements.iter().any(|e| e.var == literal.svar()));
            if self.active != Lit::TRUE {
                out_explanation.push(self.active);
            }
        }

        let mut culprits = BinaryHeap::new();
        for e in &self.elements {
            if e.var == literal.svar() {
                let factor = cst_int_to_long(e.factor);
                // this is the inferred element: move its bound to the right-hand side.
                // integrality allows rounding its contribution up to just below
                // the next multiple of the factor
                let target_ub = cst_int_to_long(literal.ub_value()).saturating_mul(factor);
                let target_ub = div_floor(target_ub, factor) * factor + factor - 1;
                ub -= target_ub;
            } else if let Some(event) = LbBoundEvent::new(e, domains) {
                culprits.push(event);
            } else {
                // bound entailed at the root: no literal needed, but its
                // contribution stays on the left-hand side
                let elem_lb = cst_int_to_long(domains.lb(e.var)).saturating_mul(cst_int_to_long(e.factor));
                ub -= elem_lb;
            }
        }

        // The premises must guarantee `sum of culprit lbs >= ub` (after the
        // rewriting above, using > as >= through integrality). Pop culprits
        // from the most recent event: as long as relaxing one to its previous
        // bound keeps the sum large enough, use the weaker literal instead.
        let mut required: LongCst = ub;
        let mut total: LongCst = culprits.iter().map(|c| c.lb()).sum();
        while let Some(culprit) = culprits.pop() {
            let slack = total - required;
            let relaxation = culprit.lb() - culprit.previous_lb();
            debug_assert!(relaxation >= 0);
            if relaxation <= slack {
                // the previous, weaker bound of this variable still supports
                // the inference: walk one event back
                total -= relaxation;
                if let Some(previous) = culprit.into_previous() {
                    culprits.push(previous);
                }
                // if there is no previous event the bound holds at the root
                // and needs no literal at all
            } else {
                // this event is load-bearing: its literal is a premise
                out_explanation.push(culprit.literal());
                total -= culprit.lb();
                required -= culprit.lb();
            }
        }
        // what was not pinned by a premise is carried by root-level bounds
        debug_assert!(total >= required);
    }

    fn clone_box(&self) -> Box<dyn Propagator> {
        Box::new(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backtrack::Backtrack;
    use crate::core::state::{Cause, InvalidUpdate};
    use crate::reasoners::cp::{Cp, PriorityLevel};
    use crate::reasoners::{ReasonerId, Theory};

    fn sum(elems: Vec<(IntCst, VarRef)>, ub: IntCst) -> LinearSumLeq {
        LinearSumLeq::new(elems.into_iter().map(|(f, v)| SumElem::new(f, v)).collect(), ub)
    }

    #[test]
    fn bounds_are_filtered() {
        let mut domains = Domains::new();
        let x = domains.new_var(0, 10);
        let y = domains.new_var(0, 10);
        let mut cp = Cp::new(ReasonerId::Cp);
        // x + 2y <= 10
        let _ = cp.add_propagator(sum(vec![(1, x), (2, y)], 10), PriorityLevel::Fast);
        cp.propagate(&mut domains).unwrap();
        assert_eq!(domains.bounds(x), (0, 10));
        assert_eq!(domains.bounds(y), (0, 5));

        let _ = domains.save_state();
        let _ = cp.save_state();
        domains.set_lb(y, 4, Cause::Decision).unwrap();
        cp.propagate(&mut domains).unwrap();
        assert_eq!(domains.ub(x), 2);
    }

    #[test]
    fn negative_factors_propagate_through_negated_view() {
        let mut domains = Domains::new();
        let x = domains.new_var(0, 10);
        let s = domains.new_var(0, 30);
        let mut cp = Cp::new(ReasonerId::Cp);
        // x - s <= 0, i.e. x <= s
        let _ = cp.add_propagator(sum(vec![(1, x), (-1, s)], 0), PriorityLevel::Fast);
        cp.propagate(&mut domains).unwrap();

        let _ = domains.save_state();
        let _ = cp.save_state();
        domains.set_ub(s, 4, Cause::Decision).unwrap();
        cp.propagate(&mut domains).unwrap();
        assert_eq!(domains.ub(x), 4);

        domains.set_lb(x, 2, Cause::Decision).unwrap();
        cp.propagate(&mut domains).unwrap();
        assert_eq!(domains.lb(s), 2);
    }

    #[test]
    fn conflicting_sum_is_reported() {
        let mut domains = Domains::new();
        let x = domains.new_var(5, 10);
        let y = domains.new_var(5, 10);
        let mut cp = Cp::new(ReasonerId::Cp);
        // x + y <= 8 is violated by the lower bounds
        let _ = cp.add_propagator(sum(vec![(1, x), (1, y)], 8), PriorityLevel::Fast);
        assert!(cp.propagate(&mut domains).is_err());
    }

    #[test]
    fn explanation_uses_weakest_supporting_bounds() {
        let mut domains = Domains::new();
        let x = domains.new_var(0, 10);
        let y = domains.new_var(0, 10);
        let mut prop = sum(vec![(1, x), (1, y)], 10);
        let mut cp_watches = Watches::default();
        prop.setup(PropagatorId::from(0u32), &mut cp_watches);

        let _ = domains.save_state();
        // push the lower bound of y in several steps
        domains.set_lb(y, 2, Cause::Decision).unwrap();
        domains.set_lb(y, 7, Cause::Decision).unwrap();
        domains.set_lb(y, 8, Cause::Decision).unwrap();
        prop.propagate(&mut domains, Cause::inference(ReasonerId::Cp, 0u32)).unwrap();
        assert_eq!(domains.ub(x), 2);

        // explaining the weaker literal (x <= 3) only requires (y >= 7)
        let snapshot = DomainsSnapshot::current(&domains);
        let mut expl = Explanation::new();
        prop.explain(x.leq(3), &snapshot, &mut expl);
        assert_eq!(expl.lits, vec![y.geq(7)]);

        // the exact literal (x <= 2) requires the full strength (y >= 8)
        let mut expl = Explanation::new();
        prop.explain(x.leq(2), &snapshot, &mut expl);
        assert_eq!(expl.lits, vec![y.geq(8)]);
    }

    #[test]
    fn half_reified_deactivation() {
        let mut domains = Domains::new();
        let x = domains.new_var(5, 10);
        let y = domains.new_var(5, 10);
        let active = domains.new_var(0, 1).geq(1);
        let mut cp = Cp::new(ReasonerId::Cp);
        let _ = cp.add_propagator(
            LinearSumLeq::new_half_reified(vec![SumElem::new(1, x), SumElem::new(1, y)], 8, active),
            PriorityLevel::Fast,
        );
        // infeasible left-hand side: the activity literal is forced false
        cp.propagate(&mut domains).unwrap();
        assert_eq!(domains.value(active), Some(false));
    }

    #[test]
    fn invalid_update_is_converted() {
        let mut domains = Domains::new();
        let x = domains.new_var(3, 10);
        let y = domains.new_var(0, 10);
        let mut prop = sum(vec![(1, x), (1, y)], 5);
        let _ = domains.save_state();
        domains.set_lb(y, 4, Cause::Decision).unwrap();
        // x would need ub 1 < lb 3
        let result = prop.propagate(&mut domains, Cause::inference(ReasonerId::Cp, 0u32));
        assert!(matches!(result, Err(Contradiction::InvalidUpdate(InvalidUpdate(_, _)))));
    }
}
