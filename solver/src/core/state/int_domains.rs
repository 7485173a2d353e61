use crate::backtrack::{Backtrack, DecLvl, EventIndex, ObsTrail};
use crate::collections::ref_store::RefVec;
use crate::core::state::event::{ChangeIndex, Event, ValueCause};
use crate::core::state::{InvalidUpdate, Origin};
use crate::core::*;

/// Current bounds of all integer variables, together with the history of
/// updates that produced them.
///
/// Each variable also keeps its *initial domain*, a union of intervals whose
/// holes are first class: every bound update is snapped to the nearest value
/// inside the initial domain before being recorded. The initial domain is
/// only ever mutated at the root level.
///
/// **Invariant:** every current domain is non-empty. An update that would
/// empty a domain is rejected with an [`InvalidUpdate`].
#[derive(Clone, Debug)]
pub struct IntDomains {
    /// Current value of each variable bound, paired with the index of the
    /// event that set it.
    bounds: RefVec<SignedVar, ValueCause>,
    /// Root-level domain of each variable, holes included.
    initial: RefVec<VarRef, Domain>,
    /// All bound updates, for backtracking and explanations.
    events: ObsTrail<Event>,
}

impl IntDomains {
    pub fn new() -> Self {
        let mut uninitialized = IntDomains {
            bounds: Default::default(),
            initial: Default::default(),
            events: Default::default(),
        };
        let zero = uninitialized.new_var(0, 0);
        debug_assert_eq!(zero, VarRef::ZERO);
        debug_assert!(uninitialized.entails(Lit::TRUE));
        debug_assert!(!uninitialized.entails(Lit::FALSE));
        uninitialized
    }

    pub fn new_var(&mut self, lb: IntCst, ub: IntCst) -> VarRef {
        assert!(lb <= ub, "empty initial domain [{lb}, {ub}]");
        self.new_var_with_domain(Domain::range(lb, ub)).expect("non-empty by construction")
    }

    /// Creates a variable with an arbitrary (hole-aware) initial domain.
    pub fn new_var_with_domain(&mut self, domain: Domain) -> Result<VarRef, EmptyDomain> {
        let (Some(lb), Some(ub)) = (domain.min(), domain.max()) else {
            return Err(EmptyDomain);
        };
        let var_lb = self.bounds.push(ValueCause::new(UpperBound::lb(lb), None));
        let var_ub = self.bounds.push(ValueCause::new(UpperBound::ub(ub), None));
        debug_assert_eq!(var_lb.variable(), var_ub.variable());
        debug_assert!(var_lb.is_minus());
        debug_assert!(var_ub.is_plus());
        let var = var_lb.variable();
        self.initial.set_next(var, domain);
        Ok(var)
    }

    pub fn ub(&self, var: impl Into<SignedVar>) -> IntCst {
        self.bounds[var.into()].upper_bound.as_int()
    }

    pub fn lb(&self, var: impl Into<SignedVar>) -> IntCst {
        -self.bounds[var.into().neg()].upper_bound.as_int()
    }

    pub fn entails(&self, lit: Lit) -> bool {
        self.get_bound_value(lit.svar()).stronger(lit.bound_value())
    }

    #[inline]
    pub fn get_bound_value(&self, var_bound: SignedVar) -> UpperBound {
        self.bounds[var_bound].upper_bound
    }

    /// Index of the event that set the current value of the bound.
    #[inline]
    pub(crate) fn bounds_cause(&self, var_bound: SignedVar) -> ChangeIndex {
        self.bounds[var_bound].cause
    }

    /// The initial (root-level) domain of the variable.
    pub fn initial_domain(&self, var: VarRef) -> &Domain {
        &self.initial[var]
    }

    /// Rounds the requested upper bound of `affected` to the canonical value
    /// allowed by the initial domain: down for a positive view, up (on the
    /// mirrored values) for a negative one. `None` if no such value exists.
    pub fn canonical_upper_bound(&self, affected: SignedVar, ub: IntCst) -> Option<IntCst> {
        let dom = &self.initial[affected.variable()];
        if affected.is_plus() {
            dom.value_at_or_below(ub)
        } else {
            // the upper bound of the negative view is a negated lower bound
            dom.value_at_or_above(-ub).map(|lb| -lb)
        }
    }

    /// Attempts to set the upper bound of `affected` to `new`, snapping it
    /// into the initial domain first.
    ///
    /// - `Ok(true)`: the domain was updated and remains non-empty;
    /// - `Ok(false)`: the update was already entailed, nothing changed;
    /// - `Err(InvalidUpdate)`: the update would have emptied the domain.
    pub fn set_bound(&mut self, affected: SignedVar, new: UpperBound, cause: Origin) -> Result<bool, InvalidUpdate> {
        let current = self.bounds[affected];
        if current.upper_bound.stronger(new) {
            return Ok(false);
        }
        let lit = Lit::from_parts(affected, new);
        let Some(canonical) = self.canonical_upper_bound(affected, new.as_int()) else {
            // no remaining value on this side of the domain
            return Err(InvalidUpdate(lit, cause));
        };
        let new = UpperBound::ub(canonical);
        debug_assert!(
            !current.upper_bound.stronger(new),
            "snapping can only strengthen the request"
        );
        let other = self.bounds[affected.neg()].upper_bound;
        if new.compatible_with_symmetric(other) {
            self.bounds[affected] = ValueCause::new(new, Some(self.events.next_slot()));
            let _ = self.events.push(Event {
                affected_bound: affected,
                previous: current,
                new_upper_bound: new.as_int(),
                cause,
            });
            Ok(true)
        } else {
            Err(InvalidUpdate(lit, cause))
        }
    }

    /// Intersects the initial domain of `var` with `dom`. Root level only.
    ///
    /// The current bounds are tightened to the new domain; `Err` is returned
    /// if the intersection is empty.
    pub fn update_initial_domain(&mut self, var: VarRef, dom: &Domain) -> Result<bool, InvalidUpdate> {
        debug_assert_eq!(self.events.current_decision_level(), DecLvl::ROOT);
        let restricted = self.initial[var].intersection_with(dom);
        let (Some(lb), Some(ub)) = (restricted.min(), restricted.max()) else {
            return Err(InvalidUpdate(Lit::leq(var, INT_CST_MIN), Origin::Encoding));
        };
        if restricted == self.initial[var] {
            return Ok(false);
        }
        self.initial[var] = restricted;
        let mut change = self.set_bound(SignedVar::plus(var), UpperBound::ub(ub), Origin::Encoding)?;
        change |= self.set_bound(SignedVar::minus(var), UpperBound::lb(lb), Origin::Encoding)?;
        Ok(change)
    }

    // ============= Variables =================

    pub fn num_variables(&self) -> usize {
        debug_assert!(self.bounds.len() % 2 == 0);
        self.bounds.len() / 2
    }

    pub fn variables(&self) -> impl Iterator<Item = VarRef> {
        (0..self.num_variables()).map(VarRef::from)
    }

    /// All variables whose current domain is a singleton, with their value.
    pub fn bound_variables(&self) -> impl Iterator<Item = (VarRef, IntCst)> + '_ {
        self.variables().filter_map(move |v| {
            let lb = self.lb(v);
            if lb == self.ub(v) {
                Some((v, lb))
            } else {
                None
            }
        })
    }

    // =========== History ===================

    /// Index of the first event that made `lit` true, or `None` if it holds
    /// at the root level. Walks the per-variable event chain.
    pub fn implying_event(&self, lit: Lit) -> Option<EventIndex> {
        debug_assert!(self.entails(lit));
        let mut cur = self.bounds[lit.svar()].cause;
        while let Some(loc) = cur {
            let ev = self.events.get_event(loc);
            if ev.makes_true(lit) {
                break;
            } else {
                cur = ev.previous.cause;
            }
        }
        cur
    }

    pub fn num_events(&self) -> u32 {
        self.events.num_events()
    }

    pub fn last_event(&self) -> Option<&Event> {
        self.events.peek()
    }

    pub fn trail(&self) -> &ObsTrail<Event> {
        &self.events
    }

    // =============== State management ===================

    fn undo_event(bounds: &mut RefVec<SignedVar, ValueCause>, ev: &Event) {
        bounds[ev.affected_bound] = ev.previous;
    }

    pub fn undo_last_event(&mut self) -> Origin {
        let ev = self.events.pop().unwrap();
        Self::undo_event(&mut self.bounds, &ev);
        ev.cause
    }
}

/// Error marker: a variable was created with (or restricted to) an empty domain.
#[derive(Copy, Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("empty domain")]
pub struct EmptyDomain;

impl Default for IntDomains {
    fn default() -> Self {
        Self::new()
    }
}

impl Backtrack for IntDomains {
    fn save_state(&mut self) -> DecLvl {
        self.events.save_state()
    }

    fn num_saved(&self) -> u32 {
        self.events.num_saved()
    }

    fn restore_last(&mut self) {
        let bounds = &mut self.bounds;
        self.events.restore_last_with(|ev| {
            Self::undo_event(bounds, ev);
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bounds_and_entailment() {
        let mut m = IntDomains::default();
        let a = m.new_var(0, 10);
        assert_eq!(m.lb(a), 0);
        assert_eq!(m.ub(a), 10);
        assert!(m.entails(a.geq(-1)));
        assert!(m.entails(a.geq(0)));
        assert!(!m.entails(a.geq(1)));
        assert!(m.entails(a.leq(10)));
        assert!(!m.entails(a.leq(9)));
    }

    #[test]
    fn pushes_snap_out_of_holes() {
        let mut m = IntDomains::default();
        let x = m
            .new_var_with_domain(Domain::from_intervals([(1, 4), (7, 9)]).unwrap())
            .unwrap();
        assert_eq!(m.bounds_of(x), (1, 9));
        // [x >= 5] snaps to [x >= 7]
        assert_eq!(m.set_bound(SignedVar::minus(x), UpperBound::lb(5), Origin::Decision), Ok(true));
        assert_eq!(m.lb(x), 7);
        // [x <= 6] would leave nothing above 7
        assert!(m
            .set_bound(SignedVar::plus(x), UpperBound::ub(6), Origin::Decision)
            .is_err());
    }

    impl IntDomains {
        fn bounds_of(&self, v: VarRef) -> (IntCst, IntCst) {
            (self.lb(v), self.ub(v))
        }
    }

    #[test]
    fn initial_domain_restriction() {
        let mut m = IntDomains::default();
        let x = m.new_var(0, 10);
        assert_eq!(
            m.update_initial_domain(x, &Domain::from_intervals([(2, 3), (8, 12)]).unwrap()),
            Ok(true)
        );
        assert_eq!(m.bounds_of(x), (2, 10));
        // snapping now applies against the restricted domain
        assert_eq!(m.set_bound(SignedVar::minus(x), UpperBound::lb(4), Origin::Decision), Ok(true));
        assert_eq!(m.lb(x), 8);
        // empty intersection is rejected
        assert!(m.update_initial_domain(x, &Domain::range(0, 1)).is_err());
    }
}
