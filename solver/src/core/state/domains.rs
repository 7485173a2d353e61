use std::fmt::{Debug, Formatter};

use env_param::EnvParam;

use crate::backtrack::{Backtrack, DecLvl, DecisionLevelClass, EventIndex, ObsTrail};
use crate::core::literals::{Disjunction, DisjunctionBuilder, ImplicationGraph, LitSet};
use crate::core::state::int_domains::IntDomains;
use crate::core::state::{
    Cause, DomainsSnapshot, Event, Explainer, Explanation, ExplanationQueue, Origin,
};
use crate::core::*;

/// Minimum number of updates on a single decision level before the
/// anti-cycling guard may defer further small pushes.
static MIN_PUSHES_BEFORE_DEFER: EnvParam<u32> = EnvParam::new("VELA_MIN_PUSHES_BEFORE_DEFER", "10000");

/// Domains of all variables with backtracking, implication propagation and
/// explanation support.
///
/// This is the central structure that propagators read bounds from and push
/// tightenings into. Each update is tagged with its [`Cause`], from which
/// conflict analysis can reconstruct a minimal set of implying literals.
#[derive(Clone, Debug)]
pub struct Domains {
    /// Bounds, initial domains and the event trail.
    pub(super) doms: IntDomains,
    /// Binary implications between literals, propagated eagerly on updates.
    implications: ImplicationGraph,
    /// Work queue for explanation construction, kept to avoid reallocations.
    queue: ExplanationQueue,
    /// Number of successful updates on the current decision level,
    /// reset on save/restore. Feeds the anti-cycling guard.
    pushes_at_current_level: u32,
    /// Set when an inference was deferred by the anti-cycling guard: the
    /// current level must not be considered fully propagated.
    incomplete_propagation: bool,
}

impl Domains {
    pub fn new() -> Self {
        let domains = Domains {
            doms: IntDomains::new(),
            implications: Default::default(),
            queue: Default::default(),
            pushes_at_current_level: 0,
            incomplete_propagation: false,
        };
        debug_assert!(domains.entails(Lit::TRUE));
        debug_assert!(!domains.entails(Lit::FALSE));
        domains
    }

    pub fn new_var(&mut self, lb: IntCst, ub: IntCst) -> VarRef {
        self.doms.new_var(lb, ub)
    }

    pub fn new_var_with_domain(&mut self, domain: Domain) -> Result<VarRef, super::EmptyDomain> {
        self.doms.new_var_with_domain(domain)
    }

    /// Intersects the initial domain of `var` with `dom` (root level only).
    pub fn update_initial_domain(&mut self, var: VarRef, dom: &Domain) -> Result<bool, InvalidUpdate> {
        self.doms.update_initial_domain(var, dom)
    }

    pub fn initial_domain(&self, var: VarRef) -> &Domain {
        self.doms.initial_domain(var)
    }

    /// Canonical form of an upper bound request against the initial domain.
    /// See [`IntDomains::canonical_upper_bound`].
    pub fn canonical_upper_bound(&self, affected: SignedVar, ub: IntCst) -> Option<IntCst> {
        self.doms.canonical_upper_bound(affected, ub)
    }

    /// Records the implication `from => to` and immediately propagates it
    /// against the current state.
    ///
    /// # Panics
    ///
    /// Panics if the propagation of the new implication produces an
    /// inconsistency (callers are expected to post implications at the root,
    /// before any contradicting state exists).
    pub fn add_implication(&mut self, from: Lit, to: Lit) {
        self.implications.add_implication(from, to);
        if self.entails(from) {
            let prop = self.set_impl(to, Origin::ImplicationPropagation(from));
            assert!(prop.is_ok(), "inconsistency on the addition of implies({from:?}, {to:?})");
        }
        if self.entails(!to) {
            let prop = self.set_impl(!from, Origin::ImplicationPropagation(!to));
            assert!(prop.is_ok(), "inconsistency on the addition of implies({from:?}, {to:?})");
        }
    }

    /// True if `a` is known to imply `b`, either trivially or through the
    /// implication graph.
    pub fn implies(&self, a: Lit, b: Lit) -> bool {
        if self.entails(b) || self.entails(!a) {
            return true;
        }
        self.implications.implies(a, b)
    }

    /// True if `a` and `b` are known to be mutually exclusive.
    pub fn exclusive(&self, a: Lit, b: Lit) -> bool {
        self.implies(a, !b)
    }

    pub fn implications(&self) -> &ImplicationGraph {
        &self.implications
    }

    // ============== Accessors =====================

    pub fn bounds(&self, v: VarRef) -> (IntCst, IntCst) {
        (self.lb(v), self.ub(v))
    }

    pub fn ub(&self, var: impl Into<SignedVar>) -> IntCst {
        self.doms.ub(var)
    }

    pub fn lb(&self, var: impl Into<SignedVar>) -> IntCst {
        self.doms.lb(var)
    }

    /// Lower bound of the variable at the root level.
    pub fn initial_lb(&self, var: VarRef) -> IntCst {
        self.doms.initial_domain(var).min().expect("non-empty invariant")
    }

    /// Upper bound of the variable at the root level.
    pub fn initial_ub(&self, var: VarRef) -> IntCst {
        self.doms.initial_domain(var).max().expect("non-empty invariant")
    }

    /// True if the current domain of the variable is a singleton.
    pub fn is_bound(&self, var: VarRef) -> bool {
        self.lb(var) == self.ub(var)
    }

    pub fn entails(&self, lit: Lit) -> bool {
        self.doms.entails(lit)
    }

    pub fn value(&self, lit: Lit) -> Option<bool> {
        if self.entails(lit) {
            Some(true)
        } else if self.entails(!lit) {
            Some(false)
        } else {
            None
        }
    }

    /// Evaluates a clause: `Some(true)` if some literal is entailed,
    /// `Some(false)` if all are violated, `None` otherwise.
    pub fn value_of_clause<'a>(&self, clause: impl IntoIterator<Item = &'a Lit>) -> Option<bool> {
        let mut all_false = true;
        for &l in clause {
            match self.value(l) {
                Some(true) => return Some(true),
                Some(false) => {}
                None => all_false = false,
            }
        }
        if all_false {
            Some(false)
        } else {
            None
        }
    }

    pub fn variables(&self) -> impl Iterator<Item = VarRef> {
        self.doms.variables()
    }

    pub fn num_variables(&self) -> usize {
        self.doms.num_variables()
    }

    pub fn bound_variables(&self) -> impl Iterator<Item = (VarRef, IntCst)> + '_ {
        self.doms.bound_variables()
    }

    // ============== Updates ==============

    #[inline]
    pub fn decide(&mut self, lit: Lit) -> Result<bool, InvalidUpdate> {
        self.set(lit, Cause::Decision)
    }

    #[inline]
    pub fn assume(&mut self, lit: Lit) -> Result<bool, InvalidUpdate> {
        self.set(lit, Cause::Assumption)
    }

    /// Raises the lower bound of `var` to `new_lb`, through the negated view.
    #[inline]
    pub fn set_lb(&mut self, var: impl Into<SignedVar>, new_lb: IntCst, cause: Cause) -> Result<bool, InvalidUpdate> {
        self.set_upper_bound(var.into().neg(), -new_lb, cause)
    }

    #[inline]
    pub fn set_ub(&mut self, var: impl Into<SignedVar>, new_ub: IntCst, cause: Cause) -> Result<bool, InvalidUpdate> {
        self.set_upper_bound(var.into(), new_ub, cause)
    }

    /// The fundamental push: makes `literal` true.
    ///
    /// - `Ok(true)`: the domain was tightened and remains consistent;
    /// - `Ok(false)`: no-op, the literal was already entailed (or the push
    ///   was deferred by the anti-cycling guard);
    /// - `Err(InvalidUpdate)`: making the literal true would empty a domain.
    #[inline]
    pub fn set(&mut self, literal: Lit, cause: Cause) -> Result<bool, InvalidUpdate> {
        self.set_upper_bound(literal.svar(), literal.ub_value(), cause)
    }

    /// Sets a literal whose success is known in advance (e.g. unit
    /// propagation of a clause that was checked to be unit).
    #[inline]
    pub fn set_unchecked(&mut self, literal: Lit, cause: Cause) {
        let res = self.set(literal, cause);
        debug_assert!(res.is_ok());
    }

    pub fn set_upper_bound(&mut self, affected: SignedVar, ub: IntCst, cause: Cause) -> Result<bool, InvalidUpdate> {
        self.set_upper_bound_impl(affected, ub, cause.into())
    }

    #[inline]
    fn set_impl(&mut self, literal: Lit, origin: Origin) -> Result<bool, InvalidUpdate> {
        self.set_upper_bound_impl(literal.svar(), literal.ub_value(), origin)
    }

    fn set_upper_bound_impl(&mut self, affected: SignedVar, ub: IntCst, origin: Origin) -> Result<bool, InvalidUpdate> {
        if let Origin::Inference(_) = origin {
            if self.should_defer(affected, ub) {
                self.incomplete_propagation = true;
                return Ok(false);
            }
        }
        // remember the top of the event stack to propagate implications of
        // everything pushed from here on
        let mut cursor = self.trail().reader();
        cursor.move_to_end(self.trail());

        let res = self.doms.set_bound(affected, UpperBound::ub(ub), origin);
        match res {
            Ok(true) => {
                self.pushes_at_current_level = self.pushes_at_current_level.saturating_add(1);
                // transitively propagate the implication graph; the cursor picks
                // up both the initial event and everything implied afterwards
                while let Some(ev) = cursor.pop(self.trail()).copied() {
                    let lit = ev.new_literal();
                    for implied in self.implications.direct_implications_of(lit) {
                        let _ = self
                            .doms
                            .set_bound(implied.svar(), implied.bound_value(), Origin::ImplicationPropagation(lit))?;
                    }
                }
                Ok(true)
            }
            other => other,
        }
    }

    /// Anti-cycling guard: true if propagation at this level has already
    /// performed an unusual number of pushes and the new push would only
    /// close a small part of the remaining gap. The caller defers such a
    /// push and flags the level as not fully propagated, leaving it to the
    /// search to branch on the stuck variable.
    fn should_defer(&self, affected: SignedVar, ub: IntCst) -> bool {
        let threshold = MIN_PUSHES_BEFORE_DEFER
            .get()
            .max(10 * self.doms.num_variables() as u32);
        if self.pushes_at_current_level <= threshold {
            return false;
        }
        if self.current_decision_level() == DecLvl::ROOT {
            return false;
        }
        let current_ub = self.doms.get_bound_value(affected).as_int();
        let view_lb = -self.doms.get_bound_value(affected.neg()).as_int();
        if ub >= current_ub || ub < view_lb {
            // no-ops and conflicts are never deferred
            return false;
        }
        // defer if the new bound remains in the upper half of [view_lb, current_ub]
        let mid = view_lb + (current_ub - view_lb) / 2;
        ub > mid
    }

    /// True if some inference was deferred since the last call to
    /// [`Self::reset_incomplete_propagation`]: the current level must not be
    /// treated as fully propagated.
    pub fn propagation_is_incomplete(&self) -> bool {
        self.incomplete_propagation
    }

    /// Flags the current level as partially propagated (e.g. after an
    /// interrupted propagation pass).
    pub fn mark_incomplete_propagation(&mut self) {
        self.incomplete_propagation = true;
    }

    pub fn reset_incomplete_propagation(&mut self) {
        self.incomplete_propagation = false;
    }

    // ================ History ===================

    /// Index of the first event that made `lit` true, or `None` if it holds
    /// at the root level.
    pub fn implying_event(&self, lit: Lit) -> Option<EventIndex> {
        self.doms.implying_event(lit)
    }

    pub fn num_events(&self) -> u32 {
        self.doms.num_events()
    }

    pub fn last_event(&self) -> Option<&Event> {
        self.doms.last_event()
    }

    pub fn trail(&self) -> &ObsTrail<Event> {
        self.doms.trail()
    }

    /// Decision level at which `lit` became true.
    pub fn entailing_level(&self, lit: Lit) -> DecLvl {
        debug_assert!(self.entails(lit));
        match self.implying_event(lit) {
            Some(loc) => self.trail().decision_level(loc),
            None => DecLvl::ROOT,
        }
    }

    pub fn get_event(&self, loc: EventIndex) -> &Event {
        self.trail().get_event(loc)
    }

    /// All decisions taken since the root, in chronological order.
    pub fn decisions(&self) -> Vec<(DecLvl, Lit)> {
        let mut decs = Vec::new();
        let mut lvl = DecLvl::ROOT + 1;
        for e in self.trail().events() {
            if e.cause == Origin::Decision {
                decs.push((lvl, e.new_literal()));
                lvl += 1;
            }
        }
        decs
    }

    pub fn undo_last_event(&mut self) -> Origin {
        self.doms.undo_last_event()
    }

    // ================== Explanation ==============

    /// Given an invalid update of `literal`, derives the conflict clause
    /// `(l_1 & ... & l_n) => !l_dec` where the `l_i` hold at earlier levels
    /// and `l_dec` is the current-level decision (1UIP form).
    pub fn clause_for_invalid_update(&mut self, failed: InvalidUpdate, explainer: &mut impl Explainer) -> Conflict {
        let InvalidUpdate(literal, cause) = failed;
        debug_assert!(!self.entails(literal));
        debug_assert!(self.entails(!literal));

        // base of the explanation: `!literal & literal => false`
        let mut explanation = Explanation::with_capacity(2);
        explanation.push(!literal);

        if cause != Origin::Assumption {
            // `literal` does not hold: replace it by implying literals
            // `x_1 & ... & x_m => literal` that do hold
            self.add_implying_literals_to_explanation(literal, cause, &mut explanation, explainer);
        }
        debug_assert!(explanation.lits.iter().all(|&l| self.entails(l)));

        self.refine_explanation(explanation, explainer)
    }

    /// Refines an explanation (a conjunction of currently-entailed literals
    /// that implies a contradiction) into an asserting 1UIP clause.
    ///
    /// A partial backtrack *within* the current decision level happens in the
    /// process, so that explainers are invoked in the state where their
    /// inferences were made.
    pub fn refine_explanation(&mut self, explanation: Explanation, explainer: &mut impl Explainer) -> Conflict {
        debug_assert!(explanation.literals().iter().all(|&l| self.entails(l)));
        let mut explanation = explanation;

        // literals of the final clause, entailed strictly before the current level
        let mut result = DisjunctionBuilder::with_capacity(32);
        let decision_level = self.current_decision_level();
        let mut resolved = LitSet::new();
        self.queue.clear();

        let clause: Disjunction = loop {
            for l in explanation.lits.drain(..) {
                debug_assert!(self.entails(l));
                // if no event made the literal true, it is implied by the
                // initial state and can be discarded
                if let Some(loc) = self.implying_event(l) {
                    match self.trail().decision_level_class(loc) {
                        DecisionLevelClass::Root => {
                            // always true, discard
                        }
                        DecisionLevelClass::Current => {
                            // at the current level: to be resolved
                            self.queue.push(loc, l);
                        }
                        DecisionLevelClass::Intermediate => {
                            // entailed before the current level: appears negated in the clause
                            result.push(!l);
                        }
                    }
                }
            }
            debug_assert!(explanation.lits.is_empty());
            if self.queue.is_empty() {
                // all clause literals are below the current level; may happen
                // if a lazy propagator was late in detecting the inconsistency
                // or if we are at the root (empty clause = contradiction)
                debug_assert!(decision_level != DecLvl::ROOT || result.is_empty());
                break result.into();
            }

            // take the latest-entailed literal of the queue
            let (l, l_cause) = self.queue.pop().unwrap();

            if self.queue.is_empty() {
                // `l` is the first unique implication point
                result.push(!l);
                break result.into();
            }

            debug_assert!(l_cause < self.trail().next_slot());
            debug_assert!(self.entails(l));

            // undo events down to (and including) the implying event of `l`,
            // staying within the current decision level, so that the explainer
            // sees the exact state in which the inference was made
            let mut cause = None;
            while l_cause < self.trail().next_slot() {
                debug_assert_ne!(self.last_event().unwrap().cause, Origin::Decision);
                cause = Some(self.undo_last_event());
            }
            let cause = cause.unwrap();

            resolved.insert(l);
            // replace `l` in the explanation by a set of literals implying it
            self.add_implying_literals_to_explanation(l, cause, &mut explanation, explainer);
        };

        Conflict { clause, resolved }
    }

    /// Computes literals `l_1 ... l_n`, entailed in the current state, such
    /// that `l_1 & ... & l_n => literal`.
    ///
    /// Assumes that `literal` is not yet entailed and that `cause` is the
    /// origin of its assertion (necessarily not a decision).
    pub(crate) fn add_implying_literals_to_explanation(
        &self,
        literal: Lit,
        cause: Origin,
        explanation: &mut Explanation,
        explainer: &mut impl Explainer,
    ) {
        debug_assert!(!self.entails(literal));
        let state = DomainsSnapshot::current(self);
        Self::add_implying_literals_impl(&state, literal, cause, explanation, explainer);
    }

    fn add_implying_literals_impl(
        state: &DomainsSnapshot,
        literal: Lit,
        cause: Origin,
        explanation: &mut Explanation,
        explainer: &mut dyn Explainer,
    ) {
        match cause {
            Origin::Decision | Origin::Assumption | Origin::Encoding => {
                panic!("can not explain the origin of a decision or assumption")
            }
            Origin::ImplicationPropagation(causing_literal) => explanation.push(causing_literal),
            Origin::Inference(cause) => {
                // ask the inferring module for a clause (l1 & ... & ln) => literal
                explainer.explain(cause, literal, state, explanation);
            }
        }
    }

    /// For a literal `l` entailed in the current state, returns literals
    /// `l_1 ... l_n` forming the implication `(l_1 & ... & l_n) => l`.
    /// Returns `None` if `l` is a decision or assumption.
    ///
    /// Unlike the explanations produced during clause refinement, the
    /// explainer is invoked on a snapshot of the exact state preceding the
    /// inference.
    pub fn implying_literals(&self, literal: Lit, explainer: &mut dyn Explainer) -> Option<Vec<Lit>> {
        debug_assert!(self.entails(literal));
        let Some(event) = self.implying_event(literal) else {
            // entailed at root: implied by the empty conjunction
            return Some(Vec::new());
        };
        let event = self.get_event(event);
        match event.cause {
            Origin::Decision | Origin::Assumption | Origin::Encoding => None,
            cause => {
                let mut explanation = Explanation::new();
                let state = DomainsSnapshot::preceding(self, literal);
                Self::add_implying_literals_impl(&state, literal, cause, &mut explanation, explainer);
                Some(explanation.lits)
            }
        }
    }

    /// Reduces an explanation to the assumptions that support it: every
    /// literal is recursively replaced by its premises until only assumption
    /// events remain.
    fn extract_assumptions_implying(
        &mut self,
        explanation: &mut Explanation,
        explainer: &mut impl Explainer,
    ) -> Explanation {
        debug_assert!(explanation.lits.iter().all(|&l| self.entails(l)));
        let mut result = Explanation::new();
        self.queue.clear();

        loop {
            for l in explanation.lits.drain(..) {
                if let Some(loc) = self.implying_event(l) {
                    let ev = self.trail().get_event(loc);
                    if ev.cause == Origin::Assumption {
                        result.lits.push(ev.new_literal());
                    } else {
                        debug_assert!(self.entails(l));
                        self.queue.push(loc, l);
                    }
                }
            }
            debug_assert!(explanation.lits.is_empty());

            if self.queue.is_empty() {
                break;
            }
            let (lit, _) = self.queue.pop().unwrap();
            if let Some(implying) = self.implying_literals(lit, explainer) {
                explanation.lits.extend(implying);
            }
        }
        result
    }

    /// Builds an unsat core (a set of incompatible assumptions) from a
    /// conflict derived under assumptions.
    pub fn extract_unsat_core_after_conflict(
        &mut self,
        conflict: Conflict,
        explainer: &mut impl Explainer,
    ) -> Explanation {
        let mut explanation: Explanation = conflict.clause.literals().iter().map(|&l| !l).collect();
        self.extract_assumptions_implying(&mut explanation, explainer)
    }

    /// Builds an unsat core after an assumption could not be posted.
    pub fn extract_unsat_core_after_invalid_assumption(
        &mut self,
        failed: InvalidUpdate,
        explainer: &mut impl Explainer,
    ) -> Explanation {
        let InvalidUpdate(literal, cause) = failed;
        debug_assert!(!self.entails(literal));
        let conflict = self.clause_for_invalid_update(failed, explainer);
        let mut explanation: Explanation = conflict.clause.literals().iter().map(|&l| !l).collect();
        let mut unsat_core = self.extract_assumptions_implying(&mut explanation, explainer);
        if cause == Origin::Assumption {
            unsat_core.lits.push(literal);
        }
        unsat_core
    }
}

impl Default for Domains {
    fn default() -> Self {
        Self::new()
    }
}

impl Backtrack for Domains {
    fn save_state(&mut self) -> DecLvl {
        self.pushes_at_current_level = 0;
        self.doms.save_state()
    }

    fn num_saved(&self) -> u32 {
        self.doms.num_saved()
    }

    fn restore_last(&mut self) {
        self.pushes_at_current_level = 0;
        self.incomplete_propagation = false;
        self.doms.restore_last()
    }
}

/// An update that would have emptied a domain: the literal that could not be
/// made true, and the origin of the attempt.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct InvalidUpdate(pub Lit, pub Origin);

/// Data resulting from a conflict, chiefly the learnt clause.
pub struct Conflict {
    /// A clause of which at least one literal must hold to avoid the conflict.
    pub clause: Disjunction,
    /// Literals that were resolved away while building the clause: they
    /// appeared in some explanation but were replaced by their own premises.
    /// Exploited by branching heuristics to track conflict participation.
    pub resolved: LitSet,
}

impl Conflict {
    pub fn len(&self) -> usize {
        self.clause.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn literals(&self) -> &[Lit] {
        self.clause.literals()
    }

    /// A conflict that can never be avoided (the empty clause).
    pub fn contradiction() -> Self {
        Conflict {
            clause: Disjunction::new(Vec::new()),
            resolved: Default::default(),
        }
    }
}

impl Debug for Conflict {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self.clause)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;
    use crate::core::state::{DomainsSnapshot, InferenceCause};
    use crate::reasoners::ReasonerId;

    #[test]
    fn domain_updates_and_backtracking() {
        let mut model = Domains::new();
        let a = model.new_var(0, 10);

        assert_eq!(model.set_lb(a, -1, Cause::Decision), Ok(false));
        assert_eq!(model.set_lb(a, 1, Cause::Decision), Ok(true));
        assert_eq!(model.set_ub(a, 11, Cause::Decision), Ok(false));
        assert_eq!(model.set_ub(a, 9, Cause::Decision), Ok(true));
        assert_eq!(model.bounds(a), (1, 9));

        let _ = model.save_state();
        assert_eq!(model.set_lb(a, 9, Cause::Decision), Ok(true));
        assert_eq!(
            model.set_lb(a, 10, Cause::Decision),
            Err(InvalidUpdate(Lit::geq(a, 10), Origin::Decision))
        );

        model.restore_last();
        assert_eq!(model.bounds(a), (1, 9));
    }

    #[test]
    fn implication_propagation_on_set() {
        let mut model = Domains::new();
        let a = Lit::geq(model.new_var(0, 1), 1);
        let b = Lit::geq(model.new_var(0, 1), 1);
        model.add_implication(a, b);

        let _ = model.save_state();
        assert_eq!(model.decide(a), Ok(true));
        assert!(model.entails(b));
        assert_eq!(model.entailing_level(b), DecLvl::ROOT + 1);
    }

    struct Expl {
        a: Lit,
        b: Lit,
        n: VarRef,
    }
    impl Explainer for Expl {
        fn explain(&mut self, cause: InferenceCause, literal: Lit, _model: &DomainsSnapshot, explanation: &mut Explanation) {
            assert_eq!(cause.writer, ReasonerId::Sat);
            match cause.payload {
                0 => {
                    assert_eq!(literal, Lit::leq(self.n, 4));
                    explanation.push(self.a);
                }
                1 => {
                    assert_eq!(literal, Lit::geq(self.n, 5));
                    explanation.push(self.b);
                }
                _ => panic!("unexpected payload"),
            }
        }
    }

    #[test]
    fn conflict_clause_from_invalid_update() {
        let mut model = Domains::new();
        let a = Lit::geq(model.new_var(0, 1), 1);
        let b = Lit::geq(model.new_var(0, 1), 1);
        let n = model.new_var(0, 10);

        // constraint 0: "a => (n <= 4)"
        // constraint 1: "b => (n >= 5)"
        let writer = ReasonerId::Sat;
        let cause_a = Cause::inference(writer, 0u32);
        let cause_b = Cause::inference(writer, 1u32);

        let propagate = |model: &mut Domains| -> Result<bool, InvalidUpdate> {
            if model.entails(a) {
                let _ = model.set_ub(n, 4, cause_a)?;
            }
            if model.entails(b) {
                let _ = model.set_lb(n, 5, cause_b)?;
            }
            Ok(true)
        };

        let mut network = Expl { a, b, n };

        propagate(&mut model).unwrap();
        let _ = model.save_state();
        model.decide(a).unwrap();
        propagate(&mut model).unwrap();
        assert_eq!(model.bounds(n), (0, 4));
        let _ = model.save_state();
        model.set_lb(n, 1, Cause::Decision).unwrap();
        let _ = model.save_state();
        model.decide(b).unwrap();
        let err = propagate(&mut model).unwrap_err();

        let clause = model.clause_for_invalid_update(err, &mut network);
        let clause: HashSet<_> = clause.literals().iter().copied().collect();

        // resolution of `!(n <= 4) | !(n >= 5)` with `!b | (n >= 5)`
        let mut expected = HashSet::new();
        let _ = expected.insert(!b);
        let _ = expected.insert(Lit::gt(n, 4));
        assert_eq!(clause, expected);
    }

    #[test]
    fn unsat_core_extraction() {
        let mut model = Domains::new();
        let x = model.new_var(0, 10);
        let y = model.new_var(0, 10);

        // assumptions: [x <= 3], [y <= 4]
        // constraint: [x <= 5] => [y >= 6]
        let cause_xleq5 = Cause::inference(ReasonerId::Sat, 0u32);

        struct XY {
            x: VarRef,
            y: VarRef,
        }
        impl Explainer for XY {
            fn explain(&mut self, _: InferenceCause, literal: Lit, _: &DomainsSnapshot, explanation: &mut Explanation) {
                assert_eq!(literal, Lit::geq(self.y, 5)); // weakened form of [y >= 6]
                explanation.push(self.x.leq(5));
            }
        }
        let mut network = XY { x, y };

        let _ = model.save_state();
        assert!(model.assume(x.leq(3)).unwrap());
        // propagation
        let _ = model.set(y.geq(6), cause_xleq5).unwrap();
        assert_eq!(model.bounds(y), (6, 10));

        let _ = model.save_state();
        let err = model.assume(y.leq(4)).unwrap_err();

        let unsat_core = model.extract_unsat_core_after_invalid_assumption(err, &mut network).lits;
        let unsat_core: HashSet<Lit> = unsat_core.iter().copied().collect();
        let mut expected = HashSet::new();
        let _ = expected.insert(x.leq(3));
        let _ = expected.insert(y.leq(4));
        assert_eq!(unsat_core, expected);
    }
}
