//! Lazy encoding of integer predicates into literals.
//!
//! Bound predicates `[v >= k]` need no encoding: a [`Lit`] *is* such a
//! predicate. This module canonicalizes them against the variable's initial
//! domain and materializes the predicates that are not native, chiefly the
//! equality predicate `[v = k]`, as fresh boolean variables tied to the
//! bounds by clauses. Fresh literals are deduplicated through a sorted
//! per-variable table and wired into the implication graph so that unit
//! propagation alone keeps the encoding consistent.

use hashbrown::HashMap;

use crate::collections::ref_store::RefMap;
use crate::core::state::Domains;
use crate::core::*;
use crate::reasoners::sat::SatSolver;

/// The integer predicate represented by an encoded literal.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct EqMeaning {
    pub var: VarRef,
    pub value: IntCst,
}

/// Creates, deduplicates and resolves the literals associated to integer
/// predicates.
#[derive(Clone, Default)]
pub struct IntEncoder {
    /// For each variable, the equality literals created so far, sorted by value.
    eq_lits: RefMap<VarRef, Vec<(IntCst, Lit)>>,
    /// Reverse mapping from an encoding literal to the predicate it stands for.
    meanings: HashMap<Lit, EqMeaning>,
}

impl IntEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Canonical form of a bound literal: the bound is snapped into the
    /// variable's initial domain, and literals beyond the domain limits
    /// collapse to the constant true/false literals.
    pub fn bound_literal(&self, domains: &Domains, lit: Lit) -> Lit {
        let svar = lit.svar();
        let var = svar.variable();
        match domains.canonical_upper_bound(svar, lit.ub_value()) {
            None => Lit::FALSE, // no value left on this side of the domain
            Some(ub) => {
                let weakest = if svar.is_plus() {
                    domains.initial_ub(var)
                } else {
                    -domains.initial_lb(var)
                };
                if ub >= weakest {
                    Lit::TRUE
                } else {
                    Lit::from_parts(svar, UpperBound::ub(ub))
                }
            }
        }
    }

    /// Strongest canonical bound literal entailed by `lit`, i.e. the literal
    /// at or before the requested bound in the domain order. Symmetric on
    /// the negated view.
    pub fn search_bound_literal_at_or_before(&self, domains: &Domains, lit: Lit) -> Lit {
        // snapping only ever strengthens: the canonical literal entails `lit`
        self.bound_literal(domains, lit)
    }

    /// The literal standing for `[var = value]`, created on demand.
    ///
    /// Trivial cases collapse to constants or to a plain bound literal;
    /// otherwise a fresh boolean `e` is allocated and bound by the clauses
    /// `e => [var >= value]`, `e => [var <= value]` and
    /// `[var >= value] & [var <= value] => e`.
    pub fn eq_literal(&mut self, domains: &mut Domains, sat: &mut SatSolver, var: VarRef, value: IntCst) -> Lit {
        let dom = domains.initial_domain(var);
        if !dom.contains(value) {
            return Lit::FALSE;
        }
        let (lb, ub) = (dom.min().unwrap(), dom.max().unwrap());
        if lb == ub {
            return Lit::TRUE;
        }
        if value == lb {
            // [var = lb] is just [var <= lb]
            return var.leq(value);
        }
        if value == ub {
            return var.geq(value);
        }
        let table = self.eq_lits.get_or_insert(var, Vec::new);
        if let Ok(idx) = table.binary_search_by_key(&value, |&(v, _)| v) {
            return table[idx].1;
        }

        let ge = self.bound_literal(domains, var.geq(value));
        let le = self.bound_literal(domains, var.leq(value));
        debug_assert_eq!(ge, var.geq(value), "in-domain bounds are already canonical");

        let e = domains.new_var(0, 1).geq(1);
        let _ = sat.add_clause([!e, ge]);
        let _ = sat.add_clause([!e, le]);
        let _ = sat.add_clause([!ge, !le, e]);
        // mirror the two implications in the graph: this is what lets the
        // at-most-one analysis see that two value literals are exclusive
        domains.add_implication(e, ge);
        domains.add_implication(e, le);

        let table = self.eq_lits.get_mut_or_insert(var, Vec::new);
        let idx = table.binary_search_by_key(&value, |&(v, _)| v).unwrap_err();
        table.insert(idx, (value, e));
        let _ = self.meanings.insert(e, EqMeaning { var, value });
        e
    }

    /// Records an externally supplied literal as standing for `[var = value]`
    /// and posts the clauses binding it to the bounds. If the literal's
    /// polarity is already fixed, the implied bounds follow from those
    /// clauses on the next propagation.
    pub fn associate(&mut self, domains: &mut Domains, sat: &mut SatSolver, lit: Lit, var: VarRef, value: IntCst) {
        let ge = self.bound_literal(domains, var.geq(value));
        let le = self.bound_literal(domains, var.leq(value));
        let _ = sat.add_clause([!lit, ge]);
        let _ = sat.add_clause([!lit, le]);
        let _ = sat.add_clause([!ge, !le, lit]);
        domains.add_implication(lit, ge);
        domains.add_implication(lit, le);
        let table = self.eq_lits.get_mut_or_insert(var, Vec::new);
        if let Err(idx) = table.binary_search_by_key(&value, |&(v, _)| v) {
            table.insert(idx, (value, lit));
        }
        let _ = self.meanings.insert(lit, EqMeaning { var, value });
    }

    /// Eagerly creates the `[var = d]` literal of every value `d` of the
    /// initial domain. Returns the `(value, literal)` pairs in domain order.
    pub fn fully_encode(&mut self, domains: &mut Domains, sat: &mut SatSolver, var: VarRef) -> Vec<(IntCst, Lit)> {
        let values: Vec<IntCst> = domains.initial_domain(var).values().collect();
        values
            .into_iter()
            .map(|v| (v, self.eq_literal(domains, sat, var, v)))
            .collect()
    }

    /// True if every value of the current domain has an associated equality
    /// literal without further creation. The check is lazy: it compares the
    /// encoded values against the current domain.
    pub fn is_fully_encoded(&self, domains: &Domains, var: VarRef) -> bool {
        let (lb, ub) = domains.bounds(var);
        if lb == ub {
            return true;
        }
        let table: &[(IntCst, Lit)] = self.eq_lits.get(var).map(|t| t.as_slice()).unwrap_or(&[]);
        domains
            .initial_domain(var)
            .values()
            .filter(|&v| lb < v && v < ub) // min and max are plain bound literals
            .all(|v| table.binary_search_by_key(&v, |&(x, _)| x).is_ok())
    }

    /// The equality predicate a literal was created for, if any.
    pub fn eq_meaning(&self, lit: Lit) -> Option<EqMeaning> {
        self.meanings.get(&lit).copied()
    }

    /// If `lit` is `[v >= 1]` for a variable with initial domain within
    /// `{0, 1}`, returns `v`: the literal can be treated as an integer
    /// variable on its own.
    pub fn literal_view(&self, domains: &Domains, lit: Lit) -> Option<VarRef> {
        let var = lit.variable();
        if lit == var.geq(1) && domains.initial_lb(var) >= 0 && domains.initial_ub(var) <= 1 {
            Some(var)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backtrack::Backtrack;
    use crate::core::state::Cause;
    use crate::reasoners::ReasonerId;

    fn setup() -> (Domains, SatSolver, IntEncoder) {
        (Domains::new(), SatSolver::new(ReasonerId::Sat), IntEncoder::new())
    }

    #[test]
    fn bound_canonicalization() {
        let (mut domains, _, enc) = setup();
        let x = domains
            .new_var_with_domain(Domain::from_intervals([(1, 4), (7, 9)]).unwrap())
            .unwrap();
        // snapped out of the hole
        assert_eq!(enc.bound_literal(&domains, x.geq(5)), x.geq(7));
        assert_eq!(enc.bound_literal(&domains, x.leq(6)), x.leq(4));
        // canonicalization is idempotent
        let c = enc.bound_literal(&domains, x.geq(5));
        assert_eq!(enc.bound_literal(&domains, c), c);
        // trivial literals collapse to the constants
        assert_eq!(enc.bound_literal(&domains, x.geq(1)), Lit::TRUE);
        assert_eq!(enc.bound_literal(&domains, x.leq(9)), Lit::TRUE);
        assert_eq!(enc.bound_literal(&domains, x.geq(10)), Lit::FALSE);
        assert_eq!(enc.bound_literal(&domains, x.leq(0)), Lit::FALSE);
    }

    #[test]
    fn eq_literals_are_deduplicated() {
        let (mut domains, mut sat, mut enc) = setup();
        let x = domains.new_var(0, 5);
        let l3 = enc.eq_literal(&mut domains, &mut sat, x, 3);
        let l3b = enc.eq_literal(&mut domains, &mut sat, x, 3);
        assert_eq!(l3, l3b);
        assert_eq!(enc.eq_meaning(l3), Some(EqMeaning { var: x, value: 3 }));
        // out of domain and domain limits
        assert_eq!(enc.eq_literal(&mut domains, &mut sat, x, 9), Lit::FALSE);
        assert_eq!(enc.eq_literal(&mut domains, &mut sat, x, 0), x.leq(0));
        assert_eq!(enc.eq_literal(&mut domains, &mut sat, x, 5), x.geq(5));
    }

    #[test]
    fn eq_literal_follows_bounds() {
        let (mut domains, mut sat, mut enc) = setup();
        let x = domains.new_var(0, 5);
        let l3 = enc.eq_literal(&mut domains, &mut sat, x, 3);
        sat.propagate(&mut domains).unwrap();

        let _ = domains.save_state();
        let _ = sat.save_state();
        // setting the literal squeezes the bounds
        domains.decide(l3).unwrap();
        sat.propagate(&mut domains).unwrap();
        assert_eq!(domains.bounds(x), (3, 3));

        domains.restore_last();
        sat.restore_last();
        let _ = domains.save_state();
        let _ = sat.save_state();
        // fixing the bounds forces the literal
        domains.set_lb(x, 3, Cause::Decision).unwrap();
        domains.set_ub(x, 3, Cause::Decision).unwrap();
        sat.propagate(&mut domains).unwrap();
        assert_eq!(domains.value(l3), Some(true));

        domains.restore_last();
        sat.restore_last();
        let _ = domains.save_state();
        let _ = sat.save_state();
        // excluding the value kills the literal
        domains.set_lb(x, 4, Cause::Decision).unwrap();
        sat.propagate(&mut domains).unwrap();
        assert_eq!(domains.value(l3), Some(false));
    }

    #[test]
    fn mutually_exclusive_value_literals() {
        let (mut domains, mut sat, mut enc) = setup();
        let x = domains.new_var(0, 5);
        let l2 = enc.eq_literal(&mut domains, &mut sat, x, 2);
        let l3 = enc.eq_literal(&mut domains, &mut sat, x, 3);
        // the implication graph sees the exclusion without any propagation
        assert!(domains.exclusive(l2, l3));
    }

    #[test]
    fn full_encoding() {
        let (mut domains, mut sat, mut enc) = setup();
        let x = domains
            .new_var_with_domain(Domain::from_intervals([(0, 2), (4, 5)]).unwrap())
            .unwrap();
        assert!(!enc.is_fully_encoded(&domains, x));
        let lits = enc.fully_encode(&mut domains, &mut sat, x);
        assert_eq!(lits.len(), 5);
        assert_eq!(lits.iter().map(|&(v, _)| v).collect::<Vec<_>>(), vec![0, 1, 2, 4, 5]);
        assert!(enc.is_fully_encoded(&domains, x));
    }

    #[test]
    fn boolean_view() {
        let (mut domains, _, enc) = setup();
        let b = domains.new_var(0, 1);
        let x = domains.new_var(0, 5);
        assert_eq!(enc.literal_view(&domains, b.geq(1)), Some(b));
        assert_eq!(enc.literal_view(&domains, x.geq(1)), None);
        assert_eq!(enc.literal_view(&domains, b.leq(0)), None);
    }
}
