use std::fmt::{Debug, Formatter};

use itertools::Itertools;

use crate::core::IntCst;

/// A set of integers represented as a sorted union of disjoint closed
/// intervals. Holes between intervals are first class: bound updates against
/// a domain snap to the nearest value inside it.
///
/// The empty domain is representable (and used to signal an unsatisfiable
/// intersection).
///
/// ```
/// use vela::core::Domain;
/// let d = Domain::from_intervals([(1, 4), (7, 9)]).unwrap();
/// assert_eq!(d.min(), Some(1));
/// assert_eq!(d.max(), Some(9));
/// assert!(d.contains(3));
/// assert!(!d.contains(5));
/// assert_eq!(d.value_at_or_above(5), Some(7)); // snapped out of the hole
/// assert_eq!(d.value_at_or_below(5), Some(4));
/// ```
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Domain {
    /// Sorted, disjoint, non-adjacent closed intervals.
    intervals: Vec<(IntCst, IntCst)>,
}

/// Error raised when a domain construction receives an interval with `lb > ub`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("invalid interval [{0}, {1}]")]
pub struct InvalidInterval(pub IntCst, pub IntCst);

impl Domain {
    /// The domain containing all integers in `[lb, ub]`, empty if `lb > ub`.
    pub fn range(lb: IntCst, ub: IntCst) -> Domain {
        if lb > ub {
            Domain::empty()
        } else {
            Domain { intervals: vec![(lb, ub)] }
        }
    }

    pub fn empty() -> Domain {
        Domain { intervals: Vec::new() }
    }

    /// Builds a domain from arbitrary intervals: they are sorted and
    /// overlapping or adjacent ones are merged. Each interval must have
    /// `lb <= ub`.
    pub fn from_intervals(
        intervals: impl IntoIterator<Item = (IntCst, IntCst)>,
    ) -> Result<Domain, InvalidInterval> {
        let mut intervals: Vec<(IntCst, IntCst)> = intervals.into_iter().collect();
        for &(lb, ub) in &intervals {
            if lb > ub {
                return Err(InvalidInterval(lb, ub));
            }
        }
        intervals.sort_unstable();
        let mut merged: Vec<(IntCst, IntCst)> = Vec::with_capacity(intervals.len());
        for (lb, ub) in intervals {
            match merged.last_mut() {
                Some((_, prev_ub)) if lb <= prev_ub.saturating_add(1) => {
                    *prev_ub = (*prev_ub).max(ub);
                }
                _ => merged.push((lb, ub)),
            }
        }
        Ok(Domain { intervals: merged })
    }

    pub fn from_values(values: impl IntoIterator<Item = IntCst>) -> Domain {
        Domain::from_intervals(values.into_iter().map(|v| (v, v))).expect("singletons are valid intervals")
    }

    /// The intervals of the domain, sorted and disjoint.
    /// Round-trip invariant: `Domain::from_intervals(d.intervals())` returns `d` unchanged.
    pub fn intervals(&self) -> &[(IntCst, IntCst)] {
        &self.intervals
    }

    pub fn is_empty(&self) -> bool {
        self.intervals.is_empty()
    }

    pub fn min(&self) -> Option<IntCst> {
        self.intervals.first().map(|&(lb, _)| lb)
    }

    pub fn max(&self) -> Option<IntCst> {
        self.intervals.last().map(|&(_, ub)| ub)
    }

    pub fn is_fixed(&self) -> bool {
        self.intervals.len() == 1 && self.intervals[0].0 == self.intervals[0].1
    }

    /// Number of values in the domain.
    pub fn size(&self) -> u64 {
        self.intervals.iter().map(|&(lb, ub)| (ub - lb) as u64 + 1).sum()
    }

    pub fn contains(&self, value: IntCst) -> bool {
        // index of the first interval starting after `value`
        let idx = self.intervals.partition_point(|&(lb, _)| lb <= value);
        idx > 0 && self.intervals[idx - 1].1 >= value
    }

    /// Smallest domain value `>= value`, if any. This is the canonical form of
    /// a lower bound `value` against this domain.
    pub fn value_at_or_above(&self, value: IntCst) -> Option<IntCst> {
        let idx = self.intervals.partition_point(|&(_, ub)| ub < value);
        self.intervals.get(idx).map(|&(lb, _)| lb.max(value))
    }

    /// Largest domain value `<= value`, if any. Canonical form of an upper bound.
    pub fn value_at_or_below(&self, value: IntCst) -> Option<IntCst> {
        let idx = self.intervals.partition_point(|&(lb, _)| lb <= value);
        if idx == 0 {
            None
        } else {
            let (_, ub) = self.intervals[idx - 1];
            Some(ub.min(value))
        }
    }

    pub fn intersection_with(&self, other: &Domain) -> Domain {
        let mut out = Vec::new();
        let (mut i, mut j) = (0, 0);
        while i < self.intervals.len() && j < other.intervals.len() {
            let (a_lb, a_ub) = self.intervals[i];
            let (b_lb, b_ub) = other.intervals[j];
            let lb = a_lb.max(b_lb);
            let ub = a_ub.min(b_ub);
            if lb <= ub {
                out.push((lb, ub));
            }
            if a_ub <= b_ub {
                i += 1;
            } else {
                j += 1;
            }
        }
        Domain { intervals: out }
    }

    /// The domain `{ -x | x in self }`.
    pub fn negation(&self) -> Domain {
        Domain {
            intervals: self.intervals.iter().rev().map(|&(lb, ub)| (-ub, -lb)).collect(),
        }
    }

    /// Iterates over all values, in increasing order.
    pub fn values(&self) -> impl Iterator<Item = IntCst> + '_ {
        self.intervals.iter().flat_map(|&(lb, ub)| lb..=ub)
    }
}

impl Debug for Domain {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{{{}}}",
            self.intervals
                .iter()
                .map(|&(lb, ub)| if lb == ub {
                    format!("{lb}")
                } else {
                    format!("{lb}..{ub}")
                })
                .format(", ")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(intervals: &[(IntCst, IntCst)]) -> Domain {
        Domain::from_intervals(intervals.iter().copied()).unwrap()
    }

    #[test]
    fn normalization_merges_adjacent() {
        assert_eq!(d(&[(3, 4), (0, 2)]), Domain::range(0, 4));
        assert_eq!(d(&[(0, 2), (2, 5)]), Domain::range(0, 5));
        assert_eq!(d(&[(0, 2), (4, 5)]).intervals(), &[(0, 2), (4, 5)]);
        assert!(Domain::range(3, 2).is_empty());
        assert!(Domain::from_intervals([(2, 1)]).is_err());
    }

    #[test]
    fn roundtrip_through_intervals() {
        let dom = d(&[(-3, -1), (2, 2), (5, 9)]);
        let copy = Domain::from_intervals(dom.intervals().iter().copied()).unwrap();
        assert_eq!(dom, copy);
    }

    #[test]
    fn snapping() {
        let dom = d(&[(1, 4), (7, 9)]);
        assert_eq!(dom.value_at_or_above(0), Some(1));
        assert_eq!(dom.value_at_or_above(2), Some(2));
        assert_eq!(dom.value_at_or_above(5), Some(7));
        assert_eq!(dom.value_at_or_above(9), Some(9));
        assert_eq!(dom.value_at_or_above(10), None);
        assert_eq!(dom.value_at_or_below(10), Some(9));
        assert_eq!(dom.value_at_or_below(8), Some(8));
        assert_eq!(dom.value_at_or_below(6), Some(4));
        assert_eq!(dom.value_at_or_below(1), Some(1));
        assert_eq!(dom.value_at_or_below(0), None);
    }

    #[test]
    fn intersection_and_negation() {
        let a = d(&[(0, 5), (10, 15)]);
        let b = d(&[(4, 11)]);
        assert_eq!(a.intersection_with(&b), d(&[(4, 5), (10, 11)]));
        assert_eq!(b.intersection_with(&a), d(&[(4, 5), (10, 11)]));
        assert_eq!(a.negation(), d(&[(-15, -10), (-5, 0)]));
        assert_eq!(a.negation().negation(), a);
        assert!(a.intersection_with(&Domain::empty()).is_empty());
    }

    #[test]
    fn values_and_size() {
        let dom = d(&[(1, 2), (5, 5)]);
        assert_eq!(dom.values().collect::<Vec<_>>(), vec![1, 2, 5]);
        assert_eq!(dom.size(), 3);
        assert!(Domain::range(4, 4).is_fixed());
        assert!(!dom.is_fixed());
    }
}
