use std::cmp::Ordering;

use crate::core::*;

/// A literal `Lit` represents a lower or upper bound on an integer variable.
///
/// For a boolean (0/1) variable `x`, `x > 0` is the true literal and
/// `x <= 0` the false one.
///
/// The representation is an upper bound on a [`SignedVar`], which lets
/// entailment be tested without inspecting the relation:
/// `[v >= k]` is stored as `[-v <= -k]`.
///
/// ```
/// use vela::core::*;
/// let y = VarRef::from_u32(2);
/// let y_geq_5 = Lit::geq(y, 5);
/// assert_eq!(y_geq_5.variable(), y);
/// assert_eq!(y_geq_5.relation(), Relation::Gt);
/// assert_eq!(y_geq_5.value(), 4); // stored as (y > 4)
/// ```
///
/// # Ordering
///
/// Literals are ordered by (variable, affected bound, bound value). In a
/// sorted slice, a literal can only entail its immediate successors.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct Lit {
    /// Either `+v` or `-v` for a variable `v`.
    svar: SignedVar,
    /// Upper bound of the signed variable.
    upper_bound: UpperBound,
}

/// Relation of a literal to its variable, recovered from the sign of the view.
#[derive(Ord, PartialOrd, Eq, PartialEq, Debug, Copy, Clone)]
pub enum Relation {
    Gt,
    Leq,
}

impl std::fmt::Display for Relation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Relation::Leq => write!(f, "<="),
            Relation::Gt => write!(f, ">"),
        }
    }
}

impl Lit {
    /// A literal that is always true: `[VarRef::ZERO <= 0]`.
    pub const TRUE: Lit = Lit::from_parts(SignedVar::plus(VarRef::ZERO), UpperBound::ub(0));
    /// The negation of [`Lit::TRUE`].
    pub const FALSE: Lit = Lit::TRUE.not();

    #[inline]
    pub const fn from_parts(svar: SignedVar, value: UpperBound) -> Self {
        Lit {
            svar,
            upper_bound: value,
        }
    }

    #[inline]
    pub fn variable(self) -> VarRef {
        self.svar.variable()
    }

    #[inline]
    pub const fn relation(self) -> Relation {
        if self.svar.is_plus() {
            Relation::Leq
        } else {
            Relation::Gt
        }
    }

    #[inline]
    pub const fn value(self) -> IntCst {
        match self.relation() {
            Relation::Leq => self.upper_bound.as_int(),
            Relation::Gt => -self.upper_bound.as_int() - 1,
        }
    }

    #[inline]
    pub const fn svar(self) -> SignedVar {
        self.svar
    }

    #[inline]
    pub const fn bound_value(self) -> UpperBound {
        self.upper_bound
    }

    /// Upper bound value of the signed view, as a plain integer.
    #[inline]
    pub const fn ub_value(self) -> IntCst {
        self.upper_bound.as_int()
    }

    #[inline]
    pub fn leq(var: impl Into<VarRef>, val: IntCst) -> Lit {
        Lit::from_parts(SignedVar::plus(var.into()), UpperBound::ub(val))
    }
    #[inline]
    pub fn lt(var: impl Into<VarRef>, val: IntCst) -> Lit {
        Lit::leq(var, val - 1)
    }
    #[inline]
    pub fn geq(var: impl Into<VarRef>, val: IntCst) -> Lit {
        Lit::from_parts(SignedVar::minus(var.into()), UpperBound::lb(val))
    }
    #[inline]
    pub fn gt(var: impl Into<VarRef>, val: IntCst) -> Lit {
        Lit::geq(var, val + 1)
    }

    /// The negated literal: `!(x <= d)` is `(x >= d+1)`.
    ///
    /// ```
    /// use vela::core::*;
    /// assert_eq!(!Lit::TRUE, Lit::FALSE);
    /// let a = VarRef::from_u32(1);
    /// assert_eq!(!Lit::leq(a, 1), Lit::gt(a, 1));
    /// ```
    #[inline]
    pub const fn not(self) -> Self {
        Lit {
            svar: self.svar.neg(),
            upper_bound: UpperBound::ub(-self.upper_bound.as_int() - 1),
        }
    }

    /// True if `self` being true necessarily makes `other` true, regardless of
    /// any context.
    ///
    /// ```
    /// use vela::core::*;
    /// let a = VarRef::from_u32(0);
    /// assert!(Lit::leq(a, 1).entails(Lit::leq(a, 2)));
    /// assert!(!Lit::leq(a, 1).entails(Lit::leq(a, 0)));
    /// ```
    #[inline]
    pub fn entails(self, other: Lit) -> bool {
        self.svar == other.svar && self.upper_bound.stronger(other.upper_bound)
    }

    pub fn unpack(self) -> (VarRef, Relation, IntCst) {
        (self.variable(), self.relation(), self.value())
    }

    /// Ordering that groups literals by variable, then affected bound, then value.
    pub fn lexical_cmp(&self, other: &Lit) -> Ordering {
        self.cmp(other)
    }
}

impl std::ops::Not for Lit {
    type Output = Lit;

    #[inline]
    fn not(self) -> Self::Output {
        self.not()
    }
}

impl From<bool> for Lit {
    fn from(b: bool) -> Self {
        if b {
            Lit::TRUE
        } else {
            Lit::FALSE
        }
    }
}

impl std::fmt::Debug for Lit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match *self {
            Lit::TRUE => write!(f, "true"),
            Lit::FALSE => write!(f, "false"),
            _ => {
                let (var, rel, val) = self.unpack();
                if rel == Relation::Gt && val == 0 {
                    write!(f, "l{}", var.to_u32())
                } else if rel == Relation::Leq && val == 0 {
                    write!(f, "!l{}", var.to_u32())
                } else {
                    write!(f, "{var:?} {rel} {val}")
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entailments() {
        let a = VarRef::from_u32(0);
        let b = VarRef::from_u32(1);

        assert!(Lit::leq(a, 0).entails(Lit::leq(a, 0)));
        assert!(Lit::leq(a, 0).entails(Lit::leq(a, 1)));
        assert!(!Lit::leq(a, 0).entails(Lit::leq(a, -1)));
        assert!(!Lit::leq(a, 0).entails(Lit::leq(b, 0)));

        assert!(Lit::geq(a, 0).entails(Lit::geq(a, 0)));
        assert!(!Lit::geq(a, 0).entails(Lit::geq(a, 1)));
        assert!(Lit::geq(a, 0).entails(Lit::geq(a, -1)));
        assert!(!Lit::geq(a, 0).entails(Lit::geq(b, -1)));
    }

    #[test]
    fn negation_is_involutive() {
        let a = VarRef::from_u32(3);
        for k in -5..5 {
            for l in [Lit::leq(a, k), Lit::geq(a, k)] {
                assert_eq!(!!l, l);
                assert_ne!(!l, l);
            }
        }
        assert_eq!(!Lit::leq(a, 1), Lit::geq(a, 2));
    }

    #[test]
    fn geq_through_negated_view() {
        let a = VarRef::from_u32(7);
        // [a >= 3] is the upper bound -3 on the negative view
        let l = Lit::geq(a, 3);
        assert_eq!(l.svar(), SignedVar::minus(a));
        assert_eq!(l.ub_value(), -3);
        assert_eq!(l.value(), 2); // (a > 2)
    }
}
