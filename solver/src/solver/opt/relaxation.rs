//! Narrow interface to an external linear relaxation.
//!
//! The solver never implements a simplex itself: it only consumes
//! certificates, i.e. an objective bound, per-literal conditional bounds
//! derived from reduced costs, and an opaque warm-start basis.

use num_rational::Rational64;

use crate::core::state::Domains;
use crate::core::{IntCst, Lit};

/// Opaque warm-start token of the relaxation backend. Only meaningful to the
/// backend that produced it, and only while its change stamp is current.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Basis(pub Vec<u8>);

/// Conditional objective bounds read off the reduced costs of an optimal
/// relaxation: fixing `literal` to either polarity implies the corresponding
/// bound on the objective.
#[derive(Clone, Debug)]
pub struct ConditionalBounds {
    pub literal: Lit,
    pub if_true: Rational64,
    pub if_false: Rational64,
}

/// Certificate returned by one relaxation solve.
#[derive(Clone, Debug)]
pub struct LpSolution {
    /// A valid lower bound on the objective in the relaxed problem.
    pub objective_bound: Rational64,
    /// Conditional bounds for the literals the backend has views for.
    pub conditional: Vec<ConditionalBounds>,
    /// Warm-start token for neighbouring solves.
    pub basis: Basis,
}

/// The contract of a relaxation backend.
pub trait LinearRelaxation: Send {
    /// Solves the relaxation under the current domains.
    /// `Ok(None)` means the relaxation itself is infeasible (so is the
    /// integer problem under the current bounds).
    fn solve(&mut self, domains: &Domains) -> anyhow::Result<Option<LpSolution>>;

    /// Warm-starts the backend from a previously returned basis.
    fn load_basis(&mut self, basis: &Basis);

    /// Incremented by the backend whenever its constraint set changes;
    /// bases recorded under an older stamp are stale.
    fn change_stamp(&self) -> u64;
}

/// Rounds a rational lower bound up to the nearest integer.
pub fn integer_lower_bound(bound: Rational64) -> IntCst {
    bound.ceil().to_integer()
}

#[cfg(test)]
mod tests {
    use super::*;
    use num_rational::Rational64;

    #[test]
    fn rational_bounds_round_up() {
        assert_eq!(integer_lower_bound(Rational64::new(7, 3)), 3); // 2.33...
        assert_eq!(integer_lower_bound(Rational64::new(6, 3)), 2);
        assert_eq!(integer_lower_bound(Rational64::new(-7, 3)), -2);
    }
}
