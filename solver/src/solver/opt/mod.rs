//! Optimization drivers built on top of the decision engine: a core-based
//! (unsat-core condensation) optimizer and a lower-bound driven tree search
//! exploiting an external linear relaxation.

pub mod core_based;
pub mod lb_tree;
pub mod relaxation;

pub use core_based::{CoreBasedOptimizer, CoreOptimizerParams, ObjectiveTerm};
pub use lb_tree::{LbTreeSearch, TreeSearchParams};
pub use relaxation::{Basis, ConditionalBounds, LinearRelaxation, LpSolution};

use crate::core::IntCst;

/// Final status of an optimization run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OptimizationStatus {
    /// The returned value is proven optimal.
    Optimal(IntCst),
    /// A solution was found but optimality was not proven within the limits.
    Feasible(IntCst),
    /// The problem has no solution.
    Infeasible,
    /// No solution was found within the limits.
    LimitReached,
}

impl OptimizationStatus {
    pub fn objective_value(&self) -> Option<IntCst> {
        match self {
            OptimizationStatus::Optimal(v) | OptimizationStatus::Feasible(v) => Some(*v),
            _ => None,
        }
    }
}
