//! The solver: search driver, branching strategies, optimization drivers,
//! statistics and cross-solver signals.

pub mod opt;
pub mod search;
pub mod signals;
pub mod solver_impl;
pub mod stats;

pub use solver_impl::{Exit, ModelError, Solver, UnsatCore};
