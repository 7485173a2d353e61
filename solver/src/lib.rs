//! # vela
//!
//! The integer reasoning core of a CP-SAT style solver.
//!
//! The crate is layered bottom-up:
//!
//! - [`collections`] and [`backtrack`]: dense-id side tables and trails with
//!   save points;
//! - [`core`]: variables, bound literals, hole-aware domains and the
//!   backtrackable domain store with explanation support;
//! - [`encoding`]: lazy creation of the literals standing for integer
//!   predicates (`[v = k]` and canonical bounds);
//! - [`reasoners`]: the SAT (clausal) engine and the CP propagator
//!   scheduler, with the all-different, disjunctive and cumulative
//!   propagators;
//! - [`solver`]: conflict-driven search with assumptions and unsat cores,
//!   and the optimization drivers (core-based and lower-bound tree search).
//!
//! ```
//! use vela::core::Lit;
//! use vela::solver::Solver;
//! use vela::solver::search::LexicalMinValue;
//!
//! let mut solver = Solver::new();
//! let x = solver.add_variable(0, 1);
//! let y = solver.add_variable(0, 1);
//! solver.add_clause([x.geq(1), y.geq(1)]);
//! solver.set_brancher(LexicalMinValue::new());
//! let solution = solver.solve().unwrap().expect("satisfiable");
//! assert!(solution.lb(x) + solution.lb(y) >= 1);
//! ```

pub mod backtrack;
pub mod collections;
pub mod core;
pub mod encoding;
pub mod reasoners;
pub mod solver;
pub mod utils;
