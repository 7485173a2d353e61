//! Datastructures specialized for literals: disjunctions (clauses),
//! entailment-aware sets, watchlists and the binary implication graph.

pub use disjunction::*;
pub use implication_graph::*;
pub use lit_set::*;
pub use watches::*;

mod disjunction;
mod implication_graph;
mod lit_set;
mod watches;
