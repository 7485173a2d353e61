//! Search control: deciding which literal to branch on next.

pub mod activity;
pub mod lexical;
pub mod pseudo_costs;

use std::sync::Arc;

use crate::backtrack::{Backtrack, DecLvl};
use crate::core::state::{Conflict, Domains};
use crate::core::{IntCst, Lit};
use crate::solver::signals::SavedAssignment;
use crate::solver::stats::Stats;

pub use activity::ActivityBrancher;
pub use lexical::LexicalMinValue;

/// What the brancher asks the solver to do next.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Decision {
    /// Open a new decision level where the literal holds.
    SetLiteral(Lit),
    /// Abandon the current search tree, keeping the learnt clauses.
    Restart,
}

/// A branching strategy. Its state is backtracked in lockstep with the
/// solver so that decisions can be replayed consistently.
pub trait SearchControl: Backtrack + Send {
    /// The next decision, or `None` if every variable is bound (a solution).
    fn next_decision(&mut self, stats: &Stats, domains: &Domains) -> Option<Decision>;

    /// Makes the brancher aware of all variables declared so far.
    fn import_vars(&mut self, _domains: &Domains) {}

    /// Invoked on every conflict, before backtracking to `backtrack_to`.
    fn conflict(&mut self, _conflict: &Conflict, _domains: &Domains, _backtrack_to: DecLvl) {}

    /// Invoked whenever an improving assignment was found.
    fn new_assignment_found(&mut self, _objective: IntCst, _assignment: Arc<SavedAssignment>) {}

    fn clone_to_box(&self) -> Box<dyn SearchControl + Send>;
}

/// The default strategy: conflict-driven activity with solution phase saving.
pub fn default_brancher() -> Box<dyn SearchControl + Send> {
    Box::new(ActivityBrancher::new())
}
