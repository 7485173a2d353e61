//! Inference engines that cooperate through the shared domain store: the
//! SAT (clausal) reasoner and the CP reasoner hosting the constraint
//! propagators.

use std::fmt::{Display, Formatter};

use crate::backtrack::Backtrack;
use crate::core::state::{Cause, Domains, DomainsSnapshot, Explainer, Explanation, InferenceCause, InvalidUpdate};
use crate::core::Lit;
use crate::reasoners::cp::Cp;
use crate::reasoners::sat::SatSolver;

pub mod cp;
pub mod sat;

/// Identifies an inference engine. Stamped on every domain event so that the
/// event can later be explained by the module that produced it.
#[derive(Ord, PartialOrd, PartialEq, Eq, Copy, Clone, Hash, Debug)]
pub enum ReasonerId {
    Sat,
    Cp,
}

impl ReasonerId {
    pub fn cause(&self, payload: impl Into<u32>) -> Cause {
        Cause::inference(*self, payload)
    }
}

impl Display for ReasonerId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                ReasonerId::Sat => "SAT",
                ReasonerId::Cp => "CP",
            }
        )
    }
}

/// A propagation engine plugged into the solver's propagation loop.
pub trait Theory: Backtrack + Send + 'static {
    fn identity(&self) -> ReasonerId;

    /// Propagates all pending events. On success the theory is at (or on the
    /// way to, see [`Domains::propagation_is_incomplete`]) its fixed point.
    fn propagate(&mut self, model: &mut Domains) -> Result<(), Contradiction>;

    /// Explains an inference previously made by this theory.
    /// `literal` may be a weakened form of the literal actually inferred.
    fn explain(
        &mut self,
        literal: Lit,
        context: InferenceCause,
        model: &DomainsSnapshot,
        out_explanation: &mut Explanation,
    );

    fn print_stats(&self);

    fn clone_box(&self) -> Box<dyn Theory>;
}

/// A contradiction encountered during propagation: either a domain that
/// became empty, or an explicit set of incompatible literals.
#[derive(Debug)]
pub enum Contradiction {
    InvalidUpdate(InvalidUpdate),
    Explanation(Explanation),
}

impl From<InvalidUpdate> for Contradiction {
    fn from(empty: InvalidUpdate) -> Self {
        Contradiction::InvalidUpdate(empty)
    }
}

impl From<Explanation> for Contradiction {
    fn from(e: Explanation) -> Self {
        Contradiction::Explanation(e)
    }
}

/// Propagation order. SAT comes first: nothing may happen between the moment
/// a clause is learnt and the moment it is propagated.
pub(crate) const REASONERS: [ReasonerId; 2] = [ReasonerId::Sat, ReasonerId::Cp];

/// The set of inference modules of one solver instance.
#[derive(Clone)]
pub struct Reasoners {
    pub sat: SatSolver,
    pub cp: Cp,
}

impl Reasoners {
    pub fn new() -> Self {
        Reasoners {
            sat: SatSolver::new(ReasonerId::Sat),
            cp: Cp::new(ReasonerId::Cp),
        }
    }

    pub fn reasoner(&self, id: ReasonerId) -> &dyn Theory {
        match id {
            ReasonerId::Sat => &self.sat,
            ReasonerId::Cp => &self.cp,
        }
    }

    pub fn reasoner_mut(&mut self, id: ReasonerId) -> &mut dyn Theory {
        match id {
            ReasonerId::Sat => &mut self.sat,
            ReasonerId::Cp => &mut self.cp,
        }
    }

    pub fn writers(&self) -> &'static [ReasonerId] {
        &REASONERS
    }

    pub fn theories(&self) -> impl Iterator<Item = (ReasonerId, &dyn Theory)> + '_ {
        self.writers().iter().map(|w| (*w, self.reasoner(*w)))
    }
}

impl Default for Reasoners {
    fn default() -> Self {
        Self::new()
    }
}

impl Explainer for Reasoners {
    fn explain(&mut self, cause: InferenceCause, literal: Lit, model: &DomainsSnapshot, explanation: &mut Explanation) {
        self.reasoner_mut(cause.writer).explain(literal, cause, model, explanation)
    }
}
