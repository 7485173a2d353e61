use crate::core::state::*;
use crate::core::*;
use crate::create_ref_type;
use crate::reasoners::Contradiction;

use super::Watches;

create_ref_type!(PropagatorId);

impl std::fmt::Debug for PropagatorId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "prop{:?}", self.to_u32())
    }
}

/// Priority class of a propagator. Cheaper propagators run first so that
/// expensive ones see a state that is already locally consistent.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum PriorityLevel {
    /// Constant-time-per-event propagators (binary relations, bounds of a sum).
    Fast = 0,
    /// Near-linear propagators.
    Medium = 1,
    /// Heavyweight global propagators (matchings, edge-finding, energy sweeps).
    Slow = 2,
}

pub(super) const NUM_PRIORITY_LEVELS: usize = 3;

/// Implementation contract of a constraint propagator hosted by the CP
/// reasoner.
///
/// A propagator reads bounds from [`Domains`], pushes tightenings into it
/// and must later be able to explain any tightening it made. State needed
/// across calls (sort orders, cached matchings) lives in `self`; the
/// scheduler restores the decision level around calls, so such state must
/// either be robust to backtracking or derived from the domains on entry.
pub trait Propagator: Send {
    /// Registers the watches of the propagator. Called once, with the
    /// identifier that subsequent wake-ups and explanations will carry.
    fn setup(&mut self, id: PropagatorId, context: &mut Watches);

    /// Runs the propagator to its local fixed point.
    ///
    /// All updates must be tagged with `cause` so that this propagator is
    /// asked for the explanation if conflict analysis needs one.
    fn propagate(&mut self, domains: &mut Domains, cause: Cause) -> Result<(), Contradiction>;

    /// Propagation restricted to the watched items whose payloads are in
    /// `changed`. Defaults to a full propagation.
    fn incremental_propagate(
        &mut self,
        domains: &mut Domains,
        cause: Cause,
        _changed: &[u32],
    ) -> Result<(), Contradiction> {
        self.propagate(domains, cause)
    }

    /// Explains an inference this propagator previously made: appends to
    /// `out_explanation` literals that were true in `state` and that imply
    /// `literal`.
    ///
    /// `literal` may be weaker than the literal actually inferred (e.g.
    /// `(x <= 7)` when the propagation set `(x <= 6)`).
    fn explain(&self, literal: Lit, state: &DomainsSnapshot, out_explanation: &mut Explanation);

    /// True if a single `propagate` call always reaches a fixed point of the
    /// constraint. Idempotent propagators are not rescheduled on their own
    /// updates.
    fn is_idempotent(&self) -> bool {
        false
    }

    fn clone_box(&self) -> Box<dyn Propagator>;
}

/// Boxed propagator for dynamic dispatch from the scheduler.
pub struct DynPropagator {
    pub(super) constraint: Box<dyn Propagator>,
}

impl Clone for DynPropagator {
    fn clone(&self) -> Self {
        DynPropagator {
            constraint: self.constraint.clone_box(),
        }
    }
}

impl<T: Propagator + 'static> From<T> for DynPropagator {
    fn from(propagator: T) -> Self {
        DynPropagator {
            constraint: Box::new(propagator),
        }
    }
}

#[cfg(test)]
pub(crate) mod test_propagator {
    use super::*;

    /// An example propagator for an implication `a => b`, used in scheduler tests.
    #[derive(Clone)]
    pub struct ImpliesProp {
        pub a: Lit,
        pub b: Lit,
    }

    impl Propagator for ImpliesProp {
        fn setup(&mut self, id: PropagatorId, context: &mut Watches) {
            context.add_lit_watch(self.a, id);
            context.add_lit_watch(!self.b, id);
        }

        fn propagate(&mut self, domains: &mut Domains, cause: Cause) -> Result<(), Contradiction> {
            if domains.entails(self.a) {
                let _ = domains.set(self.b, cause)?;
            }
            if domains.entails(!self.b) {
                let _ = domains.set(!self.a, cause)?;
            }
            Ok(())
        }

        fn explain(&self, literal: Lit, state: &DomainsSnapshot, out_explanation: &mut Explanation) {
            if self.b.entails(literal) {
                debug_assert!(state.entails(self.a));
                out_explanation.push(self.a);
            } else if (!self.a).entails(literal) {
                debug_assert!(state.entails(!self.b));
                out_explanation.push(!self.b);
            } else {
                panic!("asked to explain an inference this propagator could not have made")
            }
        }

        fn is_idempotent(&self) -> bool {
            true
        }

        fn clone_box(&self) -> Box<dyn Propagator> {
            Box::new(self.clone())
        }
    }
}
