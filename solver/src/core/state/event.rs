use crate::backtrack::EventIndex;
use crate::core::state::Origin;
use crate::core::*;

pub type ChangeIndex = Option<EventIndex>;

/// The value of a variable bound together with the index of the event that
/// set it. The embedded index is what links the events affecting one
/// variable into a singly linked list inside the trail.
///
/// Aligned on 8 bytes so the pair is read and written in one instruction.
#[derive(Copy, Clone, Debug)]
#[repr(align(8))]
pub struct ValueCause {
    pub upper_bound: UpperBound,
    pub cause: ChangeIndex,
}

impl ValueCause {
    pub fn new(upper_bound: UpperBound, cause: ChangeIndex) -> Self {
        ValueCause { upper_bound, cause }
    }
}

/// A domain update, as recorded on the trail:
///
/// - the affected variable bound, e.g. `ub(x3)`;
/// - the previous value of the bound and the index of the event that had set
///   it, enabling backtracking and efficient trail walking;
/// - the new value of the bound;
/// - the cause of the update, for explanations.
#[derive(Copy, Clone)]
pub struct Event {
    pub affected_bound: SignedVar,
    pub previous: ValueCause,
    pub new_upper_bound: IntCst,
    pub cause: Origin,
}

impl Event {
    /// True if this event made `lit` true while it was previously unknown.
    #[inline]
    pub fn makes_true(&self, lit: Lit) -> bool {
        debug_assert_eq!(self.affected_bound, lit.svar());
        self.new_upper_bound <= lit.ub_value() && self.previous.upper_bound.as_int() > lit.ub_value()
    }

    /// The strongest literal entailed by this event.
    #[inline]
    pub fn new_literal(&self) -> Lit {
        self.affected_bound.leq(self.new_upper_bound)
    }

    /// The strongest literal on this bound prior to the event.
    #[inline]
    pub fn previous_literal(&self) -> Lit {
        Lit::from_parts(self.affected_bound, self.previous.upper_bound)
    }
}

impl std::fmt::Debug for Event {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{:?} \tprev: {:?} \tcaused_by: {:?}",
            self.new_literal(),
            self.previous_literal(),
            self.cause
        )
    }
}
