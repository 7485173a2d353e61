use std::collections::BinaryHeap;

use crate::backtrack::EventIndex;
use crate::core::state::{DomainsSnapshot, InferenceCause};
use crate::core::Lit;

/// A conjunction of literals that together imply some other literal.
#[derive(Clone, Debug, Default)]
pub struct Explanation {
    pub lits: Vec<Lit>,
}

impl Explanation {
    pub fn new() -> Self {
        Explanation { lits: Vec::new() }
    }
    pub fn with_capacity(n: usize) -> Self {
        Explanation {
            lits: Vec::with_capacity(n),
        }
    }
    pub fn push(&mut self, lit: Lit) {
        self.lits.push(lit);
    }
    pub fn pop(&mut self) -> Option<Lit> {
        self.lits.pop()
    }
    pub fn clear(&mut self) {
        self.lits.clear();
    }
    pub fn len(&self) -> usize {
        self.lits.len()
    }
    pub fn is_empty(&self) -> bool {
        self.lits.is_empty()
    }
    pub fn literals(&self) -> &[Lit] {
        &self.lits
    }
}

impl FromIterator<Lit> for Explanation {
    fn from_iter<T: IntoIterator<Item = Lit>>(iter: T) -> Self {
        Explanation {
            lits: iter.into_iter().collect(),
        }
    }
}

/// Interface through which conflict analysis asks the module that made an
/// inference for its premises. Only invoked if the inference actually
/// participates in a conflict, which is what makes reasons lazy.
pub trait Explainer {
    /// Appends to `explanation` a set of literals that imply `literal`.
    /// `model` is a view of the domains at the time the inference was made.
    fn explain(
        &mut self,
        cause: InferenceCause,
        literal: Lit,
        model: &DomainsSnapshot,
        explanation: &mut Explanation,
    );
}

/// A max-heap of entailed literals keyed by the index of their implying
/// event, used to process a conflict from the most recent entailment to the
/// oldest while merging duplicates.
#[derive(Clone, Default, Debug)]
pub(crate) struct ExplanationQueue {
    heap: BinaryHeap<InQueueLit>,
}

impl ExplanationQueue {
    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    pub fn push(&mut self, cause: EventIndex, lit: Lit) {
        self.heap.push(InQueueLit { cause, lit });
    }

    /// Removes the most recent literal of the queue.
    /// Entries referring to the same event are collapsed, keeping the weakest
    /// literal (the one all others entail).
    pub fn pop(&mut self) -> Option<(Lit, EventIndex)> {
        let mut l = self.heap.pop()?;
        while let Some(next) = self.heap.peek() {
            if next.cause == l.cause {
                let l2 = self.heap.pop().unwrap();
                if l2.lit.entails(l.lit) {
                    l = l2;
                } else {
                    debug_assert!(l.lit.entails(l2.lit));
                }
            } else {
                break;
            }
        }
        Some((l.lit, l.cause))
    }

    pub fn clear(&mut self) {
        self.heap.clear();
    }
}

/// A literal in the explanation queue, ordered by implying event index.
#[derive(Copy, Clone, Debug)]
struct InQueueLit {
    cause: EventIndex,
    lit: Lit,
}
impl PartialEq for InQueueLit {
    fn eq(&self, other: &Self) -> bool {
        self.cause == other.cause
    }
}
impl Eq for InQueueLit {}
impl Ord for InQueueLit {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.cause.cmp(&other.cause)
    }
}
impl PartialOrd for InQueueLit {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
