use crate::core::literals::{LitSet, Watches};
use crate::core::*;

/// A 2-SAT style implication network between literals.
///
/// It answers in polynomial time whether one literal implies another,
/// directly or transitively, accounting for the implicit implications
/// between literals on the same variable (`(x < 0) => (x < 1)`).
///
/// The network does not detect contradictions of the form `x => !x` and does
/// not deduplicate edges.
///
/// ```
/// use vela::core::*;
/// use vela::core::literals::ImplicationGraph;
/// let mut g = ImplicationGraph::empty();
/// let v1 = VarRef::from_u32(3);
/// let v2 = VarRef::from_u32(4);
/// g.add_implication(v1.leq(0), v2.leq(0));
/// assert!(g.implies(v1.leq(0), v2.leq(1)));
/// assert!(g.implies(v1.leq(-1), v2.leq(0)));
/// assert!(!g.implies(v1.leq(1), v2.leq(0)));
/// ```
#[derive(Clone, Default, Debug)]
pub struct ImplicationGraph {
    edges: Watches<Lit>,
    num_edges: usize,
}

impl ImplicationGraph {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Records that `from` implies `to` (and the contrapositive).
    pub fn add_implication(&mut self, from: Lit, to: Lit) {
        if to == Lit::TRUE || from == Lit::FALSE || from.entails(to) {
            return;
        }
        self.num_edges += 1;
        self.edges.add_watch(to, from);
        self.edges.add_watch(!from, !to);
        debug_assert!(self.implies(from, to));
        debug_assert!(self.implies(!to, !from));
    }

    /// True if there is a direct or indirect implication `x => y`.
    pub fn implies(&self, x: Lit, y: Lit) -> bool {
        if y == Lit::TRUE || x == Lit::FALSE || x.entails(y) {
            return true;
        }
        // for every (x -> y) edge there is a (!y -> !x) edge, so an absence of
        // incoming edges on y proves it unreachable
        if self.edges.watches_on(!y).next().is_none() {
            return false;
        }
        let mut state = DfsState::new(x);
        state.reachable(y, &self.edges)
    }

    pub fn direct_implications_of(&self, lit: Lit) -> impl Iterator<Item = Lit> + '_ {
        self.edges.watches_on(lit)
    }
}

struct DfsState {
    visited: LitSet,
    queue: Vec<Lit>,
}

impl DfsState {
    fn new(source: Lit) -> Self {
        let mut state = DfsState {
            visited: LitSet::new(),
            queue: Vec::with_capacity(64),
        };
        state.queue.push(source);
        state
    }

    fn reachable(&mut self, target: Lit, edges: &Watches<Lit>) -> bool {
        while let Some(curr) = self.queue.pop() {
            if self.visited.contains(curr) {
                continue;
            }
            self.visited.insert(curr);
            for next in edges.watches_on(curr) {
                if next.entails(target) {
                    return true;
                } else {
                    self.queue.push(next);
                }
            }
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const A: VarRef = VarRef::from_u32(0);
    const B: VarRef = VarRef::from_u32(1);
    const C: VarRef = VarRef::from_u32(2);
    const D: VarRef = VarRef::from_u32(3);

    #[test]
    fn transitive_implications() {
        let mut g = ImplicationGraph::empty();
        g.add_implication(A.leq(1), B.leq(1));
        g.add_implication(B.leq(2), C.leq(2));

        assert!(g.implies(A.leq(1), B.leq(1)));
        assert!(g.implies(A.leq(0), B.leq(2)));
        assert!(g.implies(A.leq(1), C.leq(2)));
        assert!(g.implies(A.leq(1), C.leq(3)));
        assert!(!g.implies(A.leq(2), C.leq(2)));
        assert!(!g.implies(A.leq(1), C.leq(1)));
        // contrapositive
        assert!(g.implies(!C.leq(2), !B.leq(2)));
    }

    #[test]
    fn cycles_terminate() {
        let mut g = ImplicationGraph::empty();
        g.add_implication(A.leq(0), B.leq(0));
        g.add_implication(B.leq(0), A.leq(0));
        g.add_implication(C.leq(0), D.leq(0));
        g.add_implication(D.leq(0), C.leq(0));
        assert!(!g.implies(A.leq(0), C.leq(0)));
        assert!(g.implies(A.leq(0), B.leq(0)));
    }
}
