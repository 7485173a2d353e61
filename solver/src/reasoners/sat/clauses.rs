use std::fmt::{Debug, Display, Formatter};
use std::ops::{Index, IndexMut};

use itertools::Itertools;

use crate::backtrack::EventIndex;
use crate::collections::ref_store::RefVec;
use crate::core::literals::Disjunction;
use crate::core::Lit;
use crate::create_ref_type;

create_ref_type!(ClauseId);

/// A disjunction of literals, laid out for two-watched-literal propagation:
/// the two watches are inline fields and the remaining literals live in a
/// separate vector that is only touched when a watch must move.
#[derive(Clone)]
pub struct Clause {
    pub watch1: Lit,
    pub watch2: Lit,
    unwatched: Vec<Lit>,
}

impl Clause {
    /// Creates a clause from a non-empty simplified disjunction.
    pub fn new(clause: Disjunction) -> Self {
        let lits: Vec<Lit> = clause.into();
        match lits.len() {
            0 => panic!("empty clauses are conflicts, not storable clauses"),
            1 => Clause {
                watch1: lits[0],
                watch2: lits[0],
                unwatched: Vec::new(),
            },
            _ => {
                let mut lits = lits;
                let watch2 = lits.swap_remove(1);
                let watch1 = lits.swap_remove(0);
                Clause {
                    watch1,
                    watch2,
                    unwatched: lits,
                }
            }
        }
    }

    /// A placeholder clause that is always true, used for reclaimed slots.
    pub fn tautology() -> Clause {
        Clause {
            watch1: Lit::TRUE,
            watch2: Lit::TRUE,
            unwatched: Vec::new(),
        }
    }

    pub fn has_single_literal(&self) -> bool {
        self.watch1 == self.watch2 && self.unwatched.is_empty()
    }

    pub fn len(&self) -> usize {
        if self.has_single_literal() {
            1
        } else {
            2 + self.unwatched.len()
        }
    }

    pub fn literals(&self) -> impl Iterator<Item = Lit> + '_ {
        let singleton = self.has_single_literal();
        std::iter::once(self.watch1)
            .chain(std::iter::once(self.watch2).filter(move |_| !singleton))
            .chain(self.unwatched.iter().copied())
    }

    pub fn unwatched(&self) -> &[Lit] {
        &self.unwatched
    }

    pub fn swap_watches(&mut self) {
        std::mem::swap(&mut self.watch1, &mut self.watch2);
    }

    /// Makes the unwatched literal at `index` the second watch.
    pub fn set_watch2(&mut self, index: usize) {
        std::mem::swap(&mut self.watch2, &mut self.unwatched[index]);
    }

    /// Reorders the literals so that the two watches are the most relevant
    /// ones for propagation: unset literals first, then the ones set most
    /// recently.
    ///
    /// `value_of` gives the current truth value of a literal and
    /// `implying_event` the index of the event that set it (for set literals).
    pub fn move_watches_front(
        &mut self,
        value_of: impl Fn(Lit) -> Option<bool>,
        implying_event: impl Fn(Lit) -> Option<EventIndex>,
    ) {
        if self.has_single_literal() {
            return;
        }
        // priority of a literal as a watch: unset is best, then
        // satisfied/violated by decreasing recency
        let rank = |l: Lit| -> (u8, u64) {
            match value_of(l) {
                None => (2, 0),
                Some(true) => (1, implying_event(l).map(|e| u32::from(e) as u64).unwrap_or(0)),
                Some(false) => (0, implying_event(!l).map(|e| u32::from(e) as u64).unwrap_or(0)),
            }
        };
        // find the two best literals among all
        let mut all: Vec<Lit> = self.literals().collect();
        all.sort_by_key(|&l| std::cmp::Reverse(rank(l)));
        self.watch1 = all[0];
        self.watch2 = all[1];
        self.unwatched.clear();
        self.unwatched.extend_from_slice(&all[2..]);
    }
}

impl Display for Clause {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "({:?})", self.literals().format(" v "))
    }
}

impl Debug for Clause {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self}")
    }
}

/// Metadata of a stored clause.
#[derive(Copy, Clone, Default)]
struct ClauseMetadata {
    learnt: bool,
    /// Activity in clause-deletion heuristics; only meaningful for learnt clauses.
    activity: f64,
    /// A reclaimed slot, holding a tautology placeholder.
    dead: bool,
}

/// Parameters of the clause database.
#[derive(Clone)]
pub struct ClausesParams {
    cla_inc: f64,
    cla_decay: f64,
}
impl Default for ClausesParams {
    fn default() -> Self {
        ClausesParams {
            cla_inc: 1_f64,
            cla_decay: 0.999_f64,
        }
    }
}

/// Clause database: owns all clauses, tracks learnt-clause activities and
/// supports reclaiming the least active learnt clauses.
#[derive(Clone)]
pub struct ClauseDb {
    params: ClausesParams,
    /// Number of clauses that are not learnt.
    num_fixed: usize,
    /// Total number of live clauses.
    num_clauses: usize,
    clauses: RefVec<ClauseId, Clause>,
    metadata: RefVec<ClauseId, ClauseMetadata>,
}

impl ClauseDb {
    pub fn new(params: ClausesParams) -> ClauseDb {
        ClauseDb {
            params,
            num_fixed: 0,
            num_clauses: 0,
            clauses: RefVec::new(),
            metadata: RefVec::new(),
        }
    }

    pub fn add_clause(&mut self, cl: Clause, learnt: bool) -> ClauseId {
        self.num_clauses += 1;
        if !learnt {
            self.num_fixed += 1;
        }
        let id = self.clauses.push(cl);
        self.metadata.set_next(
            id,
            ClauseMetadata {
                learnt,
                activity: 0_f64,
                dead: false,
            },
        );
        id
    }

    pub fn num_clauses(&self) -> usize {
        self.num_clauses
    }

    pub fn num_learnt(&self) -> usize {
        self.num_clauses - self.num_fixed
    }

    pub fn is_learnt(&self, clause: ClauseId) -> bool {
        self.metadata[clause].learnt
    }

    pub fn is_dead(&self, clause: ClauseId) -> bool {
        self.metadata[clause].dead
    }

    pub fn all_clauses(&self) -> impl Iterator<Item = ClauseId> + '_ {
        self.clauses.keys().filter(move |&id| !self.metadata[id].dead)
    }

    pub fn bump_activity(&mut self, cl: ClauseId) {
        self.metadata[cl].activity += self.params.cla_inc;
        if self.metadata[cl].activity > 1e100_f64 {
            self.rescale_activities();
        }
    }

    pub fn decay_activities(&mut self) {
        self.params.cla_inc /= self.params.cla_decay;
    }

    fn rescale_activities(&mut self) {
        for id in self.clauses.keys() {
            self.metadata[id].activity *= 1e-100_f64;
        }
        self.params.cla_inc *= 1e-100_f64;
    }

    /// Reclaims roughly the least active half of the learnt clauses.
    /// `locked` clauses (currently justifying an assignment) are kept.
    /// Returns the identifiers of the removed clauses.
    pub fn reduce_db(&mut self, locked: impl Fn(ClauseId) -> bool, remove_watches: &mut impl FnMut(ClauseId, Lit, Lit)) {
        let mut removable: Vec<ClauseId> = self
            .clauses
            .keys()
            .filter(|&id| {
                let meta = self.metadata[id];
                meta.learnt && !meta.dead && !locked(id)
            })
            .collect();
        removable.sort_by(|&a, &b| {
            self.metadata[a]
                .activity
                .partial_cmp(&self.metadata[b].activity)
                .unwrap()
        });
        for &id in &removable[0..removable.len() / 2] {
            let clause = &self.clauses[id];
            remove_watches(id, !clause.watch1, !clause.watch2);
            self.clauses[id] = Clause::tautology();
            self.metadata[id].dead = true;
            self.num_clauses -= 1;
        }
    }
}

impl Index<ClauseId> for ClauseDb {
    type Output = Clause;
    fn index(&self, k: ClauseId) -> &Self::Output {
        &self.clauses[k]
    }
}
impl IndexMut<ClauseId> for ClauseDb {
    fn index_mut(&mut self, k: ClauseId) -> &mut Self::Output {
        &mut self.clauses[k]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::VarRef;

    #[test]
    fn clause_layout() {
        let a = VarRef::from_u32(1).geq(1);
        let b = VarRef::from_u32(2).geq(1);
        let c = VarRef::from_u32(3).geq(1);

        let unit = Clause::new(Disjunction::new(vec![a]));
        assert!(unit.has_single_literal());
        assert_eq!(unit.len(), 1);
        assert_eq!(unit.literals().collect::<Vec<_>>(), vec![a]);

        let ternary = Clause::new(Disjunction::new(vec![a, b, c]));
        assert_eq!(ternary.len(), 3);
        let mut lits = ternary.literals().collect::<Vec<_>>();
        lits.sort();
        let mut expected = vec![a, b, c];
        expected.sort();
        assert_eq!(lits, expected);
    }

    #[test]
    fn watch_selection_prefers_unset() {
        let a = VarRef::from_u32(1).geq(1);
        let b = VarRef::from_u32(2).geq(1);
        let c = VarRef::from_u32(3).geq(1);
        let mut clause = Clause::new(Disjunction::new(vec![a, b, c]));
        // `a` is false (set at event 0), `b` and `c` unset
        clause.move_watches_front(
            |l| if l == a { Some(false) } else { None },
            |l| if l == !a { Some(EventIndex::new(0)) } else { None },
        );
        assert_ne!(clause.watch1, a);
        assert_ne!(clause.watch2, a);
    }
}
