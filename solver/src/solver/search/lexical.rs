use crate::backtrack::{Backtrack, DecLvl};
use crate::core::state::Domains;
use crate::core::Lit;
use crate::solver::search::{Decision, SearchControl};
use crate::solver::stats::Stats;

/// Deterministic strategy: branch on the first unbound variable, trying its
/// minimal value first. Mostly useful for tests and for enumerating
/// assignments in a predictable order.
#[derive(Clone, Default)]
pub struct LexicalMinValue {
    lvl: DecLvl,
}

impl LexicalMinValue {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SearchControl for LexicalMinValue {
    fn next_decision(&mut self, _stats: &Stats, domains: &Domains) -> Option<Decision> {
        domains.variables().find_map(|v| {
            let (lb, ub) = domains.bounds(v);
            if lb < ub {
                Some(Decision::SetLiteral(Lit::leq(v, lb)))
            } else {
                None
            }
        })
    }

    fn clone_to_box(&self) -> Box<dyn SearchControl + Send> {
        Box::new(self.clone())
    }
}

impl Backtrack for LexicalMinValue {
    fn save_state(&mut self) -> DecLvl {
        self.lvl += 1;
        self.lvl
    }

    fn num_saved(&self) -> u32 {
        self.lvl.to_int()
    }

    fn restore_last(&mut self) {
        self.lvl -= 1;
    }
}
