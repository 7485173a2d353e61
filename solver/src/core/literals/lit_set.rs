use crate::collections::ref_store::RefMap;
use crate::core::*;

/// A set of literals, where a literal is considered present if an inserted
/// literal entails it.
///
/// Internally, only the strongest inserted bound of each signed variable is
/// retained.
#[derive(Clone, Default)]
pub struct LitSet {
    strongest: RefMap<SignedVar, UpperBound>,
}

impl LitSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, lit: Lit) {
        match self.strongest.get(lit.svar()) {
            Some(prev) if prev.stronger(lit.bound_value()) => {}
            _ => self.strongest.insert(lit.svar(), lit.bound_value()),
        }
    }

    /// True if an inserted literal entails `lit`.
    pub fn contains(&self, lit: Lit) -> bool {
        match self.strongest.get(lit.svar()) {
            Some(bound) => bound.stronger(lit.bound_value()),
            None => false,
        }
    }

    /// Iterates over the strongest inserted literal of each signed variable.
    pub fn literals(&self) -> impl Iterator<Item = Lit> + '_ {
        self.strongest.entries().map(|(svar, &ub)| Lit::from_parts(svar, ub))
    }
}

impl std::fmt::Debug for LitSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.literals()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entailed_literals_are_contained() {
        let v = VarRef::from_u32(1);
        let mut set = LitSet::new();
        set.insert(v.leq(3));
        assert!(set.contains(v.leq(3)));
        assert!(set.contains(v.leq(4)));
        assert!(!set.contains(v.leq(2)));
        assert!(!set.contains(v.geq(0)));
        // a weaker insertion does not erase the stronger bound
        set.insert(v.leq(5));
        assert!(set.contains(v.leq(3)));
    }
}
