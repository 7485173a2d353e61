use crate::collections::ref_store::RefVec;
use crate::core::*;

/// Watches registered on the bounds of a single signed variable.
/// Each watch fires for any event at least as strong as its guard.
#[derive(Clone, Debug)]
pub struct WatchSet<Watcher> {
    watches: Vec<Watch<Watcher>>,
}

impl<Watcher> WatchSet<Watcher> {
    pub fn new() -> Self {
        WatchSet { watches: Vec::new() }
    }

    pub fn add_watch(&mut self, watcher: Watcher, literal: Lit) {
        self.watches.push(Watch {
            watcher,
            guard: literal.bound_value(),
        });
    }

    pub fn clear(&mut self) {
        self.watches.clear();
    }

    /// Removes the single watch of `watcher` from this set.
    /// Panics if there is not exactly one.
    pub fn remove_watch(&mut self, watcher: Watcher)
    where
        Watcher: Eq,
    {
        let index = self.watches.iter().position(|w| w.watcher == watcher).unwrap();
        let _ = self.watches.swap_remove(index);
        debug_assert!(self.watches.iter().all(|w| w.watcher != watcher));
    }

    pub fn is_watched_by(&self, watcher: Watcher, literal: Lit) -> bool
    where
        Watcher: Eq,
    {
        self.watches
            .iter()
            .any(|w| w.watcher == watcher && literal.bound_value().stronger(w.guard))
    }

    pub fn watches_on(&self, literal: Lit) -> impl Iterator<Item = Watcher> + '_
    where
        Watcher: Copy,
    {
        self.watches.iter().filter_map(move |w| {
            if literal.bound_value().stronger(w.guard) {
                Some(w.watcher)
            } else {
                None
            }
        })
    }

    pub fn all_watches(&self) -> impl Iterator<Item = &Watch<Watcher>> + '_ {
        self.watches.iter()
    }

    /// Moves all watches triggered by `literal` from this set into `out`.
    pub fn move_watches_to(&mut self, literal: Lit, out: &mut WatchSet<Watcher>) {
        let mut i = 0;
        while i < self.watches.len() {
            if literal.bound_value().stronger(self.watches[i].guard) {
                let w = self.watches.swap_remove(i);
                out.watches.push(w);
            } else {
                i += 1;
            }
        }
    }
}

impl<Watcher> Default for WatchSet<Watcher> {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Copy, Clone, Debug)]
pub struct Watch<Watcher> {
    pub watcher: Watcher,
    guard: UpperBound,
}

impl<Watcher> Watch<Watcher> {
    pub fn to_lit(&self, var_bound: SignedVar) -> Lit {
        Lit::from_parts(var_bound, self.guard)
    }
}

/// Watch registry, functionally a `Map<Lit, Set<Watcher>>` where lookup
/// returns the watchers of every literal entailed by the queried one.
#[derive(Clone, Debug)]
pub struct Watches<Watcher> {
    watches: RefVec<SignedVar, WatchSet<Watcher>>,
    empty_watch_set: WatchSet<Watcher>,
}

impl<Watcher> Watches<Watcher> {
    pub fn new() -> Self {
        Watches {
            watches: Default::default(),
            empty_watch_set: WatchSet::new(),
        }
    }

    fn ensure_capacity(&mut self, var: SignedVar) {
        while !self.watches.contains(var) {
            let _ = self.watches.push(WatchSet::new());
        }
    }

    pub fn add_watch(&mut self, watcher: Watcher, literal: Lit) {
        self.ensure_capacity(literal.svar());
        self.watches[literal.svar()].add_watch(watcher, literal);
    }

    pub fn is_watched_by(&self, literal: Lit, watcher: Watcher) -> bool
    where
        Watcher: Eq,
    {
        if self.watches.contains(literal.svar()) {
            self.watches[literal.svar()].is_watched_by(watcher, literal)
        } else {
            false
        }
    }

    pub fn remove_watch(&mut self, watcher: Watcher, literal: Lit)
    where
        Watcher: Eq,
    {
        self.ensure_capacity(literal.svar());
        self.watches[literal.svar()].remove_watch(watcher);
    }

    /// The watchers triggered by `literal` becoming true.
    /// `(n <= 4)` triggers the watches on `(n <= 4)`, `(n <= 5)`, ...
    pub fn watches_on(&self, literal: Lit) -> impl Iterator<Item = Watcher> + '_
    where
        Watcher: Copy,
    {
        let set = if self.watches.contains(literal.svar()) {
            &self.watches[literal.svar()]
        } else {
            &self.empty_watch_set
        };
        set.watches_on(literal)
    }

    pub fn move_watches_to(&mut self, literal: Lit, out: &mut WatchSet<Watcher>) {
        if self.watches.contains(literal.svar()) {
            self.watches[literal.svar()].move_watches_to(literal, out);
        }
    }
}

impl<Watcher> Default for Watches<Watcher> {
    fn default() -> Self {
        Watches::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn watches_trigger_on_entailed_literals() {
        let a = VarRef::from_u32(1);
        let b = VarRef::from_u32(2);
        let watches = &mut Watches::new();

        watches.add_watch(1, Lit::leq(a, 1));
        watches.add_watch(2, Lit::leq(a, 2));
        watches.add_watch(3, Lit::geq(a, 3));

        let on = |watches: &Watches<i32>, lit: Lit| {
            let mut r: Vec<i32> = watches.watches_on(lit).collect();
            r.sort_unstable();
            r
        };
        assert_eq!(on(watches, Lit::leq(a, 0)), vec![1, 2]);
        assert_eq!(on(watches, Lit::leq(a, 2)), vec![2]);
        assert_eq!(on(watches, Lit::leq(a, 3)), Vec::<i32>::new());
        assert_eq!(on(watches, Lit::geq(a, 4)), vec![3]);
        assert_eq!(on(watches, Lit::geq(a, 2)), Vec::<i32>::new());
        assert_eq!(on(watches, Lit::leq(b, 0)), Vec::<i32>::new());

        watches.remove_watch(2, Lit::leq(a, 2));
        assert_eq!(on(watches, Lit::leq(a, 0)), vec![1]);
    }
}
