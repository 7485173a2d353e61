use crate::backtrack::EventIndex;
use crate::core::state::{Domains, Event};
use crate::core::*;

/// A read-only view of [`Domains`] as they were before a given event.
///
/// Used to hand explainers the state in which their inference was made:
/// bounds are reconstructed by walking the per-variable event chains past
/// the horizon, so no copying occurs.
pub struct DomainsSnapshot<'a> {
    doms: &'a Domains,
    /// Events at an index `>= horizon` are ignored. `None` means the present.
    horizon: Option<EventIndex>,
}

impl<'a> DomainsSnapshot<'a> {
    /// A snapshot of the current state.
    pub fn current(doms: &'a Domains) -> Self {
        DomainsSnapshot { doms, horizon: None }
    }

    /// A snapshot of the state immediately preceding the event that made
    /// `lit` true. If `lit` holds at the root, the view is the root state.
    pub fn preceding(doms: &'a Domains, lit: Lit) -> Self {
        DomainsSnapshot {
            horizon: doms.implying_event(lit),
            doms,
        }
    }

    /// A snapshot of the state immediately following the event `ev`.
    pub fn after(doms: &'a Domains, ev: EventIndex) -> Self {
        DomainsSnapshot {
            doms,
            horizon: Some(ev + 1),
        }
    }

    fn visible(&self, index: EventIndex) -> bool {
        match self.horizon {
            None => true,
            Some(h) => index < h,
        }
    }

    pub fn get_bound_value(&self, svar: SignedVar) -> UpperBound {
        let mut value = self.doms.doms.get_bound_value(svar);
        let mut cause = self.doms.doms.bounds_cause(svar);
        while let Some(loc) = cause {
            if self.visible(loc) {
                break;
            }
            let ev: &Event = self.doms.trail().get_event(loc);
            value = ev.previous.upper_bound;
            cause = ev.previous.cause;
        }
        value
    }

    pub fn ub(&self, var: impl Into<SignedVar>) -> IntCst {
        self.get_bound_value(var.into()).as_int()
    }

    pub fn lb(&self, var: impl Into<SignedVar>) -> IntCst {
        -self.get_bound_value(var.into().neg()).as_int()
    }

    pub fn bounds(&self, v: VarRef) -> (IntCst, IntCst) {
        (self.lb(v), self.ub(v))
    }

    pub fn entails(&self, lit: Lit) -> bool {
        self.get_bound_value(lit.svar()).stronger(lit.bound_value())
    }

    pub fn value(&self, lit: Lit) -> Option<bool> {
        if self.entails(lit) {
            Some(true)
        } else if self.entails(!lit) {
            Some(false)
        } else {
            None
        }
    }

    /// Index of the first visible event that made `lit` true, or `None` if it
    /// already held at the root.
    pub fn implying_event(&self, lit: Lit) -> Option<EventIndex> {
        debug_assert!(self.entails(lit));
        let mut cur = self.doms.doms.bounds_cause(lit.svar());
        while let Some(loc) = cur {
            let ev = self.doms.trail().get_event(loc);
            if self.visible(loc) && ev.makes_true(lit) {
                return Some(loc);
            }
            cur = ev.previous.cause;
        }
        None
    }

    pub fn get_event(&self, loc: EventIndex) -> &Event {
        debug_assert!(self.visible(loc));
        self.doms.trail().get_event(loc)
    }

    pub fn initial_domain(&self, var: VarRef) -> &Domain {
        self.doms.initial_domain(var)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backtrack::Backtrack;
    use crate::core::state::Cause;

    #[test]
    fn snapshot_sees_past_bounds() {
        let mut doms = Domains::new();
        let x = doms.new_var(0, 10);
        let _ = doms.save_state();
        assert_eq!(doms.set_lb(x, 3, Cause::Decision), Ok(true));
        assert_eq!(doms.set_lb(x, 6, Cause::Decision), Ok(true));

        let now = DomainsSnapshot::current(&doms);
        assert_eq!(now.lb(x), 6);

        // before [x >= 6] was set, the bound was 3
        let before = DomainsSnapshot::preceding(&doms, x.geq(6));
        assert_eq!(before.lb(x), 3);
        assert!(before.entails(x.geq(3)));
        assert!(!before.entails(x.geq(4)));

        // before [x >= 1], nothing had happened yet
        let at_root = DomainsSnapshot::preceding(&doms, x.geq(1));
        assert_eq!(at_root.lb(x), 0);
        assert_eq!(at_root.ub(x), 10);
    }
}
