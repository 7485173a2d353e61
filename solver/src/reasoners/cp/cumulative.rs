//! Horizontally elastic overload checking for cumulative resources.
//!
//! Pure infeasibility detection: tasks draw a constant demand from a shared
//! capacity, and for every deadline window the checker sweeps the demand
//! profile, carrying any energy that exceeds the effective capacity. Energy
//! still pending at the end of the window proves the window infeasible.
//!
//! The deduced bound is deliberately conservative; callers should only rely
//! on infeasibility being detected monotonically (a tighter state can only
//! detect more).

use itertools::Itertools;

use crate::core::state::{Cause, Domains, DomainsSnapshot, Explanation};
use crate::core::*;
use crate::reasoners::cp::{PriorityLevel, Propagator, PropagatorId, Watches};
use crate::reasoners::Contradiction;

/// A task of the cumulative resource.
#[derive(Debug, Clone)]
pub struct CumulTask {
    start: IAtom,
    duration: IAtom,
    end: IAtom,
    demand: IAtom,
    presence: Lit,
}

impl CumulTask {
    pub fn new(
        start: impl Into<IAtom>,
        duration: impl Into<IAtom>,
        end: impl Into<IAtom>,
        demand: impl Into<IAtom>,
        presence: Lit,
    ) -> Self {
        CumulTask {
            start: start.into(),
            duration: duration.into(),
            end: end.into(),
            demand: demand.into(),
            presence,
        }
    }
}

/// Category of a task relative to the window under scrutiny.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum TaskKind {
    /// Must complete within the window.
    Full,
    /// Its mandatory part intersects the window but the task extends past it.
    FixedPart,
    /// No forced contribution to the window.
    Ignore,
}

#[derive(Copy, Clone, Debug)]
struct CumulView {
    est: IntCst,
    lst: IntCst,
    ect: IntCst,
    lct: IntCst,
    pmin: IntCst,
    demand: IntCst,
    present: bool,
}

/// Detects overloads of a capacitated resource with the horizontally
/// elastic relaxation.
#[derive(Clone)]
pub struct HorizontallyElasticOverloadChecker {
    tasks: Vec<CumulTask>,
    capacity: IAtom,
}

impl HorizontallyElasticOverloadChecker {
    pub fn new(tasks: impl IntoIterator<Item = CumulTask>, capacity: impl Into<IAtom>) -> Self {
        HorizontallyElasticOverloadChecker {
            tasks: tasks.into_iter().collect(),
            capacity: capacity.into(),
        }
    }

    pub fn priority() -> PriorityLevel {
        PriorityLevel::Slow
    }

    fn views(&self, domains: &Domains) -> Vec<CumulView> {
        self.tasks
            .iter()
            .map(|t| {
                let est = domains.lb(t.start.var) + t.start.shift;
                let lst = domains.ub(t.start.var) + t.start.shift;
                let ect = domains.lb(t.end.var) + t.end.shift;
                let lct = domains.ub(t.end.var) + t.end.shift;
                CumulView {
                    est,
                    lst,
                    ect,
                    lct,
                    pmin: domains.lb(t.duration.var) + t.duration.shift,
                    demand: domains.lb(t.demand.var) + t.demand.shift,
                    present: domains.value(t.presence) == Some(true),
                }
            })
            .collect()
    }

    fn kind(view: &CumulView, window: IntCst) -> TaskKind {
        if !view.present || view.demand <= 0 || view.pmin <= 0 {
            return TaskKind::Ignore;
        }
        if view.lct <= window {
            TaskKind::Full
        } else if view.lst < view.ect && view.lst < window {
            // a mandatory part [lst, min(ect, window)) lies inside the window
            TaskKind::FixedPart
        } else {
            TaskKind::Ignore
        }
    }

    /// Sweeps the demand profile of the window `(-inf, window]` and returns
    /// true if the tasks provably do not fit under `capacity`.
    ///
    /// Two profiles are maintained along the time axis: the demand required
    /// if every contribution sits at its earliest possible position
    /// (`demand_req`) and the maximal demand that could possibly be placed
    /// (`demand_max`). Energy required above the effective capacity
    /// `min(demand_max, capacity)` is carried as `overload` and drained by
    /// later slack; energy left at the window end cannot be placed at all.
    fn window_overloaded(views: &[CumulView], window: IntCst, capacity: IntCst) -> bool {
        let kinds: Vec<TaskKind> = views.iter().map(|v| Self::kind(v, window)).collect();

        let mut time_points: Vec<IntCst> = Vec::new();
        for (v, &k) in views.iter().zip(&kinds) {
            match k {
                TaskKind::Full => {
                    time_points.extend([v.est, v.ect, v.lct.min(window)]);
                }
                TaskKind::FixedPart => {
                    time_points.extend([v.lst, v.ect.min(window)]);
                }
                TaskKind::Ignore => {}
            }
        }
        if time_points.is_empty() {
            return false;
        }
        time_points.push(window);
        time_points.sort_unstable();
        time_points.dedup();

        let mut overload: LongCst = 0;
        for (&t1, &t2) in time_points.iter().tuple_windows() {
            if t1 >= window {
                break;
            }
            let t2 = t2.min(window);
            let length = cst_int_to_long(t2 - t1);
            let mut demand_req: LongCst = 0;
            let mut demand_max: LongCst = 0;
            for (v, &k) in views.iter().zip(&kinds) {
                match k {
                    TaskKind::Full => {
                        // body assumed at its earliest position
                        if v.est <= t1 && t1 < v.ect {
                            demand_req += cst_int_to_long(v.demand);
                        }
                        if v.est <= t1 && t1 < v.lct.min(window) {
                            demand_max += cst_int_to_long(v.demand);
                        }
                    }
                    TaskKind::FixedPart => {
                        // only the mandatory part, cut at the window
                        if v.lst <= t1 && t1 < v.ect.min(window) {
                            demand_req += cst_int_to_long(v.demand);
                            demand_max += cst_int_to_long(v.demand);
                        }
                    }
                    TaskKind::Ignore => {}
                }
            }
            let effective_capacity = demand_max.min(cst_int_to_long(capacity));
            if demand_req > effective_capacity {
                overload += (demand_req - effective_capacity) * length;
            } else {
                let slack = effective_capacity - demand_req;
                overload -= (slack * length).min(overload);
            }
        }
        overload > 0
    }

    /// The premises of an overloaded window.
    fn window_premises(&self, views: &[CumulView], window: IntCst, capacity: IntCst, out: &mut Explanation) {
        for (i, v) in views.iter().enumerate() {
            let task = &self.tasks[i];
            match Self::kind(v, window) {
                TaskKind::Full => {
                    if task.presence != Lit::TRUE {
                        out.push(task.presence);
                    }
                    out.push(task.start.ge_lit(v.est));
                    out.push(task.end.le_lit(v.lct));
                    out.push(task.duration.ge_lit(v.pmin));
                    out.push(task.demand.ge_lit(v.demand));
                }
                TaskKind::FixedPart => {
                    if task.presence != Lit::TRUE {
                        out.push(task.presence);
                    }
                    out.push(task.end.ge_lit(v.ect));
                    out.push(task.start.le_lit(v.lst));
                    out.push(task.duration.ge_lit(v.pmin));
                    out.push(task.demand.ge_lit(v.demand));
                }
                TaskKind::Ignore => {}
            }
        }
        out.push(self.capacity.le_lit(capacity));
    }
}

impl Propagator for HorizontallyElasticOverloadChecker {
    fn setup(&mut self, id: PropagatorId, context: &mut Watches) {
        let mut vars = hashbrown::HashSet::with_capacity(64);
        for t in &self.tasks {
            let _ = vars.insert(t.start.var);
            let _ = vars.insert(t.duration.var);
            let _ = vars.insert(t.end.var);
            let _ = vars.insert(t.demand.var);
            if t.presence != Lit::TRUE {
                let _ = vars.insert(t.presence.variable());
            }
        }
        let _ = vars.insert(self.capacity.var);
        for var in vars {
            context.add_watch(var, id);
        }
    }

    fn propagate(&mut self, domains: &mut Domains, _cause: Cause) -> Result<(), Contradiction> {
        let views = self.views(domains);
        let capacity = domains.ub(self.capacity.var) + self.capacity.shift;

        // one scheduling attempt per deadline, in increasing order
        let windows: Vec<IntCst> = views
            .iter()
            .filter(|v| v.present)
            .map(|v| v.lct)
            .sorted()
            .dedup()
            .collect();
        for window in windows {
            if Self::window_overloaded(&views, window, capacity) {
                let mut explanation = Explanation::new();
                self.window_premises(&views, window, capacity, &mut explanation);
                return Err(explanation.into());
            }
        }
        Ok(())
    }

    fn explain(&self, _literal: Lit, _state: &DomainsSnapshot, _out_explanation: &mut Explanation) {
        // the checker only reports conflicts, eagerly explained
        unreachable!()
    }

    fn clone_box(&self) -> Box<dyn Propagator> {
        Box::new(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backtrack::Backtrack;
    use crate::reasoners::cp::Cp;
    use crate::reasoners::{ReasonerId, Theory};

    fn task(domains: &mut Domains, est: IntCst, lst: IntCst, duration: IntCst, demand: IntCst) -> CumulTask {
        let start = domains.new_var(est, lst);
        CumulTask::new(
            IAtom::from(start),
            IAtom::from(duration),
            IAtom::new(start, duration),
            IAtom::from(demand),
            Lit::TRUE,
        )
    }

    #[test]
    fn energy_overload_is_detected() {
        // three unit-demand tasks of duration 3 in [0, 7] under capacity 1:
        // 9 units of energy in a window of 7
        let mut domains = Domains::new();
        let tasks: Vec<CumulTask> = (0..3).map(|_| task(&mut domains, 0, 4, 3, 1)).collect();
        let checker = HorizontallyElasticOverloadChecker::new(tasks, IAtom::from(1));
        let mut cp = Cp::new(ReasonerId::Cp);
        let _ = cp.add_propagator(checker, HorizontallyElasticOverloadChecker::priority());
        assert!(cp.propagate(&mut domains).is_err());
    }

    #[test]
    fn fitting_profile_is_accepted() {
        // same tasks under capacity 2: 9 units, room for 14
        let mut domains = Domains::new();
        let tasks: Vec<CumulTask> = (0..3).map(|_| task(&mut domains, 0, 4, 3, 1)).collect();
        let checker = HorizontallyElasticOverloadChecker::new(tasks, IAtom::from(2));
        let mut cp = Cp::new(ReasonerId::Cp);
        let _ = cp.add_propagator(checker, HorizontallyElasticOverloadChecker::priority());
        cp.propagate(&mut domains).unwrap();
    }

    #[test]
    fn detection_is_monotone_in_the_bounds() {
        // two tasks of demand 2, duration 2, under capacity 2: they fit one
        // after the other while starts range over [0, 2]
        let mut domains = Domains::new();
        let starts: Vec<VarRef> = (0..2).map(|_| domains.new_var(0, 2)).collect();
        let tasks: Vec<CumulTask> = starts
            .iter()
            .map(|&s| CumulTask::new(IAtom::from(s), IAtom::from(2), IAtom::new(s, 2), IAtom::from(2), Lit::TRUE))
            .collect();
        let checker = HorizontallyElasticOverloadChecker::new(tasks, IAtom::from(2));
        let mut cp = Cp::new(ReasonerId::Cp);
        let _ = cp.add_propagator(checker, HorizontallyElasticOverloadChecker::priority());
        cp.propagate(&mut domains).unwrap();

        // squeezing both starts into [0, 1] forces overlapping mandatory
        // parts: the tighter state must be detected infeasible
        let _ = domains.save_state();
        let _ = cp.save_state();
        for &s in &starts {
            domains.decide(s.leq(1)).unwrap();
        }
        assert!(cp.propagate(&mut domains).is_err());
    }

    #[test]
    fn mandatory_parts_conflict() {
        // both tasks pinned to [0, 2) with demand 2 and capacity 3
        let mut domains = Domains::new();
        let t1 = task(&mut domains, 0, 0, 2, 2);
        let t2 = task(&mut domains, 0, 0, 2, 2);
        let checker = HorizontallyElasticOverloadChecker::new(vec![t1, t2], IAtom::from(3));
        let mut cp = Cp::new(ReasonerId::Cp);
        let _ = cp.add_propagator(checker, HorizontallyElasticOverloadChecker::priority());
        assert!(cp.propagate(&mut domains).is_err());
    }

    #[test]
    fn absent_tasks_do_not_contribute() {
        let mut domains = Domains::new();
        let prez = domains.new_var(0, 1).geq(1);
        let s1 = domains.new_var(0, 0);
        let t1 = CumulTask::new(IAtom::from(s1), IAtom::from(2), IAtom::new(s1, 2), IAtom::from(2), prez);
        let t2 = task(&mut domains, 0, 0, 2, 2);
        let checker = HorizontallyElasticOverloadChecker::new(vec![t1, t2], IAtom::from(3));
        let mut cp = Cp::new(ReasonerId::Cp);
        let _ = cp.add_propagator(checker.clone(), HorizontallyElasticOverloadChecker::priority());
        // t1's presence is unknown: no forced overload
        cp.propagate(&mut domains).unwrap();

        let _ = domains.save_state();
        let _ = cp.save_state();
        domains.decide(prez).unwrap();
        assert!(cp.propagate(&mut domains).is_err());
    }
}
