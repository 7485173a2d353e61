//! Disjunctive resource propagation: no two present tasks may overlap.
//!
//! One propagation runs, in both time directions and until a local fixed
//! point: an overload check, detectable precedences (whose mirrored run is
//! the not-last rule) and edge-finding with grey tasks, plus an optional
//! externally-fed precedence pass. All passes are pure sweeps over the task
//! bounds extracted at entry, so explanations replay them on the snapshot in
//! which an inference was made.

mod theta_tree;

use itertools::Itertools;

use crate::core::state::{Cause, Domains, DomainsSnapshot, Explanation};
use crate::core::*;
use crate::reasoners::cp::disjunctive::theta_tree::{Activity, Color, ThetaLambdaTree};
use crate::reasoners::cp::{PriorityLevel, Propagator, PropagatorId, Watches};
use crate::reasoners::Contradiction;

/// A task of the resource: start, duration and end views plus a presence
/// literal ([`Lit::TRUE`] for mandatory tasks).
#[derive(Debug, Clone)]
pub struct Task {
    start: IAtom,
    duration: IAtom,
    end: IAtom,
    presence: Lit,
}

impl Task {
    pub fn new(start: impl Into<IAtom>, duration: impl Into<IAtom>, end: impl Into<IAtom>, presence: Lit) -> Self {
        Self {
            start: start.into(),
            duration: duration.into(),
            end: end.into(),
            presence,
        }
    }
}

/// Read access to bounds, abstracting over the live domains and a snapshot.
trait StateView {
    fn lb_of(&self, v: VarRef) -> IntCst;
    fn ub_of(&self, v: VarRef) -> IntCst;
    fn value_of(&self, l: Lit) -> Option<bool>;

    fn atom_lb(&self, a: IAtom) -> IntCst {
        self.lb_of(a.var) + a.shift
    }
    fn atom_ub(&self, a: IAtom) -> IntCst {
        self.ub_of(a.var) + a.shift
    }
}

impl StateView for Domains {
    fn lb_of(&self, v: VarRef) -> IntCst {
        self.lb(v)
    }
    fn ub_of(&self, v: VarRef) -> IntCst {
        self.ub(v)
    }
    fn value_of(&self, l: Lit) -> Option<bool> {
        self.value(l)
    }
}

impl StateView for DomainsSnapshot<'_> {
    fn lb_of(&self, v: VarRef) -> IntCst {
        self.lb(v)
    }
    fn ub_of(&self, v: VarRef) -> IntCst {
        self.ub(v)
    }
    fn value_of(&self, l: Lit) -> Option<bool> {
        self.value(l)
    }
}

/// Bounds of one task in the orientation of the current sweep.
#[derive(Copy, Clone, Debug)]
struct TaskView {
    est: IntCst,
    lst: IntCst,
    ect: IntCst,
    lct: IntCst,
    pmin: IntCst,
    present: Option<bool>,
}

/// A deduction made by one of the sweeps, in sweep orientation.
#[derive(Debug)]
enum DisjEvent {
    /// The `set` of present tasks cannot fit before its deadlines.
    Overload { set: Vec<usize>, est: IntCst, lct: IntCst },
    /// The optional `task` cannot be present: inserting it overloads `set`.
    ForceAbsent {
        task: usize,
        set: Vec<usize>,
        est: IntCst,
        lct: IntCst,
    },
    /// `task` must start after the tasks of `set` complete.
    PushStart {
        task: usize,
        new_est: IntCst,
        set: Vec<usize>,
        set_est: IntCst,
        /// Deadline that `set` must meet (edge-finding) or the task's own
        /// minimal end making the precedence detectable.
        threshold: IntCst,
        kind: PushKind,
    },
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum PushKind {
    DetectablePrecedence,
    EdgeFinding,
}

/// No two of the given tasks may overlap in time.
#[derive(Clone)]
pub struct Disjunctive {
    tasks: Vec<Task>,
    /// External precedence inputs: `target >= end of all tasks in the set`.
    /// Skipped when empty; filled by the host when a precedence module is
    /// available.
    precedences: Vec<(IAtom, Vec<usize>)>,
}

impl Disjunctive {
    pub fn new(tasks: impl IntoIterator<Item = Task>) -> Self {
        Self {
            tasks: tasks.into_iter().collect(),
            precedences: Vec::new(),
        }
    }

    /// Declares that `target` is at least the completion time of every task
    /// in `before` (indices into this constraint's task list).
    pub fn add_precedence(&mut self, target: IAtom, before: Vec<usize>) {
        self.precedences.push((target, before));
    }

    pub fn priority() -> PriorityLevel {
        PriorityLevel::Slow
    }

    fn views(&self, state: &impl StateView, mirror: bool) -> Vec<TaskView> {
        self.tasks
            .iter()
            .map(|t| {
                let (s_lb, s_ub) = (state.atom_lb(t.start), state.atom_ub(t.start));
                let (e_lb, e_ub) = (state.atom_lb(t.end), state.atom_ub(t.end));
                let pmin = state.atom_lb(t.duration);
                let present = state.value_of(t.presence);
                if mirror {
                    // reverse time: start <- -end, end <- -start
                    TaskView {
                        est: -e_ub,
                        lst: -e_lb,
                        ect: -s_ub,
                        lct: -s_lb,
                        pmin,
                        present,
                    }
                } else {
                    TaskView {
                        est: s_lb,
                        lst: s_ub,
                        ect: e_lb,
                        lct: e_ub,
                        pmin,
                        present,
                    }
                }
            })
            .collect()
    }

    // ----- literal builders mapping sweep-oriented facts back to the tasks -----

    fn est_lit(&self, task: usize, mirror: bool, value: IntCst) -> Lit {
        // sweep fact: start(task) >= value
        let t = &self.tasks[task];
        if mirror {
            t.end.le_lit(-value)
        } else {
            t.start.ge_lit(value)
        }
    }

    fn lct_lit(&self, task: usize, mirror: bool, value: IntCst) -> Lit {
        // sweep fact: end(task) <= value
        let t = &self.tasks[task];
        if mirror {
            t.start.ge_lit(-value)
        } else {
            t.end.le_lit(value)
        }
    }

    fn ect_lit(&self, task: usize, mirror: bool, value: IntCst) -> Lit {
        // sweep fact: end(task) >= value
        let t = &self.tasks[task];
        if mirror {
            t.start.le_lit(-value)
        } else {
            t.end.ge_lit(value)
        }
    }

    fn lst_lit(&self, task: usize, mirror: bool, value: IntCst) -> Lit {
        // sweep fact: start(task) <= value
        let t = &self.tasks[task];
        if mirror {
            t.end.ge_lit(-value)
        } else {
            t.start.le_lit(value)
        }
    }

    fn duration_lit(&self, task: usize, value: IntCst) -> Lit {
        self.tasks[task].duration.ge_lit(value)
    }

    // --------------------------------- sweeps ---------------------------------

    /// Overload check: inserting present tasks by increasing deadline, the
    /// earliest completion of the accumulated set may never exceed the
    /// deadline. Optional tasks whose insertion would overload the set are
    /// forced absent.
    fn overload_sweep(views: &[TaskView]) -> Vec<DisjEvent> {
        let mut events = Vec::new();
        let candidates: Vec<usize> = (0..views.len()).filter(|&t| views[t].present != Some(false)).collect();
        let activities = candidates
            .iter()
            .map(|&t| Activity::new(t, views[t].est, views[t].lct, views[t].pmin))
            .collect_vec();
        let mut tree = ThetaLambdaTree::init_empty(activities);

        // present tasks currently inserted, to restore the tree after a
        // minimization pass
        let mut inserted: Vec<usize> = Vec::new();
        for &t in candidates.iter().sorted_by_key(|&&t| views[t].lct) {
            let view = views[t];
            tree.insert(t);
            if tree.ect() > view.lct {
                // minimality makes the [est, lct] energy reason sound: in a
                // minimal overloaded set the critical chain is the whole set
                tree.minimize_overloaded_set();
                if view.present == Some(true) {
                    let set: Vec<usize> = tree.white_activities().map(|a| a.id).collect();
                    events.push(DisjEvent::Overload {
                        est: tree.est(),
                        lct: tree.lct(),
                        set,
                    });
                    return events;
                } else {
                    // optional task inside the critical window: force absent.
                    // the present tasks alone are not overloaded, so the
                    // minimized set still contains t
                    debug_assert!(tree.color(t) == Color::White);
                    let set: Vec<usize> = tree.white_activities().map(|a| a.id).filter(|&a| a != t).collect();
                    events.push(DisjEvent::ForceAbsent {
                        task: t,
                        est: tree.est(),
                        lct: tree.lct(),
                        set,
                    });
                    // restore the accumulated present tasks
                    tree.clear();
                    for &u in &inserted {
                        tree.insert(u);
                    }
                }
            } else if view.present == Some(true) {
                inserted.push(t);
            } else {
                // undecided tasks are not charged to the set
                tree.remove(t);
            }
        }
        events
    }

    /// Detectable precedences: every task that must end before `t` can start
    /// at `t`'s latest (its latest start precedes `t`'s earliest end) pushes
    /// `t` after the completion of the accumulated set.
    fn detectable_precedence_sweep(views: &[TaskView]) -> Vec<DisjEvent> {
        let mut events = Vec::new();
        let present: Vec<usize> = (0..views.len()).filter(|&t| views[t].present == Some(true)).collect();
        if present.len() < 2 {
            return events;
        }
        let activities = present
            .iter()
            .map(|&t| Activity::new(t, views[t].est, views[t].lct, views[t].pmin))
            .collect_vec();
        let mut tree = ThetaLambdaTree::init_empty(activities);

        let by_ect = present.iter().copied().sorted_by_key(|&t| views[t].ect).collect_vec();
        let by_lst = present.iter().copied().sorted_by_key(|&t| views[t].lst).collect_vec();
        let mut next_insert = 0;

        for &t in &by_ect {
            while next_insert < by_lst.len() && views[by_lst[next_insert]].lst < views[t].ect {
                tree.insert(by_lst[next_insert]);
                next_insert += 1;
            }
            let in_tree = tree.color(t) == Color::White;
            let bound = if in_tree { tree.ect_without(t) } else { tree.ect() };
            if bound > views[t].est {
                // premises: a minimal subset (excluding t) completing at `bound`
                if in_tree {
                    tree.remove(t);
                }
                tree.minimize_reaching_ect(bound);
                let set: Vec<usize> = tree.white_activities().map(|a| a.id).collect();
                let set_est = tree.est();
                events.push(DisjEvent::PushStart {
                    task: t,
                    new_est: bound,
                    set,
                    set_est,
                    threshold: views[t].ect,
                    kind: PushKind::DetectablePrecedence,
                });
                // restore the accumulated set
                tree.clear();
                for &u in &by_lst[..next_insert] {
                    tree.insert(u);
                }
            }
        }
        events
    }

    /// Edge-finding with grey tasks: tasks are greyed by decreasing deadline;
    /// whenever the optimistic completion (with at most one grey) exceeds the
    /// white deadline, the responsible grey must follow the whole white set.
    fn edge_finding_sweep(views: &[TaskView]) -> Vec<DisjEvent> {
        let mut events = Vec::new();
        let present: Vec<usize> = (0..views.len()).filter(|&t| views[t].present == Some(true)).collect();
        if present.len() < 2 {
            return events;
        }
        let activities = present
            .iter()
            .map(|&t| Activity::new(t, views[t].est, views[t].lct, views[t].pmin))
            .collect_vec();
        let mut tree = ThetaLambdaTree::init_empty(activities);
        for &t in &present {
            tree.insert(t);
        }
        let mut by_lct = present.iter().copied().sorted_by_key(|&t| std::cmp::Reverse(views[t].lct)).collect_vec();

        loop {
            let whites: Vec<usize> = by_lct.iter().copied().filter(|&t| tree.color(t) == Color::White).collect();
            if whites.len() <= 1 {
                break;
            }
            let window = whites.iter().map(|&t| views[t].lct).max().unwrap();
            if tree.ect() > window {
                tree.minimize_overloaded_set();
                let set: Vec<usize> = tree.white_activities().map(|a| a.id).collect();
                events.push(DisjEvent::Overload {
                    est: tree.est(),
                    lct: tree.lct(),
                    set,
                });
                return events;
            }
            while tree.ect_opt() > window {
                let Some(grey) = tree.responsible_ect() else { break };
                // the grey task must follow the critical suffix responsible
                // for the overflow; the suffix energy also justifies the push
                if let Some((set_est, set, bound)) = Self::critical_suffix(views, &whites, grey, window) {
                    if bound > views[grey].est {
                        events.push(DisjEvent::PushStart {
                            task: grey,
                            new_est: bound,
                            set,
                            set_est,
                            threshold: window,
                            kind: PushKind::EdgeFinding,
                        });
                    }
                }
                // the grey task is settled for this window
                tree.set_color(grey, Color::Out);
            }
            // grey the white task with the latest deadline
            let last = whites.iter().copied().max_by_key(|&t| views[t].lct).unwrap();
            tree.set_color(last, Color::Grey);
            by_lct.retain(|&t| tree.color(t) != Color::Out);
        }
        events
    }

    /// The energy-critical suffix that forces `grey` after a set of white
    /// tasks: among the suffixes (in est order) of `whites + grey`, the one
    /// whose energy `est + sum of durations` overflows `window` the most.
    ///
    /// Returns `(suffix est, white members, pushed bound)` where the bound is
    /// the completion time of the white members packed from the suffix est.
    fn critical_suffix(
        views: &[TaskView],
        whites: &[usize],
        grey: usize,
        window: IntCst,
    ) -> Option<(IntCst, Vec<usize>, IntCst)> {
        let grey_est = views[grey].est;
        let mut tasks: Vec<usize> = whites.to_vec();
        tasks.push(grey);
        tasks.sort_unstable_by_key(|&t| std::cmp::Reverse(views[t].est));

        let mut sum_p = 0;
        let mut best: Option<(IntCst, IntCst)> = None; // (suffix est, energy)
        for &u in &tasks {
            sum_p += views[u].pmin;
            // the suffix must contain the grey task for the deduction to
            // involve it
            if views[u].est <= grey_est {
                let energy = views[u].est + sum_p;
                if energy > window && best.map(|(_, e)| energy > e).unwrap_or(true) {
                    best = Some((views[u].est, energy));
                }
            }
        }
        let (set_est, _) = best?;
        let set: Vec<usize> = whites.iter().copied().filter(|&u| views[u].est >= set_est).collect();
        let bound = set_est + set.iter().map(|&u| views[u].pmin).sum::<IntCst>();
        Some((set_est, set, bound))
    }

    /// All sweeps of one orientation, in their fixed order.
    fn sweeps(views: &[TaskView]) -> Vec<DisjEvent> {
        let mut events = Self::overload_sweep(views);
        if matches!(events.last(), Some(DisjEvent::Overload { .. })) {
            return events;
        }
        events.extend(Self::detectable_precedence_sweep(views));
        events.extend(Self::edge_finding_sweep(views));
        events
    }

    /// Premises shared by all deductions: each task of the set must run
    /// within `[est, lct]`, be present, and keep its minimal duration.
    fn set_premises(
        &self,
        set: &[usize],
        views: &[TaskView],
        mirror: bool,
        est: IntCst,
        lct: IntCst,
        out: &mut Explanation,
    ) {
        for &u in set {
            if self.tasks[u].presence != Lit::TRUE {
                out.push(self.tasks[u].presence);
            }
            out.push(self.est_lit(u, mirror, est));
            out.push(self.lct_lit(u, mirror, lct));
            if views[u].pmin > 0 {
                out.push(self.duration_lit(u, views[u].pmin));
            }
        }
    }

    /// Premises of a [`DisjEvent::PushStart`] deduction.
    fn push_premises(&self, event: &DisjEvent, views: &[TaskView], mirror: bool, out: &mut Explanation) {
        let DisjEvent::PushStart {
            task,
            set,
            set_est,
            threshold,
            kind,
            ..
        } = event
        else {
            unreachable!()
        };
        match kind {
            PushKind::DetectablePrecedence => {
                // each set member must start before the task's earliest end
                for &u in set {
                    if self.tasks[u].presence != Lit::TRUE {
                        out.push(self.tasks[u].presence);
                    }
                    out.push(self.est_lit(u, mirror, *set_est));
                    out.push(self.lst_lit(u, mirror, views[u].lst));
                    if views[u].pmin > 0 {
                        out.push(self.duration_lit(u, views[u].pmin));
                    }
                }
                // the task's own earliest end makes the precedences detectable
                out.push(self.ect_lit(*task, mirror, *threshold));
            }
            PushKind::EdgeFinding => {
                // the set must fit before the window; together with the task
                // it does not
                self.set_premises(set, views, mirror, *set_est, *threshold, out);
                out.push(self.est_lit(*task, mirror, *set_est));
                if views[*task].pmin > 0 {
                    out.push(self.duration_lit(*task, views[*task].pmin));
                }
            }
        }
    }

    /// The literal asserted by a push event.
    fn conclusion(&self, event: &DisjEvent, mirror: bool) -> Lit {
        match event {
            DisjEvent::ForceAbsent { task, .. } => !self.tasks[*task].presence,
            DisjEvent::PushStart { task, new_est, .. } => self.est_lit(*task, mirror, *new_est),
            DisjEvent::Overload { .. } => unreachable!("overloads are reported eagerly"),
        }
    }

    fn apply_sweeps(&self, domains: &mut Domains, cause: Cause, mirror: bool) -> Result<bool, Contradiction> {
        let views = self.views(domains, mirror);
        let mut change = false;
        for event in Self::sweeps(&views) {
            match &event {
                DisjEvent::Overload { set, est, lct } => {
                    let mut explanation = Explanation::new();
                    self.set_premises(set, &views, mirror, *est, *lct, &mut explanation);
                    return Err(explanation.into());
                }
                DisjEvent::ForceAbsent { .. } | DisjEvent::PushStart { .. } => {
                    change |= domains.set(self.conclusion(&event, mirror), cause)?;
                }
            }
        }
        Ok(change)
    }

    /// The externally-fed precedence pass: a target expression must follow
    /// the completion of a set of tasks.
    fn apply_precedences(&self, domains: &mut Domains, cause: Cause) -> Result<bool, Contradiction> {
        let mut change = false;
        for (target, before) in &self.precedences {
            let views = self.views(domains, false);
            let set: Vec<usize> = before.iter().copied().filter(|&t| views[t].present == Some(true)).collect();
            if set.is_empty() {
                continue;
            }
            let activities = set
                .iter()
                .map(|&t| Activity::new(t, views[t].est, views[t].lct, views[t].pmin))
                .collect_vec();
            let mut tree = ThetaLambdaTree::init_empty(activities);
            for &t in &set {
                tree.insert(t);
            }
            let bound = tree.ect();
            if bound > domains.lb(target.var) + target.shift {
                change |= domains.set(target.ge_lit(bound), cause)?;
            }
        }
        Ok(change)
    }
}

impl Propagator for Disjunctive {
    fn setup(&mut self, id: PropagatorId, context: &mut Watches) {
        let mut vars = hashbrown::HashSet::with_capacity(64);
        for t in &self.tasks {
            let _ = vars.insert(t.start.var);
            let _ = vars.insert(t.duration.var);
            let _ = vars.insert(t.end.var);
            if t.presence != Lit::TRUE {
                let _ = vars.insert(t.presence.variable());
            }
        }
        for (target, _) in &self.precedences {
            let _ = vars.insert(target.var);
        }
        for var in vars {
            context.add_watch(var, id);
        }
    }

    fn propagate(&mut self, domains: &mut Domains, cause: Cause) -> Result<(), Contradiction> {
        loop {
            let mut change = self.apply_sweeps(domains, cause, false)?;
            change |= self.apply_sweeps(domains, cause, true)?;
            change |= self.apply_precedences(domains, cause)?;
            if !change {
                return Ok(());
            }
        }
    }

    fn explain(&self, literal: Lit, state: &DomainsSnapshot, out_explanation: &mut Explanation) {
        // replay both orientations on the snapshot and locate the deduction
        for mirror in [false, true] {
            let views = self.views(state, mirror);
            for event in Self::sweeps(&views) {
                match &event {
                    DisjEvent::Overload { .. } => break, // reported eagerly, never explained lazily
                    DisjEvent::ForceAbsent { set, est, lct, task } => {
                        if self.conclusion(&event, mirror).entails(literal) {
                            self.set_premises(set, &views, mirror, *est, *lct, out_explanation);
                            // the task's own bounds place it inside the window
                            out_explanation.push(self.est_lit(*task, mirror, *est));
                            out_explanation.push(self.lct_lit(*task, mirror, *lct));
                            if views[*task].pmin > 0 {
                                out_explanation.push(self.duration_lit(*task, views[*task].pmin));
                            }
                            return;
                        }
                    }
                    DisjEvent::PushStart { .. } => {
                        if self.conclusion(&event, mirror).entails(literal) {
                            self.push_premises(&event, &views, mirror, out_explanation);
                            return;
                        }
                    }
                }
            }
        }
        // the precedence pass
        for (target, before) in &self.precedences {
            let views = self.views(state, false);
            let set: Vec<usize> = before.iter().copied().filter(|&t| views[t].present == Some(true)).collect();
            if set.is_empty() {
                continue;
            }
            let activities = set
                .iter()
                .map(|&t| Activity::new(t, views[t].est, views[t].lct, views[t].pmin))
                .collect_vec();
            let mut tree = ThetaLambdaTree::init_empty(activities);
            for &t in &set {
                tree.insert(t);
            }
            let bound = tree.ect();
            if target.ge_lit(bound).entails(literal) {
                tree.minimize_reaching_ect(bound);
                let critical: Vec<usize> = tree.white_activities().map(|a| a.id).collect();
                let est = tree.est();
                for &u in &critical {
                    if self.tasks[u].presence != Lit::TRUE {
                        out_explanation.push(self.tasks[u].presence);
                    }
                    out_explanation.push(self.est_lit(u, false, est));
                    if views[u].pmin > 0 {
                        out_explanation.push(self.duration_lit(u, views[u].pmin));
                    }
                }
                return;
            }
        }
        panic!("asked to explain a deduction that the sweeps do not reproduce");
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

    /// A task with a fixed duration: start and end share the variable.
    fn fixed_duration_task(domains: &mut Domains, est: IntCst, lst: IntCst, duration: IntCst) -> (Task, VarRef) {
        let start = domains.new_var(est, lst);
        let task = Task::new(
            IAtom::from(start),
            IAtom::from(duration),
            IAtom::new(start, duration),
            Lit::TRUE,
        );
        (task, start)
    }

    #[test]
    fn overload_is_a_conflict() {
        // three tasks of duration 3 in the window [0, 7]
        let mut domains = Domains::new();
        let tasks: Vec<Task> = (0..3)
            .map(|_| fixed_duration_task(&mut domains, 0, 4, 3).0)
            .collect();
        let mut cp = Cp::new(ReasonerId::Cp);
        let _ = cp.add_propagator(Disjunctive::new(tasks), Disjunctive::priority());
        let result = cp.propagate(&mut domains);
        let Err(Contradiction::Explanation(explanation)) = result else {
            panic!("expected an overload conflict");
        };
        // the reason speaks about the three task windows and durations
        assert!(explanation.len() >= 6);
        let snapshot = DomainsSnapshot::current(&domains);
        for &l in explanation.literals() {
            assert!(snapshot.entails(l));
        }
    }

    #[test]
    fn two_tasks_fit_exactly() {
        let mut domains = Domains::new();
        let (t1, _) = fixed_duration_task(&mut domains, 0, 4, 3);
        let (t2, _) = fixed_duration_task(&mut domains, 0, 4, 3);
        let mut cp = Cp::new(ReasonerId::Cp);
        let _ = cp.add_propagator(Disjunctive::new(vec![t1, t2]), Disjunctive::priority());
        // [0, 7] fits the two tasks (in either order)
        cp.propagate(&mut domains).unwrap();
    }

    #[test]
    fn detectable_precedence_pushes_start() {
        let mut domains = Domains::new();
        // a: start in [0, 1], duration 5 => ends in [5, 6]
        let (a, _) = fixed_duration_task(&mut domains, 0, 1, 5);
        // b: start in [2, 20], duration 4: a must precede b
        let (b, b_start) = fixed_duration_task(&mut domains, 2, 20, 4);
        let mut cp = Cp::new(ReasonerId::Cp);
        let _ = cp.add_propagator(Disjunctive::new(vec![a, b]), Disjunctive::priority());
        cp.propagate(&mut domains).unwrap();
        // b cannot start before a completes
        assert_eq!(domains.lb(b_start), 5);
    }

    #[test]
    fn not_last_lowers_deadline() {
        let mut domains = Domains::new();
        // a: start in [4, 5], duration 4 => runs within [4, 9]
        let (a, _) = fixed_duration_task(&mut domains, 4, 5, 4);
        // b: start in [0, 6], duration 4 => would end by 10
        let (b, b_start) = fixed_duration_task(&mut domains, 0, 6, 4);
        let mut cp = Cp::new(ReasonerId::Cp);
        let _ = cp.add_propagator(Disjunctive::new(vec![a, b]), Disjunctive::priority());
        cp.propagate(&mut domains).unwrap();
        // b cannot run after a: starting after a's completion (>= 8) would
        // end past 10. So b ends before a starts: end <= 5, start <= 1
        assert_eq!(domains.ub(b_start), 1);
    }

    #[test]
    fn optional_task_forced_absent() {
        let mut domains = Domains::new();
        let (a, _) = fixed_duration_task(&mut domains, 0, 4, 3);
        let (b, _) = fixed_duration_task(&mut domains, 0, 4, 3);
        // optional c in the same tight window
        let prez = domains.new_var(0, 1).geq(1);
        let c_start = domains.new_var(0, 4);
        let c = Task::new(IAtom::from(c_start), IAtom::from(3), IAtom::new(c_start, 3), prez);
        let mut cp = Cp::new(ReasonerId::Cp);
        let _ = cp.add_propagator(Disjunctive::new(vec![a, b, c]), Disjunctive::priority());
        cp.propagate(&mut domains).unwrap();
        assert_eq!(domains.value(prez), Some(false));
    }

    #[test]
    fn pushes_are_explainable() {
        let mut domains = Domains::new();
        let (a, _) = fixed_duration_task(&mut domains, 0, 1, 5);
        let (b, b_start) = fixed_duration_task(&mut domains, 2, 20, 4);
        let mut prop = Disjunctive::new(vec![a, b]);
        let cause = Cause::inference(ReasonerId::Cp, 0u32);
        prop.propagate(&mut domains, cause).unwrap();
        assert_eq!(domains.lb(b_start), 5);

        let snapshot = DomainsSnapshot::preceding(&domains, b_start.geq(5));
        let mut expl = Explanation::new();
        prop.explain(b_start.geq(5), &snapshot, &mut expl);
        assert!(!expl.is_empty());
        for &l in expl.literals() {
            assert!(snapshot.entails(l), "{l:?} does not hold in the snapshot");
        }
    }

    #[test]
    fn external_precedence_raises_target() {
        let mut domains = Domains::new();
        let (a, _) = fixed_duration_task(&mut domains, 0, 0, 3);
        let (b, _) = fixed_duration_task(&mut domains, 0, 5, 2);
        let makespan = domains.new_var(0, 100);
        let mut constraint = Disjunctive::new(vec![a, b]);
        constraint.add_precedence(IAtom::from(makespan), vec![0, 1]);
        let mut cp = Cp::new(ReasonerId::Cp);
        let _ = cp.add_propagator(constraint, Disjunctive::priority());
        cp.propagate(&mut domains).unwrap();
        // both tasks must be finished by the makespan: 3 + 2 = 5
        assert_eq!(domains.lb(makespan), 5);
    }
}
