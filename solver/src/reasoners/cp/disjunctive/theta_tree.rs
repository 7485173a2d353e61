use std::ops::{Index, IndexMut, Range};

use itertools::Itertools;

use crate::core::IntCst;

pub(super) type ActivityId = usize;

/// Time horizon used as the neutral earliest completion time.
pub(super) const NO_ECT: IntCst = IntCst::MIN / 4;

/// An activity as seen by the tree: earliest start, latest completion and
/// minimal processing time.
#[derive(Default, Debug, Copy, Clone)]
pub(super) struct Activity {
    pub id: ActivityId,
    pub est: IntCst,
    pub lct: IntCst,
    pub p: IntCst,
}

impl Activity {
    pub fn new(id: ActivityId, est: IntCst, lct: IntCst, p: IntCst) -> Self {
        Activity { id, est, lct, p }
    }
}

/// State of an activity within the tree.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(super) enum Color {
    /// Not taken into account at all.
    Out,
    /// Regular member of the set Theta.
    White,
    /// Grey activity: contributes to the optimistic envelope only, which
    /// considers at most one grey member (the Lambda set of edge-finding).
    Grey,
}

/// A node of the balanced tree: earliest completion time and total duration
/// of the white activities below it, plus the same quantities allowing at
/// most one grey activity, with the responsible grey tracked for extraction.
#[derive(Copy, Clone, Debug, PartialEq)]
struct ThetaLambdaNode {
    sum_p: IntCst,
    ect: IntCst,
    sum_p_opt: IntCst,
    ect_opt: IntCst,
    /// Grey activity responsible for `sum_p_opt`.
    resp_p: Option<ActivityId>,
    /// Grey activity responsible for `ect_opt`.
    resp_ect: Option<ActivityId>,
}

impl Default for ThetaLambdaNode {
    fn default() -> Self {
        ThetaLambdaNode {
            sum_p: 0,
            ect: NO_ECT,
            sum_p_opt: 0,
            ect_opt: NO_ECT,
            resp_p: None,
            resp_ect: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct Node(usize);

impl Node {
    const ROOT: Node = Node(0);

    fn parent(self) -> Self {
        Node((self.0 - 1) / 2)
    }
    fn left_child(self) -> Self {
        Node(self.0 * 2 + 1)
    }
    fn right_child(self) -> Self {
        Node(self.0 * 2 + 2)
    }
}

/// A theta-lambda tree over a fixed set of activities, sorted by earliest
/// start time so that each subtree covers a time-contiguous slice.
///
/// Supports the three queries of the disjunctive passes:
/// earliest completion time of the white set, the same with at most one grey
/// activity, and the grey activity responsible for the optimistic value.
#[derive(Debug)]
pub(super) struct ThetaLambdaTree {
    /// Activities sorted by est; leaf `i` hosts `activities[i]`.
    activities: Vec<Activity>,
    /// Position of each activity id in `activities`.
    position: Vec<usize>,
    colors: Vec<Color>,
    tree: Vec<ThetaLambdaNode>,
    capacity: usize,
}

impl ThetaLambdaTree {
    /// Builds an empty tree: all activities start [`Color::Out`].
    pub fn init_empty(mut activities: Vec<Activity>) -> Self {
        activities.sort_unstable_by_key(|a| a.est);
        let num = activities.len().max(1);
        let capacity = num.next_power_of_two();
        let tree = vec![ThetaLambdaNode::default(); capacity * 2 - 1];
        let max_id = activities.iter().map(|a| a.id).max().unwrap_or(0);
        let mut position = vec![usize::MAX; max_id + 1];
        for (pos, a) in activities.iter().enumerate() {
            position[a.id] = pos;
        }
        let colors = vec![Color::Out; max_id + 1];
        ThetaLambdaTree {
            activities,
            position,
            colors,
            tree,
            capacity,
        }
    }

    pub fn clear(&mut self) {
        for n in &mut self.tree {
            *n = ThetaLambdaNode::default();
        }
        for c in &mut self.colors {
            *c = Color::Out;
        }
    }

    pub fn color(&self, activity: ActivityId) -> Color {
        self.colors[activity]
    }

    pub fn tasks(&self) -> Range<usize> {
        0..self.activities.len()
    }

    /// Activities currently in the white set.
    pub fn white_activities(&self) -> impl Iterator<Item = &Activity> + '_ {
        self.activities.iter().filter(|a| self.colors[a.id] == Color::White)
    }

    fn leaf_of(&self, activity: ActivityId) -> Node {
        Node(self.capacity - 1 + self.position[activity])
    }

    pub fn set_color(&mut self, activity: ActivityId, color: Color) {
        self.colors[activity] = color;
        let node = self.leaf_of(activity);
        let a = self.activities[self.position[activity]];
        self[node] = match color {
            Color::Out => ThetaLambdaNode::default(),
            Color::White => ThetaLambdaNode {
                sum_p: a.p,
                ect: a.est + a.p,
                sum_p_opt: a.p,
                ect_opt: a.est + a.p,
                resp_p: None,
                resp_ect: None,
            },
            Color::Grey => ThetaLambdaNode {
                sum_p: 0,
                ect: NO_ECT,
                sum_p_opt: a.p,
                ect_opt: a.est + a.p,
                resp_p: Some(a.id),
                resp_ect: Some(a.id),
            },
        };
        self.propagate_update(node);
    }

    pub fn insert(&mut self, activity: ActivityId) {
        self.set_color(activity, Color::White);
    }

    pub fn remove(&mut self, activity: ActivityId) {
        self.set_color(activity, Color::Out);
    }

    fn propagate_update(&mut self, mut node: Node) {
        while node != Node::ROOT {
            node = node.parent();
            self.recompute(node);
        }
    }

    fn recompute(&mut self, n: Node) {
        let left = self[n.left_child()];
        let right = self[n.right_child()];
        let sum_p = left.sum_p + right.sum_p;
        let ect = IntCst::max(right.ect, left.ect + right.sum_p);

        // optimistic duration: the one grey activity sits on either side
        let (sum_p_opt, resp_p) = if left.sum_p_opt + right.sum_p >= left.sum_p + right.sum_p_opt {
            (left.sum_p_opt + right.sum_p, left.resp_p)
        } else {
            (left.sum_p + right.sum_p_opt, right.resp_p)
        };

        // optimistic ect: grey in the right ect, in the right durations, or
        // in the left ect
        let mut ect_opt = right.ect_opt;
        let mut resp_ect = right.resp_ect;
        if left.ect + right.sum_p_opt > ect_opt {
            ect_opt = left.ect + right.sum_p_opt;
            resp_ect = right.resp_p;
        }
        if left.ect_opt + right.sum_p > ect_opt {
            ect_opt = left.ect_opt + right.sum_p;
            resp_ect = left.resp_ect;
        }

        self[n] = ThetaLambdaNode {
            sum_p,
            ect,
            sum_p_opt,
            ect_opt,
            resp_p,
            resp_ect,
        };
    }

    /// Earliest completion time of the white activities.
    pub fn ect(&self) -> IntCst {
        self.tree[0].ect
    }

    /// Earliest completion time allowing at most one grey activity.
    pub fn ect_opt(&self) -> IntCst {
        self.tree[0].ect_opt
    }

    /// The grey activity responsible for [`Self::ect_opt`].
    pub fn responsible_ect(&self) -> Option<ActivityId> {
        self.tree[0].resp_ect
    }

    /// Earliest completion time of the white set without `activity`.
    /// The tree is left unchanged.
    pub fn ect_without(&mut self, activity: ActivityId) -> IntCst {
        if self.colors[activity] != Color::White {
            return self.ect();
        }
        self.set_color(activity, Color::Out);
        let result = self.ect();
        self.set_color(activity, Color::White);
        result
    }

    /// Latest completion time of the white activities. O(n).
    pub fn lct(&self) -> IntCst {
        self.white_activities().map(|a| a.lct).max().unwrap_or(NO_ECT)
    }

    /// Earliest start time of the white activities. O(n).
    pub fn est(&self) -> IntCst {
        self.white_activities().map(|a| a.est).min().unwrap_or(-NO_ECT)
    }

    /// True if the white set provably cannot fit before its latest deadline.
    pub fn is_overloaded(&self) -> bool {
        self.ect() > self.lct()
    }

    /// On an overloaded tree, removes white activities until the remaining
    /// ones form a minimal overloaded set.
    pub fn minimize_overloaded_set(&mut self) {
        debug_assert!(self.is_overloaded());
        for task in self.tasks() {
            let id = self.activities[task].id;
            if self.colors[id] != Color::White {
                continue;
            }
            self.remove(id);
            if !self.is_overloaded() {
                self.insert(id);
            }
        }
        debug_assert!(self.is_overloaded());
    }

    /// Shrinks the white set to a minimal one whose ect is at least `target`.
    pub fn minimize_reaching_ect(&mut self, target: IntCst) {
        debug_assert!(self.ect() >= target);
        for task in self.tasks() {
            let id = self.activities[task].id;
            if self.colors[id] != Color::White {
                continue;
            }
            self.remove(id);
            if self.ect() < target {
                self.insert(id);
            }
        }
        debug_assert!(self.ect() >= target);
    }

    /// Inserts white activities in increasing lct order until an overload
    /// appears. Returns true if one does, with the tree containing the
    /// overloaded set.
    pub fn find_overloaded_subset(&mut self) -> bool {
        self.clear();
        let order = self.tasks().sorted_by_key(|&t| self.activities[t].lct).collect_vec();
        for t in order {
            let a = self.activities[t];
            self.insert(a.id);
            if self.ect() > a.lct {
                debug_assert!(self.is_overloaded());
                return true;
            }
        }
        false
    }
}

impl Index<Node> for ThetaLambdaTree {
    type Output = ThetaLambdaNode;

    fn index(&self, index: Node) -> &Self::Output {
        &self.tree[index.0]
    }
}
impl IndexMut<Node> for ThetaLambdaTree {
    fn index_mut(&mut self, index: Node) -> &mut Self::Output {
        &mut self.tree[index.0]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ect_of_sequences() {
        // a: [0, 10] p=5 ; b: [4, 20] p=6
        let mut tt = ThetaLambdaTree::init_empty(vec![Activity::new(0, 0, 10, 5), Activity::new(1, 4, 20, 6)]);
        tt.insert(0);
        assert_eq!(tt.ect(), 5);
        tt.insert(1);
        // b cannot start before 4, a pushes it to 11
        assert_eq!(tt.ect(), 11);
        tt.remove(0);
        assert_eq!(tt.ect(), 10);
    }

    #[test]
    fn overload_detection() {
        let overloaded = vec![
            vec![
                Activity::new(2, 30, 35, 4),
                Activity::new(1, 35, 41, 6),
                Activity::new(3, 32, 47, 10),
            ],
            vec![
                Activity::new(0, 0, 6, 5),
                Activity::new(2, 30, 35, 4),
                Activity::new(1, 5, 40, 6),
                Activity::new(3, 32, 43, 10),
            ],
        ];
        let fitting = vec![
            vec![
                Activity::new(2, 30, 35, 4),
                Activity::new(1, 5, 40, 6),
                Activity::new(3, 32, 50, 10),
            ],
            vec![
                Activity::new(0, 0, 6, 5),
                Activity::new(2, 30, 35, 4),
                Activity::new(1, 5, 40, 6),
                Activity::new(3, 32, 47, 10),
            ],
        ];

        for acts in overloaded {
            let mut tt = ThetaLambdaTree::init_empty(acts);
            assert!(tt.find_overloaded_subset());
            tt.minimize_overloaded_set();
            assert!(tt.is_overloaded());
        }
        for acts in fitting {
            let mut tt = ThetaLambdaTree::init_empty(acts);
            assert!(!tt.find_overloaded_subset());
        }
    }

    #[test]
    fn grey_envelope_and_responsibility() {
        // two whites in [0, 10], one grey that would overflow the window
        let mut tt = ThetaLambdaTree::init_empty(vec![
            Activity::new(0, 0, 10, 4),
            Activity::new(1, 0, 10, 4),
            Activity::new(2, 0, 20, 5),
        ]);
        tt.insert(0);
        tt.insert(1);
        tt.set_color(2, Color::Grey);
        assert_eq!(tt.ect(), 8);
        assert_eq!(tt.ect_opt(), 13);
        assert_eq!(tt.responsible_ect(), Some(2));
    }
}
