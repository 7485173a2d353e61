use std::cmp::Ordering;
use std::marker::PhantomData;
use std::num::NonZeroU32;

use crate::backtrack::Backtrack;

/// A decision level. The ROOT level is the one where no decision has been
/// taken yet; each decision or assumption opens a new level.
///
/// Internally the representation disallows zero so that `Option<DecLvl>`
/// fits in 32 bits.
#[derive(Copy, Clone, Ord, PartialOrd, PartialEq, Eq, Hash)]
pub struct DecLvl(NonZeroU32);

impl DecLvl {
    pub const ROOT: DecLvl = Self::new(0);

    pub const fn new(num_saved: u32) -> Self {
        unsafe { DecLvl(NonZeroU32::new_unchecked(num_saved + 1)) }
    }

    /// Integer representation, 0 being the ROOT.
    pub fn to_int(self) -> u32 {
        self.0.get() - 1
    }
}

impl Default for DecLvl {
    fn default() -> Self {
        Self::ROOT
    }
}

impl std::ops::Add<i32> for DecLvl {
    type Output = DecLvl;

    #[inline]
    fn add(self, rhs: i32) -> Self::Output {
        Self::new(((self.to_int() as i32) + rhs) as u32)
    }
}
impl std::ops::AddAssign<i32> for DecLvl {
    fn add_assign(&mut self, rhs: i32) {
        *self = *self + rhs;
    }
}
impl std::ops::Sub<i32> for DecLvl {
    type Output = DecLvl;

    #[inline]
    fn sub(self, rhs: i32) -> Self::Output {
        self + (-rhs)
    }
}
impl std::ops::SubAssign<i32> for DecLvl {
    fn sub_assign(&mut self, rhs: i32) {
        *self = *self - rhs;
    }
}

impl From<u32> for DecLvl {
    fn from(u: u32) -> Self {
        DecLvl::new(u)
    }
}
impl From<usize> for DecLvl {
    fn from(u: usize) -> Self {
        DecLvl::new(u as u32)
    }
}
impl From<DecLvl> for usize {
    fn from(dl: DecLvl) -> Self {
        dl.to_int() as usize
    }
}

impl std::fmt::Debug for DecLvl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "dl({})", self.to_int())
    }
}

/// Index of an event in an [`ObsTrail`]. Uses the same non-zero layout trick
/// as [`DecLvl`] so that `Option<EventIndex>` is 4 bytes.
#[derive(Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Hash, Debug)]
pub struct EventIndex(NonZeroU32);

impl EventIndex {
    pub fn new(index: usize) -> Self {
        unsafe { EventIndex(NonZeroU32::new_unchecked(index as u32 + 1)) }
    }
}
impl From<EventIndex> for usize {
    fn from(ei: EventIndex) -> Self {
        (ei.0.get() - 1) as usize
    }
}
impl From<usize> for EventIndex {
    fn from(u: usize) -> Self {
        Self::new(u)
    }
}
impl From<EventIndex> for u32 {
    fn from(ei: EventIndex) -> Self {
        ei.0.get() - 1
    }
}
impl From<u32> for EventIndex {
    fn from(u: u32) -> Self {
        unsafe { EventIndex(NonZeroU32::new_unchecked(u + 1)) }
    }
}

impl<T> std::ops::Index<EventIndex> for Vec<T> {
    type Output = T;

    fn index(&self, index: EventIndex) -> &Self::Output {
        &self[usize::from(index)]
    }
}

/// Classifies the decision level of an event relative to the current state.
pub enum DecisionLevelClass {
    Root,
    Current,
    Intermediate,
}

#[derive(Copy, Clone, Debug)]
struct LastBacktrack {
    next_read: EventIndex,
    id: u64,
}

/// An event trail with save points that can be observed by independent
/// cursors: each reasoner keeps its own [`ObsTrailCursor`] and processes
/// events at its own pace, including across backtracks.
#[derive(Clone, Debug)]
pub struct ObsTrail<V> {
    events: Vec<V>,
    /// First event of each decision level.
    backtrack_points: Vec<EventIndex>,
    last_backtrack: Option<LastBacktrack>,
}

impl<V> Default for ObsTrail<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> ObsTrail<V> {
    pub fn new() -> Self {
        ObsTrail {
            events: Vec::new(),
            backtrack_points: Vec::new(),
            last_backtrack: None,
        }
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn num_events(&self) -> u32 {
        self.len() as u32
    }

    /// Index that the next pushed event will receive.
    pub fn next_slot(&self) -> EventIndex {
        EventIndex::new(self.events.len())
    }

    pub fn push(&mut self, value: V) -> EventIndex {
        let id = self.next_slot();
        self.events.push(value);
        id
    }

    pub fn pop(&mut self) -> Option<V> {
        self.events.pop()
    }

    pub fn peek(&self) -> Option<&V> {
        self.events.last()
    }

    pub fn get_event(&self, id: EventIndex) -> &V {
        &self.events[id]
    }

    /// All events in chronological order.
    pub fn events(&self) -> &[V] {
        &self.events
    }

    /// Creates a new cursor positioned before the first event.
    pub fn reader(&self) -> ObsTrailCursor<V> {
        ObsTrailCursor::new()
    }

    pub fn current_decision_level(&self) -> DecLvl {
        DecLvl::new(self.backtrack_points.len() as u32)
    }

    /// Decision level at which the event at `id` was pushed.
    pub fn decision_level(&self, id: EventIndex) -> DecLvl {
        let idx = self.backtrack_points.partition_point(|ev| *ev <= id);
        DecLvl::from(idx)
    }

    pub fn decision_level_class(&self, id: EventIndex) -> DecisionLevelClass {
        if let Some(&first_event_of_current_level) = self.backtrack_points.last() {
            if id >= first_event_of_current_level {
                DecisionLevelClass::Current
            } else if id < self.backtrack_points[0] {
                DecisionLevelClass::Root
            } else {
                DecisionLevelClass::Intermediate
            }
        } else {
            DecisionLevelClass::Root
        }
    }

    fn backtrack_with_callback(&mut self, mut f: impl FnMut(&V)) {
        let after_last = self.backtrack_points.pop().expect("No backup point left");
        let id = usize::from(after_last);
        for ev in self.events[id..].iter().rev() {
            f(ev);
        }
        self.events.truncate(id);
        let bt_id = self.last_backtrack.as_ref().map_or(0, |bt| bt.id + 1);
        self.last_backtrack = Some(LastBacktrack {
            next_read: after_last,
            id: bt_id,
        });
    }

    pub fn restore_last_with(&mut self, f: impl FnMut(&V)) {
        self.backtrack_with_callback(f);
    }
}

impl<V> Backtrack for ObsTrail<V> {
    fn save_state(&mut self) -> DecLvl {
        self.backtrack_points.push(self.next_slot());
        self.current_decision_level()
    }

    fn num_saved(&self) -> u32 {
        self.backtrack_points.len() as u32
    }

    fn restore_last(&mut self) {
        self.backtrack_with_callback(|_| ());
    }
}

/// A reading head into an [`ObsTrail`]. Never invalidated: it transparently
/// resynchronizes after the trail backtracked below its position.
#[derive(Clone)]
pub struct ObsTrailCursor<V> {
    next_read: EventIndex,
    last_backtrack: Option<u64>,
    _phantom: PhantomData<V>,
}

impl<V> Default for ObsTrailCursor<V> {
    fn default() -> Self {
        ObsTrailCursor::new()
    }
}

impl<V> ObsTrailCursor<V> {
    pub fn new() -> Self {
        ObsTrailCursor {
            next_read: EventIndex::from(0u32),
            last_backtrack: None,
            _phantom: PhantomData,
        }
    }

    fn sync_backtrack(&mut self, queue: &ObsTrail<V>) {
        if let Some(bt) = &queue.last_backtrack {
            if self.last_backtrack != Some(bt.id) {
                if self.next_read > bt.next_read {
                    self.next_read = bt.next_read;
                }
                self.last_backtrack = Some(bt.id);
            }
        }
        debug_assert!(self.next_read <= queue.next_slot());
    }

    pub fn num_pending(&mut self, queue: &ObsTrail<V>) -> usize {
        self.sync_backtrack(queue);
        queue.events.len() - usize::from(self.next_read)
    }

    pub fn pop<'q>(&mut self, queue: &'q ObsTrail<V>) -> Option<&'q V> {
        self.sync_backtrack(queue);
        let next = self.next_read;
        if next < queue.next_slot() {
            self.next_read = next + 1;
            Some(&queue.events[next])
        } else {
            None
        }
    }

    pub fn move_to_end(&mut self, queue: &ObsTrail<V>) {
        self.sync_backtrack(queue);
        self.next_read = queue.next_slot();
    }
}

impl std::ops::Add<u32> for EventIndex {
    type Output = EventIndex;

    fn add(self, rhs: u32) -> Self::Output {
        EventIndex::from(u32::from(self) + rhs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cursors_follow_backtracks() {
        let mut q = ObsTrail::new();
        let _ = q.push(1);
        let _ = q.push(2);
        let _ = q.save_state();
        let _ = q.push(3);

        let mut r = q.reader();
        assert_eq!(r.pop(&q), Some(&1));
        assert_eq!(r.pop(&q), Some(&2));
        assert_eq!(r.pop(&q), Some(&3));
        assert_eq!(r.pop(&q), None);

        let mut behind = q.reader();
        assert_eq!(behind.pop(&q), Some(&1));
        q.restore_last();
        // the front cursor is rewound past the removed event
        assert_eq!(r.pop(&q), None);
        // the trailing cursor is unaffected
        assert_eq!(behind.pop(&q), Some(&2));
        assert_eq!(behind.pop(&q), None);

        let _ = q.push(4);
        assert_eq!(r.pop(&q), Some(&4));
        assert_eq!(behind.pop(&q), Some(&4));
    }

    #[test]
    fn decision_levels_of_events() {
        let mut trail = ObsTrail::new();
        assert_eq!(trail.current_decision_level(), DecLvl::ROOT);
        let a = trail.push("a");
        let _ = trail.save_state();
        let b = trail.push("b");
        let _ = trail.save_state();
        let _ = trail.save_state();
        let c = trail.push("c");

        assert_eq!(trail.decision_level(a), DecLvl::ROOT);
        assert_eq!(trail.decision_level(b), DecLvl::new(1));
        assert_eq!(trail.decision_level(c), DecLvl::new(3));
        assert!(matches!(trail.decision_level_class(a), DecisionLevelClass::Root));
        assert!(matches!(trail.decision_level_class(b), DecisionLevelClass::Intermediate));
        assert!(matches!(trail.decision_level_class(c), DecisionLevelClass::Current));
    }
}
