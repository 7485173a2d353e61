use crate::collections::ref_store::{Ref, RefMap};

/// Location of a declared key: either its slot in the heap array or, when it
/// is out of the queue, its retained priority.
#[derive(Clone, Debug, PartialEq)]
enum Entry<P> {
    In(usize),
    Out(P),
}

#[derive(Copy, Clone)]
struct HeapEntry<K, P> {
    key: K,
    prio: P,
}

/// An indexed binary max-heap: each declared key has a priority and can be
/// enqueued, extracted and re-prioritized in logarithmic time.
///
/// Keys keep their priority while out of the queue, so that re-enqueueing
/// after a backtrack restores the previous ordering.
#[derive(Clone)]
pub struct IdxHeap<K, P> {
    heap: Vec<HeapEntry<K, P>>,
    index: RefMap<K, Entry<P>>,
}

impl<K: Ref, P: PartialOrd + Copy> Default for IdxHeap<K, P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Ref, P: PartialOrd + Copy> IdxHeap<K, P> {
    pub fn new() -> Self {
        IdxHeap {
            heap: Vec::new(),
            index: Default::default(),
        }
    }

    /// Records a new key with the given priority. The key is NOT enqueued.
    pub fn declare_element(&mut self, key: K, priority: P) {
        assert!(!self.index.contains(key));
        self.index.insert(key, Entry::Out(priority));
    }

    pub fn is_declared(&self, key: K) -> bool {
        self.index.contains(key)
    }

    pub fn is_enqueued(&self, key: K) -> bool {
        debug_assert!(self.is_declared(key));
        matches!(self.index[key], Entry::In(_))
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    pub fn peek(&self) -> Option<&K> {
        self.heap.first().map(|e| &e.key)
    }

    pub fn priority(&self, k: K) -> P {
        match self.index[k] {
            Entry::In(place) => self.heap[place].prio,
            Entry::Out(p) => p,
        }
    }

    pub fn enqueue(&mut self, key: K) {
        debug_assert!(self.is_declared(key));
        match self.index[key] {
            Entry::In(_) => {} // already present
            Entry::Out(prio) => {
                let place = self.heap.len();
                self.heap.push(HeapEntry { key, prio });
                self.index.insert(key, Entry::In(place));
                self.sift_up(place);
            }
        }
    }

    pub fn pop(&mut self) -> Option<K> {
        if self.heap.is_empty() {
            return None;
        }
        let last = self.heap.len() - 1;
        self.swap(0, last);
        let entry = self.heap.pop().unwrap();
        self.index.insert(entry.key, Entry::Out(entry.prio));
        if !self.heap.is_empty() {
            self.sift_down(0);
        }
        Some(entry.key)
    }

    pub fn change_priority(&mut self, key: K, f: impl Fn(&mut P)) {
        match self.index[key] {
            Entry::In(place) => {
                f(&mut self.heap[place].prio);
                self.sift_up(place);
                self.sift_down(place);
            }
            Entry::Out(ref mut p) => f(p),
        }
    }

    /// Rescales the priority of every key in place. Correct only if the
    /// update preserves the relative order of any two priorities.
    pub fn change_all_priorities_in_place(&mut self, f: impl Fn(&mut P)) {
        for entry in self.index.values_mut() {
            if let Entry::Out(p) = entry {
                f(p);
            }
        }
        for e in &mut self.heap {
            f(&mut e.prio);
        }
    }

    fn swap(&mut self, a: usize, b: usize) {
        if a != b {
            self.heap.swap(a, b);
            self.index.insert(self.heap[a].key, Entry::In(a));
            self.index.insert(self.heap[b].key, Entry::In(b));
        }
    }

    fn sift_up(&mut self, mut place: usize) {
        while place > 0 {
            let parent = (place - 1) >> 1;
            if self.heap[place].prio > self.heap[parent].prio {
                self.swap(place, parent);
                place = parent;
            } else {
                break;
            }
        }
    }

    fn sift_down(&mut self, mut place: usize) {
        let len = self.heap.len();
        loop {
            let left = 2 * place + 1;
            if left >= len {
                break;
            }
            let right = left + 1;
            let mut best = left;
            if right < len && self.heap[right].prio > self.heap[left].prio {
                best = right;
            }
            if self.heap[best].prio > self.heap[place].prio {
                self.swap(place, best);
                place = best;
            } else {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::prelude::*;
    use rand::rngs::SmallRng;

    #[test]
    fn extraction_is_ordered() {
        let mut rng = SmallRng::seed_from_u64(0xC0FFEE);
        let mut heap: IdxHeap<usize, i64> = IdxHeap::new();
        let mut prios = Vec::new();
        for i in 0..200usize {
            let p = rng.gen_range(-1000..1000);
            prios.push(p);
            heap.declare_element(i, p);
            heap.enqueue(i);
        }
        let mut previous = i64::MAX;
        let mut popped = Vec::new();
        while let Some(k) = heap.pop() {
            let p = heap.priority(k);
            assert_eq!(p, prios[k]);
            assert!(p <= previous);
            previous = p;
            popped.push(k);
        }
        assert_eq!(popped.len(), 200);
    }

    #[test]
    fn priorities_survive_extraction() {
        let mut heap: IdxHeap<usize, i64> = IdxHeap::new();
        heap.declare_element(0, 10);
        heap.declare_element(1, 20);
        heap.enqueue(0);
        heap.enqueue(1);
        assert_eq!(heap.pop(), Some(1));
        // priority is retained while out of the queue
        assert_eq!(heap.priority(1), 20);
        heap.change_priority(0, |p| *p += 100);
        heap.enqueue(1);
        assert_eq!(heap.pop(), Some(0));
    }
}
