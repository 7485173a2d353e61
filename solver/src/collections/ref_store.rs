use std::fmt::{Debug, Formatter};
use std::hash::Hash;
use std::iter::FromIterator;
use std::marker::PhantomData;
use std::ops::{Index, IndexMut};

use itertools::Itertools;

/// Trait for keys that are convertible to/from a dense unsigned integer.
pub trait Ref: Into<usize> + From<usize> + Copy + PartialEq {}

impl<X> Ref for X where X: Into<usize> + From<usize> + Copy + PartialEq {}

/// Declares a new index type: a `NonZeroU32` newtype usable as a key in the
/// dense collections of this module and as an index into a `Vec`.
#[macro_export]
macro_rules! create_ref_type {
    ($type_name:ident) => {
        #[derive(PartialEq, Eq, PartialOrd, Ord, Clone, Copy, Hash)]
        pub struct $type_name(std::num::NonZeroU32);

        impl $type_name {
            pub const fn to_u32(self) -> u32 {
                self.0.get() - 1
            }
            pub const fn from_u32(u: u32) -> Self {
                unsafe { $type_name(std::num::NonZeroU32::new_unchecked(u + 1)) }
            }
        }
        impl From<usize> for $type_name {
            fn from(u: usize) -> Self {
                Self::from_u32(u as u32)
            }
        }
        impl From<$type_name> for usize {
            fn from(v: $type_name) -> Self {
                (v.0.get() - 1) as usize
            }
        }
        impl From<u32> for $type_name {
            fn from(u: u32) -> Self {
                Self::from_u32(u)
            }
        }
        impl From<$type_name> for u32 {
            fn from(v: $type_name) -> Self {
                v.0.get() - 1
            }
        }

        impl<V> std::ops::Index<$type_name> for Vec<V> {
            type Output = V;

            fn index(&self, index: $type_name) -> &Self::Output {
                &self[usize::from(index)]
            }
        }

        impl<V> std::ops::IndexMut<$type_name> for Vec<V> {
            fn index_mut(&mut self, index: $type_name) -> &mut Self::Output {
                &mut self[usize::from(index)]
            }
        }
    };
}

/// A growable dense vector indexed by a [`Ref`] key.
///
/// Every key in `0..len` is associated to a value.
#[derive(Clone)]
pub struct RefVec<K, V> {
    values: Vec<V>,
    phantom: PhantomData<K>,
}

impl<K, V> Default for RefVec<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V: Debug> Debug for RefVec<K, V> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", &self.values)
    }
}

impl<K, V> RefVec<K, V> {
    pub fn new() -> Self {
        RefVec {
            values: Vec::new(),
            phantom: PhantomData,
        }
    }

    pub fn with_values(num_items: usize, value: V) -> Self
    where
        V: Clone,
    {
        RefVec {
            values: vec![value; num_items],
            phantom: PhantomData,
        }
    }

    pub fn contains(&self, k: K) -> bool
    where
        K: Into<usize>,
    {
        k.into() < self.len()
    }

    /// Extends the vector with generated values until `to_key` is a valid key.
    pub fn fill_with(&mut self, to_key: K, value_gen: impl Fn() -> V)
    where
        K: Ref,
    {
        let to_index: usize = to_key.into();
        while self.len() <= to_index {
            let _ = self.push(value_gen());
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn push(&mut self, value: V) -> K
    where
        K: From<usize>,
    {
        self.values.push(value);
        K::from(self.values.len() - 1)
    }

    /// Same as push but panics if `expected_key` is not the key assigned by the push.
    pub fn set_next(&mut self, expected_key: K, value: V)
    where
        K: From<usize> + PartialEq,
    {
        let actual = self.push(value);
        assert!(expected_key == actual);
    }

    /// The key that the next `push` will assign.
    pub fn next_key(&self) -> K
    where
        K: From<usize>,
    {
        K::from(self.values.len())
    }

    pub fn keys(&self) -> impl Iterator<Item = K>
    where
        K: From<usize>,
    {
        (0..self.values.len()).map(K::from)
    }

    pub fn values(&self) -> impl Iterator<Item = &V> {
        self.values.iter()
    }

    pub fn entries(&self) -> impl Iterator<Item = (K, &V)>
    where
        K: From<usize>,
    {
        self.values.iter().enumerate().map(|(i, v)| (K::from(i), v))
    }
}

impl<K: Into<usize>, V> Index<K> for RefVec<K, V> {
    type Output = V;

    fn index(&self, index: K) -> &Self::Output {
        &self.values[index.into()]
    }
}

impl<K: Into<usize>, V> IndexMut<K> for RefVec<K, V> {
    fn index_mut(&mut self, index: K) -> &mut Self::Output {
        &mut self.values[index.into()]
    }
}

/// A partial map from a dense key to values, implemented as a vector of options.
#[derive(Clone)]
pub struct RefMap<K, V> {
    pub(crate) entries: Vec<Option<V>>,
    phantom: PhantomData<K>,
}

impl<K, V> Default for RefMap<K, V> {
    fn default() -> Self {
        RefMap {
            entries: Vec::new(),
            phantom: PhantomData,
        }
    }
}

impl<K: Ref, V> RefMap<K, V> {
    pub fn insert(&mut self, k: K, v: V) {
        let index = k.into();
        while self.entries.len() <= index {
            self.entries.push(None);
        }
        self.entries[index] = Some(v);
    }

    pub fn remove(&mut self, k: K) {
        let index = k.into();
        if index < self.entries.len() {
            self.entries[index] = None;
        }
    }

    pub fn contains(&self, k: K) -> bool {
        let index = k.into();
        index < self.entries.len() && self.entries[index].is_some()
    }

    pub fn get(&self, k: K) -> Option<&V> {
        let index = k.into();
        self.entries.get(index).and_then(|v| v.as_ref())
    }

    pub fn get_mut(&mut self, k: K) -> Option<&mut V> {
        let index = k.into();
        self.entries.get_mut(index).and_then(|v| v.as_mut())
    }

    pub fn get_or_insert(&mut self, k: K, default: impl FnOnce() -> V) -> &V {
        if !self.contains(k) {
            self.insert(k, default());
        }
        &self[k]
    }

    pub fn get_mut_or_insert(&mut self, k: K, default: impl FnOnce() -> V) -> &mut V {
        if !self.contains(k) {
            self.insert(k, default());
        }
        &mut self[k]
    }

    /// Iteration over all present entries.
    /// Linear in the size of the key space: use [`IterableRefMap`] on hot paths.
    pub fn entries(&self) -> impl Iterator<Item = (K, &V)> {
        self.entries
            .iter()
            .enumerate()
            .filter_map(|(i, v)| v.as_ref().map(|v| (K::from(i), v)))
    }

    pub fn keys(&self) -> impl Iterator<Item = K> + '_ {
        self.entries().map(|(k, _)| k)
    }

    pub fn values_mut(&mut self) -> impl Iterator<Item = &mut V> {
        self.entries.iter_mut().filter_map(|v| v.as_mut())
    }
}

impl<K: Ref, V> Index<K> for RefMap<K, V> {
    type Output = V;

    fn index(&self, index: K) -> &Self::Output {
        self.get(index).expect("No such key")
    }
}

impl<K: Ref, V> IndexMut<K> for RefMap<K, V> {
    fn index_mut(&mut self, index: K) -> &mut Self::Output {
        self.get_mut(index).expect("No such key")
    }
}

impl<K: Ref, V> FromIterator<(K, V)> for RefMap<K, V> {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut m = RefMap::default();
        for (k, v) in iter {
            m.insert(k, v);
        }
        m
    }
}

impl<K: Ref + Debug, V: Debug> Debug for RefMap<K, V> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{:?}]", self.entries().map(|(k, v)| format!("{k:?} -> {v:?}")).format(", "))
    }
}

/// A [`RefMap`] that additionally keeps the list of present keys, making
/// iteration and clearing proportional to the number of entries.
#[derive(Clone)]
pub struct IterableRefMap<K, V> {
    map: RefMap<K, V>,
    keys: Vec<K>,
}

impl<K, V> Default for IterableRefMap<K, V> {
    fn default() -> Self {
        Self {
            map: Default::default(),
            keys: Default::default(),
        }
    }
}

impl<K: Ref, V> IterableRefMap<K, V> {
    pub fn insert(&mut self, k: K, v: V) {
        if !self.map.contains(k) {
            self.keys.push(k);
        }
        self.map.insert(k, v);
    }

    pub fn clear(&mut self) {
        for k in self.keys.drain(..) {
            self.map.remove(k);
        }
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn contains(&self, k: K) -> bool {
        self.map.contains(k)
    }

    pub fn get(&self, k: K) -> Option<&V> {
        self.map.get(k)
    }

    pub fn get_mut(&mut self, k: K) -> Option<&mut V> {
        self.map.get_mut(k)
    }

    pub fn get_mut_or_insert(&mut self, k: K, default: impl FnOnce() -> V) -> &mut V {
        if !self.contains(k) {
            self.insert(k, default());
        }
        &mut self.map[k]
    }

    pub fn keys(&self) -> impl Iterator<Item = K> + '_ {
        self.keys.iter().copied()
    }

    pub fn entries(&self) -> impl Iterator<Item = (K, &V)> {
        self.keys().map(|k| (k, &self.map[k]))
    }
}

impl<K: Ref, V> Index<K> for IterableRefMap<K, V> {
    type Output = V;

    fn index(&self, index: K) -> &Self::Output {
        self.get(index).expect("No such key")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    create_ref_type!(TestId);

    impl Debug for TestId {
        fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
            write!(f, "TestId({:?})", self.to_u32())
        }
    }

    #[test]
    fn ref_type_roundtrip() {
        for i in [0u32, 1, 2, 1000] {
            let id = TestId::from_u32(i);
            assert_eq!(id.to_u32(), i);
            assert_eq!(usize::from(id), i as usize);
            assert_eq!(TestId::from(i as usize), id);
        }
    }

    #[test]
    fn ref_vec_push_and_index() {
        let mut v: RefVec<TestId, char> = RefVec::new();
        let a = v.push('a');
        let b = v.push('b');
        assert_eq!(v[a], 'a');
        assert_eq!(v[b], 'b');
        assert_eq!(v.next_key(), TestId::from_u32(2));
        assert_eq!(v.keys().collect::<Vec<_>>(), vec![a, b]);
    }

    #[test]
    fn iterable_map_clear_is_complete() {
        let mut m: IterableRefMap<TestId, u32> = Default::default();
        m.insert(TestId::from_u32(3), 30);
        m.insert(TestId::from_u32(7), 70);
        assert_eq!(m.len(), 2);
        m.clear();
        assert!(m.is_empty());
        assert!(!m.contains(TestId::from_u32(3)));
        assert!(!m.contains(TestId::from_u32(7)));
    }
}
