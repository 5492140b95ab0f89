use std::{collections::HashMap, hash::Hash};

use get_size::GetSize;

/// A `Vec` that can also be looked up by key, keeping insertion order.
#[derive(Debug, Clone)]
pub struct IndexedVec<K, V> {
    index: HashMap<K, usize>,
    vec: Vec<(K, V)>,
}

impl<K, V> Default for IndexedVec<K, V> {
    fn default() -> Self {
        Self {
            index: HashMap::new(),
            vec: Vec::new(),
        }
    }
}

// The index is derived from `vec`, comparing the entries is enough.
impl<K: PartialEq, V: PartialEq> PartialEq for IndexedVec<K, V> {
    fn eq(&self, other: &Self) -> bool {
        self.vec == other.vec
    }
}

impl<K: Eq + Hash + Clone, V> IndexedVec<K, V> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_vec(vec: Vec<V>, key_src: impl Fn(&V) -> K) -> Self {
        let mut this = Self::new();
        for v in vec {
            this.insert(key_src(&v), v);
        }
        this
    }

    /// Appends `value` under `key`. An existing entry keeps its position
    /// and gets its value replaced.
    pub fn insert(&mut self, key: K, value: V) -> usize {
        if let Some(&i) = self.index.get(&key) {
            self.vec[i].1 = value;
            return i;
        }
        let i = self.vec.len();
        self.index.insert(key.clone(), i);
        self.vec.push((key, value));
        i
    }

    pub fn get(&self, key: &K) -> Option<&V> {
        self.index.get(key).copied().map(|i| &self.vec[i].1)
    }

    pub fn get_mut(&mut self, key: &K) -> Option<&mut V> {
        self.index.get(key).copied().map(move |i| &mut self.vec[i].1)
    }

    pub fn first(&self) -> Option<(&K, &V)> {
        self.vec.first().map(|(k, v)| (k, v))
    }

    pub fn len(&self) -> usize {
        self.vec.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vec.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.vec.iter().map(|(k, _)| k)
    }

    pub fn values(&self) -> impl Iterator<Item = &V> {
        self.vec.iter().map(|(_, v)| v)
    }
}

// Keys are stored twice, once in `vec` and once in `index`.
impl<K: GetSize, V: GetSize> GetSize for IndexedVec<K, V> {
    fn get_heap_size(&self) -> usize {
        let entries = self.vec.capacity() * std::mem::size_of::<(K, V)>();
        let index = self.index.capacity() * std::mem::size_of::<(K, usize)>();
        let owned: usize = self
            .vec
            .iter()
            .map(|(k, v)| 2 * k.get_heap_size() + v.get_heap_size())
            .sum();
        entries + index + owned
    }
}
