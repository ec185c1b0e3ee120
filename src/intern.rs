use std::borrow::Borrow;
use std::collections::HashMap;
use std::hash::Hash;

/// Insertion-ordered table handing out stable integer ids, starting at 1.
#[derive(Debug, Clone)]
pub struct InternTable<K> {
    ids: HashMap<K, u32>,
    keys: Vec<K>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interned {
    pub id: u32,
    pub fresh: bool,
}

impl<K: Hash + Eq + Clone> InternTable<K> {
    pub fn new() -> Self {
        Self {
            ids: HashMap::new(),
            keys: Vec::new(),
        }
    }

    pub fn seeded(keys: impl IntoIterator<Item = K>) -> Self {
        let mut table = Self::new();
        for key in keys {
            table.intern(key);
        }
        table
    }

    pub fn intern(&mut self, key: K) -> Interned {
        if let Some(&id) = self.ids.get(&key) {
            return Interned { id, fresh: false };
        }
        self.keys.push(key.clone());
        let id = self.keys.len() as u32;
        self.ids.insert(key, id);
        Interned { id, fresh: true }
    }

    pub fn get<Q>(&self, key: &Q) -> Option<u32>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.ids.get(key).copied()
    }

    pub fn key(&self, id: u32) -> Option<&K> {
        let index = usize::try_from(id).ok()?.checked_sub(1)?;
        self.keys.get(index)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, &K)> {
        self.keys
            .iter()
            .enumerate()
            .map(|(index, key)| (index as u32 + 1, key))
    }
}

impl<K: Hash + Eq + Clone> Default for InternTable<K> {
    fn default() -> Self {
        Self::new()
    }
}
