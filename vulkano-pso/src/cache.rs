use foldhash::HashMap;
use parking_lot::RwLock;
use std::{borrow::Borrow, collections::hash_map::Entry, hash::Hash};

/// A map whose entries are written to once and then only read.
///
/// Readers never block each other, except when an entry is vacant. If two threads race to fill
/// the same vacant entry, both build a value but only the first one to take the write lock is
/// stored. Every caller gets the stored value back, and the other value is dropped.
#[derive(Debug)]
pub(crate) struct OnceCache<K, V> {
    inner: RwLock<HashMap<K, V>>,
}

impl<K, V> Default for OnceCache<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> OnceCache<K, V> {
    /// Creates a new `OnceCache`.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(HashMap::default()),
        }
    }

    /// Returns the number of entries.
    pub(crate) fn len(&self) -> usize {
        self.inner.read().len()
    }

    /// Removes every entry, returning the removed values.
    pub(crate) fn drain(&self) -> Vec<V> {
        self.inner.write().drain().map(|(_, value)| value).collect()
    }
}

impl<K, V> OnceCache<K, V>
where
    K: Eq + Hash,
    V: Clone,
{
    /// Returns the value for the specified `key`, if it exists.
    pub(crate) fn get<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        self.inner.read().get(key).cloned()
    }

    /// Inserts `value` unless the entry is already occupied. Returns the stored value.
    pub(crate) fn insert_if_vacant(&self, key: K, value: V) -> V {
        match self.inner.write().entry(key) {
            Entry::Occupied(entry) => entry.get().clone(),
            Entry::Vacant(entry) => entry.insert(value).clone(),
        }
    }

    /// Returns the value for the specified `key`. The entry gets written to with the key-value
    /// pair returned by `f` if it doesn't exist. If `f` returns [`Err`], the error is
    /// propagated and the entry isn't written to.
    pub(crate) fn get_or_try_insert<Q, E>(
        &self,
        key: &Q,
        f: impl FnOnce() -> Result<(K, V), E>,
    ) -> Result<V, E>
    where
        K: Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        if let Some(value) = self.get(key) {
            return Ok(value);
        }

        let (key, value) = f()?;

        Ok(self.insert_if_vacant(key, value))
    }

    /// Returns a snapshot of every stored value.
    pub(crate) fn values(&self) -> Vec<V> {
        self.inner.read().values().cloned().collect()
    }
}
