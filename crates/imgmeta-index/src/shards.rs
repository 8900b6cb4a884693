//! Hash-sharded `RwLock`s.
//!
//! Keys hash to one shard; writers to keys in different shards never
//! contend. Lock poisoning is reported as [`MetaError::LockPoisoned`].

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use imgmeta_types::{MetaError, Result};

/// A fixed set of independently locked values.
pub struct Shards<T> {
    shards: Vec<RwLock<T>>,
}

impl<T> Shards<T> {
    /// Create `count` shards (at least one), each built by `init`.
    pub fn new(count: usize, init: impl Fn() -> T) -> Self {
        let count = count.max(1);
        let mut shards = Vec::with_capacity(count);
        for _ in 0..count {
            shards.push(RwLock::new(init()));
        }
        Self { shards }
    }

    /// Number of shards.
    pub fn len(&self) -> usize {
        self.shards.len()
    }

    /// Always `false`; there is at least one shard.
    pub fn is_empty(&self) -> bool {
        self.shards.is_empty()
    }

    /// Shared access to the shard owning `key`.
    pub fn read<K: Hash + ?Sized>(&self, key: &K) -> Result<RwLockReadGuard<'_, T>> {
        self.shards[self.index_of(key)]
            .read()
            .map_err(|e| MetaError::LockPoisoned(e.to_string()))
    }

    /// Exclusive access to the shard owning `key`.
    pub fn write<K: Hash + ?Sized>(&self, key: &K) -> Result<RwLockWriteGuard<'_, T>> {
        self.shards[self.index_of(key)]
            .write()
            .map_err(|e| MetaError::LockPoisoned(e.to_string()))
    }

    /// Exclusive access to every shard, acquired in index order.
    pub fn write_all(&self) -> Result<Vec<RwLockWriteGuard<'_, T>>> {
        self.shards
            .iter()
            .map(|shard| {
                shard
                    .write()
                    .map_err(|e| MetaError::LockPoisoned(e.to_string()))
            })
            .collect()
    }

    /// Fold over every shard under a shared lock, one shard at a time.
    pub fn try_fold<A>(&self, init: A, mut f: impl FnMut(A, &T) -> A) -> Result<A> {
        let mut acc = init;
        for shard in &self.shards {
            let guard = shard
                .read()
                .map_err(|e| MetaError::LockPoisoned(e.to_string()))?;
            acc = f(acc, &guard);
        }
        Ok(acc)
    }

    fn index_of<K: Hash + ?Sized>(&self, key: &K) -> usize {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        (hasher.finish() % self.shards.len() as u64) as usize
    }
}

impl<T: Default> Shards<T> {
    /// Create `count` shards holding `T::default()`.
    pub fn with_default(count: usize) -> Self {
        Self::new(count, T::default)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_shards_rounds_up_to_one() {
        let shards: Shards<u32> = Shards::with_default(0);
        assert_eq!(shards.len(), 1);
        assert!(!shards.is_empty());
    }

    #[test]
    fn same_key_same_shard() {
        let shards: Shards<Vec<&str>> = Shards::with_default(16);
        shards.write("alpha").unwrap().push("alpha");
        assert_eq!(shards.read("alpha").unwrap().as_slice(), ["alpha"]);
    }

    #[test]
    fn fold_visits_every_shard() {
        let shards: Shards<u32> = Shards::new(8, || 1);
        let total = shards.try_fold(0, |acc, v| acc + *v).unwrap();
        assert_eq!(total, 8);
    }

    #[test]
    fn write_all_holds_each_shard() {
        let shards: Shards<u32> = Shards::with_default(4);
        {
            let mut guards = shards.write_all().unwrap();
            assert_eq!(guards.len(), 4);
            for guard in guards.iter_mut() {
                **guard += 2;
            }
        }
        assert_eq!(shards.try_fold(0, |acc, v| acc + *v).unwrap(), 8);
    }
}
