use crate::compute::{Committed, Compute};

use core::fmt;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::hash::{BuildHasher, Hash};
use std::mem;

use crossbeam_utils::CachePadded;
use parking_lot::RwLock;

/// The associative container a weak cache is built on.
///
/// Implementations map each key to at most one entry and must make
/// [`compute`](EntryStore::compute) atomic per key. The closure passed to
/// `compute` may be invoked more than once if the implementation retries
/// under contention; only the outcome of the final invocation is committed.
pub(crate) trait EntryStore<K, E>: Send + Sync {
  /// Returns a copy of the entry for `key`.
  fn get(&self, key: &K) -> Option<E>;

  /// Unconditionally installs `entry`, returning the entry it replaced.
  fn put(&self, key: K, entry: E) -> Option<E>;

  /// Removes the entry for `key`, returning it if there was one.
  fn delete(&self, key: &K) -> Option<E>;

  /// Removes every entry.
  fn clear(&self);

  /// Atomically reads, then updates, deletes or keeps the entry for `key`.
  fn compute<F>(&self, key: K, f: F) -> Committed
  where
    F: FnMut(Option<&E>) -> Compute<E>;

  /// Visits entries until `f` returns `false`.
  ///
  /// The visit is weakly consistent: entries inserted or removed while it
  /// runs may or may not be observed, but no entry is observed half-written.
  fn for_each<F>(&self, f: F)
  where
    F: FnMut(&K, &E) -> bool;

  /// Returns the number of stored entries.
  fn len(&self) -> usize;

  /// Returns `true` if no entries are stored.
  fn is_empty(&self) -> bool {
    self.len() == 0
  }
}

/// A helper function to hash a key using a `BuildHasher`.
#[inline]
pub(crate) fn hash_key<K: Hash, H: BuildHasher>(hasher: &H, key: &K) -> u64 {
  hasher.hash_one(key)
}

type Shard<K, E, H> = CachePadded<RwLock<HashMap<K, E, H>>>;

/// A store that is partitioned into multiple, independently locked shards.
///
/// Operations on different keys rarely contend for the same lock. A
/// `compute` holds its shard's write lock for the whole read-modify-write,
/// so the closure runs exactly once per call.
///
/// Entries displaced by a write are dropped only after the shard lock has
/// been released.
pub(crate) struct ShardedStore<K, E, H> {
  shards: Box<[Shard<K, E, H>]>,
  hasher: H,
}

impl<K, E, H> fmt::Debug for ShardedStore<K, E, H> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("ShardedStore")
      .field("num_shards", &self.shards.len())
      .finish()
  }
}

impl<K, E, H> ShardedStore<K, E, H>
where
  K: Eq + Hash,
  H: BuildHasher + Clone,
{
  /// Creates a new `ShardedStore`.
  ///
  /// `num_shards` must be a non-zero power of two; the builder guarantees
  /// this. `capacity` is spread evenly across the shards.
  pub(crate) fn new(num_shards: usize, capacity: usize, hasher: H) -> Self {
    debug_assert!(num_shards.is_power_of_two());
    let per_shard = capacity.div_ceil(num_shards);

    let mut shards = Vec::with_capacity(num_shards);
    for _ in 0..num_shards {
      let shard_map = HashMap::with_capacity_and_hasher(per_shard, hasher.clone());
      shards.push(CachePadded::new(RwLock::new(shard_map)));
    }

    Self {
      shards: shards.into_boxed_slice(),
      hasher,
    }
  }

  /// Returns the number of shards.
  #[inline]
  pub(crate) fn num_shards(&self) -> usize {
    self.shards.len()
  }

  #[inline]
  fn shard_index(&self, key: &K) -> usize {
    let hash = hash_key(&self.hasher, key);
    // The shard count is a power of two, so masking selects the shard.
    hash as usize & (self.shards.len() - 1)
  }

  /// Returns the lock guarding the shard for a given key.
  #[inline]
  fn get_shard(&self, key: &K) -> &RwLock<HashMap<K, E, H>> {
    &self.shards[self.shard_index(key)]
  }
}

impl<K, E, H> EntryStore<K, E> for ShardedStore<K, E, H>
where
  K: Eq + Hash + Clone + Send + Sync,
  E: Clone + Send + Sync,
  H: BuildHasher + Clone + Send + Sync,
{
  fn get(&self, key: &K) -> Option<E> {
    self.get_shard(key).read().get(key).cloned()
  }

  fn put(&self, key: K, entry: E) -> Option<E> {
    let shard = self.get_shard(&key);
    let mut guard = shard.write();
    guard.insert(key, entry)
  }

  fn delete(&self, key: &K) -> Option<E> {
    self.get_shard(key).write().remove(key)
  }

  fn clear(&self) {
    // Stop-the-world: hold every shard's write lock so no writer can slip an
    // entry into an already cleared shard mid-way.
    let mut shard_guards = self.shards.iter().map(|s| s.write()).collect::<Vec<_>>();

    let drained = shard_guards
      .iter_mut()
      .map(|guard| mem::replace(&mut **guard, HashMap::with_hasher(self.hasher.clone())))
      .collect::<Vec<_>>();

    drop(shard_guards);
    drop(drained);
  }

  fn compute<F>(&self, key: K, mut f: F) -> Committed
  where
    F: FnMut(Option<&E>) -> Compute<E>,
  {
    let shard = self.get_shard(&key);

    let (committed, displaced) = {
      let mut guard = shard.write();
      match guard.entry(key) {
        Entry::Occupied(mut occupied) => match f(Some(occupied.get())) {
          Compute::Update(entry) => (Committed::Updated, Some(occupied.insert(entry))),
          Compute::Delete => (Committed::Deleted, Some(occupied.remove())),
          Compute::Cancel => (Committed::Unchanged, None),
        },
        Entry::Vacant(vacant) => match f(None) {
          Compute::Update(entry) => {
            vacant.insert(entry);
            (Committed::Updated, None)
          }
          Compute::Delete | Compute::Cancel => (Committed::Unchanged, None),
        },
      }
    };

    drop(displaced);
    committed
  }

  fn for_each<F>(&self, mut f: F)
  where
    F: FnMut(&K, &E) -> bool,
  {
    for shard in self.shards.iter() {
      // Copy the shard out under its read lock and visit without holding it,
      // so the visitor is free to call back into the store.
      let snapshot = shard
        .read()
        .iter()
        .map(|(key, entry)| (key.clone(), entry.clone()))
        .collect::<Vec<_>>();

      for (key, entry) in &snapshot {
        if !f(key, entry) {
          return;
        }
      }
    }
  }

  fn len(&self) -> usize {
    self.shards.iter().map(|shard| shard.read().len()).sum()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn new_store(shards: usize) -> ShardedStore<u32, String, ahash::RandomState> {
    ShardedStore::new(shards, 0, ahash::RandomState::new())
  }

  #[test]
  fn put_get_delete() {
    let store = new_store(4);
    assert!(store.put(1, "a".into()).is_none());
    assert_eq!(store.put(1, "b".into()).as_deref(), Some("a"));
    assert_eq!(store.get(&1).as_deref(), Some("b"));
    assert_eq!(store.delete(&1).as_deref(), Some("b"));
    assert!(store.delete(&1).is_none());
    assert!(store.get(&1).is_none());
  }

  #[test]
  fn compute_commits_each_outcome() {
    let store = new_store(2);

    let committed = store.compute(7, |current| {
      assert!(current.is_none());
      Compute::Update("x".to_string())
    });
    assert_eq!(committed, Committed::Updated);
    assert_eq!(store.get(&7).as_deref(), Some("x"));

    let committed = store.compute(7, |_| Compute::Update("y".to_string()));
    assert_eq!(committed, Committed::Updated);
    assert_eq!(store.get(&7).as_deref(), Some("y"));

    let committed = store.compute(7, |_| Compute::Cancel);
    assert_eq!(committed, Committed::Unchanged);
    assert_eq!(store.get(&7).as_deref(), Some("y"));

    let committed = store.compute(7, |current| {
      assert_eq!(current.map(String::as_str), Some("y"));
      Compute::Delete
    });
    assert_eq!(committed, Committed::Deleted);
    assert!(store.get(&7).is_none());

    let committed = store.compute(7, |_| Compute::Delete);
    assert_eq!(committed, Committed::Unchanged);
  }

  #[test]
  fn for_each_stops_early() {
    let store = new_store(8);
    for i in 0..100 {
      store.put(i, i.to_string());
    }

    let mut visited = 0;
    store.for_each(|_, _| {
      visited += 1;
      visited < 10
    });
    assert_eq!(visited, 10);
  }

  #[test]
  fn for_each_visitor_can_reenter_store() {
    let store = new_store(1);
    store.put(1, "one".into());
    store.put(2, "two".into());

    store.for_each(|key, _| {
      store.delete(key);
      true
    });
    assert!(store.is_empty());
  }

  #[test]
  fn clear_and_len() {
    let store = new_store(4);
    for i in 0..32 {
      store.put(i, String::new());
    }
    assert_eq!(store.len(), 32);
    assert_eq!(store.num_shards(), 4);

    store.clear();
    assert_eq!(store.len(), 0);
    assert!(store.is_empty());
  }
}
