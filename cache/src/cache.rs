use crate::builder::WeakCacheBuilder;
use crate::compute::{Committed, Compute};
use crate::reclaim::{Strong, WeakRef};
use crate::store::{EntryStore, ShardedStore};

use core::fmt;
use std::hash::{BuildHasher, Hash};
use std::sync::Arc;

/// What the store holds for a key: a weak handle to the value plus the tag
/// the value was stored with.
pub(crate) struct Slot<V, T> {
  handle: WeakRef<V>,
  tag: T,
}

impl<V, T: Clone> Clone for Slot<V, T> {
  fn clone(&self) -> Self {
    Self {
      handle: self.handle.clone(),
      tag: self.tag.clone(),
    }
  }
}

/// A concurrent map from keys to weakly held values.
///
/// The cache never keeps a value alive. Values are handed in as [`Strong`]
/// handles and only a [`WeakRef`] is retained; once the last `Strong` for a
/// value is dropped, reads stop returning it and its slot is removed by a
/// reclamation hook registered when the value was stored.
///
/// Every entry also carries a tag of type `T`, stored next to the weak
/// handle and replaced together with it. Plain caches use `()`;
/// [`ExpiringWeakCache`](crate::ExpiringWeakCache) uses the entry's
/// [`Deadline`](crate::Deadline).
///
/// # Reclamation timing
///
/// Cleanup is tied to `Drop`: the hook runs synchronously on the thread that
/// drops the last owner, so an entry vanishes from `load` and `range` the
/// moment its value is released, not at some later collection cycle.
pub struct WeakCache<K, V, H = ahash::RandomState, T = ()> {
  store: Arc<ShardedStore<K, Slot<V, T>, H>>,
}

impl<K, V, H, T> fmt::Debug for WeakCache<K, V, H, T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("WeakCache")
      .field("store", &self.store)
      .finish()
  }
}

impl<K, V> WeakCache<K, V>
where
  K: Eq + Hash + Clone + Send + Sync + 'static,
  V: Send + Sync + 'static,
{
  /// Creates a cache with default settings.
  pub fn new() -> Self {
    Self::unconfigured()
  }

  /// Returns a builder for configuring a cache.
  pub fn builder() -> WeakCacheBuilder<K, V> {
    WeakCacheBuilder::default()
  }
}

impl<K, V> Default for WeakCache<K, V>
where
  K: Eq + Hash + Clone + Send + Sync + 'static,
  V: Send + Sync + 'static,
{
  fn default() -> Self {
    Self::new()
  }
}

impl<K, V, T> WeakCache<K, V, ahash::RandomState, T>
where
  K: Eq + Hash + Clone + Send + Sync + 'static,
  V: Send + Sync + 'static,
  T: Clone + Send + Sync + 'static,
{
  pub(crate) fn unconfigured() -> Self {
    Self::from_store(Arc::new(ShardedStore::new(
      default_shards(),
      0,
      ahash::RandomState::new(),
    )))
  }
}

pub(crate) fn default_shards() -> usize {
  (num_cpus::get() * 4).max(1).next_power_of_two()
}

impl<K, V, H, T> WeakCache<K, V, H, T>
where
  K: Eq + Hash + Clone + Send + Sync + 'static,
  V: Send + Sync + 'static,
  H: BuildHasher + Clone + Send + Sync + 'static,
  T: Clone + Send + Sync + 'static,
{
  pub(crate) fn from_store(store: Arc<ShardedStore<K, Slot<V, T>, H>>) -> Self {
    Self { store }
  }

  /// Returns the value stored under `key`, if it is still alive.
  ///
  /// A slot whose value has been reclaimed reads as absent. This never
  /// modifies the cache.
  pub fn load(&self, key: &K) -> Option<Strong<V>> {
    self.load_tagged(key).map(|(value, _)| value)
  }

  /// Returns the live value stored under `key` together with its tag.
  pub fn load_tagged(&self, key: &K) -> Option<(Strong<V>, T)> {
    let slot = self.store.get(key)?;
    let value = slot.handle.upgrade()?;
    Some((value, slot.tag))
  }

  /// Returns `true` if `key` currently maps to a live value.
  pub fn contains_key(&self, key: &K) -> bool {
    self
      .store
      .get(key)
      .is_some_and(|slot| !slot.handle.is_dead())
  }

  /// Stores a weak handle to `value` under `key`, replacing any previous
  /// entry.
  pub fn store(&self, key: K, value: &Strong<V>)
  where
    T: Default,
  {
    self.store_tagged(key, value, T::default());
  }

  /// Stores a weak handle to `value` under `key` with the given tag.
  ///
  /// The reclamation hook is registered before the entry becomes visible,
  /// so a value released right after this call is always cleaned up. A value
  /// carries at most one hook per cache and key, however often it is stored
  /// there.
  pub fn store_tagged(&self, key: K, value: &Strong<V>, tag: T) {
    watch_reclaim::<K, V, T, _>(&self.store, value, &key);
    let slot = Slot {
      handle: Strong::downgrade(value),
      tag,
    };
    self.store.put(key, slot);
  }

  /// Removes the entry for `key`, live or not. Deleting an absent key is a
  /// no-op.
  pub fn delete(&self, key: &K) {
    self.store.delete(key);
  }

  /// Removes every entry.
  pub fn clear(&self) {
    self.store.clear();
  }

  /// Atomically updates the value for `key`.
  ///
  /// `f` receives the current value, or `None` if the key is absent, and
  /// returns the [`Compute`] outcome to commit. If the key holds a value
  /// that has already been reclaimed, the slot is deleted without calling
  /// `f`. A value installed by `Update` gets the same reclamation hook as
  /// one installed by [`store`](Self::store).
  ///
  /// Returns the value live under `key` after the call: the new value on
  /// `Update`, the current value on `Cancel`, `None` on `Delete`. Since the
  /// cache only holds values weakly, a freshly computed value survives only
  /// while the caller (or someone else) keeps a `Strong` to it.
  ///
  /// `f` may be invoked more than once and must not have side effects. It
  /// runs while the key's shard is locked, so it must not call back into
  /// this cache or drop the last owner of a cached value.
  #[must_use = "the cache holds the computed value weakly; dropping the returned handle reclaims it"]
  pub fn compute<F>(&self, key: K, mut f: F) -> Option<Strong<V>>
  where
    T: Default,
    F: FnMut(Option<&V>) -> Compute<Strong<V>>,
  {
    self.compute_tagged(key, |current| {
      f(current.map(|(value, _)| value)).map(|value| (value, T::default()))
    })
  }

  /// Like [`compute`](Self::compute), with the entry's tag passed in and
  /// returned alongside the value.
  #[must_use = "the cache holds the computed value weakly; dropping the returned handle reclaims it"]
  pub fn compute_tagged<F>(&self, key: K, mut f: F) -> Option<Strong<V>>
  where
    F: FnMut(Option<(&V, &T)>) -> Compute<(Strong<V>, T)>,
  {
    // Strong handles touched inside the atomic section are parked here and
    // only released once the shard lock is gone: dropping the last one could
    // run a reclamation hook that needs the same lock.
    let mut parked: Vec<Strong<V>> = Vec::new();
    let mut current: Option<Strong<V>> = None;
    let mut installed: Option<Strong<V>> = None;

    let committed = self.store.compute(key.clone(), |slot| {
      parked.extend(current.take());
      parked.extend(installed.take());

      let resolved = match slot {
        Some(slot) => match slot.handle.upgrade() {
          Some(value) => Some((value, slot.tag.clone())),
          None => {
            tracing::trace!("compute found a reclaimed value, deleting its slot");
            return Compute::Delete;
          }
        },
        None => None,
      };

      let outcome = f(resolved.as_ref().map(|(value, tag)| (&**value, tag)));
      current = resolved.map(|(value, _)| value);

      match outcome {
        Compute::Update((value, tag)) => {
          watch_reclaim::<K, V, T, _>(&self.store, &value, &key);
          let slot = Slot {
            handle: Strong::downgrade(&value),
            tag,
          };
          installed = Some(value);
          Compute::Update(slot)
        }
        Compute::Delete => Compute::Delete,
        Compute::Cancel => Compute::Cancel,
      }
    });

    match committed {
      Committed::Updated => installed,
      Committed::Deleted => None,
      Committed::Unchanged => current,
    }
  }

  /// Calls `f` for every live entry until it returns `false`.
  ///
  /// Entries whose value has been reclaimed are skipped, not removed. The
  /// visit is weakly consistent: shards are copied one at a time, so entries
  /// stored or deleted while it runs may or may not be seen. `f` runs
  /// without any lock held and may call back into the cache.
  pub fn range<F>(&self, mut f: F)
  where
    F: FnMut(&K, &Strong<V>) -> bool,
  {
    self.range_tagged(|key, value, _| f(key, value));
  }

  /// Like [`range`](Self::range), with each entry's tag.
  pub fn range_tagged<F>(&self, mut f: F)
  where
    F: FnMut(&K, &Strong<V>, &T) -> bool,
  {
    self.store.for_each(|key, slot| match slot.handle.upgrade() {
      Some(value) => f(key, &value, &slot.tag),
      None => true,
    });
  }

  /// Removes every slot whose value has been reclaimed, returning how many
  /// were removed.
  ///
  /// Reclamation hooks already do this as values are dropped; `purge` is
  /// for callers that want the physical size to be exact right now.
  pub fn purge(&self) -> usize {
    self.purge_where(|_| false)
  }

  /// Removes every slot that is dead or whose tag satisfies `stale`, one
  /// atomic compute per key.
  pub(crate) fn purge_where<P>(&self, stale: P) -> usize
  where
    P: Fn(&T) -> bool,
  {
    let mut keys = Vec::new();
    self.store.for_each(|key, _| {
      keys.push(key.clone());
      true
    });

    let mut removed = 0;
    for key in keys {
      let committed = self.store.compute(key, |slot| match slot {
        Some(slot) if slot.handle.is_dead() || stale(&slot.tag) => Compute::Delete,
        _ => Compute::Cancel,
      });
      if committed == Committed::Deleted {
        removed += 1;
      }
    }

    if removed > 0 {
      tracing::trace!(removed, "purged stale slots");
    }
    removed
  }

  /// Returns the number of occupied slots, including slots whose value has
  /// been reclaimed but not yet removed. Concurrent writers make this an
  /// approximation.
  pub fn len(&self) -> usize {
    self.store.len()
  }

  /// Returns `true` if no slots are occupied.
  pub fn is_empty(&self) -> bool {
    self.store.is_empty()
  }

  /// Returns the number of shards backing this cache.
  pub fn shard_count(&self) -> usize {
    self.store.num_shards()
  }
}

/// Makes sure `value` carries a hook that cleans up `key` in `store` once
/// the value is reclaimed, registering one only if none is pending.
///
/// Hooks are keyed by the store's address and the key. A pending hook holds
/// a `Weak` to the store, which keeps the allocation and so the address from
/// being reused while that hook can still match.
fn watch_reclaim<K, V, T, S>(store: &Arc<S>, value: &Strong<V>, key: &K)
where
  K: Eq + Clone + Send + 'static,
  V: 'static,
  T: 'static,
  S: EntryStore<K, Slot<V, T>> + 'static,
{
  let store_id = Arc::as_ptr(store) as usize;
  let registered = Strong::on_reclaim_keyed(
    value,
    (store_id, key.clone()),
    reclaim_hook::<K, V, T, S>(store, key.clone()),
  );
  if !registered {
    tracing::trace!("value already watched under this key, hook reused");
  }
}

/// Builds the hook that removes `key`'s slot once the value stored under it
/// is reclaimed.
///
/// The removal is a single compute that deletes only if the slot is still
/// dead, so a newer value stored under `key` in the meantime is kept. The
/// hook holds the store weakly and does nothing if the cache is gone.
fn reclaim_hook<K, V, T, S>(store: &Arc<S>, key: K) -> impl FnOnce() + Send + 'static
where
  K: Send + 'static,
  V: 'static,
  T: 'static,
  S: EntryStore<K, Slot<V, T>> + 'static,
{
  let store = Arc::downgrade(store);
  move || {
    let Some(store) = store.upgrade() else {
      tracing::trace!("value reclaimed after its cache was dropped");
      return;
    };

    let committed = store.compute(key, |slot| match slot {
      Some(slot) if slot.handle.is_dead() => Compute::Delete,
      _ => Compute::Cancel,
    });

    match committed {
      Committed::Deleted => tracing::trace!("removed slot of reclaimed value"),
      _ => tracing::trace!("slot already replaced or removed, cleanup skipped"),
    }
  }
}
