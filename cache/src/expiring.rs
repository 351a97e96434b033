use crate::builder::WeakCacheBuilder;
use crate::cache::WeakCache;
use crate::compute::Compute;
use crate::reclaim::Strong;
use crate::time::{self, Deadline};

use core::fmt;
use std::hash::{BuildHasher, Hash};
use std::time::{Duration, Instant};

/// A [`WeakCache`] whose entries may additionally carry a [`Deadline`].
///
/// An entry is absent once its value is reclaimed *or* once its deadline
/// lies strictly in the past, whichever comes first.
///
/// Expiry is checked lazily. `load` and `range` filter out expired entries
/// but never remove them; the slot is removed the next time a `compute`
/// touches the key, when [`purge`](Self::purge) runs, or when the value is
/// reclaimed. There is no background timer.
pub struct ExpiringWeakCache<K, V, H = ahash::RandomState> {
  inner: WeakCache<K, V, H, Deadline>,
}

impl<K, V, H> fmt::Debug for ExpiringWeakCache<K, V, H> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("ExpiringWeakCache")
      .field("inner", &self.inner)
      .finish()
  }
}

impl<K, V> ExpiringWeakCache<K, V>
where
  K: Eq + Hash + Clone + Send + Sync + 'static,
  V: Send + Sync + 'static,
{
  /// Creates a cache with default settings.
  pub fn new() -> Self {
    Self::from_inner(WeakCache::unconfigured())
  }

  /// Returns a builder for configuring a cache.
  pub fn builder() -> WeakCacheBuilder<K, V> {
    WeakCacheBuilder::default()
  }
}

impl<K, V> Default for ExpiringWeakCache<K, V>
where
  K: Eq + Hash + Clone + Send + Sync + 'static,
  V: Send + Sync + 'static,
{
  fn default() -> Self {
    Self::new()
  }
}

impl<K, V, H> ExpiringWeakCache<K, V, H>
where
  K: Eq + Hash + Clone + Send + Sync + 'static,
  V: Send + Sync + 'static,
  H: BuildHasher + Clone + Send + Sync + 'static,
{
  pub(crate) fn from_inner(inner: WeakCache<K, V, H, Deadline>) -> Self {
    Self { inner }
  }

  /// Returns the value stored under `key` if it is alive and not expired.
  pub fn load(&self, key: &K) -> Option<Strong<V>> {
    self.load_with_deadline(key).map(|(value, _)| value)
  }

  /// Returns the live, unexpired value for `key` along with its deadline.
  pub fn load_with_deadline(&self, key: &K) -> Option<(Strong<V>, Deadline)> {
    self
      .inner
      .load_tagged(key)
      .filter(|(_, deadline)| !deadline.has_passed())
  }

  /// Returns `true` if `key` maps to a live, unexpired value.
  pub fn contains_key(&self, key: &K) -> bool {
    self.load_with_deadline(key).is_some()
  }

  /// Stores `value` under `key` with no deadline.
  pub fn store(&self, key: K, value: &Strong<V>) {
    self.inner.store_tagged(key, value, Deadline::NEVER);
  }

  /// Stores `value` under `key`, to be treated as absent after `deadline`.
  pub fn store_with_deadline(&self, key: K, value: &Strong<V>, deadline: Instant) {
    self.inner.store_tagged(key, value, Deadline::at(deadline));
  }

  /// Stores `value` under `key`, to be treated as absent `ttl` from now.
  pub fn store_with_ttl(&self, key: K, value: &Strong<V>, ttl: Duration) {
    self.inner.store_tagged(key, value, Deadline::after(ttl));
  }

  /// Removes the entry for `key`. Deleting an absent key is a no-op.
  pub fn delete(&self, key: &K) {
    self.inner.delete(key);
  }

  /// Removes every entry.
  pub fn clear(&self) {
    self.inner.clear();
  }

  /// Atomically updates the value and deadline for `key`.
  ///
  /// If the current entry has expired, it is deleted without calling `f`.
  /// Otherwise `f` receives the current value (or `None` when the key is
  /// absent or its value was reclaimed) and returns the outcome, with the
  /// deadline for the new value on `Update`.
  ///
  /// The same contract as [`WeakCache::compute`] applies: `f` may run more
  /// than once and must be free of side effects.
  #[must_use = "the cache holds the computed value weakly; dropping the returned handle reclaims it"]
  pub fn compute<F>(&self, key: K, mut f: F) -> Option<Strong<V>>
  where
    F: FnMut(Option<&V>) -> Compute<(Strong<V>, Deadline)>,
  {
    self.inner.compute_tagged(key, |current| match current {
      Some((_, deadline)) if deadline.has_passed_at(time::now_duration()) => {
        tracing::trace!("compute found an expired entry, deleting it");
        Compute::Delete
      }
      Some((value, _)) => f(Some(value)),
      None => f(None),
    })
  }

  /// Calls `f` for every live, unexpired entry until it returns `false`.
  ///
  /// Expired entries are skipped, not removed. Consistency is the same as
  /// [`WeakCache::range`].
  pub fn range<F>(&self, mut f: F)
  where
    F: FnMut(&K, &Strong<V>) -> bool,
  {
    let now = time::now_duration();
    self.inner.range_tagged(|key, value, deadline| {
      if deadline.has_passed_at(now) {
        true
      } else {
        f(key, value)
      }
    });
  }

  /// Removes every slot that is expired or whose value has been reclaimed,
  /// returning how many were removed.
  pub fn purge(&self) -> usize {
    self.inner.purge_where(Deadline::has_passed)
  }

  /// Returns the number of occupied slots, including expired and reclaimed
  /// ones not yet removed.
  pub fn len(&self) -> usize {
    self.inner.len()
  }

  /// Returns `true` if no slots are occupied.
  pub fn is_empty(&self) -> bool {
    self.inner.is_empty()
  }

  /// Returns the number of shards backing this cache.
  pub fn shard_count(&self) -> usize {
    self.inner.shard_count()
  }
}
