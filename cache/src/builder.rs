use crate::cache::{default_shards, WeakCache};
use crate::error::BuildError;
use crate::expiring::ExpiringWeakCache;
use crate::store::ShardedStore;

use core::fmt;
use std::hash::{BuildHasher, Hash};
use std::marker::PhantomData;
use std::sync::Arc;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Plain configuration for a cache, suitable for loading from an
/// application's own config files.
///
/// Apply it with [`WeakCacheBuilder::config`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default, deny_unknown_fields))]
pub struct CacheConfig {
  /// Number of shards. `None` keeps the builder's default.
  pub shards: Option<usize>,
  /// Number of entries to pre-allocate room for.
  pub initial_capacity: usize,
}

/// A builder for creating `WeakCache` and `ExpiringWeakCache` instances.
pub struct WeakCacheBuilder<K, V, H = ahash::RandomState> {
  shards: usize,
  initial_capacity: usize,
  hasher: H,
  _key_marker: PhantomData<K>,
  _value_marker: PhantomData<V>,
}

impl<K, V, H> fmt::Debug for WeakCacheBuilder<K, V, H> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("WeakCacheBuilder")
      .field("shards", &self.shards)
      .field("initial_capacity", &self.initial_capacity)
      .finish_non_exhaustive()
  }
}

// --- General Configuration Methods ---
impl<K, V, H> WeakCacheBuilder<K, V, H> {
  /// Sets the number of concurrent shards to use.
  ///
  /// The count is rounded up to the next power of two when the cache is
  /// built. Zero is rejected with [`BuildError::ZeroShards`].
  pub fn shards(mut self, shards: usize) -> Self {
    self.shards = shards;
    self
  }

  /// Pre-allocates room for `capacity` entries, spread across the shards.
  ///
  /// This is a sizing hint, not a bound: the cache never evicts on size.
  pub fn initial_capacity(mut self, capacity: usize) -> Self {
    self.initial_capacity = capacity;
    self
  }

  /// Applies every setting present in `config`.
  pub fn config(mut self, config: CacheConfig) -> Self {
    if let Some(shards) = config.shards {
      self.shards = shards;
    }
    self.initial_capacity = config.initial_capacity;
    self
  }
}

// --- Default Constructor ---
impl<K, V, H: BuildHasher + Default> WeakCacheBuilder<K, V, H> {
  /// Creates a new `WeakCacheBuilder` with default settings.
  pub fn new() -> Self {
    Self {
      shards: default_shards(),
      initial_capacity: 0,
      hasher: H::default(),
      _key_marker: PhantomData,
      _value_marker: PhantomData,
    }
  }
}

impl<K, V> Default for WeakCacheBuilder<K, V, ahash::RandomState> {
  fn default() -> Self {
    Self::new()
  }
}

// --- Build Methods ---
impl<K, V, H> WeakCacheBuilder<K, V, H>
where
  K: Eq + Hash + Clone + Send + Sync + 'static,
  V: Send + Sync + 'static,
  H: BuildHasher + Clone + Send + Sync + 'static,
{
  /// Sets the hasher for the cache.
  pub fn hasher<H2>(self, hasher: H2) -> WeakCacheBuilder<K, V, H2> {
    WeakCacheBuilder {
      shards: self.shards,
      initial_capacity: self.initial_capacity,
      hasher,
      _key_marker: PhantomData,
      _value_marker: PhantomData,
    }
  }

  /// Builds a `WeakCache`.
  pub fn build(self) -> Result<WeakCache<K, V, H>, BuildError> {
    let store = self.build_store()?;
    Ok(WeakCache::from_store(store))
  }

  /// Builds an `ExpiringWeakCache`.
  pub fn build_expiring(self) -> Result<ExpiringWeakCache<K, V, H>, BuildError> {
    let store = self.build_store()?;
    Ok(ExpiringWeakCache::from_inner(WeakCache::from_store(store)))
  }

  fn build_store<E>(self) -> Result<Arc<ShardedStore<K, E, H>>, BuildError> {
    let shards = self.validate()?;
    tracing::debug!(
      shards,
      initial_capacity = self.initial_capacity,
      "building weak cache"
    );
    Ok(Arc::new(ShardedStore::new(
      shards,
      self.initial_capacity,
      self.hasher,
    )))
  }

  /// Validates the builder configuration, returning the effective shard count.
  pub(crate) fn validate(&self) -> Result<usize, BuildError> {
    if self.shards == 0 {
      return Err(BuildError::ZeroShards);
    }
    self
      .shards
      .checked_next_power_of_two()
      .ok_or(BuildError::TooManyShards(self.shards))
  }
}
