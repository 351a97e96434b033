#![allow(dead_code)]

use std::hash::{BuildHasher, Hasher};

use fibre_weakcache::{ExpiringWeakCache, WeakCache, WeakCacheBuilder};

// A custom hasher that allows us to control which shard a key is assigned to.
// It simply uses the integer value of the key as its hash.
// For a 4-shard cache:
// - key 0 -> shard 0 (0 & 3 = 0)
// - key 1 -> shard 1 (1 & 3 = 1)
// - key 4 -> shard 0 (4 & 3 = 0)
#[derive(Clone, Default)]
pub struct ShardControllingHasher;
impl BuildHasher for ShardControllingHasher {
  type Hasher = TestHasher;
  fn build_hasher(&self) -> Self::Hasher {
    TestHasher(0)
  }
}
pub struct TestHasher(u64);
impl Hasher for TestHasher {
  fn finish(&self) -> u64 {
    self.0
  }
  fn write(&mut self, _: &[u8]) {
    unimplemented!()
  }
  fn write_i32(&mut self, i: i32) {
    self.0 = i as u64;
  }
}

pub fn build_test_cache(shards: usize) -> WeakCache<i32, String, ShardControllingHasher> {
  WeakCacheBuilder::default()
    .shards(shards)
    .hasher(ShardControllingHasher)
    .build()
    .unwrap()
}

pub fn build_test_expiring_cache(
  shards: usize,
) -> ExpiringWeakCache<i32, String, ShardControllingHasher> {
  WeakCacheBuilder::default()
    .shards(shards)
    .hasher(ShardControllingHasher)
    .build_expiring()
    .unwrap()
}
