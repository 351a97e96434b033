mod common;

use common::build_test_cache;
use fibre_weakcache::{Compute, Strong, WeakCache};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;

#[test]
fn test_sync_compute_inserts_absent_key() {
  let cache = build_test_cache(4);

  let installed = cache.compute(1, |current| {
    assert!(current.is_none(), "Absent key is passed as None");
    Compute::Update(Strong::new("fresh".to_string()))
  });

  let installed = installed.expect("update returns the new value");
  assert!(Strong::ptr_eq(&cache.load(&1).unwrap(), &installed));
}

#[test]
fn test_sync_compute_updates_existing_value() {
  let cache = build_test_cache(4);
  let existing = Strong::new("abc".to_string());
  cache.store(1, &existing);

  let updated = cache
    .compute(1, |current| {
      let current = current.expect("live value is passed in");
      Compute::Update(Strong::new(current.to_uppercase()))
    })
    .unwrap();

  assert_eq!(*updated, "ABC");
  assert_eq!(cache.load(&1).as_deref().map(String::as_str), Some("ABC"));
}

#[test]
fn test_sync_compute_cancel_keeps_entry() {
  let cache = build_test_cache(4);
  let existing = Strong::new("keep".to_string());
  cache.store(1, &existing);

  let current = cache.compute(1, |_| Compute::Cancel);

  assert!(Strong::ptr_eq(&current.unwrap(), &existing));
  assert!(Strong::ptr_eq(&cache.load(&1).unwrap(), &existing));
}

#[test]
fn test_sync_compute_cancel_on_absent_key() {
  let cache = build_test_cache(4);
  assert!(cache.compute(1, |_| Compute::Cancel).is_none());
  assert!(cache.is_empty());
}

#[test]
fn test_sync_compute_delete() {
  let cache = build_test_cache(4);
  let existing = Strong::new("gone".to_string());
  cache.store(1, &existing);

  assert!(cache.compute(1, |_| Compute::Delete).is_none());
  assert!(cache.load(&1).is_none());
  assert!(cache.is_empty());

  // Deleting through compute on an absent key is a no-op.
  assert!(cache.compute(1, |_| Compute::Delete).is_none());
}

#[test]
fn test_sync_compute_conditional_update() {
  let cache = WeakCache::<&str, u32>::new();
  let low = Strong::new(3);
  cache.store("max", &low);

  let offered = Strong::new(2);
  let kept = cache.compute("max", |current| match current {
    Some(&current) if current >= *offered => Compute::Cancel,
    _ => Compute::Update(offered.clone()),
  });
  assert_eq!(kept.as_deref(), Some(&3));

  let offered = Strong::new(9);
  let raised = cache.compute("max", |current| match current {
    Some(&current) if current >= *offered => Compute::Cancel,
    _ => Compute::Update(offered.clone()),
  });
  assert_eq!(raised.as_deref(), Some(&9));
  assert_eq!(cache.load(&"max").as_deref(), Some(&9));
}

#[test]
fn test_sync_concurrent_compute_has_no_lost_updates() {
  const THREADS: usize = 8;
  const INCREMENTS: usize = 500;

  let cache = Arc::new(WeakCache::<&'static str, u64>::new());
  let invocations = Arc::new(AtomicUsize::new(0));
  let barrier = Arc::new(Barrier::new(THREADS));

  let handles: Vec<_> = (0..THREADS)
    .map(|_| {
      let cache = cache.clone();
      let invocations = invocations.clone();
      let barrier = barrier.clone();
      thread::spawn(move || {
        barrier.wait();
        // Every committed value is kept alive until the end, so no counter
        // state is reclaimed between increments.
        let mut committed = Vec::with_capacity(INCREMENTS);
        for _ in 0..INCREMENTS {
          let value = cache.compute("counter", |current| {
            invocations.fetch_add(1, Ordering::Relaxed);
            Compute::Update(Strong::new(current.copied().unwrap_or(0) + 1))
          });
          committed.push(value.expect("update always commits"));
        }
        committed
      })
    })
    .collect();

  let owners: Vec<Strong<u64>> = handles
    .into_iter()
    .flat_map(|handle| handle.join().unwrap())
    .collect();

  let updates = owners.len();
  assert_eq!(updates, THREADS * INCREMENTS);

  let final_value = *cache.load(&"counter").expect("latest value is owned");
  assert_eq!(final_value, updates as u64, "No update was lost");

  // The closure may be re-run by a retrying store, but never fewer times
  // than there were commits.
  assert!(invocations.load(Ordering::Relaxed) >= updates);

  // Each committed value is distinct.
  let mut seen: Vec<u64> = owners.iter().map(|value| **value).collect();
  seen.sort_unstable();
  seen.dedup();
  assert_eq!(seen.len(), updates);
}

#[test]
fn test_sync_discarded_compute_result_is_reclaimed() {
  let cache = build_test_cache(4);

  let _ = cache.compute(1, |_| Compute::Update(Strong::new("dropped".to_string())));
  assert!(cache.load(&1).is_none(), "Nobody owns the computed value");
  assert!(cache.is_empty());

  let kept = cache.compute(1, |_| Compute::Update(Strong::new("kept".to_string())));
  assert_eq!(cache.load(&1).as_deref().map(String::as_str), Some("kept"));
  drop(kept);
  assert!(cache.is_empty());
}
