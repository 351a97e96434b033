use fibre_weakcache::{ExpiringWeakCache, Strong};
use std::thread;
use std::time::Duration;

fn main() {
  let cache = ExpiringWeakCache::new();
  let token = Strong::new(42u64);

  println!("Storing ('token', 42) with a 1-second time-to-live.");
  cache.store_with_ttl("token", &token, Duration::from_secs(1));
  println!("Loaded: {:?}", cache.load(&"token"));

  println!("\nWaiting for 2 seconds for the item to expire...");
  thread::sleep(Duration::from_secs(2));

  // The value is still owned here, but its deadline has passed.
  println!("Loaded after TTL: {:?}", cache.load(&"token"));
  println!("Slots before purge: {}", cache.len());
  println!("Purged: {}", cache.purge());
  println!("Slots after purge: {}", cache.len());
  println!("Value itself is untouched: {}", token);
}
