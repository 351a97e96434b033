//! A concurrent cache that holds its values weakly.
//!
//! The cache never keeps a value alive. Callers own values through
//! [`Strong`] handles; the cache keeps only a [`WeakRef`]. An entry is gone
//! as soon as the last `Strong` for its value is dropped, and an
//! [`ExpiringWeakCache`] entry is also gone once its [`Deadline`] has passed.
//!
//! # Features
//! - **High Concurrency**: Built with a sharded architecture to minimize lock contention.
//! - **Atomic Updates**: Every conditional write goes through a per-key
//!   [`compute`](WeakCache::compute) with an `Update` / `Delete` / `Cancel`
//!   outcome.
//! - **Drop-Timed Cleanup**: Releasing the last owner of a value runs a hook
//!   that removes its slot, unless a newer value was stored under the key in
//!   the meantime.
//! - **Lazy Expiry**: Reads filter expired entries without side effects;
//!   writes and [`purge`](ExpiringWeakCache::purge) remove them.
//!
//! # Reclamation is drop-timed
//!
//! Reclamation hooks run synchronously on whichever thread drops the last
//! `Strong`, not at some later collection cycle. Entries therefore vanish
//! from `load` and `range` immediately when their value is released.
//!
//! ```
//! use fibre_weakcache::{Strong, WeakCache};
//!
//! let cache = WeakCache::new();
//! let value = Strong::new("world".to_string());
//!
//! cache.store("hello", &value);
//! assert_eq!(cache.load(&"hello").as_deref().map(String::as_str), Some("world"));
//!
//! drop(value);
//! assert!(cache.load(&"hello").is_none());
//! assert!(cache.is_empty());
//! ```

// Public modules that form the API
pub mod builder;
pub mod compute;
pub mod error;
pub mod reclaim;

// Internal, crate-only modules
mod cache;
mod expiring;
mod store;
mod time;

// Re-export the primary user-facing types for convenience
pub use builder::{CacheConfig, WeakCacheBuilder};
pub use cache::WeakCache;
pub use compute::Compute;
pub use error::BuildError;
pub use expiring::ExpiringWeakCache;
pub use reclaim::{Strong, WeakRef};
pub use time::Deadline;
