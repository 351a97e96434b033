//! Strong/weak handles with reclamation hooks.
//!
//! A [`Strong`] owns a value the way an `Arc` does. A [`WeakRef`] observes it
//! without keeping it alive and resolves to either a live `Strong` or "dead".
//! Hooks registered with [`Strong::on_reclaim`] run exactly once, on the
//! thread that drops the last `Strong`, after every `WeakRef` to the value has
//! started resolving dead and before the value itself is dropped.
//! [`Strong::on_reclaim_keyed`] registers a hook only if no pending hook
//! with an equal key exists, so re-registering the same cleanup is free.
//!
//! Reclamation is therefore tied to drop, not to a collector: it happens
//! immediately and synchronously when the last owner goes away.

use std::any::Any;
use std::fmt;
use std::mem;
use std::ops::Deref;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

struct ReclaimHook {
  key: Option<Box<dyn Any + Send>>,
  run: Box<dyn FnOnce() + Send + 'static>,
}

impl ReclaimHook {
  fn has_key<Q: Eq + 'static>(&self, key: &Q) -> bool {
    self
      .key
      .as_ref()
      .and_then(|existing| existing.downcast_ref::<Q>())
      .is_some_and(|existing| existing == key)
  }
}

struct Shared<V> {
  value: V,
  hooks: Mutex<Vec<ReclaimHook>>,
}

impl<V> Drop for Shared<V> {
  fn drop(&mut self) {
    // The strong count is already zero here, so any concurrent `upgrade`
    // fails and hooks observe the value as dead.
    let hooks = mem::take(self.hooks.get_mut());
    for hook in hooks {
      (hook.run)();
    }
  }
}

/// An owning handle to a value that can be held weakly by a cache.
///
/// Cloning a `Strong` is cheap and shares the same value.
pub struct Strong<V> {
  inner: Arc<Shared<V>>,
}

impl<V> Strong<V> {
  /// Wraps `value` in a new owning handle.
  pub fn new(value: V) -> Self {
    Self {
      inner: Arc::new(Shared {
        value,
        hooks: Mutex::new(Vec::new()),
      }),
    }
  }

  /// Creates a non-owning handle to this value.
  pub fn downgrade(this: &Self) -> WeakRef<V> {
    WeakRef {
      inner: Arc::downgrade(&this.inner),
    }
  }

  /// Registers `hook` to run once the last `Strong` for this value is dropped.
  ///
  /// Because the caller holds a `Strong` for the duration of this call, the
  /// value cannot be reclaimed before the hook is in place.
  pub fn on_reclaim<F>(this: &Self, hook: F)
  where
    F: FnOnce() + Send + 'static,
  {
    this.inner.hooks.lock().push(ReclaimHook {
      key: None,
      run: Box::new(hook),
    });
  }

  /// Registers `hook` under `key` unless a hook with an equal key is already
  /// pending for this value. Returns `true` if `hook` was registered.
  ///
  /// Keys of different types never compare equal.
  pub fn on_reclaim_keyed<Q, F>(this: &Self, key: Q, hook: F) -> bool
  where
    Q: Eq + Send + 'static,
    F: FnOnce() + Send + 'static,
  {
    let mut hooks = this.inner.hooks.lock();
    if hooks.iter().any(|pending| pending.has_key(&key)) {
      return false;
    }
    hooks.push(ReclaimHook {
      key: Some(Box::new(key)),
      run: Box::new(hook),
    });
    true
  }

  /// Returns the number of hooks waiting for this value to be reclaimed.
  pub fn pending_hooks(this: &Self) -> usize {
    this.inner.hooks.lock().len()
  }

  /// Returns `true` if both handles point at the same value.
  #[inline]
  pub fn ptr_eq(this: &Self, other: &Self) -> bool {
    Arc::ptr_eq(&this.inner, &other.inner)
  }

  /// Returns the number of `Strong` handles currently owning the value.
  #[inline]
  pub fn strong_count(this: &Self) -> usize {
    Arc::strong_count(&this.inner)
  }
}

impl<V> Clone for Strong<V> {
  fn clone(&self) -> Self {
    Self {
      inner: Arc::clone(&self.inner),
    }
  }
}

impl<V> Deref for Strong<V> {
  type Target = V;

  #[inline]
  fn deref(&self) -> &V {
    &self.inner.value
  }
}

impl<V> AsRef<V> for Strong<V> {
  fn as_ref(&self) -> &V {
    &self.inner.value
  }
}

impl<V> From<V> for Strong<V> {
  fn from(value: V) -> Self {
    Self::new(value)
  }
}

impl<V: fmt::Debug> fmt::Debug for Strong<V> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_tuple("Strong").field(&self.inner.value).finish()
  }
}

impl<V: fmt::Display> fmt::Display for Strong<V> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    fmt::Display::fmt(&self.inner.value, f)
  }
}

impl<V: PartialEq> PartialEq for Strong<V> {
  fn eq(&self, other: &Self) -> bool {
    self.inner.value == other.inner.value
  }
}

impl<V: Eq> Eq for Strong<V> {}

/// A non-owning handle to a value held by some [`Strong`].
pub struct WeakRef<V> {
  inner: Weak<Shared<V>>,
}

impl<V> WeakRef<V> {
  /// Resolves the handle, returning `None` once the value has been reclaimed.
  #[inline]
  pub fn upgrade(&self) -> Option<Strong<V>> {
    self.inner.upgrade().map(|inner| Strong { inner })
  }

  /// Returns `true` if the value has been reclaimed.
  ///
  /// Unlike [`upgrade`](Self::upgrade) this never creates an owner, so it is
  /// safe to call where dropping a `Strong` would be a problem.
  #[inline]
  pub fn is_dead(&self) -> bool {
    self.inner.strong_count() == 0
  }

  /// Returns `true` if this handle observes the value owned by `strong`.
  #[inline]
  pub fn refers_to(&self, strong: &Strong<V>) -> bool {
    Weak::ptr_eq(&self.inner, &Arc::downgrade(&strong.inner))
  }
}

impl<V> Clone for WeakRef<V> {
  fn clone(&self) -> Self {
    Self {
      inner: Weak::clone(&self.inner),
    }
  }
}

impl<V> fmt::Debug for WeakRef<V> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("WeakRef")
      .field("dead", &self.is_dead())
      .finish()
  }
}
