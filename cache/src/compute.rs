//! The outcome contract shared by every atomic read-modify-write.
//!
//! A compute closure receives the current state of a single key and returns
//! a [`Compute`] describing what to commit. Exactly one outcome is committed
//! per call. Backing stores are allowed to invoke the closure more than once
//! under contention, so a closure must do nothing beyond computing its return
//! value: side effects performed inside it may be repeated, and a closure that
//! relies on running once is a contract violation with unspecified results.

/// What a compute closure asks the store to do with the entry for its key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compute<T> {
  /// Replace the entry (or create it) with the given value.
  Update(T),
  /// Remove the entry.
  Delete,
  /// Leave the entry exactly as it is.
  Cancel,
}

impl<T> Compute<T> {
  /// Maps the payload of an `Update`, leaving `Delete` and `Cancel` intact.
  #[inline]
  pub fn map<U, F>(self, f: F) -> Compute<U>
  where
    F: FnOnce(T) -> U,
  {
    match self {
      Compute::Update(value) => Compute::Update(f(value)),
      Compute::Delete => Compute::Delete,
      Compute::Cancel => Compute::Cancel,
    }
  }

  /// Returns `true` if this outcome replaces or creates the entry.
  #[inline]
  pub fn is_update(&self) -> bool {
    matches!(self, Compute::Update(_))
  }

  /// Returns `true` if this outcome removes the entry.
  #[inline]
  pub fn is_delete(&self) -> bool {
    matches!(self, Compute::Delete)
  }

  /// Returns `true` if this outcome leaves the entry untouched.
  #[inline]
  pub fn is_cancel(&self) -> bool {
    matches!(self, Compute::Cancel)
  }
}

/// The change a compute call actually committed to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Committed {
  /// The entry was inserted or replaced.
  Updated,
  /// An existing entry was removed.
  Deleted,
  /// Nothing changed: the closure cancelled, or asked to delete a key that
  /// was not present.
  Unchanged,
}
