use once_cell::sync::Lazy;
use std::fmt;
use std::time::{Duration, Instant};

// The single, static reference point for all deadline calculations.
// It is initialized lazily on its first use.
static CACHE_EPOCH: Lazy<Instant> = Lazy::new(Instant::now);

/// Converts an `Instant` into a `Duration` since the cache's epoch.
#[inline]
pub(crate) fn instant_to_duration(instant: Instant) -> Duration {
  instant.saturating_duration_since(*CACHE_EPOCH)
}

/// Converts a `Duration` from the cache's epoch back into an `Instant`.
#[inline]
pub(crate) fn duration_to_instant(duration: Duration) -> Instant {
  *CACHE_EPOCH + duration
}

/// A helper to get the current time as a `Duration` since the epoch.
#[inline]
pub(crate) fn now_duration() -> Duration {
  instant_to_duration(Instant::now())
}

/// The point in time after which an entry of an
/// [`ExpiringWeakCache`](crate::ExpiringWeakCache) is treated as absent.
///
/// A deadline is either [`Deadline::NEVER`] or an absolute instant. It is
/// stored as nanoseconds since a process-wide epoch, where `0` is reserved
/// for "never expires".
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Deadline {
  nanos: u64,
}

impl Deadline {
  /// A deadline that never passes. Entries carrying it live for as long as
  /// their value is strongly owned somewhere.
  pub const NEVER: Deadline = Deadline { nanos: 0 };

  /// Creates a deadline at the given instant.
  ///
  /// Instants that lie before the cache epoch are clamped to the earliest
  /// representable deadline, which has already passed.
  pub fn at(instant: Instant) -> Self {
    let nanos = instant_to_duration(instant).as_nanos();
    Self {
      nanos: u64::try_from(nanos).unwrap_or(u64::MAX).max(1),
    }
  }

  /// Creates a deadline `ttl` from now. A `ttl` too large to represent
  /// yields [`Deadline::NEVER`].
  pub fn after(ttl: Duration) -> Self {
    match Instant::now().checked_add(ttl) {
      Some(instant) => Self::at(instant),
      None => Self::NEVER,
    }
  }

  /// Returns `true` if this is the "never expires" sentinel.
  #[inline]
  pub fn is_never(&self) -> bool {
    self.nanos == 0
  }

  /// Returns the instant of this deadline, or `None` for [`Deadline::NEVER`].
  pub fn instant(&self) -> Option<Instant> {
    if self.is_never() {
      None
    } else {
      Some(duration_to_instant(Duration::from_nanos(self.nanos)))
    }
  }

  /// Returns `true` if the deadline lies strictly before the current time.
  #[inline]
  pub fn has_passed(&self) -> bool {
    self.has_passed_at(now_duration())
  }

  #[inline]
  pub(crate) fn has_passed_at(&self, now: Duration) -> bool {
    !self.is_never() && u128::from(self.nanos) < now.as_nanos()
  }
}

impl fmt::Debug for Deadline {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self.instant() {
      None => f.write_str("Deadline::NEVER"),
      Some(instant) => f.debug_tuple("Deadline").field(&instant).finish(),
    }
  }
}

impl From<Instant> for Deadline {
  fn from(instant: Instant) -> Self {
    Self::at(instant)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn never_does_not_pass() {
    assert!(Deadline::NEVER.is_never());
    assert!(!Deadline::NEVER.has_passed());
    assert!(!Deadline::NEVER.has_passed_at(Duration::MAX));
    assert_eq!(Deadline::default(), Deadline::NEVER);
    assert!(Deadline::NEVER.instant().is_none());
  }

  #[test]
  fn passes_strictly_after_instant() {
    let deadline = Deadline::at(Instant::now() + Duration::from_secs(10));
    let at = instant_to_duration(deadline.instant().unwrap());

    assert!(!deadline.has_passed());
    assert!(!deadline.has_passed_at(at), "equal to now is not yet passed");
    assert!(deadline.has_passed_at(at + Duration::from_nanos(1)));
  }

  #[test]
  fn instant_before_epoch_is_already_passed() {
    let _ = now_duration();
    let before = Instant::now()
      .checked_sub(Duration::from_secs(3600))
      .unwrap_or_else(Instant::now);
    let deadline = Deadline::at(before);

    assert!(!deadline.is_never());
    std::thread::sleep(Duration::from_millis(1));
    assert!(deadline.has_passed());
  }

  #[test]
  fn unrepresentable_ttl_never_expires() {
    assert_eq!(Deadline::after(Duration::MAX), Deadline::NEVER);
    assert!(!Deadline::after(Duration::from_secs(60)).is_never());
  }
}
