use std::fmt;

/// Errors that can occur when building a cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildError {
  /// The cache was configured with zero shards, which is not allowed.
  ZeroShards,
  /// The requested shard count cannot be rounded up to a power of two.
  TooManyShards(usize),
}

impl fmt::Display for BuildError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      BuildError::ZeroShards => write!(f, "shard count cannot be zero"),
      BuildError::TooManyShards(requested) => write!(
        f,
        "shard count {} cannot be rounded up to a power of two",
        requested
      ),
    }
  }
}

impl std::error::Error for BuildError {}
