//! Entry and lookup types for the response cache.

use serde_json::Value;
use tokio::time::{Duration, Instant};

/// A stored response body.
#[derive(Debug, Clone)]
pub(super) struct CacheEntry {
  pub value: Value,
  pub stored_at: Instant,
}

/// How old a cached value is relative to the cache windows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
  /// Usable without a refetch
  Fresh,
  /// Past the fresh window; only usable as a degraded answer
  Stale,
  /// Past the stale window; only returned by `get_any`
  Expired,
}

/// Freshness and staleness windows, both measured from `stored_at`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheWindows {
  pub fresh: Duration,
  pub stale: Duration,
}

impl Default for CacheWindows {
  fn default() -> Self {
    Self {
      fresh: Duration::from_secs(10 * 60),
      stale: Duration::from_secs(30 * 60),
    }
  }
}

impl CacheWindows {
  pub fn classify(&self, age: Duration) -> Freshness {
    if age < self.fresh {
      Freshness::Fresh
    } else if age < self.stale {
      Freshness::Stale
    } else {
      Freshness::Expired
    }
  }
}

/// A value read back from the cache, with metadata about its age.
#[derive(Debug, Clone)]
pub struct Cached<T> {
  pub data: T,
  pub stored_at: Instant,
  pub freshness: Freshness,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_classify_boundaries() {
    let windows = CacheWindows::default();

    assert_eq!(windows.classify(Duration::ZERO), Freshness::Fresh);
    assert_eq!(
      windows.classify(Duration::from_secs(10 * 60 - 1)),
      Freshness::Fresh
    );
    assert_eq!(
      windows.classify(Duration::from_secs(10 * 60)),
      Freshness::Stale
    );
    assert_eq!(
      windows.classify(Duration::from_secs(30 * 60 - 1)),
      Freshness::Stale
    );
    assert_eq!(
      windows.classify(Duration::from_secs(30 * 60)),
      Freshness::Expired
    );
  }
}
