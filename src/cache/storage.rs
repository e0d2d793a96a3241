//! Mutex-guarded map backing the response cache.

use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::entry::{CacheEntry, CacheWindows, Cached, Freshness};

/// Response cache shared by every fetch.
///
/// Constructed once at startup and handed out behind an `Arc`. Entries are
/// never evicted; expired ones stay in memory until overwritten or
/// invalidated so they can still serve as a last-resort fallback.
#[derive(Debug)]
pub struct ResponseCache {
  entries: Mutex<HashMap<String, CacheEntry>>,
  windows: CacheWindows,
}

impl ResponseCache {
  pub fn new(windows: CacheWindows) -> Self {
    Self {
      entries: Mutex::new(HashMap::new()),
      windows,
    }
  }

  /// Look up a fresh or stale value.
  ///
  /// Returns `None` for missing entries and for entries past the stale
  /// window, even though the latter are still physically stored.
  pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<Cached<T>> {
    let cached = self.lookup(key)?;
    match cached.freshness {
      Freshness::Fresh => {
        debug!(key, "Using fresh cached data");
        Some(cached)
      }
      Freshness::Stale => {
        info!(key, "Using stale cached data");
        Some(cached)
      }
      Freshness::Expired => None,
    }
  }

  /// Look up a value regardless of its age.
  pub fn get_any<T: DeserializeOwned>(&self, key: &str) -> Option<Cached<T>> {
    self.lookup(key)
  }

  /// Store a value, overwriting any previous entry for the key.
  pub fn set(&self, key: &str, value: Value) {
    let now = Instant::now();
    let mut entries = self.lock();
    // stored_at only moves forward for a key
    let stored_at = entries
      .get(key)
      .map_or(now, |previous| previous.stored_at.max(now));
    entries.insert(key.to_string(), CacheEntry { value, stored_at });
  }

  /// Remove entries whose key contains `pattern`, or everything when `None`.
  ///
  /// Returns the number of entries removed.
  pub fn invalidate(&self, pattern: Option<&str>) -> usize {
    let mut entries = self.lock();
    let before = entries.len();
    match pattern {
      None => entries.clear(),
      Some(pattern) => entries.retain(|key, _| !key.contains(pattern)),
    }
    let removed = before - entries.len();
    debug!(pattern, removed, "Invalidated cache entries");
    removed
  }

  pub fn len(&self) -> usize {
    self.lock().len()
  }

  fn lookup<T: DeserializeOwned>(&self, key: &str) -> Option<Cached<T>> {
    let (value, stored_at) = {
      let entries = self.lock();
      let entry = entries.get(key)?;
      (entry.value.clone(), entry.stored_at)
    };

    let age = Instant::now().saturating_duration_since(stored_at);
    match serde_json::from_value(value) {
      Ok(data) => Some(Cached {
        data,
        stored_at,
        freshness: self.windows.classify(age),
      }),
      Err(e) => {
        warn!(key, error = %e, "Cached value does not match the requested type");
        None
      }
    }
  }

  fn lock(&self) -> MutexGuard<'_, HashMap<String, CacheEntry>> {
    self.entries.lock().unwrap_or_else(PoisonError::into_inner)
  }
}

impl Default for ResponseCache {
  fn default() -> Self {
    Self::new(CacheWindows::default())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;
  use tokio::time::{advance, Duration};

  const MARKETS_PAGE_1: &str = "https://api.example.test/coins/markets?page=1";

  fn five_coins() -> Value {
    json!(["bitcoin", "ethereum", "tether", "solana", "xrp"])
  }

  #[tokio::test(start_paused = true)]
  async fn test_fresh_stale_expired_timeline() {
    let cache = ResponseCache::default();
    cache.set(MARKETS_PAGE_1, five_coins());

    advance(Duration::from_secs(5 * 60)).await;
    let fresh = cache.get::<Vec<String>>(MARKETS_PAGE_1).expect("fresh hit");
    assert_eq!(fresh.data.len(), 5);
    assert_eq!(fresh.freshness, Freshness::Fresh);

    advance(Duration::from_secs(15 * 60)).await;
    let stale = cache.get::<Vec<String>>(MARKETS_PAGE_1).expect("stale hit");
    assert_eq!(stale.data.len(), 5);
    assert_eq!(stale.freshness, Freshness::Stale);

    advance(Duration::from_secs(25 * 60)).await;
    assert!(cache.get::<Vec<String>>(MARKETS_PAGE_1).is_none());

    // Still physically present for degraded lookups
    let expired = cache
      .get_any::<Vec<String>>(MARKETS_PAGE_1)
      .expect("expired entry still stored");
    assert_eq!(expired.freshness, Freshness::Expired);
    assert_eq!(cache.len(), 1);
  }

  #[tokio::test(start_paused = true)]
  async fn test_repeated_gets_return_identical_value() {
    let cache = ResponseCache::default();
    cache.set("k", json!({"price": 42.5}));

    let first = cache.get::<Value>("k").expect("hit");
    advance(Duration::from_secs(60)).await;
    let second = cache.get::<Value>("k").expect("hit");

    assert_eq!(first.data, second.data);
    assert_eq!(first.stored_at, second.stored_at);
  }

  #[tokio::test(start_paused = true)]
  async fn test_set_overwrites_and_refreshes_timestamp() {
    let cache = ResponseCache::default();
    cache.set("k", json!(1));
    let first = cache.get::<i32>("k").expect("hit").stored_at;

    advance(Duration::from_secs(20 * 60)).await;
    cache.set("k", json!(2));

    let cached = cache.get::<i32>("k").expect("hit");
    assert_eq!(cached.data, 2);
    assert_eq!(cached.freshness, Freshness::Fresh);
    assert!(cached.stored_at > first);
  }

  #[test]
  fn test_get_missing_key() {
    let cache = ResponseCache::default();
    assert!(cache.get::<Value>("missing").is_none());
    assert!(cache.get_any::<Value>("missing").is_none());
  }

  #[test]
  fn test_type_mismatch_reads_as_absent() {
    let cache = ResponseCache::default();
    cache.set("k", json!({"not": "a list"}));
    assert!(cache.get::<Vec<String>>("k").is_none());
  }

  #[test]
  fn test_invalidate_by_pattern() {
    let cache = ResponseCache::default();
    cache.set("https://api/coins/markets?page=1", json!([]));
    cache.set("https://api/coins/markets?page=2", json!([]));
    cache.set("https://api/global", json!({}));

    assert_eq!(cache.invalidate(Some("markets")), 2);
    assert_eq!(cache.len(), 1);
    assert!(cache.get::<Value>("https://api/global").is_some());

    assert_eq!(cache.invalidate(Some("trending")), 0);
    assert_eq!(cache.len(), 1);
  }

  #[test]
  fn test_invalidate_all() {
    let cache = ResponseCache::default();
    cache.set("a", json!(1));
    cache.set("b", json!(2));

    assert_eq!(cache.invalidate(None), 2);
    assert_eq!(cache.len(), 0);
  }
}
