//! Decides when observed queries should refetch.
//!
//! Views subscribe a key prefix with [`RefreshOptions`]; the coordinator
//! turns mounts, route changes, interval ticks, terminal focus and
//! reconnects into dirty markers on the [`QueryStore`]. It never touches the
//! response cache, except for an explicit [`InvalidationCoordinator::refresh_all`].

use std::collections::BTreeMap;
use tokio::time::{Duration, Instant};
use tracing::debug;

use crate::cache::ResponseCache;
use crate::query::{QueryDescriptor, QueryKey};

/// The query-state store, as seen by the coordinator.
pub trait QueryStore {
  /// Descriptors whose key starts with `prefix`.
  fn descriptors_matching(&self, prefix: &QueryKey) -> Vec<QueryDescriptor>;

  /// Keys with at least one observer.
  fn active_keys(&self) -> Vec<QueryKey>;

  /// Mark every query under `prefix` for refetch. Returns how many were marked.
  fn invalidate(&mut self, prefix: &QueryKey) -> usize;

  /// Mark every query with a key part containing `pattern`.
  fn invalidate_matching(&mut self, pattern: &str) -> usize;
}

/// Per-subscription refresh triggers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RefreshOptions {
  pub enabled: bool,
  pub on_route_change: bool,
  pub refetch_interval: Option<Duration>,
  pub refetch_on_focus: bool,
  pub stale_time: Duration,
}

impl Default for RefreshOptions {
  fn default() -> Self {
    Self {
      enabled: true,
      on_route_change: true,
      refetch_interval: None,
      refetch_on_focus: true,
      stale_time: Duration::from_secs(15),
    }
  }
}

impl RefreshOptions {
  pub fn every(interval: Duration, stale_time: Duration) -> Self {
    Self {
      refetch_interval: Some(interval),
      stale_time,
      ..Self::default()
    }
  }

  /// The interval trigger, if it can fire. A zero interval counts as none.
  fn active_interval(&self) -> Option<Duration> {
    self
      .refetch_interval
      .filter(|interval| self.enabled && !interval.is_zero())
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubscriptionId(u64);

#[derive(Debug)]
struct Subscription {
  key: QueryKey,
  options: RefreshOptions,
  next_due: Option<Instant>,
}

#[derive(Debug, Default)]
pub struct InvalidationCoordinator {
  subscriptions: BTreeMap<SubscriptionId, Subscription>,
  next_id: u64,
}

impl InvalidationCoordinator {
  pub fn new() -> Self {
    Self::default()
  }

  /// Register `key` and invalidate it right away, as a mount would.
  pub fn subscribe(
    &mut self,
    store: &mut impl QueryStore,
    key: QueryKey,
    options: RefreshOptions,
    now: Instant,
  ) -> SubscriptionId {
    let id = SubscriptionId(self.next_id);
    self.next_id += 1;

    if options.enabled {
      store.invalidate(&key);
    }
    let next_due = options.active_interval().map(|interval| now + interval);
    debug!(key = %key, ?next_due, "Subscribed");

    self.subscriptions.insert(
      id,
      Subscription {
        key,
        options,
        next_due,
      },
    );
    id
  }

  /// Stop all triggers for a subscription. Returns false if it was unknown.
  pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
    self.subscriptions.remove(&id).is_some()
  }

  pub fn len(&self) -> usize {
    self.subscriptions.len()
  }

  /// The active view changed.
  pub fn route_changed(&mut self, store: &mut impl QueryStore) -> usize {
    self
      .subscriptions
      .values()
      .filter(|sub| sub.options.enabled && sub.options.on_route_change)
      .map(|sub| store.invalidate(&sub.key))
      .sum()
  }

  /// Fire interval triggers that are due. Returns how many fired.
  pub fn tick(&mut self, store: &mut impl QueryStore, now: Instant) -> usize {
    let mut fired = 0;
    for sub in self.subscriptions.values_mut() {
      let (Some(interval), Some(due)) = (sub.options.active_interval(), sub.next_due) else {
        continue;
      };
      if now < due {
        continue;
      }
      debug!(key = %sub.key, "Refetch interval elapsed");
      store.invalidate(&sub.key);
      // Skip missed intervals rather than firing once per missed period
      let mut next = due + interval;
      while next <= now {
        next += interval;
      }
      sub.next_due = Some(next);
      fired += 1;
    }
    fired
  }

  /// The terminal regained focus. Only stale subscriptions are invalidated.
  pub fn focus_gained(&mut self, store: &mut impl QueryStore, now: Instant) -> usize {
    let mut fired = 0;
    for sub in self.subscriptions.values() {
      if !sub.options.enabled || !sub.options.refetch_on_focus {
        continue;
      }
      let descriptors = store.descriptors_matching(&sub.key);
      let stale = descriptors.is_empty()
        || descriptors
          .iter()
          .any(|d| d.is_stale_after(sub.options.stale_time, now));
      if stale {
        debug!(key = %sub.key, "Data is stale, refetching on focus");
        store.invalidate(&sub.key);
        fired += 1;
      }
    }
    fired
  }

  /// Connectivity came back: refetch everything currently observed.
  pub fn reconnected(&mut self, store: &mut impl QueryStore) -> usize {
    store
      .active_keys()
      .iter()
      .map(|key| store.invalidate(key))
      .sum()
  }

  /// Manual refresh: drop cached responses and mark queries matching each
  /// pattern for refetch.
  pub fn refresh_all(
    &mut self,
    store: &mut impl QueryStore,
    cache: &ResponseCache,
    patterns: &[&str],
  ) -> usize {
    let mut marked = 0;
    for pattern in patterns {
      let removed = cache.invalidate(Some(pattern));
      marked += store.invalidate_matching(pattern);
      debug!(pattern, removed, "Refreshed");
    }
    marked
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::query::QueryClient;
  use serde_json::json;
  use tokio::time::advance;

  fn key(parts: &[&str]) -> QueryKey {
    QueryKey::new(parts.iter().copied())
  }

  fn observed(keys: &[QueryKey], options: &RefreshOptions) -> QueryClient {
    let mut store = QueryClient::default();
    for k in keys {
      store.observe(k, options);
    }
    store
  }

  #[tokio::test(start_paused = true)]
  async fn test_subscribe_invalidates_immediately() {
    let k = key(&["global"]);
    let mut store = observed(&[k.clone()], &RefreshOptions::default());
    let mut coordinator = InvalidationCoordinator::new();

    coordinator.subscribe(&mut store, k.clone(), RefreshOptions::default(), Instant::now());
    assert!(store.take_dirty(&k));
  }

  #[tokio::test(start_paused = true)]
  async fn test_disabled_subscription_never_fires() {
    let k = key(&["global"]);
    let options = RefreshOptions {
      enabled: false,
      ..RefreshOptions::every(Duration::from_secs(60), Duration::from_secs(15))
    };
    let mut store = observed(&[k.clone()], &options);
    let mut coordinator = InvalidationCoordinator::new();

    coordinator.subscribe(&mut store, k.clone(), options, Instant::now());
    advance(Duration::from_secs(120)).await;
    assert_eq!(coordinator.tick(&mut store, Instant::now()), 0);
    assert_eq!(coordinator.route_changed(&mut store), 0);
    assert!(!store.take_dirty(&k));
  }

  #[tokio::test(start_paused = true)]
  async fn test_interval_repeats_until_unsubscribed() {
    let k = key(&["markets"]);
    let options = RefreshOptions::every(Duration::from_secs(60), Duration::from_secs(15));
    let mut store = observed(&[k.clone()], &options);
    let mut coordinator = InvalidationCoordinator::new();

    let id = coordinator.subscribe(&mut store, k.clone(), options, Instant::now());
    store.take_dirty(&k);

    advance(Duration::from_secs(59)).await;
    assert_eq!(coordinator.tick(&mut store, Instant::now()), 0);

    advance(Duration::from_secs(1)).await;
    assert_eq!(coordinator.tick(&mut store, Instant::now()), 1);
    assert!(store.take_dirty(&k));

    advance(Duration::from_secs(60)).await;
    assert_eq!(coordinator.tick(&mut store, Instant::now()), 1);

    assert!(coordinator.unsubscribe(id));
    advance(Duration::from_secs(60)).await;
    assert_eq!(coordinator.tick(&mut store, Instant::now()), 0);
  }

  #[tokio::test(start_paused = true)]
  async fn test_missed_intervals_fire_once() {
    let k = key(&["trending"]);
    let options = RefreshOptions::every(Duration::from_secs(10), Duration::from_secs(15));
    let mut store = observed(&[k.clone()], &options);
    let mut coordinator = InvalidationCoordinator::new();
    coordinator.subscribe(&mut store, k, options, Instant::now());

    advance(Duration::from_secs(35)).await;
    assert_eq!(coordinator.tick(&mut store, Instant::now()), 1);
    assert_eq!(coordinator.tick(&mut store, Instant::now()), 0);

    advance(Duration::from_secs(5)).await;
    assert_eq!(coordinator.tick(&mut store, Instant::now()), 1);
  }

  #[tokio::test(start_paused = true)]
  async fn test_zero_interval_never_fires() {
    let k = key(&["markets"]);
    let options = RefreshOptions::every(Duration::ZERO, Duration::from_secs(15));
    let mut store = observed(&[k.clone()], &options);
    let mut coordinator = InvalidationCoordinator::new();
    coordinator.subscribe(&mut store, k.clone(), options, Instant::now());
    assert!(store.take_dirty(&k));

    advance(Duration::from_secs(1)).await;
    assert_eq!(coordinator.tick(&mut store, Instant::now()), 0);
    assert!(!store.take_dirty(&k));
  }

  #[tokio::test(start_paused = true)]
  async fn test_focus_refetches_only_stale_data() {
    let k = key(&["coin", "bitcoin"]);
    let options = RefreshOptions::default();
    let mut store = observed(&[k.clone()], &options);
    let mut coordinator = InvalidationCoordinator::new();
    coordinator.subscribe(&mut store, k.clone(), options, Instant::now());
    store.take_dirty(&k);

    // Never updated counts as stale
    assert_eq!(coordinator.focus_gained(&mut store, Instant::now()), 1);
    store.take_dirty(&k);

    store.record_success(&k, Instant::now());
    advance(Duration::from_secs(10)).await;
    assert_eq!(coordinator.focus_gained(&mut store, Instant::now()), 0);
    assert!(!store.take_dirty(&k));

    advance(Duration::from_secs(6)).await;
    assert_eq!(coordinator.focus_gained(&mut store, Instant::now()), 1);
    assert!(store.take_dirty(&k));
  }

  #[tokio::test(start_paused = true)]
  async fn test_route_change_respects_option() {
    let market = key(&["markets"]);
    let detail = key(&["coin", "bitcoin"]);
    let mut store = observed(&[market.clone(), detail.clone()], &RefreshOptions::default());
    let mut coordinator = InvalidationCoordinator::new();

    coordinator.subscribe(&mut store, market.clone(), RefreshOptions::default(), Instant::now());
    coordinator.subscribe(
      &mut store,
      detail.clone(),
      RefreshOptions {
        on_route_change: false,
        ..RefreshOptions::default()
      },
      Instant::now(),
    );
    store.take_dirty(&market);
    store.take_dirty(&detail);

    coordinator.route_changed(&mut store);
    assert!(store.take_dirty(&market));
    assert!(!store.take_dirty(&detail));
  }

  #[test]
  fn test_reconnected_marks_every_observed_query() {
    let keys = [key(&["global"]), key(&["trending"])];
    let mut store = observed(&keys, &RefreshOptions::default());
    let mut coordinator = InvalidationCoordinator::new();

    assert_eq!(coordinator.reconnected(&mut store), 2);
    assert!(keys.iter().all(|k| store.take_dirty(k)));
  }

  #[test]
  fn test_invalidation_leaves_cache_untouched() {
    let cache = ResponseCache::default();
    cache.set("https://api/global", json!({"data": {}}));
    let k = key(&["global"]);
    let mut store = observed(&[k.clone()], &RefreshOptions::default());
    let mut coordinator = InvalidationCoordinator::new();

    coordinator.route_changed(&mut store);
    coordinator.reconnected(&mut store);
    coordinator.reconnected(&mut store);

    assert_eq!(cache.len(), 1);
    assert!(store.take_dirty(&k));
    assert!(!store.take_dirty(&k));
  }

  #[test]
  fn test_refresh_all_clears_cache_and_marks_queries() {
    let cache = ResponseCache::default();
    cache.set("https://api/coins/markets?page=1", json!([]));
    cache.set("https://api/global", json!({}));
    cache.set("https://api/coins/bitcoin", json!({}));

    let keys = [key(&["markets", "usd", "20", "1"]), key(&["global"]), key(&["coin", "bitcoin"])];
    let mut store = observed(&keys, &RefreshOptions::default());
    let mut coordinator = InvalidationCoordinator::new();

    let marked = coordinator.refresh_all(&mut store, &cache, &["markets", "global", "trending"]);
    assert_eq!(marked, 2);
    assert_eq!(cache.len(), 1);
    assert!(!store.take_dirty(&key(&["coin", "bitcoin"])));
  }
}
