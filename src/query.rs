//! Query state: typed async queries plus the descriptor registry behind them.
//!
//! Inspired by TanStack Query. A [`Query<T>`] owns the fetch closure and the
//! loading/success/error state for one view. The [`QueryClient`] owns one
//! [`QueryDescriptor`] per observed key and the dirty markers that the
//! invalidation coordinator sets.
//!
//! # Example
//!
//! ```ignore
//! let client = api.clone();
//! let mut query = Query::new(QueryKey::new(["global"]), move || {
//!     let client = client.clone();
//!     async move { client.global().await.map_err(|e| e.to_string()) }
//! });
//!
//! // In the event loop tick: poll, record, and refetch when marked dirty
//! if query.sync(&mut queries) {
//!     // State changed, trigger re-render
//! }
//! ```

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use tokio::sync::mpsc;
use tokio::time::{Duration, Instant};
use tracing::{debug, error};

use crate::invalidation::{QueryStore, RefreshOptions};
use crate::notify::{Notice, Notifier};

/// Hierarchical key identifying a query, e.g. `markets:usd:20:1`.
///
/// Invalidating a key also hits every key it is a prefix of.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QueryKey(Vec<String>);

impl QueryKey {
  pub fn new<I, S>(parts: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: ToString,
  {
    Self(parts.into_iter().map(|p| p.to_string()).collect())
  }

  pub fn starts_with(&self, prefix: &QueryKey) -> bool {
    self.0.starts_with(&prefix.0)
  }

  /// Substring match against any part, used by pattern invalidation.
  pub fn contains(&self, pattern: &str) -> bool {
    self.0.iter().any(|part| part.contains(pattern))
  }
}

impl fmt::Display for QueryKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.0.join(":"))
  }
}

/// Bookkeeping for one observed query.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryDescriptor {
  pub key: QueryKey,
  /// When the last successful fetch landed
  pub last_updated_at: Option<Instant>,
  pub stale_time: Duration,
  pub refetch_interval: Option<Duration>,
  pub observer_count: usize,
}

impl QueryDescriptor {
  /// True when the data is older than `stale_time`, or was never fetched.
  pub fn is_stale_after(&self, stale_time: Duration, now: Instant) -> bool {
    self
      .last_updated_at
      .map_or(true, |at| now.saturating_duration_since(at) > stale_time)
  }
}

#[derive(Debug)]
struct QueryEntry {
  descriptor: QueryDescriptor,
  dirty: bool,
}

/// Registry of observed queries.
///
/// Descriptors are created on first `observe`, updated on each successful
/// fetch, and destroyed when the last observer releases them.
#[derive(Debug, Default)]
pub struct QueryClient {
  entries: HashMap<QueryKey, QueryEntry>,
  notifier: Notifier,
}

impl QueryClient {
  pub fn new(notifier: Notifier) -> Self {
    Self {
      entries: HashMap::new(),
      notifier,
    }
  }

  /// Register an observer for `key`.
  pub fn observe(&mut self, key: &QueryKey, options: &RefreshOptions) {
    let entry = self.entries.entry(key.clone()).or_insert_with(|| QueryEntry {
      descriptor: QueryDescriptor {
        key: key.clone(),
        last_updated_at: None,
        stale_time: options.stale_time,
        refetch_interval: options.refetch_interval,
        observer_count: 0,
      },
      dirty: false,
    });
    entry.descriptor.observer_count += 1;
  }

  /// Drop an observer; the descriptor goes away with the last one.
  pub fn release(&mut self, key: &QueryKey) {
    if let Some(entry) = self.entries.get_mut(key) {
      entry.descriptor.observer_count = entry.descriptor.observer_count.saturating_sub(1);
      if entry.descriptor.observer_count == 0 {
        self.entries.remove(key);
      }
    }
  }

  pub fn descriptor(&self, key: &QueryKey) -> Option<&QueryDescriptor> {
    self.entries.get(key).map(|entry| &entry.descriptor)
  }

  pub fn record_success(&mut self, key: &QueryKey, at: Instant) {
    if let Some(entry) = self.entries.get_mut(key) {
      let last = &mut entry.descriptor.last_updated_at;
      *last = Some(last.map_or(at, |prev| prev.max(at)));
    }
  }

  /// A terminal error reached the store; tell the user.
  pub fn record_failure(&mut self, key: &QueryKey, message: &str) {
    error!(key = %key, message, "Query failed");
    self.notifier.emit(Notice::QueryFailed {
      key: key.to_string(),
      message: message.to_string(),
    });
  }

  /// Consume the dirty marker for `key`.
  pub fn take_dirty(&mut self, key: &QueryKey) -> bool {
    self
      .entries
      .get_mut(key)
      .map(|entry| std::mem::take(&mut entry.dirty))
      .unwrap_or(false)
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }

  fn mark_where(&mut self, predicate: impl Fn(&QueryKey) -> bool) -> usize {
    let mut marked = 0;
    for (key, entry) in self.entries.iter_mut() {
      if predicate(key) {
        entry.dirty = true;
        marked += 1;
      }
    }
    marked
  }
}

impl QueryStore for QueryClient {
  fn descriptors_matching(&self, prefix: &QueryKey) -> Vec<QueryDescriptor> {
    self
      .entries
      .iter()
      .filter(|(key, _)| key.starts_with(prefix))
      .map(|(_, entry)| entry.descriptor.clone())
      .collect()
  }

  fn active_keys(&self) -> Vec<QueryKey> {
    self
      .entries
      .values()
      .filter(|entry| entry.descriptor.observer_count > 0)
      .map(|entry| entry.descriptor.key.clone())
      .collect()
  }

  fn invalidate(&mut self, prefix: &QueryKey) -> usize {
    self.mark_where(|key| key.starts_with(prefix))
  }

  fn invalidate_matching(&mut self, pattern: &str) -> usize {
    self.mark_where(|key| key.contains(pattern))
  }
}

/// The state of a query
#[derive(Debug, Clone)]
pub enum QueryState<T> {
  /// Query has not been started
  Idle,
  /// First fetch in flight, no data yet
  Loading,
  /// Query completed successfully
  Success(T),
  /// Query failed with an error
  Error(String),
}

impl<T> QueryState<T> {
  pub fn is_loading(&self) -> bool {
    matches!(self, QueryState::Loading)
  }

  pub fn data(&self) -> Option<&T> {
    match self {
      QueryState::Success(data) => Some(data),
      _ => None,
    }
  }

  pub fn error(&self) -> Option<&str> {
    match self {
      QueryState::Error(e) => Some(e),
      _ => None,
    }
  }
}

type BoxFuture<T> = Pin<Box<dyn Future<Output = Result<T, String>> + Send>>;

type FetcherFn<T> = Box<dyn Fn() -> BoxFuture<T> + Send + Sync>;

/// Async query for one keyed resource.
///
/// Data from a previous success stays visible while a refetch is in flight.
pub struct Query<T> {
  key: QueryKey,
  state: QueryState<T>,
  fetcher: FetcherFn<T>,
  receiver: Option<mpsc::UnboundedReceiver<Result<T, String>>>,
  fetched_at: Option<Instant>,
}

impl<T: Send + 'static> Query<T> {
  pub fn new<F, Fut>(key: QueryKey, fetcher: F) -> Self
  where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, String>> + Send + 'static,
  {
    Self {
      key,
      state: QueryState::Idle,
      fetcher: Box::new(move || Box::pin(fetcher())),
      receiver: None,
      fetched_at: None,
    }
  }

  pub fn key(&self) -> &QueryKey {
    &self.key
  }

  pub fn state(&self) -> &QueryState<T> {
    &self.state
  }

  pub fn data(&self) -> Option<&T> {
    self.state.data()
  }

  /// True while any fetch is in flight, including background refetches.
  pub fn is_fetching(&self) -> bool {
    self.receiver.is_some()
  }

  /// Force a refetch. A pending fetch is abandoned, not cancelled: it still
  /// runs to completion, only its result is dropped.
  pub fn refetch(&mut self) {
    self.receiver = None;
    self.start_fetch();
  }

  /// Poll for results from a pending fetch.
  ///
  /// Returns `true` if the state changed (data arrived or error occurred).
  pub fn poll(&mut self) -> bool {
    let receiver = match &mut self.receiver {
      Some(rx) => rx,
      None => return false,
    };

    match receiver.try_recv() {
      Ok(Ok(data)) => {
        self.state = QueryState::Success(data);
        self.fetched_at = Some(Instant::now());
        self.receiver = None;
        true
      }
      Ok(Err(error)) => {
        self.state = QueryState::Error(error);
        self.receiver = None;
        true
      }
      Err(mpsc::error::TryRecvError::Empty) => false,
      Err(mpsc::error::TryRecvError::Disconnected) => {
        self.state = QueryState::Error("Query was cancelled".to_string());
        self.receiver = None;
        true
      }
    }
  }

  /// Poll, report the outcome to the store, and refetch when the store has
  /// marked this key dirty. Starts the first fetch of an idle query.
  pub fn sync(&mut self, store: &mut QueryClient) -> bool {
    let changed = self.poll();
    if changed {
      match &self.state {
        QueryState::Success(_) => {
          store.record_success(&self.key, self.fetched_at.unwrap_or_else(Instant::now))
        }
        QueryState::Error(message) => store.record_failure(&self.key, message),
        _ => {}
      }
    }

    let dirty = store.take_dirty(&self.key);
    if matches!(self.state, QueryState::Idle) {
      self.start_fetch();
    } else if dirty && !self.is_fetching() {
      debug!(key = %self.key, "Refetching invalidated query");
      self.start_fetch();
    }
    changed
  }

  fn start_fetch(&mut self) {
    let (tx, rx) = mpsc::unbounded_channel();
    self.receiver = Some(rx);
    if !matches!(self.state, QueryState::Success(_)) {
      self.state = QueryState::Loading;
    }

    let future = (self.fetcher)();
    tokio::spawn(async move {
      let result = future.await;
      // Receiver may have been dropped by a refetch
      let _ = tx.send(result);
    });
  }
}

impl<T: fmt::Debug> fmt::Debug for Query<T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Query")
      .field("key", &self.key)
      .field("state", &self.state)
      .field("fetched_at", &self.fetched_at)
      .finish_non_exhaustive()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::atomic::{AtomicU32, Ordering};
  use std::sync::Arc;

  fn key(parts: &[&str]) -> QueryKey {
    QueryKey::new(parts.iter().copied())
  }

  /// Let spawned fetch tasks run to completion.
  async fn settle() {
    tokio::time::sleep(Duration::from_millis(10)).await;
  }

  #[test]
  fn test_key_prefix_and_pattern() {
    let page = key(&["markets", "usd", "20", "1"]);
    assert!(page.starts_with(&key(&["markets"])));
    assert!(!page.starts_with(&key(&["global"])));
    assert!(page.contains("market"));
    assert_eq!(page.to_string(), "markets:usd:20:1");
  }

  #[test]
  fn test_descriptor_lifecycle() {
    let mut client = QueryClient::default();
    let k = key(&["global"]);
    let options = RefreshOptions::default();

    client.observe(&k, &options);
    client.observe(&k, &options);
    assert_eq!(client.descriptor(&k).unwrap().observer_count, 2);

    client.release(&k);
    assert_eq!(client.descriptor(&k).unwrap().observer_count, 1);

    client.release(&k);
    assert!(client.descriptor(&k).is_none());
    assert_eq!(client.len(), 0);
  }

  #[test]
  fn test_invalidate_marks_prefix_matches_once() {
    let mut client = QueryClient::default();
    let options = RefreshOptions::default();
    client.observe(&key(&["markets", "usd", "20", "1"]), &options);
    client.observe(&key(&["markets", "usd", "20", "2"]), &options);
    client.observe(&key(&["global"]), &options);

    assert_eq!(client.invalidate(&key(&["markets"])), 2);
    assert!(client.take_dirty(&key(&["markets", "usd", "20", "1"])));
    assert!(!client.take_dirty(&key(&["markets", "usd", "20", "1"])));
    assert!(!client.take_dirty(&key(&["global"])));
  }

  #[test]
  fn test_invalidate_unknown_key_is_noop() {
    let mut client = QueryClient::default();
    assert_eq!(client.invalidate(&key(&["trending"])), 0);
    assert_eq!(client.invalidate_matching("trending"), 0);
    assert!(!client.take_dirty(&key(&["trending"])));
  }

  #[test]
  fn test_record_failure_emits_notice() {
    let (tx, mut rx) = crate::notify::channel();
    let mut client = QueryClient::new(Notifier::new(tx));
    client.record_failure(&key(&["global"]), "boom");

    assert!(matches!(
      rx.try_recv(),
      Ok(Notice::QueryFailed { ref key, .. }) if key == "global"
    ));
  }

  #[tokio::test]
  async fn test_sync_starts_idle_query_and_records_success() {
    let mut client = QueryClient::default();
    let k = key(&["global"]);
    client.observe(&k, &RefreshOptions::default());

    let mut query = Query::new(k.clone(), || async { Ok::<_, String>(vec![1, 2, 3]) });
    assert!(matches!(query.state(), QueryState::Idle));

    query.sync(&mut client);
    assert!(query.state().is_loading());

    settle().await;
    assert!(query.sync(&mut client));
    assert_eq!(query.data(), Some(&vec![1, 2, 3]));
    assert!(client.descriptor(&k).unwrap().last_updated_at.is_some());
  }

  #[tokio::test]
  async fn test_sync_refetches_when_dirty_and_keeps_data() {
    let counter = Arc::new(AtomicU32::new(0));
    let counter_clone = counter.clone();
    let mut client = QueryClient::default();
    let k = key(&["trending"]);
    client.observe(&k, &RefreshOptions::default());

    let mut query = Query::new(k.clone(), move || {
      let counter = counter_clone.clone();
      async move { Ok::<_, String>(counter.fetch_add(1, Ordering::SeqCst)) }
    });

    query.sync(&mut client);
    settle().await;
    query.sync(&mut client);
    assert_eq!(query.data(), Some(&0));

    client.invalidate(&k);
    query.sync(&mut client);
    assert!(query.is_fetching());
    // Previous data stays visible during the refetch
    assert_eq!(query.data(), Some(&0));

    settle().await;
    query.sync(&mut client);
    assert_eq!(query.data(), Some(&1));
  }

  #[tokio::test]
  async fn test_dirty_while_fetching_does_not_double_fetch() {
    let counter = Arc::new(AtomicU32::new(0));
    let counter_clone = counter.clone();
    let mut client = QueryClient::default();
    let k = key(&["global"]);
    client.observe(&k, &RefreshOptions::default());

    let mut query = Query::new(k.clone(), move || {
      let counter = counter_clone.clone();
      async move {
        counter.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(50)).await;
        Ok::<_, String>(())
      }
    });

    query.sync(&mut client);
    client.invalidate(&k);
    query.sync(&mut client);

    tokio::time::sleep(Duration::from_millis(100)).await;
    query.sync(&mut client);
    assert_eq!(counter.load(Ordering::SeqCst), 1);
  }

  #[tokio::test]
  async fn test_query_error_reaches_store() {
    let (tx, mut rx) = crate::notify::channel();
    let mut client = QueryClient::new(Notifier::new(tx));
    let k = key(&["coin", "bitcoin"]);
    client.observe(&k, &RefreshOptions::default());

    let mut query: Query<i32> = Query::new(k, || async { Err("Something went wrong".to_string()) });
    query.sync(&mut client);
    settle().await;

    assert!(query.sync(&mut client));
    assert_eq!(query.state().error(), Some("Something went wrong"));
    assert!(matches!(rx.try_recv(), Ok(Notice::QueryFailed { .. })));
  }

  #[tokio::test]
  async fn test_refetch_abandons_pending() {
    let counter = Arc::new(AtomicU32::new(0));
    let counter_clone = counter.clone();

    let mut query = Query::new(key(&["chart"]), move || {
      let counter = counter_clone.clone();
      async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        Ok::<_, String>(counter.fetch_add(1, Ordering::SeqCst))
      }
    });

    query.refetch();
    tokio::time::sleep(Duration::from_millis(10)).await;

    query.refetch();
    tokio::time::sleep(Duration::from_millis(100)).await;

    query.poll();
    // Both fetches ran; only the second one's result was received
    assert_eq!(counter.load(Ordering::SeqCst), 2);
    assert_eq!(query.data(), Some(&1));
  }
}
