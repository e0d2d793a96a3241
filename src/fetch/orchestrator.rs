//! Cache-first fetch with pacing, bounded retry, and graceful degradation.

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::time::{sleep, Duration, Instant};
use tracing::{debug, error, info, warn};

use super::error::FetchError;
use super::transport::RawResponse;
use crate::cache::{Cached, Freshness, ResponseCache};
use crate::notify::{Notice, Notifier};
use crate::ratelimit::RateLimiter;

/// Where a fetched value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataSource {
  /// Fresh data from the network
  Network,
  /// Cache hit inside the fresh window
  CacheFresh,
  /// Cache hit past the fresh window
  CacheStale,
  /// Cached copy past the stale window, served because nothing better exists
  CacheExpired,
  /// The caller's default value
  Fallback,
}

/// Result of an orchestrated fetch.
#[derive(Debug, Clone)]
pub struct Fetched<T> {
  pub data: T,
  pub source: DataSource,
  /// When the data was cached (if from cache)
  pub stored_at: Option<Instant>,
}

impl<T> Fetched<T> {
  fn from_network(data: T) -> Self {
    Self {
      data,
      source: DataSource::Network,
      stored_at: None,
    }
  }

  fn from_cache(cached: Cached<T>) -> Self {
    let source = match cached.freshness {
      Freshness::Fresh => DataSource::CacheFresh,
      Freshness::Stale => DataSource::CacheStale,
      Freshness::Expired => DataSource::CacheExpired,
    };
    Self {
      data: cached.data,
      source,
      stored_at: Some(cached.stored_at),
    }
  }

  fn fallback(data: T) -> Self {
    Self {
      data,
      source: DataSource::Fallback,
      stored_at: None,
    }
  }

  /// True when the data is anything other than fresh.
  pub fn is_degraded(&self) -> bool {
    !matches!(self.source, DataSource::Network | DataSource::CacheFresh)
  }
}

/// What to do once every attempt has failed and no cached copy exists.
#[derive(Debug, Clone)]
pub enum OnExhausted<T> {
  ReturnFallback(T),
  Raise,
}

/// Retry and pacing parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
  /// Retries after the first attempt
  pub max_retries: u32,
  /// Delay before the first retry, doubled for each later one
  pub base_backoff: Duration,
  /// Delay inserted when the local limiter is over quota and nothing is cached
  pub pacing_delay: Duration,
  /// Quota utilization above which a rate-limit notice is raised
  pub warning_ratio: f64,
}

impl Default for RetryPolicy {
  fn default() -> Self {
    Self {
      max_retries: 3,
      base_backoff: Duration::from_millis(300),
      pacing_delay: Duration::from_millis(3000),
      warning_ratio: 0.9,
    }
  }
}

impl RetryPolicy {
  /// Delay before retry number `attempt + 1`.
  pub fn backoff_for(&self, attempt: u32) -> Duration {
    self
      .base_backoff
      .saturating_mul(2u32.saturating_pow(attempt))
  }
}

/// Composes the cache and rate limiter around one outbound call.
///
/// Built once at startup and shared. The orchestrator never panics on
/// upstream failure; with `OnExhausted::ReturnFallback` it never errors.
#[derive(Debug)]
pub struct FetchOrchestrator {
  cache: Arc<ResponseCache>,
  limiter: Arc<RateLimiter>,
  policy: RetryPolicy,
  notifier: Notifier,
  offline: AtomicBool,
}

impl FetchOrchestrator {
  pub fn new(cache: Arc<ResponseCache>, limiter: Arc<RateLimiter>, policy: RetryPolicy) -> Self {
    Self {
      cache,
      limiter,
      policy,
      notifier: Notifier::default(),
      offline: AtomicBool::new(false),
    }
  }

  pub fn with_notifier(mut self, notifier: Notifier) -> Self {
    self.notifier = notifier;
    self
  }

  pub fn cache(&self) -> &Arc<ResponseCache> {
    &self.cache
  }

  /// Fetch `identity` using the default retry policy.
  pub async fn fetch<T, F, Fut>(
    &self,
    identity: &str,
    on_exhausted: OnExhausted<T>,
    call: F,
  ) -> Result<Fetched<T>, FetchError>
  where
    T: DeserializeOwned,
    F: Fn() -> Fut,
    Fut: Future<Output = Result<RawResponse, FetchError>>,
  {
    let policy = self.policy;
    self
      .fetch_with_policy(identity, &policy, on_exhausted, call)
      .await
  }

  /// Fetch `identity`, calling `call` for each network attempt.
  ///
  /// 1. Fresh or stale cache hit - return without touching the network
  /// 2. Over the local quota - return any cached copy, else wait out the
  ///    pacing delay and continue
  /// 3. Up to `max_retries + 1` attempts with exponential backoff; a 429
  ///    returns any cached copy immediately
  /// 4. Exhausted - any cached copy, else per `on_exhausted`
  pub async fn fetch_with_policy<T, F, Fut>(
    &self,
    identity: &str,
    policy: &RetryPolicy,
    on_exhausted: OnExhausted<T>,
    call: F,
  ) -> Result<Fetched<T>, FetchError>
  where
    T: DeserializeOwned,
    F: Fn() -> Fut,
    Fut: Future<Output = Result<RawResponse, FetchError>>,
  {
    if let Some(cached) = self.cache.get::<T>(identity) {
      return Ok(Fetched::from_cache(cached));
    }

    let decision = self.limiter.try_consume();
    if !decision.allowed {
      warn!(
        identity,
        recent = decision.recent,
        quota = decision.quota,
        "Rate limit approached, using cached data if available or waiting"
      );
      if decision.utilization() > policy.warning_ratio {
        self.notifier.emit(Notice::RateLimitApproaching {
          recent: decision.recent,
          quota: decision.quota,
        });
      }
      if let Some(cached) = self.cache.get_any::<T>(identity) {
        info!(identity, "Serving cached data while over the local rate limit");
        return Ok(Fetched::from_cache(cached));
      }
      sleep(policy.pacing_delay).await;
    }

    let mut attempt: u32 = 0;
    let last_error = loop {
      let error = match self.attempt::<T, _, _>(identity, &call).await {
        Ok(data) => return Ok(Fetched::from_network(data)),
        Err(FetchError::RateLimited) => {
          warn!(identity, "API rate limit exceeded from server response");
          self.notifier.emit(Notice::ServerRateLimited {
            identity: identity.to_string(),
          });
          if let Some(cached) = self.cache.get_any::<T>(identity) {
            info!(identity, "Serving cached data after 429");
            return Ok(Fetched::from_cache(cached));
          }
          FetchError::RateLimited
        }
        Err(error) => error,
      };

      if attempt >= policy.max_retries {
        break error;
      }
      let delay = policy.backoff_for(attempt);
      attempt += 1;
      warn!(
        identity,
        %error,
        attempts_remaining = policy.max_retries - attempt + 1,
        backoff_ms = delay.as_millis() as u64,
        "Retrying fetch"
      );
      sleep(delay).await;
    };

    let attempts = attempt + 1;
    error!(
      identity,
      attempts,
      status = ?last_error.status(),
      error = %last_error,
      "Fetch failed after all retries"
    );

    if let Some(cached) = self.cache.get_any::<T>(identity) {
      info!(identity, "Serving cached data after error");
      return Ok(Fetched::from_cache(cached));
    }

    match on_exhausted {
      OnExhausted::ReturnFallback(data) => Ok(Fetched::fallback(data)),
      OnExhausted::Raise => Err(FetchError::RetriesExhausted {
        identity: identity.to_string(),
        attempts,
        last: Box::new(last_error),
      }),
    }
  }

  /// One network attempt: call, check status, parse, cache.
  async fn attempt<T, F, Fut>(&self, identity: &str, call: &F) -> Result<T, FetchError>
  where
    T: DeserializeOwned,
    F: Fn() -> Fut,
    Fut: Future<Output = Result<RawResponse, FetchError>>,
  {
    let response = match call().await {
      Ok(response) => {
        self.mark_reachable();
        response
      }
      Err(e) => {
        if e.is_transport() {
          self.mark_unreachable();
        }
        return Err(e);
      }
    };

    if response.status == 429 {
      return Err(FetchError::RateLimited);
    }
    if !response.is_success() {
      return Err(FetchError::Http {
        status: response.status,
        message: error_message(&response.body),
      });
    }

    let value: Value = serde_json::from_slice(&response.body)?;
    let data = T::deserialize(&value)?;
    self.cache.set(identity, value);
    debug!(identity, "Cached response");
    Ok(data)
  }

  fn mark_unreachable(&self) {
    if !self.offline.swap(true, Ordering::SeqCst) {
      warn!("Data provider unreachable");
      self.notifier.emit(Notice::ConnectionLost);
    }
  }

  fn mark_reachable(&self) {
    if self.offline.swap(false, Ordering::SeqCst) {
      info!("Data provider reachable again");
      self.notifier.emit(Notice::ConnectionRestored);
    }
  }
}

/// Pull a human-readable message out of an error body, if there is one.
fn error_message(body: &[u8]) -> Option<String> {
  let value: Value = serde_json::from_slice(body).ok()?;
  ["message", "error"]
    .iter()
    .find_map(|field| value.get(field)?.as_str().map(str::to_string))
    .or_else(|| {
      value
        .pointer("/status/error_message")?
        .as_str()
        .map(str::to_string)
    })
}
