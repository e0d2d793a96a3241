use color_eyre::{eyre::eyre, Result};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tracing::debug;
use url::Url;

use super::api_types::{CoinDetail, GlobalResponse, MarketChart, MarketCoin, TrendingResponse};
use super::endpoints::Resource;
use crate::config::ApiConfig;
use crate::fetch::{FetchError, FetchOrchestrator, OnExhausted, Transport};

/// What a call returns once retries are exhausted and nothing is cached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminalPolicy {
  /// Resolve to the empty value of the resource type
  Fallback,
  /// Surface `FetchError::RetriesExhausted`
  Raise,
}

/// CoinGecko API client.
///
/// Builds URLs and hands them to the shared orchestrator; all caching,
/// pacing and retrying happen there.
#[derive(Clone)]
pub struct CoinGeckoClient {
  base_url: Url,
  currency: String,
  transport: Arc<dyn Transport>,
  orchestrator: Arc<FetchOrchestrator>,
  policy: TerminalPolicy,
}

impl CoinGeckoClient {
  pub fn new(
    config: &ApiConfig,
    transport: Arc<dyn Transport>,
    orchestrator: Arc<FetchOrchestrator>,
  ) -> Result<Self> {
    let base_url = Url::parse(&config.base_url)
      .map_err(|e| eyre!("Invalid API base URL {}: {}", config.base_url, e))?;
    if base_url.cannot_be_a_base() {
      return Err(eyre!("API base URL {} cannot be used as a base", config.base_url));
    }

    Ok(Self {
      base_url,
      currency: config.currency.to_lowercase(),
      transport,
      orchestrator,
      policy: TerminalPolicy::Fallback,
    })
  }

  pub fn with_policy(mut self, policy: TerminalPolicy) -> Self {
    self.policy = policy;
    self
  }

  pub fn currency(&self) -> &str {
    &self.currency
  }

  /// Coins trending in searches over the last 24 hours
  pub async fn trending(&self) -> Result<TrendingResponse, FetchError> {
    self.get(Resource::Trending).await
  }

  /// One page of coins ordered by market cap
  pub async fn markets(&self, page: u32, per_page: u32) -> Result<Vec<MarketCoin>, FetchError> {
    self
      .get(Resource::Markets {
        currency: self.currency.clone(),
        per_page,
        page,
      })
      .await
  }

  /// Market-wide totals
  pub async fn global(&self) -> Result<GlobalResponse, FetchError> {
    self.get(Resource::Global).await
  }

  /// Detail for one coin. An empty id resolves to the empty value without a request.
  pub async fn coin_detail(&self, id: &str) -> Result<CoinDetail, FetchError> {
    if id.is_empty() {
      return Ok(CoinDetail::default());
    }
    self.get(Resource::CoinDetail { id: id.to_string() }).await
  }

  /// Price history for one coin over the last `days` days
  pub async fn coin_chart(&self, id: &str, days: u32) -> Result<MarketChart, FetchError> {
    if id.is_empty() {
      return Ok(MarketChart::default());
    }
    self
      .get(Resource::CoinChart {
        id: id.to_string(),
        currency: self.currency.clone(),
        days,
      })
      .await
  }

  async fn get<T>(&self, resource: Resource) -> Result<T, FetchError>
  where
    T: DeserializeOwned + Default,
  {
    let url = resource.url(&self.base_url);
    let on_exhausted = match self.policy {
      TerminalPolicy::Fallback => OnExhausted::ReturnFallback(T::default()),
      TerminalPolicy::Raise => OnExhausted::Raise,
    };

    let transport = &self.transport;
    let fetched = self
      .orchestrator
      .fetch(url.as_str(), on_exhausted, || transport.get(url.clone()))
      .await?;
    debug!(
      resource = resource.descriptor().name,
      source = ?fetched.source,
      degraded = fetched.is_degraded(),
      "Resolved request"
    );
    Ok(fetched.data)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::ResponseCache;
  use crate::fetch::{RawResponse, RetryPolicy};
  use crate::ratelimit::RateLimiter;
  use futures::future::BoxFuture;
  use futures::FutureExt;
  use std::sync::Mutex;

  /// Answers every request with the same response and records the URLs.
  struct Recording {
    status: u16,
    body: &'static str,
    urls: Mutex<Vec<String>>,
  }

  impl Recording {
    fn new(status: u16, body: &'static str) -> Arc<Self> {
      Arc::new(Self {
        status,
        body,
        urls: Mutex::new(Vec::new()),
      })
    }

    fn urls(&self) -> Vec<String> {
      self.urls.lock().unwrap().clone()
    }
  }

  impl Transport for Recording {
    fn get(&self, url: Url) -> BoxFuture<'static, Result<RawResponse, FetchError>> {
      self.urls.lock().unwrap().push(url.to_string());
      let response = RawResponse {
        status: self.status,
        body: self.body.as_bytes().to_vec(),
      };
      async move { Ok(response) }.boxed()
    }
  }

  fn client(transport: Arc<Recording>) -> CoinGeckoClient {
    let orchestrator = FetchOrchestrator::new(
      Arc::new(ResponseCache::default()),
      Arc::new(RateLimiter::default()),
      RetryPolicy::default(),
    );
    CoinGeckoClient::new(&ApiConfig::default(), transport, Arc::new(orchestrator)).unwrap()
  }

  #[tokio::test(start_paused = true)]
  async fn test_markets_requests_page_url() {
    let transport = Recording::new(200, r#"[{"id": "bitcoin", "symbol": "btc", "name": "Bitcoin"}]"#);
    let coins = client(transport.clone()).markets(2, 20).await.unwrap();

    assert_eq!(coins.len(), 1);
    assert_eq!(coins[0].id, "bitcoin");
    assert_eq!(
      transport.urls(),
      vec!["https://api.coingecko.com/api/v3/coins/markets?vs_currency=usd&order=market_cap_desc&per_page=20&page=2&sparkline=false"]
    );
  }

  #[tokio::test(start_paused = true)]
  async fn test_second_call_is_served_from_cache() {
    let transport = Recording::new(200, r#"{"data": {"total_market_cap": {"usd": 1.0}}}"#);
    let client = client(transport.clone());

    client.global().await.unwrap();
    let global = client.global().await.unwrap();

    assert_eq!(global.data.market_cap("usd"), Some(1.0));
    assert_eq!(transport.urls().len(), 1);
  }

  #[tokio::test(start_paused = true)]
  async fn test_empty_id_makes_no_request() {
    let transport = Recording::new(200, "{}");
    let client = client(transport.clone());

    assert!(client.coin_detail("").await.unwrap().is_empty());
    assert!(client.coin_chart("", 7).await.unwrap().prices.is_empty());
    assert!(transport.urls().is_empty());
  }

  #[tokio::test(start_paused = true)]
  async fn test_fallback_policy_returns_empty_value() {
    let transport = Recording::new(500, r#"{"error": "down"}"#);
    let trending = client(transport.clone()).trending().await.unwrap();

    assert!(trending.coins.is_empty());
    assert_eq!(transport.urls().len(), 4);
  }

  #[tokio::test(start_paused = true)]
  async fn test_raise_policy_surfaces_error() {
    let transport = Recording::new(500, "{}");
    let client = client(transport).with_policy(TerminalPolicy::Raise);

    let err = client.coin_detail("bitcoin").await.unwrap_err();
    assert!(matches!(err, FetchError::RetriesExhausted { attempts: 4, .. }));
  }

  #[test]
  fn test_rejects_invalid_base_url() {
    let config = ApiConfig {
      base_url: "not a url".to_string(),
      ..ApiConfig::default()
    };
    let orchestrator = Arc::new(FetchOrchestrator::new(
      Arc::new(ResponseCache::default()),
      Arc::new(RateLimiter::default()),
      RetryPolicy::default(),
    ));
    let result = CoinGeckoClient::new(&config, Recording::new(200, "{}"), orchestrator);
    assert!(result.is_err());
  }
}
