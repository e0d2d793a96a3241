//! Network transport seam for the orchestrator.

use futures::future::BoxFuture;
use futures::FutureExt;
use reqwest::header::ACCEPT;
use std::time::Duration;
use tracing::debug;
use url::Url;

use super::error::FetchError;

/// Status and body of one HTTP response.
#[derive(Debug, Clone)]
pub struct RawResponse {
  pub status: u16,
  pub body: Vec<u8>,
}

impl RawResponse {
  pub fn is_success(&self) -> bool {
    (200..300).contains(&self.status)
  }
}

/// Performs a single GET. Implementations do no retrying or caching.
pub trait Transport: Send + Sync {
  fn get(&self, url: Url) -> BoxFuture<'static, Result<RawResponse, FetchError>>;
}

/// reqwest-backed transport
#[derive(Clone)]
pub struct HttpTransport {
  client: reqwest::Client,
}

impl HttpTransport {
  pub fn new(timeout: Duration) -> Result<Self, FetchError> {
    let client = reqwest::Client::builder()
      .timeout(timeout)
      .user_agent(concat!("coinpulse/", env!("CARGO_PKG_VERSION")))
      .gzip(true)
      .build()?;
    Ok(Self { client })
  }
}

impl Transport for HttpTransport {
  fn get(&self, url: Url) -> BoxFuture<'static, Result<RawResponse, FetchError>> {
    let client = self.client.clone();
    async move {
      debug!(%url, "Fetching data");
      let response = client
        .get(url)
        .header(ACCEPT, "application/json")
        .send()
        .await?;
      let status = response.status().as_u16();
      let body = response.bytes().await?.to_vec();
      Ok(RawResponse { status, body })
    }
    .boxed()
  }
}
