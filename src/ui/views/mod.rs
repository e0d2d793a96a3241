mod coin_detail;
mod market;
mod trending;

pub use coin_detail::CoinDetailView;
pub use market::MarketView;
pub use trending::TrendingView;

use crate::coingecko::{CoinGeckoClient, Resource};
use crate::config::RefreshConfig;
use crate::query::{Query, QueryKey};
use std::future::Future;

/// Services every view needs to build its queries
#[derive(Clone)]
pub struct ViewContext {
  pub client: CoinGeckoClient,
  pub refresh: RefreshConfig,
  pub per_page: u32,
}

impl ViewContext {
  /// Build a query for `resource`, running `fetch` against a client clone
  fn query<T, F, Fut>(&self, resource: &Resource, fetch: F) -> Query<T>
  where
    T: Send + 'static,
    F: Fn(CoinGeckoClient) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, String>> + Send + 'static,
  {
    let client = self.client.clone();
    Query::new(QueryKey::new(resource.query_key()), move || fetch(client.clone()))
  }
}
