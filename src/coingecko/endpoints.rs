//! The upstream resources and how each one maps to a URL and a query key.

use url::Url;

/// Static description of one upstream resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceDescriptor {
  pub name: &'static str,
  /// Path below the base URL; `{id}` is replaced by the coin id
  pub path: &'static str,
  pub params: &'static [&'static str],
}

pub const RESOURCES: [ResourceDescriptor; 5] = [
  ResourceDescriptor {
    name: "trending",
    path: "search/trending",
    params: &[],
  },
  ResourceDescriptor {
    name: "markets",
    path: "coins/markets",
    params: &["vs_currency", "order", "per_page", "page", "sparkline"],
  },
  ResourceDescriptor {
    name: "global",
    path: "global",
    params: &[],
  },
  ResourceDescriptor {
    name: "coin",
    path: "coins/{id}",
    params: &[
      "localization",
      "tickers",
      "community_data",
      "developer_data",
    ],
  },
  ResourceDescriptor {
    name: "chart",
    path: "coins/{id}/market_chart",
    params: &["vs_currency", "days"],
  },
];

/// One concrete request against a [`ResourceDescriptor`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Resource {
  Trending,
  Markets {
    currency: String,
    per_page: u32,
    page: u32,
  },
  Global,
  CoinDetail {
    id: String,
  },
  CoinChart {
    id: String,
    currency: String,
    days: u32,
  },
}

impl Resource {
  pub fn descriptor(&self) -> &'static ResourceDescriptor {
    let index = match self {
      Resource::Trending => 0,
      Resource::Markets { .. } => 1,
      Resource::Global => 2,
      Resource::CoinDetail { .. } => 3,
      Resource::CoinChart { .. } => 4,
    };
    &RESOURCES[index]
  }

  /// Path with the coin id filled in.
  pub fn path(&self) -> String {
    let template = self.descriptor().path;
    match self {
      Resource::CoinDetail { id } | Resource::CoinChart { id, .. } => template.replace("{id}", id),
      _ => template.to_string(),
    }
  }

  fn params(&self) -> Vec<String> {
    match self {
      Resource::Trending | Resource::Global => Vec::new(),
      Resource::Markets {
        currency,
        per_page,
        page,
      } => vec![
        currency.clone(),
        "market_cap_desc".to_string(),
        per_page.to_string(),
        page.to_string(),
        "false".to_string(),
      ],
      Resource::CoinDetail { .. } => vec!["false".to_string(); 4],
      Resource::CoinChart { currency, days, .. } => vec![currency.clone(), days.to_string()],
    }
  }

  /// Full request URL, which doubles as the cache identity.
  pub fn url(&self, base: &Url) -> Url {
    let mut url = base.clone();
    if let Ok(mut segments) = url.path_segments_mut() {
      segments.pop_if_empty().extend(self.path().split('/'));
    }

    let params = self.params();
    if !params.is_empty() {
      url
        .query_pairs_mut()
        .extend_pairs(self.descriptor().params.iter().zip(params.iter()));
    }
    url
  }

  /// Hierarchical key used by the query store, e.g. `["chart", id, cur, days]`.
  pub fn query_key(&self) -> Vec<String> {
    match self {
      Resource::Trending => vec!["trending".to_string()],
      Resource::Global => vec!["global".to_string()],
      Resource::Markets {
        currency,
        per_page,
        page,
      } => vec![
        "markets".to_string(),
        currency.clone(),
        per_page.to_string(),
        page.to_string(),
      ],
      Resource::CoinDetail { id } => vec!["coin".to_string(), id.clone()],
      Resource::CoinChart { id, currency, days } => vec![
        "chart".to_string(),
        id.clone(),
        currency.clone(),
        days.to_string(),
      ],
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn base() -> Url {
    Url::parse("https://api.coingecko.com/api/v3").unwrap()
  }

  #[test]
  fn test_descriptors_line_up_with_params() {
    let resources = [
      Resource::Trending,
      Resource::Markets {
        currency: "usd".into(),
        per_page: 20,
        page: 1,
      },
      Resource::Global,
      Resource::CoinDetail { id: "bitcoin".into() },
      Resource::CoinChart {
        id: "bitcoin".into(),
        currency: "usd".into(),
        days: 7,
      },
    ];
    for resource in &resources {
      assert_eq!(resource.descriptor().params.len(), resource.params().len());
    }
  }

  #[test]
  fn test_markets_url() {
    let url = Resource::Markets {
      currency: "usd".into(),
      per_page: 20,
      page: 2,
    }
    .url(&base());
    assert_eq!(
      url.as_str(),
      "https://api.coingecko.com/api/v3/coins/markets?vs_currency=usd&order=market_cap_desc&per_page=20&page=2&sparkline=false"
    );
  }

  #[test]
  fn test_trending_url_has_no_query() {
    let url = Resource::Trending.url(&base());
    assert_eq!(url.as_str(), "https://api.coingecko.com/api/v3/search/trending");
  }

  #[test]
  fn test_trailing_slash_base() {
    let base = Url::parse("https://api.coingecko.com/api/v3/").unwrap();
    let url = Resource::Global.url(&base);
    assert_eq!(url.as_str(), "https://api.coingecko.com/api/v3/global");
  }

  #[test]
  fn test_coin_urls_fill_id() {
    let detail = Resource::CoinDetail { id: "bitcoin".into() };
    assert_eq!(detail.path(), "coins/bitcoin");
    assert_eq!(
      detail.url(&base()).as_str(),
      "https://api.coingecko.com/api/v3/coins/bitcoin?localization=false&tickers=false&community_data=false&developer_data=false"
    );

    let chart = Resource::CoinChart {
      id: "ethereum".into(),
      currency: "eur".into(),
      days: 30,
    };
    assert_eq!(
      chart.url(&base()).as_str(),
      "https://api.coingecko.com/api/v3/coins/ethereum/market_chart?vs_currency=eur&days=30"
    );
  }

  #[test]
  fn test_query_keys() {
    assert_eq!(Resource::Global.query_key(), vec!["global"]);
    assert_eq!(
      Resource::CoinChart {
        id: "bitcoin".into(),
        currency: "usd".into(),
        days: 7
      }
      .query_key(),
      vec!["chart", "bitcoin", "usd", "7"]
    );
  }
}
