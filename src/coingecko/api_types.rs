//! Serde types matching CoinGecko API responses.
//!
//! Every type implements `Default`; the default is the empty value served
//! when a request fails and nothing is cached. Numeric fields are optional
//! because the upstream omits them for thinly traded coins.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ============================================================================
// /search/trending
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrendingResponse {
  #[serde(default)]
  pub coins: Vec<TrendingEntry>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrendingEntry {
  pub item: TrendingCoin,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrendingCoin {
  pub id: String,
  #[serde(default)]
  pub name: String,
  #[serde(default)]
  pub symbol: String,
  pub market_cap_rank: Option<u32>,
  pub price_btc: Option<f64>,
  pub score: Option<u32>,
}

// ============================================================================
// /coins/markets
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MarketCoin {
  pub id: String,
  #[serde(default)]
  pub symbol: String,
  #[serde(default)]
  pub name: String,
  pub current_price: Option<f64>,
  pub market_cap: Option<f64>,
  pub market_cap_rank: Option<u32>,
  pub total_volume: Option<f64>,
  pub price_change_percentage_24h: Option<f64>,
}

// ============================================================================
// /global
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GlobalResponse {
  #[serde(default)]
  pub data: GlobalStats,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GlobalStats {
  pub active_cryptocurrencies: Option<u64>,
  #[serde(default)]
  pub total_market_cap: HashMap<String, f64>,
  #[serde(default)]
  pub total_volume: HashMap<String, f64>,
  #[serde(default)]
  pub market_cap_percentage: HashMap<String, f64>,
  pub market_cap_change_percentage_24h_usd: Option<f64>,
}

impl GlobalStats {
  pub fn market_cap(&self, currency: &str) -> Option<f64> {
    self.total_market_cap.get(currency).copied()
  }

  pub fn volume(&self, currency: &str) -> Option<f64> {
    self.total_volume.get(currency).copied()
  }

  /// Market share of `symbol` (e.g. `btc`) in percent.
  pub fn dominance(&self, symbol: &str) -> Option<f64> {
    self.market_cap_percentage.get(symbol).copied()
  }
}

// ============================================================================
// /coins/{id}
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CoinDetail {
  #[serde(default)]
  pub id: String,
  #[serde(default)]
  pub symbol: String,
  #[serde(default)]
  pub name: String,
  pub market_cap_rank: Option<u32>,
  #[serde(default)]
  pub description: Description,
  pub market_data: Option<MarketData>,
}

impl CoinDetail {
  /// True for the empty fallback value.
  pub fn is_empty(&self) -> bool {
    self.id.is_empty()
  }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Description {
  #[serde(default)]
  pub en: String,
}

/// Per-currency figures for one coin. Maps are keyed by currency code.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MarketData {
  #[serde(default)]
  pub current_price: HashMap<String, f64>,
  #[serde(default)]
  pub market_cap: HashMap<String, f64>,
  #[serde(default)]
  pub total_volume: HashMap<String, f64>,
  #[serde(default)]
  pub high_24h: HashMap<String, f64>,
  #[serde(default)]
  pub low_24h: HashMap<String, f64>,
  #[serde(default)]
  pub ath: HashMap<String, f64>,
  #[serde(default)]
  pub ath_change_percentage: HashMap<String, f64>,
  #[serde(default)]
  pub atl: HashMap<String, f64>,
  #[serde(default)]
  pub atl_change_percentage: HashMap<String, f64>,
  pub price_change_percentage_24h: Option<f64>,
  pub circulating_supply: Option<f64>,
}

// ============================================================================
// /coins/{id}/market_chart
// ============================================================================

/// Series of `[timestamp_ms, value]` pairs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MarketChart {
  #[serde(default)]
  pub prices: Vec<[f64; 2]>,
  #[serde(default)]
  pub market_caps: Vec<[f64; 2]>,
  #[serde(default)]
  pub total_volumes: Vec<[f64; 2]>,
}

impl MarketChart {
  /// Lowest and highest price in the series.
  pub fn price_range(&self) -> Option<(f64, f64)> {
    let mut prices = self.prices.iter().map(|[_, price]| *price);
    let first = prices.next()?;
    Some(prices.fold((first, first), |(lo, hi), p| (lo.min(p), hi.max(p))))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn test_trending_tolerates_missing_fields() {
    let parsed: TrendingResponse = serde_json::from_value(json!({
      "coins": [{"item": {"id": "pepe", "name": "Pepe", "symbol": "PEPE", "score": 0}}],
      "nfts": []
    }))
    .unwrap();
    assert_eq!(parsed.coins.len(), 1);
    assert_eq!(parsed.coins[0].item.market_cap_rank, None);
  }

  #[test]
  fn test_global_empty_data() {
    let parsed: GlobalResponse = serde_json::from_value(json!({"data": {}})).unwrap();
    assert_eq!(parsed, GlobalResponse::default());
    assert_eq!(parsed.data.market_cap("usd"), None);
  }

  #[test]
  fn test_global_helpers() {
    let parsed: GlobalResponse = serde_json::from_value(json!({
      "data": {
        "total_market_cap": {"usd": 2.5e12},
        "market_cap_percentage": {"btc": 52.1}
      }
    }))
    .unwrap();
    assert_eq!(parsed.data.market_cap("usd"), Some(2.5e12));
    assert_eq!(parsed.data.dominance("btc"), Some(52.1));
  }

  #[test]
  fn test_coin_detail_empty_object() {
    let parsed: CoinDetail = serde_json::from_value(json!({})).unwrap();
    assert!(parsed.is_empty());
  }

  #[test]
  fn test_chart_price_range() {
    let chart = MarketChart {
      prices: vec![[1.0, 10.0], [2.0, 7.5], [3.0, 12.0]],
      ..Default::default()
    };
    assert_eq!(chart.price_range(), Some((7.5, 12.0)));
    assert_eq!(MarketChart::default().price_range(), None);
  }
}
