use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::cache::CacheWindows;
use crate::fetch::RetryPolicy;
use crate::invalidation::RefreshOptions;

/// Every section is optional; a missing file means all defaults.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
  pub api: ApiConfig,
  pub resilience: ResilienceConfig,
  pub refresh: RefreshConfig,
  pub log: LogConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
  pub base_url: String,
  /// Quote currency code, e.g. "usd"
  pub currency: String,
  /// Rows per market page
  pub per_page: u32,
  pub timeout_secs: u64,
}

impl Default for ApiConfig {
  fn default() -> Self {
    Self {
      base_url: "https://api.coingecko.com/api/v3".to_string(),
      currency: "usd".to_string(),
      per_page: 20,
      timeout_secs: 10,
    }
  }
}

impl ApiConfig {
  pub fn timeout(&self) -> Duration {
    Duration::from_secs(self.timeout_secs)
  }

  fn validate(&self) -> Result<()> {
    if self.per_page == 0 {
      return Err(eyre!("api.per_page must be at least 1"));
    }
    if self.timeout_secs == 0 {
      return Err(eyre!("api.timeout_secs must be at least 1"));
    }
    Ok(())
  }
}

/// Cache, rate limit and retry tuning.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ResilienceConfig {
  pub rate_limit_quota: usize,
  pub rate_limit_window_secs: u64,
  pub fresh_secs: u64,
  pub stale_secs: u64,
  pub max_retries: u32,
  pub backoff_ms: u64,
  pub pacing_delay_ms: u64,
  /// Quota utilization above which a rate-limit notice is shown
  pub warning_ratio: f64,
}

impl Default for ResilienceConfig {
  fn default() -> Self {
    Self {
      rate_limit_quota: 50,
      rate_limit_window_secs: 60,
      fresh_secs: 10 * 60,
      stale_secs: 30 * 60,
      max_retries: 3,
      backoff_ms: 300,
      pacing_delay_ms: 3000,
      warning_ratio: 0.9,
    }
  }
}

impl ResilienceConfig {
  pub fn cache_windows(&self) -> CacheWindows {
    CacheWindows {
      fresh: Duration::from_secs(self.fresh_secs),
      stale: Duration::from_secs(self.stale_secs),
    }
  }

  pub fn retry_policy(&self) -> RetryPolicy {
    RetryPolicy {
      max_retries: self.max_retries,
      base_backoff: Duration::from_millis(self.backoff_ms),
      pacing_delay: Duration::from_millis(self.pacing_delay_ms),
      warning_ratio: self.warning_ratio,
    }
  }

  pub fn rate_window(&self) -> Duration {
    Duration::from_secs(self.rate_limit_window_secs)
  }

  fn validate(&self) -> Result<()> {
    if self.rate_limit_quota == 0 {
      return Err(eyre!("resilience.rate_limit_quota must be at least 1"));
    }
    if self.rate_limit_window_secs == 0 {
      return Err(eyre!("resilience.rate_limit_window_secs must be at least 1"));
    }
    if self.stale_secs < self.fresh_secs {
      return Err(eyre!(
        "resilience.stale_secs ({}) must not be shorter than fresh_secs ({})",
        self.stale_secs,
        self.fresh_secs
      ));
    }
    if !(0.0..=1.0).contains(&self.warning_ratio) {
      return Err(eyre!("resilience.warning_ratio must be between 0 and 1"));
    }
    Ok(())
  }
}

/// Refresh triggers for one resource. Fields left out of the file take the
/// generic defaults below, not the per-resource ones.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RefreshSchedule {
  /// `null` or 0 turns the interval trigger off
  pub interval_secs: Option<u64>,
  pub stale_secs: u64,
  pub refetch_on_focus: bool,
  pub on_route_change: bool,
}

impl Default for RefreshSchedule {
  fn default() -> Self {
    Self::new(60, 15)
  }
}

impl RefreshSchedule {
  const fn new(interval_secs: u64, stale_secs: u64) -> Self {
    Self {
      interval_secs: Some(interval_secs),
      stale_secs,
      refetch_on_focus: true,
      on_route_change: true,
    }
  }

  pub fn options(&self) -> RefreshOptions {
    RefreshOptions {
      refetch_interval: self
        .interval_secs
        .filter(|secs| *secs > 0)
        .map(Duration::from_secs),
      stale_time: Duration::from_secs(self.stale_secs),
      refetch_on_focus: self.refetch_on_focus,
      on_route_change: self.on_route_change,
      ..RefreshOptions::default()
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RefreshConfig {
  pub markets: RefreshSchedule,
  pub global: RefreshSchedule,
  pub trending: RefreshSchedule,
  pub coin_detail: RefreshSchedule,
  pub coin_chart: RefreshSchedule,
}

impl Default for RefreshConfig {
  fn default() -> Self {
    Self {
      markets: RefreshSchedule::new(60, 15),
      global: RefreshSchedule::new(60, 15),
      trending: RefreshSchedule::new(120, 60),
      coin_detail: RefreshSchedule::new(30, 15),
      coin_chart: RefreshSchedule::new(30, 60),
    }
  }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LogConfig {
  /// Defaults to the platform state/cache directory
  pub directory: Option<PathBuf>,
  /// Used when RUST_LOG is unset
  pub filter: Option<String>,
}

impl LogConfig {
  pub fn directory(&self) -> PathBuf {
    self.directory.clone().unwrap_or_else(|| {
      dirs::state_dir()
        .or_else(dirs::cache_dir)
        .unwrap_or_else(std::env::temp_dir)
        .join("coinpulse")
    })
  }

  pub fn filter(&self) -> &str {
    self.filter.as_deref().unwrap_or("info")
  }
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./coinpulse.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/coinpulse/config.yaml
  ///
  /// Falls back to built-in defaults when no file is found.
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    let config = match path {
      Some(p) => Self::load_from_path(&p)?,
      None => Self::default(),
    };
    config.api.validate()?;
    config.resilience.validate()?;
    Ok(config)
  }

  fn find_config_file() -> Option<PathBuf> {
    let local = PathBuf::from("coinpulse.yaml");
    if local.exists() {
      return Some(local);
    }

    let xdg_path = dirs::config_dir()?.join("coinpulse").join("config.yaml");
    xdg_path.exists().then_some(xdg_path)
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    // An empty file parses as null
    if contents.trim().is_empty() {
      return Ok(Self::default());
    }

    serde_yaml::from_str(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }
}
