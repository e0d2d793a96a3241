mod app;
mod cache;
mod coingecko;
mod commands;
mod config;
mod event;
mod fetch;
mod format;
mod invalidation;
mod logging;
mod notify;
mod query;
mod ratelimit;
mod ui;

use clap::{Parser, Subcommand, ValueEnum};
use color_eyre::{eyre::eyre, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use crate::cache::ResponseCache;
use crate::coingecko::{CoinGeckoClient, TerminalPolicy};
use crate::config::Config;
use crate::fetch::{FetchOrchestrator, HttpTransport};
use crate::notify::Notifier;
use crate::ratelimit::RateLimiter;

#[derive(Parser, Debug)]
#[command(name = "coinpulse")]
#[command(about = "A terminal dashboard for cryptocurrency market data")]
#[command(version)]
struct Args {
  /// Path to config file (default: ./coinpulse.yaml or $XDG_CONFIG_HOME/coinpulse/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Quote currency, e.g. usd or eur
  #[arg(long)]
  currency: Option<String>,

  #[command(subcommand)]
  command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
  /// Fetch one resource and print it as JSON. Fails instead of printing an
  /// empty value when the upstream is unavailable.
  Dump {
    #[arg(value_enum)]
    resource: DumpResource,

    /// Coin id (required for coin and chart), e.g. bitcoin
    #[arg(long)]
    id: Option<String>,

    #[arg(long, default_value_t = 1)]
    page: u32,

    /// Chart range in days
    #[arg(long, default_value_t = 7)]
    days: u32,
  },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum DumpResource {
  Trending,
  Markets,
  Global,
  Coin,
  Chart,
}

/// Build the shared cache, limiter and orchestrator, and the client on top.
fn build_client(config: &Config, notifier: Notifier) -> Result<(CoinGeckoClient, Arc<ResponseCache>)> {
  let resilience = &config.resilience;
  let cache = Arc::new(ResponseCache::new(resilience.cache_windows()));
  let limiter = Arc::new(RateLimiter::new(
    resilience.rate_limit_quota,
    resilience.rate_window(),
  ));
  let orchestrator = FetchOrchestrator::new(cache.clone(), limiter, resilience.retry_policy())
    .with_notifier(notifier);

  let transport = HttpTransport::new(config.api.timeout())
    .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;
  let client = CoinGeckoClient::new(&config.api, Arc::new(transport), Arc::new(orchestrator))?;
  Ok((client, cache))
}

async fn dump(
  client: &CoinGeckoClient,
  config: &Config,
  resource: DumpResource,
  id: Option<String>,
  page: u32,
  days: u32,
) -> Result<()> {
  let require_id = || id.clone().ok_or_else(|| eyre!("--id is required for {:?}", resource));
  let value = match resource {
    DumpResource::Trending => serde_json::to_value(client.trending().await?)?,
    DumpResource::Markets => {
      serde_json::to_value(client.markets(page, config.api.per_page).await?)?
    }
    DumpResource::Global => serde_json::to_value(client.global().await?)?,
    DumpResource::Coin => serde_json::to_value(client.coin_detail(&require_id()?).await?)?,
    DumpResource::Chart => serde_json::to_value(client.coin_chart(&require_id()?, days).await?)?,
  };
  println!("{}", serde_json::to_string_pretty(&value)?);
  Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  let mut config = Config::load(args.config.as_deref())?;
  if let Some(currency) = args.currency {
    config.api.currency = currency;
  }

  let logging = logging::init_logging(&config.log.directory(), config.log.filter())?;
  info!(log = %logging.path().display(), base_url = %config.api.base_url, "Starting coinpulse");

  let (notice_tx, notice_rx) = notify::channel();
  let notifier = Notifier::new(notice_tx);
  let (client, cache) = build_client(&config, notifier.clone())?;

  match args.command {
    Some(Commands::Dump {
      resource,
      id,
      page,
      days,
    }) => {
      let client = client.with_policy(TerminalPolicy::Raise);
      dump(&client, &config, resource, id, page, days).await
    }
    None => {
      let mut app = app::App::new(config, client, cache, notifier);
      app.run(notice_rx).await
    }
  }
}
