pub mod api_types;
mod client;
mod endpoints;

pub use client::{CoinGeckoClient, TerminalPolicy};
pub use endpoints::Resource;
