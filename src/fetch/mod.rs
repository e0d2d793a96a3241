//! Resilient fetching for upstream API calls.
//!
//! Every outbound request goes through [`FetchOrchestrator`], which:
//! - Answers from the cache first (fresh or stale)
//! - Paces requests when the local rate limiter is over quota
//! - Retries failures with exponential backoff, a bounded number of times
//! - Degrades to any cached copy, then to the caller's fallback value

mod error;
mod orchestrator;
mod transport;

pub use error::FetchError;
pub use orchestrator::{DataSource, FetchOrchestrator, Fetched, OnExhausted, RetryPolicy};
pub use transport::{HttpTransport, RawResponse, Transport};
