//! In-memory response cache for upstream API calls.
//!
//! This module provides a process-lifetime cache that:
//! - Stores raw JSON bodies keyed by the full request URL
//! - Classifies entries as fresh, stale, or expired by age
//! - Serves fresh and stale entries from `get`, and anything at all from
//!   `get_any` when the caller is degrading
//! - Supports substring-pattern invalidation for manual refreshes

mod entry;
mod storage;

pub use entry::{CacheWindows, Cached, Freshness};
pub use storage::ResponseCache;
