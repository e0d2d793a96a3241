//! Sliding-window counter of outbound requests.
//!
//! The upstream limit is enforced remotely and cannot be observed directly,
//! so this limiter only gives an early warning: every call is recorded and
//! the decision is left to the caller.

use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};
use tokio::time::{Duration, Instant};

/// Outcome of recording one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateDecision {
  /// Whether the request stays within the quota
  pub allowed: bool,
  /// Requests in the trailing window, including this one
  pub recent: usize,
  pub quota: usize,
}

impl RateDecision {
  /// Fraction of the quota used, above 1.0 when over quota.
  pub fn utilization(&self) -> f64 {
    self.recent as f64 / self.quota.max(1) as f64
  }
}

/// Counts requests within a trailing window.
#[derive(Debug)]
pub struct RateLimiter {
  timestamps: Mutex<VecDeque<Instant>>,
  quota: usize,
  window: Duration,
}

impl RateLimiter {
  pub fn new(quota: usize, window: Duration) -> Self {
    Self {
      timestamps: Mutex::new(VecDeque::with_capacity(quota + 1)),
      quota,
      window,
    }
  }

  /// Record a request and report whether it fits the quota.
  ///
  /// Rejected requests are still recorded. The window keeps at most `quota`
  /// timestamps, dropping the oldest when a new one pushes it over.
  pub fn try_consume(&self) -> RateDecision {
    let now = Instant::now();
    let mut timestamps = self
      .timestamps
      .lock()
      .unwrap_or_else(PoisonError::into_inner);

    while let Some(&oldest) = timestamps.front() {
      if now.saturating_duration_since(oldest) >= self.window {
        timestamps.pop_front();
      } else {
        break;
      }
    }

    timestamps.push_back(now);
    let recent = timestamps.len();
    let allowed = recent <= self.quota;
    if !allowed {
      timestamps.pop_front();
    }

    RateDecision {
      allowed,
      recent,
      quota: self.quota,
    }
  }

  /// Requests currently inside the window, without recording a new one.
  #[cfg(test)]
  pub fn in_window(&self) -> usize {
    let now = Instant::now();
    self
      .timestamps
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .iter()
      .filter(|&&t| now.saturating_duration_since(t) < self.window)
      .count()
  }
}

impl Default for RateLimiter {
  fn default() -> Self {
    Self::new(50, Duration::from_secs(60))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use tokio::time::advance;

  #[tokio::test(start_paused = true)]
  async fn test_quota_plus_one_is_rejected() {
    let limiter = RateLimiter::default();

    for i in 1..=50 {
      let decision = limiter.try_consume();
      assert!(decision.allowed, "call {} should be allowed", i);
      assert_eq!(decision.recent, i);
    }

    let decision = limiter.try_consume();
    assert!(!decision.allowed);
    assert_eq!(decision.recent, 51);
    assert!(decision.utilization() > 1.0);
  }

  #[tokio::test(start_paused = true)]
  async fn test_allowed_again_after_window() {
    let limiter = RateLimiter::default();
    for _ in 0..51 {
      limiter.try_consume();
    }

    advance(Duration::from_secs(60)).await;

    let decision = limiter.try_consume();
    assert!(decision.allowed);
    assert_eq!(decision.recent, 1);
  }

  #[tokio::test(start_paused = true)]
  async fn test_window_slides_rather_than_resets() {
    let limiter = RateLimiter::new(3, Duration::from_secs(60));

    limiter.try_consume();
    advance(Duration::from_secs(30)).await;
    limiter.try_consume();
    limiter.try_consume();
    assert_eq!(limiter.in_window(), 3);

    // The first request ages out; the two from t=30s remain
    advance(Duration::from_secs(31)).await;
    let decision = limiter.try_consume();
    assert!(decision.allowed);
    assert_eq!(decision.recent, 3);
  }

  #[tokio::test(start_paused = true)]
  async fn test_rejections_keep_window_at_quota() {
    let limiter = RateLimiter::new(5, Duration::from_secs(60));
    for _ in 0..20 {
      limiter.try_consume();
    }
    assert_eq!(limiter.in_window(), 5);
  }

  #[test]
  fn test_utilization() {
    let decision = RateDecision {
      allowed: true,
      recent: 45,
      quota: 50,
    };
    assert!((decision.utilization() - 0.9).abs() < f64::EPSILON);
  }
}
