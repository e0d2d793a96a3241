//! Notices raised by the fetch layer and the query store.
//!
//! Neither layer renders anything; they push `Notice`s into a channel and
//! the UI decides how to show them.

use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
  Info,
  Warning,
  Error,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Notice {
  /// The local limiter is over (or close to) its quota
  RateLimitApproaching { recent: usize, quota: usize },
  /// The upstream answered 429
  ServerRateLimited { identity: String },
  /// A transport-level failure after the upstream was reachable
  ConnectionLost,
  /// The first response after a transport-level failure
  ConnectionRestored,
  /// A terminal error reached the query store
  QueryFailed { key: String, message: String },
}

impl Notice {
  pub fn severity(&self) -> Severity {
    match self {
      Notice::RateLimitApproaching { .. } | Notice::ServerRateLimited { .. } => Severity::Warning,
      Notice::ConnectionLost | Notice::ConnectionRestored => Severity::Info,
      Notice::QueryFailed { .. } => Severity::Error,
    }
  }

  pub fn title(&self) -> &'static str {
    match self {
      Notice::RateLimitApproaching { .. } | Notice::ServerRateLimited { .. } => "API Rate Limit",
      Notice::ConnectionLost => "Offline",
      Notice::ConnectionRestored => "Online",
      Notice::QueryFailed { .. } => "Error",
    }
  }

  pub fn description(&self) -> String {
    match self {
      Notice::RateLimitApproaching { .. } => {
        "Using cached data while waiting for rate limit to reset.".to_string()
      }
      Notice::ServerRateLimited { .. } => {
        "The crypto data provider is limiting requests. Using cached data where available."
          .to_string()
      }
      Notice::ConnectionLost => "The data provider is unreachable.".to_string(),
      Notice::ConnectionRestored => "Connection to the data provider restored.".to_string(),
      Notice::QueryFailed { key, message } => {
        format!("Failed to fetch {}: {}. Using cached data if available.", key, message)
      }
    }
  }

  /// Connectivity notices drive refetches but are not shown to the user.
  pub fn is_user_visible(&self) -> bool {
    !matches!(self, Notice::ConnectionLost | Notice::ConnectionRestored)
  }
}

pub type NoticeSender = mpsc::UnboundedSender<Notice>;
pub type NoticeReceiver = mpsc::UnboundedReceiver<Notice>;

pub fn channel() -> (NoticeSender, NoticeReceiver) {
  mpsc::unbounded_channel()
}

/// Optional notice sink. Emitting never fails the caller.
#[derive(Debug, Clone, Default)]
pub struct Notifier {
  tx: Option<NoticeSender>,
}

impl Notifier {
  pub fn new(tx: NoticeSender) -> Self {
    Self { tx: Some(tx) }
  }

  pub fn emit(&self, notice: Notice) {
    if let Some(tx) = &self.tx {
      // Receiver may be gone during shutdown
      let _ = tx.send(notice);
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_connectivity_notices_are_hidden() {
    assert!(!Notice::ConnectionLost.is_user_visible());
    assert!(!Notice::ConnectionRestored.is_user_visible());
    assert!(Notice::ServerRateLimited {
      identity: "x".to_string()
    }
    .is_user_visible());
  }

  #[test]
  fn test_emit_reaches_receiver() {
    let (tx, mut rx) = channel();
    let notifier = Notifier::new(tx);
    notifier.emit(Notice::RateLimitApproaching {
      recent: 51,
      quota: 50,
    });

    let notice = rx.try_recv().expect("notice delivered");
    assert_eq!(notice.severity(), Severity::Warning);
    assert_eq!(notice.title(), "API Rate Limit");
  }

  #[test]
  fn test_default_notifier_discards() {
    Notifier::default().emit(Notice::ConnectionLost);
  }
}
