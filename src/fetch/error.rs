use thiserror::Error;

/// Errors that can occur while fetching from the upstream API
#[derive(Debug, Error)]
pub enum FetchError {
  /// Transport-level failure (DNS, connect, timeout, body read)
  #[error("network failure: {0}")]
  Network(String),

  /// Non-success HTTP status other than 429
  #[error("{}", http_message(.status, .message))]
  Http { status: u16, message: Option<String> },

  /// The upstream answered 429
  #[error("rate limited by the data provider")]
  RateLimited,

  /// Response body was not the expected JSON
  #[error("failed to parse response: {0}")]
  Parse(#[from] serde_json::Error),

  /// Every attempt failed and the caller asked for the error
  #[error("gave up on {identity} after {attempts} attempts: {last}")]
  RetriesExhausted {
    identity: String,
    attempts: u32,
    #[source]
    last: Box<FetchError>,
  },
}

/// The upstream's own message when it sent one, the status otherwise.
fn http_message(status: &u16, message: &Option<String>) -> String {
  match message {
    Some(message) if !message.trim().is_empty() => message.clone(),
    _ => format!("HTTP error! Status: {status}"),
  }
}

impl FetchError {
  pub fn is_transport(&self) -> bool {
    matches!(self, FetchError::Network(_))
  }

  /// HTTP status carried by the error, if any.
  pub fn status(&self) -> Option<u16> {
    match self {
      FetchError::Http { status, .. } => Some(*status),
      FetchError::RateLimited => Some(429),
      FetchError::RetriesExhausted { last, .. } => last.status(),
      _ => None,
    }
  }
}

impl From<reqwest::Error> for FetchError {
  fn from(e: reqwest::Error) -> Self {
    FetchError::Network(e.to_string())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_status_through_exhaustion() {
    let error = FetchError::RetriesExhausted {
      identity: "https://api/global".to_string(),
      attempts: 4,
      last: Box::new(FetchError::Http {
        status: 503,
        message: None,
      }),
    };
    assert_eq!(error.status(), Some(503));
    assert!(error.to_string().contains("after 4 attempts"));
    assert!(error.to_string().contains("Status: 503"));
  }

  #[test]
  fn test_http_prefers_upstream_message() {
    let error = FetchError::Http {
      status: 404,
      message: Some("coin not found".to_string()),
    };
    assert_eq!(error.to_string(), "coin not found");

    let blank = FetchError::Http {
      status: 500,
      message: Some(" ".to_string()),
    };
    assert_eq!(blank.to_string(), "HTTP error! Status: 500");
  }

  #[test]
  fn test_transport_classification() {
    assert!(FetchError::Network("timed out".to_string()).is_transport());
    assert!(!FetchError::RateLimited.is_transport());
  }
}
