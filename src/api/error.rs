//! Errors surfaced by the remote data client.

use std::fmt;
use std::path::Path;

/// Classified failure of an API call.
///
/// The rest of the client only ever looks at this classification, never at
/// raw HTTP details. Cloneable so one failed fetch can be handed to every
/// caller waiting on it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
  /// The request could not complete (DNS, connect, timeout, TLS)
  Network(String),
  /// 401
  Unauthorized,
  /// 403
  Forbidden,
  /// Any other 4xx
  BadRequest { status: u16, message: String },
  /// A local file picked for upload could not be read
  Attachment { path: String, message: String },
  /// 5xx, or a response that could not be understood
  Server {
    status: Option<u16>,
    message: String,
  },
}

impl ApiError {
  /// Classify a non-success HTTP status. `body` is mined for a message.
  pub fn from_status(status: u16, body: &str) -> Self {
    match status {
      401 => ApiError::Unauthorized,
      403 => ApiError::Forbidden,
      400..=499 => ApiError::BadRequest {
        status,
        message: extract_message(body),
      },
      _ => ApiError::Server {
        status: Some(status),
        message: extract_message(body),
      },
    }
  }

  pub fn attachment(path: &Path, err: std::io::Error) -> Self {
    ApiError::Attachment {
      path: path.display().to_string(),
      message: err.to_string(),
    }
  }

  pub fn status(&self) -> Option<u16> {
    match self {
      ApiError::Unauthorized => Some(401),
      ApiError::Forbidden => Some(403),
      ApiError::BadRequest { status, .. } => Some(*status),
      ApiError::Server { status, .. } => *status,
      ApiError::Network(_) | ApiError::Attachment { .. } => None,
    }
  }

  /// 401 or 403.
  pub fn is_auth(&self) -> bool {
    matches!(self, ApiError::Unauthorized | ApiError::Forbidden)
  }

  /// Rejected input, either by the server or before sending.
  pub fn is_validation(&self) -> bool {
    matches!(
      self,
      ApiError::BadRequest { .. } | ApiError::Attachment { .. }
    )
  }

  pub fn is_not_found(&self) -> bool {
    self.status() == Some(404)
  }
}

impl fmt::Display for ApiError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      ApiError::Network(msg) => write!(f, "Network error: {}", msg),
      ApiError::Unauthorized => write!(f, "Not logged in or session expired"),
      ApiError::Forbidden => write!(f, "Not allowed"),
      ApiError::BadRequest { status, message } => {
        if message.is_empty() {
          write!(f, "Request rejected ({})", status)
        } else {
          write!(f, "Request rejected ({}): {}", status, message)
        }
      }
      ApiError::Attachment { path, message } => {
        write!(f, "Cannot read {}: {}", path, message)
      }
      ApiError::Server { status, message } => match status {
        Some(status) => write!(f, "Server error ({}): {}", status, message),
        None => write!(f, "Server error: {}", message),
      },
    }
  }
}

impl std::error::Error for ApiError {}

impl From<reqwest::Error> for ApiError {
  fn from(e: reqwest::Error) -> Self {
    if e.is_decode() {
      return ApiError::Server {
        status: e.status().map(|s| s.as_u16()),
        message: format!("invalid response: {}", e),
      };
    }
    match e.status() {
      Some(status) => ApiError::from_status(status.as_u16(), ""),
      None => ApiError::Network(e.to_string()),
    }
  }
}

impl From<serde_json::Error> for ApiError {
  fn from(e: serde_json::Error) -> Self {
    ApiError::Server {
      status: None,
      message: format!("invalid response body: {}", e),
    }
  }
}

const MAX_MESSAGE_LEN: usize = 200;

/// Pull a human message out of an error body.
///
/// Backends answer with `{"message": ...}`, `{"error": ...}`, a list of
/// field errors, or plain text.
fn extract_message(body: &str) -> String {
  let body = body.trim();
  if body.is_empty() {
    return String::new();
  }

  if let Ok(value) = serde_json::from_str::<serde_json::Value>(body) {
    for field in ["message", "error", "detail"] {
      if let Some(msg) = value.get(field).and_then(|v| v.as_str()) {
        return msg.to_string();
      }
    }
    if let Some(errors) = value.get("errors").and_then(|v| v.as_array()) {
      let joined: Vec<&str> = errors.iter().filter_map(|e| e.as_str()).collect();
      if !joined.is_empty() {
        return joined.join("; ");
      }
    }
  }

  body.chars().take(MAX_MESSAGE_LEN).collect()
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_auth_statuses() {
    assert_eq!(ApiError::from_status(401, ""), ApiError::Unauthorized);
    assert_eq!(ApiError::from_status(403, "nope"), ApiError::Forbidden);
    assert!(ApiError::Unauthorized.is_auth());
    assert!(ApiError::Forbidden.is_auth());
  }

  #[test]
  fn test_other_client_errors_are_validation() {
    let err = ApiError::from_status(422, r#"{"message": "Deadline is in the past"}"#);
    assert_eq!(
      err,
      ApiError::BadRequest {
        status: 422,
        message: "Deadline is in the past".to_string()
      }
    );
    assert!(err.is_validation());
    assert!(!err.is_auth());
  }

  #[test]
  fn test_not_found_is_a_client_error() {
    let err = ApiError::from_status(404, "");
    assert!(err.is_not_found());
    assert!(err.is_validation());
  }

  #[test]
  fn test_server_errors() {
    let err = ApiError::from_status(502, "Bad Gateway");
    assert_eq!(
      err,
      ApiError::Server {
        status: Some(502),
        message: "Bad Gateway".to_string()
      }
    );
    assert_eq!(err.status(), Some(502));
  }

  #[test]
  fn test_message_from_error_list() {
    let msg = extract_message(r#"{"errors": ["Title is required", "Too long"]}"#);
    assert_eq!(msg, "Title is required; Too long");
  }

  #[test]
  fn test_plain_text_message_is_truncated() {
    let long = "x".repeat(500);
    assert_eq!(extract_message(&long).len(), MAX_MESSAGE_LEN);
  }

  #[test]
  fn test_display() {
    let err = ApiError::BadRequest {
      status: 400,
      message: String::new(),
    };
    assert_eq!(err.to_string(), "Request rejected (400)");
    assert_eq!(
      ApiError::Network("timed out".to_string()).to_string(),
      "Network error: timed out"
    );
  }
}
