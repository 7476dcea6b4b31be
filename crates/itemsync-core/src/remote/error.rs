//! Remote store error handling
//!
//! Every failure of the remote item store is reduced to a
//! `TransportError` whose `Display` is the human-readable message
//! the controller surfaces to the view.

use thiserror::Error;

/// Errors that can occur while talking to the remote item store
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The request could not be sent or no response was received
    #[error("Request to '{url}' failed: {details}")]
    Request { url: String, details: String },

    /// The store answered with a non-success status
    #[error("{message}")]
    Status { status: u16, message: String },

    /// The response body could not be parsed
    #[error("Invalid response from '{url}': {details}")]
    Decode { url: String, details: String },

    /// The configured API URL cannot address the item store
    #[error("Invalid API URL '{url}': {details}")]
    InvalidUrl { url: String, details: String },

    /// Failure reported by a custom store implementation
    #[error("{0}")]
    Other(String),
}

impl TransportError {
    /// Create an error carrying only a message
    pub fn other(message: impl Into<String>) -> Self {
        TransportError::Other(message.into())
    }

    /// Classify a reqwest error raised while talking to `url`
    pub fn from_reqwest(error: reqwest::Error, url: &str) -> Self {
        if error.is_decode() {
            return TransportError::Decode {
                url: url.to_string(),
                details: error.to_string(),
            };
        }
        match error.status() {
            Some(status) => TransportError::Status {
                status: status.as_u16(),
                message: status_message(status.as_u16(), status.canonical_reason()),
            },
            None => TransportError::Request {
                url: url.to_string(),
                details: error.to_string(),
            },
        }
    }

    /// HTTP status code, if the store answered at all
    pub fn status(&self) -> Option<u16> {
        match self {
            TransportError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// The message shown to the user
    pub fn message(&self) -> String {
        self.to_string()
    }
}

/// Fallback message for a failed status without a usable body
pub(crate) fn status_message(status: u16, reason: Option<&str>) -> String {
    match reason {
        Some(reason) => format!("Request failed with status {} {}", status, reason),
        None => format!("Request failed with status {}", status),
    }
}
