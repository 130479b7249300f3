//! Error types for the `ragchat-model` crate.

use thiserror::Error;

/// Errors raised by generation providers.
#[derive(Debug, Error)]
pub enum ModelError {
    /// The provider could not be reached.
    #[error("Connection error: {0}")]
    Connection(String),

    /// The request did not complete within the configured timeout.
    #[error("Request timed out")]
    Timeout,

    /// The provider answered with a non-success status.
    #[error("Provider returned {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body, possibly empty.
        body: String,
    },

    /// The response body could not be decoded.
    #[error("Decode error: {0}")]
    Decode(String),

    /// The provider was configured incorrectly.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl ModelError {
    /// Short sentence suitable for showing to an end user in place of an
    /// answer.
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::Timeout => "Sorry, the request timed out. Please try again.",
            Self::Status { .. } => "Sorry, I encountered an error while generating a response.",
            Self::Connection(_) | Self::Decode(_) | Self::Config(_) => {
                "Sorry, I encountered an error while processing your request."
            }
        }
    }
}

#[cfg(feature = "ollama")]
impl From<reqwest::Error> for ModelError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout
        } else if e.is_decode() {
            Self::Decode(e.to_string())
        } else if e.is_builder() {
            Self::Config(e.to_string())
        } else {
            Self::Connection(e.to_string())
        }
    }
}

/// A convenience result type for generation calls.
pub type Result<T> = std::result::Result<T, ModelError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_messages_depend_on_failure_kind() {
        assert!(ModelError::Timeout.user_message().contains("timed out"));
        let status = ModelError::Status { status: 500, body: "boom".into() };
        assert!(status.user_message().contains("generating a response"));
        assert!(!status.user_message().contains("boom"));
        assert!(ModelError::Connection("refused".into()).user_message().contains("processing"));
    }
}
