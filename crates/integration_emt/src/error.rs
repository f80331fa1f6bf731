//! EMT client error types

use thiserror::Error;

use crate::models::ReturnCode;

/// Errors that can occur while talking to the EMT API
#[derive(Debug, Error)]
pub enum EmtError {
    /// Connection to the EMT service failed
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Request timeout
    #[error("Request timed out after {timeout_secs} seconds")]
    Timeout {
        /// The timeout duration in seconds
        timeout_secs: u64,
    },

    /// The service answered with a non-200 HTTP status
    #[error("Technical issue: HTTP {status}")]
    Technical {
        /// HTTP status code
        status: u16,
    },

    /// Failed to parse the response body
    #[error("Parse error: {0}")]
    ParseError(String),

    /// The API rejected the call with a non-success `ReturnCode`
    #[error("API error #{code}: {description}")]
    Api {
        /// Return code embedded in the response body
        code: ReturnCode,
        /// `Description` field of the response
        description: String,
    },

    /// Malformed stop id
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Direction token outside the accepted pair
    #[error("Invalid direction: {0}")]
    InvalidDirection(String),

    /// The stop is not known upstream, or its existence could not be confirmed
    #[error("Stop {stop} does not exist")]
    StopNotFound {
        /// Stop id as given by the caller
        stop: String,
        /// Failure of the existence check, if there was one
        #[source]
        source: Option<Box<EmtError>>,
    },

    /// The line (or line/direction pair) is not known upstream
    #[error("Line {line} not found")]
    LineNotFound {
        /// Line identifier
        line: String,
        /// Direction token, if one was requested
        direction: Option<String>,
    },

    /// None of the requested stops are known upstream
    #[error("Stops not found: {0}")]
    StopsNotFound(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl EmtError {
    /// Returns true for transport-level failures that might succeed on a later attempt.
    ///
    /// The client never retries on its own.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::ConnectionFailed(_) | Self::Timeout { .. } => true,
            Self::Technical { status } => *status >= 500,
            _ => false,
        }
    }

    /// Returns true for the "entity not found" family
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::StopNotFound { .. } | Self::LineNotFound { .. } | Self::StopsNotFound(_)
        )
    }

    /// Returns true when the caller supplied malformed input
    #[must_use]
    pub const fn is_invalid_input(&self) -> bool {
        matches!(self, Self::InvalidInput(_) | Self::InvalidDirection(_))
    }

    pub(crate) fn stop_not_found(stop: impl Into<String>, cause: Option<Self>) -> Self {
        Self::StopNotFound {
            stop: stop.into(),
            source: cause.map(Box::new),
        }
    }
}
