//! Error types for request building and response transformation.

use thiserror::Error;

/// Failures raised by a [`Transport`](crate::http::Transport).
///
/// These are handed to `RequestError` listeners and then returned to the
/// caller unchanged.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    /// HTTP request failed.
    #[error("HTTP request error: {0}")]
    Request(String),
    /// Invalid URL provided.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
    /// Request timed out.
    #[error("Request timed out")]
    Timeout,
    /// Connection refused or failed.
    #[error("Connection error: {0}")]
    Connection(String),
    /// Invalid header name or value.
    #[error("Invalid header: {0}")]
    InvalidHeader(String),
    /// Redirect limit exceeded.
    #[error("Too many redirects")]
    TooManyRedirects,
    /// The response status was rejected by the transport's status check.
    #[error("{}", format_status(.status, .message))]
    HttpStatus {
        /// The HTTP status code.
        status: u16,
        /// Response body, if one could be read.
        message: Option<String>,
    },
    /// A response interceptor rejected the response.
    #[error("Rejected by interceptor: {0}")]
    Interceptor(String),
    /// The underlying client could not be constructed.
    #[error("Client configuration error: {0}")]
    Client(String),
}

fn format_status(status: &u16, message: &Option<String>) -> String {
    match message {
        Some(msg) if !msg.is_empty() => format!("HTTP {status}: {msg}"),
        _ => format!("HTTP {status}"),
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else if err.is_connect() {
            Self::Connection(err.to_string())
        } else if err.is_redirect() {
            Self::TooManyRedirects
        } else {
            Self::Request(err.to_string())
        }
    }
}

impl From<url::ParseError> for TransportError {
    fn from(err: url::ParseError) -> Self {
        Self::InvalidUrl(err.to_string())
    }
}

impl From<http::header::InvalidHeaderName> for TransportError {
    fn from(err: http::header::InvalidHeaderName) -> Self {
        Self::InvalidHeader(err.to_string())
    }
}

impl From<http::header::InvalidHeaderValue> for TransportError {
    fn from(err: http::header::InvalidHeaderValue) -> Self {
        Self::InvalidHeader(err.to_string())
    }
}

/// Errors produced while executing a request context.
#[derive(Debug, Error)]
pub enum Error {
    /// The transport failed; propagated verbatim.
    #[error(transparent)]
    Transport(#[from] TransportError),
    /// The expected response shape cannot be applied to the payload.
    #[error("Invalid response shape: {0}")]
    InvalidResponseShape(String),
    /// Conversion between typed values and plain payloads failed.
    #[error("Mapping error: {0}")]
    Mapping(String),
}

impl Error {
    /// Returns `true` if this error came from the transport.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_))
    }

    /// The HTTP status of a rejected response, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Transport(TransportError::HttpStatus { status, .. }) => Some(*status),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Mapping(err.to_string())
    }
}

/// A specialized Result type for fetch operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_message_formatting() {
        let err = TransportError::HttpStatus {
            status: 404,
            message: Some("Not Found".to_string()),
        };
        assert_eq!(err.to_string(), "HTTP 404: Not Found");

        let err = TransportError::HttpStatus {
            status: 500,
            message: None,
        };
        assert_eq!(err.to_string(), "HTTP 500");
    }

    #[test]
    fn test_transport_predicate() {
        let err = Error::from(TransportError::Timeout);
        assert!(err.is_transport());
        assert_eq!(err.to_string(), "Request timed out");

        let err = Error::InvalidResponseShape("number".to_string());
        assert!(!err.is_transport());
        assert_eq!(err.status(), None);
    }

    #[test]
    fn test_status_accessor() {
        let err = Error::from(TransportError::HttpStatus {
            status: 503,
            message: None,
        });
        assert_eq!(err.status(), Some(503));
    }
}
