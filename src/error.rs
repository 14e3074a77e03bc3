use thiserror::Error;

use crate::response::Response;

/// Result type for probex operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error taxonomy for the request engine
///
/// Errors are compared by kind; network errors additionally carry a stable,
/// machine-readable `reason` string (e.g. `"connection_refused"`).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The settings snapshot lacked a URL where one was required
    #[error("no target url was configured")]
    MissingUrl,

    /// A URL was present but structurally malformed
    #[error("could not parse target url")]
    UrlParser,

    /// A recognized settings key carried a value that could not be converted
    #[error("invalid value for setting `{key}`")]
    InvalidSetting { key: String },

    /// Transport or connection-level failure
    #[error("network error: {reason}")]
    Network { reason: String },

    /// End of stream
    ///
    /// Terminal success when a close-delimited body was being accumulated,
    /// terminal failure when it arrives before a status line.
    #[error("end of stream")]
    Eof,

    /// The response bytes could not be parsed
    #[error("response parse error: {0}")]
    ResponseParse(String),

    /// The pending operation exceeded `net/timeout`
    #[error("operation timed out")]
    Timeout,

    /// The operation was canceled by the caller
    #[error("operation was canceled")]
    Canceled,

    /// The response body failed JSON parsing (wrapper layer only)
    #[error("response body is not valid json")]
    JsonProcessing,
}

impl Error {
    /// Create a new network error with a machine-readable reason
    pub fn network(reason: impl Into<String>) -> Self {
        Error::Network {
            reason: reason.into(),
        }
    }

    /// Create a new response parse error
    pub fn response_parse(message: impl Into<String>) -> Self {
        Error::ResponseParse(message.into())
    }

    /// Create a new invalid-setting error
    pub fn invalid_setting(key: impl Into<String>) -> Self {
        Error::InvalidSetting { key: key.into() }
    }

    /// Check if this is an EOF error
    pub fn is_eof(&self) -> bool {
        matches!(self, Error::Eof)
    }

    /// Check if this is a timeout error
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Timeout)
    }

    /// Check if this is a network error
    pub fn is_network(&self) -> bool {
        matches!(self, Error::Network { .. })
    }

    /// Get the network failure reason, if any
    pub fn reason(&self) -> Option<&str> {
        match self {
            Error::Network { reason } => Some(reason),
            _ => None,
        }
    }
}

impl From<url::ParseError> for Error {
    fn from(_: url::ParseError) -> Self {
        Error::UrlParser
    }
}

impl From<serde_json::Error> for Error {
    fn from(_: serde_json::Error) -> Self {
        Error::JsonProcessing
    }
}

impl From<tokio::time::error::Elapsed> for Error {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        Error::Timeout
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        use std::io::ErrorKind;
        let reason = match err.kind() {
            ErrorKind::ConnectionRefused => "connection_refused",
            ErrorKind::ConnectionReset => "connection_reset",
            ErrorKind::ConnectionAborted => "connection_aborted",
            ErrorKind::NotConnected => "not_connected",
            ErrorKind::BrokenPipe => "broken_pipe",
            ErrorKind::TimedOut => "timed_out",
            ErrorKind::AddrNotAvailable => "address_not_available",
            ErrorKind::InvalidInput => "invalid_input",
            ErrorKind::UnexpectedEof => return Error::Eof,
            _ => "io_error",
        };
        Error::network(reason)
    }
}

/// A failed operation together with the partial response it produced
///
/// Caller-facing operations never lose the response object on failure: a
/// receive that dies mid-parse still exposes whatever was accumulated, and
/// stages that fail before any bytes arrive expose an empty response. Callers
/// must check `error` before trusting response fields.
#[derive(Debug, Clone)]
pub struct Failure {
    /// The error that terminated the operation
    pub error: Error,
    /// The partial (possibly empty) response collected before the failure
    pub response: Response,
}

impl Failure {
    /// Create a failure from an error and the partial response
    pub fn new(error: Error, response: Response) -> Self {
        Self { error, response }
    }
}

impl From<Error> for Failure {
    fn from(error: Error) -> Self {
        Self {
            error,
            response: Response::default(),
        }
    }
}

impl std::fmt::Display for Failure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.error.fmt(f)
    }
}

impl std::error::Error for Failure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_reasons() {
        let err: Error = std::io::Error::from(std::io::ErrorKind::ConnectionRefused).into();
        assert_eq!(err, Error::network("connection_refused"));
        assert_eq!(err.reason(), Some("connection_refused"));

        let err: Error = std::io::Error::from(std::io::ErrorKind::UnexpectedEof).into();
        assert!(err.is_eof());

        let err: Error = std::io::Error::new(std::io::ErrorKind::Other, "weird").into();
        assert_eq!(err.reason(), Some("io_error"));
    }

    #[test]
    fn test_errors_compare_by_kind() {
        assert_eq!(Error::Eof, Error::Eof);
        assert_ne!(Error::Eof, Error::Timeout);
        assert_ne!(
            Error::network("connection_refused"),
            Error::network("connection_reset")
        );
    }

    #[test]
    fn test_failure_from_error_has_empty_response() {
        let failure = Failure::from(Error::MissingUrl);
        assert_eq!(failure.error, Error::MissingUrl);
        assert_eq!(failure.response.status_code, 0);
        assert!(failure.response.response_line.is_empty());
    }
}
