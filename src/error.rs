//! Error types for the query service.
//!
//! Every failure a request can hit is folded into one enum so the HTTP
//! boundary has a single place to turn it into an error body.

use thiserror::Error;

/// Main error type for query service operations.
#[derive(Error, Debug)]
pub enum ServiceError {
    /// The request body could not be read, or carried no statement.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Database connection errors (host unreachable, auth failed, unknown database, etc.)
    #[error("Connection error: {0}")]
    Connection(String),

    /// Query execution errors (syntax errors, constraint violations, etc.)
    #[error("Query error: {0}")]
    Query(String),

    /// Configuration errors (invalid config file, bad listen address, etc.)
    #[error("Configuration error: {0}")]
    Config(String),
}

impl ServiceError {
    /// Creates an invalid-request error with the given message.
    pub fn invalid_request(msg: impl Into<String>) -> Self {
        Self::InvalidRequest(msg.into())
    }

    /// Creates a connection error with the given message.
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    /// Creates a query error with the given message.
    pub fn query(msg: impl Into<String>) -> Self {
        Self::Query(msg.into())
    }

    /// Creates a configuration error with the given message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Returns the error category as a string for display purposes.
    pub fn category(&self) -> &'static str {
        match self {
            Self::InvalidRequest(_) => "Invalid Request",
            Self::Connection(_) => "Connection Error",
            Self::Query(_) => "Query Error",
            Self::Config(_) => "Configuration Error",
        }
    }
}

/// Result type alias using ServiceError.
pub type Result<T> = std::result::Result<T, ServiceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_invalid_request() {
        let err = ServiceError::invalid_request("query must not be empty");
        assert_eq!(err.to_string(), "Invalid request: query must not be empty");
        assert_eq!(err.category(), "Invalid Request");
    }

    #[test]
    fn test_error_display_connection() {
        let err = ServiceError::connection("Unknown database 'nonexistent_db'");
        assert_eq!(
            err.to_string(),
            "Connection error: Unknown database 'nonexistent_db'"
        );
        assert_eq!(err.category(), "Connection Error");
    }

    #[test]
    fn test_error_display_query() {
        let err = ServiceError::query("Table 'app.nope' doesn't exist");
        assert_eq!(err.to_string(), "Query error: Table 'app.nope' doesn't exist");
        assert_eq!(err.category(), "Query Error");
    }

    #[test]
    fn test_error_display_config() {
        let err = ServiceError::config("invalid listen address 'nowhere'");
        assert_eq!(
            err.to_string(),
            "Configuration error: invalid listen address 'nowhere'"
        );
        assert_eq!(err.category(), "Configuration Error");
    }

    #[test]
    fn test_error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<ServiceError>();
    }
}
