//! Error types for the dashboard
//!
//! Uses thiserror for ergonomic error definitions.
//! Every failure is caught by the caller that issued the operation and
//! turned into a log line plus a short notification; nothing panics.

use thiserror::Error;

/// Custom Result type using our Error
pub type Result<T> = std::result::Result<T, DashboardError>;

/// Dashboard errors
#[derive(Error, Debug)]
pub enum DashboardError {
    /// Missing or malformed connection configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Token or anonymous sign-in failure
    #[error("Authentication error: {0}")]
    Auth(String),

    /// Transport-level HTTP failure
    #[error("Network error: {0}")]
    Network(String),

    /// Non-success response from a remote service
    #[error("Backend error: HTTP {status}: {body}")]
    Backend { status: u16, body: String },

    /// Rate limit exceeded
    #[error("Rate limit exceeded: retry after {0} seconds")]
    RateLimit(u64),

    /// JSON parsing errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Malformed user input, caught before any network call
    #[error("Validation error: {0}")]
    Validation(String),

    /// Store primitive used before the services (or identity) are ready
    #[error("Not ready: {0}")]
    NotReady(String),

    /// Document store errors
    #[error("Storage error: {0}")]
    Store(String),

    /// Document missing for an update
    #[error("Document not found: {0}")]
    NotFound(String),

    /// Worker runtime errors
    #[error("Worker error: {0}")]
    Worker(String),
}

/// Error taxonomy used for propagation and user-facing behavior
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Configuration,
    Authentication,
    Network,
    Validation,
    NotReady,
    Internal,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Configuration => "configuration",
            ErrorKind::Authentication => "authentication",
            ErrorKind::Network => "network",
            ErrorKind::Validation => "validation",
            ErrorKind::NotReady => "not_ready",
            ErrorKind::Internal => "internal",
        }
    }
}

impl DashboardError {
    /// Classify the error
    pub fn kind(&self) -> ErrorKind {
        match self {
            DashboardError::Config(_) => ErrorKind::Configuration,
            DashboardError::Auth(_) => ErrorKind::Authentication,
            DashboardError::Network(_)
            | DashboardError::Backend { .. }
            | DashboardError::RateLimit(_)
            | DashboardError::Store(_) => ErrorKind::Network,
            DashboardError::Validation(_) => ErrorKind::Validation,
            DashboardError::NotReady(_) => ErrorKind::NotReady,
            DashboardError::Json(_) | DashboardError::NotFound(_) | DashboardError::Worker(_) => {
                ErrorKind::Internal
            }
        }
    }

    /// Short human-readable text for a transient notification
    pub fn user_message(&self) -> String {
        match self {
            DashboardError::Config(_) => "Database is not configured; running read-only.".into(),
            DashboardError::Auth(_) => "Session expired or missing. Reload the dashboard to sign in again.".into(),
            DashboardError::Network(_) | DashboardError::Store(_) => {
                "Network request failed. Please try again.".into()
            }
            DashboardError::Backend { status, .. } => format!("Server responded with HTTP {status}."),
            DashboardError::RateLimit(secs) => format!("Too many requests; retry in {secs}s."),
            DashboardError::Validation(msg) => msg.clone(),
            DashboardError::NotReady(_) => "Database not ready yet. Please wait.".into(),
            DashboardError::NotFound(what) => format!("{what} no longer exists."),
            DashboardError::Json(_) | DashboardError::Worker(_) => "Unexpected error.".into(),
        }
    }
}

impl From<worker::Error> for DashboardError {
    fn from(err: worker::Error) -> Self {
        DashboardError::Worker(err.to_string())
    }
}

impl From<reqwest::Error> for DashboardError {
    fn from(err: reqwest::Error) -> Self {
        DashboardError::Network(err.to_string())
    }
}

impl From<DashboardError> for worker::Error {
    fn from(err: DashboardError) -> Self {
        worker::Error::RustError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = DashboardError::Backend { status: 502, body: "bad gateway".into() };
        assert!(err.to_string().contains("HTTP 502"));
        assert_eq!(err.kind(), ErrorKind::Network);
    }

    #[test]
    fn test_error_conversion() {
        let json_err = serde_json::from_str::<i32>("invalid").unwrap_err();
        let err: DashboardError = json_err.into();
        assert!(matches!(err, DashboardError::Json(_)));
    }

    #[test]
    fn test_validation_message_is_shown_verbatim() {
        let err = DashboardError::Validation("Entry price must be a number".into());
        assert_eq!(err.user_message(), "Entry price must be a number");
        assert_eq!(err.kind().as_str(), "validation");
    }

    #[test]
    fn test_auth_message_asks_for_a_new_session() {
        let err = DashboardError::Auth("id token expired".into());
        assert_eq!(
            err.user_message(),
            "Session expired or missing. Reload the dashboard to sign in again."
        );
        assert!(!err.user_message().contains("local identity"));
    }
}
