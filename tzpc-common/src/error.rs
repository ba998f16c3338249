//! Common error types for TZPC

use thiserror::Error;

/// Common result type for TZPC operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the review client
///
/// Network and application failures keep the server's message intact so the
/// UI can show it verbatim.
#[derive(Error, Debug)]
pub enum Error {
    /// Analysis (or other resource) does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Session missing or expired; the caller must send the user to `login_url`
    #[error("Authentication required, log in at {login_url}")]
    Unauthorized { login_url: String },

    /// Comparison payload could not be decoded into field details
    #[error("Malformed comparison payload: {0}")]
    MalformedPayload(String),

    /// Field key is not part of the loaded comparison result
    #[error("Unknown field: {0}")]
    UnknownField(String),

    /// Invalid user input or request parameter
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Persisting a review decision failed
    #[error("Save failed: {message}")]
    SaveFailed { retryable: bool, message: String },

    /// Row operation attempted before `load` completed
    #[error("Analysis not loaded")]
    NotLoaded,

    /// A save for the same target is already in flight
    #[error("Save already in progress for {0}")]
    SaveInFlight(String),

    /// Connectivity or HTTP-layer failure outside a save (retryable)
    #[error("Network error: {0}")]
    Network(String),

    /// Server answered `success: false`
    #[error("Server error: {0}")]
    Application(String),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether repeating the same call unchanged may succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Network(_) => true,
            Error::SaveFailed { retryable, .. } => *retryable,
            _ => false,
        }
    }

    /// Contract violations by the calling code, not conditions to show a user
    pub fn is_defect(&self) -> bool {
        matches!(
            self,
            Error::UnknownField(_) | Error::InvalidInput(_) | Error::NotLoaded | Error::SaveInFlight(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(Error::Network("connection refused".into()).is_retryable());
        assert!(Error::SaveFailed { retryable: true, message: "timeout".into() }.is_retryable());
        assert!(!Error::SaveFailed { retryable: false, message: "bad field".into() }.is_retryable());
        assert!(!Error::Application("nope".into()).is_retryable());
    }

    #[test]
    fn test_defect_classification() {
        assert!(Error::UnknownField("x".into()).is_defect());
        assert!(Error::NotLoaded.is_defect());
        assert!(!Error::NotFound("7".into()).is_defect());
        assert!(!Error::Unauthorized { login_url: "/login".into() }.is_defect());
    }

    #[test]
    fn test_save_failed_message_is_verbatim() {
        let err = Error::SaveFailed {
            retryable: false,
            message: "manual_verification must be boolean".into(),
        };
        assert_eq!(err.to_string(), "Save failed: manual_verification must be boolean");
    }
}
