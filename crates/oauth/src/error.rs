//! Error types for OAuth operations
//!
//! The public OAuth operations do not return these: a failed exchange comes
//! back as a result object with `success == false`. The four failure kinds
//! below exist so log lines say which path failed. Store and URL errors are
//! returned from the preference store and login-URL builder.

/// Errors from OAuth operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Network or HTTP-level failure reported by the transport
    #[error("transport failure: {0}")]
    Transport(String),

    /// Server answered with an OAuth `error` field
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Client credentials missing, checked before any request is sent
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Response parsed but lacked required fields or held an expired token
    #[error("validation failure: {0}")]
    Validation(String),

    #[error("preference store error: {0}")]
    Store(String),

    #[error("invalid URL: {0}")]
    InvalidUrl(String),
}

/// Result alias for OAuth operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_names_the_failure_kind() {
        assert_eq!(
            Error::Configuration("client_id is empty".into()).to_string(),
            "configuration error: client_id is empty"
        );
        assert!(
            Error::Transport("connection refused".into())
                .to_string()
                .starts_with("transport failure")
        );
    }
}
