//! Service-specific error types

use thiserror::Error;

/// Failures of an interactive login.
///
/// Protocol failures reported by the OAuth library arrive as unsuccessful
/// result objects; these variants cover what the host itself detects.
#[derive(Error, Debug)]
pub enum Error {
    #[error("[{0}] section missing from configuration")]
    NotConfigured(&'static str),

    #[error("redirect URI {uri} cannot be served locally: {reason}")]
    InvalidRedirectUri { uri: String, reason: String },

    #[error("failed to bind callback listener on {addr}: {reason}")]
    CallbackBind { addr: String, reason: String },

    #[error("no authorization callback within {0}s")]
    CallbackTimeout(u64),

    #[error("callback listener stopped before a redirect arrived")]
    CallbackClosed,

    #[error("redirect does not belong to this login (state mismatch)")]
    StateMismatch,
}

/// Result alias using service Error
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_messages_are_descriptive() {
        assert_eq!(
            Error::NotConfigured("oauth2").to_string(),
            "[oauth2] section missing from configuration"
        );
        assert_eq!(
            Error::CallbackTimeout(300).to_string(),
            "no authorization callback within 300s"
        );
        assert!(
            Error::CallbackBind {
                addr: "127.0.0.1:8765".into(),
                reason: "address in use".into(),
            }
            .to_string()
            .contains("address in use")
        );
    }

    #[test]
    fn error_debug_includes_variant_name() {
        let debug = format!("{:?}", Error::StateMismatch);
        assert!(
            debug.contains("StateMismatch"),
            "Debug output must include variant name, got: {debug}"
        );
    }
}
