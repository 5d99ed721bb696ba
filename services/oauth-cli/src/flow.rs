//! Interactive login state machine
//!
//! Pure state machine: receives events, returns (new_state, action).
//! Caller (main.rs) executes the I/O implied by each action.

use oauth::{OAuth1LoginResult, OAuth2LoginResult};

use crate::error::Error as ServiceError;

pub const EXIT_OK: i32 = 0;
pub const EXIT_FAILED: i32 = 1;
pub const EXIT_CANCELLED: i32 = 2;

/// Login states
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginState {
    /// No login attempt yet
    NoToken,
    /// Login URL handed to the user; waiting for the redirect
    PendingAuthorization { login_url: String },
    /// Redirect accepted; trading the grant for a token
    Exchanging,
    /// Token stored. Terminal
    TokenObtained,
    /// The user declined or interrupted the login. Terminal
    Cancelled,
    /// Terminal
    Failed { reason: String },
}

impl LoginState {
    pub fn label(&self) -> &'static str {
        match self {
            LoginState::NoToken => "no_token",
            LoginState::PendingAuthorization { .. } => "pending_authorization",
            LoginState::Exchanging => "exchanging",
            LoginState::TokenObtained => "token_obtained",
            LoginState::Cancelled => "cancelled",
            LoginState::Failed { .. } => "failed",
        }
    }
}

/// Events that drive state transitions
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginEvent {
    /// Login URL built (and request token obtained, for OAuth1)
    LoginUrlIssued { login_url: String },
    LoginUrlFailed(String),
    /// Redirect carried a grant: an authorization code or OAuth1 verifier
    Authorized { grant: String },
    /// The user declined on the provider's page
    Denied,
    /// Redirect arrived but cannot be used
    RedirectRejected(String),
    CallbackTimedOut,
    /// Ctrl-C while waiting
    Interrupted,
    ExchangeSucceeded,
    ExchangeFailed(String),
}

/// Actions the caller should execute after a state transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginAction {
    /// Show the URL and wait for the redirect
    AwaitCallback { login_url: String },
    /// Call the token endpoint with the grant
    ExchangeToken { grant: String },
    /// Exit the process
    Finish { exit_code: i32 },
    /// No-op
    None,
}

/// Handle a state transition. Pure function: no I/O.
pub fn handle_event(state: LoginState, event: LoginEvent) -> (LoginState, LoginAction) {
    match (state, event) {
        // --- NoToken ---
        (LoginState::NoToken, LoginEvent::LoginUrlIssued { login_url }) => (
            LoginState::PendingAuthorization {
                login_url: login_url.clone(),
            },
            LoginAction::AwaitCallback { login_url },
        ),

        (LoginState::NoToken, LoginEvent::LoginUrlFailed(reason)) => failed(reason),

        // --- PendingAuthorization ---
        (LoginState::PendingAuthorization { .. }, LoginEvent::Authorized { grant }) => (
            LoginState::Exchanging,
            LoginAction::ExchangeToken { grant },
        ),

        (LoginState::PendingAuthorization { .. }, LoginEvent::Denied) => cancelled(),

        (LoginState::PendingAuthorization { .. }, LoginEvent::RedirectRejected(reason)) => {
            failed(reason)
        }

        (LoginState::PendingAuthorization { .. }, LoginEvent::CallbackTimedOut) => {
            failed("timed out waiting for the authorization redirect".into())
        }

        // --- Exchanging ---
        (LoginState::Exchanging, LoginEvent::ExchangeSucceeded) => (
            LoginState::TokenObtained,
            LoginAction::Finish { exit_code: EXIT_OK },
        ),

        (LoginState::Exchanging, LoginEvent::ExchangeFailed(reason)) => failed(reason),

        // --- Any non-terminal state + interrupt = cancel ---
        (
            LoginState::NoToken | LoginState::PendingAuthorization { .. } | LoginState::Exchanging,
            LoginEvent::Interrupted,
        ) => cancelled(),

        // --- Invalid/unhandled transition: stay in current state ---
        (state, _event) => (state, LoginAction::None),
    }
}

fn failed(reason: String) -> (LoginState, LoginAction) {
    (
        LoginState::Failed { reason },
        LoginAction::Finish {
            exit_code: EXIT_FAILED,
        },
    )
}

fn cancelled() -> (LoginState, LoginAction) {
    (
        LoginState::Cancelled,
        LoginAction::Finish {
            exit_code: EXIT_CANCELLED,
        },
    )
}

/// Classify an OAuth2 redirect against the `state` this login sent.
pub fn oauth2_redirect_event(redirect_url: &str, expected_state: &str) -> LoginEvent {
    let result = OAuth2LoginResult::from_redirect_url(redirect_url);
    if result.cancel {
        return LoginEvent::Denied;
    }
    if let Some(error) = &result.error {
        return LoginEvent::RedirectRejected(error.to_string());
    }
    if result.state != expected_state {
        return LoginEvent::RedirectRejected(ServiceError::StateMismatch.to_string());
    }
    if result.code.is_empty() {
        return LoginEvent::RedirectRejected("redirect carried no authorization code".into());
    }
    LoginEvent::Authorized { grant: result.code }
}

/// Classify an OAuth1 callback against the request token this login issued.
pub fn oauth1_redirect_event(redirect_url: &str, expected_request_token: &str) -> LoginEvent {
    let result = OAuth1LoginResult::from_redirect_url(redirect_url);
    if result.cancel {
        return LoginEvent::Denied;
    }
    if !result.success {
        return LoginEvent::RedirectRejected(
            "callback lacks oauth_token or oauth_verifier".into(),
        );
    }
    if result.request_token != expected_request_token {
        return LoginEvent::RedirectRejected(ServiceError::StateMismatch.to_string());
    }
    LoginEvent::Authorized {
        grant: result.verifier,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pending() -> LoginState {
        LoginState::PendingAuthorization {
            login_url: "https://auth.example.com/authorize?state=s1".into(),
        }
    }

    #[test]
    fn no_token_to_pending_on_login_url() {
        let (state, action) = handle_event(
            LoginState::NoToken,
            LoginEvent::LoginUrlIssued {
                login_url: "https://auth.example.com/authorize".into(),
            },
        );
        assert_eq!(state.label(), "pending_authorization");
        assert_eq!(
            action,
            LoginAction::AwaitCallback {
                login_url: "https://auth.example.com/authorize".into()
            }
        );
    }

    #[test]
    fn login_url_failure_finishes_with_error() {
        let (state, action) = handle_event(
            LoginState::NoToken,
            LoginEvent::LoginUrlFailed("request token refused".into()),
        );
        assert!(matches!(state, LoginState::Failed { ref reason } if reason == "request token refused"));
        assert_eq!(action, LoginAction::Finish { exit_code: EXIT_FAILED });
    }

    #[test]
    fn pending_to_exchanging_on_authorized() {
        let (state, action) = handle_event(
            pending(),
            LoginEvent::Authorized {
                grant: "code-123".into(),
            },
        );
        assert_eq!(state, LoginState::Exchanging);
        assert_eq!(
            action,
            LoginAction::ExchangeToken {
                grant: "code-123".into()
            }
        );
    }

    #[test]
    fn denied_and_interrupt_cancel() {
        let (state, action) = handle_event(pending(), LoginEvent::Denied);
        assert_eq!(state, LoginState::Cancelled);
        assert_eq!(action, LoginAction::Finish { exit_code: EXIT_CANCELLED });

        let (state, _) = handle_event(LoginState::Exchanging, LoginEvent::Interrupted);
        assert_eq!(state, LoginState::Cancelled);
    }

    #[test]
    fn timeout_and_rejection_fail() {
        let (state, action) = handle_event(pending(), LoginEvent::CallbackTimedOut);
        assert_eq!(state.label(), "failed");
        assert_eq!(action, LoginAction::Finish { exit_code: EXIT_FAILED });

        let (state, _) = handle_event(pending(), LoginEvent::RedirectRejected("bad".into()));
        assert_eq!(state, LoginState::Failed { reason: "bad".into() });
    }

    #[test]
    fn exchange_outcomes() {
        let (state, action) = handle_event(LoginState::Exchanging, LoginEvent::ExchangeSucceeded);
        assert_eq!(state, LoginState::TokenObtained);
        assert_eq!(action, LoginAction::Finish { exit_code: EXIT_OK });

        let (state, action) = handle_event(
            LoginState::Exchanging,
            LoginEvent::ExchangeFailed("invalid_grant".into()),
        );
        assert_eq!(state.label(), "failed");
        assert_eq!(action, LoginAction::Finish { exit_code: EXIT_FAILED });
    }

    #[test]
    fn terminal_states_ignore_events() {
        for terminal in [
            LoginState::TokenObtained,
            LoginState::Cancelled,
            LoginState::Failed { reason: "x".into() },
        ] {
            let (state, action) = handle_event(terminal.clone(), LoginEvent::Interrupted);
            assert_eq!(state, terminal);
            assert_eq!(action, LoginAction::None);
        }
    }

    #[test]
    fn out_of_order_event_is_ignored() {
        let (state, action) = handle_event(LoginState::NoToken, LoginEvent::ExchangeSucceeded);
        assert_eq!(state, LoginState::NoToken);
        assert_eq!(action, LoginAction::None);
    }

    #[test]
    fn oauth2_redirect_with_matching_state() {
        let event = oauth2_redirect_event("http://127.0.0.1:8765/callback?code=abc&state=s1", "s1");
        assert_eq!(event, LoginEvent::Authorized { grant: "abc".into() });
    }

    #[test]
    fn oauth2_redirect_state_mismatch_is_rejected() {
        let event = oauth2_redirect_event("http://127.0.0.1:8765/callback?code=abc&state=evil", "s1");
        assert!(matches!(event, LoginEvent::RedirectRejected(ref r) if r.contains("state mismatch")));
    }

    #[test]
    fn oauth2_redirect_access_denied_is_denied() {
        let event = oauth2_redirect_event(
            "http://127.0.0.1:8765/callback?error=access_denied&state=s1",
            "s1",
        );
        assert_eq!(event, LoginEvent::Denied);
    }

    #[test]
    fn oauth2_redirect_error_is_rejected() {
        let event = oauth2_redirect_event(
            "http://127.0.0.1:8765/callback?error=invalid_scope&error_description=nope&state=s1",
            "s1",
        );
        assert_eq!(event, LoginEvent::RedirectRejected("invalid_scope: nope".into()));
    }

    #[test]
    fn oauth1_callback_events() {
        assert_eq!(
            oauth1_redirect_event("http://127.0.0.1/cb?oauth_token=rt&oauth_verifier=v", "rt"),
            LoginEvent::Authorized { grant: "v".into() }
        );
        assert_eq!(
            oauth1_redirect_event("http://127.0.0.1/cb?denied=rt", "rt"),
            LoginEvent::Denied
        );
        assert!(matches!(
            oauth1_redirect_event("http://127.0.0.1/cb?oauth_token=other&oauth_verifier=v", "rt"),
            LoginEvent::RedirectRejected(_)
        ));
    }
}
