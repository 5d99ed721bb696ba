//! OAuth 1.0a and OAuth 2.0 client library
//!
//! Builds authenticated HTTP requests and parses authorization responses.
//! Network I/O goes through an injected `transport::Transport`; tokens are
//! persisted through an injected `PreferenceStore`. Neither collaborator is
//! global, so hosts and tests choose their own.
//!
//! OAuth1 flow:
//! 1. `OAuth1::get_login_url()` obtains a request token and the user-facing URL
//! 2. The callback URL is parsed with `OAuth1LoginResult::parse_redirect_url()`
//! 3. `OAuth1::request_access_token()` exchanges the verifier
//!
//! OAuth2 flow:
//! 1. `OAuth2::get_login_url()` builds the authorization URL (PKCE optional)
//! 2. The redirect is parsed with `OAuth2LoginResult::parse_redirect_url()`
//! 3. `OAuth2::request_access_token_by_code()` (or the implicit-grant token
//!    from the redirect) yields the access token
//! 4. `OAuth2::request_refresh_token()` renews it; the client never refreshes
//!    on its own

pub mod constants;
pub mod encoding;
pub mod error;
pub mod oauth1;
pub mod oauth2;
pub mod pkce;
pub mod result;
pub mod signature;
pub mod store;
pub mod token;

#[cfg(test)]
mod testing;

pub use error::{Error, Result};
pub use oauth1::{OAuth1, OAuth1AuthorizationRequestParam, OAuth1Param};
pub use oauth2::{OAuth2, OAuth2AuthorizationRequestParam, OAuth2Param, OAuthGrantType};
pub use result::{
    OAuth1AccessTokenResult, OAuth1LoginResult, OAuth1LoginUrl, OAuth2AccessTokenResult,
    OAuth2LoginResult, OAuthErrorCode, ProtocolError,
};
pub use signature::SignatureParams;
pub use store::{FileStore, MemoryStore, PreferenceStore};
pub use token::{OAuth1AccessToken, OAuth2AccessToken, TokenState};
