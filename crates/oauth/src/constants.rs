//! Protocol constants
//!
//! Parameter names and fixed values from OAuth 1.0a (RFC 5849) and
//! OAuth 2.0 (RFC 6749), plus the preference-store key prefixes.

/// Preference key prefix for persisted OAuth1 tokens (`oauth1_<profile>`)
pub const OAUTH1_KEY_PREFIX: &str = "oauth1";

/// Preference key prefix for persisted OAuth2 tokens (`oauth2_<profile>`)
pub const OAUTH2_KEY_PREFIX: &str = "oauth2";

/// The only signature method this client implements
pub const SIGNATURE_METHOD: &str = "HMAC-SHA1";

pub const OAUTH_VERSION: &str = "1.0";

/// Prefix shared by every protocol parameter that goes into the
/// `Authorization: OAuth ...` header
pub const OAUTH_PARAM_PREFIX: &str = "oauth_";

/// Placeholder in `OAuth1Param::authenticate_url` replaced by the
/// percent-encoded request token
pub const REQUEST_TOKEN_PLACEHOLDER: &str = "{}";

/// Number of random bytes in an OAuth1 nonce (hex-encoded on the wire)
pub const NONCE_BYTES: usize = 32;

pub const GRANT_AUTHORIZATION_CODE: &str = "authorization_code";
pub const GRANT_CLIENT_CREDENTIALS: &str = "client_credentials";
pub const GRANT_REFRESH_TOKEN: &str = "refresh_token";

pub const PKCE_METHOD_S256: &str = "S256";
