//! Result objects for token exchanges and login redirects
//!
//! Every operation builds a fresh result. Transport failures, OAuth `error`
//! responses and responses missing a usable token all come back the same
//! way: `success == false`. Protocol errors additionally carry the parsed
//! `error` fields.

use std::collections::HashMap;

use serde_json::Value;

use crate::encoding::parse_parameters;
use crate::token::{OAuth1AccessToken, OAuth2AccessToken, now_millis};

/// OAuth 2.0 error codes (RFC 6749 sections 4.1.2.1 and 5.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OAuthErrorCode {
    /// No error, or an `error` value outside the standard set
    #[default]
    None,
    InvalidRequest,
    UnauthorizedClient,
    AccessDenied,
    UnsupportedResponseType,
    InvalidScope,
    ServerError,
    TemporarilyUnavailable,
    InvalidClient,
    InvalidGrant,
    UnsupportedGrantType,
}

impl OAuthErrorCode {
    /// Map an `error` parameter value to its code.
    pub fn from_error(error: &str) -> Self {
        match error {
            "invalid_request" => Self::InvalidRequest,
            "unauthorized_client" => Self::UnauthorizedClient,
            "access_denied" => Self::AccessDenied,
            "unsupported_response_type" => Self::UnsupportedResponseType,
            "invalid_scope" => Self::InvalidScope,
            "server_error" => Self::ServerError,
            "temporarily_unavailable" => Self::TemporarilyUnavailable,
            "invalid_client" => Self::InvalidClient,
            "invalid_grant" => Self::InvalidGrant,
            "unsupported_grant_type" => Self::UnsupportedGrantType,
            _ => Self::None,
        }
    }
}

/// An OAuth `error` response, as sent by the server.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProtocolError {
    pub code: OAuthErrorCode,
    pub error: String,
    pub description: String,
    pub uri: String,
}

impl ProtocolError {
    /// Extract the error fields; `None` when `error` is absent or empty.
    pub fn from_params(params: &HashMap<String, String>) -> Option<Self> {
        let error = params.get("error").filter(|e| !e.is_empty())?;
        Some(Self {
            code: OAuthErrorCode::from_error(error),
            error: error.clone(),
            description: params.get("error_description").cloned().unwrap_or_default(),
            uri: params.get("error_uri").cloned().unwrap_or_default(),
        })
    }
}

impl std::fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.error)?;
        if !self.description.is_empty() {
            write!(f, ": {}", self.description)?;
        }
        Ok(())
    }
}

/// Flatten a JSON object into string parameters.
///
/// Strings are taken as-is, numbers and booleans are formatted, nested
/// values keep their JSON text. Nulls and non-objects yield nothing.
pub fn json_to_params(value: &Value) -> HashMap<String, String> {
    let Some(object) = value.as_object() else {
        return HashMap::new();
    };
    object
        .iter()
        .filter_map(|(k, v)| {
            let s = match v {
                Value::Null => return None,
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            Some((k.clone(), s))
        })
        .collect()
}

/// Split a redirect URL into its query and fragment strings.
fn redirect_parts(url: &str) -> (&str, &str) {
    let (before_fragment, fragment) = match url.split_once('#') {
        Some((a, b)) => (a, b),
        None => (url, ""),
    };
    let query = before_fragment
        .split_once('?')
        .map(|(_, q)| q)
        .unwrap_or_default();
    (query, fragment)
}

/// Outcome of an OAuth1 access-token exchange.
#[derive(Debug, Clone, Default)]
pub struct OAuth1AccessTokenResult {
    pub success: bool,
    pub response: HashMap<String, String>,
    pub access_token: OAuth1AccessToken,
}

impl OAuth1AccessTokenResult {
    pub fn set_response(&mut self, params: HashMap<String, String>) {
        self.access_token.set_response(&params);
        self.success = self.access_token.is_valid();
        self.response = params;
    }
}

/// Parsed OAuth1 authorization callback.
#[derive(Debug, Clone, Default)]
pub struct OAuth1LoginResult {
    pub success: bool,
    /// The user declined (`denied` present in the callback)
    pub cancel: bool,
    pub request_token: String,
    pub verifier: String,
    pub response: HashMap<String, String>,
}

impl OAuth1LoginResult {
    pub fn parse_redirect_url(&mut self, url: &str) {
        let (query, _) = redirect_parts(url);
        let params: HashMap<String, String> = parse_parameters(query).into_iter().collect();
        self.request_token = params.get("oauth_token").cloned().unwrap_or_default();
        self.verifier = params.get("oauth_verifier").cloned().unwrap_or_default();
        self.cancel = params.contains_key("denied");
        self.success = !self.request_token.is_empty() && !self.verifier.is_empty();
        self.response = params;
    }

    pub fn from_redirect_url(url: &str) -> Self {
        let mut result = Self::default();
        result.parse_redirect_url(url);
        result
    }
}

/// Login URL plus the request token obtained while building it.
///
/// All fields are empty when the request-token round trip failed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OAuth1LoginUrl {
    pub url: String,
    pub request_token: String,
    pub request_token_secret: String,
}

impl OAuth1LoginUrl {
    pub fn is_empty(&self) -> bool {
        self.url.is_empty() && self.request_token.is_empty()
    }
}

/// Outcome of an OAuth2 token-endpoint exchange.
#[derive(Debug, Clone, Default)]
pub struct OAuth2AccessTokenResult {
    pub success: bool,
    pub error: Option<ProtocolError>,
    /// Raw response body as JSON (form responses are converted to an object)
    pub response: Value,
    pub access_token: OAuth2AccessToken,
}

impl OAuth2AccessTokenResult {
    pub fn set_response(&mut self, response: Value) {
        self.set_response_at(response, now_millis());
    }

    pub(crate) fn set_response_at(&mut self, response: Value, now: u64) {
        let params = json_to_params(&response);
        self.error = ProtocolError::from_params(&params);
        self.access_token.set_response_at(&params, now);
        self.success = self.error.is_none() && self.access_token.is_valid_at(now);
        self.response = response;
    }

    pub fn error_code(&self) -> OAuthErrorCode {
        self.error.as_ref().map(|e| e.code).unwrap_or_default()
    }
}

/// Parsed OAuth2 authorization redirect (code or implicit grant).
#[derive(Debug, Clone, Default)]
pub struct OAuth2LoginResult {
    pub success: bool,
    /// The user declined (`error=access_denied`)
    pub cancel: bool,
    pub error: Option<ProtocolError>,
    pub code: String,
    pub state: String,
    pub access_token: OAuth2AccessToken,
    pub response: HashMap<String, String>,
}

impl OAuth2LoginResult {
    /// Parse the redirect URL.
    ///
    /// Query and fragment parameters are merged; fragment values win on
    /// duplicate keys. Success requires no `error` and either a code or a
    /// valid implicit-grant token.
    pub fn parse_redirect_url(&mut self, url: &str) {
        let (query, fragment) = redirect_parts(url);
        let mut params: HashMap<String, String> = parse_parameters(query).into_iter().collect();
        params.extend(parse_parameters(fragment));

        let now = now_millis();
        self.error = ProtocolError::from_params(&params);
        self.cancel = self.error_code() == OAuthErrorCode::AccessDenied;
        self.access_token.set_response_at(&params, now);
        self.state = params.get("state").cloned().unwrap_or_default();
        self.code = params.get("code").cloned().unwrap_or_default();
        self.success = self.error.is_none()
            && (!self.code.is_empty() || self.access_token.is_valid_at(now));
        self.response = params;
    }

    pub fn from_redirect_url(url: &str) -> Self {
        let mut result = Self::default();
        result.parse_redirect_url(url);
        result
    }

    pub fn error_code(&self) -> OAuthErrorCode {
        self.error.as_ref().map(|e| e.code).unwrap_or_default()
    }
}
