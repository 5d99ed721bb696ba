//! OAuth 1.0a client
//!
//! Three-legged flow:
//! 1. `get_login_url()` fetches a request token and builds the user-facing
//!    authorization URL
//! 2. The user authorizes; the callback carries `oauth_token` and
//!    `oauth_verifier` (parse with `OAuth1LoginResult::parse_redirect_url`)
//! 3. `request_access_token()` trades the verifier for an access token, which
//!    is persisted under `oauth1_<profile>`
//!
//! After login, `authorize_request()` signs outgoing requests with the
//! stored token.

use std::sync::Arc;

use common::Secret;
use rand::RngExt;
use tracing::{debug, error, info, warn};
use transport::{HttpRequest, HttpResponse, Method, Transport};

use crate::constants::{NONCE_BYTES, OAUTH1_KEY_PREFIX, REQUEST_TOKEN_PLACEHOLDER};
use crate::encoding::{parameters_to_map, parse_parameters, percent_encode};
use crate::error::Error;
use crate::result::{OAuth1AccessTokenResult, OAuth1LoginUrl};
use crate::signature::{self, SignatureParams};
use crate::store::PreferenceStore;
use crate::token::{OAuth1AccessToken, TokenSlot, TokenState, now_millis};

/// Construction-time configuration for an OAuth1 client.
#[derive(Debug, Clone)]
pub struct OAuth1Param {
    /// Profile name for persistence; empty disables it
    pub preference_name: String,
    pub consumer_key: String,
    pub consumer_secret: Secret<String>,
    /// Initial token; overrides a restored one when valid
    pub access_token: OAuth1AccessToken,
    pub request_token_method: Method,
    pub request_token_url: String,
    /// Authorization page URL; `{}` is replaced by the encoded request token
    pub authenticate_url: String,
    pub access_token_method: Method,
    pub access_token_url: String,
    pub callback_url: String,
    pub log_errors: bool,
}

impl Default for OAuth1Param {
    fn default() -> Self {
        Self {
            preference_name: String::new(),
            consumer_key: String::new(),
            consumer_secret: Secret::default(),
            access_token: OAuth1AccessToken::default(),
            request_token_method: Method::POST,
            request_token_url: String::new(),
            authenticate_url: String::new(),
            access_token_method: Method::POST,
            access_token_url: String::new(),
            callback_url: String::new(),
            log_errors: true,
        }
    }
}

/// Per-login options for `OAuth1::get_login_url`.
#[derive(Debug, Clone, Default)]
pub struct OAuth1AuthorizationRequestParam {
    /// Overrides the client's callback URL when non-empty
    pub callback_url: String,
    /// Extra parameters sent to the request-token endpoint
    pub custom_parameters: Vec<(String, String)>,
}

/// OAuth 1.0a client bound to one consumer and one stored profile.
pub struct OAuth1 {
    consumer_key: String,
    consumer_secret: Secret<String>,
    request_token_method: Method,
    request_token_url: String,
    authenticate_url: String,
    access_token_method: Method,
    access_token_url: String,
    callback_url: String,
    log_errors: bool,
    token: TokenSlot<OAuth1AccessToken>,
    transport: Arc<dyn Transport>,
}

impl OAuth1 {
    /// Create a client, restoring any token persisted for the profile.
    pub fn new(
        param: OAuth1Param,
        transport: Arc<dyn Transport>,
        store: Arc<dyn PreferenceStore>,
    ) -> Self {
        let token = TokenSlot::restore(store, OAUTH1_KEY_PREFIX, &param.preference_name);
        if param.access_token.is_valid() {
            token.replace(Some(param.access_token));
        }
        Self {
            consumer_key: param.consumer_key,
            consumer_secret: param.consumer_secret,
            request_token_method: param.request_token_method,
            request_token_url: param.request_token_url,
            authenticate_url: param.authenticate_url,
            access_token_method: param.access_token_method,
            access_token_url: param.access_token_url,
            callback_url: param.callback_url,
            log_errors: param.log_errors,
            token,
            transport,
        }
    }

    pub fn access_token(&self) -> Option<Arc<OAuth1AccessToken>> {
        self.token.get()
    }

    /// Replace the current token; an invalid token clears it.
    pub fn set_access_token(&self, token: OAuth1AccessToken) {
        self.token.replace(token.is_valid().then_some(token));
    }

    pub fn set_access_token_parts(&self, token: impl Into<String>, secret: impl Into<String>) {
        self.set_access_token(OAuth1AccessToken::new(token, secret));
    }

    pub fn clear_access_token(&self) {
        self.token.replace(None);
    }

    pub fn access_token_key(&self) -> Option<String> {
        self.token.get().map(|t| t.token.clone())
    }

    pub fn access_token_secret(&self) -> Option<String> {
        self.token.get().map(|t| t.secret.clone())
    }

    /// OAuth1 tokens do not expire, so this is `NoToken` or `Valid`.
    pub fn token_state(&self) -> TokenState {
        match self.token.get() {
            Some(_) => TokenState::Valid,
            None => TokenState::NoToken,
        }
    }

    pub fn callback_url(&self) -> &str {
        &self.callback_url
    }

    pub fn set_callback_url(&mut self, url: impl Into<String>) {
        self.callback_url = url.into();
    }

    pub fn set_log_errors(&mut self, flag: bool) {
        self.log_errors = flag;
    }

    /// `Authorization` header value for the given inputs.
    ///
    /// Deterministic: identical inputs produce identical headers.
    pub fn generate_authorization_header(&self, params: &SignatureParams<'_>) -> String {
        signature::generate_authorization_header(
            &self.consumer_key,
            self.consumer_secret.expose(),
            params,
        )
    }

    /// The string that `generate_authorization_header` signs.
    pub fn signature_base_string(&self, params: &SignatureParams<'_>) -> String {
        let sorted = signature::collect_parameters(&self.consumer_key, params);
        signature::signature_base_string(params.method, params.url, &sorted)
    }

    /// Sign `request` with an explicit token and callback.
    ///
    /// Query parameters and, for non-multipart POST bodies, form parameters
    /// are part of the signature. The header is appended.
    pub fn authorize_request_with(
        &self,
        request: &mut HttpRequest,
        token: &str,
        token_secret: &str,
        callback_url: &str,
    ) {
        let nonce = generate_nonce();
        let timestamp = now_millis() / 1000;

        let mut parameters = request.query.clone();
        if request.method == Method::POST {
            parameters.extend(request.form_body_pairs());
        }

        let header = self.generate_authorization_header(&SignatureParams {
            method: request.method.as_str(),
            url: &request.url,
            parameters: &parameters,
            nonce: &nonce,
            timestamp,
            token,
            token_secret,
            callback_url,
        });
        request.add_header("Authorization", header);
    }

    /// Sign `request` with the current access token. No-op without one.
    pub fn authorize_request(&self, request: &mut HttpRequest) {
        if let Some(token) = self.token.get() {
            self.authorize_request_with(request, &token.token, &token.secret, "");
        }
    }

    /// Obtain a request token and build the login URL.
    ///
    /// On transport failure every field of the result is empty.
    pub async fn get_login_url(&self, param: &OAuth1AuthorizationRequestParam) -> OAuth1LoginUrl {
        let callback_url = if param.callback_url.is_empty() {
            self.callback_url.as_str()
        } else {
            param.callback_url.as_str()
        };

        let mut request = HttpRequest::new(
            self.request_token_method.clone(),
            self.request_token_url.as_str(),
        );
        if request.method == Method::POST {
            request.set_body_form(&param.custom_parameters);
        } else {
            request.query = param.custom_parameters.clone();
        }
        self.authorize_request_with(&mut request, "", "", callback_url);

        let (method, url) = (request.method.clone(), request.url.clone());
        let response = self.transport.send(request).await;
        if response.is_error() {
            self.log_request_error(&method, &url, &response);
            return OAuth1LoginUrl::default();
        }

        let params = parameters_to_map(parse_parameters(&response.body_as_string()));
        let request_token = params.get("oauth_token").cloned().unwrap_or_default();
        let request_token_secret = params.get("oauth_token_secret").cloned().unwrap_or_default();
        let url = match params.get("login_url").filter(|u| !u.is_empty()) {
            Some(login_url) => login_url.clone(),
            None => self.authenticate_url.replacen(
                REQUEST_TOKEN_PLACEHOLDER,
                &percent_encode(&request_token),
                1,
            ),
        };
        debug!(has_request_token = !request_token.is_empty(), "obtained OAuth1 login URL");

        OAuth1LoginUrl {
            url,
            request_token,
            request_token_secret,
        }
    }

    /// `get_login_url` with the client's default callback and no extras.
    pub async fn get_default_login_url(&self) -> OAuth1LoginUrl {
        self.get_login_url(&OAuth1AuthorizationRequestParam::default())
            .await
    }

    /// Exchange a verifier and request token for an access token.
    ///
    /// On success the new token becomes current and is persisted.
    pub async fn request_access_token(
        &self,
        verifier: &str,
        request_token: &str,
        request_token_secret: &str,
    ) -> OAuth1AccessTokenResult {
        let mut request = HttpRequest::new(
            self.access_token_method.clone(),
            self.access_token_url.as_str(),
        );
        if request.method == Method::POST {
            request.set_body_form(&[("oauth_verifier", verifier)]);
        } else {
            request.add_query("oauth_verifier", verifier);
        }
        self.authorize_request_with(&mut request, request_token, request_token_secret, "");

        let (method, url) = (request.method.clone(), request.url.clone());
        let response = self.transport.send(request).await;

        let mut result = OAuth1AccessTokenResult::default();
        result.set_response(parameters_to_map(parse_parameters(
            &response.body_as_string(),
        )));
        if response.is_error() {
            self.log_request_error(&method, &url, &response);
            result.success = false;
        }
        if result.success {
            self.set_access_token(result.access_token.clone());
            info!("OAuth1 access token obtained");
        } else if self.log_errors && !response.is_error() {
            let err = Error::Validation("response lacks oauth_token or oauth_token_secret".into());
            warn!(error = %err, "OAuth1 access token response rejected");
        }
        result
    }

    fn log_request_error(&self, method: &Method, url: &str, response: &HttpResponse) {
        if self.log_errors {
            let err = Error::Transport(response.last_error_message().to_string());
            error!(
                %method,
                url,
                status = response.status,
                body = %response.body_as_string(),
                error = %err,
                "OAuth1 request failed"
            );
        }
    }
}

/// 32 random bytes, hex-encoded.
fn generate_nonce() -> String {
    let mut bytes = [0u8; NONCE_BYTES];
    rand::rng().fill(&mut bytes);
    hex::encode(bytes)
}
