//! OAuth 2.0 client
//!
//! Covers the authorization-code (optionally with PKCE), implicit,
//! client-credentials and refresh-token grants. The client builds login
//! URLs, talks to the token endpoint, keeps the current token (persisted
//! under `oauth2_<profile>`) and attaches it to outgoing requests as a
//! bearer token.

use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use common::Secret;
use serde_json::Value;
use tracing::{error, info, warn};
use transport::{HttpRequest, HttpResponse, Method, Transport};
use url::Url;

use crate::constants::{
    GRANT_AUTHORIZATION_CODE, GRANT_CLIENT_CREDENTIALS, GRANT_REFRESH_TOKEN, OAUTH2_KEY_PREFIX,
    PKCE_METHOD_S256,
};
use crate::encoding::{parse_parameters, put_parameter};
use crate::error::{Error, Result};
use crate::result::OAuth2AccessTokenResult;
use crate::store::PreferenceStore;
use crate::token::{OAuth2AccessToken, TokenSlot, TokenState};

/// Construction-time configuration for an OAuth2 client.
#[derive(Debug, Clone)]
pub struct OAuth2Param {
    /// Profile name for persistence; empty disables it
    pub preference_name: String,
    pub client_id: String,
    pub client_secret: Secret<String>,
    /// Initial token; overrides a restored one when valid
    pub access_token: OAuth2AccessToken,
    pub authorize_url: String,
    pub access_token_url: String,
    pub access_token_method: Method,
    /// Send client credentials as HTTP Basic auth instead of form fields
    pub use_basic_auth_for_access_token: bool,
    pub redirect_uri: String,
    /// URL prefix a host watches for to detect the end of a login
    pub login_redirect_uri: String,
    pub default_scopes: Vec<String>,
    /// Allow `response_type=token` (implicit grant)
    pub support_token_grant_type: bool,
    pub log_errors: bool,
}

impl Default for OAuth2Param {
    fn default() -> Self {
        Self {
            preference_name: String::new(),
            client_id: String::new(),
            client_secret: Secret::default(),
            access_token: OAuth2AccessToken::default(),
            authorize_url: String::new(),
            access_token_url: String::new(),
            access_token_method: Method::POST,
            use_basic_auth_for_access_token: false,
            redirect_uri: String::new(),
            login_redirect_uri: String::new(),
            default_scopes: Vec::new(),
            support_token_grant_type: true,
            log_errors: true,
        }
    }
}

/// Which grant the login URL asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OAuthGrantType {
    /// Implicit grant: the token comes back in the redirect fragment
    #[default]
    Token,
    /// Authorization-code grant
    Code,
}

/// Per-login options for `OAuth2::get_login_url`.
#[derive(Debug, Clone, Default)]
pub struct OAuth2AuthorizationRequestParam {
    pub grant_type: OAuthGrantType,
    /// Overrides the client's redirect URI when non-empty
    pub redirect_uri: String,
    /// `None` uses the client's default scopes
    pub scopes: Option<Vec<String>>,
    pub state: String,
    /// S256 PKCE challenge (see `pkce::compute_challenge`)
    pub code_challenge: Option<String>,
    pub custom_parameters: Vec<(String, String)>,
}

/// OAuth 2.0 client bound to one registered client and one stored profile.
pub struct OAuth2 {
    client_id: String,
    client_secret: Secret<String>,
    authorize_url: String,
    access_token_url: String,
    access_token_method: Method,
    use_basic_auth_for_access_token: bool,
    redirect_uri: String,
    login_redirect_uri: String,
    default_scopes: Vec<String>,
    support_token_grant_type: bool,
    log_errors: bool,
    token: TokenSlot<OAuth2AccessToken>,
    transport: Arc<dyn Transport>,
}

impl OAuth2 {
    /// Create a client, restoring any token persisted for the profile.
    ///
    /// Restored tokens are kept even when expired so their refresh token
    /// remains usable.
    pub fn new(
        param: OAuth2Param,
        transport: Arc<dyn Transport>,
        store: Arc<dyn PreferenceStore>,
    ) -> Self {
        let token = TokenSlot::restore(store, OAUTH2_KEY_PREFIX, &param.preference_name);
        if param.access_token.is_valid() {
            token.replace(Some(param.access_token));
        }
        Self {
            client_id: param.client_id,
            client_secret: param.client_secret,
            authorize_url: param.authorize_url,
            access_token_url: param.access_token_url,
            access_token_method: param.access_token_method,
            use_basic_auth_for_access_token: param.use_basic_auth_for_access_token,
            redirect_uri: param.redirect_uri,
            login_redirect_uri: param.login_redirect_uri,
            default_scopes: param.default_scopes,
            support_token_grant_type: param.support_token_grant_type,
            log_errors: param.log_errors,
            token,
            transport,
        }
    }

    pub fn access_token(&self) -> Option<Arc<OAuth2AccessToken>> {
        self.token.get()
    }

    /// Replace the current token; an invalid or expired token clears it.
    pub fn set_access_token(&self, token: OAuth2AccessToken) {
        self.token.replace(token.is_valid().then_some(token));
    }

    /// Install a bare, never-expiring token; an empty string clears it.
    pub fn set_access_token_string(&self, token: impl Into<String>) {
        let token = token.into();
        self.token
            .replace((!token.is_empty()).then(|| OAuth2AccessToken::new(token)));
    }

    pub fn clear_access_token(&self) {
        self.token.replace(None);
    }

    pub fn access_token_key(&self) -> Option<String> {
        self.token.get().map(|t| t.token.clone())
    }

    pub fn access_token_scopes(&self) -> Option<Vec<String>> {
        self.token.get().map(|t| t.scopes.clone())
    }

    pub fn token_state(&self) -> TokenState {
        match self.token.get() {
            None => TokenState::NoToken,
            Some(t) if t.is_valid() => TokenState::Valid,
            Some(_) => TokenState::Expired,
        }
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn redirect_uri(&self) -> &str {
        &self.redirect_uri
    }

    pub fn login_redirect_uri(&self) -> &str {
        &self.login_redirect_uri
    }

    pub fn set_log_errors(&mut self, flag: bool) {
        self.log_errors = flag;
    }

    /// Set `Authorization: Bearer <token>` for bearer-type tokens.
    ///
    /// Tokens of any other type leave the request untouched.
    pub fn authorize_request_with(&self, request: &mut HttpRequest, token: &OAuth2AccessToken) {
        if token.token_type.is_empty() || token.token_type.eq_ignore_ascii_case("bearer") {
            request.put_header("Authorization", format!("Bearer {}", token.token));
        }
    }

    /// Authorize `request` with the current token. No-op without one.
    pub fn authorize_request(&self, request: &mut HttpRequest) {
        if let Some(token) = self.token.get() {
            self.authorize_request_with(request, &token);
        }
    }

    /// Build the authorization endpoint URL.
    ///
    /// Generated parameters, in order: `response_type`, `client_id`,
    /// `redirect_uri`, `scope`, `state`, the PKCE pair, then custom
    /// parameters. Parameters already in the configured authorize URL win
    /// on key collisions.
    pub fn get_login_url(&self, param: &OAuth2AuthorizationRequestParam) -> Result<String> {
        let mut url = Url::parse(&self.authorize_url)
            .map_err(|e| Error::InvalidUrl(format!("{}: {e}", self.authorize_url)))?;
        let original: Vec<(String, String)> = url.query_pairs().into_owned().collect();

        let response_type =
            if self.support_token_grant_type && param.grant_type == OAuthGrantType::Token {
                "token"
            } else {
                "code"
            };
        let mut params = vec![
            ("response_type".to_string(), response_type.to_string()),
            ("client_id".to_string(), self.client_id.clone()),
        ];

        let redirect_uri = if param.redirect_uri.is_empty() {
            &self.redirect_uri
        } else {
            &param.redirect_uri
        };
        if !redirect_uri.is_empty() {
            params.push(("redirect_uri".to_string(), redirect_uri.clone()));
        }

        let scopes = param.scopes.as_deref().unwrap_or(&self.default_scopes);
        let scope = join_scopes(scopes);
        if !scope.is_empty() {
            params.push(("scope".to_string(), scope));
        }
        if !param.state.is_empty() {
            params.push(("state".to_string(), param.state.clone()));
        }
        if let Some(challenge) = &param.code_challenge {
            params.push(("code_challenge".to_string(), challenge.clone()));
            params.push((
                "code_challenge_method".to_string(),
                PKCE_METHOD_S256.to_string(),
            ));
        }

        for (key, value) in param.custom_parameters.iter().chain(original.iter()) {
            put_parameter(&mut params, key, value.clone());
        }

        url.query_pairs_mut().clear().extend_pairs(params.iter());
        Ok(url.to_string())
    }

    /// `get_login_url` with only grant type, scopes and state set.
    pub fn login_url_for(
        &self,
        grant_type: OAuthGrantType,
        scopes: Option<Vec<String>>,
        state: impl Into<String>,
    ) -> Result<String> {
        self.get_login_url(&OAuth2AuthorizationRequestParam {
            grant_type,
            scopes,
            state: state.into(),
            ..Default::default()
        })
    }

    /// Call the token endpoint with `params` plus client credentials.
    ///
    /// Without both a client id and a secret this returns an unsuccessful,
    /// empty result without touching the network. On success the new token
    /// becomes current and is persisted.
    pub async fn request_access_token(
        &self,
        params: Vec<(String, String)>,
    ) -> OAuth2AccessTokenResult {
        self.exchange(params, None).await
    }

    /// `client_credentials` grant.
    pub async fn request_client_credentials_token(&self) -> OAuth2AccessTokenResult {
        self.request_access_token(vec![grant(GRANT_CLIENT_CREDENTIALS)])
            .await
    }

    /// `authorization_code` grant.
    pub async fn request_access_token_by_code(
        &self,
        code: &str,
        redirect_uri: &str,
    ) -> OAuth2AccessTokenResult {
        self.request_access_token(code_params(code, redirect_uri))
            .await
    }

    /// `authorization_code` grant with the client's redirect URI.
    pub async fn request_access_token_by_code_default(&self, code: &str) -> OAuth2AccessTokenResult {
        self.request_access_token_by_code(code, &self.redirect_uri)
            .await
    }

    /// `authorization_code` grant completing a PKCE login.
    pub async fn request_access_token_by_code_with_verifier(
        &self,
        code: &str,
        redirect_uri: &str,
        code_verifier: &str,
    ) -> OAuth2AccessTokenResult {
        let mut params = code_params(code, redirect_uri);
        params.push(("code_verifier".to_string(), code_verifier.to_string()));
        self.request_access_token(params).await
    }

    /// `refresh_token` grant.
    ///
    /// A response without a new refresh token keeps `refresh_token`, so the
    /// stored token stays refreshable.
    pub async fn request_refresh_token(
        &self,
        refresh_token: &str,
        scopes: &[String],
    ) -> OAuth2AccessTokenResult {
        let mut params = vec![
            grant(GRANT_REFRESH_TOKEN),
            ("refresh_token".to_string(), refresh_token.to_string()),
        ];
        let scope = join_scopes(scopes);
        if !scope.is_empty() {
            params.push(("scopes".to_string(), scope));
        }
        self.exchange(params, Some(refresh_token)).await
    }

    async fn exchange(
        &self,
        mut params: Vec<(String, String)>,
        previous_refresh_token: Option<&str>,
    ) -> OAuth2AccessTokenResult {
        if self.client_id.is_empty() || self.client_secret.is_empty() {
            if self.log_errors {
                let err = Error::Configuration("client id and client secret are required".into());
                error!(error = %err, "OAuth2 token request not sent");
            }
            return OAuth2AccessTokenResult::default();
        }

        let mut request = HttpRequest::new(
            self.access_token_method.clone(),
            self.access_token_url.as_str(),
        );
        request.put_header("Accept", "application/json");
        if self.use_basic_auth_for_access_token {
            let credentials = format!("{}:{}", self.client_id, self.client_secret.expose());
            request.put_header(
                "Authorization",
                format!("Basic {}", STANDARD.encode(credentials)),
            );
        } else {
            put_parameter(&mut params, "client_id", self.client_id.clone());
            put_parameter(
                &mut params,
                "client_secret",
                self.client_secret.expose().clone(),
            );
        }
        if request.method == Method::POST {
            request.set_body_form(&params);
        } else {
            request.query = params;
        }

        let (method, url) = (request.method.clone(), request.url.clone());
        let response = self.transport.send(request).await;

        let mut result = OAuth2AccessTokenResult::default();
        result.set_response(response_json(&response));
        if response.is_error() {
            self.log_request_error(&method, &url, &response);
            result.success = false;
        } else if let Some(err) = &result.error {
            self.log_rejected(Error::Protocol(err.to_string()));
        } else if !result.success {
            self.log_rejected(Error::Validation("no usable access token in response".into()));
        }
        if result.success {
            if let Some(previous) = previous_refresh_token
                && result.access_token.refresh_token.is_empty()
            {
                result.access_token.refresh_token = previous.to_string();
            }
            self.set_access_token(result.access_token.clone());
            info!(
                expires_at = result.access_token.expiration_time,
                "OAuth2 access token obtained"
            );
        }
        result
    }

    fn log_rejected(&self, err: Error) {
        if self.log_errors {
            warn!(error = %err, "OAuth2 token response rejected");
        }
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
                "OAuth2 request failed"
            );
        }
    }
}

fn grant(grant_type: &str) -> (String, String) {
    ("grant_type".to_string(), grant_type.to_string())
}

fn code_params(code: &str, redirect_uri: &str) -> Vec<(String, String)> {
    vec![
        grant(GRANT_AUTHORIZATION_CODE),
        ("code".to_string(), code.to_string()),
        ("redirect_uri".to_string(), redirect_uri.to_string()),
    ]
}

fn join_scopes<S: AsRef<str>>(scopes: &[S]) -> String {
    scopes
        .iter()
        .map(AsRef::as_ref)
        .collect::<Vec<_>>()
        .join(" ")
        .trim()
        .to_string()
}

/// Token responses are JSON objects; some servers answer with form pairs.
fn response_json(response: &HttpResponse) -> Value {
    match response.body_as_json() {
        value @ Value::Object(_) => value,
        _ => Value::Object(
            parse_parameters(&response.body_as_string())
                .into_iter()
                .map(|(k, v)| (k, Value::String(v)))
                .collect(),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pkce;
    use crate::result::{OAuth2LoginResult, OAuthErrorCode};
    use crate::store::MemoryStore;
    use crate::testing::MockTransport;
    use crate::token::now_millis;

    fn param() -> OAuth2Param {
        OAuth2Param {
            preference_name: "github".into(),
            client_id: "cid".into(),
            client_secret: Secret::from("csecret"),
            authorize_url: "https://auth.example.com/authorize".into(),
            access_token_url: "https://auth.example.com/token".into(),
            redirect_uri: "http://127.0.0.1:8765/callback".into(),
            default_scopes: vec!["read".into(), "write".into()],
            ..Default::default()
        }
    }

    fn client(transport: Arc<MockTransport>, store: Arc<MemoryStore>) -> OAuth2 {
        OAuth2::new(param(), transport, store)
    }

    fn idle() -> OAuth2 {
        client(Arc::new(MockTransport::new()), Arc::new(MemoryStore::new()))
    }

    fn pairs(items: &[(&str, &str)]) -> Vec<(String, String)> {
        items
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn login_url_parameter_order() {
        let url = idle()
            .get_login_url(&OAuth2AuthorizationRequestParam {
                grant_type: OAuthGrantType::Code,
                state: "xyz".into(),
                custom_parameters: pairs(&[("prompt", "consent")]),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(
            url,
            "https://auth.example.com/authorize?response_type=code&client_id=cid\
             &redirect_uri=http%3A%2F%2F127.0.0.1%3A8765%2Fcallback&scope=read+write\
             &state=xyz&prompt=consent"
        );
    }

    #[test]
    fn implicit_grant_needs_support_flag() {
        let c = idle();
        let url = c.login_url_for(OAuthGrantType::Token, None, "").unwrap();
        assert!(url.contains("response_type=token"));

        let mut p = param();
        p.support_token_grant_type = false;
        let c = OAuth2::new(p, Arc::new(MockTransport::new()), Arc::new(MemoryStore::new()));
        let url = c.login_url_for(OAuthGrantType::Token, None, "").unwrap();
        assert!(url.contains("response_type=code"));
    }

    #[test]
    fn authorize_url_query_takes_precedence() {
        let mut p = param();
        p.authorize_url = "https://auth.example.com/authorize?audience=api&response_type=token".into();
        p.redirect_uri = String::new();
        let c = OAuth2::new(p, Arc::new(MockTransport::new()), Arc::new(MemoryStore::new()));

        let url = c
            .login_url_for(OAuthGrantType::Code, Some(Vec::new()), "")
            .unwrap();
        assert_eq!(
            url,
            "https://auth.example.com/authorize?response_type=token&client_id=cid&audience=api"
        );
    }

    #[test]
    fn request_overrides_redirect_and_scopes() {
        let url = idle()
            .get_login_url(&OAuth2AuthorizationRequestParam {
                grant_type: OAuthGrantType::Code,
                redirect_uri: "https://app.example.com/cb".into(),
                scopes: Some(vec!["profile".into()]),
                ..Default::default()
            })
            .unwrap();
        assert!(url.contains("redirect_uri=https%3A%2F%2Fapp.example.com%2Fcb&scope=profile"));
        assert!(!url.contains("state="));
    }

    #[test]
    fn login_url_carries_pkce_challenge() {
        let challenge = pkce::compute_challenge("verifier");
        let url = idle()
            .get_login_url(&OAuth2AuthorizationRequestParam {
                grant_type: OAuthGrantType::Code,
                code_challenge: Some(challenge.clone()),
                ..Default::default()
            })
            .unwrap();
        assert!(url.ends_with(&format!(
            "&code_challenge={challenge}&code_challenge_method=S256"
        )));
    }

    #[test]
    fn bad_authorize_url_is_an_error() {
        let mut p = param();
        p.authorize_url = "not a url".into();
        let c = OAuth2::new(p, Arc::new(MockTransport::new()), Arc::new(MemoryStore::new()));
        let err = c.login_url_for(OAuthGrantType::Code, None, "").unwrap_err();
        assert!(matches!(err, Error::InvalidUrl(_)));
    }

    #[tokio::test]
    async fn missing_client_id_fails_without_network() {
        let transport = Arc::new(MockTransport::new());
        let mut p = param();
        p.client_id = String::new();
        let c = OAuth2::new(p, transport.clone(), Arc::new(MemoryStore::new()));

        let result = c.request_client_credentials_token().await;
        assert!(!result.success);
        assert!(result.error.is_none());
        assert!(result.response.is_null());
        assert_eq!(transport.call_count(), 0);
    }

    #[tokio::test]
    async fn missing_client_secret_fails_without_network() {
        let transport = Arc::new(MockTransport::new());
        let mut p = param();
        p.client_secret = Secret::default();
        let c = OAuth2::new(p, transport.clone(), Arc::new(MemoryStore::new()));

        assert!(!c.request_access_token_by_code_default("code").await.success);
        assert_eq!(transport.call_count(), 0);
    }

    #[tokio::test]
    async fn code_exchange_posts_form_with_credentials() {
        let transport = Arc::new(MockTransport::new().respond(HttpResponse::new(
            200,
            r#"{"access_token":"at","token_type":"bearer","expires_in":3600,"refresh_token":"rt","scope":"read write"}"#,
        )));
        let store = Arc::new(MemoryStore::new());
        let c = client(transport.clone(), store.clone());

        let before = now_millis();
        let result = c.request_access_token_by_code_default("the code").await;
        assert!(result.success);
        assert_eq!(result.response["token_type"], "bearer");

        let token = c.access_token().unwrap();
        assert_eq!(token.token, "at");
        assert_eq!(token.refresh_token, "rt");
        assert_eq!(token.scopes, vec!["read", "write"]);
        assert!(token.expiration_time >= before + 3_600_000);
        assert_eq!(c.token_state(), TokenState::Valid);

        let sent = &transport.requests()[0];
        assert_eq!(sent.method, Method::POST);
        assert_eq!(sent.url, "https://auth.example.com/token");
        assert!(sent.header("Authorization").is_none());
        assert_eq!(
            sent.form_body_pairs(),
            pairs(&[
                ("grant_type", "authorization_code"),
                ("code", "the code"),
                ("redirect_uri", "http://127.0.0.1:8765/callback"),
                ("client_id", "cid"),
                ("client_secret", "csecret"),
            ])
        );

        let persisted = store.get("oauth2_github").unwrap().unwrap();
        assert_eq!(persisted["token"], "at");
        assert_eq!(persisted["refreshToken"], "rt");
    }

    #[tokio::test]
    async fn basic_auth_keeps_credentials_out_of_body() {
        let transport = Arc::new(
            MockTransport::new().respond(HttpResponse::new(200, r#"{"access_token":"at"}"#)),
        );
        let mut p = param();
        p.use_basic_auth_for_access_token = true;
        let c = OAuth2::new(p, transport.clone(), Arc::new(MemoryStore::new()));

        assert!(c.request_client_credentials_token().await.success);
        let sent = &transport.requests()[0];
        // base64("cid:csecret")
        assert_eq!(sent.header("Authorization"), Some("Basic Y2lkOmNzZWNyZXQ="));
        assert_eq!(
            sent.form_body_pairs(),
            pairs(&[("grant_type", "client_credentials")])
        );
    }

    #[tokio::test]
    async fn get_method_sends_query() {
        let transport = Arc::new(
            MockTransport::new().respond(HttpResponse::new(200, r#"{"access_token":"at"}"#)),
        );
        let mut p = param();
        p.access_token_method = Method::GET;
        let c = OAuth2::new(p, transport.clone(), Arc::new(MemoryStore::new()));

        assert!(c.request_client_credentials_token().await.success);
        let sent = &transport.requests()[0];
        assert!(sent.body.is_none());
        assert_eq!(sent.query[0], ("grant_type".to_string(), "client_credentials".to_string()));
    }

    #[tokio::test]
    async fn form_encoded_token_response() {
        let transport = Arc::new(MockTransport::new().respond(HttpResponse::new(
            200,
            "access_token=at&token_type=bearer&scope=repo%2Cgist",
        )));
        let c = client(transport, Arc::new(MemoryStore::new()));

        let result = c.request_client_credentials_token().await;
        assert!(result.success);
        assert_eq!(result.response["access_token"], "at");
        assert_eq!(c.access_token_scopes(), Some(vec!["repo,gist".to_string()]));
    }

    #[tokio::test]
    async fn error_response_is_unsuccessful() {
        let transport = Arc::new(MockTransport::new().respond(HttpResponse {
            status: 400,
            body: br#"{"error":"invalid_grant","error_description":"code expired"}"#.to_vec(),
            error: Some("server returned 400".into()),
        }));
        let c = client(transport, Arc::new(MemoryStore::new()));
        c.set_access_token_string("existing");

        let result = c.request_access_token_by_code("c", "r").await;
        assert!(!result.success);
        assert_eq!(result.error_code(), OAuthErrorCode::InvalidGrant);
        assert_eq!(result.error.unwrap().description, "code expired");
        assert_eq!(c.access_token_key().as_deref(), Some("existing"));
    }

    #[tokio::test]
    async fn transport_failure_is_unsuccessful() {
        let transport = Arc::new(MockTransport::new());
        let c = client(transport.clone(), Arc::new(MemoryStore::new()));
        let result = c.request_client_credentials_token().await;
        assert!(!result.success);
        assert_eq!(transport.call_count(), 1);
        assert!(c.access_token().is_none());
    }

    #[tokio::test]
    async fn refresh_keeps_refresh_token_when_not_rotated() {
        let transport = Arc::new(MockTransport::new().respond(HttpResponse::new(
            200,
            r#"{"access_token":"new","expires_in":60}"#,
        )));
        let c = client(transport.clone(), Arc::new(MemoryStore::new()));

        let result = c
            .request_refresh_token("rt", &["read".to_string(), "write".to_string()])
            .await;
        assert!(result.success);
        let token = c.access_token().unwrap();
        assert_eq!(token.token, "new");
        assert_eq!(token.refresh_token, "rt");

        let body = transport.requests()[0].form_body_pairs();
        assert_eq!(body[0], ("grant_type".to_string(), "refresh_token".to_string()));
        assert_eq!(body[1], ("refresh_token".to_string(), "rt".to_string()));
        assert_eq!(body[2], ("scopes".to_string(), "read write".to_string()));
    }

    #[tokio::test]
    async fn pkce_exchange_sends_verifier() {
        let transport = Arc::new(
            MockTransport::new().respond(HttpResponse::new(200, r#"{"access_token":"at"}"#)),
        );
        let c = client(transport.clone(), Arc::new(MemoryStore::new()));
        let verifier = pkce::generate_verifier();

        let result = c
            .request_access_token_by_code_with_verifier("code", "http://127.0.0.1/cb", &verifier)
            .await;
        assert!(result.success);
        let body = transport.requests()[0].form_body_pairs();
        assert!(body.contains(&("code_verifier".to_string(), verifier)));
    }

    #[test]
    fn bearer_header_only_for_bearer_tokens() {
        let c = idle();

        let mut req = HttpRequest::get("https://api.example.com/me");
        req.add_header("authorization", "stale");
        c.authorize_request_with(&mut req, &OAuth2AccessToken::new("abc"));
        assert_eq!(req.header("Authorization"), Some("Bearer abc"));
        assert_eq!(req.headers.len(), 1);

        let mut req = HttpRequest::get("https://api.example.com/me");
        let token = OAuth2AccessToken {
            token_type: "BEARER".into(),
            ..OAuth2AccessToken::new("abc")
        };
        c.authorize_request_with(&mut req, &token);
        assert_eq!(req.header("Authorization"), Some("Bearer abc"));

        let mut req = HttpRequest::get("https://api.example.com/me");
        let token = OAuth2AccessToken {
            token_type: "mac".into(),
            ..OAuth2AccessToken::new("abc")
        };
        c.authorize_request_with(&mut req, &token);
        assert!(req.header("Authorization").is_none());
    }

    #[test]
    fn authorize_request_without_token_is_noop() {
        let c = idle();
        let mut req = HttpRequest::get("https://api.example.com/me");
        c.authorize_request(&mut req);
        assert!(req.headers.is_empty());

        c.set_access_token_string("abc");
        c.authorize_request(&mut req);
        assert_eq!(req.header("Authorization"), Some("Bearer abc"));
    }

    #[test]
    fn token_survives_reconstruction() {
        let store = Arc::new(MemoryStore::new());
        let token = OAuth2AccessToken {
            token: "at".into(),
            refresh_token: "rt".into(),
            token_type: "bearer".into(),
            scopes: vec!["read".into()],
            expiration_time: now_millis() + 60_000,
            refresh_time: now_millis(),
        };
        client(Arc::new(MockTransport::new()), store.clone()).set_access_token(token.clone());

        let again = client(Arc::new(MockTransport::new()), store.clone());
        assert_eq!(*again.access_token().unwrap(), token);

        again.clear_access_token();
        assert_eq!(again.token_state(), TokenState::NoToken);
        assert!(store.get("oauth2_github").unwrap().is_none());
    }

    #[test]
    fn expired_token_is_restored_as_expired() {
        let store = Arc::new(MemoryStore::new());
        store
            .set(
                "oauth2_github",
                serde_json::json!({"token": "old", "refreshToken": "rt", "expirationTime": 1}),
            )
            .unwrap();
        let c = client(Arc::new(MockTransport::new()), store);
        assert_eq!(c.token_state(), TokenState::Expired);
        assert_eq!(c.access_token().unwrap().refresh_token, "rt");
    }

    #[test]
    fn setting_expired_or_empty_token_clears() {
        let c = idle();
        c.set_access_token_string("abc");
        c.set_access_token(OAuth2AccessToken {
            token: "x".into(),
            expiration_time: 1,
            ..Default::default()
        });
        assert!(c.access_token().is_none());

        c.set_access_token_string("abc");
        c.set_access_token_string("");
        assert!(c.access_token().is_none());
    }

    #[test]
    fn implicit_redirect_yields_usable_token() {
        let c = idle();
        let login = OAuth2LoginResult::from_redirect_url(
            "http://127.0.0.1:8765/callback#access_token=at&token_type=bearer&state=s1",
        );
        assert!(login.success);
        assert_eq!(login.state, "s1");
        c.set_access_token(login.access_token);
        assert_eq!(c.access_token_key().as_deref(), Some("at"));
    }
}
