//! Configuration types and loading
//!
//! Config path precedence: `--config` flag > `CONFIG_PATH` env var >
//! `oauth-login.toml`. Client secrets come from `OAUTH2_CLIENT_SECRET` /
//! `OAUTH1_CONSUMER_SECRET` or from a `*_secret_file`, never from the TOML
//! body itself.

use common::Secret;
use oauth::{OAuth1Param, OAuth2Param};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use transport::Method;

pub const OAUTH2_SECRET_ENV: &str = "OAUTH2_CLIENT_SECRET";
pub const OAUTH1_SECRET_ENV: &str = "OAUTH1_CONSUMER_SECRET";

/// Root configuration
#[derive(Debug, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub login: LoginConfig,
    pub oauth2: Option<OAuth2Config>,
    pub oauth1: Option<OAuth1Config>,
}

/// Where tokens are persisted between runs
#[derive(Debug, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_store_path")]
    pub path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
        }
    }
}

/// Interactive login settings
#[derive(Debug, Deserialize)]
pub struct LoginConfig {
    /// How long to wait for the browser redirect
    #[serde(default = "default_callback_timeout")]
    pub callback_timeout_secs: u64,
}

impl Default for LoginConfig {
    fn default() -> Self {
        Self {
            callback_timeout_secs: default_callback_timeout(),
        }
    }
}

impl LoginConfig {
    pub fn callback_timeout(&self) -> Duration {
        Duration::from_secs(self.callback_timeout_secs)
    }
}

/// OAuth 2.0 client registration
#[derive(Debug, Deserialize)]
pub struct OAuth2Config {
    /// Profile name the token is stored under
    #[serde(default = "default_profile")]
    pub profile: String,
    pub client_id: String,
    #[serde(skip)]
    pub client_secret: Option<Secret<String>>,
    #[serde(default)]
    pub client_secret_file: Option<PathBuf>,
    pub authorize_url: String,
    pub token_url: String,
    #[serde(default = "default_method")]
    pub token_method: String,
    #[serde(default)]
    pub use_basic_auth: bool,
    pub redirect_uri: String,
    #[serde(default)]
    pub scopes: Vec<String>,
    /// Send an S256 PKCE challenge with interactive logins
    #[serde(default = "default_true")]
    pub pkce: bool,
}

/// OAuth 1.0a consumer registration
#[derive(Debug, Deserialize)]
pub struct OAuth1Config {
    #[serde(default = "default_profile")]
    pub profile: String,
    pub consumer_key: String,
    #[serde(skip)]
    pub consumer_secret: Option<Secret<String>>,
    #[serde(default)]
    pub consumer_secret_file: Option<PathBuf>,
    pub request_token_url: String,
    /// Authorization page; `{}` is replaced by the request token
    pub authenticate_url: String,
    pub access_token_url: String,
    pub callback_url: String,
    #[serde(default = "default_method")]
    pub token_method: String,
}

fn default_store_path() -> PathBuf {
    PathBuf::from("oauth-tokens.json")
}

fn default_callback_timeout() -> u64 {
    300
}

fn default_profile() -> String {
    "default".into()
}

fn default_method() -> String {
    "POST".into()
}

fn default_true() -> bool {
    true
}

impl Config {
    /// Load configuration from a TOML file, validate it, then resolve secrets.
    pub fn load(path: &Path) -> common::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&contents)?;

        if config.login.callback_timeout_secs == 0 {
            return Err(common::Error::Config(
                "callback_timeout_secs must be greater than 0".into(),
            ));
        }

        if let Some(oauth2) = config.oauth2.as_mut() {
            require_http("oauth2.authorize_url", &oauth2.authorize_url)?;
            require_http("oauth2.token_url", &oauth2.token_url)?;
            require_http("oauth2.redirect_uri", &oauth2.redirect_uri)?;
            parse_method("oauth2.token_method", &oauth2.token_method)?;
            oauth2.client_secret =
                resolve_secret(OAUTH2_SECRET_ENV, oauth2.client_secret_file.as_deref())?;
        }

        if let Some(oauth1) = config.oauth1.as_mut() {
            require_http("oauth1.request_token_url", &oauth1.request_token_url)?;
            require_http("oauth1.authenticate_url", &oauth1.authenticate_url)?;
            require_http("oauth1.access_token_url", &oauth1.access_token_url)?;
            require_http("oauth1.callback_url", &oauth1.callback_url)?;
            parse_method("oauth1.token_method", &oauth1.token_method)?;
            oauth1.consumer_secret =
                resolve_secret(OAUTH1_SECRET_ENV, oauth1.consumer_secret_file.as_deref())?;
        }

        Ok(config)
    }

    /// Resolve config file path from CLI arg or CONFIG_PATH env var.
    pub fn resolve_path(cli_path: Option<&str>) -> PathBuf {
        if let Some(p) = cli_path {
            return PathBuf::from(p);
        }
        if let Ok(p) = std::env::var("CONFIG_PATH") {
            return PathBuf::from(p);
        }
        PathBuf::from("oauth-login.toml")
    }
}

impl OAuth2Config {
    /// Client parameters for this registration.
    ///
    /// A missing secret is passed through as empty; the client then refuses
    /// token requests without contacting the server.
    pub fn to_param(&self) -> common::Result<OAuth2Param> {
        Ok(OAuth2Param {
            preference_name: self.profile.clone(),
            client_id: self.client_id.clone(),
            client_secret: self.client_secret.clone().unwrap_or_default(),
            authorize_url: self.authorize_url.clone(),
            access_token_url: self.token_url.clone(),
            access_token_method: parse_method("oauth2.token_method", &self.token_method)?,
            use_basic_auth_for_access_token: self.use_basic_auth,
            redirect_uri: self.redirect_uri.clone(),
            login_redirect_uri: self.redirect_uri.clone(),
            default_scopes: self.scopes.clone(),
            support_token_grant_type: false,
            ..Default::default()
        })
    }
}

impl OAuth1Config {
    pub fn to_param(&self) -> common::Result<OAuth1Param> {
        let method = parse_method("oauth1.token_method", &self.token_method)?;
        Ok(OAuth1Param {
            preference_name: self.profile.clone(),
            consumer_key: self.consumer_key.clone(),
            consumer_secret: self.consumer_secret.clone().unwrap_or_default(),
            request_token_method: method.clone(),
            request_token_url: self.request_token_url.clone(),
            authenticate_url: self.authenticate_url.clone(),
            access_token_method: method,
            access_token_url: self.access_token_url.clone(),
            callback_url: self.callback_url.clone(),
            ..Default::default()
        })
    }
}

fn require_http(field: &str, value: &str) -> common::Result<()> {
    if value.starts_with("http://") || value.starts_with("https://") {
        Ok(())
    } else {
        Err(common::Error::Config(format!(
            "{field} must start with http:// or https://, got: {value}"
        )))
    }
}

fn parse_method(field: &str, value: &str) -> common::Result<Method> {
    match value.to_ascii_uppercase().as_str() {
        "GET" => Ok(Method::GET),
        "POST" => Ok(Method::POST),
        _ => Err(common::Error::Config(format!(
            "{field} must be GET or POST, got: {value}"
        ))),
    }
}

/// Env var takes precedence over the secret file. Blank secrets count as unset.
fn resolve_secret(env_var: &str, file: Option<&Path>) -> common::Result<Option<Secret<String>>> {
    if let Ok(value) = std::env::var(env_var)
        && !value.trim().is_empty()
    {
        return Ok(Some(Secret::new(value.trim().to_owned())));
    }
    let Some(file) = file else {
        return Ok(None);
    };
    let value = std::fs::read_to_string(file).map_err(|e| common::Error::Secret {
        name: file.display().to_string(),
        reason: e.to_string(),
    })?;
    let value = value.trim().to_owned();
    Ok((!value.is_empty()).then(|| Secret::new(value)))
}
