//! OAuth login command-line host
//!
//! Drives the OAuth library against real providers:
//! 1. Loads client registrations from TOML
//! 2. Runs interactive logins through a loopback redirect listener
//! 3. Runs non-interactive grants (client credentials, refresh)
//! 4. Reports and clears the tokens persisted in the preference file

mod callback;
mod config;
mod error;
mod flow;

use anyhow::{Context, Result, bail};
use oauth::{
    FileStore, OAuth1, OAuth2, OAuth2AccessTokenResult, OAuth2AuthorizationRequestParam,
    OAuthGrantType, PreferenceStore, pkce,
};
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use transport::{ReqwestTransport, Transport};

use crate::callback::CallbackListener;
use crate::config::Config;
use crate::error::Error as ServiceError;
use crate::flow::{EXIT_FAILED, EXIT_OK, LoginAction, LoginEvent, LoginState, handle_event};

const USAGE: &str = "usage: oauth-login [--config <path>] \
    <oauth2-login|oauth2-client-credentials|oauth2-refresh|oauth1-login|status|logout>";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    OAuth2Login,
    OAuth2ClientCredentials,
    OAuth2Refresh,
    OAuth1Login,
    Status,
    Logout,
}

impl Command {
    fn parse(name: &str) -> Option<Self> {
        match name {
            "oauth2-login" => Some(Command::OAuth2Login),
            "oauth2-client-credentials" => Some(Command::OAuth2ClientCredentials),
            "oauth2-refresh" => Some(Command::OAuth2Refresh),
            "oauth1-login" => Some(Command::OAuth1Login),
            "status" => Some(Command::Status),
            "logout" => Some(Command::Logout),
            _ => None,
        }
    }
}

/// Parse `[--config <path>] <command>`; `args[0]` is the program name.
fn parse_args(args: &[String]) -> Result<(Option<String>, Command)> {
    let mut config_path = None;
    let mut command = None;
    let mut iter = args.iter().skip(1);
    while let Some(arg) = iter.next() {
        if arg == "--config" {
            let path = iter.next().context("--config requires a path")?;
            config_path = Some(path.clone());
            continue;
        }
        if command.is_some() {
            bail!("unexpected argument: {arg}\n{USAGE}");
        }
        command = Some(
            Command::parse(arg).with_context(|| format!("unknown command: {arg}\n{USAGE}"))?,
        );
    }
    let command = command.context(USAGE)?;
    Ok((config_path, command))
}

#[tokio::main]
async fn main() -> Result<()> {
    // JSON logs on stderr; stdout carries command output
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_env("LOG_LEVEL")
                .or_else(|_| EnvFilter::try_from_default_env())
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(std::io::stderr),
        )
        .init();

    let args: Vec<String> = std::env::args().collect();
    let (cli_config_path, command) = parse_args(&args)?;

    let config_path = Config::resolve_path(cli_config_path.as_deref());
    info!(path = %config_path.display(), ?command, "loading configuration");
    let config = Config::load(&config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;

    let store: Arc<dyn PreferenceStore> = Arc::new(
        FileStore::open(config.store.path.clone()).with_context(|| {
            format!("failed to open token store {}", config.store.path.display())
        })?,
    );
    let transport: Arc<dyn Transport> =
        Arc::new(ReqwestTransport::new().context("failed to build HTTP client")?);

    let exit_code = match command {
        Command::OAuth2Login => oauth2_login(&config, transport, store).await?,
        Command::OAuth2ClientCredentials => {
            oauth2_client_credentials(&config, transport, store).await?
        }
        Command::OAuth2Refresh => oauth2_refresh(&config, transport, store).await?,
        Command::OAuth1Login => oauth1_login(&config, transport, store).await?,
        Command::Status => {
            print_json(&status(&config, transport, store)?)?;
            EXIT_OK
        }
        Command::Logout => logout(&config, transport, store)?,
    };

    if exit_code != EXIT_OK {
        std::process::exit(exit_code);
    }
    Ok(())
}

/// Runs the login state machine and logs every transition.
struct LoginDriver {
    protocol: &'static str,
    state: LoginState,
}

impl LoginDriver {
    fn new(protocol: &'static str) -> Self {
        Self {
            protocol,
            state: LoginState::NoToken,
        }
    }

    fn step(&mut self, event: LoginEvent) -> LoginAction {
        let state = std::mem::replace(&mut self.state, LoginState::NoToken);
        let (state, action) = handle_event(state, event);
        self.state = state;
        info!(protocol = self.protocol, state = self.state.label(), "login state");
        action
    }

    /// Exit code for a finishing action; anything else is a bug in the caller.
    fn exit_code(&self, action: LoginAction) -> i32 {
        if let LoginState::Failed { reason } = &self.state {
            error!(protocol = self.protocol, reason = %reason, "login failed");
        }
        match action {
            LoginAction::Finish { exit_code } => exit_code,
            other => {
                error!(protocol = self.protocol, action = ?other, "login stopped on unexpected action");
                EXIT_FAILED
            }
        }
    }
}

/// Wait for the redirect, or Ctrl-C, and turn it into a login event.
async fn await_redirect(
    listener: CallbackListener,
    timeout: Duration,
    classify: impl FnOnce(&str) -> LoginEvent,
) -> LoginEvent {
    tokio::select! {
        received = listener.wait(timeout) => match received {
            Ok(url) => classify(&url),
            Err(ServiceError::CallbackTimeout(_)) => LoginEvent::CallbackTimedOut,
            Err(e) => LoginEvent::RedirectRejected(e.to_string()),
        },
        _ = tokio::signal::ctrl_c() => LoginEvent::Interrupted,
    }
}

fn announce(login_url: &str) {
    println!("Open this URL in a browser to authorize:\n\n  {login_url}\n");
}

fn oauth2_client(
    config: &Config,
    transport: Arc<dyn Transport>,
    store: Arc<dyn PreferenceStore>,
) -> Result<OAuth2> {
    let settings = config
        .oauth2
        .as_ref()
        .ok_or(ServiceError::NotConfigured("oauth2"))?;
    Ok(OAuth2::new(settings.to_param()?, transport, store))
}

fn oauth1_client(
    config: &Config,
    transport: Arc<dyn Transport>,
    store: Arc<dyn PreferenceStore>,
) -> Result<OAuth1> {
    let settings = config
        .oauth1
        .as_ref()
        .ok_or(ServiceError::NotConfigured("oauth1"))?;
    Ok(OAuth1::new(settings.to_param()?, transport, store))
}

fn oauth2_failure(result: &OAuth2AccessTokenResult) -> String {
    match &result.error {
        Some(err) => err.to_string(),
        None => "token endpoint returned no usable access token".into(),
    }
}

async fn oauth2_login(
    config: &Config,
    transport: Arc<dyn Transport>,
    store: Arc<dyn PreferenceStore>,
) -> Result<i32> {
    let client = oauth2_client(config, transport, store)?;
    let use_pkce = config.oauth2.as_ref().is_some_and(|s| s.pkce);
    let listener = CallbackListener::bind(client.redirect_uri()).await?;

    let expected_state = uuid::Uuid::new_v4().simple().to_string();
    let verifier = use_pkce.then(pkce::generate_verifier);
    let login_url = client.get_login_url(&OAuth2AuthorizationRequestParam {
        grant_type: OAuthGrantType::Code,
        state: expected_state.clone(),
        code_challenge: verifier.as_deref().map(pkce::compute_challenge),
        ..Default::default()
    });

    let mut driver = LoginDriver::new("oauth2");
    let action = driver.step(match login_url {
        Ok(login_url) => LoginEvent::LoginUrlIssued { login_url },
        Err(e) => LoginEvent::LoginUrlFailed(e.to_string()),
    });
    let LoginAction::AwaitCallback { login_url } = action else {
        return Ok(driver.exit_code(action));
    };
    announce(&login_url);

    let event = await_redirect(listener, config.login.callback_timeout(), |url| {
        flow::oauth2_redirect_event(url, &expected_state)
    })
    .await;
    let action = driver.step(event);
    let LoginAction::ExchangeToken { grant: code } = action else {
        return Ok(driver.exit_code(action));
    };

    let result = match &verifier {
        Some(verifier) => {
            client
                .request_access_token_by_code_with_verifier(&code, client.redirect_uri(), verifier)
                .await
        }
        None => client.request_access_token_by_code_default(&code).await,
    };
    let action = driver.step(if result.success {
        LoginEvent::ExchangeSucceeded
    } else {
        LoginEvent::ExchangeFailed(oauth2_failure(&result))
    });
    let exit_code = driver.exit_code(action);
    if exit_code == EXIT_OK {
        print_json(&oauth2_status(&client))?;
    }
    Ok(exit_code)
}

async fn oauth2_client_credentials(
    config: &Config,
    transport: Arc<dyn Transport>,
    store: Arc<dyn PreferenceStore>,
) -> Result<i32> {
    let client = oauth2_client(config, transport, store)?;
    let result = client.request_client_credentials_token().await;
    if !result.success {
        error!(reason = %oauth2_failure(&result), "client credentials grant failed");
        return Ok(EXIT_FAILED);
    }
    print_json(&oauth2_status(&client))?;
    Ok(EXIT_OK)
}

async fn oauth2_refresh(
    config: &Config,
    transport: Arc<dyn Transport>,
    store: Arc<dyn PreferenceStore>,
) -> Result<i32> {
    let client = oauth2_client(config, transport, store)?;
    let Some(refresh_token) = client
        .access_token()
        .map(|t| t.refresh_token.clone())
        .filter(|t| !t.is_empty())
    else {
        bail!("no refresh token stored; run oauth2-login first");
    };

    let result = client.request_refresh_token(&refresh_token, &[]).await;
    if !result.success {
        error!(reason = %oauth2_failure(&result), "refresh failed");
        return Ok(EXIT_FAILED);
    }
    print_json(&oauth2_status(&client))?;
    Ok(EXIT_OK)
}

async fn oauth1_login(
    config: &Config,
    transport: Arc<dyn Transport>,
    store: Arc<dyn PreferenceStore>,
) -> Result<i32> {
    let client = oauth1_client(config, transport, store)?;
    let listener = CallbackListener::bind(client.callback_url()).await?;
    let login = client.get_default_login_url().await;

    let mut driver = LoginDriver::new("oauth1");
    let action = driver.step(if login.url.is_empty() || login.request_token.is_empty() {
        LoginEvent::LoginUrlFailed("request token endpoint did not issue a token".into())
    } else {
        LoginEvent::LoginUrlIssued {
            login_url: login.url.clone(),
        }
    });
    let LoginAction::AwaitCallback { login_url } = action else {
        return Ok(driver.exit_code(action));
    };
    announce(&login_url);

    let event = await_redirect(listener, config.login.callback_timeout(), |url| {
        flow::oauth1_redirect_event(url, &login.request_token)
    })
    .await;
    let action = driver.step(event);
    let LoginAction::ExchangeToken { grant: verifier } = action else {
        return Ok(driver.exit_code(action));
    };

    let result = client
        .request_access_token(&verifier, &login.request_token, &login.request_token_secret)
        .await;
    let action = driver.step(if result.success {
        LoginEvent::ExchangeSucceeded
    } else {
        LoginEvent::ExchangeFailed(
            result
                .response
                .get("oauth_problem")
                .cloned()
                .unwrap_or_else(|| "access token endpoint returned no token".into()),
        )
    });
    let exit_code = driver.exit_code(action);
    if exit_code == EXIT_OK {
        print_json(&oauth1_status(&client))?;
    }
    Ok(exit_code)
}

fn oauth2_status(client: &OAuth2) -> Value {
    let token = client.access_token();
    json!({
        "state": client.token_state().label(),
        "token_type": token.as_ref().map(|t| t.token_type.clone()),
        "scopes": client.access_token_scopes(),
        "expires_at_ms": token.as_ref().map(|t| t.expiration_time).filter(|t| *t != 0),
        "refreshable": token.as_ref().is_some_and(|t| !t.refresh_token.is_empty()),
    })
}

fn oauth1_status(client: &OAuth1) -> Value {
    json!({ "state": client.token_state().label() })
}

fn status(
    config: &Config,
    transport: Arc<dyn Transport>,
    store: Arc<dyn PreferenceStore>,
) -> Result<Value> {
    let mut report = serde_json::Map::new();
    if let Some(settings) = &config.oauth2 {
        let client = oauth2_client(config, transport.clone(), store.clone())?;
        let mut entry = oauth2_status(&client);
        entry["profile"] = json!(settings.profile);
        report.insert("oauth2".into(), entry);
    }
    if let Some(settings) = &config.oauth1 {
        let client = oauth1_client(config, transport, store)?;
        let mut entry = oauth1_status(&client);
        entry["profile"] = json!(settings.profile);
        report.insert("oauth1".into(), entry);
    }
    Ok(Value::Object(report))
}

fn logout(
    config: &Config,
    transport: Arc<dyn Transport>,
    store: Arc<dyn PreferenceStore>,
) -> Result<i32> {
    if config.oauth2.is_none() && config.oauth1.is_none() {
        bail!("nothing to log out of: no [oauth2] or [oauth1] section configured");
    }
    if config.oauth2.is_some() {
        oauth2_client(config, transport.clone(), store.clone())?.clear_access_token();
        info!("cleared OAuth2 token");
    }
    if config.oauth1.is_some() {
        oauth1_client(config, transport.clone(), store.clone())?.clear_access_token();
        info!("cleared OAuth1 token");
    }
    print_json(&status(config, transport, store)?)?;
    Ok(EXIT_OK)
}

fn print_json(value: &Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
