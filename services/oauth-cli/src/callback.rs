//! Loopback listener for authorization redirects
//!
//! Binds the host and port of the configured redirect URI, accepts exactly
//! one request on its path, and hands the full redirect URL back to the
//! caller for parsing. Only loopback hosts are accepted.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::Router;
use axum::extract::State;
use axum::http::{StatusCode, Uri};
use axum::response::{Html, IntoResponse};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};
use url::{Host, Url};

use crate::error::{Error, Result};

const DONE_PAGE: &str =
    "<html><body><h1>Login received</h1><p>You can close this window.</p></body></html>";

struct CallbackState {
    /// Scheme, host and bound port; the request's path and query are appended
    origin: String,
    path: String,
    redirect_tx: Mutex<Option<oneshot::Sender<String>>>,
}

/// A bound callback listener, serving until a redirect arrives or it is dropped.
pub struct CallbackListener {
    local_addr: SocketAddr,
    redirect_rx: oneshot::Receiver<String>,
    shutdown_tx: Option<oneshot::Sender<()>>,
}

impl CallbackListener {
    /// Bind the host/port of `redirect_uri` and start serving its path.
    ///
    /// Port 0 binds an ephemeral port (see `local_addr`).
    pub async fn bind(redirect_uri: &str) -> Result<Self> {
        let invalid = |reason: &str| Error::InvalidRedirectUri {
            uri: redirect_uri.to_string(),
            reason: reason.to_string(),
        };
        let url = Url::parse(redirect_uri).map_err(|e| invalid(&e.to_string()))?;
        let ip = match url.host() {
            Some(Host::Ipv4(ip)) => IpAddr::V4(ip),
            Some(Host::Ipv6(ip)) => IpAddr::V6(ip),
            Some(Host::Domain("localhost")) => IpAddr::V4(Ipv4Addr::LOCALHOST),
            _ => return Err(invalid("host must be a loopback address")),
        };
        if !ip.is_loopback() {
            return Err(invalid("host must be a loopback address"));
        }
        let port = url
            .port_or_known_default()
            .ok_or_else(|| invalid("no port"))?;

        let addr = SocketAddr::new(ip, port);
        let listener = TcpListener::bind(addr).await.map_err(|e| {
            error!(%addr, error = %e, "failed to bind callback listener");
            Error::CallbackBind {
                addr: addr.to_string(),
                reason: e.to_string(),
            }
        })?;
        let local_addr = listener.local_addr().map_err(|e| Error::CallbackBind {
            addr: addr.to_string(),
            reason: e.to_string(),
        })?;

        let host = url.host_str().unwrap_or("127.0.0.1");
        let (redirect_tx, redirect_rx) = oneshot::channel();
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let state = Arc::new(CallbackState {
            origin: format!("{}://{host}:{}", url.scheme(), local_addr.port()),
            path: url.path().to_string(),
            redirect_tx: Mutex::new(Some(redirect_tx)),
        });

        let app = Router::new().fallback(handle_redirect).with_state(state);
        tokio::spawn(async move {
            let served = axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await;
            if let Err(e) = served {
                error!(error = %e, "callback listener failed");
            }
        });

        info!(addr = %local_addr, path = url.path(), "waiting for authorization redirect");
        Ok(Self {
            local_addr,
            redirect_rx,
            shutdown_tx: Some(shutdown_tx),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Wait for the redirect and return its full URL.
    pub async fn wait(mut self, timeout: Duration) -> Result<String> {
        let received = tokio::time::timeout(timeout, &mut self.redirect_rx).await;
        self.shutdown();
        match received {
            Ok(Ok(url)) => Ok(url),
            Ok(Err(_)) => Err(Error::CallbackClosed),
            Err(_) => {
                warn!(timeout_secs = timeout.as_secs(), "authorization redirect timed out");
                Err(Error::CallbackTimeout(timeout.as_secs()))
            }
        }
    }

    fn shutdown(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

impl Drop for CallbackListener {
    fn drop(&mut self) {
        self.shutdown();
    }
}

async fn handle_redirect(State(state): State<Arc<CallbackState>>, uri: Uri) -> impl IntoResponse {
    if uri.path() != state.path {
        debug!(path = uri.path(), "ignoring request outside the callback path");
        return (StatusCode::NOT_FOUND, Html("Not found")).into_response();
    }

    let path_and_query = uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or_else(|| uri.path());
    let redirect_url = format!("{}{path_and_query}", state.origin);

    let sender = state
        .redirect_tx
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
        .take();
    match sender {
        Some(tx) => {
            let _ = tx.send(redirect_url);
            (StatusCode::OK, Html(DONE_PAGE)).into_response()
        }
        None => (StatusCode::GONE, Html("Login already completed")).into_response(),
    }
}
