//! HTTP transport abstraction for the OAuth clients
//!
//! Defines the request descriptor and response object the OAuth clients build
//! and inspect, and the `Transport` trait that actually moves bytes. The
//! clients never talk to reqwest directly, so tests can substitute a recording
//! transport and hosts can plug in their own HTTP stack.

pub mod request;
pub mod reqwest_transport;

pub use request::{HttpRequest, HttpResponse};
pub use reqwest::Method;
pub use reqwest_transport::ReqwestTransport;

use std::future::Future;
use std::pin::Pin;

/// Errors from building or executing a request.
///
/// These never escape `Transport::send`: implementations fold them into an
/// `HttpResponse` whose `error` field carries the message.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid request URL: {0}")]
    InvalidUrl(String),

    #[error("invalid header {name}: {reason}")]
    InvalidHeader { name: String, reason: String },

    #[error("request failed: {0}")]
    Request(String),
}

/// Result alias for transport operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Boxed future returned by `Transport::send`.
pub type SendFuture<'a> = Pin<Box<dyn Future<Output = HttpResponse> + Send + 'a>>;

/// Sends one request and resolves exactly once with its outcome.
///
/// Network failures are reported through `HttpResponse::error`, never as a
/// panic or a second resolution. Uses a boxed future so the trait stays
/// dyn-compatible (`Arc<dyn Transport>`).
pub trait Transport: Send + Sync {
    fn send(&self, request: HttpRequest) -> SendFuture<'_>;
}
