//! reqwest-backed transport.
//!
//! Redirects are disabled: token endpoints answer directly, and following a
//! redirect with an Authorization header attached would leak credentials.

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use std::str::FromStr;
use tracing::debug;

use crate::request::{HttpRequest, HttpResponse};
use crate::{Error, Result, SendFuture, Transport};

/// Transport that sends requests with a shared `reqwest::Client`.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    /// Build a transport with a fresh client that does not follow redirects.
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| Error::Request(format!("building HTTP client: {e}")))?;
        Ok(Self { client })
    }

    /// Wrap an existing client (shares its connection pool).
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    fn build(&self, request: &HttpRequest) -> Result<reqwest::Request> {
        let mut url = url::Url::parse(&request.url)
            .map_err(|e| Error::InvalidUrl(format!("{}: {e}", request.url)))?;
        if !request.query.is_empty() {
            url.query_pairs_mut().extend_pairs(request.query.iter());
        }

        let mut headers = HeaderMap::new();
        for (name, value) in &request.headers {
            let header_name = HeaderName::from_str(name).map_err(|e| Error::InvalidHeader {
                name: name.clone(),
                reason: e.to_string(),
            })?;
            let header_value = HeaderValue::from_str(value).map_err(|e| Error::InvalidHeader {
                name: name.clone(),
                reason: e.to_string(),
            })?;
            headers.append(header_name, header_value);
        }

        let mut builder = self
            .client
            .request(request.method.clone(), url)
            .headers(headers);
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }
        builder
            .build()
            .map_err(|e| Error::Request(format!("building request: {e}")))
    }

    async fn execute(&self, request: HttpRequest) -> HttpResponse {
        let built = match self.build(&request) {
            Ok(r) => r,
            Err(e) => return HttpResponse::failed(e.to_string()),
        };

        let response = match self.client.execute(built).await {
            Ok(r) => r,
            Err(e) => return HttpResponse::failed(Error::Request(e.to_string()).to_string()),
        };

        let status = response.status();
        let body = match response.bytes().await {
            Ok(b) => b.to_vec(),
            Err(e) => {
                return HttpResponse {
                    status: status.as_u16(),
                    body: Vec::new(),
                    error: Some(format!("reading response body: {e}")),
                };
            }
        };

        debug!(
            method = %request.method,
            url = %request.url,
            status = status.as_u16(),
            bytes = body.len(),
            "request completed"
        );

        let error = if status.is_success() {
            None
        } else {
            Some(format!("server returned {status}"))
        };
        HttpResponse {
            status: status.as_u16(),
            body,
            error,
        }
    }
}

impl Transport for ReqwestTransport {
    fn send(&self, request: HttpRequest) -> SendFuture<'_> {
        Box::pin(self.execute(request))
    }
}
