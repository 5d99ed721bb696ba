//! Request descriptor and response object

use reqwest::Method;
use url::form_urlencoded;

/// Content type used for form-encoded bodies.
pub const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// Content type prefix for multipart bodies (never folded into signatures).
pub const MULTIPART_CONTENT_TYPE: &str = "multipart/form-data";

/// An outgoing HTTP request.
///
/// `headers` is an ordered multi-map: `add_header` appends, `put_header`
/// replaces every existing value of that name. `query` pairs are appended to
/// `url` by the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub query: Vec<(String, String)>,
    pub body: Option<Vec<u8>>,
}

impl HttpRequest {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: Vec::new(),
            query: Vec::new(),
            body: None,
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::GET, url)
    }

    pub fn post(url: impl Into<String>) -> Self {
        Self::new(Method::POST, url)
    }

    /// First value of a header, compared case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Append a header, keeping any existing values of the same name.
    pub fn add_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.headers.push((name.into(), value.into()));
    }

    /// Set a header, removing any existing values of the same name.
    pub fn put_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        self.headers.retain(|(n, _)| !n.eq_ignore_ascii_case(&name));
        self.headers.push((name, value.into()));
    }

    /// Append a query parameter.
    pub fn add_query(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.query.push((key.into(), value.into()));
    }

    /// Replace the body with a form-encoded serialization of `pairs`.
    pub fn set_body_form<K, V>(&mut self, pairs: &[(K, V)])
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut serializer = form_urlencoded::Serializer::new(String::new());
        for (k, v) in pairs {
            serializer.append_pair(k.as_ref(), v.as_ref());
        }
        self.set_body_string(serializer.finish(), FORM_CONTENT_TYPE);
    }

    /// Replace the body with a raw string and set its content type.
    pub fn set_body_string(&mut self, body: impl Into<String>, content_type: &str) {
        self.body = Some(body.into().into_bytes());
        self.put_header("Content-Type", content_type);
    }

    /// Media type of the body with any parameters (`; charset=...`) removed.
    pub fn content_type(&self) -> Option<&str> {
        self.header("Content-Type")
            .map(|v| v.split(';').next().unwrap_or_default().trim())
    }

    /// Decode the body as form pairs.
    ///
    /// Returns an empty list when there is no body. Multipart bodies are not
    /// form pairs and also yield an empty list.
    pub fn form_body_pairs(&self) -> Vec<(String, String)> {
        let is_multipart = self
            .content_type()
            .is_some_and(|t| t.eq_ignore_ascii_case(MULTIPART_CONTENT_TYPE));
        match &self.body {
            Some(body) if !is_multipart => form_urlencoded::parse(body)
                .map(|(k, v)| (k.into_owned(), v.into_owned()))
                .collect(),
            _ => Vec::new(),
        }
    }
}

/// Outcome of a sent request.
///
/// `status` is 0 when no response was received. `error` carries the
/// transport's message for connection failures and non-2xx statuses; the
/// body is kept in both cases so callers can log or parse it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Vec<u8>,
    pub error: Option<String>,
}

impl HttpResponse {
    /// A response with the given status and body and no transport error.
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: body.into(),
            error: None,
        }
    }

    /// A failed exchange where no response arrived.
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            status: 0,
            body: Vec::new(),
            error: Some(message.into()),
        }
    }

    /// True on transport failure or any non-2xx status.
    pub fn is_error(&self) -> bool {
        self.error.is_some() || !(200..300).contains(&self.status)
    }

    pub fn last_error_message(&self) -> &str {
        self.error.as_deref().unwrap_or_default()
    }

    /// Body as UTF-8, replacing invalid sequences.
    pub fn body_as_string(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Body parsed as JSON, or `Value::Null` when it is not JSON.
    pub fn body_as_json(&self) -> serde_json::Value {
        serde_json::from_slice(&self.body).unwrap_or(serde_json::Value::Null)
    }
}
