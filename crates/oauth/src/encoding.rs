//! Percent-encoding and form-parameter helpers
//!
//! OAuth1 signatures are computed over RFC 3986 percent-encoded strings, so
//! `percent_encode` must match byte-for-byte what the server computes:
//! uppercase hex, unreserved characters left alone, everything else encoded
//! from its UTF-8 bytes. Form-encoded bodies and queries (where `+` means
//! space) go through `url::form_urlencoded` instead.

use std::collections::HashMap;

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use url::form_urlencoded;

/// Everything except the RFC 3986 unreserved set `A-Z a-z 0-9 - . _ ~`.
const RFC3986_RESERVED: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// Percent-encode a string per RFC 3986 (OAuth 1.0a section 3.6).
pub fn percent_encode(input: &str) -> String {
    utf8_percent_encode(input, RFC3986_RESERVED).to_string()
}

/// Decode a query or form string into ordered key-value pairs.
///
/// A single leading `?` or `#` is ignored so callers can pass a raw query
/// or fragment.
pub fn parse_parameters(input: &str) -> Vec<(String, String)> {
    let input = input
        .strip_prefix('?')
        .or_else(|| input.strip_prefix('#'))
        .unwrap_or(input);
    form_urlencoded::parse(input.as_bytes())
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect()
}

/// Collapse pairs into a map; later values win on duplicate keys.
pub fn parameters_to_map(pairs: Vec<(String, String)>) -> HashMap<String, String> {
    pairs.into_iter().collect()
}

/// Form-encode pairs into a query string (no leading `?`).
pub fn serialize_parameters<K, V>(pairs: &[(K, V)]) -> String
where
    K: AsRef<str>,
    V: AsRef<str>,
{
    let mut serializer = form_urlencoded::Serializer::new(String::new());
    for (k, v) in pairs {
        serializer.append_pair(k.as_ref(), v.as_ref());
    }
    serializer.finish()
}

/// Split a URL at the first `?`.
///
/// Returns the URL without its query, and the query when one is present.
/// A `?` at index 0 is not treated as a separator.
pub fn split_url_query(url: &str) -> (&str, Option<&str>) {
    match url.find('?') {
        Some(idx) if idx > 0 => (&url[..idx], Some(&url[idx + 1..])),
        _ => (url, None),
    }
}

/// Insert or replace `key` in an ordered pair list, keeping its position.
pub(crate) fn put_parameter(pairs: &mut Vec<(String, String)>, key: &str, value: String) {
    match pairs.iter_mut().find(|(k, _)| k == key) {
        Some(slot) => slot.1 = value,
        None => pairs.push((key.to_string(), value)),
    }
}
