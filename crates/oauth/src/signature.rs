//! OAuth 1.0a HMAC-SHA1 request signing (RFC 5849 section 3.4)
//!
//! Servers recompute the signature from the same inputs, so every step here
//! has to match byte-for-byte: parameter collection, encoding, sort order,
//! base string layout and signing key.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use hmac::{Hmac, Mac};
use sha1::Sha1;

use crate::constants::{OAUTH_PARAM_PREFIX, OAUTH_VERSION, SIGNATURE_METHOD};
use crate::encoding::{parse_parameters, percent_encode, split_url_query};

type HmacSha1 = Hmac<Sha1>;

/// Inputs for one signature.
///
/// `token`, `token_secret` and `callback_url` may be empty; empty values are
/// left out of the signed parameters (the secret still contributes the
/// trailing `&` of the signing key).
#[derive(Debug, Clone, Copy)]
pub struct SignatureParams<'a> {
    pub method: &'a str,
    pub url: &'a str,
    pub parameters: &'a [(String, String)],
    pub nonce: &'a str,
    pub timestamp: u64,
    pub token: &'a str,
    pub token_secret: &'a str,
    pub callback_url: &'a str,
}

/// Collect and sort the encoded parameter set.
///
/// Sources: the URL's own query, `params.parameters`, and the protocol
/// fields. Sorted by (encoded key, encoded value); duplicates are kept.
pub fn collect_parameters(consumer_key: &str, params: &SignatureParams<'_>) -> Vec<(String, String)> {
    let (_, query) = split_url_query(params.url);
    let mut collected: Vec<(String, String)> = query
        .map(parse_parameters)
        .unwrap_or_default()
        .iter()
        .chain(params.parameters.iter())
        .map(|(k, v)| (percent_encode(k), percent_encode(v)))
        .collect();

    let timestamp = params.timestamp.to_string();
    let mut protocol = vec![
        ("oauth_consumer_key", consumer_key),
        ("oauth_nonce", params.nonce),
        ("oauth_signature_method", SIGNATURE_METHOD),
        ("oauth_timestamp", timestamp.as_str()),
        ("oauth_version", OAUTH_VERSION),
    ];
    if !params.token.is_empty() {
        protocol.push(("oauth_token", params.token));
    }
    if !params.callback_url.is_empty() {
        protocol.push(("oauth_callback", params.callback_url));
    }
    collected.extend(
        protocol
            .into_iter()
            .map(|(k, v)| (k.to_string(), percent_encode(v))),
    );

    collected.sort();
    collected
}

/// `METHOD & encode(base URL) & encode(k=v&k=v...)`
pub fn signature_base_string(method: &str, url: &str, sorted: &[(String, String)]) -> String {
    let (base_url, _) = split_url_query(url);
    let joined = sorted
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&");
    format!(
        "{}&{}&{}",
        method.to_ascii_uppercase(),
        percent_encode(base_url),
        percent_encode(&joined)
    )
}

/// HMAC-SHA1 over the base string, Base64 then percent-encoded.
pub fn sign(base_string: &str, consumer_secret: &str, token_secret: &str) -> String {
    let key = format!(
        "{}&{}",
        percent_encode(consumer_secret),
        percent_encode(token_secret)
    );
    // Hmac accepts keys of any length; the error arm is unreachable.
    let Ok(mut mac) = HmacSha1::new_from_slice(key.as_bytes()) else {
        return String::new();
    };
    mac.update(base_string.as_bytes());
    percent_encode(&STANDARD.encode(mac.finalize().into_bytes()))
}

/// `OAuth k="v", k="v"` over the `oauth_` parameters, in sorted order.
pub fn authorization_header(sorted: &[(String, String)]) -> String {
    let fields = sorted
        .iter()
        .filter(|(k, _)| k.starts_with(OAUTH_PARAM_PREFIX))
        .map(|(k, v)| format!("{k}=\"{v}\""))
        .collect::<Vec<_>>()
        .join(", ");
    format!("OAuth {fields}")
}

/// Full header value: collect, sign, then insert `oauth_signature` in order.
pub fn generate_authorization_header(
    consumer_key: &str,
    consumer_secret: &str,
    params: &SignatureParams<'_>,
) -> String {
    let mut sorted = collect_parameters(consumer_key, params);
    let base = signature_base_string(params.method, params.url, &sorted);
    let signature = sign(&base, consumer_secret, params.token_secret);

    let entry = ("oauth_signature".to_string(), signature);
    let pos = sorted.partition_point(|p| p < &entry);
    sorted.insert(pos, entry);
    authorization_header(&sorted)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn example_params<'a>(parameters: &'a [(String, String)]) -> SignatureParams<'a> {
        SignatureParams {
            method: "GET",
            url: "https://api.example.com/resource?a=1",
            parameters,
            nonce: "abc",
            timestamp: 1000,
            token: "",
            token_secret: "",
            callback_url: "",
        }
    }

    #[test]
    fn base_string_matches_known_value() {
        let params = example_params(&[]);
        let sorted = collect_parameters("ck", &params);
        assert_eq!(
            signature_base_string(params.method, params.url, &sorted),
            "GET&https%3A%2F%2Fapi.example.com%2Fresource&a%3D1%26oauth_consumer_key%3Dck%26oauth_nonce%3Dabc%26oauth_signature_method%3DHMAC-SHA1%26oauth_timestamp%3D1000%26oauth_version%3D1.0"
        );
    }

    #[test]
    fn header_is_deterministic() {
        let extra = vec![("status".to_string(), "hello world".to_string())];
        let params = example_params(&extra);
        let a = generate_authorization_header("ck", "cs", &params);
        let b = generate_authorization_header("ck", "cs", &params);
        assert_eq!(a, b);
    }

    // OAuth Core 1.0 Appendix A.5: photos.example.net
    #[test]
    fn signature_matches_reference_example() {
        let params = SignatureParams {
            method: "GET",
            url: "http://photos.example.net/photos?file=vacation.jpg&size=original",
            parameters: &[],
            nonce: "kllo9940pd9333jh",
            timestamp: 1191242096,
            token: "nnch734d00sl2jdk",
            token_secret: "pfkkdhi9sl3r4s00",
            callback_url: "",
        };
        let sorted = collect_parameters("dpf43f3p2l4k3l03", &params);
        let base = signature_base_string(params.method, params.url, &sorted);
        assert_eq!(
            base,
            "GET&http%3A%2F%2Fphotos.example.net%2Fphotos&file%3Dvacation.jpg%26oauth_consumer_key%3Ddpf43f3p2l4k3l03%26oauth_nonce%3Dkllo9940pd9333jh%26oauth_signature_method%3DHMAC-SHA1%26oauth_timestamp%3D1191242096%26oauth_token%3Dnnch734d00sl2jdk%26oauth_version%3D1.0%26size%3Doriginal"
        );
        assert_eq!(
            sign(&base, "kd94hf93k423kf44", "pfkkdhi9sl3r4s00"),
            "tR3%2BTy81lMeYAr%2FFid0kMTYa%2FWM%3D"
        );
    }

    #[test]
    fn header_lists_only_oauth_params_in_sorted_order() {
        let extra = vec![("zeta".to_string(), "1".to_string())];
        let mut params = example_params(&extra);
        params.token = "tok";
        params.callback_url = "https://app.example.com/cb";
        let header = generate_authorization_header("ck", "cs", &params);

        assert!(header.starts_with("OAuth oauth_callback=\"https%3A%2F%2Fapp.example.com%2Fcb\", "));
        assert!(!header.contains("zeta"));
        assert!(!header.contains("a=\"1\""));

        let keys: Vec<&str> = header
            .trim_start_matches("OAuth ")
            .split(", ")
            .map(|kv| kv.split('=').next().unwrap())
            .collect();
        assert_eq!(
            keys,
            vec![
                "oauth_callback",
                "oauth_consumer_key",
                "oauth_nonce",
                "oauth_signature",
                "oauth_signature_method",
                "oauth_timestamp",
                "oauth_token",
                "oauth_version",
            ]
        );
    }

    #[test]
    fn signing_key_encodes_both_secrets() {
        let base = "GET&x&y";
        let expected = {
            let mut mac = HmacSha1::new_from_slice(b"c%26s&t%20s").unwrap();
            mac.update(base.as_bytes());
            percent_encode(&STANDARD.encode(mac.finalize().into_bytes()))
        };
        assert_eq!(sign(base, "c&s", "t s"), expected);
    }

    #[test]
    fn duplicate_parameters_sort_by_value() {
        let extra = vec![
            ("k".to_string(), "2".to_string()),
            ("k".to_string(), "1".to_string()),
        ];
        let params = example_params(&extra);
        let sorted = collect_parameters("ck", &params);
        let ks: Vec<_> = sorted.iter().filter(|(k, _)| k == "k").map(|(_, v)| v.as_str()).collect();
        assert_eq!(ks, vec!["1", "2"]);
    }
}
