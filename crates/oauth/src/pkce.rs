//! PKCE (Proof Key for Code Exchange) per RFC 7636
//!
//! The verifier stays with the client and is sent with the authorization
//! code; the S256 challenge goes into the login URL. Used through
//! `OAuth2AuthorizationRequestParam::code_challenge` and
//! `OAuth2::request_access_token_by_code_with_verifier`.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::RngExt;
use sha2::{Digest, Sha256};

/// Generate a random code verifier.
///
/// 64 random bytes as URL-safe base64 without padding: 86 characters,
/// inside the 43-128 range RFC 7636 allows.
pub fn generate_verifier() -> String {
    let mut bytes = [0u8; 64];
    rand::rng().fill(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// `BASE64URL(SHA256(verifier))`
pub fn compute_challenge(verifier: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
}
