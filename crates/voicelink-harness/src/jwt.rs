//! Unsigned token minting for tests.

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde_json::json;

/// Mint a structurally valid token whose payload carries the given
/// `exp` and `iat` epoch seconds and a fixed subject. The signature
/// segment is garbage; the client never verifies it.
#[must_use]
pub fn make_token(exp: i64, iat: i64) -> String {
    make_token_for(exp, iat, "42")
}

/// Like [`make_token`], with an explicit subject claim.
#[must_use]
pub fn make_token_for(exp: i64, iat: i64, sub: &str) -> String {
    let header = URL_SAFE_NO_PAD.encode(json!({ "alg": "HS256", "typ": "JWT" }).to_string());
    let payload =
        URL_SAFE_NO_PAD.encode(json!({ "exp": exp, "iat": iat, "sub": sub }).to_string());
    format!("{header}.{payload}.sig")
}
