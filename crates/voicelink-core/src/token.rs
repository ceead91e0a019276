//! Access token claim decoding.
//!
//! The client treats the access token as an opaque credential issued by the
//! backend, except for the claim segment, which it decodes (without
//! signature verification) to learn the expiry and issue timestamps that
//! drive the silent-refresh policy. Expiry is always derived from the token
//! payload, never invented client-side.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde_json::Value;

use crate::error::TokenDecodeError;

/// Claims extracted from an access token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenClaims {
    /// Expiry, seconds since the Unix epoch.
    pub exp: i64,
    /// Issue time, seconds since the Unix epoch.
    pub iat: i64,
    /// Subject (user id), when present. The backend issues numeric ids, so
    /// both string and number encodings are accepted.
    pub sub: Option<String>,
}

/// Decode the claim segment of an access token.
///
/// A well-formed token is three dot-separated base64url segments whose
/// middle segment decodes to a JSON object with numeric `exp` and `iat`
/// claims.
///
/// # Errors
///
/// Returns [`TokenDecodeError`] if the token violates that structure.
pub fn decode_claims(token: &str) -> Result<TokenClaims, TokenDecodeError> {
    let mut segments = token.split('.');
    let (Some(_header), Some(claims), Some(_signature), None) =
        (segments.next(), segments.next(), segments.next(), segments.next())
    else {
        return Err(TokenDecodeError::Malformed);
    };
    if claims.is_empty() {
        return Err(TokenDecodeError::Malformed);
    }

    let decoded = URL_SAFE_NO_PAD.decode(claims)?;
    let value: Value = serde_json::from_slice(&decoded)?;

    let numeric = |name: &'static str| {
        value.get(name).and_then(Value::as_i64).ok_or(TokenDecodeError::MissingClaim(name))
    };
    let exp = numeric("exp")?;
    let iat = numeric("iat")?;

    let sub = value.get("sub").and_then(|v| match v {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    });

    Ok(TokenClaims { exp, iat, sub })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(value: &Value) -> String {
        URL_SAFE_NO_PAD.encode(value.to_string())
    }

    fn token(claims: &Value) -> String {
        let header = encode(&serde_json::json!({ "alg": "HS256", "typ": "JWT" }));
        format!("{header}.{}.sig", encode(claims))
    }

    #[test]
    fn decodes_numeric_claims() {
        let claims =
            decode_claims(&token(&serde_json::json!({ "exp": 1700000600, "iat": 1700000000 })))
                .unwrap();
        assert_eq!(claims.exp, 1_700_000_600);
        assert_eq!(claims.iat, 1_700_000_000);
        assert_eq!(claims.sub, None);
    }

    #[test]
    fn accepts_string_or_numeric_subject() {
        let with_string = decode_claims(&token(
            &serde_json::json!({ "exp": 10, "iat": 1, "sub": "42" }),
        ))
        .unwrap();
        assert_eq!(with_string.sub.as_deref(), Some("42"));

        let with_number =
            decode_claims(&token(&serde_json::json!({ "exp": 10, "iat": 1, "sub": 42 }))).unwrap();
        assert_eq!(with_number.sub.as_deref(), Some("42"));
    }

    #[test]
    fn rejects_wrong_segment_count() {
        assert!(matches!(decode_claims("just-one-segment"), Err(TokenDecodeError::Malformed)));
        assert!(matches!(decode_claims("a.b"), Err(TokenDecodeError::Malformed)));
        assert!(matches!(decode_claims("a.b.c.d"), Err(TokenDecodeError::Malformed)));
    }

    #[test]
    fn rejects_invalid_base64() {
        assert!(matches!(decode_claims("a.!!!.c"), Err(TokenDecodeError::Base64(_))));
    }

    #[test]
    fn rejects_non_json_claims() {
        let garbage = URL_SAFE_NO_PAD.encode("not json");
        assert!(matches!(decode_claims(&format!("a.{garbage}.c")), Err(TokenDecodeError::Json(_))));
    }

    #[test]
    fn rejects_missing_or_non_numeric_expiry() {
        let err = decode_claims(&token(&serde_json::json!({ "iat": 1 }))).unwrap_err();
        assert!(matches!(err, TokenDecodeError::MissingClaim("exp")));

        let err =
            decode_claims(&token(&serde_json::json!({ "exp": "soon", "iat": 1 }))).unwrap_err();
        assert!(matches!(err, TokenDecodeError::MissingClaim("exp")));

        let err = decode_claims(&token(&serde_json::json!({ "exp": 10 }))).unwrap_err();
        assert!(matches!(err, TokenDecodeError::MissingClaim("iat")));
    }
}
