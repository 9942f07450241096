//! Access-token expiry detection.
//!
//! The access token is a JWT. Its payload is decoded here WITHOUT verifying
//! the signature: the backend is the verifier of record, and the client only
//! uses `exp` to decide whether to refresh before a request would fail.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::Deserialize;
use tracing::debug;

#[derive(Debug, Deserialize)]
struct Claims {
    #[serde(default)]
    exp: Option<f64>,
}

/// Result of decoding a token's payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expiry {
    /// Payload carries an `exp` claim.
    At(DateTime<Utc>),
    /// Payload decoded but has no `exp` claim.
    Never,
    /// Token is not a decodable JWT.
    Unreadable,
}

/// Decode the `exp` claim of a JWT.
pub fn decode_expiry(token: &str) -> Expiry {
    let Some(payload) = token.split('.').nth(1) else {
        return Expiry::Unreadable;
    };

    let bytes = match URL_SAFE_NO_PAD.decode(payload.trim_end_matches('=')) {
        Ok(bytes) => bytes,
        Err(e) => {
            debug!(error = %e, "Access token payload is not base64url");
            return Expiry::Unreadable;
        }
    };

    let claims: Claims = match serde_json::from_slice(&bytes) {
        Ok(claims) => claims,
        Err(e) => {
            debug!(error = %e, "Access token payload is not JSON");
            return Expiry::Unreadable;
        }
    };

    match claims.exp {
        Some(exp) => {
            let millis = (exp * 1000.0) as i64;
            match Utc.timestamp_millis_opt(millis).single() {
                Some(at) => Expiry::At(at),
                None => Expiry::Unreadable,
            }
        }
        None => Expiry::Never,
    }
}

/// True when the token expires within `leeway` of `now`.
/// Unreadable tokens always count as expired, and so does every token once
/// `now + leeway` is past the representable range.
pub fn expires_within(token: &str, now: DateTime<Utc>, leeway: Duration) -> bool {
    match decode_expiry(token) {
        Expiry::At(at) => now.checked_add_signed(leeway).map_or(true, |horizon| at < horizon),
        Expiry::Never => false,
        Expiry::Unreadable => true,
    }
}

pub fn is_expired_at(token: &str, now: DateTime<Utc>) -> bool {
    expires_within(token, now, Duration::zero())
}

pub fn is_expired(token: &str) -> bool {
    is_expired_at(token, Utc::now())
}

/// Build an unsigned JWT-shaped token carrying the given claims. Test helper.
#[cfg(test)]
pub(crate) fn unsigned_token(claims: &serde_json::Value) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"none","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(claims.to_string());
    format!("{header}.{payload}.sig")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_future_exp_is_valid() {
        let now = Utc::now();
        let token = unsigned_token(&json!({ "sub": "u1", "exp": (now + Duration::hours(1)).timestamp() }));
        assert!(!is_expired_at(&token, now));
        assert!(matches!(decode_expiry(&token), Expiry::At(_)));
    }

    #[test]
    fn test_past_exp_is_expired() {
        let now = Utc::now();
        let token = unsigned_token(&json!({ "exp": (now - Duration::seconds(5)).timestamp() }));
        assert!(is_expired_at(&token, now));
    }

    #[test]
    fn test_leeway_triggers_early() {
        let now = Utc::now();
        let token = unsigned_token(&json!({ "exp": (now + Duration::seconds(30)).timestamp() }));
        assert!(!is_expired_at(&token, now));
        assert!(expires_within(&token, now, Duration::seconds(60)));
    }

    #[test]
    fn test_leeway_past_calendar_range_does_not_panic() {
        let now = Utc::now();
        let token = unsigned_token(&json!({ "exp": (now + Duration::hours(1)).timestamp() }));
        assert!(expires_within(&token, now, Duration::days(100_000_000)));

        let timeless = unsigned_token(&json!({ "sub": "u1" }));
        assert!(!expires_within(&timeless, now, Duration::days(100_000_000)));
    }

    #[test]
    fn test_fractional_exp() {
        let token = unsigned_token(&json!({ "exp": 1_700_000_000.5 }));
        let Expiry::At(at) = decode_expiry(&token) else {
            panic!("expected exp");
        };
        assert_eq!(at.timestamp_millis(), 1_700_000_000_500);
    }

    #[test]
    fn test_missing_exp_never_expires() {
        let token = unsigned_token(&json!({ "sub": "u1" }));
        assert_eq!(decode_expiry(&token), Expiry::Never);
        assert!(!is_expired(&token));
    }

    #[test]
    fn test_garbage_is_expired() {
        assert!(is_expired("not-a-jwt"));
        assert!(is_expired("a.%%%.c"));
        assert!(is_expired(&format!("a.{}.c", URL_SAFE_NO_PAD.encode("not json"))));
        assert!(is_expired(""));
    }

    #[test]
    fn test_padded_payload_accepted() {
        let payload = base64::engine::general_purpose::URL_SAFE.encode(r#"{"exp": 4102444800}"#);
        assert!(payload.ends_with('='));
        let token = format!("h.{payload}.s");
        assert!(!is_expired(&token));
    }
}
