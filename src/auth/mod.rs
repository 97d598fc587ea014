//! Auth token inspection
//!
//! The reservation service issues JWT auth tokens. The engine never
//! verifies signatures; it only decodes the payload segment to read the
//! `exp` claim so an expired token aborts a task before the first scan.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use chrono::{DateTime, Utc};
use serde_json::Value;

/// Decode a JWT payload without verifying the signature.
///
/// Returns `None` for anything that is not a three-segment token with a
/// base64url JSON payload.
pub fn decode_payload(token: &str) -> Option<Value> {
    let mut parts = token.split('.');
    let (_header, payload) = (parts.next()?, parts.next()?);
    parts.next()?;
    if parts.next().is_some() {
        return None;
    }

    let decoded = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('=')).ok()?;
    serde_json::from_slice(&decoded).ok()
}

/// Check whether a token is structurally valid and unexpired.
///
/// Returns `(is_valid, message)`; the message is suitable for logging
/// either way.
pub fn check_expiry(token: &str) -> (bool, String) {
    let Some(payload) = decode_payload(token) else {
        return (false, "Could not decode token".to_string());
    };

    let Some(exp) = payload.get("exp").and_then(Value::as_i64) else {
        return (false, "Token has no expiry".to_string());
    };

    let Some(exp_date) = DateTime::<Utc>::from_timestamp(exp, 0) else {
        return (false, "Token expiry is out of range".to_string());
    };

    let now = Utc::now();
    if exp_date < now {
        return (
            false,
            format!("Token EXPIRED on {}", exp_date.format("%Y-%m-%d %H:%M:%S UTC")),
        );
    }

    let hours_left = (exp_date - now).num_seconds() as f64 / 3600.0;
    if hours_left < 24.0 {
        (true, format!("Token expires in {hours_left:.1} hours - refresh soon"))
    } else {
        (
            true,
            format!("Token valid until {}", exp_date.format("%Y-%m-%d %H:%M:%S UTC")),
        )
    }
}

/// Hours until the token expires, or `None` if that cannot be determined.
pub fn hours_remaining(token: &str) -> Option<f64> {
    let payload = decode_payload(token)?;
    let exp = payload.get("exp").and_then(Value::as_i64)?;
    let exp_date = DateTime::<Utc>::from_timestamp(exp, 0)?;
    Some((exp_date - Utc::now()).num_seconds() as f64 / 3600.0)
}
