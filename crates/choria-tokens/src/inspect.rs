//! Reading tokens without verifying them.
//!
//! Nothing returned here is authenticated. These functions exist to pick the
//! right public key or code path before calling [`parse_token`] and must never
//! be used to make a trust decision.
//!
//! [`parse_token`]: crate::token::parse_token

use crate::claims::{Claims, Purpose};
use crate::error::TokenError;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde_json::Value;

/// Claims read from a token whose signature has not been checked.
#[derive(Debug, Clone)]
pub struct Unverified<T> {
    claims: T,
    algorithm: String,
}

impl<T> Unverified<T> {
    /// The untrusted claims.
    pub fn claims(&self) -> &T {
        &self.claims
    }

    /// The algorithm declared in the untrusted header.
    pub fn algorithm(&self) -> &str {
        &self.algorithm
    }
}

/// The declared purpose of `token`, [`Purpose::Unknown`] when it cannot be read.
pub fn token_purpose(token: &str) -> Purpose {
    segment(token, 1)
        .and_then(|payload| payload.get("purpose").and_then(Value::as_str).map(Purpose::from))
        .unwrap_or_default()
}

/// [`token_purpose`] for tokens read straight from a file.
pub fn token_purpose_bytes(token: &[u8]) -> Purpose {
    match std::str::from_utf8(token) {
        Ok(token) => token_purpose(token),
        Err(_) => Purpose::Unknown,
    }
}

/// The declared signing algorithm of `token`, empty when it cannot be read.
pub fn token_signing_algorithm(token: &str) -> String {
    segment(token, 0)
        .and_then(|header| header.get("alg").and_then(Value::as_str).map(str::to_string))
        .unwrap_or_default()
}

/// Decode the header and payload of `token` without checking its signature.
pub fn inspect_token_unverified(token: &str) -> Result<Unverified<Claims>, TokenError> {
    let payload = segment(token, 1)
        .ok_or_else(|| TokenError::InvalidToken("could not decode token payload".into()))?;

    Ok(Unverified {
        claims: Claims::from_value(payload)?,
        algorithm: token_signing_algorithm(token),
    })
}

/// Decode one JSON segment of a three part token.
fn segment(token: &str, index: usize) -> Option<Value> {
    let parts: Vec<&str> = token.trim().split('.').collect();
    if parts.len() != 3 {
        return None;
    }

    let decoded = URL_SAFE_NO_PAD.decode(parts[index].trim_end_matches('=')).ok()?;
    serde_json::from_slice(&decoded).ok()
}
