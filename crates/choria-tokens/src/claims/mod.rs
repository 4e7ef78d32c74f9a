//! Purpose-typed token claims.
//!
//! Every token carries a [`StandardClaims`] envelope naming its [`Purpose`].
//! The purpose decides which extension is present:
//!
//! | Purpose | Wire value | Claims |
//! |---------|------------|--------|
//! | Provisioning | `choria_provisioning` | [`ProvisioningClaims`] |
//! | Client | `choria_client_id` | [`ClientIdClaims`] |
//! | Server | `choria_server` | [`ServerClaims`] |
//!
//! Decoding a token of unknown shape is done in two phases by [`Claims`]: the
//! envelope is read first to learn the purpose, then the remainder is decoded
//! into the matching variant.

mod client;
mod provisioning;
mod server;

pub use client::{ClientIdClaims, ClientIdOptions, ClientPermissions};
pub use provisioning::{ProvisioningClaims, ProvisioningOptions};
pub use server::{ServerClaims, ServerOptions, ServerPermissions};

use crate::error::TokenError;
use crate::keys::PublicKey;
use chrono::{DateTime, Duration, SubsecRound, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::fmt;
use uuid::Uuid;

/// Validity in seconds applied when a constructor is given a zero duration.
pub const DEFAULT_VALIDITY_SECS: i64 = 3600;

/// Issuer recorded when a constructor is given an empty one.
pub const DEFAULT_ISSUER: &str = "Choria";

/// Organization recorded when a constructor is given an empty one.
pub const DEFAULT_ORGANIZATION: &str = "choria";

/// The declared role a token authorizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Purpose {
    Provisioning,
    ClientId,
    Server,
    #[default]
    Unknown,
}

impl Purpose {
    pub fn as_str(&self) -> &'static str {
        match self {
            Purpose::Provisioning => "choria_provisioning",
            Purpose::ClientId => "choria_client_id",
            Purpose::Server => "choria_server",
            Purpose::Unknown => "",
        }
    }
}

impl From<&str> for Purpose {
    fn from(value: &str) -> Self {
        match value {
            "choria_provisioning" => Purpose::Provisioning,
            "choria_client_id" => Purpose::ClientId,
            "choria_server" => Purpose::Server,
            _ => Purpose::Unknown,
        }
    }
}

impl From<String> for Purpose {
    fn from(value: String) -> Self {
        Purpose::from(value.as_str())
    }
}

impl From<Purpose> for String {
    fn from(value: Purpose) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for Purpose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The envelope shared by every token purpose.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StandardClaims {
    /// Identity of the issuer.
    #[serde(rename = "iss", default)]
    pub issuer: String,

    /// Subject, the purpose name for machine tokens.
    #[serde(rename = "sub", default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,

    #[serde(default)]
    pub purpose: Purpose,

    #[serde(rename = "iat", with = "chrono::serde::ts_seconds")]
    pub issued_at: DateTime<Utc>,

    /// Start of validity, `None` when the token is valid from issue.
    #[serde(rename = "nbf", default, skip_serializing_if = "Option::is_none", with = "expiry")]
    pub not_before: Option<DateTime<Utc>>,

    /// Expiry, `None` for tokens that never expire.
    #[serde(rename = "exp", default, skip_serializing_if = "Option::is_none", with = "expiry")]
    pub expires_at: Option<DateTime<Utc>>,

    /// Unique token identifier.
    #[serde(rename = "jti", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

impl StandardClaims {
    /// Create the envelope for a new token.
    ///
    /// A zero `validity` means [`DEFAULT_VALIDITY_SECS`]. When `set_subject` is true
    /// the subject is set to the purpose name.
    pub fn new(
        issuer: impl Into<String>,
        purpose: Purpose,
        validity: Duration,
        set_subject: bool,
    ) -> Result<Self, TokenError> {
        let issuer = issuer.into();
        if issuer.is_empty() {
            return Err(TokenError::InvalidClaims("issuer is required".into()));
        }
        if validity < Duration::zero() {
            return Err(TokenError::InvalidClaims("validity must be positive".into()));
        }

        let validity = if validity.is_zero() {
            Duration::seconds(DEFAULT_VALIDITY_SECS)
        } else {
            validity
        };
        let issued_at = Utc::now().trunc_subsecs(0);

        Ok(Self {
            issuer,
            subject: set_subject.then(|| purpose.to_string()),
            purpose,
            issued_at,
            not_before: None,
            expires_at: Some(issued_at + validity),
            id: Some(Uuid::new_v4().to_string()),
        })
    }

    /// Check the envelope invariants.
    pub fn validate(&self) -> Result<(), TokenError> {
        if self.issuer.is_empty() {
            return Err(TokenError::InvalidClaims("issuer is required".into()));
        }
        if let Some(expires_at) = self.expires_at {
            if expires_at <= self.issued_at {
                return Err(TokenError::InvalidClaims(
                    "expiry must be after the issue time".into(),
                ));
            }
        }
        Ok(())
    }

    fn expect_purpose(&self, purpose: Purpose) -> Result<(), TokenError> {
        if self.purpose != purpose {
            return Err(TokenError::InvalidClaims(format!(
                "purpose {} does not match {} claims",
                self.purpose, purpose
            )));
        }
        Ok(())
    }
}

/// Behaviour shared by all claim sets that can be signed.
pub trait TokenClaims: Serialize {
    /// The shared envelope.
    fn standard(&self) -> &StandardClaims;

    /// Check construction invariants, called before signing.
    fn validate(&self) -> Result<(), TokenError> {
        self.standard().validate()
    }

    fn purpose(&self) -> Purpose {
        self.standard().purpose
    }

    fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.standard().expires_at
    }

    fn is_expired(&self) -> bool {
        self.expires_at().is_some_and(|expires_at| Utc::now() >= expires_at)
    }
}

impl TokenClaims for StandardClaims {
    fn standard(&self) -> &StandardClaims {
        self
    }
}

/// Claims of any purpose, decoded by first reading the envelope's purpose.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Claims {
    Provisioning(ProvisioningClaims),
    ClientId(ClientIdClaims),
    Server(ServerClaims),
    /// A token whose purpose is absent or unrecognized.
    Standard(StandardClaims),
}

impl Claims {
    /// Decode a JSON payload into the variant matching its purpose.
    pub fn from_value(value: Value) -> Result<Self, TokenError> {
        let purpose = value
            .get("purpose")
            .and_then(Value::as_str)
            .map(Purpose::from)
            .unwrap_or_default();

        let claims = match purpose {
            Purpose::Provisioning => serde_json::from_value(value).map(Claims::Provisioning),
            Purpose::ClientId => serde_json::from_value(value).map(Claims::ClientId),
            Purpose::Server => serde_json::from_value(value).map(Claims::Server),
            Purpose::Unknown => serde_json::from_value(value).map(Claims::Standard),
        };

        claims.map_err(|e| TokenError::InvalidToken(format!("could not decode {purpose} claims: {e}")))
    }

    /// The identity used for reply addressing: the caller id or the server identity.
    pub fn identity(&self) -> Option<&str> {
        match self {
            Claims::ClientId(claims) => Some(&claims.caller_id),
            Claims::Server(claims) => Some(&claims.identity),
            Claims::Provisioning(_) | Claims::Standard(_) => None,
        }
    }

    /// The embedded public key, where the purpose carries one.
    pub fn public_key(&self) -> Option<&str> {
        match self {
            Claims::ClientId(claims) => Some(&claims.public_key),
            Claims::Server(claims) => Some(&claims.public_key),
            Claims::Provisioning(_) | Claims::Standard(_) => None,
        }
    }
}

impl<'de> Deserialize<'de> for Claims {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Claims::from_value(value).map_err(serde::de::Error::custom)
    }
}

impl TokenClaims for Claims {
    fn standard(&self) -> &StandardClaims {
        match self {
            Claims::Provisioning(claims) => claims.standard(),
            Claims::ClientId(claims) => claims.standard(),
            Claims::Server(claims) => claims.standard(),
            Claims::Standard(claims) => claims,
        }
    }

    fn validate(&self) -> Result<(), TokenError> {
        match self {
            Claims::Provisioning(claims) => claims.validate(),
            Claims::ClientId(claims) => claims.validate(),
            Claims::Server(claims) => claims.validate(),
            Claims::Standard(claims) => claims.validate(),
        }
    }
}

impl From<ProvisioningClaims> for Claims {
    fn from(claims: ProvisioningClaims) -> Self {
        Claims::Provisioning(claims)
    }
}

impl From<ClientIdClaims> for Claims {
    fn from(claims: ClientIdClaims) -> Self {
        Claims::ClientId(claims)
    }
}

impl From<ServerClaims> for Claims {
    fn from(claims: ServerClaims) -> Self {
        Claims::Server(claims)
    }
}

/// Organization identifiers are non-empty ASCII words, empty means the default.
fn organization(org: &str) -> Result<String, TokenError> {
    if org.is_empty() {
        return Ok(DEFAULT_ORGANIZATION.to_string());
    }

    let valid = org
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if !valid {
        return Err(TokenError::InvalidClaims(format!("invalid organization: {org}")));
    }

    Ok(org.to_string())
}

fn issuer(issuer: &str) -> &str {
    if issuer.is_empty() { DEFAULT_ISSUER } else { issuer }
}

/// Embedded public keys must be Ed25519 keys, stored hex encoded.
fn embedded_public_key(key: Option<&PublicKey>) -> Result<String, TokenError> {
    let key = key.ok_or_else(|| TokenError::InvalidClaims("public key is required".into()))?;
    key.ed25519_hex()
        .ok_or_else(|| TokenError::InvalidClaims("public key must be an ed25519 key".into()))
}

fn require(value: &str, name: &str) -> Result<(), TokenError> {
    if value.is_empty() {
        return Err(TokenError::InvalidClaims(format!("{name} is required")));
    }
    Ok(())
}

/// Optional unix seconds where zero or absent means unset.
mod expiry {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<DateTime<Utc>>, serializer: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(expires_at) => serializer.serialize_i64(expires_at.timestamp()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error> {
        match Option::<i64>::deserialize(deserializer)? {
            None | Some(0) => Ok(None),
            Some(secs) => DateTime::from_timestamp(secs, 0)
                .map(Some)
                .ok_or_else(|| serde::de::Error::custom("expiry out of range")),
        }
    }
}
