//! Claims for fleet server tokens.

use super::{Purpose, StandardClaims, TokenClaims, embedded_public_key, issuer, organization, require};
use crate::error::TokenError;
use crate::keys::PublicKey;
use chrono::Duration;
use serde::{Deserialize, Serialize};

/// Additional access a server may hold.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerPermissions {
    /// May publish to the submission system.
    pub submission: bool,
    /// May access streams.
    pub streams: bool,
    /// May use governors.
    pub governor: bool,
    /// May host services.
    pub service_host: bool,
}

/// Claims carried by a server token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerClaims {
    #[serde(flatten)]
    pub standard: StandardClaims,

    /// Fully qualified identity of the node.
    pub identity: String,

    /// Collectives the server belongs to, never empty.
    pub collectives: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub permissions: Option<ServerPermissions>,

    /// Subjects the server may publish to beyond its defaults.
    #[serde(rename = "pub_subjects", default, skip_serializing_if = "Vec::is_empty")]
    pub additional_publish_subjects: Vec<String>,

    #[serde(rename = "ou", default)]
    pub organization: String,

    /// Hex encoded Ed25519 public key of the server.
    pub public_key: String,
}

/// Inputs for [`ServerClaims::new`].
#[derive(Debug, Clone, Default)]
pub struct ServerOptions {
    pub identity: String,
    pub collectives: Vec<String>,
    pub organization: String,
    pub permissions: Option<ServerPermissions>,
    pub additional_publish_subjects: Vec<String>,
    pub public_key: Option<PublicKey>,
    /// Issuer of record, empty means [`DEFAULT_ISSUER`](super::DEFAULT_ISSUER).
    pub issuer: String,
    pub validity: Duration,
}

impl ServerClaims {
    pub fn new(options: ServerOptions) -> Result<Self, TokenError> {
        require(&options.identity, "identity")?;
        if options.collectives.is_empty() {
            return Err(TokenError::InvalidClaims("at least one collective is required".into()));
        }
        let public_key = embedded_public_key(options.public_key.as_ref())?;
        let organization = organization(&options.organization)?;

        let standard = StandardClaims::new(
            issuer(&options.issuer),
            Purpose::Server,
            options.validity,
            true,
        )?;

        Ok(Self {
            standard,
            identity: options.identity,
            collectives: options.collectives,
            permissions: options.permissions,
            additional_publish_subjects: options.additional_publish_subjects,
            organization,
            public_key,
        })
    }

    /// The embedded public key.
    pub fn public_key(&self) -> Result<PublicKey, TokenError> {
        PublicKey::from_ed25519_hex(&self.public_key)
    }
}

impl TokenClaims for ServerClaims {
    fn standard(&self) -> &StandardClaims {
        &self.standard
    }

    fn validate(&self) -> Result<(), TokenError> {
        self.standard.validate()?;
        self.standard.expect_purpose(Purpose::Server)?;
        require(&self.identity, "identity")?;
        require(&self.public_key, "public key")?;
        if self.collectives.is_empty() {
            return Err(TokenError::InvalidClaims("at least one collective is required".into()));
        }
        Ok(())
    }
}
