//! Claims for client identity tokens.

use super::{Purpose, StandardClaims, TokenClaims, embedded_public_key, issuer, organization, require};
use crate::error::TokenError;
use crate::keys::PublicKey;
use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Additional fleet access a client may hold.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientPermissions {
    /// Access to the stream administration API.
    pub streams_admin: bool,
    /// Access to read from streams.
    pub streams_user: bool,
    /// Access to lifecycle and other events.
    pub events_viewer: bool,
    /// Access to leader elections.
    pub election_user: bool,
    /// Access to the broker system account.
    pub system_user: bool,
    /// Administrative rights within the organization.
    pub org_admin: bool,
    /// Access to RPC requests against the fleet.
    pub fleet_management: bool,
    /// Fleet requests must be signed by an authorizer.
    pub signed_fleet_management: bool,
    /// May sign requests on behalf of other clients.
    pub authentication_delegator: bool,
    /// May host services.
    pub service_host: bool,
}

/// Claims carried by a client identity token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientIdClaims {
    #[serde(flatten)]
    pub standard: StandardClaims,

    /// The caller identity, for example `up=ginkgo`.
    #[serde(rename = "callerid")]
    pub caller_id: String,

    /// Agents the caller may invoke, empty for no restriction.
    #[serde(rename = "agents", default, skip_serializing_if = "Vec::is_empty")]
    pub allowed_agents: Vec<String>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub user_properties: BTreeMap<String, String>,

    /// Open Policy Agent policy applied to requests.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub opa_policy: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub permissions: Option<ClientPermissions>,

    #[serde(rename = "ou", default)]
    pub organization: String,

    /// Hex encoded Ed25519 public key of the client.
    pub public_key: String,
}

/// Inputs for [`ClientIdClaims::new`].
#[derive(Debug, Clone, Default)]
pub struct ClientIdOptions {
    pub caller_id: String,
    pub allowed_agents: Vec<String>,
    pub organization: String,
    pub user_properties: BTreeMap<String, String>,
    pub opa_policy: Option<String>,
    /// Empty means [`DEFAULT_ISSUER`](super::DEFAULT_ISSUER).
    pub issuer: String,
    pub validity: Duration,
    pub permissions: Option<ClientPermissions>,
    pub public_key: Option<PublicKey>,
}

impl ClientIdClaims {
    pub fn new(options: ClientIdOptions) -> Result<Self, TokenError> {
        require(&options.caller_id, "caller id")?;
        let public_key = embedded_public_key(options.public_key.as_ref())?;
        let organization = organization(&options.organization)?;

        let mut standard = StandardClaims::new(
            issuer(&options.issuer),
            Purpose::ClientId,
            options.validity,
            false,
        )?;
        standard.subject = Some(options.caller_id.clone());

        Ok(Self {
            standard,
            caller_id: options.caller_id,
            allowed_agents: options.allowed_agents,
            user_properties: options.user_properties,
            opa_policy: options.opa_policy.filter(|policy| !policy.is_empty()),
            permissions: options.permissions,
            organization,
            public_key,
        })
    }

    /// The embedded public key.
    pub fn public_key(&self) -> Result<PublicKey, TokenError> {
        PublicKey::from_ed25519_hex(&self.public_key)
    }
}

impl TokenClaims for ClientIdClaims {
    fn standard(&self) -> &StandardClaims {
        &self.standard
    }

    fn validate(&self) -> Result<(), TokenError> {
        self.standard.validate()?;
        self.standard.expect_purpose(Purpose::ClientId)?;
        require(&self.caller_id, "caller id")?;
        require(&self.public_key, "public key")?;
        Ok(())
    }
}
