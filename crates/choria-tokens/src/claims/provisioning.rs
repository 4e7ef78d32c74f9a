//! Claims for provisioning bootstrap tokens.

use super::{Purpose, StandardClaims, TokenClaims, issuer, organization};
use crate::error::TokenError;
use chrono::Duration;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Claims carried by a provisioning token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProvisioningClaims {
    #[serde(flatten)]
    pub standard: StandardClaims,

    /// Whether the provisioning broker connection uses TLS.
    #[serde(rename = "chs", default)]
    pub secure: bool,

    /// Whether nodes should enter provisioning mode by default.
    #[serde(rename = "chpd", default)]
    pub provision_by_default: bool,

    /// Provisioning broker URLs.
    #[serde(rename = "chu", default, skip_serializing_if = "Vec::is_empty")]
    pub urls: Vec<String>,

    /// Domain used to discover the provisioning brokers via SRV records.
    #[serde(rename = "chsrv", default, skip_serializing_if = "Option::is_none")]
    pub srv_domain: Option<String>,

    /// Token presented to the provisioner.
    #[serde(rename = "cht", default)]
    pub token: String,

    #[serde(rename = "chpusr", default, skip_serializing_if = "Option::is_none")]
    pub broker_user: Option<String>,

    #[serde(rename = "chppwd", default, skip_serializing_if = "Option::is_none")]
    pub broker_password: Option<String>,

    /// Subject where registration data is published.
    #[serde(rename = "chrd", default, skip_serializing_if = "Option::is_none")]
    pub registration_data: Option<String>,

    /// File holding facts to publish during provisioning.
    #[serde(rename = "chf", default, skip_serializing_if = "Option::is_none")]
    pub facts: Option<String>,

    #[serde(rename = "ou", default)]
    pub organization: String,

    /// Free-form data for site specific provisioners.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extensions: Option<Map<String, Value>>,
}

/// Inputs for [`ProvisioningClaims::new`].
#[derive(Debug, Clone, Default)]
pub struct ProvisioningOptions {
    pub secure: bool,
    pub provision_by_default: bool,
    pub token: String,
    pub broker_user: Option<String>,
    pub broker_password: Option<String>,
    pub urls: Vec<String>,
    pub srv_domain: Option<String>,
    pub registration_data: Option<String>,
    pub facts: Option<String>,
    pub organization: String,
    pub extensions: Option<Map<String, Value>>,
    /// Empty means [`DEFAULT_ISSUER`](super::DEFAULT_ISSUER).
    pub issuer: String,
    pub validity: Duration,
}

impl ProvisioningClaims {
    pub fn new(options: ProvisioningOptions) -> Result<Self, TokenError> {
        let srv_domain = options.srv_domain.filter(|domain| !domain.is_empty());
        if options.urls.is_empty() && srv_domain.is_none() {
            return Err(TokenError::InvalidClaims("srv domain or urls required".into()));
        }

        let standard = StandardClaims::new(
            issuer(&options.issuer),
            Purpose::Provisioning,
            options.validity,
            true,
        )?;

        Ok(Self {
            standard,
            secure: options.secure,
            provision_by_default: options.provision_by_default,
            urls: options.urls,
            srv_domain,
            token: options.token,
            broker_user: options.broker_user,
            broker_password: options.broker_password,
            registration_data: options.registration_data,
            facts: options.facts,
            organization: organization(&options.organization)?,
            extensions: options.extensions,
        })
    }
}

impl TokenClaims for ProvisioningClaims {
    fn standard(&self) -> &StandardClaims {
        &self.standard
    }

    fn validate(&self) -> Result<(), TokenError> {
        self.standard.validate()?;
        self.standard.expect_purpose(Purpose::Provisioning)?;
        if self.urls.is_empty() && self.srv_domain.is_none() {
            return Err(TokenError::InvalidClaims("srv domain or urls required".into()));
        }
        Ok(())
    }
}
