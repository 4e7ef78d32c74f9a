//! Token issuing configuration.

use crate::claims::{DEFAULT_ISSUER, DEFAULT_ORGANIZATION};
use crate::keys::{KeyPair, PublicKey};
use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Error type for configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Token(#[from] crate::error::TokenError),
}

/// Where keys come from and what new tokens default to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenConfig {
    /// Path to a hex seed or RSA PEM used to sign tokens.
    #[serde(default)]
    pub signing_key_file: Option<PathBuf>,

    /// Environment variable naming the signing key file.
    #[serde(default)]
    pub signing_key_env: Option<String>,

    /// Path to a hex Ed25519 public key or RSA PEM used to verify tokens.
    #[serde(default)]
    pub public_key_file: Option<PathBuf>,

    /// Environment variable naming the public key file.
    #[serde(default)]
    pub public_key_env: Option<String>,

    #[serde(default = "default_issuer")]
    pub issuer: String,

    #[serde(default = "default_organization")]
    pub organization: String,

    /// Validity of new tokens (e.g., "30d", "24h").
    #[serde(default = "default_validity")]
    pub validity: String,

    /// Permission bits for saved tokens.
    #[serde(default = "default_token_file_mode")]
    pub token_file_mode: u32,
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            signing_key_file: None,
            signing_key_env: None,
            public_key_file: None,
            public_key_env: None,
            issuer: default_issuer(),
            organization: default_organization(),
            validity: default_validity(),
            token_file_mode: default_token_file_mode(),
        }
    }
}

impl TokenConfig {
    /// Load configuration from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path.as_ref())?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from YAML content.
    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        serde_yaml::from_str(content).map_err(ConfigError::from)
    }

    /// Parsed [`TokenConfig::validity`].
    pub fn validity(&self) -> Result<Duration, ConfigError> {
        parse_duration(&self.validity)
    }

    /// Resolve the signing key path from the environment or the configured file.
    pub fn signing_key_path(&self) -> Option<PathBuf> {
        resolve_path(self.signing_key_env.as_deref(), self.signing_key_file.as_ref())
    }

    /// Resolve the public key path from the environment or the configured file.
    pub fn public_key_path(&self) -> Option<PathBuf> {
        resolve_path(self.public_key_env.as_deref(), self.public_key_file.as_ref())
    }

    /// Load the signing key, `None` when none is configured.
    pub fn resolve_signing_key(&self) -> Result<Option<KeyPair>, ConfigError> {
        match self.signing_key_path() {
            Some(path) => Ok(Some(KeyPair::from_file(path)?)),
            None => Ok(None),
        }
    }

    /// Load the public key, `None` when none is configured.
    pub fn resolve_public_key(&self) -> Result<Option<PublicKey>, ConfigError> {
        match self.public_key_path() {
            Some(path) => Ok(Some(PublicKey::from_file(path)?)),
            None => Ok(None),
        }
    }
}

fn resolve_path(env_var: Option<&str>, file: Option<&PathBuf>) -> Option<PathBuf> {
    // Try environment variable first
    if let Some(path) = env_var.and_then(|name| std::env::var_os(name)) {
        if !path.is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    file.cloned()
}

/// Parse a duration string like "24h", "7d", "30m" or "60s", bare numbers are hours.
pub fn parse_duration(s: &str) -> Result<Duration, ConfigError> {
    let s = s.trim().to_lowercase();
    let invalid = |_: std::num::ParseIntError| ConfigError::Config(format!("invalid duration: {s}"));

    if let Some(days) = s.strip_suffix('d') {
        return Ok(Duration::days(days.parse().map_err(invalid)?));
    }
    if let Some(hours) = s.strip_suffix('h') {
        return Ok(Duration::hours(hours.parse().map_err(invalid)?));
    }
    if let Some(minutes) = s.strip_suffix('m') {
        return Ok(Duration::minutes(minutes.parse().map_err(invalid)?));
    }
    if let Some(seconds) = s.strip_suffix('s') {
        return Ok(Duration::seconds(seconds.parse().map_err(invalid)?));
    }

    Ok(Duration::hours(s.parse().map_err(invalid)?))
}

fn default_issuer() -> String {
    DEFAULT_ISSUER.to_string()
}

fn default_organization() -> String {
    DEFAULT_ORGANIZATION.to_string()
}

fn default_validity() -> String {
    "1h".to_string()
}

fn default_token_file_mode() -> u32 {
    0o600
}
