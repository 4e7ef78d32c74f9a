//! CLI command implementations for choria-token.

pub mod keys;
pub mod token;

use anyhow::Context;
use choria_tokens::TokenConfig;
use std::path::Path;

/// Load the configuration file, or defaults when none is given.
pub fn load_config(path: Option<&Path>) -> anyhow::Result<TokenConfig> {
    match path {
        Some(path) => TokenConfig::from_file(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display())),
        None => Ok(TokenConfig::default()),
    }
}
