//! Key commands.
//!
//! `choria-token public-key` - Print the public key of an Ed25519 seed file.

use anyhow::Context;
use choria_tokens::KeyPair;
use std::path::Path;

/// Hex encoded public key for the seed in `seed_file`.
pub fn public_key_hex(seed_file: &Path) -> anyhow::Result<String> {
    let key = KeyPair::from_seed_file(seed_file)
        .with_context(|| format!("Failed to load seed from file: {}", seed_file.display()))?;

    key.public_key()
        .ed25519_hex()
        .context("Seed file did not hold an ed25519 seed")
}

/// Print the public key of an Ed25519 seed file.
pub fn public_key(seed_file: &Path) -> anyhow::Result<()> {
    println!("{}", public_key_hex(seed_file)?);
    Ok(())
}
