//! # choria-tokens
//!
//! Purpose-typed JWT tokens for Choria fleets.
//!
//! This crate provides functionality for:
//! - Building claims for provisioning, client and server tokens
//! - Signing tokens with Ed25519 (`EdDSA`) or RSA (`RS256`) keys
//! - Verifying tokens and decoding their claims
//! - Reading a token's purpose and algorithm before verification
//! - Deriving reply inboxes and signing callbacks for broker connections
//!
//! ## Token Purposes
//!
//! | Purpose | Issued To | Contains | Connects |
//! |---------|-----------|----------|----------|
//! | **Provisioning** | Unprovisioned nodes | Broker URLs, provisioning token | No |
//! | **Client** | Users and automation | Caller id, ACLs, public key | Yes |
//! | **Server** | Fleet nodes | Identity, collectives, public key | Yes |
//!
//! ## Trust
//!
//! Functions in [`inspect`] never check signatures and return [`Unverified`]
//! values. Only [`parse_token`] and [`verify_claims`] produce [`Verified`]
//! claims. The key family passed to them must match the token's algorithm.

pub mod claims;
pub mod config;
pub mod connection;
pub mod error;
pub mod inspect;
pub mod keys;
pub mod token;

pub use claims::{
    Claims, ClientIdClaims, ClientIdOptions, ClientPermissions, ProvisioningClaims, ProvisioningOptions, Purpose,
    ServerClaims, ServerOptions, ServerPermissions, StandardClaims, TokenClaims,
};
pub use config::{ConfigError, TokenConfig};
pub use connection::{ConnectionHelpers, connection_helpers, reply_inbox};
pub use error::TokenError;
pub use inspect::{Unverified, inspect_token_unverified, token_purpose, token_purpose_bytes, token_signing_algorithm};
pub use keys::{KeyFamily, KeyPair, PublicKey, is_encoded_ed25519_key};
pub use token::{
    TokenSigner, TokenVerifier, Verified, parse_token, save_and_sign_token_with_key_file, sign_token,
    sign_token_with_key_file, verify_claims,
};
