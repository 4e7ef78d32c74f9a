//! Error types for token operations.

use thiserror::Error;

/// Errors that can occur while building, signing, verifying or using tokens.
#[derive(Debug, Error)]
pub enum TokenError {
    /// Key material could not be decoded or parsed.
    #[error("invalid key material: {0}")]
    InvalidKeyMaterial(String),

    /// A decoded Ed25519 seed had the wrong length.
    #[error("invalid seed length")]
    InvalidSeedLength,

    /// The key family or algorithm cannot be used for this operation.
    #[error("unsupported key type: {0}")]
    UnsupportedKeyType(String),

    /// Claims failed a construction invariant.
    #[error("invalid claims: {0}")]
    InvalidClaims(String),

    /// The signing operation failed.
    #[error("could not sign token: {0}")]
    SigningFailure(String),

    /// No public key was supplied for verification.
    #[error("invalid public key")]
    MissingKey,

    /// The supplied public key does not match the algorithm in the token header.
    #[error("{0}")]
    KeyTypeMismatch(&'static str),

    /// The signature did not verify against the supplied key.
    #[error("{0}")]
    SignatureInvalid(String),

    /// The token is structurally malformed.
    #[error("invalid token: {0}")]
    InvalidToken(String),

    /// The token has expired.
    #[error("token has expired at {expired_at}")]
    TokenExpired { expired_at: String },

    /// The token is not valid yet.
    #[error("token is not valid before {valid_from}")]
    TokenNotYetValid { valid_from: String },

    /// A required parameter was empty.
    #[error("{0}")]
    MissingParameter(&'static str),

    /// The token purpose cannot be used for the requested operation.
    #[error("unsupported token purpose: {0}")]
    UnsupportedPurpose(String),

    /// IO error (reading keys, writing tokens).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl TokenError {
    pub(crate) fn ed25519_required() -> Self {
        Self::KeyTypeMismatch("ed25519 public key required")
    }

    pub(crate) fn rsa_required() -> Self {
        Self::KeyTypeMismatch("rsa public key required")
    }
}
