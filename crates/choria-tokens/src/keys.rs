//! Key material for the two supported key families.
//!
//! Ed25519 keys are stored on disk as the lowercase hex encoding of a 32 byte
//! seed. RSA keys are standard PEM files, PKCS#1 or PKCS#8 for private keys and
//! SPKI or PKCS#1 for public keys.

use crate::error::TokenError;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use ed25519_dalek::pkcs8::EncodePrivateKey;
use ed25519_dalek::{Signature, Signer as _, Verifier as _, VerifyingKey};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey};
use rsa::pkcs1::{DecodeRsaPrivateKey, DecodeRsaPublicKey, EncodeRsaPrivateKey};
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey};
use rsa::traits::PublicKeyParts;
use rsa::{RsaPrivateKey, RsaPublicKey};
use std::fmt;
use std::path::Path;

/// Size of an Ed25519 seed in bytes.
pub const SEED_SIZE: usize = ed25519_dalek::SECRET_KEY_LENGTH;

/// The asymmetric algorithm class of a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyFamily {
    Ed25519,
    Rsa,
}

impl KeyFamily {
    /// The JWT algorithm used when signing with this family.
    pub fn algorithm(self) -> Algorithm {
        match self {
            KeyFamily::Ed25519 => Algorithm::EdDSA,
            KeyFamily::Rsa => Algorithm::RS256,
        }
    }

    /// The algorithm identifier as it appears in the token header.
    pub fn algorithm_name(self) -> &'static str {
        match self {
            KeyFamily::Ed25519 => "EdDSA",
            KeyFamily::Rsa => "RS256",
        }
    }
}

impl fmt::Display for KeyFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyFamily::Ed25519 => f.write_str("ed25519"),
            KeyFamily::Rsa => f.write_str("rsa"),
        }
    }
}

/// A private key together with its public half.
#[derive(Clone)]
pub enum KeyPair {
    Ed25519(ed25519_dalek::SigningKey),
    Rsa(Box<RsaPrivateKey>),
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("family", &self.family())
            .field("public", &self.public_key())
            .finish_non_exhaustive()
    }
}

impl KeyPair {
    /// Derive an Ed25519 keypair from a raw seed.
    pub fn from_seed(seed: &[u8]) -> Result<Self, TokenError> {
        signing_key_from_seed(seed).map(Self::Ed25519)
    }

    /// Derive an Ed25519 keypair from a hex-encoded seed.
    pub fn from_seed_hex(encoded: &str) -> Result<Self, TokenError> {
        signing_key_from_seed_hex(encoded).map(Self::Ed25519)
    }

    /// Load an Ed25519 keypair from a seed file.
    pub fn from_seed_file(path: impl AsRef<Path>) -> Result<Self, TokenError> {
        signing_key_from_seed_file(path).map(Self::Ed25519)
    }

    /// Parse a PEM encoded RSA private key.
    pub fn from_rsa_pem(pem: &[u8]) -> Result<Self, TokenError> {
        let pem = std::str::from_utf8(pem)
            .map_err(|e| TokenError::InvalidKeyMaterial(format!("invalid PEM data: {e}")))?;

        let key = RsaPrivateKey::from_pkcs8_pem(pem)
            .or_else(|_| RsaPrivateKey::from_pkcs1_pem(pem))
            .map_err(|e| TokenError::InvalidKeyMaterial(format!("invalid RSA private key: {e}")))?;

        Ok(Self::Rsa(Box::new(key)))
    }

    /// Load a private key from a file holding either a hex seed or an RSA PEM.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, TokenError> {
        let path = path.as_ref();
        let data = std::fs::read(path)?;
        let trimmed = data.trim_ascii();

        if is_encoded_ed25519_key(trimmed) {
            tracing::debug!(path = %path.display(), "loading ed25519 seed");
            let encoded = std::str::from_utf8(trimmed)
                .map_err(|e| TokenError::InvalidKeyMaterial(e.to_string()))?;
            return Self::from_seed_hex(encoded);
        }

        tracing::debug!(path = %path.display(), "loading RSA private key");
        Self::from_rsa_pem(&data)
    }

    pub fn family(&self) -> KeyFamily {
        match self {
            KeyPair::Ed25519(_) => KeyFamily::Ed25519,
            KeyPair::Rsa(_) => KeyFamily::Rsa,
        }
    }

    pub fn public_key(&self) -> PublicKey {
        match self {
            KeyPair::Ed25519(key) => PublicKey::Ed25519(key.verifying_key()),
            KeyPair::Rsa(key) => PublicKey::Rsa(key.to_public_key()),
        }
    }

    /// The JWT signing key for this keypair.
    pub(crate) fn encoding_key(&self) -> Result<EncodingKey, TokenError> {
        match self {
            KeyPair::Ed25519(key) => {
                let der = key
                    .to_pkcs8_der()
                    .map_err(|e| TokenError::SigningFailure(e.to_string()))?;
                Ok(EncodingKey::from_ed_der(der.as_bytes()))
            }
            KeyPair::Rsa(key) => {
                let der = key
                    .to_pkcs1_der()
                    .map_err(|e| TokenError::SigningFailure(e.to_string()))?;
                Ok(EncodingKey::from_rsa_der(der.as_bytes()))
            }
        }
    }
}

/// A public key used to verify tokens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublicKey {
    Ed25519(VerifyingKey),
    Rsa(RsaPublicKey),
}

impl PublicKey {
    /// Parse a raw 32 byte Ed25519 public key.
    pub fn from_ed25519_bytes(bytes: &[u8]) -> Result<Self, TokenError> {
        let bytes: [u8; ed25519_dalek::PUBLIC_KEY_LENGTH] = bytes
            .try_into()
            .map_err(|_| TokenError::InvalidKeyMaterial("invalid public key size".into()))?;
        let key = VerifyingKey::from_bytes(&bytes)
            .map_err(|e| TokenError::InvalidKeyMaterial(e.to_string()))?;
        Ok(Self::Ed25519(key))
    }

    /// Parse a hex-encoded Ed25519 public key.
    pub fn from_ed25519_hex(encoded: &str) -> Result<Self, TokenError> {
        let bytes = hex::decode(encoded.trim())
            .map_err(|e| TokenError::InvalidKeyMaterial(format!("could not hex decode public key: {e}")))?;
        Self::from_ed25519_bytes(&bytes)
    }

    /// Parse a PEM encoded RSA public key.
    pub fn from_rsa_pem(pem: &[u8]) -> Result<Self, TokenError> {
        let pem = std::str::from_utf8(pem)
            .map_err(|e| TokenError::InvalidKeyMaterial(format!("invalid PEM data: {e}")))?;

        let key = RsaPublicKey::from_public_key_pem(pem)
            .or_else(|_| RsaPublicKey::from_pkcs1_pem(pem))
            .map_err(|e| TokenError::InvalidKeyMaterial(format!("invalid RSA public key: {e}")))?;

        Ok(Self::Rsa(key))
    }

    /// Load a public key from a file holding a hex Ed25519 key or an RSA PEM.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, TokenError> {
        let data = std::fs::read(path.as_ref())?;
        let trimmed = data.trim_ascii();

        if is_encoded_ed25519_key(trimmed) {
            let encoded = std::str::from_utf8(trimmed)
                .map_err(|e| TokenError::InvalidKeyMaterial(e.to_string()))?;
            return Self::from_ed25519_hex(encoded);
        }

        Self::from_rsa_pem(&data)
    }

    pub fn family(&self) -> KeyFamily {
        match self {
            PublicKey::Ed25519(_) => KeyFamily::Ed25519,
            PublicKey::Rsa(_) => KeyFamily::Rsa,
        }
    }

    /// Hex encoding of an Ed25519 key, `None` for RSA keys.
    pub fn ed25519_hex(&self) -> Option<String> {
        match self {
            PublicKey::Ed25519(key) => Some(hex::encode(key.as_bytes())),
            PublicKey::Rsa(_) => None,
        }
    }

    /// The JWT verification key for this public key.
    pub(crate) fn decoding_key(&self) -> Result<DecodingKey, TokenError> {
        match self {
            PublicKey::Ed25519(key) => DecodingKey::from_ed_components(&URL_SAFE_NO_PAD.encode(key.as_bytes()))
                .map_err(|e| TokenError::InvalidKeyMaterial(e.to_string())),
            PublicKey::Rsa(key) => {
                let n = URL_SAFE_NO_PAD.encode(key.n().to_bytes_be());
                let e = URL_SAFE_NO_PAD.encode(key.e().to_bytes_be());
                DecodingKey::from_rsa_components(&n, &e)
                    .map_err(|e| TokenError::InvalidKeyMaterial(e.to_string()))
            }
        }
    }
}

impl From<VerifyingKey> for PublicKey {
    fn from(key: VerifyingKey) -> Self {
        Self::Ed25519(key)
    }
}

impl From<RsaPublicKey> for PublicKey {
    fn from(key: RsaPublicKey) -> Self {
        Self::Rsa(key)
    }
}

fn signing_key_from_seed(seed: &[u8]) -> Result<ed25519_dalek::SigningKey, TokenError> {
    let seed: [u8; SEED_SIZE] = seed.try_into().map_err(|_| TokenError::InvalidSeedLength)?;
    Ok(ed25519_dalek::SigningKey::from_bytes(&seed))
}

fn signing_key_from_seed_hex(encoded: &str) -> Result<ed25519_dalek::SigningKey, TokenError> {
    let encoded = encoded.trim();
    if encoded.is_empty() {
        return Err(TokenError::InvalidKeyMaterial(
            "could not hex decode seed: seed is empty".into(),
        ));
    }

    let seed = hex::decode(encoded)
        .map_err(|e| TokenError::InvalidKeyMaterial(format!("could not hex decode seed: {e}")))?;
    signing_key_from_seed(&seed)
}

fn signing_key_from_seed_file(path: impl AsRef<Path>) -> Result<ed25519_dalek::SigningKey, TokenError> {
    let encoded = std::fs::read_to_string(path.as_ref())?;
    signing_key_from_seed_hex(&encoded)
}

/// Whether `data` looks like a hex-encoded Ed25519 seed or public key.
pub fn is_encoded_ed25519_key(data: &[u8]) -> bool {
    data.len() == SEED_SIZE * 2 && hex::decode(data).is_ok()
}

/// Sign `msg` with an Ed25519 key.
pub fn ed25519_sign(key: &ed25519_dalek::SigningKey, msg: &[u8]) -> Vec<u8> {
    key.sign(msg).to_bytes().to_vec()
}

/// Verify an Ed25519 signature, a malformed signature verifies as `false`.
pub fn ed25519_verify(key: &VerifyingKey, msg: &[u8], sig: &[u8]) -> bool {
    match Signature::from_slice(sig) {
        Ok(sig) => key.verify(msg, &sig).is_ok(),
        Err(_) => false,
    }
}

/// Load an Ed25519 keypair from a seed file.
pub fn ed25519_key_pair_from_seed_file(
    path: impl AsRef<Path>,
) -> Result<(VerifyingKey, ed25519_dalek::SigningKey), TokenError> {
    let key = signing_key_from_seed_file(path)?;
    Ok((key.verifying_key(), key))
}

/// Sign `msg` with the Ed25519 key held in a seed file.
pub fn ed25519_sign_with_seed_file(path: impl AsRef<Path>, msg: &[u8]) -> Result<Vec<u8>, TokenError> {
    let (_, key) = ed25519_key_pair_from_seed_file(path)?;
    Ok(ed25519_sign(&key, msg))
}
