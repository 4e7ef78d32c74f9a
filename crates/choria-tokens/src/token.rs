//! Token signing and verification.
//!
//! Tokens are JWTs signed with `EdDSA` for Ed25519 keys or `RS256` for RSA
//! keys. Verification refuses a key whose family does not match the algorithm
//! in the token header before any signature check is attempted.

use crate::claims::{Claims, TokenClaims};
use crate::error::TokenError;
use crate::keys::{KeyFamily, KeyPair, PublicKey};
use chrono::{DateTime, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, Header, Validation};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashSet;
use std::fs;
use std::path::Path;

/// Sign `claims` with `key`, the algorithm follows the key family.
pub fn sign_token<C: TokenClaims>(claims: &C, key: &KeyPair) -> Result<String, TokenError> {
    claims.validate()?;

    let family = key.family();
    let header = Header::new(family.algorithm());
    let encoding_key = key.encoding_key()?;

    let token = jsonwebtoken::encode(&header, claims, &encoding_key)
        .map_err(|e| TokenError::SigningFailure(e.to_string()))?;

    tracing::debug!(
        purpose = %claims.purpose(),
        algorithm = family.algorithm_name(),
        "signed token"
    );

    Ok(token)
}

/// Sign `claims` with the key held in `key_file`, a hex seed or an RSA PEM.
pub fn sign_token_with_key_file<C: TokenClaims>(
    claims: &C,
    key_file: impl AsRef<Path>,
) -> Result<String, TokenError> {
    let key = KeyPair::from_file(key_file)?;
    sign_token(claims, &key)
}

/// Sign `claims` with the key held in `key_file` and write the token to `out`.
///
/// `mode` is applied to the written file on Unix and ignored elsewhere.
pub fn save_and_sign_token_with_key_file<C: TokenClaims>(
    claims: &C,
    key_file: impl AsRef<Path>,
    out: impl AsRef<Path>,
    mode: u32,
) -> Result<(), TokenError> {
    let token = sign_token_with_key_file(claims, key_file)?;
    write_token(out.as_ref(), &token, mode)?;

    tracing::debug!(path = %out.as_ref().display(), mode = %format!("{mode:o}"), "saved token");

    Ok(())
}

#[cfg(unix)]
fn write_token(path: &Path, token: &str, mode: u32) -> Result<(), TokenError> {
    use std::io::Write;
    use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};

    let mut file = fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(mode)
        .open(path)?;
    file.write_all(token.as_bytes())?;

    // the open mode is filtered by the umask and ignored for existing files
    fs::set_permissions(path, fs::Permissions::from_mode(mode))?;

    Ok(())
}

#[cfg(not(unix))]
fn write_token(path: &Path, token: &str, _mode: u32) -> Result<(), TokenError> {
    fs::write(path, token)?;
    Ok(())
}

/// Claims taken from a token whose signature and expiry have been checked.
#[derive(Debug, Clone)]
pub struct Verified<T> {
    claims: T,
    family: KeyFamily,
}

impl<T> Verified<T> {
    pub fn claims(&self) -> &T {
        &self.claims
    }

    pub fn into_claims(self) -> T {
        self.claims
    }

    /// The key family that verified the token.
    pub fn family(&self) -> KeyFamily {
        self.family
    }
}

/// Verify `token` with `key` and decode its claims into `T`.
///
/// `T` may be a generic map such as `serde_json::Map`, [`StandardClaims`] or
/// one of the purpose specific claim types. Construction invariants are not
/// checked again while decoding.
///
/// [`StandardClaims`]: crate::claims::StandardClaims
pub fn parse_token<T: DeserializeOwned>(
    token: &str,
    key: Option<&PublicKey>,
) -> Result<Verified<T>, TokenError> {
    let verified = verify_signature(token, key)?;
    let family = verified.family;

    let claims = serde_json::from_value(verified.claims)
        .map_err(|e| TokenError::InvalidToken(format!("could not decode claims: {e}")))?;

    Ok(Verified { claims, family })
}

/// Verify `token` with `key` and decode it into the variant matching its purpose.
pub fn verify_claims(token: &str, key: Option<&PublicKey>) -> Result<Verified<Claims>, TokenError> {
    let verified = verify_signature(token, key)?;
    let family = verified.family;

    let claims = Claims::from_value(verified.claims)?;

    Ok(Verified { claims, family })
}

fn verify_signature(token: &str, key: Option<&PublicKey>) -> Result<Verified<Value>, TokenError> {
    let key = key.ok_or(TokenError::MissingKey)?;

    let header = jsonwebtoken::decode_header(token)
        .map_err(|e| TokenError::InvalidToken(e.to_string()))?;

    let family = match (header.alg, key.family()) {
        (Algorithm::EdDSA, KeyFamily::Ed25519) => KeyFamily::Ed25519,
        (Algorithm::RS256, KeyFamily::Rsa) => KeyFamily::Rsa,
        (Algorithm::EdDSA, KeyFamily::Rsa) => {
            tracing::warn!(algorithm = "EdDSA", key = %key.family(), "key type mismatch");
            return Err(TokenError::ed25519_required());
        }
        (Algorithm::RS256, KeyFamily::Ed25519) => {
            tracing::warn!(algorithm = "RS256", key = %key.family(), "key type mismatch");
            return Err(TokenError::rsa_required());
        }
        (alg, _) => {
            return Err(TokenError::UnsupportedKeyType(format!(
                "unsupported signing algorithm {alg:?}"
            )));
        }
    };

    let mut validation = Validation::new(family.algorithm());
    validation.required_spec_claims = HashSet::new();
    validation.validate_exp = false;
    validation.validate_nbf = false;
    validation.validate_aud = false;

    let data = jsonwebtoken::decode::<Value>(token, &key.decoding_key()?, &validation).map_err(|e| {
        match e.kind() {
            ErrorKind::InvalidSignature => {
                TokenError::SignatureInvalid(format!("{family}: verification error"))
            }
            _ => TokenError::InvalidToken(e.to_string()),
        }
    })?;

    check_validity_window(&data.claims)?;

    tracing::debug!(algorithm = family.algorithm_name(), "verified token");

    Ok(Verified {
        claims: data.claims,
        family,
    })
}

/// Time claims are checked once the signature is known to be good.
fn check_validity_window(claims: &Value) -> Result<(), TokenError> {
    let now = Utc::now().timestamp();

    if let Some(expires_at) = timestamp_claim(claims, "exp")? {
        if now >= expires_at {
            let expired_at = format_timestamp(expires_at);
            tracing::warn!(%expired_at, "token has expired");
            return Err(TokenError::TokenExpired { expired_at });
        }
    }

    if let Some(not_before) = timestamp_claim(claims, "nbf")? {
        if now < not_before {
            let valid_from = format_timestamp(not_before);
            tracing::warn!(%valid_from, "token is not valid yet");
            return Err(TokenError::TokenNotYetValid { valid_from });
        }
    }

    Ok(())
}

/// A numeric date claim, absent or zero means unset.
fn timestamp_claim(claims: &Value, name: &str) -> Result<Option<i64>, TokenError> {
    let Some(value) = claims.get(name) else {
        return Ok(None);
    };

    let secs = value
        .as_i64()
        .or_else(|| value.as_f64().map(|secs| secs as i64))
        .ok_or_else(|| TokenError::InvalidToken(format!("invalid {name} claim")))?;

    Ok((secs != 0).then_some(secs))
}

fn format_timestamp(secs: i64) -> String {
    DateTime::<Utc>::from_timestamp(secs, 0)
        .map(|at| at.to_rfc3339())
        .unwrap_or_else(|| secs.to_string())
}

/// Signs claims with a fixed key.
#[derive(Debug, Clone)]
pub struct TokenSigner {
    key: KeyPair,
}

impl TokenSigner {
    pub fn new(key: KeyPair) -> Self {
        Self { key }
    }

    pub fn sign<C: TokenClaims>(&self, claims: &C) -> Result<String, TokenError> {
        sign_token(claims, &self.key)
    }

    /// The public key verifiers need for tokens from this signer.
    pub fn public_key(&self) -> PublicKey {
        self.key.public_key()
    }
}

/// Verifies tokens against a fixed public key.
#[derive(Debug, Clone)]
pub struct TokenVerifier {
    public_key: PublicKey,
}

impl TokenVerifier {
    pub fn new(public_key: PublicKey) -> Self {
        Self { public_key }
    }

    pub fn verify<T: DeserializeOwned>(&self, token: &str) -> Result<Verified<T>, TokenError> {
        parse_token(token, Some(&self.public_key))
    }

    pub fn verify_claims(&self, token: &str) -> Result<Verified<Claims>, TokenError> {
        verify_claims(token, Some(&self.public_key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::claims::{
        ClientIdClaims, ClientIdOptions, ClientPermissions, ProvisioningClaims, ProvisioningOptions, Purpose,
        ServerClaims, ServerOptions, StandardClaims,
    };
    use base64::Engine;
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;
    use chrono::Duration;
    use serde_json::Map;
    use std::path::PathBuf;
    use tempfile::tempdir;

    fn testdata(path: &str) -> PathBuf {
        Path::new(env!("CARGO_MANIFEST_DIR")).join("testdata").join(path)
    }

    fn fixture(path: &str) -> String {
        fs::read_to_string(testdata(path)).unwrap()
    }

    fn ed25519(name: &str) -> KeyPair {
        KeyPair::from_seed_file(testdata(&format!("ed25519/{name}.seed"))).unwrap()
    }

    fn rsa_public(name: &str) -> PublicKey {
        PublicKey::from_file(testdata(&format!("rsa/{name}-public.pem"))).unwrap()
    }

    fn standard_claims() -> StandardClaims {
        StandardClaims::new("ginkgo", Purpose::Provisioning, Duration::zero(), false).unwrap()
    }

    #[test]
    fn test_parse_ed25519_fixture() {
        let token = fixture("ed25519/good-provisioning.jwt");

        let err = parse_token::<Map<String, Value>>(&token, None).unwrap_err();
        assert_eq!(err.to_string(), "invalid public key");

        let err = parse_token::<Map<String, Value>>(&token, Some(&ed25519("other").public_key())).unwrap_err();
        assert!(matches!(err, TokenError::SignatureInvalid(_)));
        assert_eq!(err.to_string(), "ed25519: verification error");

        let err = parse_token::<Map<String, Value>>(&token, Some(&rsa_public("other"))).unwrap_err();
        assert_eq!(err.to_string(), "ed25519 public key required");

        let verified = parse_token::<Map<String, Value>>(&token, Some(&ed25519("signer").public_key())).unwrap();
        assert_eq!(verified.family(), KeyFamily::Ed25519);
        assert_eq!(verified.claims()["purpose"], "choria_provisioning");
        assert_eq!(verified.claims()["cht"], "s3cret");
    }

    #[test]
    fn test_parse_rsa_fixture() {
        let token = fixture("rsa/good-provisioning.jwt");

        let err = parse_token::<Map<String, Value>>(&token, None).unwrap_err();
        assert_eq!(err.to_string(), "invalid public key");

        let err = parse_token::<Map<String, Value>>(&token, Some(&rsa_public("other"))).unwrap_err();
        assert!(matches!(err, TokenError::SignatureInvalid(_)));
        assert_eq!(err.to_string(), "rsa: verification error");

        let err = parse_token::<Map<String, Value>>(&token, Some(&ed25519("other").public_key())).unwrap_err();
        assert_eq!(err.to_string(), "rsa public key required");

        let verified = verify_claims(&token, Some(&rsa_public("signer"))).unwrap();
        assert_eq!(verified.family(), KeyFamily::Rsa);
        let Claims::Provisioning(claims) = verified.into_claims() else {
            panic!("expected provisioning claims");
        };
        assert_eq!(claims.standard.issuer, "ginkgo");
        assert_eq!(claims.urls, vec!["nats://prov.example.net:4222".to_string()]);
        assert!(claims.secure);
        assert!(claims.provision_by_default);
    }

    #[test]
    fn test_sign_ed25519() {
        let signer = ed25519("signer");
        let token = sign_token(&standard_claims(), &signer).unwrap();

        let err = parse_token::<StandardClaims>(&token, Some(&rsa_public("signer"))).unwrap_err();
        assert_eq!(err.to_string(), "ed25519 public key required");

        let verified = parse_token::<StandardClaims>(&token, Some(&signer.public_key())).unwrap();
        assert_eq!(verified.claims().issuer, "ginkgo");
    }

    #[test]
    fn test_sign_rsa() {
        let signer = KeyPair::from_file(testdata("rsa/signer-key.pem")).unwrap();
        let token = sign_token(&standard_claims(), &signer).unwrap();

        let err = parse_token::<StandardClaims>(&token, Some(&ed25519("signer").public_key())).unwrap_err();
        assert_eq!(err.to_string(), "rsa public key required");

        let verified = parse_token::<StandardClaims>(&token, Some(&rsa_public("signer"))).unwrap();
        assert_eq!(verified.claims().issuer, "ginkgo");
    }

    #[test]
    fn test_sign_with_key_file() {
        let claims = standard_claims();

        let token = sign_token_with_key_file(&claims, testdata("ed25519/signer.seed")).unwrap();
        let verified = parse_token::<StandardClaims>(&token, Some(&ed25519("signer").public_key())).unwrap();
        assert_eq!(verified.claims().issuer, "ginkgo");

        let token = sign_token_with_key_file(&claims, testdata("rsa/signer-key.pem")).unwrap();
        let verified = parse_token::<StandardClaims>(&token, Some(&rsa_public("signer"))).unwrap();
        assert_eq!(verified.claims().issuer, "ginkgo");
    }

    #[test]
    fn test_save_and_sign_with_key_file() {
        let cases = [
            ("ed25519/signer.seed", ed25519("signer").public_key()),
            ("rsa/signer-key.pem", rsa_public("signer")),
        ];

        for (key_file, public_key) in cases {
            let dir = tempdir().unwrap();
            let out = dir.path().join("token.jwt");

            save_and_sign_token_with_key_file(&standard_claims(), testdata(key_file), &out, 0o600).unwrap();

            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                let mode = fs::metadata(&out).unwrap().permissions().mode();
                assert_eq!(mode & 0o777, 0o600);
            }

            let token = fs::read_to_string(&out).unwrap();
            let verified = parse_token::<StandardClaims>(&token, Some(&public_key)).unwrap();
            assert_eq!(verified.claims().issuer, "ginkgo");
        }
    }

    #[test]
    fn test_round_trip_every_purpose() {
        let signer = ed25519("signer");
        let rsa = KeyPair::from_file(testdata("rsa/signer-key.pem")).unwrap();

        let provisioning = ProvisioningClaims::new(ProvisioningOptions {
            secure: true,
            token: "s3cret".into(),
            urls: vec!["nats://prov.example.net:4222".into()],
            organization: "choria".into(),
            ..Default::default()
        })
        .unwrap();

        let client = ClientIdClaims::new(ClientIdOptions {
            caller_id: "up=ginkgo".into(),
            allowed_agents: vec!["rpcutil".into()],
            organization: "choria".into(),
            permissions: Some(ClientPermissions {
                fleet_management: true,
                ..Default::default()
            }),
            public_key: Some(signer.public_key()),
            validity: Duration::hours(2),
            ..Default::default()
        })
        .unwrap();

        let server = ServerClaims::new(ServerOptions {
            identity: "ginkgo.example.net".into(),
            collectives: vec!["choria".into(), "other".into()],
            public_key: Some(signer.public_key()),
            issuer: "ginkgo issuer".into(),
            validity: Duration::days(365),
            ..Default::default()
        })
        .unwrap();

        for key in [&signer, &rsa] {
            let verifier = TokenVerifier::new(key.public_key());
            let signer = TokenSigner::new(key.clone());

            let token = signer.sign(&provisioning).unwrap();
            let verified = verifier.verify::<ProvisioningClaims>(&token).unwrap();
            assert_eq!(verified.claims(), &provisioning);

            let token = signer.sign(&client).unwrap();
            let verified = verifier.verify_claims(&token).unwrap();
            assert_eq!(verified.claims(), &Claims::ClientId(client.clone()));

            let token = signer.sign(&server).unwrap();
            let verified = verifier.verify::<ServerClaims>(&token).unwrap();
            assert_eq!(verified.claims(), &server);
        }
    }

    #[test]
    fn test_expired_token() {
        let signer = ed25519("signer");
        let mut claims = standard_claims();
        claims.issued_at = claims.issued_at - Duration::hours(2);
        claims.expires_at = Some(claims.issued_at + Duration::hours(1));

        let token = sign_token(&claims, &signer).unwrap();
        let err = parse_token::<StandardClaims>(&token, Some(&signer.public_key())).unwrap_err();
        assert!(matches!(err, TokenError::TokenExpired { .. }));

        claims.expires_at = None;
        let token = sign_token(&claims, &signer).unwrap();
        let verified = parse_token::<StandardClaims>(&token, Some(&signer.public_key())).unwrap();
        assert!(verified.claims().expires_at.is_none());
    }

    /// Sign an arbitrary payload, bypassing claims construction.
    fn sign_raw(payload: Value, key: &KeyPair) -> String {
        let header = Header::new(key.family().algorithm());
        jsonwebtoken::encode(&header, &payload, &key.encoding_key().unwrap()).unwrap()
    }

    #[test]
    fn test_not_before_in_future() {
        let signer = ed25519("signer");
        let now = Utc::now().timestamp();

        let token = sign_raw(
            serde_json::json!({"iss": "ginkgo", "iat": now, "nbf": now + 86400, "exp": now + 90000}),
            &signer,
        );
        let err = parse_token::<StandardClaims>(&token, Some(&signer.public_key())).unwrap_err();
        assert!(matches!(err, TokenError::TokenNotYetValid { .. }));

        let token = sign_raw(
            serde_json::json!({"iss": "ginkgo", "iat": now, "nbf": now - 60, "exp": now + 3600}),
            &signer,
        );
        let verified = parse_token::<StandardClaims>(&token, Some(&signer.public_key())).unwrap();
        assert_eq!(verified.claims().not_before, DateTime::from_timestamp(now - 60, 0));
    }

    #[test]
    fn test_not_before_round_trip() {
        let signer = ed25519("signer");
        let mut claims = standard_claims();
        claims.not_before = Some(claims.issued_at);

        let token = sign_token(&claims, &signer).unwrap();
        let verified = parse_token::<StandardClaims>(&token, Some(&signer.public_key())).unwrap();
        assert_eq!(verified.claims(), &claims);
    }

    #[test]
    fn test_non_numeric_time_claims() {
        let signer = ed25519("signer");

        let token = sign_raw(serde_json::json!({"iss": "ginkgo", "iat": 1, "exp": "2"}), &signer);
        let err = parse_token::<Map<String, Value>>(&token, Some(&signer.public_key())).unwrap_err();
        assert!(matches!(err, TokenError::InvalidToken(_)));
        assert_eq!(err.to_string(), "invalid token: invalid exp claim");

        let token = sign_raw(serde_json::json!({"iss": "ginkgo", "iat": 1, "nbf": "soon"}), &signer);
        let err = parse_token::<Value>(&token, Some(&signer.public_key())).unwrap_err();
        assert_eq!(err.to_string(), "invalid token: invalid nbf claim");

        let token = sign_raw(serde_json::json!({"iss": "ginkgo", "iat": 1, "exp": 0}), &signer);
        assert!(parse_token::<Map<String, Value>>(&token, Some(&signer.public_key())).is_ok());
    }

    #[test]
    fn test_expiry_checked_after_signature() {
        let signer = ed25519("signer");
        let mut claims = standard_claims();
        claims.issued_at = claims.issued_at - Duration::hours(2);
        claims.expires_at = Some(claims.issued_at + Duration::hours(1));

        let token = sign_token(&claims, &signer).unwrap();
        let err = parse_token::<StandardClaims>(&token, Some(&ed25519("other").public_key())).unwrap_err();
        assert!(matches!(err, TokenError::SignatureInvalid(_)));
    }

    #[test]
    fn test_tampered_payload() {
        let signer = ed25519("signer");
        let token = sign_token(&standard_claims(), &signer).unwrap();

        let parts: Vec<&str> = token.split('.').collect();
        let mut payload: Value = serde_json::from_slice(&URL_SAFE_NO_PAD.decode(parts[1]).unwrap()).unwrap();
        payload["iss"] = Value::from("mallory");
        let payload = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&payload).unwrap());
        let tampered = format!("{}.{}.{}", parts[0], payload, parts[2]);

        let err = parse_token::<StandardClaims>(&tampered, Some(&signer.public_key())).unwrap_err();
        assert!(matches!(err, TokenError::SignatureInvalid(_)));
    }

    #[test]
    fn test_unsupported_algorithm() {
        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
        let payload = URL_SAFE_NO_PAD.encode(br#"{"iss":"ginkgo"}"#);
        let token = format!("{header}.{payload}.c2lnbmF0dXJl");

        let err = parse_token::<Value>(&token, Some(&ed25519("signer").public_key())).unwrap_err();
        assert!(matches!(err, TokenError::UnsupportedKeyType(_)));
    }

    #[test]
    fn test_malformed_token() {
        let err = parse_token::<Value>("not a token", Some(&ed25519("signer").public_key())).unwrap_err();
        assert!(matches!(err, TokenError::InvalidToken(_)));
    }

    #[test]
    fn test_sign_rejects_invalid_claims() {
        let mut claims = standard_claims();
        claims.issuer.clear();
        assert!(matches!(
            sign_token(&claims, &ed25519("signer")),
            Err(TokenError::InvalidClaims(_))
        ));
    }
}
