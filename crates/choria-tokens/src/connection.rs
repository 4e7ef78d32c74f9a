//! Transport credentials derived from a client or server token.
//!
//! A connection presents its token, listens for replies on a private inbox
//! derived from the identity in the token, and signs broker challenges with
//! the Ed25519 key in its seed file.

use crate::claims::Purpose;
use crate::error::TokenError;
use crate::inspect::{inspect_token_unverified, token_purpose};
use crate::keys::ed25519_sign_with_seed_file;
use md5::{Digest, Md5};
use std::path::{Path, PathBuf};

/// Reply inbox, token and signer for one connection.
#[derive(Debug, Clone)]
pub struct ConnectionHelpers {
    inbox: String,
    token: String,
    seed_file: PathBuf,
}

impl ConnectionHelpers {
    /// Private reply subject for this identity.
    pub fn inbox(&self) -> &str {
        &self.inbox
    }

    /// The token the helpers were derived from.
    pub fn token(&self) -> &str {
        &self.token
    }

    /// Sign `msg` with the key in the seed file, read on every call.
    pub fn sign(&self, msg: &[u8]) -> Result<Vec<u8>, TokenError> {
        ed25519_sign_with_seed_file(&self.seed_file, msg)
    }

    /// Split into the inbox plus token and signing callbacks for a transport.
    #[allow(clippy::type_complexity)]
    pub fn into_callbacks(
        self,
    ) -> (
        String,
        impl Fn() -> String + Send + Sync + 'static,
        impl Fn(&[u8]) -> Result<Vec<u8>, TokenError> + Send + Sync + 'static,
    ) {
        let Self {
            inbox,
            token,
            seed_file,
        } = self;

        let token_fn = move || token.clone();
        let sign_fn = move |msg: &[u8]| ed25519_sign_with_seed_file(&seed_file, msg);

        (inbox, token_fn, sign_fn)
    }
}

/// Derive connection helpers for a client or server token.
///
/// The purpose and identity are read without verifying the token, which is
/// expected to be the caller's own.
pub fn connection_helpers(
    token: &str,
    collective: &str,
    seed_file: impl AsRef<Path>,
) -> Result<ConnectionHelpers, TokenError> {
    if collective.is_empty() {
        return Err(TokenError::MissingParameter("collective is required"));
    }

    let seed_file = seed_file.as_ref();
    if seed_file.as_os_str().is_empty() {
        return Err(TokenError::MissingParameter("seedfile is required"));
    }

    let purpose = token_purpose(token);
    match purpose {
        Purpose::ClientId | Purpose::Server => {}
        Purpose::Provisioning | Purpose::Unknown => {
            return Err(TokenError::UnsupportedPurpose(purpose.to_string()));
        }
    }

    let inspected = inspect_token_unverified(token)?;
    let identity = inspected
        .claims()
        .identity()
        .filter(|identity| !identity.is_empty())
        .ok_or_else(|| TokenError::InvalidToken(format!("{purpose} token has no identity")))?;

    let inbox = reply_inbox(collective, identity);
    tracing::debug!(%purpose, %inbox, "derived connection helpers");

    Ok(ConnectionHelpers {
        inbox,
        token: token.to_string(),
        seed_file: seed_file.to_path_buf(),
    })
}

/// The private reply subject for `identity` within `collective`.
pub fn reply_inbox(collective: &str, identity: &str) -> String {
    format!("{collective}.reply.{:x}", Md5::digest(identity.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::claims::{ClientIdClaims, ClientIdOptions, ProvisioningClaims, ProvisioningOptions, ServerClaims, ServerOptions};
    use crate::keys::{KeyPair, ed25519_sign};
    use crate::token::sign_token;
    use chrono::Duration;

    fn seed_file() -> PathBuf {
        Path::new(env!("CARGO_MANIFEST_DIR")).join("testdata/ed25519/other.seed")
    }

    fn key() -> KeyPair {
        KeyPair::from_seed_file(seed_file()).unwrap()
    }

    fn expected_signature(msg: &[u8]) -> Vec<u8> {
        let KeyPair::Ed25519(key) = key() else {
            panic!("expected an ed25519 key");
        };
        ed25519_sign(&key, msg)
    }

    #[test]
    fn test_required_settings() {
        let err = connection_helpers("", "", "").unwrap_err();
        assert_eq!(err.to_string(), "collective is required");

        let err = connection_helpers("", "choria", "").unwrap_err();
        assert_eq!(err.to_string(), "seedfile is required");
    }

    #[test]
    fn test_unsupported_tokens() {
        let claims = ProvisioningClaims::new(ProvisioningOptions {
            secure: true,
            provision_by_default: true,
            token: "x".into(),
            srv_domain: Some("example.net".into()),
            organization: "choria".into(),
            validity: Duration::hours(1),
            ..Default::default()
        })
        .unwrap();
        let token = sign_token(&claims, &key()).unwrap();

        let err = connection_helpers(&token, "choria", seed_file()).unwrap_err();
        assert_eq!(err.to_string(), "unsupported token purpose: choria_provisioning");
    }

    #[test]
    fn test_client_tokens() {
        let claims = ClientIdClaims::new(ClientIdOptions {
            caller_id: "ginkgo".into(),
            organization: "choria".into(),
            validity: Duration::hours(1),
            public_key: Some(key().public_key()),
            ..Default::default()
        })
        .unwrap();
        let token = sign_token(&claims, &key()).unwrap();

        let helpers = connection_helpers(&token, "choria", seed_file()).unwrap();
        assert_eq!(helpers.inbox(), "choria.reply.4bb6777bb903cae3166e826932f7fe94");
        assert_eq!(helpers.token(), token);
        assert_eq!(
            helpers.sign(b"toomanysecrets").unwrap(),
            expected_signature(b"toomanysecrets")
        );

        let again = connection_helpers(&token, "choria", seed_file()).unwrap();
        assert_eq!(again.inbox().as_bytes(), helpers.inbox().as_bytes());

        let (inbox, token_fn, sign_fn) = helpers.into_callbacks();
        assert_eq!(inbox, "choria.reply.4bb6777bb903cae3166e826932f7fe94");
        assert_eq!(token_fn(), token);
        assert_eq!(sign_fn(b"toomanysecrets").unwrap(), expected_signature(b"toomanysecrets"));
    }

    #[test]
    fn test_server_tokens() {
        let claims = ServerClaims::new(ServerOptions {
            identity: "ginkgo.example.net".into(),
            collectives: vec!["choria".into()],
            organization: "choria".into(),
            public_key: Some(key().public_key()),
            validity: Duration::hours(1),
            ..Default::default()
        })
        .unwrap();
        let token = sign_token(&claims, &key()).unwrap();

        let helpers = connection_helpers(&token, "choria", seed_file()).unwrap();
        assert_eq!(helpers.inbox(), "choria.reply.3f7c3a791b0eb10da51dca4cdedb9418");
        assert_eq!(helpers.token(), token);
        assert_eq!(
            helpers.sign(b"toomanysecrets").unwrap(),
            expected_signature(b"toomanysecrets")
        );
    }

    #[test]
    fn test_reply_inbox_is_scoped_to_collective() {
        assert_eq!(reply_inbox("choria", "ginkgo"), reply_inbox("choria", "ginkgo"));
        assert_ne!(reply_inbox("choria", "ginkgo"), reply_inbox("other", "ginkgo"));
        assert!(reply_inbox("other", "ginkgo").starts_with("other.reply."));
    }

    #[test]
    fn test_missing_seed_file_surfaces_on_sign() {
        let claims = ClientIdClaims::new(ClientIdOptions {
            caller_id: "ginkgo".into(),
            public_key: Some(key().public_key()),
            ..Default::default()
        })
        .unwrap();
        let token = sign_token(&claims, &key()).unwrap();

        let helpers = connection_helpers(&token, "choria", "/nonexistent/other.seed").unwrap();
        assert!(matches!(helpers.sign(b"x"), Err(TokenError::Io(_))));
    }
}
