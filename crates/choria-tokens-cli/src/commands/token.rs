//! Token commands.
//!
//! `choria-token provisioning` - Mint a provisioning token.
//! `choria-token client` - Mint a client identity token.
//! `choria-token server` - Mint a server token.
//! `choria-token inspect` - Show a token's contents without verification.
//! `choria-token verify` - Verify a token and show its claims.

use anyhow::Context;
use choria_tokens::config::parse_duration;
use choria_tokens::{
    ClientIdClaims, ClientIdOptions, ClientPermissions, ProvisioningClaims, ProvisioningOptions, PublicKey,
    ServerClaims, ServerOptions, ServerPermissions, TokenClaims, TokenConfig, inspect_token_unverified,
    save_and_sign_token_with_key_file, sign_token_with_key_file, verify_claims,
};
use std::fs;
use std::path::{Path, PathBuf};

/// Options shared by every mint command.
#[derive(Debug, Default)]
pub struct MintArgs {
    pub key: Option<PathBuf>,
    pub issuer: Option<String>,
    pub organization: Option<String>,
    pub validity: Option<String>,
    pub output: Option<PathBuf>,
}

#[derive(Debug, Default)]
pub struct ProvisioningArgs {
    pub token: String,
    pub urls: Vec<String>,
    pub srv_domain: Option<String>,
    pub secure: bool,
    pub by_default: bool,
    pub broker_user: Option<String>,
    pub broker_password: Option<String>,
}

#[derive(Debug, Default)]
pub struct ClientArgs {
    pub caller_id: String,
    pub public_key: String,
    pub agents: Vec<String>,
    pub opa_policy: Option<PathBuf>,
    pub fleet_management: bool,
    pub streams_user: bool,
}

#[derive(Debug, Default)]
pub struct ServerArgs {
    pub identity: String,
    pub public_key: String,
    pub collectives: Vec<String>,
    pub publish_subjects: Vec<String>,
    pub submission: bool,
}

/// Issuer, organization and validity for a new token, flags win over config.
struct Envelope {
    issuer: String,
    organization: String,
    validity: chrono::Duration,
}

impl Envelope {
    fn resolve(config: &TokenConfig, mint: &MintArgs) -> anyhow::Result<Self> {
        let validity = match &mint.validity {
            Some(v) => parse_duration(v),
            None => config.validity(),
        }
        .context("Failed to parse token validity")?;

        Ok(Self {
            issuer: mint.issuer.clone().unwrap_or_else(|| config.issuer.clone()),
            organization: mint.organization.clone().unwrap_or_else(|| config.organization.clone()),
            validity,
        })
    }
}

fn resolve_signing_key_path(config: &TokenConfig, key: Option<&Path>) -> anyhow::Result<PathBuf> {
    key.map(Path::to_path_buf)
        .or_else(|| config.signing_key_path())
        .context("Signing key not provided. Either pass --key <path>, set CHORIA_TOKEN_SIGNING_KEY or configure signing_key_file")
}

/// Resolve a public key from either a file path or a hex-encoded string.
fn resolve_public_key(key: &str) -> anyhow::Result<PublicKey> {
    let path = Path::new(key);
    if path.exists() {
        return PublicKey::from_file(path)
            .with_context(|| format!("Failed to load public key from file: {}", path.display()));
    }

    PublicKey::from_ed25519_hex(key.trim())
        .context("Failed to parse public key. Expected hex-encoded Ed25519 public key or a key file")
}

/// Read a token from a file when `token` names one, else use it as is.
fn read_token(token: String) -> anyhow::Result<String> {
    if Path::new(&token).exists() {
        return Ok(fs::read_to_string(&token)
            .with_context(|| format!("Failed to read token from file: {token}"))?
            .trim()
            .to_string());
    }

    Ok(token.trim().to_string())
}

/// Sign `claims` and either print the token or save it to `mint.output`.
fn emit<C: TokenClaims>(config: &TokenConfig, mint: &MintArgs, claims: &C) -> anyhow::Result<()> {
    let key_file = resolve_signing_key_path(config, mint.key.as_deref())?;
    tracing::info!(purpose = %claims.purpose(), key = %key_file.display(), "signing token");

    match &mint.output {
        Some(output_path) => {
            save_and_sign_token_with_key_file(claims, &key_file, output_path, config.token_file_mode)
                .with_context(|| format!("Failed to save token to {}", output_path.display()))?;

            println!("✔ Token written to: {}", output_path.display());
            println!("  Purpose: {}", claims.purpose());
            if let Some(expires) = claims.expires_at() {
                println!("  Expires: {}", expires.to_rfc3339());
            }
        }
        None => {
            let token = sign_token_with_key_file(claims, &key_file)
                .with_context(|| format!("Failed to sign token with {}", key_file.display()))?;
            println!("{token}");
        }
    }

    Ok(())
}

/// Mint a provisioning token.
pub fn provisioning(config: &TokenConfig, mint: MintArgs, args: ProvisioningArgs) -> anyhow::Result<()> {
    let envelope = Envelope::resolve(config, &mint)?;

    let claims = ProvisioningClaims::new(ProvisioningOptions {
        secure: args.secure,
        provision_by_default: args.by_default,
        token: args.token,
        broker_user: args.broker_user,
        broker_password: args.broker_password,
        urls: args.urls,
        srv_domain: args.srv_domain,
        organization: envelope.organization,
        issuer: envelope.issuer,
        validity: envelope.validity,
        ..Default::default()
    })?;

    emit(config, &mint, &claims)
}

/// Mint a client identity token.
pub fn client(config: &TokenConfig, mint: MintArgs, args: ClientArgs) -> anyhow::Result<()> {
    let envelope = Envelope::resolve(config, &mint)?;
    let public_key = resolve_public_key(&args.public_key)?;

    let opa_policy = args
        .opa_policy
        .map(|path| {
            fs::read_to_string(&path).with_context(|| format!("Failed to read policy file: {}", path.display()))
        })
        .transpose()?;

    let permissions = (args.fleet_management || args.streams_user).then(|| ClientPermissions {
        fleet_management: args.fleet_management,
        streams_user: args.streams_user,
        ..Default::default()
    });

    let claims = ClientIdClaims::new(ClientIdOptions {
        caller_id: args.caller_id,
        allowed_agents: args.agents,
        organization: envelope.organization,
        opa_policy,
        issuer: envelope.issuer,
        validity: envelope.validity,
        permissions,
        public_key: Some(public_key),
        ..Default::default()
    })?;

    emit(config, &mint, &claims)
}

/// Mint a server token.
pub fn server(config: &TokenConfig, mint: MintArgs, args: ServerArgs) -> anyhow::Result<()> {
    let envelope = Envelope::resolve(config, &mint)?;
    let public_key = resolve_public_key(&args.public_key)?;

    let permissions = args.submission.then(|| ServerPermissions {
        submission: true,
        ..Default::default()
    });

    let claims = ServerClaims::new(ServerOptions {
        identity: args.identity,
        collectives: args.collectives,
        organization: envelope.organization,
        permissions,
        additional_publish_subjects: args.publish_subjects,
        public_key: Some(public_key),
        issuer: envelope.issuer,
        validity: envelope.validity,
    })?;

    emit(config, &mint, &claims)
}

/// Show a token's contents without verifying it.
pub fn inspect(token: String) -> anyhow::Result<()> {
    let token = read_token(token)?;
    let unverified = inspect_token_unverified(&token)?;

    println!("Token Information (unverified):");
    println!("  Algorithm: {}", unverified.algorithm());
    println!("  Purpose: {}", unverified.claims().purpose());
    println!();
    println!("{}", serde_json::to_string_pretty(unverified.claims())?);

    Ok(())
}

/// Verify a token and show its claims.
pub fn verify(config: &TokenConfig, key: Option<String>, token: String) -> anyhow::Result<()> {
    let public_key = match key {
        Some(key) => Some(resolve_public_key(&key)?),
        None => config.resolve_public_key().context("Failed to load configured public key")?,
    };
    let token = read_token(token)?;

    let verified = verify_claims(&token, public_key.as_ref()).context("✖ Token verification failed")?;

    println!("✔ Token is valid");
    println!();
    println!("Token Details:");
    println!("  Algorithm: {}", verified.family().algorithm_name());
    println!("  Purpose: {}", verified.claims().purpose());
    if let Some(identity) = verified.claims().identity() {
        println!("  Identity: {identity}");
    }
    match verified.claims().expires_at() {
        Some(expires) => println!("  Expires: {}", expires.to_rfc3339()),
        None => println!("  Expires: never"),
    }
    println!();
    println!("{}", serde_json::to_string_pretty(verified.claims())?);

    Ok(())
}
