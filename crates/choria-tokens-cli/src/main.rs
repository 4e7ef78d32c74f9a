use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;

use commands::token::{ClientArgs, MintArgs, ProvisioningArgs, ServerArgs};

#[derive(Parser, Debug)]
#[command(name = "choria-token", version, about = "Issue, inspect and verify Choria tokens")]
struct Cli {
    /// Token configuration file (YAML)
    #[arg(long, global = true, env = "CHORIA_TOKEN_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Mint a provisioning token for unprovisioned nodes.
    Provisioning {
        #[command(flatten)]
        mint: MintCli,

        /// Token presented to the provisioner
        #[arg(long, default_value = "")]
        token: String,

        /// Provisioning broker URL, may be repeated
        #[arg(long = "url")]
        urls: Vec<String>,

        /// Domain to discover provisioning brokers through SRV records
        #[arg(long)]
        srv_domain: Option<String>,

        /// Connect to the provisioning broker without TLS
        #[arg(long, default_value_t = false)]
        insecure: bool,

        /// Enter provisioning mode by default
        #[arg(long = "default", default_value_t = false)]
        by_default: bool,

        #[arg(long)]
        broker_user: Option<String>,

        #[arg(long)]
        broker_password: Option<String>,
    },

    /// Mint a client identity token.
    Client {
        #[command(flatten)]
        mint: MintCli,

        /// Caller identity, e.g. up=alice
        caller_id: String,

        /// Client public key: hex string or file
        #[arg(long)]
        public_key: String,

        /// Agent the client may invoke, may be repeated
        #[arg(long = "agent")]
        agents: Vec<String>,

        /// Open Policy Agent policy file
        #[arg(long)]
        opa_policy: Option<PathBuf>,

        /// Allow RPC requests against the fleet
        #[arg(long, default_value_t = false)]
        fleet_management: bool,

        /// Allow access to streams
        #[arg(long, default_value_t = false)]
        streams_user: bool,
    },

    /// Mint a server token.
    Server {
        #[command(flatten)]
        mint: MintCli,

        /// Fully qualified node identity
        identity: String,

        /// Server public key: hex string or file
        #[arg(long)]
        public_key: String,

        /// Collective the server belongs to, may be repeated
        #[arg(long = "collective", required = true)]
        collectives: Vec<String>,

        /// Additional subject the server may publish to, may be repeated
        #[arg(long = "publish")]
        publish_subjects: Vec<String>,

        /// Allow publishing to the submission system
        #[arg(long, default_value_t = false)]
        submission: bool,
    },

    /// Inspect a token without verifying it.
    Inspect {
        /// Token string or file
        token: String,
    },

    /// Verify a token and print its claims.
    Verify {
        /// Token string or file
        token: String,

        /// Public key: hex string or file (hex Ed25519 or RSA PEM)
        #[arg(long, env = "CHORIA_TOKEN_PUBLIC_KEY")]
        key: Option<String>,
    },

    /// Print the hex public key for an Ed25519 seed file.
    PublicKey {
        seed: PathBuf,
    },
}

/// Options shared by every mint command.
#[derive(Args, Debug)]
struct MintCli {
    /// Signing key file: hex Ed25519 seed or RSA PEM
    #[arg(long, env = "CHORIA_TOKEN_SIGNING_KEY")]
    key: Option<PathBuf>,

    #[arg(long)]
    issuer: Option<String>,

    #[arg(long)]
    organization: Option<String>,

    /// Token validity, e.g. 24h, 7d
    #[arg(long)]
    validity: Option<String>,

    /// Write the token to this file instead of stdout
    #[arg(long)]
    output: Option<PathBuf>,
}

impl From<MintCli> for MintArgs {
    fn from(cli: MintCli) -> Self {
        MintArgs {
            key: cli.key,
            issuer: cli.issuer,
            organization: cli.organization,
            validity: cli.validity,
            output: cli.output,
        }
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = commands::load_config(cli.config.as_deref())?;

    match cli.cmd {
        Command::Provisioning {
            mint,
            token,
            urls,
            srv_domain,
            insecure,
            by_default,
            broker_user,
            broker_password,
        } => commands::token::provisioning(
            &config,
            mint.into(),
            ProvisioningArgs {
                token,
                urls,
                srv_domain,
                secure: !insecure,
                by_default,
                broker_user,
                broker_password,
            },
        )?,

        Command::Client {
            mint,
            caller_id,
            public_key,
            agents,
            opa_policy,
            fleet_management,
            streams_user,
        } => commands::token::client(
            &config,
            mint.into(),
            ClientArgs {
                caller_id,
                public_key,
                agents,
                opa_policy,
                fleet_management,
                streams_user,
            },
        )?,

        Command::Server {
            mint,
            identity,
            public_key,
            collectives,
            publish_subjects,
            submission,
        } => commands::token::server(
            &config,
            mint.into(),
            ServerArgs {
                identity,
                public_key,
                collectives,
                publish_subjects,
                submission,
            },
        )?,

        Command::Inspect { token } => commands::token::inspect(token)?,

        Command::Verify { token, key } => commands::token::verify(&config, key, token)?,

        Command::PublicKey { seed } => commands::keys::public_key(&seed)?,
    }

    Ok(())
}
