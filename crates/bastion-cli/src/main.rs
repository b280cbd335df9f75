//! bastion CLI
//!
//! Single binary for the web SSH gateway:
//! - `serve`: run the gateway
//! - `keygen`: create an access token key
//! - `token`: issue an access link for a host and user

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use bastion::commands::{self, keygen, serve, token};
use bastion::output::{print_error, print_info};
use bastion_core::AccessTokenCodec;

#[derive(Parser)]
#[command(name = "bastion")]
#[command(author, version, about = "Browser terminal gateway for SSH hosts")]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the gateway (WebSocket terminal, uploads and downloads)
    Serve {
        /// Bind address (overrides config)
        #[arg(short, long)]
        bind: Option<String>,
        /// Access token key (overrides config)
        #[arg(long, env = "BASTION_TOKEN_KEY", hide_env_values = true)]
        token_key: Option<String>,
    },

    /// Generate a new access token key
    Keygen,

    /// Issue an access link carrying encrypted credentials
    Token {
        /// Remote user
        #[arg(short, long)]
        user: String,
        /// Remote host, optionally with :port
        #[arg(long)]
        host: String,
        /// Private key file to embed
        #[arg(short, long)]
        key: Option<PathBuf>,
        /// Password to embed
        #[arg(short, long)]
        password: Option<String>,
        /// Gateway origin used in the printed link
        #[arg(long, default_value = token::DEFAULT_BASE_URL)]
        base_url: String,
        /// Access token key (overrides config)
        #[arg(long, env = "BASTION_TOKEN_KEY", hide_env_values = true)]
        token_key: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    let log_level = match (cli.quiet, cli.verbose) {
        (true, _) => "error",
        (false, 0) => "info",
        (false, 1) => "debug",
        (false, _) => "trace",
    };

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| log_level.into()),
        ))
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    if let Err(e) = run(cli).await {
        print_error(&format!("{:#}", e));
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Serve { bind, token_key } => {
            let mut config = commands::load_gateway_config(cli.config.as_deref())?;
            if let Some(bind) = bind {
                config.bind_address = bind;
            }
            if token_key.is_some() {
                config.token_key = token_key;
            }
            serve::run(config).await
        }

        Commands::Keygen => {
            println!("{}", keygen::run());
            Ok(())
        }

        Commands::Token {
            user,
            host,
            key,
            password,
            base_url,
            token_key,
        } => {
            let config = commands::load_gateway_config(cli.config.as_deref())?;
            let secret = token::resolve_token_key(token_key, &config)?;
            let codec = AccessTokenCodec::new(&secret)?.with_max_age(config.token_max_age);
            let issued = token::issue(
                &codec,
                &token::TokenRequest {
                    user,
                    host,
                    key_file: key,
                    password,
                    base_url,
                },
            )?;
            if let Some(max_age) = config.token_max_age {
                print_info(&format!("Token expires in {}s", max_age.as_secs()));
            }
            println!("{}", issued.url);
            println!("{}", issued.token);
            Ok(())
        }
    }
}
