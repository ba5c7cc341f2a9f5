//! Reeve Gitea bridge CLI tool.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "reeve")]
#[command(about = "Reeve Gitea bridge CLI", long_about = None)]
struct Cli {
    /// Bridge server URL
    #[arg(long, env = "REEVE_API_URL", default_value = "http://localhost:8080")]
    api_url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve and check the configuration of a local checkout
    Validate {
        /// Repository root
        #[arg(long, default_value = ".")]
        dir: PathBuf,
        /// Secret key to check that secrets decrypt
        #[arg(long, env = "REEVE_GITEA_SECRET_KEY")]
        secret_key: Option<String>,
    },
    /// Encrypt a secret value locally
    Encrypt {
        /// Secret key of the bridge
        #[arg(long, env = "REEVE_GITEA_SECRET_KEY")]
        key: String,
        /// Value to encrypt
        value: String,
    },
    /// Call CLI methods of a running bridge
    Remote {
        #[command(subcommand)]
        command: RemoteCommands,
    },
}

#[derive(Subcommand)]
enum RemoteCommands {
    /// Encrypt a secret value with the bridge's key
    Encrypt {
        /// Value to encrypt
        value: String,
    },
    /// Trigger an action on matching repositories
    Action {
        /// Action name
        action: String,
        /// Repository search terms
        search: Vec<String>,
    },
    /// Rescan all repositories
    Rescan,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Validate { dir, secret_key } => {
            commands::validate(&dir, secret_key.as_deref()).await?;
        }
        Commands::Encrypt { key, value } => {
            commands::encrypt(&key, &value)?;
        }
        Commands::Remote { command } => match command {
            RemoteCommands::Encrypt { value } => {
                commands::remote::call(&cli.api_url, "encrypt", vec![value]).await?;
            }
            RemoteCommands::Action { action, search } => {
                let mut args = vec![action];
                args.extend(search);
                commands::remote::call(&cli.api_url, "action", args).await?;
            }
            RemoteCommands::Rescan => {
                commands::remote::call(&cli.api_url, "rescan", Vec::new()).await?;
            }
        },
    }

    Ok(())
}
