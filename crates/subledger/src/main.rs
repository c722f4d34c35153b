//! `subledger` - finds recurring subscriptions in a Gmail mailbox.
//!
//! Scans are incremental after the first run; `--full` starts over.

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod app;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "subledger", version, about = "Find recurring subscriptions in your mailbox")]
struct Cli {
    /// Mailbox the stored access token belongs to.
    #[arg(long, global = true, default_value = "me")]
    account: String,

    /// Configuration file. Defaults to `<config dir>/subledger/config.json`.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Scan the mailbox and list detected subscriptions.
    Scan {
        /// Ignore the sync checkpoint and cached messages.
        #[arg(long)]
        full: bool,

        /// Print the report as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Show the sync checkpoint and cache size.
    Status,

    /// Forget the sync checkpoint and cached messages.
    Reset,

    /// Manage the stored access token.
    Token {
        #[command(subcommand)]
        action: TokenAction,
    },
}

#[derive(Subcommand, Debug)]
enum TokenAction {
    /// Store an access token in the system keyring.
    Set {
        /// Bearer token for the Gmail API.
        token: String,
    },
    /// Remove the stored access token.
    Clear,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr so `--json` output stays machine-readable
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "subledger=info,subledger_core=info,subledger_gmail=info".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let paths = app::Paths::resolve(cli.config)?;
    info!("Using data directory {}", paths.data_dir().display());

    match cli.command {
        Command::Scan { full, json } => app::scan(&paths, &cli.account, full, json).await,
        Command::Status => app::status(&paths).await,
        Command::Reset => app::reset(&paths).await,
        Command::Token { action } => match action {
            TokenAction::Set { token } => app::set_token(&cli.account, &token),
            TokenAction::Clear => app::clear_token(&cli.account),
        },
    }
}
