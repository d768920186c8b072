//! cronfleet: keeps exactly one active scheduler across a fleet.
//!
//! # Usage
//!
//! ```text
//! cronfleet activate                 # boot edge and the per-minute listener job
//! cronfleet deactivate               # opt this instance out (maintenance)
//! cronfleet status --format json     # lease holder and fleet ledger
//! cronfleet watch                    # tick every poll interval until Ctrl-C
//! cronfleet render --role runner     # print the table a role installs
//! ```

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand, ValueEnum};
use cronfleet_core::Role;

mod commands;
mod context;

#[derive(Parser)]
#[command(
    name = "cronfleet",
    about = "cronfleet: lease-based active scheduler election",
    version,
    propagate_version = true
)]
struct Cli {
    #[command(flatten)]
    global: GlobalOpts,

    #[command(subcommand)]
    command: Commands,
}

/// Flags shared by every subcommand.
#[derive(clap::Args, Debug, Clone)]
pub struct GlobalOpts {
    /// Configuration file [default: /etc/cronfleet/cronfleet.toml]
    #[arg(long, global = true, env = "CRONFLEET_CONFIG")]
    pub config: Option<PathBuf>,

    /// Instance address; overrides [instance].address.
    #[arg(long, global = true, env = "CRONFLEET_ADDRESS")]
    pub address: Option<String>,

    /// Run against a snapshot of the store and print the table instead
    /// of installing it. Nothing is written.
    #[arg(long, global = true)]
    pub dry_run: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one claim-or-renew tick.
    Activate,
    /// Decommission this instance: install the placeholder table.
    Deactivate,
    /// Show the lease holder and the fleet status ledger.
    Status {
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },
    /// Tick every poll interval until interrupted.
    Watch,
    /// Print the table a role would install.
    Render {
        /// listener, runner or deactivated
        #[arg(short, long)]
        role: Role,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,cronfleet=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Activate => commands::activate::run(&cli.global),
        Commands::Deactivate => commands::deactivate::run(&cli.global),
        Commands::Status { format } => commands::status::run(&cli.global, format),
        Commands::Watch => commands::watch::run(&cli.global).await,
        Commands::Render { role } => commands::render::run(&cli.global, role),
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            tracing::error!(error = %e, "cronfleet failed");
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}
