//! Shopkit Demo CLI
//!
//! Command-line interface for verifying receipts and replaying scripted
//! store sessions against Shopkit.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;
mod scenario;
mod ui;

#[derive(Parser)]
#[command(name = "shopkit-demo")]
#[command(about = "Shopkit Demo CLI - Verify receipts and simulate store sessions", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Custom storage directory
    #[arg(long, global = true, env = "SHOPKIT_DEMO_DIR")]
    storage_dir: Option<PathBuf>,

    /// Store configuration file (JSON)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Verify a receipt signature
    Verify {
        /// Base64 public key, or @path to a file containing it
        #[arg(short, long)]
        key: String,

        /// File with the signed data, or - for stdin
        #[arg(short, long)]
        data: String,

        /// Base64 signature
        #[arg(short, long)]
        signature: String,
    },

    /// List the items of a catalog file
    Catalog {
        /// Catalog file (JSON array of items)
        #[arg(short, long)]
        catalog: PathBuf,

        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Replay a scripted store session
    Simulate {
        /// Catalog file (JSON array of items)
        #[arg(short, long)]
        catalog: PathBuf,

        /// Scenario file (JSON)
        #[arg(short, long)]
        scenario: PathBuf,

        /// Print the final report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show persisted store flags
    Status {
        /// Custom secret the flags were written with
        #[arg(long, env = "SHOPKIT_DEMO_SECRET")]
        secret: Option<String>,
    },

    /// Clear persisted store flags
    Reset {
        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    if cli.verbose {
        tracing_subscriber::fmt()
            .with_env_filter("shopkit_demo_cli=debug,shopkit_lib=debug")
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter("shopkit_demo_cli=info,shopkit_lib=warn")
            .with_writer(std::io::stderr)
            .init();
    }
    ui::configure_colors();

    // Setup storage directory
    let storage_dir = cli.storage_dir.unwrap_or_else(|| {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("shopkit-demo")
    });

    // Dispatch commands
    match cli.command {
        Commands::Verify {
            key,
            data,
            signature,
        } => {
            commands::verify::run(&key, &data, &signature, cli.verbose).await?;
        }
        Commands::Catalog { catalog, json } => {
            commands::catalog::run(&catalog, json, cli.verbose).await?;
        }
        Commands::Simulate {
            catalog,
            scenario,
            json,
        } => {
            commands::simulate::run(
                &storage_dir,
                cli.config.as_deref(),
                &catalog,
                &scenario,
                json,
                cli.verbose,
            )
            .await?;
        }
        Commands::Status { secret } => {
            commands::status::run(&storage_dir, secret.as_deref(), cli.verbose).await?;
        }
        Commands::Reset { yes } => {
            commands::reset::run(&storage_dir, yes, cli.verbose).await?;
        }
    }

    Ok(())
}
