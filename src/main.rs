use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use bulkgeo::cli::lookup::{ExportFormat, LookupArgs};

#[derive(Parser)]
#[command(name = "bulkgeo")]
#[command(about = "Quota-gated bulk geocoding service", long_about = None)]
struct Cli {
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP service (quota endpoint + gated geocoding proxy)
    Serve,
    /// Geocode a list of queries from a file or stdin
    Lookup {
        /// File with one query per line; reads stdin when omitted
        #[arg(long)]
        input: Option<PathBuf>,
        /// Lookups issued concurrently per batch (1-100)
        #[arg(long)]
        batch_size: Option<usize>,
        /// Pause between batches in milliseconds (0-10000)
        #[arg(long)]
        delay_ms: Option<u64>,
        #[arg(long, value_enum, default_value = "csv")]
        format: ExportFormat,
        /// Write the export here instead of stdout
        #[arg(long)]
        output: Option<PathBuf>,
        /// Quota identity to charge; defaults to the machine hostname
        #[arg(long)]
        identity: Option<String>,
    },
    /// Inspect or reset quota records
    Quota {
        #[command(subcommand)]
        action: QuotaAction,
    },
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum QuotaAction {
    Show {
        #[arg(long)]
        identity: Option<String>,
    },
    Clear {
        #[arg(long)]
        identity: Option<String>,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    Init {
        #[arg(long)]
        stdout: bool,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing subscriber
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "bulkgeo=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    let config_path = bulkgeo::config::resolve_config_path(cli.config.as_deref());

    match cli.command {
        Some(Commands::Serve) | None => {
            // Default behavior is to serve
            bulkgeo::cli::run::run(config_path).await?;
        }
        Some(Commands::Lookup {
            input,
            batch_size,
            delay_ms,
            format,
            output,
            identity,
        }) => {
            bulkgeo::cli::lookup::run(
                config_path,
                LookupArgs {
                    input,
                    batch_size,
                    delay_ms,
                    format,
                    output,
                    identity,
                },
            )
            .await?;
        }
        Some(Commands::Quota { action }) => match action {
            QuotaAction::Show { identity } => {
                bulkgeo::cli::quota::show(config_path, identity).await?;
            }
            QuotaAction::Clear { identity } => {
                bulkgeo::cli::quota::clear(config_path, identity).await?;
            }
        },
        Some(Commands::Config { action }) => match action {
            ConfigAction::Init { stdout } => {
                bulkgeo::cli::config::init(stdout)?;
            }
        },
    }

    Ok(())
}
