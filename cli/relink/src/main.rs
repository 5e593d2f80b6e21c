//! relink CLI: load module archives, inspect build order and visibility.

mod commands;
mod config;

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use config::RelinkConfig;

#[derive(Parser)]
#[command(name = "relink", version, about = "Dynamic module runtime with hot reload")]
struct Cli {
    /// Configuration file (default: ./relink.toml if present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load archive directories as one change-set and print the report
    Load {
        /// Archive directories
        #[arg(required = true)]
        dirs: Vec<PathBuf>,
        /// Symbol to call after loading, as MODULE:SYMBOL
        #[arg(long)]
        invoke: Option<String>,
        /// Argument for --invoke (JSON, or a plain string); repeatable
        #[arg(long = "arg")]
        args: Vec<String>,
    },
    /// Print build tiers and rejected modules without building
    Order {
        /// Archive directories
        #[arg(required = true)]
        dirs: Vec<PathBuf>,
    },
    /// Load archives, then list every symbol visible to one module
    Inspect {
        /// Archive directories
        #[arg(required = true)]
        dirs: Vec<PathBuf>,
        /// Module to inspect
        #[arg(long)]
        module: String,
    },
}

fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("relink=info")),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let result = run(cli);
    if let Err(e) = result {
        eprintln!("error: {e:#}");
        process::exit(1);
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let cwd = std::env::current_dir()?;
    let (config, path) = RelinkConfig::load(cli.config.as_deref(), &cwd)?;
    if let Some(path) = &path {
        tracing::debug!(config = %path.display(), "configuration loaded");
    }
    let loader = config.build_loader(&commands::host_symbols()?)?;
    let mut out = std::io::stdout().lock();

    match cli.command {
        Commands::Load { dirs, invoke, args } => {
            commands::load::run(&loader, &dirs, invoke.as_deref(), &args, &mut out)
        }
        Commands::Order { dirs } => commands::order::run(&loader, &dirs, &mut out),
        Commands::Inspect { dirs, module } => {
            commands::inspect::run(&loader, &dirs, &module, &mut out)
        }
    }
}
