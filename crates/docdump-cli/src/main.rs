use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod commands;

#[derive(Parser)]
#[command(name = "docdump")]
#[command(about = "Document database backup and restore tool", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging (-v for debug, -vv for trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Copy the run's log to this file, in addition to the console
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Dump a database into a tree or an archive
    Backup {
        /// Path to the configuration file
        #[arg(short, long)]
        config: String,
    },

    /// Restore one collection from an archive
    Restore {
        /// Path to the configuration file
        #[arg(short, long)]
        config: String,
    },

    /// List archives in a dump root
    List {
        /// Path to the dump root
        #[arg(short, long)]
        path: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Priority: RUST_LOG env var > verbose flag > default (info)
    let level = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        EnvFilter::new(level)
    };

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    let run_log = match &cli.log_file {
        Some(path) => Some(commands::file_logger(path, level)?),
        None => None,
    };

    match cli.command {
        Commands::Backup { config } => {
            commands::backup::run(&config, run_log).await?;
        }
        Commands::Restore { config } => {
            commands::restore::run(&config, run_log).await?;
        }
        Commands::List { path } => {
            commands::list::run(&path).await?;
        }
    }

    Ok(())
}
