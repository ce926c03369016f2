//! remedy — apply minimal safe upgrades for vulnerable dependencies.
//!
//! CLI front end: loads configuration, initializes tracing, wires the
//! production collaborators, and drives one remediation run.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use remedy_core::config::RemedyConfig;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

mod commands;

/// remedy — automated dependency-vulnerability remediation
#[derive(Parser, Debug)]
#[command(name = "remedy")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, default_value = "remedy.toml")]
    config: PathBuf,

    /// Project directory containing the manifest
    #[arg(long, default_value = ".")]
    project: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run one remediation pass
    Fix {
        /// Override the configured attempt limit
        #[arg(long)]
        limit: Option<u32>,

        /// Run the test script after each reinstall
        #[arg(long)]
        test: bool,

        /// Enable auto-merge on opened pull requests
        #[arg(long)]
        auto_merge: bool,
    },

    /// List the attempts a run would process, without side effects
    Plan {
        /// Emit JSON instead of a table
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_env("REMEDY_LOG")
        .unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let mut config = RemedyConfig::from_file(&cli.config)?;

    match cli.command {
        Commands::Fix {
            limit,
            test,
            auto_merge,
        } => {
            if let Some(limit) = limit {
                config.attempt_limit = limit;
            }
            config.run_tests |= test;
            config.auto_merge |= auto_merge;
            commands::fix::run(cli.project, config).await
        },
        Commands::Plan { json } => commands::plan::run(cli.project, config, json).await,
    }
}
