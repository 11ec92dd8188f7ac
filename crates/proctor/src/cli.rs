use crate::commands;
use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Log format options
#[derive(Debug, Clone, ValueEnum)]
pub enum LogFormat {
    /// Human-readable text format
    Text,
    /// JSON structured format
    Json,
}

impl LogFormat {
    fn as_str(&self) -> &'static str {
        match self {
            LogFormat::Text => "text",
            LogFormat::Json => "json",
        }
    }
}

/// Output format options
#[derive(Debug, Clone, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text format
    Text,
    /// JSON structured format
    Json,
}

/// Functional test runner
///
/// Resolves the providers a run declares, fires lifecycle phases, and drives
/// the configured suites through the test runtime.
#[derive(Debug, Parser)]
#[command(name = "proctor", version, about = "Functional test runner")]
pub struct Cli {
    /// Log output format
    #[arg(long, value_enum, global = true)]
    pub log_format: Option<LogFormat>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Execute the configured test run
    Run {
        /// Path to the run configuration file
        #[arg(long, short = 'c')]
        config: PathBuf,

        /// Only keep suites/tests carrying one of these tags
        #[arg(long = "include-tag", value_name = "TAG")]
        include_tag: Vec<String>,

        /// Drop suites/tests carrying one of these tags
        #[arg(long = "exclude-tag", value_name = "TAG")]
        exclude_tag: Vec<String>,

        /// Write the resolved test list to a report instead of executing
        #[arg(long)]
        dry_run: bool,

        /// Expected backing store version (e.g. 8.1.0)
        #[arg(long, value_name = "VERSION")]
        es_version: Option<String>,
    },

    /// Count tests without executing them
    Stats {
        /// Path to the run configuration file
        #[arg(long, short = 'c')]
        config: PathBuf,

        /// Output format
        #[arg(long, value_enum, default_value = "text")]
        output_format: OutputFormat,
    },
}

impl Cli {
    /// Initialize logging and dispatch to the selected command
    pub async fn dispatch(self) -> Result<()> {
        proctor_core::logging::init(self.log_format.as_ref().map(LogFormat::as_str))?;

        match self.command {
            Commands::Run {
                config,
                include_tag,
                exclude_tag,
                dry_run,
                es_version,
            } => {
                commands::run::execute(commands::run::RunArgs {
                    config,
                    include_tag,
                    exclude_tag,
                    dry_run,
                    es_version,
                })
                .await
            }
            Commands::Stats {
                config,
                output_format,
            } => commands::stats::execute(config, output_format).await,
        }
    }
}
