//! Stats command implementation
//!
//! Runs the provider-stubbed discovery pipeline and prints test counts
//! without executing anything.

use crate::cli::OutputFormat;
use crate::commands::shared;
use crate::runtime::WalkingRuntime;
use anyhow::Result;
use proctor_core::logging::Log;
use proctor_core::runner::Runner;
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::instrument;

/// Execute the stats command
#[instrument(skip_all, fields(config = %config.display()))]
pub async fn execute(config: PathBuf, output_format: OutputFormat) -> Result<()> {
    let runner = Runner::new(
        Log::new(),
        &config,
        Value::Null,
        shared::builtin_registry(),
        Arc::new(WalkingRuntime::new()),
        None,
    );

    let stats = runner.get_test_stats().await?;

    match output_format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
        OutputFormat::Text => {
            println!("tests: {}", stats.test_count);
            if !stats.tests_excluded_by_tag.is_empty() {
                println!("excluded by tag:");
                for title in &stats.tests_excluded_by_tag {
                    println!("  - {}", title);
                }
            }
        }
    }

    Ok(())
}
