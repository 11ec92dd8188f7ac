//! Run command implementation
//!
//! Builds a [`Runner`] from the CLI flags, executes it with the default
//! walking runtime, and maps a non-zero failure count to a dedicated error
//! type so `main` can translate it into exit code 1.

use crate::commands::shared;
use crate::runtime::WalkingRuntime;
use anyhow::Result;
use proctor_core::logging::Log;
use proctor_core::runner::Runner;
use proctor_core::version::EsVersion;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, instrument};

/// Arguments for the run command
#[derive(Debug, Clone)]
pub struct RunArgs {
    pub config: PathBuf,
    pub include_tag: Vec<String>,
    pub exclude_tag: Vec<String>,
    pub dry_run: bool,
    pub es_version: Option<String>,
}

/// Error carrying the failure count of a completed run
#[derive(Debug)]
pub struct TestFailures(pub u64);

impl fmt::Display for TestFailures {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} test(s) failed", self.0)
    }
}

impl std::error::Error for TestFailures {}

/// Execute the run command
#[instrument(skip(args))]
pub async fn execute(args: RunArgs) -> Result<()> {
    let overrides =
        shared::overrides_from_flags(&args.include_tag, &args.exclude_tag, args.dry_run);
    let es_version = args
        .es_version
        .as_deref()
        .map(EsVersion::new)
        .transpose()?;

    let runner = Runner::new(
        Log::new(),
        &args.config,
        overrides,
        shared::builtin_registry(),
        Arc::new(WalkingRuntime::new()),
        es_version,
    );

    let failures = runner.run().await?;
    if failures > 0 {
        return Err(TestFailures(failures).into());
    }

    info!("All tests passed");
    Ok(())
}
