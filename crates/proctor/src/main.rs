use anyhow::Result;
use clap::Parser;

mod cli;
mod commands;
mod runtime;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments
    let parsed = cli::Cli::parse();

    // Dispatch to CLI handler and handle special exit codes
    match parsed.dispatch().await {
        Ok(()) => Ok(()),
        Err(err) => {
            // Test failures exit with code 1 after a short summary rather
            // than a full error report
            if let Some(failures) = err.downcast_ref::<commands::run::TestFailures>() {
                eprintln!("Error: {}", failures);
                std::process::exit(1);
            }

            // For all other errors, return them normally
            Err(err)
        }
    }
}
