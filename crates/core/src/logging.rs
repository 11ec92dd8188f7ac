//! Logging and observability
//!
//! This module provides structured logging setup for the runner and the
//! [`Log`] handle that the runner exposes to provider factories and custom
//! test runners. It supports both traditional text-based logging and optional
//! JSON formatting, controlled at runtime via environment variables and CLI
//! flags (no feature flags).
//!
//! All logging output is directed to stderr to preserve stdout for command output.

use anyhow::Result;
use std::{io, sync::Once};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

static INIT: Once = Once::new();

/// Initialize the logging system with optional format specification
///
/// This function sets up tracing-subscriber with either JSON or text formatting
/// based on runtime configuration. It can be called multiple times safely -
/// subsequent calls will be no-ops.
///
/// ## Arguments
///
/// * `format` - Optional format specification string. Supports:
///   - `None` or `"text"` for human-readable text format
///   - `"json"` for structured JSON format
///
/// ## Environment Variables
///
/// * `PROCTOR_LOG_FORMAT` - Controls the log output format ("json" for JSON, any other value for text)
/// * `PROCTOR_LOG` - Controls the logging filter level
/// * `RUST_LOG` - Standard Rust logging environment variable (used as fallback)
pub fn init(format: Option<&str>) -> Result<()> {
    INIT.call_once(|| {
        let filter = create_env_filter();

        // Determine format from parameter or environment variable
        let env_format = std::env::var("PROCTOR_LOG_FORMAT").ok();
        let effective_format = format.or(env_format.as_deref()).unwrap_or("text");

        match effective_format {
            "json" => {
                tracing_subscriber::registry()
                    .with(
                        fmt::layer()
                            .json()
                            .with_target(true)
                            .with_writer(io::stderr),
                    )
                    .with(filter)
                    .init();
            }
            _ => {
                // Default to text format (including None, "text", or any other value)
                tracing_subscriber::registry()
                    .with(fmt::layer().with_target(true).with_writer(io::stderr))
                    .with(filter)
                    .init();
            }
        }

        tracing::debug!("Logging initialized with format: {}", effective_format);
    });

    Ok(())
}

/// Create an EnvFilter based on environment variables
fn create_env_filter() -> EnvFilter {
    if let Ok(proctor_log) = std::env::var("PROCTOR_LOG") {
        EnvFilter::try_new(&proctor_log).unwrap_or_else(|_| {
            tracing::warn!(
                "Invalid PROCTOR_LOG specification '{}', using default 'info'",
                proctor_log
            );
            EnvFilter::new("info")
        })
    } else {
        // Fall back to standard RUST_LOG or default (info)
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    }
}

/// Check if logging has been initialized
///
/// This is primarily useful for testing scenarios where you need to know
/// if the logging system has already been set up.
pub fn is_initialized() -> bool {
    INIT.is_completed()
}

/// Leveled log handle handed to provider factories and custom test runners
///
/// The runner registers a `log` core provider so that code executing inside
/// the dependency-injection context can emit structured output without
/// depending on the tracing macros directly. All events carry the `proctor`
/// target so they can be filtered independently of library internals.
#[derive(Debug, Clone, Default)]
pub struct Log;

impl Log {
    /// Create a new log handle
    pub fn new() -> Self {
        Self
    }

    /// Emit a trace-level message
    pub fn verbose(&self, message: impl AsRef<str>) {
        tracing::trace!(target: "proctor", "{}", message.as_ref());
    }

    /// Emit a debug-level message
    pub fn debug(&self, message: impl AsRef<str>) {
        tracing::debug!(target: "proctor", "{}", message.as_ref());
    }

    /// Emit an info-level message
    pub fn info(&self, message: impl AsRef<str>) {
        tracing::info!(target: "proctor", "{}", message.as_ref());
    }

    /// Emit a warning
    pub fn warning(&self, message: impl AsRef<str>) {
        tracing::warn!(target: "proctor", "{}", message.as_ref());
    }

    /// Emit an error-level message
    pub fn error(&self, message: impl AsRef<str>) {
        tracing::error!(target: "proctor", "{}", message.as_ref());
    }
}
