//! Error types and handling
//!
//! This module provides domain-specific error types for the test runner core.
//! The error taxonomy is structured with specific error enums for each domain
//! (Configuration, Provider, Lifecycle, etc.) that are then wrapped in the main
//! ProctorError enum for unified error handling.

use thiserror::Error;

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Configuration file parsing error
    #[error("Failed to parse configuration file: {message}")]
    Parsing { message: String },

    /// Configuration validation error
    #[error("Configuration validation error: {message}")]
    Validation { message: String },

    /// Required configuration key is absent
    #[error("Missing required configuration key: {path}")]
    MissingKey { path: String },

    /// Configuration file I/O error
    #[error("Failed to read configuration file")]
    Io(#[from] std::io::Error),

    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    NotFound { path: String },

    /// Neither test files nor a custom test runner were configured
    #[error("No tests defined.")]
    NoTestsDefined,
}

/// Provider registration and resolution errors
///
/// These variants are Clone because in-flight resolution results are memoized
/// and handed to every concurrent caller of the same provider.
#[derive(Error, Debug, Clone)]
pub enum ProviderError {
    /// Two providers of the same kind were registered under one name
    #[error("Duplicate {kind} provider registered under name [{name}]")]
    Duplicate { kind: String, name: String },

    /// A provider was requested that no spec declares
    #[error("Unknown {kind} provider [{name}]")]
    Unknown { kind: String, name: String },

    /// A provider factory was named in config but is absent from the registry
    #[error("Provider [{name}] is declared in config but not registered")]
    NotRegistered { name: String },

    /// Dependency cycle detected during resolution
    #[error("Circular dependency detected while resolving providers: {chain}")]
    Cycle { chain: String },

    /// A provider factory failed; identifies the failing provider
    #[error("Failed to resolve provider [{name}]: {message}")]
    Resolution { name: String, message: String },

    /// A provider needed for test analysis produced an asynchronous result
    #[error("Provider [{name}] returns a pending future so it can't be loaded during test analysis")]
    AnalysisRequiresSync { name: String },

    /// A resolved instance was requested as the wrong concrete type
    #[error("Provider [{name}] is not of the requested type")]
    TypeMismatch { name: String },
}

/// Lifecycle phase errors
#[derive(Error, Debug)]
pub enum LifecycleError {
    /// A subscribed handler failed; remaining handlers were aborted
    #[error("Lifecycle phase [{phase}] handler failed")]
    PhaseFailed {
        phase: String,
        #[source]
        source: Box<ProctorError>,
    },

    /// A phase was triggered while a trigger of the same phase was in progress
    #[error("Lifecycle phase [{phase}] triggered while already running")]
    Reentrant { phase: String },

    /// A singular phase was triggered a second time
    #[error("Lifecycle phase [{phase}] can only be triggered once")]
    SingularRetriggered { phase: String },
}

/// Version validation errors
#[derive(Error, Debug)]
pub enum VersionError {
    /// The expected version string could not be parsed
    #[error("Invalid version [{version}]: {message}")]
    Invalid { version: String, message: String },

    /// Fetching the remote version info failed
    #[error("Attempted to fetch the backing store version info but the request failed: {message}")]
    Fetch { message: String },

    /// The remote reports a version that does not match the expected one
    #[error("Backing store reports version \"{reported}\" which doesn't match the expected version \"{expected}\"")]
    Mismatch { reported: String, expected: String },
}

/// Suite manifest errors
#[derive(Error, Debug)]
pub enum SuiteError {
    /// Suite manifest parsing error
    #[error("Failed to parse suite manifest {path}: {message}")]
    Parsing { path: String, message: String },

    /// Suite manifest file not found
    #[error("Suite manifest not found: {path}")]
    NotFound { path: String },

    /// Suite manifest file I/O error
    #[error("Failed to read suite manifest")]
    Io(#[from] std::io::Error),

    /// Dry-run report could not be written
    #[error("Failed to write dry-run report to {path}: {message}")]
    Report { path: String, message: String },
}

/// Main error enum wrapping all domain-specific errors
#[derive(Error, Debug)]
pub enum ProctorError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Provider registration/resolution errors
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    /// Lifecycle phase errors
    #[error("Lifecycle error: {0}")]
    Lifecycle(#[from] LifecycleError),

    /// Version validation errors
    #[error("Version error: {0}")]
    Version(#[from] VersionError),

    /// Suite manifest errors
    #[error("Suite error: {0}")]
    Suite(#[from] SuiteError),

    /// Test runtime adapter errors
    #[error("Test runtime error: {0}")]
    Runtime(String),
}

/// Convenience type alias for Results with ProctorError
pub type Result<T> = std::result::Result<T, ProctorError>;
