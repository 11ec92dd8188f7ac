//! Core library for the proctor functional test runner
//!
//! This crate contains the run orchestration engine: provider
//! dependency-injection, lifecycle phase broadcasting, suite manifest
//! loading, version validation, logging, and error handling.

pub mod config;
pub mod docker_servers;
pub mod errors;
pub mod es_client;
pub mod lifecycle;
pub mod logging;
pub mod metadata;
pub mod providers;
pub mod runner;
pub mod suite;
pub mod suite_tracker;
pub mod version;

// Re-export IndexMap for use by dependent crates (preserves insertion order for ordered maps)
pub use indexmap::IndexMap;

/// Get the version of the core library
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
