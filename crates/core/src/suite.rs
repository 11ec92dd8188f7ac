//! Suite tree model, manifest loading and tag filtering
//!
//! Test suites are declared in JSON5 suite manifests listed under the
//! config's `testFiles`. A manifest is a [`Suite`]: a named node carrying
//! tags, nested suites and leaf [`TestCase`]s. The runner builds one root
//! suite from all manifests, applies tag include/exclude filtering, and
//! either hands the tree to a [`TestRuntime`] for execution or, in dry-run
//! mode, serializes the resolved test list to a report file.
//!
//! Tags are inherited: a test's effective tag set is its own tags plus those
//! of every ancestor suite.

use crate::config::Config;
use crate::errors::{Result, SuiteError};
use crate::lifecycle::Lifecycle;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, instrument};

/// A suite node: nested suites plus leaf tests
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Suite {
    /// Suite name; empty for the synthetic root
    #[serde(default)]
    pub name: String,
    /// Tags applying to everything beneath this node
    #[serde(default)]
    pub tags: Vec<String>,
    /// Nested suites
    #[serde(default)]
    pub suites: Vec<Suite>,
    /// Leaf tests
    #[serde(default)]
    pub tests: Vec<TestCase>,
}

/// A leaf test declaration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestCase {
    /// Test title, unique within its suite by convention
    pub title: String,
    /// Tags specific to this test
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Result of building the suite tree from config
#[derive(Debug, Clone)]
pub struct SuiteBuild {
    /// Root suite containing one child per manifest file
    pub suite: Suite,
    /// Full titles of tests removed by the tag filter
    pub tests_excluded_by_tag: Vec<String>,
}

/// Adapter that turns a populated suite tree into pass/fail outcomes
///
/// The engine is agnostic of how tests actually execute; an implementation
/// receives the filtered tree plus the lifecycle so it can fire the
/// per-suite and per-test phases, and reports back a failure count.
#[async_trait]
pub trait TestRuntime: Send + Sync {
    /// Execute the suite tree, returning the number of failed tests
    async fn execute(&self, suite: &Suite, lifecycle: &Lifecycle) -> Result<u64>;
}

/// Count leaf tests recursively across all nested suites
pub fn count_tests(suite: &Suite) -> usize {
    suite
        .suites
        .iter()
        .map(count_tests)
        .sum::<usize>()
        + suite.tests.len()
}

/// Load a single suite manifest
#[instrument(skip_all, fields(path = %path.display()))]
pub fn load_suite_file(path: &Path) -> Result<Suite> {
    if !path.exists() {
        return Err(SuiteError::NotFound {
            path: path.display().to_string(),
        }
        .into());
    }

    let raw = std::fs::read_to_string(path).map_err(SuiteError::Io)?;
    let suite: Suite = json5::from_str(&raw).map_err(|e| SuiteError::Parsing {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;
    debug!(tests = count_tests(&suite), "loaded suite manifest");
    Ok(suite)
}

/// Build the root suite from the config's `testFiles` and apply tag filters
pub fn build_suite(config: &Config) -> Result<SuiteBuild> {
    let mut root = Suite::default();
    for entry in config.get_string_array("testFiles") {
        let path = config.resolve_path(&entry);
        root.suites.push(load_suite_file(&path)?);
    }

    let include = config.get_string_array("suiteTags.include");
    let exclude = config.get_string_array("suiteTags.exclude");
    let tests_excluded_by_tag = apply_tag_filter(&mut root, &include, &exclude);

    Ok(SuiteBuild {
        suite: root,
        tests_excluded_by_tag,
    })
}

/// Remove tests not matching the tag filters, returning their full titles
///
/// A test is excluded if any effective tag is in `exclude`, or if `include`
/// is non-empty and no effective tag is in it.
pub fn apply_tag_filter(suite: &mut Suite, include: &[String], exclude: &[String]) -> Vec<String> {
    let mut excluded = Vec::new();
    filter_node(suite, "", &[], include, exclude, &mut excluded);
    excluded
}

fn filter_node(
    suite: &mut Suite,
    prefix: &str,
    inherited: &[String],
    include: &[String],
    exclude: &[String],
    excluded: &mut Vec<String>,
) {
    let full_name = join_title(prefix, &suite.name);
    let mut tags = inherited.to_vec();
    tags.extend(suite.tags.iter().cloned());

    suite.tests.retain(|test| {
        let mut effective = tags.clone();
        effective.extend(test.tags.iter().cloned());
        if is_excluded(&effective, include, exclude) {
            excluded.push(join_title(&full_name, &test.title));
            false
        } else {
            true
        }
    });

    for child in &mut suite.suites {
        filter_node(child, &full_name, &tags, include, exclude, excluded);
    }
}

fn is_excluded(tags: &[String], include: &[String], exclude: &[String]) -> bool {
    if tags.iter().any(|tag| exclude.contains(tag)) {
        return true;
    }
    if !include.is_empty() && !tags.iter().any(|tag| include.contains(tag)) {
        return true;
    }
    false
}

fn join_title(prefix: &str, name: &str) -> String {
    match (prefix.is_empty(), name.is_empty()) {
        (true, _) => name.to_string(),
        (_, true) => prefix.to_string(),
        _ => format!("{} {}", prefix, name),
    }
}

/// Full titles of every test remaining in the tree, in declaration order
pub fn full_titles(suite: &Suite) -> Vec<String> {
    let mut titles = Vec::new();
    collect_titles(suite, "", &mut titles);
    titles
}

fn collect_titles(suite: &Suite, prefix: &str, titles: &mut Vec<String>) {
    let full_name = join_title(prefix, &suite.name);
    for test in &suite.tests {
        titles.push(join_title(&full_name, &test.title));
    }
    for child in &suite.suites {
        collect_titles(child, &full_name, titles);
    }
}

/// Serialized shape of the dry-run report
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DryRunReport {
    pub test_count: usize,
    pub tests: Vec<String>,
    pub tests_excluded_by_tag: Vec<String>,
}

/// Write the dry-run report for a built suite
#[instrument(skip_all, fields(path = %path.display()))]
pub fn write_dry_run_report(build: &SuiteBuild, path: &Path) -> Result<()> {
    let report = DryRunReport {
        test_count: count_tests(&build.suite),
        tests: full_titles(&build.suite),
        tests_excluded_by_tag: build.tests_excluded_by_tag.clone(),
    };

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(SuiteError::Io)?;
    }
    let contents = serde_json::to_string_pretty(&report).map_err(|e| SuiteError::Report {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;
    std::fs::write(path, contents).map_err(SuiteError::Io)?;
    Ok(())
}
