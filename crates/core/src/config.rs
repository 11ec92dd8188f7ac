//! Configuration loading and access
//!
//! This module loads runner configuration files and exposes them through a
//! dotted-path accessor. Files are parsed with the json5 crate so the usual
//! JSONC conveniences (comments, trailing commas) found in tooling configs
//! are accepted.
//!
//! Overrides supplied by the embedder (CLI flags, programmatic callers) are
//! deep-merged on top of the file contents before the config is handed to the
//! runner: object values merge recursively, everything else is replaced by
//! the override.
//!
//! Keys recognized by the runner core:
//! - `testFiles` - suite manifest locations, resolved relative to the config file
//! - `testRunner` - name of a registered custom test runner
//! - `services`, `pageObjects` - names of registered providers to enable
//! - `servicesRequiredForTestAnalysis` - services exempt from stats-mode stubbing
//! - `suiteTags.include`, `suiteTags.exclude` - tag filters
//! - `runnerOpts.dryRun`, `runnerOpts.dryRunOutput` - dry-run report mode
//! - `dockerServers` - opaque server declarations passed through to providers
//! - `esUrl` - backing datastore endpoint used by version validation

use crate::errors::{ConfigError, Result};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::{debug, instrument};

/// Loaded runner configuration
///
/// A thin wrapper over the merged JSON document. All reads go through
/// [`Config::get`] and its typed convenience variants; absent keys are not an
/// error unless the caller uses [`Config::require_str`].
#[derive(Debug, Clone)]
pub struct Config {
    values: Value,
    dir: PathBuf,
}

impl Config {
    /// Load a configuration file and merge overrides on top
    ///
    /// ## Errors
    ///
    /// - `ConfigError::NotFound` if the file does not exist
    /// - `ConfigError::Parsing` if the file is not valid JSON5
    #[instrument(skip_all, fields(path = %path.display()))]
    pub fn load(path: &Path, overrides: Value) -> Result<Config> {
        if !path.exists() {
            return Err(ConfigError::NotFound {
                path: path.display().to_string(),
            }
            .into());
        }

        let raw = std::fs::read_to_string(path).map_err(ConfigError::Io)?;
        let mut values: Value = json5::from_str(&raw).map_err(|e| ConfigError::Parsing {
            message: e.to_string(),
        })?;

        if !values.is_object() {
            return Err(ConfigError::Validation {
                message: format!(
                    "expected a configuration object at the top level of {}",
                    path.display()
                ),
            }
            .into());
        }

        if !overrides.is_null() {
            debug!("Applying configuration overrides");
            deep_merge(&mut values, overrides);
        }

        let dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));

        Ok(Config { values, dir })
    }

    /// Build a config directly from a JSON value (primarily for tests)
    pub fn from_value(values: Value) -> Config {
        Config {
            values,
            dir: PathBuf::from("."),
        }
    }

    /// Directory containing the config file; relative paths resolve against it
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Look up a value by dotted path, e.g. `runnerOpts.dryRun`
    pub fn get(&self, path: &str) -> Option<&Value> {
        let mut current = &self.values;
        for segment in path.split('.') {
            current = current.as_object()?.get(segment)?;
        }
        Some(current)
    }

    /// String value at `path`, if present and a string
    pub fn get_str(&self, path: &str) -> Option<&str> {
        self.get(path).and_then(Value::as_str)
    }

    /// Boolean value at `path`; absent or non-boolean reads as false
    pub fn get_bool(&self, path: &str) -> bool {
        self.get(path).and_then(Value::as_bool).unwrap_or(false)
    }

    /// String-array value at `path`; absent reads as empty
    pub fn get_string_array(&self, path: &str) -> Vec<String> {
        self.get(path)
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// String value at `path`, required
    ///
    /// ## Errors
    ///
    /// `ConfigError::MissingKey` if the path is absent or not a string.
    pub fn require_str(&self, path: &str) -> Result<&str> {
        self.get_str(path).ok_or_else(|| {
            ConfigError::MissingKey {
                path: path.to_string(),
            }
            .into()
        })
    }

    /// Resolve a `testFiles` entry against the config file's directory
    pub fn resolve_path(&self, entry: &str) -> PathBuf {
        let candidate = Path::new(entry);
        if candidate.is_absolute() {
            candidate.to_path_buf()
        } else {
            self.dir.join(candidate)
        }
    }
}

/// Recursively merge `overlay` into `base`
///
/// Objects merge key-by-key; any other overlay value replaces the base value.
fn deep_merge(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base_map), Value::Object(overlay_map)) => {
            for (key, overlay_value) in overlay_map {
                match base_map.get_mut(&key) {
                    Some(base_value) => deep_merge(base_value, overlay_value),
                    None => {
                        base_map.insert(key, overlay_value);
                    }
                }
            }
        }
        (base_slot, overlay_value) => *base_slot = overlay_value,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_config(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_load_json5_with_comments() {
        let file = write_config(
            r#"{
                // suite manifests
                testFiles: ["suites/smoke.json5"],
                runnerOpts: { dryRun: false },
            }"#,
        );

        let config = Config::load(file.path(), Value::Null).unwrap();
        assert_eq!(
            config.get_string_array("testFiles"),
            vec!["suites/smoke.json5"]
        );
        assert!(!config.get_bool("runnerOpts.dryRun"));
    }

    #[test]
    fn test_load_missing_file() {
        let result = Config::load(Path::new("/definitely/not/here.json5"), Value::Null);
        assert!(matches!(
            result,
            Err(crate::errors::ProctorError::Config(
                ConfigError::NotFound { .. }
            ))
        ));
    }

    #[test]
    fn test_load_invalid_syntax() {
        let file = write_config("{ not json5 at all ::: }");
        let result = Config::load(file.path(), Value::Null);
        assert!(matches!(
            result,
            Err(crate::errors::ProctorError::Config(
                ConfigError::Parsing { .. }
            ))
        ));
    }

    #[test]
    fn test_dotted_path_access() {
        let config = Config::from_value(json!({
            "suiteTags": { "include": ["smoke"], "exclude": ["flaky"] },
            "esUrl": "http://localhost:9200"
        }));

        assert_eq!(config.get_string_array("suiteTags.include"), vec!["smoke"]);
        assert_eq!(config.get_string_array("suiteTags.exclude"), vec!["flaky"]);
        assert_eq!(config.get_str("esUrl"), Some("http://localhost:9200"));
        assert!(config.get("suiteTags.nope").is_none());
        assert!(config.get("missing.entirely").is_none());
    }

    #[test]
    fn test_overrides_deep_merge() {
        let file = write_config(
            r#"{
                testFiles: ["a.json5"],
                runnerOpts: { dryRun: false, dryRunOutput: "report.json" },
            }"#,
        );

        let config = Config::load(
            file.path(),
            json!({ "runnerOpts": { "dryRun": true }, "testRunner": "custom" }),
        )
        .unwrap();

        // Override scalar wins, sibling keys survive
        assert!(config.get_bool("runnerOpts.dryRun"));
        assert_eq!(
            config.get_str("runnerOpts.dryRunOutput"),
            Some("report.json")
        );
        assert_eq!(config.get_str("testRunner"), Some("custom"));
        assert_eq!(config.get_string_array("testFiles"), vec!["a.json5"]);
    }

    #[test]
    fn test_require_str() {
        let config = Config::from_value(json!({ "esUrl": "http://es:9200" }));
        assert_eq!(config.require_str("esUrl").unwrap(), "http://es:9200");
        assert!(matches!(
            config.require_str("testRunner"),
            Err(crate::errors::ProctorError::Config(
                ConfigError::MissingKey { .. }
            ))
        ));
    }

    #[test]
    fn test_resolve_path_relative_to_config_dir() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("config.json5");
        std::fs::write(&config_path, "{ testFiles: [] }").unwrap();

        let config = Config::load(&config_path, Value::Null).unwrap();
        assert_eq!(
            config.resolve_path("suites/a.json5"),
            dir.path().join("suites/a.json5")
        );
        assert_eq!(
            config.resolve_path("/abs/b.json5"),
            PathBuf::from("/abs/b.json5")
        );
    }
}
