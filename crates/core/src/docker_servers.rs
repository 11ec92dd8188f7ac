//! Declared docker servers
//!
//! The `dockerServers` config blob declares external servers a test run may
//! rely on. This core does not orchestrate their lifecycle; it parses the
//! declarations just enough to answer name/enabled queries and passes the
//! rest through untouched to whichever provider wants it.

use crate::logging::Log;
use indexmap::IndexMap;
use serde::Deserialize;
use serde_json::Value;

fn default_enabled() -> bool {
    true
}

/// One declared server
#[derive(Debug, Clone, Deserialize)]
pub struct DockerServerSpec {
    /// Disabled servers are declared but not expected to be running
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Image reference, if declared
    #[serde(default)]
    pub image: Option<String>,
    /// Host port, if declared
    #[serde(default)]
    pub port: Option<u16>,
    /// Everything else in the declaration, passed through untouched
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

/// Parsed `dockerServers` declarations, exposed as the `dockerServers`
/// core provider
#[derive(Debug, Clone, Default)]
pub struct DockerServers {
    servers: IndexMap<String, DockerServerSpec>,
}

impl DockerServers {
    /// Parse declarations from the config blob
    ///
    /// Entries that fail to deserialize are skipped with a warning rather
    /// than failing the run; the blob is owned by collaborators, not us.
    pub fn new(value: Option<&Value>, log: &Log) -> Self {
        let mut servers = IndexMap::new();
        if let Some(Value::Object(entries)) = value {
            for (name, declaration) in entries {
                match serde_json::from_value::<DockerServerSpec>(declaration.clone()) {
                    Ok(spec) => {
                        servers.insert(name.clone(), spec);
                    }
                    Err(error) => {
                        log.warning(format!(
                            "ignoring invalid dockerServers entry [{name}]: {error}"
                        ));
                    }
                }
            }
        }
        Self { servers }
    }

    /// Whether a server with this name was declared
    pub fn has(&self, name: &str) -> bool {
        self.servers.contains_key(name)
    }

    /// Whether a declared server is enabled
    pub fn is_enabled(&self, name: &str) -> bool {
        self.servers.get(name).map(|s| s.enabled).unwrap_or(false)
    }

    /// Declaration for a named server
    pub fn get(&self, name: &str) -> Option<&DockerServerSpec> {
        self.servers.get(name)
    }

    /// Declared server names, in declaration order
    pub fn names(&self) -> Vec<&str> {
        self.servers.keys().map(String::as_str).collect()
    }
}
