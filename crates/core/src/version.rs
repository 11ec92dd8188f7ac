//! Expected-version handling and validation
//!
//! The runner can pin the version of the backing datastore a test run expects.
//! [`EsVersion`] holds the expected version and owns the comparison predicate:
//! equality is deliberately lenient, comparing only major.minor.patch so that
//! pre-release/snapshot builds of the same version are accepted.
//!
//! [`validate_es_version`] performs the check against a live endpoint with
//! scoped-resource semantics: the client used for the check is released on
//! every exit path, and a release failure is never allowed to mask the
//! primary outcome.

use crate::errors::{ProctorError, Result, VersionError};
use crate::es_client::EsClient;
use semver::Version;
use std::fmt;
use tracing::{debug, instrument, warn};

/// Fallback expected version when none is configured
const DEFAULT_ES_VERSION: Version = Version::new(8, 1, 0);

/// Environment variable overriding the default expected version
const ES_VERSION_ENV: &str = "PROCTOR_ES_VERSION";

/// Expected version of the backing datastore
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EsVersion {
    version: Version,
}

impl EsVersion {
    /// Parse an expected version from a string
    ///
    /// Accepts the usual lenient forms: "8.1.0", "v8.1.0", "8.1", "8".
    pub fn new(value: &str) -> Result<Self> {
        parse_lenient(value)
            .map(|version| Self { version })
            .ok_or_else(|| {
                VersionError::Invalid {
                    version: value.to_string(),
                    message: "not a semantic version".to_string(),
                }
                .into()
            })
    }

    /// Default expected version: `PROCTOR_ES_VERSION` if set, else a
    /// compiled-in fallback
    pub fn get_default() -> Self {
        if let Ok(raw) = std::env::var(ES_VERSION_ENV) {
            match Self::new(&raw) {
                Ok(version) => return version,
                Err(error) => warn!(
                    "Ignoring invalid {} value '{}': {}",
                    ES_VERSION_ENV, raw, error
                ),
            }
        }
        Self {
            version: DEFAULT_ES_VERSION,
        }
    }

    /// Lenient equality against a reported version string
    ///
    /// True iff major, minor and patch match; pre-release and build metadata
    /// are ignored so snapshot builds of the expected version pass. An
    /// unparseable reported string never matches.
    pub fn eql(&self, reported: &str) -> bool {
        match parse_lenient(reported) {
            Some(other) => {
                self.version.major == other.major
                    && self.version.minor == other.minor
                    && self.version.patch == other.patch
            }
            None => false,
        }
    }
}

impl fmt::Display for EsVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}.{}",
            self.version.major, self.version.minor, self.version.patch
        )
    }
}

/// Parse a version string, tolerating a leading 'v' and partial versions
fn parse_lenient(value: &str) -> Option<Version> {
    let version_str = value.strip_prefix('v').unwrap_or(value);

    if let Ok(version) = Version::parse(version_str) {
        return Some(version);
    }

    // Pad major.minor and bare major forms
    if let Ok(version) = Version::parse(&format!("{}.0", version_str)) {
        return Some(version);
    }
    if let Ok(version) = Version::parse(&format!("{}.0.0", version_str)) {
        return Some(version);
    }

    None
}

/// Validate the backing datastore's version against the expected one
///
/// Fetches version info through `client`, releasing the client on every exit
/// path. On transport failure the error is wrapped with the underlying
/// cause; on mismatch the error names both versions.
#[instrument(skip_all, fields(expected = %expected))]
pub async fn validate_es_version(client: &dyn EsClient, expected: &EsVersion) -> Result<()> {
    let info = match client.info().await {
        Ok(info) => {
            release(client).await;
            info
        }
        Err(error) => {
            release(client).await;
            return Err(match error {
                already_wrapped @ ProctorError::Version(_) => already_wrapped,
                other => VersionError::Fetch {
                    message: other.to_string(),
                }
                .into(),
            });
        }
    };

    if !expected.eql(&info.version.number) {
        return Err(VersionError::Mismatch {
            reported: info.version.number,
            expected: expected.to_string(),
        }
        .into());
    }

    debug!(reported = %info.version.number, "backing store version matches");
    Ok(())
}

/// Close the version-check client, demoting any failure to a log line
async fn release(client: &dyn EsClient) {
    if let Err(error) = client.close().await {
        debug!(%error, "failed to close version-check client");
    }
}
