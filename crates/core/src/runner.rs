//! Run orchestration
//!
//! [`Runner`] owns one [`Lifecycle`] and one provider universe, and drives
//! the two-phase execution contract: a run body (config load, provider
//! resolution, suite construction, execution) followed by an always-invoked
//! [`Runner::close`] that triggers the `cleanup` phase exactly once.
//!
//! Error precedence across the two phases is asymmetric by design: a run
//! body failure is the one surfaced to the caller even when teardown also
//! fails (the teardown failure is only logged), while a teardown failure
//! after a successful body is promoted to the run's result. Cleanup noise
//! must never hide the real cause.

use crate::config::Config;
use crate::docker_servers::DockerServers;
use crate::errors::{ConfigError, ProviderError, Result};
use crate::es_client::HttpEsClient;
use crate::lifecycle::Lifecycle;
use crate::logging::Log;
use crate::metadata::TestMetadata;
use crate::providers::{ProviderCollection, ProviderKind, ProviderRegistry, ProviderSpec};
use crate::suite::{self, TestRuntime};
use crate::suite_tracker::SuiteTracker;
use crate::version::{self, EsVersion};
use serde::Serialize;
use serde_json::Value;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{error, instrument};

/// Result of [`Runner::get_test_stats`]
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TestStats {
    /// Leaf tests remaining after tag filtering, across all nested suites
    pub test_count: usize,
    /// Full titles of tests the tag filter excluded
    pub tests_excluded_by_tag: Vec<String>,
}

/// The test run orchestrator
///
/// One instance drives one logical run: construct it, call [`Runner::run`]
/// or [`Runner::get_test_stats`], and the instance is spent. `close` is
/// always invoked internally, regardless of how the run body ends; callers
/// may also invoke it directly to force teardown.
pub struct Runner {
    log: Log,
    lifecycle: Arc<Lifecycle>,
    test_metadata: TestMetadata,
    config_file: PathBuf,
    config_overrides: Value,
    registry: ProviderRegistry,
    runtime: Arc<dyn TestRuntime>,
    es_version: EsVersion,
    closed: AtomicBool,
}

impl Runner {
    /// Create a runner for one run
    ///
    /// `config_overrides` is deep-merged over the loaded config file.
    /// `es_version` defaults to [`EsVersion::get_default`] when absent.
    pub fn new(
        log: Log,
        config_file: impl Into<PathBuf>,
        config_overrides: Value,
        registry: ProviderRegistry,
        runtime: Arc<dyn TestRuntime>,
        es_version: Option<EsVersion>,
    ) -> Self {
        let lifecycle = Arc::new(Lifecycle::new());
        let test_metadata = TestMetadata::new(&lifecycle);
        Self {
            log,
            lifecycle,
            test_metadata,
            config_file: config_file.into(),
            config_overrides,
            registry,
            runtime,
            es_version: es_version.unwrap_or_else(EsVersion::get_default),
            closed: AtomicBool::new(false),
        }
    }

    /// The lifecycle owned by this runner
    pub fn lifecycle(&self) -> &Arc<Lifecycle> {
        &self.lifecycle
    }

    /// Failure records accumulated during the run
    pub fn test_metadata(&self) -> &TestMetadata {
        &self.test_metadata
    }

    /// Execute the configured run, returning the number of failed tests
    #[instrument(skip_all, fields(config = %self.config_file.display()))]
    pub async fn run(&self) -> Result<u64> {
        let run_result = self.run_body().await;
        self.finish(run_result).await
    }

    /// Build the suite tree without executing and report test counts
    #[instrument(skip_all, fields(config = %self.config_file.display()))]
    pub async fn get_test_stats(&self) -> Result<TestStats> {
        let run_result = self.stats_body().await;
        self.finish(run_result).await
    }

    /// Force teardown; idempotent
    ///
    /// The closed flag is set before any teardown work so re-entrant calls
    /// short-circuit immediately; the `cleanup` phase fires exactly once.
    pub async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.lifecycle.cleanup.trigger(&()).await
    }

    /// Combine the run body result with the always-attempted close
    async fn finish<T>(&self, run_result: Result<T>) -> Result<T> {
        let close_result = self.close().await;
        match (run_result, close_result) {
            (Ok(value), Ok(())) => Ok(value),
            (Ok(_), Err(close_error)) => Err(close_error),
            (Err(run_error), Ok(())) => Err(run_error),
            (Err(run_error), Err(close_error)) => {
                // The run failure is the diagnosable cause; teardown noise is demoted
                error!("failed to close test runner: {close_error}");
                Err(run_error)
            }
        }
    }

    /// Load config and assemble the core providers bound to runner state
    fn load_config_and_core(&self) -> Result<(Arc<Config>, Vec<ProviderSpec>)> {
        let config = Arc::new(Config::load(
            &self.config_file,
            self.config_overrides.clone(),
        )?);
        self.log.info("Config loaded");

        if config.get_string_array("testFiles").is_empty()
            && config.get_str("testRunner").is_none()
        {
            return Err(ConfigError::NoTestsDefined.into());
        }

        let docker_servers = Arc::new(DockerServers::new(config.get("dockerServers"), &self.log));

        let core = vec![
            ProviderSpec::from_value(ProviderKind::Service, "lifecycle", self.lifecycle.clone()),
            ProviderSpec::from_value(ProviderKind::Service, "log", Arc::new(self.log.clone())),
            ProviderSpec::from_value(
                ProviderKind::Service,
                "testMetadata",
                Arc::new(self.test_metadata.clone()),
            ),
            ProviderSpec::from_value(ProviderKind::Service, "config", config.clone()),
            ProviderSpec::from_value(ProviderKind::Service, "dockerServers", docker_servers),
            ProviderSpec::from_value(
                ProviderKind::Service,
                "esVersion",
                Arc::new(self.es_version.clone()),
            ),
        ];

        Ok((config, core))
    }

    async fn run_body(&self) -> Result<u64> {
        let (config, core_providers) = self.load_config_and_core()?;
        let _tracker = SuiteTracker::start_tracking(&self.lifecycle);

        let mut specs = core_providers;
        specs.extend(self.registry.specs(
            ProviderKind::Service,
            &config.get_string_array("services"),
        )?);
        specs.extend(self.registry.specs(
            ProviderKind::PageObject,
            &config.get_string_array("pageObjects"),
        )?);
        let providers = ProviderCollection::new(self.log.clone(), specs)?;

        if providers.has_service("es") {
            let client = HttpEsClient::from_config(&config);
            version::validate_es_version(&client, &self.es_version).await?;
        }

        providers.load_all().await?;

        if let Some(runner_name) = config.get_str("testRunner") {
            self.log
                .warning("custom test runner defined, ignoring all suite and tag filtering options");
            let runner_fn =
                self.registry
                    .runner(runner_name)
                    .ok_or_else(|| ProviderError::NotRegistered {
                        name: runner_name.to_string(),
                    })?;
            return providers.invoke_provider_fn(|ctx| runner_fn(ctx)).await;
        }

        let build = suite::build_suite(&config)?;

        self.lifecycle.before_tests.trigger(&build.suite).await?;

        if config.get_bool("runnerOpts.dryRun") {
            let target = config
                .get_str("runnerOpts.dryRunOutput")
                .map(|entry| config.resolve_path(entry))
                .unwrap_or_else(|| config.dir().join("dry-run-report.json"));
            suite::write_dry_run_report(&build, &target)?;
            self.log
                .info(format!("Dry run results stored in {}", target.display()));
            return Ok(0);
        }

        self.log.info("Starting tests");
        self.runtime.execute(&build.suite, &self.lifecycle).await
    }

    async fn stats_body(&self) -> Result<TestStats> {
        let (config, core_providers) = self.load_config_and_core()?;

        if config.get_str("testRunner").is_some() {
            return Err(ConfigError::Validation {
                message: "Unable to get test stats for config that uses a custom test runner"
                    .to_string(),
            }
            .into());
        }

        // Config-declared providers are replaced by stubs whose factories
        // never complete, so suite discovery can proceed without any of them
        // resolving to a real value. Providers explicitly required for
        // analysis keep their factory but must produce it without suspending.
        let required = config.get_string_array("servicesRequiredForTestAnalysis");
        let services: Vec<ProviderSpec> = self
            .registry
            .specs(
                ProviderKind::Service,
                &config.get_string_array("services"),
            )?
            .into_iter()
            .map(|spec| {
                if required.contains(&spec.name) {
                    spec.sync_checked()
                } else {
                    spec.stubbed()
                }
            })
            .collect();
        let page_objects: Vec<ProviderSpec> = self
            .registry
            .specs(
                ProviderKind::PageObject,
                &config.get_string_array("pageObjects"),
            )?
            .into_iter()
            .map(ProviderSpec::stubbed)
            .collect();

        let mut specs = core_providers;
        specs.extend(services);
        specs.extend(page_objects);
        // Constructed to validate the declarations (duplicates, unregistered
        // names) exactly the way a real run would
        let _providers = ProviderCollection::new(self.log.clone(), specs)?;

        let build = suite::build_suite(&config)?;

        Ok(TestStats {
            test_count: suite::count_tests(&build.suite),
            tests_excluded_by_tag: build.tests_excluded_by_tag,
        })
    }
}

impl std::fmt::Debug for Runner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runner")
            .field("config_file", &self.config_file)
            .field("es_version", &self.es_version)
            .field("closed", &self.closed.load(Ordering::SeqCst))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::{ProctorError, ProviderError, VersionError};
    use crate::suite::Suite;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;
    use tempfile::TempDir;

    struct StubRuntime {
        failures: u64,
        executions: Arc<AtomicUsize>,
    }

    impl StubRuntime {
        fn passing() -> (Arc<dyn TestRuntime>, Arc<AtomicUsize>) {
            let executions = Arc::new(AtomicUsize::new(0));
            (
                Arc::new(StubRuntime {
                    failures: 0,
                    executions: executions.clone(),
                }),
                executions,
            )
        }

        fn failing(failures: u64) -> Arc<dyn TestRuntime> {
            Arc::new(StubRuntime {
                failures,
                executions: Arc::new(AtomicUsize::new(0)),
            })
        }
    }

    #[async_trait]
    impl TestRuntime for StubRuntime {
        async fn execute(&self, _suite: &Suite, _lifecycle: &Lifecycle) -> Result<u64> {
            self.executions.fetch_add(1, Ordering::SeqCst);
            Ok(self.failures)
        }
    }

    /// Workspace with two manifests (3 + 2 tests) and a config naming them
    fn workspace(extra_config: Value) -> (TempDir, PathBuf) {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("a.json5"),
            r#"{
                name: "a",
                tests: [
                    { title: "one" },
                    { title: "two", tags: ["slow"] },
                    { title: "three" },
                ],
            }"#,
        )
        .unwrap();
        std::fs::write(
            dir.path().join("b.json5"),
            r#"{ name: "b", tests: [{ title: "four" }, { title: "five" }] }"#,
        )
        .unwrap();

        let mut config = json!({ "testFiles": ["a.json5", "b.json5"] });
        if let (Some(base), Value::Object(extra)) = (config.as_object_mut(), extra_config) {
            for (key, value) in extra {
                base.insert(key, value);
            }
        }
        let config_path = dir.path().join("config.json5");
        std::fs::write(&config_path, serde_json::to_string(&config).unwrap()).unwrap();
        (dir, config_path)
    }

    fn runner_for(config_path: &PathBuf, runtime: Arc<dyn TestRuntime>) -> Runner {
        Runner::new(
            Log::new(),
            config_path,
            Value::Null,
            ProviderRegistry::new(),
            runtime,
            Some(EsVersion::new("8.1.0").unwrap()),
        )
    }

    fn cleanup_counter(runner: &Runner) -> Arc<AtomicUsize> {
        let counter = Arc::new(AtomicUsize::new(0));
        let c = counter.clone();
        runner.lifecycle().cleanup.subscribe_fn(move |_| {
            c.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        counter
    }

    #[tokio::test]
    async fn test_run_returns_runtime_result_and_cleans_up() {
        let (_dir, config_path) = workspace(json!({}));
        let (runtime, executions) = StubRuntime::passing();
        let runner = runner_for(&config_path, runtime);
        let cleanups = cleanup_counter(&runner);

        let failures = runner.run().await.unwrap();
        assert_eq!(failures, 0);
        assert_eq!(executions.load(Ordering::SeqCst), 1);
        assert_eq!(cleanups.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_run_propagates_failure_count() {
        let (_dir, config_path) = workspace(json!({}));
        let runner = runner_for(&config_path, StubRuntime::failing(3));
        assert_eq!(runner.run().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_no_tests_defined_fails_and_still_closes() {
        let dir = TempDir::new().unwrap();
        let config_path = dir.path().join("config.json5");
        std::fs::write(&config_path, "{}").unwrap();

        let (runtime, executions) = StubRuntime::passing();
        let runner = runner_for(&config_path, runtime);
        let cleanups = cleanup_counter(&runner);

        let error = runner.run().await.unwrap_err();
        assert!(matches!(
            error,
            ProctorError::Config(ConfigError::NoTestsDefined)
        ));
        assert_eq!(executions.load(Ordering::SeqCst), 0);
        assert_eq!(cleanups.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let (_dir, config_path) = workspace(json!({}));
        let (runtime, _) = StubRuntime::passing();
        let runner = runner_for(&config_path, runtime);
        let cleanups = cleanup_counter(&runner);

        runner.close().await.unwrap();
        runner.close().await.unwrap();
        runner.close().await.unwrap();
        assert_eq!(cleanups.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_run_body_error_wins_over_close_error() {
        let dir = TempDir::new().unwrap();
        let config_path = dir.path().join("config.json5");
        std::fs::write(&config_path, "{}").unwrap();

        let (runtime, _) = StubRuntime::passing();
        let runner = runner_for(&config_path, runtime);
        runner.lifecycle().cleanup.subscribe_fn(|_| {
            Err(ProctorError::Runtime("cleanup exploded".to_string()))
        });

        // Run body fails with NoTestsDefined AND cleanup fails; the body
        // error must surface
        let error = runner.run().await.unwrap_err();
        assert!(matches!(
            error,
            ProctorError::Config(ConfigError::NoTestsDefined)
        ));
    }

    #[tokio::test]
    async fn test_close_error_surfaces_after_successful_body() {
        let (_dir, config_path) = workspace(json!({}));
        let (runtime, _) = StubRuntime::passing();
        let runner = runner_for(&config_path, runtime);
        runner.lifecycle().cleanup.subscribe_fn(|_| {
            Err(ProctorError::Runtime("cleanup exploded".to_string()))
        });

        let error = runner.run().await.unwrap_err();
        assert!(error.to_string().contains("[cleanup]"));
    }

    #[tokio::test]
    async fn test_custom_runner_bypasses_suite_construction() {
        let dir = TempDir::new().unwrap();
        let config_path = dir.path().join("config.json5");
        std::fs::write(&config_path, r#"{ testRunner: "custom" }"#).unwrap();

        let mut registry = ProviderRegistry::new();
        registry.register_runner("custom", |_ctx| async { Ok(7u64) });

        let (runtime, executions) = StubRuntime::passing();
        let runner = Runner::new(
            Log::new(),
            &config_path,
            Value::Null,
            registry,
            runtime,
            None,
        );

        // The custom runner's result is returned directly; the test runtime
        // adapter is never consulted
        assert_eq!(runner.run().await.unwrap(), 7);
        assert_eq!(executions.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_unregistered_custom_runner_is_reported() {
        let dir = TempDir::new().unwrap();
        let config_path = dir.path().join("config.json5");
        std::fs::write(&config_path, r#"{ testRunner: "ghost" }"#).unwrap();

        let (runtime, _) = StubRuntime::passing();
        let runner = runner_for(&config_path, runtime);
        let error = runner.run().await.unwrap_err();
        assert!(matches!(
            error,
            ProctorError::Provider(ProviderError::NotRegistered { .. })
        ));
    }

    #[tokio::test]
    async fn test_stats_counts_leaf_tests_across_manifests() {
        let (_dir, config_path) = workspace(json!({}));
        let (runtime, executions) = StubRuntime::passing();
        let runner = runner_for(&config_path, runtime);

        let stats = runner.get_test_stats().await.unwrap();
        assert_eq!(stats.test_count, 5);
        assert!(stats.tests_excluded_by_tag.is_empty());
        assert_eq!(executions.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_stats_reports_excluded_titles() {
        let (_dir, config_path) = workspace(json!({
            "suiteTags": { "exclude": ["slow"] }
        }));
        let (runtime, _) = StubRuntime::passing();
        let runner = runner_for(&config_path, runtime);

        let stats = runner.get_test_stats().await.unwrap();
        assert_eq!(stats.test_count, 4);
        assert_eq!(stats.tests_excluded_by_tag, vec!["a two"]);
    }

    #[tokio::test]
    async fn test_stats_rejects_custom_runner_configs() {
        let dir = TempDir::new().unwrap();
        let config_path = dir.path().join("config.json5");
        std::fs::write(&config_path, r#"{ testRunner: "custom" }"#).unwrap();

        let mut registry = ProviderRegistry::new();
        registry.register_runner("custom", |_ctx| async { Ok(0u64) });
        let (runtime, _) = StubRuntime::passing();
        let runner = Runner::new(
            Log::new(),
            &config_path,
            Value::Null,
            registry,
            runtime,
            None,
        );

        let error = runner.get_test_stats().await.unwrap_err();
        assert!(error
            .to_string()
            .contains("Unable to get test stats for config that uses a custom test runner"));
    }

    #[tokio::test]
    async fn test_stats_never_invokes_stubbed_service_factories() {
        let (_dir, config_path) = workspace(json!({ "services": ["db"] }));

        let invocations = Arc::new(AtomicUsize::new(0));
        let seen = invocations.clone();
        let mut registry = ProviderRegistry::new();
        registry.register_service("db", move |_ctx| {
            let seen = seen.clone();
            async move {
                seen.fetch_add(1, Ordering::SeqCst);
                Ok("a database".to_string())
            }
        });

        let (runtime, _) = StubRuntime::passing();
        let runner = Runner::new(
            Log::new(),
            &config_path,
            Value::Null,
            registry,
            runtime,
            None,
        );

        let stats = runner.get_test_stats().await.unwrap();
        assert_eq!(stats.test_count, 5);
        assert_eq!(invocations.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_overrides_win_over_file_config() {
        let (_dir, config_path) = workspace(json!({}));
        let (runtime, executions) = StubRuntime::passing();
        let runner = Runner::new(
            Log::new(),
            &config_path,
            json!({ "runnerOpts": { "dryRun": true } }),
            ProviderRegistry::new(),
            runtime,
            None,
        );

        // Dry run: report written, adapter never executed
        assert_eq!(runner.run().await.unwrap(), 0);
        assert_eq!(executions.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_dry_run_writes_report_instead_of_executing() {
        let (dir, config_path) = workspace(json!({
            "runnerOpts": { "dryRun": true, "dryRunOutput": "out/report.json" }
        }));
        let (runtime, executions) = StubRuntime::passing();
        let runner = runner_for(&config_path, runtime);

        assert_eq!(runner.run().await.unwrap(), 0);
        assert_eq!(executions.load(Ordering::SeqCst), 0);

        let raw = std::fs::read_to_string(dir.path().join("out/report.json")).unwrap();
        let report: suite::DryRunReport = serde_json::from_str(&raw).unwrap();
        assert_eq!(report.test_count, 5);
    }

    #[tokio::test]
    async fn test_before_tests_fires_with_built_suite() {
        let (_dir, config_path) = workspace(json!({}));
        let (runtime, _) = StubRuntime::passing();
        let runner = runner_for(&config_path, runtime);

        let seen_count = Arc::new(AtomicUsize::new(0));
        let seen = seen_count.clone();
        runner
            .lifecycle()
            .before_tests
            .subscribe_fn(move |suite: &Suite| {
                seen.store(suite::count_tests(suite), Ordering::SeqCst);
                Ok(())
            });

        runner.run().await.unwrap();
        assert_eq!(seen_count.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn test_core_providers_are_available_to_factories() {
        let (_dir, config_path) = workspace(json!({ "services": ["uses-config"] }));

        let mut registry = ProviderRegistry::new();
        registry.register_service("uses-config", |ctx| async move {
            let config = ctx.get_service_as::<Config>("config").await?;
            Ok(config.get_string_array("testFiles").len())
        });

        let (runtime, _) = StubRuntime::passing();
        let runner = Runner::new(
            Log::new(),
            &config_path,
            Value::Null,
            registry,
            runtime,
            None,
        );

        runner.run().await.unwrap();
    }

    #[tokio::test]
    async fn test_es_version_mismatch_fails_the_run() {
        use wiremock::matchers::method;
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "version": { "number": "8.2.0" } })),
            )
            .mount(&server)
            .await;

        let (_dir, config_path) = workspace(json!({
            "services": ["es"],
            "esUrl": server.uri(),
        }));

        let mut registry = ProviderRegistry::new();
        registry.register_service("es", |_ctx| async { Ok("an es handle".to_string()) });

        let (runtime, executions) = StubRuntime::passing();
        let runner = Runner::new(
            Log::new(),
            &config_path,
            Value::Null,
            registry,
            runtime,
            Some(EsVersion::new("8.1.0").unwrap()),
        );
        let cleanups = cleanup_counter(&runner);

        let error = runner.run().await.unwrap_err();
        assert!(matches!(
            error,
            ProctorError::Version(VersionError::Mismatch { .. })
        ));
        assert!(error.to_string().contains("8.2.0"));
        assert!(error.to_string().contains("8.1.0"));
        assert_eq!(executions.load(Ordering::SeqCst), 0);
        assert_eq!(cleanups.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_es_version_match_allows_the_run() {
        use wiremock::matchers::method;
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "version": { "number": "8.1.0-SNAPSHOT" } })),
            )
            .mount(&server)
            .await;

        let (_dir, config_path) = workspace(json!({
            "services": ["es"],
            "esUrl": server.uri(),
        }));

        let mut registry = ProviderRegistry::new();
        registry.register_service("es", |_ctx| async { Ok("an es handle".to_string()) });

        let (runtime, executions) = StubRuntime::passing();
        let runner = Runner::new(
            Log::new(),
            &config_path,
            Value::Null,
            registry,
            runtime,
            Some(EsVersion::new("8.1.0").unwrap()),
        );

        assert_eq!(runner.run().await.unwrap(), 0);
        assert_eq!(executions.load(Ordering::SeqCst), 1);
    }
}
