//! Default test runtime
//!
//! Suite manifests declare structure, not executable bodies, so the stock
//! runtime walks the filtered tree and fires the per-suite and per-test
//! lifecycle phases in order. Real behavior lives in the subscribed
//! handlers; a lifecycle failure aborts the run the same way a framework
//! hook failure would.

use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::FutureExt;
use proctor_core::errors::Result;
use proctor_core::lifecycle::{Lifecycle, SuiteResult};
use proctor_core::suite::{Suite, TestRuntime};
use tracing::debug;

/// Walks the suite tree, firing lifecycle phases for every node
#[derive(Debug, Clone, Copy, Default)]
pub struct WalkingRuntime;

impl WalkingRuntime {
    /// Create the default runtime
    pub fn new() -> Self {
        Self
    }

    fn walk<'a>(
        &'a self,
        suite: &'a Suite,
        prefix: String,
        lifecycle: &'a Lifecycle,
    ) -> BoxFuture<'a, Result<()>> {
        async move {
            let full_name = join_title(&prefix, &suite.name);
            lifecycle.before_each_runnable.trigger(&full_name).await?;
            lifecycle.before_test_suite.trigger(&full_name).await?;

            for test in &suite.tests {
                let title = join_title(&full_name, &test.title);
                debug!(test = %title, "running test");
                lifecycle.before_each_runnable.trigger(&title).await?;
                lifecycle.before_each_test.trigger(&title).await?;
            }

            for child in &suite.suites {
                self.walk(child, full_name.clone(), lifecycle).await?;
            }

            lifecycle
                .after_test_suite
                .trigger(&SuiteResult {
                    name: full_name,
                    success: true,
                })
                .await?;
            Ok(())
        }
        .boxed()
    }
}

#[async_trait]
impl TestRuntime for WalkingRuntime {
    async fn execute(&self, suite: &Suite, lifecycle: &Lifecycle) -> Result<u64> {
        for child in &suite.suites {
            self.walk(child, String::new(), lifecycle).await?;
        }
        // Declarative tests have no body to fail; only hook failures abort,
        // and those propagate as errors above
        Ok(0)
    }
}

fn join_title(prefix: &str, name: &str) -> String {
    match (prefix.is_empty(), name.is_empty()) {
        (true, _) => name.to_string(),
        (_, true) => prefix.to_string(),
        _ => format!("{} {}", prefix, name),
    }
}
