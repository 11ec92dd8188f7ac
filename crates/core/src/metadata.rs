//! Run-scoped test metadata
//!
//! Accumulates failure records during a run by subscribing to the
//! `testFailure` and `testHookFailure` lifecycle phases. Exposed to test
//! code and providers as the `testMetadata` core provider.

use crate::lifecycle::{Lifecycle, TestFailure};
use std::sync::{Arc, Mutex};

/// Failure records accumulated over one run
///
/// Cheap to clone; clones share the same underlying record store.
#[derive(Debug, Clone, Default)]
pub struct TestMetadata {
    failures: Arc<Mutex<Vec<TestFailure>>>,
}

impl TestMetadata {
    /// Create metadata bound to a lifecycle's failure phases
    pub fn new(lifecycle: &Lifecycle) -> Self {
        let metadata = Self::default();

        let failures = metadata.failures.clone();
        lifecycle.test_failure.subscribe_fn(move |failure: &TestFailure| {
            failures.lock().unwrap().push(failure.clone());
            Ok(())
        });

        let failures = metadata.failures.clone();
        lifecycle
            .test_hook_failure
            .subscribe_fn(move |failure: &TestFailure| {
                failures.lock().unwrap().push(failure.clone());
                Ok(())
            });

        metadata
    }

    /// Snapshot of all recorded failures, in the order they occurred
    pub fn failures(&self) -> Vec<TestFailure> {
        self.failures.lock().unwrap().clone()
    }

    /// Number of recorded failures
    pub fn failure_count(&self) -> usize {
        self.failures.lock().unwrap().len()
    }
}
