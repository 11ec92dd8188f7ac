//! Per-suite execution tracking
//!
//! Subscribes to the suite lifecycle phases and records how long each suite
//! took and whether it succeeded. The runner starts tracking before any
//! provider is constructed so every suite of the run is covered.

use crate::lifecycle::{Lifecycle, SuiteResult};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Outcome of one tracked suite
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuiteRecord {
    pub name: String,
    pub success: bool,
    pub duration: Duration,
}

#[derive(Debug, Default)]
struct TrackerState {
    started: HashMap<String, Instant>,
    finished: Vec<SuiteRecord>,
}

/// Records suite timings via lifecycle subscription
#[derive(Debug, Clone, Default)]
pub struct SuiteTracker {
    state: Arc<Mutex<TrackerState>>,
}

impl SuiteTracker {
    /// Subscribe a new tracker to the given lifecycle
    pub fn start_tracking(lifecycle: &Lifecycle) -> SuiteTracker {
        let tracker = Self::default();

        let state = tracker.state.clone();
        lifecycle
            .before_test_suite
            .subscribe_fn(move |name: &String| {
                state
                    .lock()
                    .unwrap()
                    .started
                    .insert(name.clone(), Instant::now());
                Ok(())
            });

        let state = tracker.state.clone();
        lifecycle
            .after_test_suite
            .subscribe_fn(move |result: &SuiteResult| {
                let mut state = state.lock().unwrap();
                let duration = state
                    .started
                    .remove(&result.name)
                    .map(|started| started.elapsed())
                    .unwrap_or_default();
                state.finished.push(SuiteRecord {
                    name: result.name.clone(),
                    success: result.success,
                    duration,
                });
                Ok(())
            });

        tracker
    }

    /// Snapshot of finished suites, in completion order
    pub fn records(&self) -> Vec<SuiteRecord> {
        self.state.lock().unwrap().finished.clone()
    }
}
