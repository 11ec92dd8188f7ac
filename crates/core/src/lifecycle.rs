//! Lifecycle phase registry and broadcasting
//!
//! A [`LifecyclePhase`] is a single named broadcast point: handlers subscribe
//! to it, and a trigger invokes every handler sequentially in registration
//! order, stopping at the first failure. [`Lifecycle`] is the run-scoped
//! registry of all phases the runner fires, statically enumerated as named
//! fields so subscription and triggering are explicit rather than discovered
//! by reflection.
//!
//! Phases are independent of one another; the runner alone imposes ordering
//! by triggering them in sequence. The `cleanup` phase is singular: it can be
//! triggered at most once per run.

use crate::errors::{LifecycleError, ProctorError, Result};
use crate::suite::Suite;
use futures::future::BoxFuture;
use futures::FutureExt;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tracing::debug;

/// Handler subscribed to a phase
///
/// Handlers receive the phase payload by reference and may suspend.
pub type Handler<T> = Arc<dyn for<'a> Fn(&'a T) -> BoxFuture<'a, Result<()>> + Send + Sync>;

/// Outcome of one suite's execution, broadcast on `afterTestSuite`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SuiteResult {
    /// Full suite name (ancestor names joined with spaces)
    pub name: String,
    /// Whether every test and hook in the suite passed
    pub success: bool,
}

/// A failed test or hook, broadcast on `testFailure` / `testHookFailure`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TestFailure {
    /// Full test title
    pub title: String,
    /// Rendered failure cause
    pub error: String,
}

/// Options controlling phase behavior
#[derive(Debug, Clone, Copy, Default)]
pub struct PhaseOptions {
    /// A singular phase may be triggered at most once
    pub singular: bool,
}

/// A single named broadcast point
///
/// Handlers are invoked sequentially in registration order. If a handler
/// fails, the remaining handlers of that trigger are aborted and the failure
/// propagates as [`LifecycleError::PhaseFailed`] carrying the phase name;
/// already-invoked handlers are not rolled back. Triggering a phase that is
/// already mid-trigger is a reported error.
pub struct LifecyclePhase<T> {
    name: &'static str,
    singular: bool,
    handlers: Mutex<Vec<Handler<T>>>,
    triggering: AtomicBool,
    triggered: AtomicBool,
}

impl<T> LifecyclePhase<T> {
    /// Create a phase with default options
    pub fn new(name: &'static str) -> Self {
        Self::with_options(name, PhaseOptions::default())
    }

    /// Create a phase with explicit options
    pub fn with_options(name: &'static str, options: PhaseOptions) -> Self {
        Self {
            name,
            singular: options.singular,
            handlers: Mutex::new(Vec::new()),
            triggering: AtomicBool::new(false),
            triggered: AtomicBool::new(false),
        }
    }

    /// Phase name used in logs and errors
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Number of subscribed handlers
    pub fn handler_count(&self) -> usize {
        self.handlers.lock().unwrap().len()
    }

    /// Subscribe an async handler, invoked in registration order
    pub fn subscribe<F>(&self, handler: F)
    where
        F: for<'a> Fn(&'a T) -> BoxFuture<'a, Result<()>> + Send + Sync + 'static,
    {
        self.handlers.lock().unwrap().push(Arc::new(handler));
    }

    /// Subscribe a synchronous handler
    pub fn subscribe_fn<F>(&self, handler: F)
    where
        F: Fn(&T) -> Result<()> + Send + Sync + 'static,
    {
        self.subscribe(move |args: &T| {
            let result = handler(args);
            async move { result }.boxed()
        });
    }

    /// Invoke all handlers sequentially with the given payload
    ///
    /// Returns once every handler has completed, or propagates the first
    /// handler failure wrapped with this phase's name.
    pub async fn trigger(&self, args: &T) -> Result<()> {
        if self.triggering.swap(true, Ordering::SeqCst) {
            return Err(LifecycleError::Reentrant {
                phase: self.name.to_string(),
            }
            .into());
        }

        if self.singular && self.triggered.swap(true, Ordering::SeqCst) {
            self.triggering.store(false, Ordering::SeqCst);
            return Err(LifecycleError::SingularRetriggered {
                phase: self.name.to_string(),
            }
            .into());
        }
        self.triggered.store(true, Ordering::SeqCst);

        debug!(phase = self.name, "starting lifecycle phase");

        // Snapshot so the handler list lock is not held across awaits
        let handlers: Vec<Handler<T>> = self.handlers.lock().unwrap().clone();

        let mut outcome = Ok(());
        for handler in handlers {
            if let Err(error) = handler(args).await {
                outcome = Err(ProctorError::Lifecycle(LifecycleError::PhaseFailed {
                    phase: self.name.to_string(),
                    source: Box::new(error),
                }));
                break;
            }
        }

        self.triggering.store(false, Ordering::SeqCst);
        if outcome.is_ok() {
            debug!(phase = self.name, "completed lifecycle phase");
        }
        outcome
    }
}

impl<T> std::fmt::Debug for LifecyclePhase<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LifecyclePhase")
            .field("name", &self.name)
            .field("singular", &self.singular)
            .field("handlers", &self.handler_count())
            .finish()
    }
}

/// Fixed set of lifecycle phase names, in the order the runner fires them
pub const PHASE_NAMES: &[&str] = &[
    "beforeTests",
    "beforeEachRunnable",
    "beforeTestSuite",
    "beforeEachTest",
    "afterTestSuite",
    "testFailure",
    "testHookFailure",
    "cleanup",
];

/// Run-scoped registry of lifecycle phases
///
/// Created once per runner and never reused across runs. Each phase is a
/// named field; there is no dynamic phase discovery.
#[derive(Debug)]
pub struct Lifecycle {
    /// Fired once with the fully built suite tree, before execution starts
    pub before_tests: LifecyclePhase<Suite>,
    /// Fired before every runnable (suite or test), with its full title
    pub before_each_runnable: LifecyclePhase<String>,
    /// Fired before a suite's children run
    pub before_test_suite: LifecyclePhase<String>,
    /// Fired before each individual test
    pub before_each_test: LifecyclePhase<String>,
    /// Fired after a suite's children ran, with the suite outcome
    pub after_test_suite: LifecyclePhase<SuiteResult>,
    /// Fired when a test fails
    pub test_failure: LifecyclePhase<TestFailure>,
    /// Fired when a lifecycle hook inside the suite fails
    pub test_hook_failure: LifecyclePhase<TestFailure>,
    /// Fired exactly once during teardown
    pub cleanup: LifecyclePhase<()>,
}

impl Lifecycle {
    /// Create a fresh lifecycle registry for one run
    pub fn new() -> Self {
        Self {
            before_tests: LifecyclePhase::new("beforeTests"),
            before_each_runnable: LifecyclePhase::new("beforeEachRunnable"),
            before_test_suite: LifecyclePhase::new("beforeTestSuite"),
            before_each_test: LifecyclePhase::new("beforeEachTest"),
            after_test_suite: LifecyclePhase::new("afterTestSuite"),
            test_failure: LifecyclePhase::new("testFailure"),
            test_hook_failure: LifecyclePhase::new("testHookFailure"),
            cleanup: LifecyclePhase::with_options("cleanup", PhaseOptions { singular: true }),
        }
    }
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}
