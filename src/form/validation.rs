//! Validation runs.
//!
//! Each call to [`Form::validate`] starts a run. Checks reported through
//! the [`ValidationContext`] apply immediately when synchronous; async
//! checks are spawned and counted. The run finishes when the validator
//! has returned and the count drops back to zero. Starting another run
//! supersedes it: its pending results are discarded and its handle
//! resolves with the newer run's report instead.

use std::future::{Future, IntoFuture};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use futures_core::future::BoxFuture;
use tokio::sync::watch;

use crate::form::Form;
use crate::tree::Tree;

/// Which metadata slot a failing check fills.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
}

/// Outcome of one check: a falsy value passes, anything else is the
/// error (or warning) to record.
pub enum Check {
    Now(Tree),
    Later(BoxFuture<'static, Tree>),
}

impl Check {
    pub fn pass() -> Self {
        Check::Now(Tree::Null)
    }

    pub fn fail(reason: impl Into<Tree>) -> Self {
        Check::Now(reason.into())
    }

    pub fn later<F>(future: F) -> Self
    where
        F: Future<Output = Tree> + Send + 'static,
    {
        Check::Later(Box::pin(future))
    }
}

impl From<Tree> for Check {
    fn from(value: Tree) -> Self {
        Check::Now(value)
    }
}

impl From<&str> for Check {
    fn from(value: &str) -> Self {
        Check::Now(Tree::from(value))
    }
}

impl From<String> for Check {
    fn from(value: String) -> Self {
        Check::Now(Tree::from(value))
    }
}

impl From<Option<&str>> for Check {
    fn from(value: Option<&str>) -> Self {
        Check::Now(Tree::from(value))
    }
}

impl From<Option<String>> for Check {
    fn from(value: Option<String>) -> Self {
        Check::Now(Tree::from(value))
    }
}

/// Final status of a validation run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidationReport {
    /// The run that produced this report.
    pub run: u64,
    pub valid: bool,
    pub error: Option<Tree>,
    pub warning: Option<Tree>,
    /// Metadata tree at the end of the run.
    pub meta: Tree,
}

pub(crate) type Reports = watch::Sender<Option<ValidationReport>>;

pub(crate) struct Run {
    pub(crate) id: u64,
    pending: AtomicUsize,
}

impl Run {
    /// A run that is pending on its validator call.
    pub(crate) fn start(id: u64) -> Arc<Run> {
        Arc::new(Run {
            id,
            pending: AtomicUsize::new(1),
        })
    }

    fn hold(&self) {
        self.pending.fetch_add(1, Ordering::SeqCst);
    }

    /// True when this release was the last outstanding piece of work.
    pub(crate) fn release(&self) -> bool {
        self.pending.fetch_sub(1, Ordering::SeqCst) == 1
    }
}

/// Handed to the validator.
pub struct ValidationContext {
    form: Form,
    run: Arc<Run>,
}

impl ValidationContext {
    pub(crate) fn new(form: Form, run: Arc<Run>) -> Self {
        Self { form, run }
    }

    pub fn data(&self) -> Tree {
        self.form.data()
    }

    /// The value at `path`, or `Tree::Null`.
    pub fn value(&self, path: &str) -> Tree {
        self.form.value(path)
    }

    /// Record `check` for the field at `path`.
    pub fn validate(&self, path: &str, check: impl Into<Check>, severity: Severity) {
        match check.into() {
            Check::Now(outcome) => self.form.apply_check(self.run.id, path, outcome, severity),
            Check::Later(future) => {
                let Ok(runtime) = tokio::runtime::Handle::try_current() else {
                    tracing::warn!(path, "Async validation outside a tokio runtime");
                    let outcome = Tree::from("asynchronous validation needs a tokio runtime");
                    self.form.apply_check(self.run.id, path, outcome, severity);
                    return;
                };

                self.run.hold();
                self.form.mark_validating(self.run.id, path);
                let form = self.form.downgrade();
                let run = Arc::clone(&self.run);
                let path = path.to_string();
                runtime.spawn(async move {
                    let outcome = future.await;
                    if let Some(form) = form.upgrade() {
                        form.settle_check(run.id, &path, outcome, severity);
                        if run.release() {
                            form.finish(run.id);
                        }
                    }
                });
            }
        }
    }

    pub fn error(&self, path: &str, check: impl Into<Check>) {
        self.validate(path, check, Severity::Error);
    }

    pub fn warning(&self, path: &str, check: impl Into<Check>) {
        self.validate(path, check, Severity::Warning);
    }
}

/// Handle to a validation run. Awaiting it yields the report of this run,
/// or of the run that superseded it.
#[derive(Debug)]
pub struct Validation {
    run: u64,
    rx: watch::Receiver<Option<ValidationReport>>,
}

impl Validation {
    pub(crate) fn new(run: u64, rx: watch::Receiver<Option<ValidationReport>>) -> Self {
        Self { run, rx }
    }

    pub fn run(&self) -> u64 {
        self.run
    }

    /// The report, if the run (or a newer one) has already finished.
    pub fn report(&self) -> Option<ValidationReport> {
        self.rx
            .borrow()
            .as_ref()
            .filter(|report| report.run >= self.run)
            .cloned()
    }

    pub async fn wait(mut self) -> ValidationReport {
        let run = self.run;
        let finished = self
            .rx
            .wait_for(|report| report.as_ref().is_some_and(|r| r.run >= run))
            .await
            .map(|report| report.clone());
        match finished {
            Ok(Some(report)) => report,
            // The form went away; hand back whatever was last published.
            _ => self.rx.borrow().clone().unwrap_or_default(),
        }
    }
}

impl IntoFuture for Validation {
    type Output = ValidationReport;
    type IntoFuture = BoxFuture<'static, ValidationReport>;

    fn into_future(self) -> Self::IntoFuture {
        Box::pin(self.wait())
    }
}
