//! Form state: a data tree plus a parallel metadata tree.
//!
//! Values are read and written by path, the same way the store addresses
//! its state. Each value change updates the field's `dirty` flag and,
//! unless the form validates on submit only, starts a validation run
//! before the change listener is told.
//!
//! ```text
//! set_value ──→ data + meta ──→ validate ──→ on_change
//!                                  │
//!                                  └── async checks ──→ finish ──→ on_change
//! ```

mod array;
mod field;
mod meta;
mod validation;

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::watch;

use crate::lens::Lens;
use crate::tree::{deep_equals, Tree};

pub use array::{ArrayOp, FieldArray, SortBy};
pub use field::{Field, FieldHandlers, FieldProps};
pub use meta::{FieldMeta, FormMeta};
pub use validation::{Check, Severity, Validation, ValidationContext, ValidationReport};

use array::coerce;
use meta::{aggregate, clear_validation, meta_path, node_for, ITEMS};
use validation::{Reports, Run};

/// Errors raised by form operations. Validation failures are data, not
/// errors, except when submitting.
#[derive(Debug, Clone, Error)]
pub enum FormError {
    #[error("index {index} is out of range for a field array of length {len}")]
    Index { index: usize, len: usize },

    #[error("unsupported field array operation '{0}'")]
    UnsupportedOperation(String),

    #[error("invalid sort '{0}', expected 'prop', 'prop:asc' or 'prop:desc'")]
    InvalidSort(String),

    #[error("argument {position} of '{op}' must be a non-negative index")]
    InvalidArgument { op: ArrayOp, position: usize },

    #[error("form is invalid: {0}")]
    Invalid(Tree),
}

type Validator = Arc<dyn Fn(&ValidationContext) + Send + Sync>;
type ChangeListener = Arc<dyn Fn(&FormSnapshot) + Send + Sync>;

/// Data and metadata at one point in time.
#[derive(Debug, Clone, PartialEq)]
pub struct FormSnapshot {
    pub data: Tree,
    pub meta: Tree,
}

struct FormState {
    data: Tree,
    meta: Tree,
}

struct FormInner {
    state: Mutex<FormState>,
    initial: Tree,
    validator: Option<Validator>,
    on_change: Option<ChangeListener>,
    runs: AtomicU64,
    reports: Reports,
}

/// Shared handle to one form. Cloning is cheap.
#[derive(Clone)]
pub struct Form {
    inner: Arc<FormInner>,
}

#[derive(Clone)]
pub(crate) struct WeakForm {
    inner: Weak<FormInner>,
}

impl WeakForm {
    pub(crate) fn upgrade(&self) -> Option<Form> {
        self.inner.upgrade().map(|inner| Form { inner })
    }
}

pub struct FormBuilder {
    initial: Tree,
    validate_on_submit: bool,
    validator: Option<Validator>,
    on_change: Option<ChangeListener>,
}

impl Default for FormBuilder {
    fn default() -> Self {
        Self {
            initial: Tree::map(),
            validate_on_submit: false,
            validator: None,
            on_change: None,
        }
    }
}

impl FormBuilder {
    pub fn initial(mut self, data: impl Into<Tree>) -> Self {
        self.initial = data.into();
        self
    }

    /// Skip validation on value changes; only `validate` and `submit` run it.
    pub fn validate_on_submit(mut self, enabled: bool) -> Self {
        self.validate_on_submit = enabled;
        self
    }

    pub fn validator<F>(mut self, validator: F) -> Self
    where
        F: Fn(&ValidationContext) + Send + Sync + 'static,
    {
        self.validator = Some(Arc::new(validator));
        self
    }

    pub fn on_change<F>(mut self, listener: F) -> Self
    where
        F: Fn(&FormSnapshot) + Send + Sync + 'static,
    {
        self.on_change = Some(Arc::new(listener));
        self
    }

    pub fn build(self) -> Form {
        let meta = root_meta(&self.initial, self.validate_on_submit);
        let (reports, _) = watch::channel(None);
        Form {
            inner: Arc::new(FormInner {
                state: Mutex::new(FormState {
                    data: self.initial.clone(),
                    meta,
                }),
                initial: self.initial,
                validator: self.validator,
                on_change: self.on_change,
                runs: AtomicU64::new(0),
                reports,
            }),
        }
    }
}

fn root_meta(data: &Tree, validate_on_submit: bool) -> Tree {
    FormMeta {
        validate_on_submit,
        ..FormMeta::default()
    }
    .write_into(&node_for(data))
}

fn meta_lens(path: &str) -> Lens {
    Lens::new(meta_path(Lens::compile(path).path()))
}

impl Form {
    pub fn new(initial: impl Into<Tree>) -> Form {
        Form::builder().initial(initial).build()
    }

    pub fn builder() -> FormBuilder {
        FormBuilder::default()
    }

    pub(crate) fn downgrade(&self) -> WeakForm {
        WeakForm {
            inner: Arc::downgrade(&self.inner),
        }
    }

    pub fn data(&self) -> Tree {
        self.inner.state.lock().data.clone()
    }

    pub fn meta(&self) -> Tree {
        self.inner.state.lock().meta.clone()
    }

    pub fn form_meta(&self) -> FormMeta {
        FormMeta::from_tree(&self.inner.state.lock().meta)
    }

    pub fn snapshot(&self) -> FormSnapshot {
        let state = self.inner.state.lock();
        FormSnapshot {
            data: state.data.clone(),
            meta: state.meta.clone(),
        }
    }

    /// The value at `path`, or `Tree::Null`.
    pub fn value(&self, path: &str) -> Tree {
        let state = self.inner.state.lock();
        Lens::compile(path)
            .get(&state.data)
            .cloned()
            .unwrap_or_default()
    }

    pub fn set_value(&self, path: &str, value: impl Into<Tree>) {
        let value = value.into();
        {
            let mut state = self.inner.state.lock();
            let data_lens = Lens::compile(path);
            let previous = data_lens.get(&state.data).cloned().unwrap_or_default();
            state.data = data_lens.set(&state.data, value.clone());

            let meta_lens = meta_lens(path);
            let node = meta_lens.get(&state.meta).cloned().unwrap_or_default();
            let mut meta = FieldMeta::from_tree(&node);
            let initial = meta.initial_data.get_or_insert(previous);
            meta.dirty = !deep_equals(&value, initial);
            state.meta = meta_lens.set(&state.meta, meta.write_into(&node));
        }
        tracing::trace!(path, "Field value changed");
        self.after_value_change();
    }

    pub fn field_meta(&self, path: &str) -> FieldMeta {
        let state = self.inner.state.lock();
        meta_lens(path)
            .get(&state.meta)
            .map(FieldMeta::from_tree)
            .unwrap_or_default()
    }

    /// Replace the field's flags and notify. Does not validate.
    pub fn set_field_meta(&self, path: &str, meta: FieldMeta) {
        {
            let mut state = self.inner.state.lock();
            let lens = meta_lens(path);
            let node = lens.get(&state.meta).cloned().unwrap_or_default();
            state.meta = lens.set(&state.meta, meta.write_into(&node));
        }
        self.notify();
    }

    pub fn field(&self, path: &str) -> Field {
        Field::new(self.clone(), path.to_string())
    }

    /// Call `render` with the field's value, metadata and bound handlers.
    pub fn render<R>(&self, path: &str, render: impl FnOnce(FieldProps) -> R) -> R {
        render(FieldProps::new(self.field(path)))
    }

    pub fn array(&self, path: &str) -> FieldArray {
        FieldArray::new(self.clone(), path.to_string())
    }

    pub fn validate_on_submit(&self) -> bool {
        self.form_meta().validate_on_submit
    }

    pub fn set_validate_on_submit(&self, enabled: bool) {
        {
            let mut state = self.inner.state.lock();
            let mut form_meta = FormMeta::from_tree(&state.meta);
            form_meta.validate_on_submit = enabled;
            state.meta = form_meta.write_into(&state.meta);
        }
        self.notify();
    }

    /// Start a validation run, superseding any run still in flight.
    ///
    /// Synchronous checks are applied before this returns.
    pub fn validate(&self) -> Validation {
        let rx = self.inner.reports.subscribe();
        let id = {
            let mut state = self.inner.state.lock();
            let id = self.inner.runs.fetch_add(1, Ordering::SeqCst) + 1;
            state.meta = clear_validation(&state.meta);
            id
        };
        tracing::debug!(run = id, "Validating form");

        let run = Run::start(id);
        if let Some(validator) = self.inner.validator.clone() {
            validator(&ValidationContext::new(self.clone(), Arc::clone(&run)));
        }
        if run.release() {
            self.finish(id);
        }
        Validation::new(id, rx)
    }

    /// Restore the initial data and fresh metadata. Runs in flight are
    /// superseded.
    pub fn reset(&self) {
        let report = {
            let mut state = self.inner.state.lock();
            let id = self.inner.runs.fetch_add(1, Ordering::SeqCst) + 1;
            let validate_on_submit = FormMeta::from_tree(&state.meta).validate_on_submit;
            state.data = self.inner.initial.clone();
            state.meta = root_meta(&self.inner.initial, validate_on_submit);
            ValidationReport {
                run: id,
                valid: true,
                error: None,
                warning: None,
                meta: state.meta.clone(),
            }
        };
        tracing::debug!(run = report.run, "Form reset");
        self.inner.reports.send_replace(Some(report));
        self.notify();
    }

    /// Validate unconditionally and hand back the data if it is valid.
    pub async fn submit(&self) -> Result<Tree, FormError> {
        let report = self.validate().await;
        if report.valid {
            Ok(self.data())
        } else {
            Err(FormError::Invalid(report.error.unwrap_or_default()))
        }
    }

    pub(crate) fn edit_array<R, E>(
        &self,
        path: &str,
        op: impl FnOnce(&mut Vec<Tree>, &mut Vec<Tree>) -> Result<R, E>,
    ) -> Result<R, E> {
        let result = {
            let mut state = self.inner.state.lock();
            let data_lens = Lens::compile(path);
            let meta_lens = meta_lens(path);

            let previous = data_lens.get(&state.data).cloned().unwrap_or_default();
            let mut values = coerce(&previous);
            let node = meta_lens.get(&state.meta).cloned().unwrap_or_default();
            let mut items: Vec<Tree> = node
                .get(ITEMS)
                .and_then(Tree::as_list)
                .map(<[Tree]>::to_vec)
                .unwrap_or_default();
            items.truncate(values.len());
            while items.len() < values.len() {
                let fresh = node_for(&values[items.len()]);
                items.push(fresh);
            }

            let result = op(&mut values, &mut items)?;

            let next = Tree::from_list(values);
            let mut meta = FieldMeta::from_tree(&node);
            let initial = meta.initial_data.get_or_insert(previous);
            meta.dirty = !deep_equals(&next, initial);
            let node = Lens::compile(ITEMS).set(&meta.write_into(&node), Tree::from_list(items));

            state.data = data_lens.set(&state.data, next);
            state.meta = meta_lens.set(&state.meta, node);
            result
        };
        tracing::trace!(path, "Field array changed");
        self.after_value_change();
        Ok(result)
    }

    /// Record a synchronous check outcome for `run`.
    pub(crate) fn apply_check(&self, run: u64, path: &str, outcome: Tree, severity: Severity) {
        self.update_field(run, path, |meta| record(meta, outcome, severity));
    }

    pub(crate) fn mark_validating(&self, run: u64, path: &str) {
        let mut state = self.inner.state.lock();
        if self.inner.runs.load(Ordering::SeqCst) != run {
            return;
        }
        let lens = meta_lens(path);
        let node = lens.get(&state.meta).cloned().unwrap_or_default();
        let mut meta = FieldMeta::from_tree(&node);
        meta.validating = true;
        state.meta = lens.set(&state.meta, meta.write_into(&node));

        let mut form_meta = FormMeta::from_tree(&state.meta);
        form_meta.validating = true;
        state.meta = form_meta.write_into(&state.meta);
    }

    /// Record an async check outcome, unless `run` was superseded.
    pub(crate) fn settle_check(&self, run: u64, path: &str, outcome: Tree, severity: Severity) {
        let applied = self.update_field(run, path, |meta| {
            meta.validating = false;
            record(meta, outcome, severity);
        });
        if !applied {
            tracing::debug!(run, path, "Discarded result of superseded validation");
        }
    }

    fn update_field(&self, run: u64, path: &str, f: impl FnOnce(&mut FieldMeta)) -> bool {
        let mut state = self.inner.state.lock();
        if self.inner.runs.load(Ordering::SeqCst) != run {
            return false;
        }
        let lens = meta_lens(path);
        let node = lens.get(&state.meta).cloned().unwrap_or_default();
        let mut meta = FieldMeta::from_tree(&node);
        f(&mut meta);
        state.meta = lens.set(&state.meta, meta.write_into(&node));
        true
    }

    /// Aggregate and publish the report of `run` if it is still current.
    pub(crate) fn finish(&self, run: u64) {
        let report = {
            let mut state = self.inner.state.lock();
            if self.inner.runs.load(Ordering::SeqCst) != run {
                return;
            }
            let (error, warning) = aggregate(&state.meta);
            let form_meta = FormMeta {
                validating: false,
                valid: error.is_none(),
                error: error.clone(),
                warning: warning.clone(),
                validate_on_submit: FormMeta::from_tree(&state.meta).validate_on_submit,
            };
            state.meta = form_meta.write_into(&state.meta);
            ValidationReport {
                run,
                valid: form_meta.valid,
                error,
                warning,
                meta: state.meta.clone(),
            }
        };
        tracing::debug!(run, valid = report.valid, "Validation finished");
        self.inner.reports.send_replace(Some(report));
        self.notify();
    }

    fn after_value_change(&self) {
        // A run that finished synchronously has already notified.
        if !self.validate_on_submit() && self.validate().report().is_some() {
            return;
        }
        self.notify();
    }

    fn notify(&self) {
        if let Some(listener) = &self.inner.on_change {
            listener(&self.snapshot());
        }
    }
}

/// First failing check per severity wins.
fn record(meta: &mut FieldMeta, outcome: Tree, severity: Severity) {
    if !outcome.is_truthy() {
        return;
    }
    let slot = match severity {
        Severity::Error => &mut meta.error,
        Severity::Warning => &mut meta.warning,
    };
    if slot.is_none() {
        *slot = Some(outcome);
    }
}

impl fmt::Debug for Form {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Form")
            .field("data", &self.data())
            .field("meta", &self.form_meta())
            .finish_non_exhaustive()
    }
}
