//! Single-field access and render props.

use std::fmt;

use crate::form::{FieldMeta, Form};
use crate::tree::Tree;

/// Value and metadata accessor for one path.
#[derive(Clone)]
pub struct Field {
    form: Form,
    path: String,
}

impl Field {
    pub(crate) fn new(form: Form, path: String) -> Self {
        Self { form, path }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn value(&self) -> Tree {
        self.form.value(&self.path)
    }

    /// Write the value, validate (unless validation waits for submit) and
    /// notify.
    pub fn set_value(&self, value: impl Into<Tree>) {
        self.form.set_value(&self.path, value);
    }

    pub fn meta(&self) -> FieldMeta {
        self.form.field_meta(&self.path)
    }

    pub fn set_meta(&self, meta: FieldMeta) {
        self.form.set_field_meta(&self.path, meta);
    }
}

impl fmt::Debug for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Field").field("path", &self.path).finish()
    }
}

/// Event handlers bound to one field.
#[derive(Clone)]
pub struct FieldHandlers {
    field: Field,
}

impl FieldHandlers {
    pub fn on_focus(&self) {
        let mut meta = self.field.meta();
        meta.focus = true;
        self.field.set_meta(meta);
    }

    pub fn on_change(&self, value: impl Into<Tree>) {
        self.field.set_value(value);
    }

    /// Leaving a field marks it touched.
    pub fn on_blur(&self) {
        let mut meta = self.field.meta();
        meta.focus = false;
        meta.touched = true;
        self.field.set_meta(meta);
    }
}

/// What a render callback receives.
pub struct FieldProps {
    pub value: Tree,
    pub meta: FieldMeta,
    pub handlers: FieldHandlers,
}

impl FieldProps {
    pub(crate) fn new(field: Field) -> Self {
        Self {
            value: field.value(),
            meta: field.meta(),
            handlers: FieldHandlers { field },
        }
    }
}
