//! Action wrappers: plain handlers turned into observable, cancellable,
//! store-dispatching callables.
//!
//! A handler returns an [`Effect`]. Values are written to the action's
//! state path right away; futures are settled on the tokio runtime and
//! written when they resolve; lazy bodies get a [`LazyContext`] first.

mod context;
mod error;
mod registry;
mod result;
mod spec;
mod wrapper;

pub use context::{CallbackKind, LazyContext};
pub use error::ActionError;
pub use registry::{ActionNode, ActionTree};
pub use result::{ActionResult, PendingAction};
pub use spec::{ActionOptions, ActionSpec, Effect, Handler, LazyBody, SpecEntry};
pub use wrapper::{ActionStatus, ActionWrapper, OneShot};

pub(crate) use registry::register;
