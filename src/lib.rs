//! Path-addressed state with instrumented actions and a form engine.
//!
//! - [`tree`]: persistent JSON-shaped data and deep equality
//! - [`lens`]: compiled path getters and copy-on-write setters
//! - [`cancel`]: cooperative cancellation of in-flight results
//! - [`action`]: handlers turned into observable, store-dispatching wrappers
//! - [`store`]: the state container, its reducer, storage and autosave
//! - [`connect`]: memoized props for a rendering layer
//! - [`form`]: form data, field metadata, field arrays and validation
//! - [`config`]: TOML settings for storage and autosave
//! - [`logging`]: tracing subscriber setup for binaries

pub mod action;
pub mod cancel;
pub mod config;
pub mod connect;
pub mod form;
pub mod lens;
pub mod logging;
pub mod store;
pub mod tree;

pub use action::{
    ActionError, ActionOptions, ActionResult, ActionSpec, ActionStatus, ActionTree, ActionWrapper,
    Effect, LazyContext, PendingAction,
};
pub use cancel::{CancelHandle, CancelToken, Cancellable};
pub use config::{ConfigError, StoreConfig};
pub use connect::{Connector, Fetch, FetchResult, FetchStatus, Props, Provider, Selector};
pub use form::{FieldArray, FieldMeta, Form, FormError, FormMeta, SortBy, ValidationReport};
pub use lens::{Lens, Path, Segment};
pub use store::{
    AutoSaveOptions, FileStorage, Intent, MemoryStorage, Patch, Storage, Store, StoreBuilder,
    StoreError, Subscription,
};
pub use tree::{deep_equals, Tree, TreeMap};
