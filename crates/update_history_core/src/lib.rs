//! Typed, read-only update installation history.
//! This crate marshals dynamically-typed external history objects into
//! records and owns the release of every external handle it touches.

pub mod handle;
pub mod history;
pub mod logging;
pub mod marshal;
pub mod model;

pub use handle::{
    ExternalHandle, ExternalObject, LookupError, LookupErrorKind, PropertyValue, ValueKind,
};
pub use history::{
    get, get_with, History, HistoryError, HistoryProvider, HistoryQuery, HistoryResult,
};
pub use logging::{default_log_level, init_logging, logging_status};
pub use marshal::{FieldError, FieldErrorCause, FieldKind, NestedDecodeError, RECORD_FIELDS};
pub use model::record::{
    Category, Identity, OperationResult, Record, RecordData, ServerSelection, UpdateOperation,
};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
