//! Property marshaling from an item handle into a typed record.
//!
//! # Responsibility
//! - Drive every conversion from one statically declared field table.
//! - Convert raw property values into the declared semantic type.
//!
//! # Invariants
//! - Each field is read independently; one failure never skips another field.
//! - Absent integers and timestamps are zero values, absent strings are errors.
//! - Marshaling never releases the item handle it reads from.

use crate::handle::{ExternalHandle, LookupError, PropertyValue, ValueKind};
use crate::model::record::{Category, Identity, Record, RecordData};
use chrono::{DateTime, Utc};
use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod nested;

pub use nested::NestedDecodeError;

/// Semantic type of one declared record field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    String,
    Integer,
    Timestamp,
    Identity,
    CategoryList,
}

/// Location inside `RecordData` a field converts into.
#[derive(Clone, Copy)]
enum Slot {
    String(fn(&mut RecordData) -> &mut String),
    Integer(fn(&mut RecordData) -> &mut i32),
    Timestamp(fn(&mut RecordData) -> &mut DateTime<Utc>),
    Identity(fn(&mut RecordData) -> &mut Identity),
    CategoryList(fn(&mut RecordData) -> &mut Vec<Category>),
}

/// One entry of the declared record shape.
#[derive(Clone, Copy)]
pub struct RecordField {
    property: &'static str,
    slot: Slot,
}

impl RecordField {
    /// Source property name read from the item handle.
    pub fn property(&self) -> &'static str {
        self.property
    }

    pub fn kind(&self) -> FieldKind {
        match self.slot {
            Slot::String(_) => FieldKind::String,
            Slot::Integer(_) => FieldKind::Integer,
            Slot::Timestamp(_) => FieldKind::Timestamp,
            Slot::Identity(_) => FieldKind::Identity,
            Slot::CategoryList(_) => FieldKind::CategoryList,
        }
    }
}

const fn field(property: &'static str, slot: Slot) -> RecordField {
    RecordField { property, slot }
}

/// Declared shape of a history entry, in read order.
pub const RECORD_FIELDS: &[RecordField] = &[
    field("Operation", Slot::Integer(|data| &mut data.operation)),
    field("ResultCode", Slot::Integer(|data| &mut data.result_code)),
    field("HResult", Slot::Integer(|data| &mut data.hresult)),
    field("Date", Slot::Timestamp(|data| &mut data.date)),
    field("UpdateIdentity", Slot::Identity(|data| &mut data.identity)),
    field("Title", Slot::String(|data| &mut data.title)),
    field("Description", Slot::String(|data| &mut data.description)),
    field(
        "UnmappedResultCode",
        Slot::Integer(|data| &mut data.unmapped_result_code),
    ),
    field(
        "ClientApplicationID",
        Slot::String(|data| &mut data.client_application_id),
    ),
    field(
        "ServerSelection",
        Slot::Integer(|data| &mut data.server_selection),
    ),
    field("ServiceID", Slot::String(|data| &mut data.service_id)),
    field(
        "UninstallationNotes",
        Slot::String(|data| &mut data.uninstallation_notes),
    ),
    field("SupportURL", Slot::String(|data| &mut data.support_url)),
    field("Categories", Slot::CategoryList(|data| &mut data.categories)),
];

/// Failure to populate one declared record field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub field: &'static str,
    pub cause: FieldErrorCause,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldErrorCause {
    Lookup(LookupError),
    Nested(NestedDecodeError),
}

impl Display for FieldError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match &self.cause {
            FieldErrorCause::Lookup(err) => write!(f, "field `{}`: {err}", self.field),
            FieldErrorCause::Nested(err) => write!(f, "field `{}`: {err}", self.field),
        }
    }
}

impl Error for FieldError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match &self.cause {
            FieldErrorCause::Lookup(err) => Some(err),
            FieldErrorCause::Nested(err) => Some(err),
        }
    }
}

/// Builds a record from `item`, taking ownership of the handle.
///
/// Returns the best-effort record together with every field failure; the
/// caller decides whether a non-empty error list is fatal.
pub(crate) fn marshal_record(item: ExternalHandle) -> (Record, Vec<FieldError>) {
    let mut data = RecordData::default();
    let errors = populate(&item, &mut data);
    (Record::new(data, item), errors)
}

pub(crate) fn populate(item: &ExternalHandle, data: &mut RecordData) -> Vec<FieldError> {
    let mut errors = Vec::new();
    for field in RECORD_FIELDS {
        let property = field.property;
        let outcome = match field.slot {
            Slot::String(slot) => read_string(item, property)
                .map(|value| *slot(data) = value)
                .map_err(FieldErrorCause::Lookup),
            Slot::Integer(slot) => read_integer(item, property)
                .map(|value| *slot(data) = value)
                .map_err(FieldErrorCause::Lookup),
            Slot::Timestamp(slot) => read_timestamp(item, property)
                .map(|value| *slot(data) = value)
                .map_err(FieldErrorCause::Lookup),
            Slot::Identity(slot) => nested::decode_identity(item, property)
                .map(|value| *slot(data) = value)
                .map_err(FieldErrorCause::Nested),
            Slot::CategoryList(slot) => nested::decode_categories(item, property)
                .map(|value| *slot(data) = value)
                .map_err(FieldErrorCause::Nested),
        };
        if let Err(cause) = outcome {
            errors.push(FieldError {
                field: property,
                cause,
            });
        }
    }
    errors
}

/// Reads a required string property.
pub(crate) fn read_string(handle: &ExternalHandle, property: &str) -> Result<String, LookupError> {
    match handle.get(property)? {
        PropertyValue::Str(value) => Ok(value),
        PropertyValue::Empty => Err(LookupError::absent(property)),
        other => Err(LookupError::type_mismatch(
            property,
            ValueKind::String,
            other.kind(),
        )),
    }
}

/// Reads an integer property, mapping an absent value to zero.
pub(crate) fn read_integer(handle: &ExternalHandle, property: &str) -> Result<i32, LookupError> {
    match handle.get(property)? {
        PropertyValue::Int(value) => Ok(value),
        PropertyValue::Empty => Ok(0),
        other => Err(LookupError::type_mismatch(
            property,
            ValueKind::Integer,
            other.kind(),
        )),
    }
}

/// Reads a timestamp property, mapping an absent value to the epoch.
pub(crate) fn read_timestamp(
    handle: &ExternalHandle,
    property: &str,
) -> Result<DateTime<Utc>, LookupError> {
    match handle.get(property)? {
        PropertyValue::Timestamp(value) => Ok(value),
        PropertyValue::Empty => Ok(DateTime::<Utc>::default()),
        other => Err(LookupError::type_mismatch(
            property,
            ValueKind::Timestamp,
            other.kind(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::{marshal_record, FieldErrorCause, FieldKind, RECORD_FIELDS};
    use crate::handle::fake::{FakeObject, FakeValue, ReleaseLedger};
    use crate::handle::{LookupErrorKind, ValueKind};
    use chrono::{DateTime, TimeZone, Utc};

    fn complete_item(ledger: &ReleaseLedger) -> FakeObject {
        FakeObject::new(ledger, "item")
            .with("Operation", 1)
            .with("ResultCode", 2)
            .with("HResult", 0)
            .with(
                "Date",
                Utc.with_ymd_and_hms(2019, 3, 12, 8, 30, 0)
                    .single()
                    .expect("valid date"),
            )
            .with(
                "UpdateIdentity",
                FakeObject::new(ledger, "identity")
                    .with("RevisionNumber", 201)
                    .with("UpdateID", "0b5e3e9a-7d39-4b0e-a4d5-6a3e0e5c3f11"),
            )
            .with("Title", "Security Update (KB4489899)")
            .with("Description", "Fixes a remote code execution issue.")
            .with("UnmappedResultCode", 0)
            .with("ClientApplicationID", "AutomaticUpdates")
            .with("ServerSelection", 2)
            .with("ServiceID", "9482f4b4-e343-43b6-b170-9a65bc822c77")
            .with("UninstallationNotes", "")
            .with("SupportURL", "https://support.example.com/kb/4489899")
            .with(
                "Categories",
                FakeObject::collection(
                    ledger,
                    "categories",
                    vec![FakeObject::new(ledger, "category")
                        .with("Name", "Security Updates")
                        .with("Type", "UpdateClassification")
                        .with("CategoryID", "0fa1201d-4330-4fa8-8ae9-b877473b6441")],
                ),
            )
    }

    #[test]
    fn field_table_covers_every_record_field_once() {
        assert_eq!(RECORD_FIELDS.len(), 14);
        let mut names = RECORD_FIELDS
            .iter()
            .map(|field| field.property())
            .collect::<Vec<_>>();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), RECORD_FIELDS.len());
        assert_eq!(
            RECORD_FIELDS
                .iter()
                .filter(|field| field.kind() == FieldKind::String)
                .count(),
            6
        );
    }

    #[test]
    fn complete_item_marshals_without_errors() {
        let ledger = ReleaseLedger::new();
        let (record, errors) = marshal_record(complete_item(&ledger).open());

        assert!(errors.is_empty(), "unexpected errors: {errors:?}");
        assert_eq!(record.data().identity.revision_number, 201);
        assert_eq!(record.categories().len(), 1);
        assert_eq!(record.data().server_selection, 2);
        assert_eq!(ledger.outstanding_labels(), vec!["item".to_string()]);

        drop(record);
        assert!(ledger.is_balanced());
    }

    #[test]
    fn absent_integer_and_timestamp_are_zero_without_errors() {
        let ledger = ReleaseLedger::new();
        let item = complete_item(&ledger)
            .with("HResult", FakeValue::Empty)
            .with("Date", FakeValue::Empty);

        let (record, errors) = marshal_record(item.open());

        assert!(errors.is_empty(), "unexpected errors: {errors:?}");
        assert_eq!(record.data().hresult, 0);
        assert_eq!(record.date(), DateTime::<Utc>::default());
    }

    #[test]
    fn absent_string_is_reported_and_other_fields_still_fill() {
        let ledger = ReleaseLedger::new();
        let item = complete_item(&ledger)
            .with("Title", FakeValue::Empty)
            .with("ServiceID", FakeValue::Fail("disconnected".to_string()));

        let (record, errors) = marshal_record(item.open());

        let failed = errors.iter().map(|err| err.field).collect::<Vec<_>>();
        assert_eq!(failed, vec!["Title", "ServiceID"]);
        assert_eq!(
            errors[0].cause,
            FieldErrorCause::Lookup(crate::handle::LookupError::absent("Title"))
        );
        assert_eq!(record.title(), "");
        assert_eq!(record.data().client_application_id, "AutomaticUpdates");
        assert_eq!(record.categories().len(), 1);
    }

    #[test]
    fn mistyped_integer_is_a_field_error() {
        let ledger = ReleaseLedger::new();
        let item = complete_item(&ledger).with("ResultCode", "2");

        let (_record, errors) = marshal_record(item.open());

        assert_eq!(errors.len(), 1);
        let FieldErrorCause::Lookup(err) = &errors[0].cause else {
            panic!("expected lookup error, got {:?}", errors[0].cause);
        };
        assert_eq!(
            err.kind,
            LookupErrorKind::TypeMismatch {
                expected: ValueKind::Integer,
                found: ValueKind::String,
            }
        );
    }
}
