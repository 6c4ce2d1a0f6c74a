//! Owned handles over dynamically-typed external objects.
//!
//! # Responsibility
//! - Define the lookup capability (`ExternalObject`) that is the only seam
//!   touching the native object model.
//! - Wrap each acquired reference in an `ExternalHandle` that releases it
//!   exactly once.
//!
//! # Invariants
//! - Every handle produced by a lookup or indexed fetch is released exactly
//!   once, by `release()` or by `Drop`, whichever comes first.
//! - Handles are never shared; ownership moves with the value.
//!
//! # See also
//! - `handle::fake` for the release-tracking test double.

use chrono::{DateTime, Utc};
use log::trace;
use std::error::Error;
use std::fmt::{Debug, Display, Formatter};

#[cfg(any(test, feature = "test_support"))]
pub mod fake;

/// Property holding the number of elements of a collection object.
pub const COUNT_PROPERTY: &str = "Count";
/// Indexed property returning one element of a collection object.
pub const ITEM_PROPERTY: &str = "Item";
/// Upper bound on capacity reserved from a reported `Count`; the reported
/// value is not trusted for allocation.
pub const PRESIZE_LIMIT: usize = 1024;

/// Capability exposed by one live reference to an external object.
///
/// Implementations adapt a native dynamic-object system. `release` consumes
/// the reference, so a released object can no longer be reached through it.
pub trait ExternalObject {
    fn get(&self, name: &str) -> Result<PropertyValue, LookupError>;
    fn get_indexed(&self, name: &str, index: i32) -> Result<PropertyValue, LookupError>;
    fn release(self: Box<Self>);
}

/// Raw value returned by a property lookup.
///
/// `Empty` is the absent marker; it is not a lookup failure.
#[derive(Debug)]
pub enum PropertyValue {
    Empty,
    Str(String),
    Int(i32),
    Timestamp(DateTime<Utc>),
    Object(ExternalHandle),
}

impl PropertyValue {
    pub fn kind(&self) -> ValueKind {
        match self {
            Self::Empty => ValueKind::Empty,
            Self::Str(_) => ValueKind::String,
            Self::Int(_) => ValueKind::Integer,
            Self::Timestamp(_) => ValueKind::Timestamp,
            Self::Object(_) => ValueKind::Object,
        }
    }
}

/// Tag of a raw property value, used in type mismatch reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Empty,
    String,
    Integer,
    Timestamp,
    Object,
}

impl Display for ValueKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Empty => "empty",
            Self::String => "string",
            Self::Integer => "integer",
            Self::Timestamp => "timestamp",
            Self::Object => "object",
        };
        f.write_str(name)
    }
}

/// Failure reading one named property from an external object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LookupError {
    pub property: String,
    pub kind: LookupErrorKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LookupErrorKind {
    /// The object does not expose a property with this name.
    UnknownProperty,
    /// The property exists but holds no value where one is required.
    Absent,
    TypeMismatch {
        expected: ValueKind,
        found: ValueKind,
    },
    OutOfRange(i64),
    /// The external call itself failed.
    Call(String),
}

impl LookupError {
    pub fn new(property: impl Into<String>, kind: LookupErrorKind) -> Self {
        Self {
            property: property.into(),
            kind,
        }
    }

    pub fn unknown(property: impl Into<String>) -> Self {
        Self::new(property, LookupErrorKind::UnknownProperty)
    }

    pub fn absent(property: impl Into<String>) -> Self {
        Self::new(property, LookupErrorKind::Absent)
    }

    pub fn type_mismatch(
        property: impl Into<String>,
        expected: ValueKind,
        found: ValueKind,
    ) -> Self {
        Self::new(property, LookupErrorKind::TypeMismatch { expected, found })
    }

    pub fn out_of_range(property: impl Into<String>, value: i64) -> Self {
        Self::new(property, LookupErrorKind::OutOfRange(value))
    }

    pub fn call(property: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(property, LookupErrorKind::Call(message.into()))
    }
}

impl Display for LookupError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let property = self.property.as_str();
        match &self.kind {
            LookupErrorKind::UnknownProperty => write!(f, "unknown property `{property}`"),
            LookupErrorKind::Absent => write!(f, "property `{property}` has no value"),
            LookupErrorKind::TypeMismatch { expected, found } => write!(
                f,
                "property `{property}` holds {found}, expected {expected}"
            ),
            LookupErrorKind::OutOfRange(value) => {
                write!(f, "property `{property}` value {value} is out of range")
            }
            LookupErrorKind::Call(message) => {
                write!(f, "reading property `{property}` failed: {message}")
            }
        }
    }
}

impl Error for LookupError {}

/// Exclusively-owned reference to one external object.
pub struct ExternalHandle {
    object: Option<Box<dyn ExternalObject>>,
}

impl ExternalHandle {
    pub fn new(object: impl ExternalObject + 'static) -> Self {
        Self::from_boxed(Box::new(object))
    }

    pub fn from_boxed(object: Box<dyn ExternalObject>) -> Self {
        Self {
            object: Some(object),
        }
    }

    pub fn is_released(&self) -> bool {
        self.object.is_none()
    }

    pub fn get(&self, name: &str) -> Result<PropertyValue, LookupError> {
        self.live(name)?.get(name)
    }

    pub fn get_indexed(&self, name: &str, index: i32) -> Result<PropertyValue, LookupError> {
        self.live(name)?.get_indexed(name, index)
    }

    /// Looks up a property that must hold a nested object.
    pub fn get_object(&self, name: &str) -> Result<ExternalHandle, LookupError> {
        match self.get(name)? {
            PropertyValue::Object(handle) => Ok(handle),
            PropertyValue::Empty => Err(LookupError::absent(name)),
            other => Err(LookupError::type_mismatch(
                name,
                ValueKind::Object,
                other.kind(),
            )),
        }
    }

    /// Reads the declared element count of a collection object.
    pub fn count(&self) -> Result<usize, LookupError> {
        match self.get(COUNT_PROPERTY)? {
            PropertyValue::Int(value) => usize::try_from(value)
                .map_err(|_| LookupError::out_of_range(COUNT_PROPERTY, i64::from(value))),
            PropertyValue::Empty => Err(LookupError::absent(COUNT_PROPERTY)),
            other => Err(LookupError::type_mismatch(
                COUNT_PROPERTY,
                ValueKind::Integer,
                other.kind(),
            )),
        }
    }

    /// Fetches element `index` of a collection object.
    pub fn item(&self, index: usize) -> Result<ExternalHandle, LookupError> {
        let label = format!("{ITEM_PROPERTY}[{index}]");
        let raw_index = i32::try_from(index)
            .map_err(|_| LookupError::out_of_range(label.as_str(), index as i64))?;
        match self.get_indexed(ITEM_PROPERTY, raw_index)? {
            PropertyValue::Object(handle) => Ok(handle),
            PropertyValue::Empty => Err(LookupError::absent(label)),
            other => Err(LookupError::type_mismatch(
                label,
                ValueKind::Object,
                other.kind(),
            )),
        }
    }

    /// Releases the underlying reference. Later calls are no-ops.
    pub fn release(&mut self) {
        if let Some(object) = self.object.take() {
            object.release();
            trace!("event=handle_release module=handle status=ok");
        }
    }

    fn live(&self, name: &str) -> Result<&dyn ExternalObject, LookupError> {
        self.object
            .as_deref()
            .ok_or_else(|| LookupError::call(name, "handle already released"))
    }
}

impl Drop for ExternalHandle {
    fn drop(&mut self) {
        self.release();
    }
}

impl Debug for ExternalHandle {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExternalHandle")
            .field("released", &self.is_released())
            .finish()
    }
}
