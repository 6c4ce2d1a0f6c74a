//! Decoders for compound record fields read through a nested handle.
//!
//! Each decoder owns the sub-handles it acquires and releases them before
//! returning, on success and failure alike.

use super::read_string;
use crate::handle::{ExternalHandle, LookupError, PropertyValue, ValueKind, PRESIZE_LIMIT};
use crate::model::record::{Category, Identity};
use log::{debug, warn};
use std::error::Error;
use std::fmt::{Display, Formatter};

const REVISION_NUMBER: &str = "RevisionNumber";
const UPDATE_ID: &str = "UpdateID";
const CATEGORY_NAME: &str = "Name";
const CATEGORY_TYPE: &str = "Type";
const CATEGORY_ID: &str = "CategoryID";

/// Failure decoding a compound field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NestedDecodeError {
    Identity(LookupError),
    Categories(LookupError),
}

impl Display for NestedDecodeError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Identity(err) => write!(f, "decoding update identity failed: {err}"),
            Self::Categories(err) => write!(f, "decoding categories failed: {err}"),
        }
    }
}

impl Error for NestedDecodeError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Identity(err) | Self::Categories(err) => Some(err),
        }
    }
}

/// Decodes the identity object under `property`. No partial identity is
/// ever returned.
pub(crate) fn decode_identity(
    item: &ExternalHandle,
    property: &str,
) -> Result<Identity, NestedDecodeError> {
    let mut nested = item
        .get_object(property)
        .map_err(NestedDecodeError::Identity)?;
    let identity = read_identity(&nested);
    nested.release();
    identity.map_err(NestedDecodeError::Identity)
}

fn read_identity(nested: &ExternalHandle) -> Result<Identity, LookupError> {
    let revision_number = match nested.get(REVISION_NUMBER)? {
        PropertyValue::Int(value) => value,
        PropertyValue::Empty => return Err(LookupError::absent(REVISION_NUMBER)),
        other => {
            return Err(LookupError::type_mismatch(
                REVISION_NUMBER,
                ValueKind::Integer,
                other.kind(),
            ))
        }
    };
    let update_id = read_string(nested, UPDATE_ID)?;
    Ok(Identity {
        revision_number,
        update_id,
    })
}

/// Decodes the category collection under `property`.
///
/// Entries whose fields cannot be read are skipped; the rest keep their
/// order. A failed `Item(i)` fetch means the collection disagrees with its
/// own `Count` and fails the whole field.
pub(crate) fn decode_categories(
    item: &ExternalHandle,
    property: &str,
) -> Result<Vec<Category>, NestedDecodeError> {
    let mut collection = item
        .get_object(property)
        .map_err(NestedDecodeError::Categories)?;
    let count = collection
        .count()
        .map_err(NestedDecodeError::Categories)?;

    let mut categories = Vec::with_capacity(count.min(PRESIZE_LIMIT));
    // Indexed access: enumerating this object class through an iterator
    // intermittently hangs.
    for index in 0..count {
        let mut entry = collection
            .item(index)
            .map_err(NestedDecodeError::Categories)?;
        match read_category(&entry) {
            Ok(category) => categories.push(category),
            Err(err) => {
                warn!(
                    "event=category_skipped module=marshal status=error index={} error={}",
                    index, err
                );
            }
        }
        entry.release();
    }
    collection.release();

    if categories.len() < count {
        debug!(
            "event=categories_decoded module=marshal status=partial kept={} declared={}",
            categories.len(),
            count
        );
    }
    Ok(categories)
}

fn read_category(entry: &ExternalHandle) -> Result<Category, LookupError> {
    Ok(Category {
        name: read_string(entry, CATEGORY_NAME)?,
        kind: read_string(entry, CATEGORY_TYPE)?,
        category_id: read_string(entry, CATEGORY_ID)?,
    })
}
