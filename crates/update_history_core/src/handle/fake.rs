//! In-memory `ExternalObject` implementation with release accounting.
//!
//! Every lookup that yields a nested object hands out a fresh reference and
//! records the acquisition in a shared `ReleaseLedger`, so callers can assert
//! that each acquired reference was released exactly once.
//!
//! Built for unit tests and under the `test_support` feature only.

use super::{ExternalHandle, ExternalObject, LookupError, PropertyValue, ITEM_PROPERTY};
use chrono::{DateTime, Utc};
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

/// Scripted property value of a `FakeObject`.
#[derive(Debug, Clone)]
pub enum FakeValue {
    Empty,
    Str(String),
    Int(i32),
    Timestamp(DateTime<Utc>),
    Object(FakeObject),
    /// The lookup itself fails with this message.
    Fail(String),
}

impl From<&str> for FakeValue {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

impl From<String> for FakeValue {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

impl From<i32> for FakeValue {
    fn from(value: i32) -> Self {
        Self::Int(value)
    }
}

impl From<DateTime<Utc>> for FakeValue {
    fn from(value: DateTime<Utc>) -> Self {
        Self::Timestamp(value)
    }
}

impl From<FakeObject> for FakeValue {
    fn from(value: FakeObject) -> Self {
        Self::Object(value)
    }
}

/// Template of an external object: named properties plus optional indexed
/// `Item` elements.
#[derive(Debug, Clone)]
pub struct FakeObject {
    label: String,
    properties: BTreeMap<String, FakeValue>,
    items: Vec<FakeValue>,
    ledger: ReleaseLedger,
}

impl FakeObject {
    pub fn new(ledger: &ReleaseLedger, label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            properties: BTreeMap::new(),
            items: Vec::new(),
            ledger: ledger.clone(),
        }
    }

    /// Creates a collection whose `Count` matches `items`.
    pub fn collection(
        ledger: &ReleaseLedger,
        label: impl Into<String>,
        items: impl IntoIterator<Item = FakeObject>,
    ) -> Self {
        Self::new(ledger, label).with_items(items.into_iter().map(FakeValue::Object))
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<FakeValue>) -> Self {
        self.properties.insert(name.into(), value.into());
        self
    }

    /// Replaces the indexed elements and sets `Count` to their number.
    pub fn with_items(mut self, items: impl IntoIterator<Item = FakeValue>) -> Self {
        self.items = items.into_iter().collect();
        let count = i32::try_from(self.items.len()).unwrap_or(i32::MAX);
        self.properties
            .insert("Count".to_string(), FakeValue::Int(count));
        self
    }

    /// Acquires a new reference to this object.
    pub fn open(&self) -> ExternalHandle {
        let id = self.ledger.acquire(&self.label);
        ExternalHandle::new(FakeReference {
            object: self.clone(),
            id,
        })
    }

    fn materialize(&self, property: &str, value: &FakeValue) -> Result<PropertyValue, LookupError> {
        match value {
            FakeValue::Empty => Ok(PropertyValue::Empty),
            FakeValue::Str(value) => Ok(PropertyValue::Str(value.clone())),
            FakeValue::Int(value) => Ok(PropertyValue::Int(*value)),
            FakeValue::Timestamp(value) => Ok(PropertyValue::Timestamp(*value)),
            FakeValue::Object(child) => Ok(PropertyValue::Object(child.open())),
            FakeValue::Fail(message) => Err(LookupError::call(property, message.clone())),
        }
    }
}

struct FakeReference {
    object: FakeObject,
    id: u64,
}

impl ExternalObject for FakeReference {
    fn get(&self, name: &str) -> Result<PropertyValue, LookupError> {
        match self.object.properties.get(name) {
            Some(value) => self.object.materialize(name, value),
            None => Err(LookupError::unknown(name)),
        }
    }

    fn get_indexed(&self, name: &str, index: i32) -> Result<PropertyValue, LookupError> {
        if name != ITEM_PROPERTY {
            return Err(LookupError::unknown(name));
        }
        let property = format!("{name}[{index}]");
        let value = usize::try_from(index)
            .ok()
            .and_then(|slot| self.object.items.get(slot))
            .ok_or_else(|| LookupError::call(property.as_str(), "index out of range"))?;
        self.object.materialize(&property, value)
    }

    fn release(self: Box<Self>) {
        self.object.ledger.release(self.id);
    }
}

/// Shared acquire/release accounting for fake references.
#[derive(Debug, Clone, Default)]
pub struct ReleaseLedger {
    state: Rc<RefCell<LedgerState>>,
}

#[derive(Debug, Default)]
struct LedgerState {
    next_id: u64,
    live: BTreeMap<u64, String>,
    acquired: Vec<String>,
    released: Vec<String>,
    double_releases: usize,
}

impl ReleaseLedger {
    pub fn new() -> Self {
        Self::default()
    }

    fn acquire(&self, label: &str) -> u64 {
        let mut state = self.state.borrow_mut();
        let id = state.next_id;
        state.next_id += 1;
        state.live.insert(id, label.to_string());
        state.acquired.push(label.to_string());
        id
    }

    fn release(&self, id: u64) {
        let mut state = self.state.borrow_mut();
        match state.live.remove(&id) {
            Some(label) => state.released.push(label),
            None => state.double_releases += 1,
        }
    }

    pub fn acquired(&self) -> usize {
        self.state.borrow().acquired.len()
    }

    pub fn released(&self) -> usize {
        self.state.borrow().released.len()
    }

    pub fn outstanding(&self) -> usize {
        self.state.borrow().live.len()
    }

    pub fn double_releases(&self) -> usize {
        self.state.borrow().double_releases
    }

    pub fn acquired_for(&self, label: &str) -> usize {
        count_label(&self.state.borrow().acquired, label)
    }

    pub fn released_for(&self, label: &str) -> usize {
        count_label(&self.state.borrow().released, label)
    }

    /// Labels of references acquired but not yet released, by acquisition.
    pub fn outstanding_labels(&self) -> Vec<String> {
        self.state.borrow().live.values().cloned().collect()
    }

    /// Labels in the order their references were released.
    pub fn release_order(&self) -> Vec<String> {
        self.state.borrow().released.clone()
    }

    /// True when every acquired reference was released exactly once.
    pub fn is_balanced(&self) -> bool {
        let state = self.state.borrow();
        state.live.is_empty() && state.double_releases == 0
    }
}

fn count_label(labels: &[String], label: &str) -> usize {
    labels.iter().filter(|value| value.as_str() == label).count()
}

#[cfg(test)]
mod tests {
    use super::{FakeObject, FakeValue, ReleaseLedger};
    use crate::handle::{LookupErrorKind, PropertyValue};

    #[test]
    fn each_nested_lookup_acquires_a_new_reference() {
        let ledger = ReleaseLedger::new();
        let root = FakeObject::new(&ledger, "root")
            .with("Child", FakeObject::new(&ledger, "child"))
            .open();

        let first = root.get_object("Child").expect("first lookup");
        let second = root.get_object("Child").expect("second lookup");
        assert_eq!(ledger.acquired_for("child"), 2);
        assert_eq!(ledger.outstanding(), 3);

        drop(first);
        drop(second);
        drop(root);
        assert!(ledger.is_balanced());
        assert_eq!(ledger.release_order(), vec!["child", "child", "root"]);
    }

    #[test]
    fn collection_reports_count_and_indexed_items() {
        let ledger = ReleaseLedger::new();
        let collection = FakeObject::collection(
            &ledger,
            "collection",
            vec![
                FakeObject::new(&ledger, "item-0"),
                FakeObject::new(&ledger, "item-1"),
            ],
        )
        .open();

        assert_eq!(collection.count().expect("count"), 2);
        let item = collection.item(1).expect("item 1");
        assert_eq!(ledger.acquired_for("item-1"), 1);
        drop(item);

        let err = collection.item(2).expect_err("index 2 is out of range");
        assert_eq!(err.property, "Item[2]");
    }

    #[test]
    fn scripted_failures_and_unknown_properties_are_distinct() {
        let ledger = ReleaseLedger::new();
        let root = FakeObject::new(&ledger, "root")
            .with("Broken", FakeValue::Fail("rpc unavailable".to_string()))
            .with("Blank", FakeValue::Empty)
            .open();

        let broken = root.get("Broken").expect_err("scripted failure");
        assert_eq!(
            broken.kind,
            LookupErrorKind::Call("rpc unavailable".to_string())
        );
        let unknown = root.get("Nope").expect_err("unknown property");
        assert_eq!(unknown.kind, LookupErrorKind::UnknownProperty);
        assert!(matches!(root.get("Blank"), Ok(PropertyValue::Empty)));
    }
}
