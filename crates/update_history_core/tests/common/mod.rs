#![allow(dead_code)]

use chrono::{DateTime, TimeZone, Utc};
use update_history_core::handle::fake::{FakeObject, ReleaseLedger};
use update_history_core::{ExternalHandle, HistoryProvider, LookupError};

pub fn entry_date(index: usize) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2019, 4, 1 + index as u32, 12, 0, 0)
        .single()
        .expect("valid fixture date")
}

pub fn category(ledger: &ReleaseLedger, label: &str, name: &str, kind: &str) -> FakeObject {
    FakeObject::new(ledger, label)
        .with("Name", name)
        .with("Type", kind)
        .with("CategoryID", format!("{name}-category"))
}

/// A fully readable history entry labelled `item-{index}`.
pub fn entry(ledger: &ReleaseLedger, index: usize) -> FakeObject {
    let revision = i32::try_from(100 + index).expect("small index");
    FakeObject::new(ledger, format!("item-{index}"))
        .with("Operation", 1)
        .with("ResultCode", 2)
        .with("HResult", 0)
        .with("Date", entry_date(index))
        .with(
            "UpdateIdentity",
            FakeObject::new(ledger, format!("identity-{index}"))
                .with("RevisionNumber", revision)
                .with("UpdateID", format!("00000000-0000-4000-8000-00000000000{index}")),
        )
        .with("Title", format!("Update {index}"))
        .with("Description", format!("Description of update {index}"))
        .with("UnmappedResultCode", 0)
        .with("ClientApplicationID", "AutomaticUpdates")
        .with("ServerSelection", 2)
        .with("ServiceID", "9482f4b4-e343-43b6-b170-9a65bc822c77")
        .with("UninstallationNotes", "This update cannot be removed.")
        .with("SupportURL", format!("https://support.example.com/kb/{index}"))
        .with(
            "Categories",
            FakeObject::collection(
                ledger,
                format!("categories-{index}"),
                vec![
                    category(
                        ledger,
                        &format!("category-{index}-0"),
                        "Windows 10",
                        "Product",
                    ),
                    category(
                        ledger,
                        &format!("category-{index}-1"),
                        "Security Updates",
                        "UpdateClassification",
                    ),
                ],
            ),
        )
}

pub fn collection_of(ledger: &ReleaseLedger, entries: Vec<FakeObject>) -> FakeObject {
    FakeObject::collection(ledger, "collection", entries)
}

/// Provider serving a fixed list of entries.
pub struct FakeProvider {
    pub ledger: ReleaseLedger,
    pub entries: Vec<FakeObject>,
    pub query_failure: Option<String>,
    pub total_failure: Option<String>,
    /// Reported in place of the real entry count when set.
    pub reported_total: Option<i32>,
}

impl FakeProvider {
    pub fn new(ledger: &ReleaseLedger, entries: Vec<FakeObject>) -> Self {
        Self {
            ledger: ledger.clone(),
            entries,
            query_failure: None,
            total_failure: None,
            reported_total: None,
        }
    }
}

impl HistoryProvider for FakeProvider {
    fn total_history_count(&self) -> Result<i32, LookupError> {
        if let Some(message) = &self.total_failure {
            return Err(LookupError::call("TotalHistoryCount", message.clone()));
        }
        if let Some(total) = self.reported_total {
            return Ok(total);
        }
        Ok(i32::try_from(self.entries.len()).expect("small fixture"))
    }

    fn query_history(&self, start: i32, count: i32) -> Result<ExternalHandle, LookupError> {
        if let Some(message) = &self.query_failure {
            return Err(LookupError::call("QueryHistory", message.clone()));
        }
        let start = usize::try_from(start).expect("non-negative start");
        let count = usize::try_from(count).expect("non-negative count");
        let window = self.entries[start..start + count].to_vec();
        Ok(collection_of(&self.ledger, window).open())
    }
}
