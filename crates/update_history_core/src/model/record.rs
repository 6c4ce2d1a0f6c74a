//! Update history record model.
//!
//! # Responsibility
//! - Define the typed shape of one update-history event.
//! - Provide typed views over the raw operation/result/server codes.
//!
//! # Invariants
//! - A `Record` owns the item handle it was read from until its history is
//!   closed or dropped.
//! - Raw integer codes stay authoritative; typed views return `None` for
//!   codes they do not know.

use crate::handle::ExternalHandle;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Identity of the update an entry refers to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub revision_number: i32,
    /// GUID string as reported by the update agent.
    pub update_id: String,
}

impl Identity {
    /// Parses `update_id` as a GUID. Returns `None` when malformed.
    pub fn update_uuid(&self) -> Option<Uuid> {
        Uuid::parse_str(self.update_id.trim()).ok()
    }
}

/// One category an update belongs to (product, classification, ...).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub name: String,
    /// Serialized as `type` to match the source attribute name.
    #[serde(rename = "type")]
    pub kind: String,
    pub category_id: String,
}

impl Category {
    pub fn category_uuid(&self) -> Option<Uuid> {
        Uuid::parse_str(self.category_id.trim()).ok()
    }
}

/// Plain data of one history entry, detached from any external handle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordData {
    pub operation: i32,
    pub result_code: i32,
    pub hresult: i32,
    /// Unix epoch when the source reported no date.
    pub date: DateTime<Utc>,
    pub identity: Identity,
    pub title: String,
    pub description: String,
    pub unmapped_result_code: i32,
    pub client_application_id: String,
    pub server_selection: i32,
    pub service_id: String,
    pub uninstallation_notes: String,
    pub support_url: String,
    /// Source order; malformed categories are omitted.
    pub categories: Vec<Category>,
}

impl RecordData {
    pub fn operation_kind(&self) -> Option<UpdateOperation> {
        UpdateOperation::from_code(self.operation)
    }

    pub fn result(&self) -> Option<OperationResult> {
        OperationResult::from_code(self.result_code)
    }

    pub fn server(&self) -> Option<ServerSelection> {
        ServerSelection::from_code(self.server_selection)
    }
}

/// Typed record of one update-history event plus its owned item handle.
#[derive(Debug)]
pub struct Record {
    data: RecordData,
    handle: ExternalHandle,
}

impl Record {
    pub(crate) fn new(data: RecordData, handle: ExternalHandle) -> Self {
        Self { data, handle }
    }

    pub fn data(&self) -> &RecordData {
        &self.data
    }

    pub fn title(&self) -> &str {
        &self.data.title
    }

    pub fn identity(&self) -> &Identity {
        &self.data.identity
    }

    pub fn date(&self) -> DateTime<Utc> {
        self.data.date
    }

    pub fn categories(&self) -> &[Category] {
        &self.data.categories
    }

    pub fn operation_kind(&self) -> Option<UpdateOperation> {
        self.data.operation_kind()
    }

    pub fn result(&self) -> Option<OperationResult> {
        self.data.result()
    }

    pub fn server(&self) -> Option<ServerSelection> {
        self.data.server()
    }

    /// Whether the underlying item handle has been released.
    pub fn is_released(&self) -> bool {
        self.handle.is_released()
    }

    pub(crate) fn release(&mut self) {
        self.handle.release();
    }
}

impl Display for Record {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let data = &self.data;
        writeln!(f, "Title: {}", data.title)?;
        writeln!(
            f,
            "UpdateIdentity: revision={} id={}",
            data.identity.revision_number, data.identity.update_id
        )?;
        writeln!(f, "ClientApplicationID: {}", data.client_application_id)?;
        writeln!(f, "SupportURL: {}", data.support_url)?;
        let names = data
            .categories
            .iter()
            .map(|category| format!("{} ({})", category.name, category.kind))
            .collect::<Vec<_>>();
        write!(f, "Categories: [{}]", names.join(", "))
    }
}

/// Operation recorded by a history entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateOperation {
    Installation,
    Uninstallation,
}

impl UpdateOperation {
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            1 => Some(Self::Installation),
            2 => Some(Self::Uninstallation),
            _ => None,
        }
    }

    pub fn code(self) -> i32 {
        match self {
            Self::Installation => 1,
            Self::Uninstallation => 2,
        }
    }
}

/// Outcome of the recorded operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationResult {
    NotStarted,
    InProgress,
    Succeeded,
    SucceededWithErrors,
    Failed,
    Aborted,
}

impl OperationResult {
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(Self::NotStarted),
            1 => Some(Self::InProgress),
            2 => Some(Self::Succeeded),
            3 => Some(Self::SucceededWithErrors),
            4 => Some(Self::Failed),
            5 => Some(Self::Aborted),
            _ => None,
        }
    }

    pub fn code(self) -> i32 {
        match self {
            Self::NotStarted => 0,
            Self::InProgress => 1,
            Self::Succeeded => 2,
            Self::SucceededWithErrors => 3,
            Self::Failed => 4,
            Self::Aborted => 5,
        }
    }

    /// True for `Succeeded` and `SucceededWithErrors`.
    pub fn is_success(self) -> bool {
        matches!(self, Self::Succeeded | Self::SucceededWithErrors)
    }
}

/// Update source the operation was performed against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServerSelection {
    Default,
    ManagedServer,
    WindowsUpdate,
    Others,
}

impl ServerSelection {
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(Self::Default),
            1 => Some(Self::ManagedServer),
            2 => Some(Self::WindowsUpdate),
            3 => Some(Self::Others),
            _ => None,
        }
    }

    pub fn code(self) -> i32 {
        match self {
            Self::Default => 0,
            Self::ManagedServer => 1,
            Self::WindowsUpdate => 2,
            Self::Others => 3,
        }
    }
}
