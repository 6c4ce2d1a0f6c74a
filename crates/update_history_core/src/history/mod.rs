//! Update history enumeration.
//!
//! # Responsibility
//! - Obtain the history collection from a provider and marshal every entry.
//! - Own the collection handle and every item handle until close.
//!
//! # Invariants
//! - A returned `History` holds exactly `count` entries in source index order.
//! - Any field failure aborts the whole enumeration; every handle acquired so
//!   far is released exactly once before the error is returned.
//! - `close()` is safe to call repeatedly; dropping an open history closes it.

use crate::handle::{ExternalHandle, LookupError, PRESIZE_LIMIT};
use crate::marshal::{marshal_record, FieldError};
use crate::model::record::{Record, RecordData};
use log::{debug, error, info};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::Instant;

pub type HistoryResult<T> = Result<T, HistoryError>;

/// Errors surfaced while building a `History`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HistoryError {
    /// The provider could not report or return the history collection.
    Query(LookupError),
    /// The collection's `Count` could not be read.
    Count(LookupError),
    /// Fetching one entry from the collection failed.
    Item { index: usize, source: LookupError },
    /// One entry had unreadable fields; the enumeration was abandoned.
    Enumeration {
        index: usize,
        errors: Vec<FieldError>,
    },
}

impl Display for HistoryError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Query(err) => write!(f, "error querying update history: {err}"),
            Self::Count(err) => write!(f, "error getting history collection count: {err}"),
            Self::Item { index, source } => {
                write!(f, "error fetching history entry {index}: {source}")
            }
            Self::Enumeration { index, errors } => {
                let details = errors
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join("; ");
                write!(f, "errors in update enumeration at entry {index}: {details}")
            }
        }
    }
}

impl Error for HistoryError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Query(err) | Self::Count(err) => Some(err),
            Self::Item { source, .. } => Some(source),
            Self::Enumeration { errors, .. } => {
                errors.first().map(|err| err as &(dyn Error + 'static))
            }
        }
    }
}

/// Search-side collaborator that hands out the raw history collection.
pub trait HistoryProvider {
    /// Number of entries the update agent has recorded.
    fn total_history_count(&self) -> Result<i32, LookupError>;

    /// Returns a collection handle for entries `start..start + count`.
    fn query_history(&self, start: i32, count: i32) -> Result<ExternalHandle, LookupError>;
}

/// Window of the history to enumerate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HistoryQuery {
    pub offset: u32,
    /// `None` reads through the last recorded entry.
    pub limit: Option<u32>,
}

impl HistoryQuery {
    /// Clamps the window to `total` and returns `(start, count)`.
    pub fn window(&self, total: i32) -> (i32, i32) {
        let total = total.max(0);
        let start = i32::try_from(self.offset).unwrap_or(i32::MAX).min(total);
        let remaining = total - start;
        let count = match self.limit {
            Some(limit) => i32::try_from(limit).unwrap_or(i32::MAX).min(remaining),
            None => remaining,
        };
        (start, count)
    }
}

/// Ordered, read-only list of update history entries.
#[derive(Debug)]
pub struct History {
    collection: ExternalHandle,
    entries: Vec<Record>,
    closed: bool,
}

/// Reads the full update history from `provider`.
pub fn get<P>(provider: &P) -> HistoryResult<History>
where
    P: HistoryProvider + ?Sized,
{
    get_with(provider, &HistoryQuery::default())
}

/// Reads the window of the update history selected by `query`.
pub fn get_with<P>(provider: &P, query: &HistoryQuery) -> HistoryResult<History>
where
    P: HistoryProvider + ?Sized,
{
    let started_at = Instant::now();
    info!(
        "event=history_get module=history status=start offset={} limit={:?}",
        query.offset, query.limit
    );

    let result = provider
        .total_history_count()
        .and_then(|total| {
            if total < 0 {
                return Err(LookupError::out_of_range(
                    "TotalHistoryCount",
                    i64::from(total),
                ));
            }
            let (start, count) = query.window(total);
            provider.query_history(start, count)
        })
        .map_err(HistoryError::Query)
        .and_then(History::from_collection);

    match &result {
        Ok(history) => info!(
            "event=history_get module=history status=ok count={} duration_ms={}",
            history.count(),
            started_at.elapsed().as_millis()
        ),
        Err(err) => error!(
            "event=history_get module=history status=error duration_ms={} error={}",
            started_at.elapsed().as_millis(),
            err
        ),
    }
    result
}

impl History {
    /// Enumerates an already obtained history collection, taking ownership
    /// of its handle.
    ///
    /// On error no handle acquired here (nor `collection`) stays live.
    pub fn from_collection(collection: ExternalHandle) -> HistoryResult<Self> {
        // Dropping `history` on an early return releases the collection and
        // every stored entry.
        let mut history = Self {
            collection,
            entries: Vec::new(),
            closed: false,
        };

        let count = history.collection.count().map_err(HistoryError::Count)?;
        debug!("event=history_count module=history status=ok count={count}");
        history.entries.reserve_exact(count.min(PRESIZE_LIMIT));

        // Indexed access: enumerating this object class through an iterator
        // intermittently hangs.
        for index in 0..count {
            let item = history
                .collection
                .item(index)
                .map_err(|source| HistoryError::Item { index, source })?;
            let (record, errors) = marshal_record(item);
            if !errors.is_empty() {
                drop(record);
                history.close();
                return Err(HistoryError::Enumeration { index, errors });
            }
            history.entries.push(record);
        }

        Ok(history)
    }

    pub fn count(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[Record] {
        &self.entries
    }

    pub fn get(&self, index: usize) -> Option<&Record> {
        self.entries.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Record> {
        self.entries.iter()
    }

    /// Copies the entry data so it can outlive the external handles.
    pub fn snapshot(&self) -> Vec<RecordData> {
        self.entries.iter().map(|entry| entry.data().clone()).collect()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Releases the collection handle, then every entry handle in order.
    ///
    /// Entry data stays readable after close.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.collection.release();
        for entry in &mut self.entries {
            entry.release();
        }
        debug!(
            "event=history_close module=history status=ok entries={}",
            self.entries.len()
        );
    }
}

impl Drop for History {
    fn drop(&mut self) {
        self.close();
    }
}

impl<'a> IntoIterator for &'a History {
    type Item = &'a Record;
    type IntoIter = std::slice::Iter<'a, Record>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::HistoryQuery;

    #[test]
    fn default_query_covers_everything() {
        assert_eq!(HistoryQuery::default().window(12), (0, 12));
    }

    #[test]
    fn window_is_clamped_to_total() {
        let query = HistoryQuery {
            offset: 10,
            limit: Some(5),
        };
        assert_eq!(query.window(12), (10, 2));

        let past_end = HistoryQuery {
            offset: 40,
            limit: None,
        };
        assert_eq!(past_end.window(12), (12, 0));
    }

    #[test]
    fn window_over_empty_history_is_empty() {
        let query = HistoryQuery {
            offset: 0,
            limit: Some(3),
        };
        assert_eq!(query.window(0), (0, 0));
    }
}
