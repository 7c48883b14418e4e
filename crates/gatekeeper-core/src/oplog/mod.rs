//! ============================================================================
//! Operation Log - Append-only audit trail of gate operations
//! ============================================================================
//! The log is the single source of truth for gate state. Records are kept
//! newest first (append-by-prepend); nothing downstream relies on that order.
//!
//! ## Layout
//! - [`OperationLog`]: in-memory sequence with id allocation
//! - [`status`]: derives the gate state at a point in time
//! - [`history`]: display history with open durations and statistics
//! ============================================================================

pub mod history;
pub mod status;

pub use history::{process, DashboardSnapshot, DisplayRecord, LogStatistics, DURATION_UNKNOWN, UID_PLACEHOLDER};
pub use status::{current_status, resolve};

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::types::{GateError, OperationReason, OperationRecord, OperationStatus};

/// Ordered operation records, newest first
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OperationLog {
    records: Vec<OperationRecord>,
}

impl OperationLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_records(records: Vec<OperationRecord>) -> Self {
        Self { records }
    }

    pub fn records(&self) -> &[OperationRecord] {
        &self.records
    }

    pub fn into_records(self) -> Vec<OperationRecord> {
        self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Highest id present in the log
    pub fn last_id(&self) -> Option<u64> {
        self.records.iter().map(|r| r.id).max()
    }

    /// Next free id: last id + 1, or 1 for an empty log. `None` once the
    /// id space is used up.
    pub fn next_id(&self) -> Option<u64> {
        match self.last_id() {
            Some(id) => id.checked_add(1),
            None => Some(1),
        }
    }

    pub fn contains_id(&self, id: u64) -> bool {
        self.records.iter().any(|r| r.id == id)
    }

    pub fn get(&self, id: u64) -> Option<&OperationRecord> {
        self.records.iter().find(|r| r.id == id)
    }

    /// Prepend a record. Returns `false` (and leaves the log untouched) if
    /// the id is already taken.
    pub fn push(&mut self, record: OperationRecord) -> bool {
        if self.contains_id(record.id) {
            return false;
        }
        self.records.insert(0, record);
        true
    }

    /// Allocate the next id and prepend a new record
    pub fn append(
        &mut self,
        timestamp: NaiveDateTime,
        status: OperationStatus,
        reason: OperationReason,
        uid: Option<String>,
    ) -> Result<OperationRecord, GateError> {
        let id = self.next_id().ok_or_else(id_space_exhausted)?;
        let record = OperationRecord::new(id, timestamp, status, reason, uid);
        self.records.insert(0, record.clone());
        Ok(record)
    }

    pub fn clear(&mut self) -> usize {
        let count = self.records.len();
        self.records.clear();
        count
    }
}

pub(crate) fn id_space_exhausted() -> GateError {
    GateError::Internal(format!("operation id space exhausted (last id {})", u64::MAX))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 6, 1)
            .unwrap()
            .and_hms_opt(8, 0, s)
            .unwrap()
    }

    #[test]
    fn test_first_id_is_one() {
        let mut log = OperationLog::new();
        assert_eq!(log.next_id(), Some(1));
        let rec = log.append(at(0), OperationStatus::Denied, OperationReason::Nfc, Some("A1".into())).unwrap();
        assert_eq!(rec.id, 1);
        assert_eq!(log.next_id(), Some(2));
    }

    #[test]
    fn test_append_prepends() {
        let mut log = OperationLog::new();
        log.append(at(0), OperationStatus::Opened, OperationReason::Manual, None).unwrap();
        log.append(at(5), OperationStatus::Closed, OperationReason::Manual, None).unwrap();
        let ids: Vec<u64> = log.records().iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![2, 1]);
    }

    #[test]
    fn test_next_id_ignores_storage_order() {
        let log = OperationLog::from_records(vec![
            OperationRecord::new(3, at(3), OperationStatus::Closed, OperationReason::Manual, None),
            OperationRecord::new(9, at(9), OperationStatus::Opened, OperationReason::Manual, None),
            OperationRecord::new(4, at(4), OperationStatus::Opened, OperationReason::Manual, None),
        ]);
        assert_eq!(log.next_id(), Some(10));
    }

    #[test]
    fn test_push_rejects_duplicate_id() {
        let mut log = OperationLog::new();
        let rec = log.append(at(0), OperationStatus::Opened, OperationReason::Nfc, Some("A".into())).unwrap();
        let dup = OperationRecord::new(rec.id, at(1), OperationStatus::Closed, OperationReason::AutoNfc, None);
        assert!(!log.push(dup));
        assert_eq!(log.len(), 1);
    }

    #[test]
    fn test_clear() {
        let mut log = OperationLog::new();
        log.append(at(0), OperationStatus::Opened, OperationReason::Manual, None).unwrap();
        assert_eq!(log.clear(), 1);
        assert!(log.is_empty());
        assert_eq!(log.next_id(), Some(1));
    }

    #[test]
    fn test_exhausted_id_space_is_an_error() {
        let mut log = OperationLog::from_records(vec![OperationRecord::new(
            u64::MAX,
            at(0),
            OperationStatus::Closed,
            OperationReason::Manual,
            None,
        )]);
        assert_eq!(log.next_id(), None);
        let err = log
            .append(at(1), OperationStatus::Opened, OperationReason::Manual, None)
            .unwrap_err();
        assert!(matches!(err, GateError::Internal(_)));
        assert_eq!(log.len(), 1);
    }
}
