//! Gate status resolution.
//!
//! The gate has no stored state field. Its status at any instant is the
//! status of the latest state-affecting record at or before that instant.

use chrono::NaiveDateTime;

use crate::types::{OperationRecord, OperationStatus};

/// Latest state-affecting record with `timestamp <= at`.
///
/// Ties on timestamp go to the highest id. `Denied` and `TimeRestricted`
/// records are never returned. `None` means the gate was never operated
/// (as of `at`).
pub fn resolve(records: &[OperationRecord], at: NaiveDateTime) -> Option<&OperationRecord> {
    records
        .iter()
        .filter(|r| r.affects_state() && r.timestamp <= at)
        .max_by_key(|r| (r.timestamp, r.id))
}

/// Status half of [`resolve`]
pub fn current_status(records: &[OperationRecord], at: NaiveDateTime) -> Option<OperationStatus> {
    resolve(records, at).map(|r| r.status)
}
