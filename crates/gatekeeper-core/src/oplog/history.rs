//! Display history for the dashboard.
//!
//! Pairs each `Opened` record with the `Closed` record whose id is exactly
//! one higher and reports the open duration. A gap in ids breaks pairing;
//! no further search is made.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::status::current_status;
use crate::types::{OperationReason, OperationRecord, OperationStatus};

/// Duration shown when no adjacent close exists
pub const DURATION_UNKNOWN: &str = "unknown";

/// Shown in place of a missing badge id
pub const UID_PLACEHOLDER: &str = "-";

/// One row of the display history
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayRecord {
    #[serde(with = "crate::types::id_string")]
    pub id: u64,
    #[serde(with = "crate::types::timestamp_string")]
    pub timestamp: NaiveDateTime,
    pub status: OperationStatus,
    pub reason: OperationReason,
    pub uid: String,
    /// Whole seconds the gate stayed open, or [`DURATION_UNKNOWN`]
    pub duration: String,
}

/// Build the display history, most recent first
pub fn process(records: &[OperationRecord]) -> Vec<DisplayRecord> {
    let mut ascending: Vec<&OperationRecord> = records.iter().collect();
    ascending.sort_by_key(|r| r.id);

    let closes: HashMap<u64, &OperationRecord> = ascending
        .iter()
        .filter(|r| r.status == OperationStatus::Closed)
        .map(|r| (r.id, *r))
        .collect();

    let mut display: Vec<DisplayRecord> = ascending
        .into_iter()
        .map(|record| {
            let duration = match record.status {
                OperationStatus::Opened => record
                    .id
                    .checked_add(1)
                    .and_then(|close_id| closes.get(&close_id))
                    .map(|close| (close.timestamp - record.timestamp).num_seconds().to_string())
                    .unwrap_or_else(|| DURATION_UNKNOWN.to_string()),
                _ => DURATION_UNKNOWN.to_string(),
            };

            DisplayRecord {
                id: record.id,
                timestamp: record.timestamp,
                status: record.status,
                reason: record.reason,
                uid: record
                    .uid
                    .clone()
                    .unwrap_or_else(|| UID_PLACEHOLDER.to_string()),
                duration,
            }
        })
        .collect();

    display.reverse();
    display
}

/// Counters shown above the history table
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogStatistics {
    pub total_operations: usize,
    pub open_count: usize,
    pub closed_count: usize,
    pub denied_count: usize,
    pub time_restricted_count: usize,
    pub last_operation: Option<DisplayRecord>,
}

impl LogStatistics {
    /// Expects `display` in [`process`] order (most recent first)
    pub fn from_display(display: &[DisplayRecord]) -> Self {
        let count = |status: OperationStatus| display.iter().filter(|r| r.status == status).count();

        Self {
            total_operations: display.len(),
            open_count: count(OperationStatus::Opened),
            closed_count: count(OperationStatus::Closed),
            denied_count: count(OperationStatus::Denied),
            time_restricted_count: count(OperationStatus::TimeRestricted),
            last_operation: display.first().cloned(),
        }
    }
}

/// Everything the dashboard renders in one read
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DashboardSnapshot {
    pub operations: Vec<DisplayRecord>,
    pub stats: LogStatistics,
    pub current_status: Option<OperationStatus>,
}

impl DashboardSnapshot {
    /// Records stamped after `now` are left out of history and statistics
    pub fn build(records: &[OperationRecord], now: NaiveDateTime) -> Self {
        let past: Vec<OperationRecord> = records
            .iter()
            .filter(|r| r.timestamp <= now)
            .cloned()
            .collect();

        let operations = process(&past);
        let stats = LogStatistics::from_display(&operations);

        Self {
            operations,
            stats,
            current_status: current_status(records, now),
        }
    }
}
