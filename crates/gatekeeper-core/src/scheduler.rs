//! ============================================================================
//! Auto-Close Scheduler - Deferred gate close after a badge grant
//! ============================================================================
//! Each grant arms one timer keyed by the opening record's id. Timers live in
//! memory only; a restart forgets them.
//!
//! The table is only touched under the controller's state lock. A firing
//! timer re-acquires that lock and checks that its own entry is still in the
//! table before writing, so a cancel that wins the lock always prevents the
//! close record. A timer that already wrote its record before the cancel
//! arrived is not undone.
//! ============================================================================

use chrono::NaiveDateTime;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::controller::GateCore;
use crate::oplog::{current_status, OperationLog};
use crate::types::{OperationReason, OperationRecord, OperationStatus};

/// Seconds between a grant and the automatic close
pub const AUTO_CLOSE_DELAY_SECS: u64 = 10;

/// One armed timer
#[derive(Debug)]
pub struct PendingClose {
    pub uid: String,
    pub armed_at: NaiveDateTime,
    token: u64,
    handle: JoinHandle<()>,
}

/// Opening record id → armed timer
#[derive(Debug, Default)]
pub struct TimerTable {
    pending: HashMap<u64, PendingClose>,
    next_token: u64,
}

impl TimerTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn contains(&self, open_id: u64) -> bool {
        self.pending.contains_key(&open_id)
    }

    pub fn get(&self, open_id: u64) -> Option<&PendingClose> {
        self.pending.get(&open_id)
    }

    /// Armed opening ids, ascending
    pub fn ids(&self) -> Vec<u64> {
        let mut ids: Vec<u64> = self.pending.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    fn allocate_token(&mut self) -> u64 {
        self.next_token += 1;
        self.next_token
    }

    fn insert(&mut self, open_id: u64, entry: PendingClose) {
        if let Some(previous) = self.pending.insert(open_id, entry) {
            previous.handle.abort();
        }
    }

    /// Whether `token` still owns the entry for `open_id`
    fn is_current(&self, open_id: u64, token: u64) -> bool {
        self.pending
            .get(&open_id)
            .is_some_and(|entry| entry.token == token)
    }

    /// Remove a fired timer's own entry
    fn complete(&mut self, open_id: u64) {
        self.pending.remove(&open_id);
    }

    /// Abort and remove a pending timer. Cancelling an unknown id is a no-op.
    pub fn cancel(&mut self, open_id: u64) -> bool {
        match self.pending.remove(&open_id) {
            Some(entry) => {
                entry.handle.abort();
                info!("Cancelled auto-close for operation {}", open_id);
                true
            }
            None => false,
        }
    }

    pub fn cancel_all(&mut self) -> usize {
        let count = self.pending.len();
        for (_, entry) in self.pending.drain() {
            entry.handle.abort();
        }
        if count > 0 {
            info!("Cancelled {} pending auto-close timers", count);
        }
        count
    }
}

/// Spawn the deferred close for `open_id` and record it in `timers`.
///
/// Must be called with the controller's state lock held (`timers` is part of
/// that state); the spawned task waits for the same lock before acting.
pub(crate) fn arm(
    core: &Arc<GateCore>,
    timers: &mut TimerTable,
    open_id: u64,
    uid: &str,
    armed_at: NaiveDateTime,
    delay: Duration,
) {
    let token = timers.allocate_token();
    let task_core = Arc::clone(core);
    let task_uid = uid.to_string();

    let handle = tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        task_core.fire_auto_close(open_id, token, &task_uid).await;
    });

    timers.insert(
        open_id,
        PendingClose {
            uid: uid.to_string(),
            armed_at,
            token,
            handle,
        },
    );
    info!(
        "Armed auto-close for operation {} (badge {}) in {}s",
        open_id,
        uid,
        delay.as_secs()
    );
}

/// Claim the table entry for a firing timer. `false` means it was cancelled
/// (or superseded) while waiting for the lock.
pub(crate) fn claim(timers: &mut TimerTable, open_id: u64, token: u64) -> bool {
    if !timers.is_current(open_id, token) {
        debug!("Auto-close for operation {} was cancelled", open_id);
        return false;
    }
    timers.complete(open_id);
    true
}

/// Append the automatic close for `open_id`, unless the gate is already closed.
///
/// The close takes id `open_id + 1`; if that id is already taken the next
/// free id is used instead so ids stay unique. Skipped when no id is left.
pub fn auto_close(
    log: &mut OperationLog,
    open_id: u64,
    uid: &str,
    now: NaiveDateTime,
) -> Option<OperationRecord> {
    if current_status(log.records(), now) == Some(OperationStatus::Closed) {
        debug!("Gate already closed, skipping auto-close for operation {}", open_id);
        return None;
    }

    let id = match open_id.checked_add(1) {
        Some(preferred) if !log.contains_id(preferred) => Some(preferred),
        _ => log.next_id(),
    };
    let Some(id) = id else {
        error!("No operation id left for auto-close of operation {}", open_id);
        return None;
    };

    let record = OperationRecord::new(
        id,
        now,
        OperationStatus::Closed,
        OperationReason::AutoNfc,
        Some(uid.to_string()),
    );
    log.push(record.clone());
    info!("Auto-closed gate for operation {} (id {})", open_id, id);
    Some(record)
}
