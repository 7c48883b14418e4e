//! ============================================================================
//! Gate Controller - Serialized access to log, registry and timers
//! ============================================================================
//! Owns the in-memory state and is the only writer. Every mutation (badge
//! decision, manual control, auto-close, registry edit, log clear) runs under
//! one async mutex, so id allocation and timer bookkeeping never race.
//!
//! Persistence is best-effort: the in-memory state stays authoritative and
//! a failed save is only logged.
//! ============================================================================

use anyhow::Result;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::access::{self, AccessDecision, BadgeEvent, PermissionEntry, PermissionRegistry};
use crate::actuator::{Actuator, HttpActuator};
use crate::config::{GateConfig, StorageBackend};
use crate::db::{GateDb, GateStore, JsonFileStore};
use crate::oplog::{self, resolve, DashboardSnapshot, OperationLog};
use crate::scheduler::{self, TimerTable};
use crate::types::{
    local_now, ControlAction, ControlOutcome, GateError, OperationReason, OperationRecord,
    OperationStatus,
};

/// Everything guarded by the controller lock
pub(crate) struct GateState {
    log: OperationLog,
    registry: PermissionRegistry,
    timers: TimerTable,
}

pub(crate) struct GateCore {
    state: Mutex<GateState>,
    store: Arc<dyn GateStore>,
    actuator: Arc<dyn Actuator>,
    auto_close_delay: Duration,
}

/// Current gate status as derived from the log
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct GateStatus {
    pub status: Option<OperationStatus>,
    pub operation: Option<OperationRecord>,
}

/// Cheaply cloneable handle to one gate's state
#[derive(Clone)]
pub struct GateController {
    core: Arc<GateCore>,
}

impl GateController {
    /// Load state from `store`. Unreadable state degrades to empty.
    pub fn new(store: Arc<dyn GateStore>, actuator: Arc<dyn Actuator>, auto_close_delay: Duration) -> Self {
        let log = match store.load_operations() {
            Ok(records) => OperationLog::from_records(records),
            Err(e) => {
                warn!("Failed to load operation log: {} - starting empty", e);
                OperationLog::new()
            }
        };
        let registry = match store.load_permissions() {
            Ok(registry) => registry,
            Err(e) => {
                warn!("Failed to load badge registry: {} - starting empty", e);
                PermissionRegistry::new()
            }
        };

        info!(
            "Gate controller ready: {} operations, {} badges",
            log.len(),
            registry.len()
        );

        Self {
            core: Arc::new(GateCore {
                state: Mutex::new(GateState {
                    log,
                    registry,
                    timers: TimerTable::new(),
                }),
                store,
                actuator,
                auto_close_delay,
            }),
        }
    }

    /// Build store and HTTP actuator from configuration
    pub fn from_config(config: &GateConfig) -> Result<Self> {
        let store: Arc<dyn GateStore> = match config.backend {
            StorageBackend::Json => {
                let store = JsonFileStore::new(&config.operations_path, &config.permissions_path);
                store.ensure_permissions_file()?;
                Arc::new(store)
            }
            StorageBackend::Redb => Arc::new(GateDb::open(config.db_path.as_deref())?),
        };
        let actuator = Arc::new(HttpActuator::from_config(config)?);
        Ok(Self::new(store, actuator, config.auto_close_delay))
    }

    // ========================================================================
    // Badge Events
    // ========================================================================

    /// Handle a raw `{"uid": "..."}` payload
    pub async fn handle_badge_payload(&self, payload: &str) -> Result<AccessDecision, GateError> {
        let event = BadgeEvent::parse(payload)?;
        self.handle_badge(&event.uid).await
    }

    /// Decide on a badge presented now
    pub async fn handle_badge(&self, uid: &str) -> Result<AccessDecision, GateError> {
        self.handle_badge_at(uid, local_now()).await
    }

    /// Decide on a badge presented at `now`. Grants arm the auto-close timer.
    pub async fn handle_badge_at(
        &self,
        uid: &str,
        now: chrono::NaiveDateTime,
    ) -> Result<AccessDecision, GateError> {
        if uid.is_empty() {
            return Err(GateError::MalformedPayload("parameter 'uid' is missing".into()));
        }

        let mut guard = self.core.state.lock().await;
        let state = &mut *guard;

        let decision = access::decide(uid, &mut state.log, &state.registry, now)?;

        if let AccessDecision::Logged { record, .. } = &decision {
            self.core.persist_operations(&state.log);
            if decision.granted() {
                scheduler::arm(
                    &self.core,
                    &mut state.timers,
                    record.id,
                    uid,
                    now,
                    self.core.auto_close_delay,
                );
            }
        }

        Ok(decision)
    }

    // ========================================================================
    // Manual Control
    // ========================================================================

    /// Manually open or close the gate through the actuator.
    ///
    /// The lock is held across the actuator call, so concurrent control
    /// requests are decided one after another against fresh state.
    pub async fn control(&self, action: ControlAction) -> Result<ControlOutcome, GateError> {
        let mut guard = self.core.state.lock().await;
        let state = &mut *guard;

        let last = resolve(state.log.records(), local_now()).cloned();
        let current = last.as_ref().map(|r| r.status);
        let armed_nfc_open = last
            .as_ref()
            .filter(|r| r.reason == OperationReason::Nfc && state.timers.contains(r.id))
            .map(|r| r.id);

        match (action, current) {
            (ControlAction::Open, Some(OperationStatus::Opened)) => {
                info!("Rejected manual open: gate already open");
                return Err(GateError::AlreadyOpen);
            }
            (ControlAction::Close, Some(OperationStatus::Closed)) => {
                if let Some(open_id) = armed_nfc_open {
                    state.timers.cancel(open_id);
                }
                info!("Rejected manual close: gate already closed");
                return Err(GateError::AlreadyClosed);
            }
            _ => {}
        }

        if state.log.next_id().is_none() {
            error!("Manual {} refused: operation ids exhausted", action);
            return Err(oplog::id_space_exhausted());
        }

        if let Some(err) = self.core.actuator.send(action).await.into_error() {
            warn!("Manual {} failed: {}", action, err);
            return Err(err);
        }

        let record = state.log.append(
            local_now(),
            action.resulting_status(),
            OperationReason::Manual,
            None,
        )?;
        self.core.persist_operations(&state.log);

        let cancelled_timer = match (action, current, armed_nfc_open) {
            (ControlAction::Close, Some(OperationStatus::Opened), Some(open_id)) => {
                state.timers.cancel(open_id).then_some(open_id)
            }
            _ => None,
        };

        info!("Manual {} logged as operation {}", action, record.id);
        Ok(ControlOutcome {
            action,
            record,
            cancelled_timer,
        })
    }

    /// Parse an action name and run [`control`](Self::control)
    pub async fn control_str(&self, action: &str) -> Result<ControlOutcome, GateError> {
        self.control(ControlAction::parse(action)?).await
    }

    // ========================================================================
    // Log
    // ========================================================================

    /// Empty the log and cancel every pending auto-close. Returns the number
    /// of removed records.
    pub async fn clear_log(&self) -> usize {
        let mut state = self.core.state.lock().await;
        state.timers.cancel_all();
        let removed = state.log.clear();
        self.core.persist_operations(&state.log);
        info!("Cleared operation log ({} records)", removed);
        removed
    }

    pub async fn status(&self) -> GateStatus {
        let state = self.core.state.lock().await;
        let operation = resolve(state.log.records(), local_now()).cloned();
        GateStatus {
            status: operation.as_ref().map(|r| r.status),
            operation,
        }
    }

    pub async fn operations(&self) -> Vec<OperationRecord> {
        self.core.state.lock().await.log.records().to_vec()
    }

    pub async fn dashboard(&self) -> DashboardSnapshot {
        let state = self.core.state.lock().await;
        DashboardSnapshot::build(state.log.records(), local_now())
    }

    /// Opening ids with an armed auto-close
    pub async fn pending_timers(&self) -> Vec<u64> {
        self.core.state.lock().await.timers.ids()
    }

    // ========================================================================
    // Registry Management
    // ========================================================================

    pub async fn list_permissions(&self) -> BTreeMap<String, PermissionEntry> {
        self.core.state.lock().await.registry.list().clone()
    }

    pub async fn create_permission(&self, uid: &str, entry: PermissionEntry) -> Result<(), GateError> {
        let mut state = self.core.state.lock().await;
        state.registry.create(uid, entry)?;
        self.core.persist_permissions(&state.registry);
        Ok(())
    }

    pub async fn update_permission(&self, uid: &str, entry: PermissionEntry) -> Result<(), GateError> {
        let mut state = self.core.state.lock().await;
        state.registry.update(uid, entry)?;
        self.core.persist_permissions(&state.registry);
        Ok(())
    }

    pub async fn delete_permission(&self, uid: &str) -> Result<PermissionEntry, GateError> {
        let mut state = self.core.state.lock().await;
        let removed = state.registry.delete(uid)?;
        self.core.persist_permissions(&state.registry);
        Ok(removed)
    }
}

impl GateCore {
    fn persist_operations(&self, log: &OperationLog) {
        if let Err(e) = self.store.save_operations(log.records()) {
            error!("Failed to save operation log: {}", e);
        }
    }

    fn persist_permissions(&self, registry: &PermissionRegistry) {
        if let Err(e) = self.store.save_permissions(registry) {
            error!("Failed to save badge registry: {}", e);
        }
    }

    /// Timer callback: runs under the same lock as request handling
    pub(crate) async fn fire_auto_close(&self, open_id: u64, token: u64, uid: &str) {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;

        if !scheduler::claim(&mut state.timers, open_id, token) {
            return;
        }

        if scheduler::auto_close(&mut state.log, open_id, uid, local_now()).is_some() {
            self.persist_operations(&state.log);
        }
    }
}
