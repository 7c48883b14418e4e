//! ============================================================================
//! GATEKEEPER-CORE: Access Gate Control & Audit
//! ============================================================================
//! This crate handles all backend logic for the gate controller:
//! - Append-only operation log as the single source of gate state
//! - NFC badge authorization with optional time-of-day windows
//! - Auto-close timers after a badge grant
//! - Manual open/close through the gate actuator (HTTP)
//! - JSON file or embedded redb persistence
//! ============================================================================

pub mod access;
pub mod actuator;
pub mod config;
pub mod controller;
pub mod db;
pub mod oplog;
pub mod scheduler;
pub mod types;

// Re-export main types for convenience
pub use types::*;
pub use access::{AccessDecision, PermissionEntry, PermissionRegistry, Verdict};
pub use actuator::{Actuator, ActuatorResponse, HttpActuator};
pub use config::{GateConfig, StorageBackend};
pub use controller::{GateController, GateStatus};
pub use db::{GateDb, GateStore, JsonFileStore, MemoryStore};
pub use oplog::{DashboardSnapshot, DisplayRecord, LogStatistics, OperationLog};
