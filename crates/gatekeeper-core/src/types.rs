//! ============================================================================
//! Core Types for the Gate Controller
//! ============================================================================
//! Operation records, status/reason labels, control actions and the error
//! taxonomy. Records serialize to the on-disk shape used by the dashboard:
//! ids as decimal strings, timestamps as `DD.MM.YYYY HH:MM:SS` local time.
//! ============================================================================

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;

/// External timestamp format (local wall-clock, second precision)
pub const TIMESTAMP_FORMAT: &str = "%d.%m.%Y %H:%M:%S";

/// One audit-log entry. Immutable once written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationRecord {
    #[serde(with = "id_string")]
    pub id: u64,
    #[serde(with = "timestamp_string")]
    pub timestamp: NaiveDateTime,
    pub status: OperationStatus,
    pub reason: OperationReason,
    /// Badge id, only present for NFC-triggered records
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<String>,
}

impl OperationRecord {
    pub fn new(
        id: u64,
        timestamp: NaiveDateTime,
        status: OperationStatus,
        reason: OperationReason,
        uid: Option<String>,
    ) -> Self {
        Self {
            id,
            timestamp: truncate_to_seconds(timestamp),
            status,
            reason,
            uid,
        }
    }

    /// Whether this record changes the derived gate state
    pub fn affects_state(&self) -> bool {
        self.status.affects_state()
    }
}

/// Log status label
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OperationStatus {
    Opened,
    Closed,
    Denied,
    TimeRestricted,
}

impl OperationStatus {
    /// `Denied` and `TimeRestricted` are audit-only entries
    pub fn affects_state(&self) -> bool {
        matches!(self, OperationStatus::Opened | OperationStatus::Closed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OperationStatus::Opened => "Opened",
            OperationStatus::Closed => "Closed",
            OperationStatus::Denied => "Denied",
            OperationStatus::TimeRestricted => "TimeRestricted",
        }
    }
}

impl fmt::Display for OperationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What triggered an operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OperationReason {
    Manual,
    #[serde(rename = "NFC")]
    Nfc,
    /// System close after a badge grant
    #[serde(rename = "AutoNFC")]
    AutoNfc,
}

impl OperationReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationReason::Manual => "Manual",
            OperationReason::Nfc => "NFC",
            OperationReason::AutoNfc => "AutoNFC",
        }
    }
}

impl fmt::Display for OperationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Manual control request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ControlAction {
    Open,
    Close,
}

impl ControlAction {
    pub fn parse(s: &str) -> Result<Self, GateError> {
        match s {
            "open" => Ok(ControlAction::Open),
            "close" => Ok(ControlAction::Close),
            other => Err(GateError::InvalidAction(other.to_string())),
        }
    }

    /// Status a confirmed action writes to the log
    pub fn resulting_status(&self) -> OperationStatus {
        match self {
            ControlAction::Open => OperationStatus::Opened,
            ControlAction::Close => OperationStatus::Closed,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ControlAction::Open => "open",
            ControlAction::Close => "close",
        }
    }
}

impl fmt::Display for ControlAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of a confirmed manual control action
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlOutcome {
    pub action: ControlAction,
    pub record: OperationRecord,
    /// Id of the auto-close timer cancelled by this action, if any
    pub cancelled_timer: Option<u64>,
}

/// Error types for the gate controller
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GateError {
    #[error("Malformed badge payload: {0}")]
    MalformedPayload(String),

    #[error("Invalid action: {0}")]
    InvalidAction(String),

    #[error("UID is required")]
    MissingUid,

    #[error("UID may only contain letters and digits: {0}")]
    InvalidUid(String),

    #[error("UID already exists: {0}")]
    DuplicateUid(String),

    #[error("UID not found: {0}")]
    UnknownUid(String),

    #[error("Gate is already open")]
    AlreadyOpen,

    #[error("Gate is already closed")]
    AlreadyClosed,

    #[error("Gate actuator unreachable: {0}")]
    ActuatorUnreachable(String),

    #[error("Gate actuator rejected command: {0}")]
    ActuatorRejected(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl GateError {
    /// Errors caused by the caller's input (no state was mutated)
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            GateError::MalformedPayload(_)
                | GateError::InvalidAction(_)
                | GateError::MissingUid
                | GateError::InvalidUid(_)
                | GateError::DuplicateUid(_)
                | GateError::UnknownUid(_)
                | GateError::AlreadyOpen
                | GateError::AlreadyClosed
        )
    }

    /// Lookup misses, as opposed to malformed input
    pub fn is_not_found(&self) -> bool {
        matches!(self, GateError::UnknownUid(_))
    }

    pub fn is_actuator_failure(&self) -> bool {
        matches!(
            self,
            GateError::ActuatorUnreachable(_) | GateError::ActuatorRejected(_)
        )
    }
}

/// Drop sub-second precision so in-memory records equal their reloaded form
pub fn truncate_to_seconds(ts: NaiveDateTime) -> NaiveDateTime {
    use chrono::Timelike;
    ts.with_nanosecond(0).unwrap_or(ts)
}

/// Current local wall-clock time at second precision
pub fn local_now() -> NaiveDateTime {
    truncate_to_seconds(chrono::Local::now().naive_local())
}

pub fn format_timestamp(ts: &NaiveDateTime) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

pub fn parse_timestamp(s: &str) -> Result<NaiveDateTime, chrono::ParseError> {
    NaiveDateTime::parse_from_str(s, TIMESTAMP_FORMAT)
}

pub(crate) mod id_string {
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(id: &u64, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&id.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse::<u64>()
            .map_err(|e| D::Error::custom(format!("invalid operation id '{}': {}", raw, e)))
    }
}

pub(crate) mod timestamp_string {
    use chrono::NaiveDateTime;
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(ts: &NaiveDateTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::format_timestamp(ts))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<NaiveDateTime, D::Error> {
        let raw = String::deserialize(deserializer)?;
        super::parse_timestamp(&raw)
            .map_err(|e| D::Error::custom(format!("invalid timestamp '{}': {}", raw, e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn ts(h: u32, m: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 5)
            .unwrap()
            .and_hms_opt(h, m, s)
            .unwrap()
    }

    #[test]
    fn test_record_wire_shape() {
        let record = OperationRecord::new(
            7,
            ts(9, 4, 2),
            OperationStatus::Opened,
            OperationReason::Nfc,
            Some("ABC123".into()),
        );
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["id"], "7");
        assert_eq!(json["timestamp"], "05.03.2024 09:04:02");
        assert_eq!(json["status"], "Opened");
        assert_eq!(json["reason"], "NFC");
        assert_eq!(json["uid"], "ABC123");
    }

    #[test]
    fn test_manual_record_omits_uid() {
        let record = OperationRecord::new(
            1,
            ts(10, 0, 0),
            OperationStatus::Closed,
            OperationReason::Manual,
            None,
        );
        let json = serde_json::to_value(&record).unwrap();
        assert!(json.get("uid").is_none());

        let back: OperationRecord = serde_json::from_value(json).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn test_rejects_non_numeric_id() {
        let raw = r#"{"id":"x1","timestamp":"05.03.2024 09:04:02","status":"Closed","reason":"Manual"}"#;
        assert!(serde_json::from_str::<OperationRecord>(raw).is_err());
    }

    #[test]
    fn test_id_range() {
        let max = r#"{"id":"18446744073709551615","timestamp":"05.03.2024 09:04:02","status":"Closed","reason":"Manual"}"#;
        assert_eq!(serde_json::from_str::<OperationRecord>(max).unwrap().id, u64::MAX);
        let over = r#"{"id":"18446744073709551616","timestamp":"05.03.2024 09:04:02","status":"Closed","reason":"Manual"}"#;
        assert!(serde_json::from_str::<OperationRecord>(over).is_err());
    }

    #[test]
    fn test_auto_close_reason_label() {
        let json = serde_json::to_value(OperationReason::AutoNfc).unwrap();
        assert_eq!(json, "AutoNFC");
    }

    #[test]
    fn test_control_action_parse() {
        assert_eq!(ControlAction::parse("open").unwrap(), ControlAction::Open);
        assert_eq!(ControlAction::parse("close").unwrap(), ControlAction::Close);
        let err = ControlAction::parse("toggle").unwrap_err();
        assert!(err.is_client_error());
    }

    #[test]
    fn test_error_classification() {
        assert!(GateError::AlreadyOpen.is_client_error());
        assert!(!GateError::ActuatorUnreachable("timeout".into()).is_client_error());
        assert!(GateError::ActuatorRejected("HTTP 500".into()).is_actuator_failure());
        assert!(GateError::UnknownUid("X".into()).is_not_found());
    }

    #[test]
    fn test_state_affecting_statuses() {
        assert!(OperationStatus::Opened.affects_state());
        assert!(OperationStatus::Closed.affects_state());
        assert!(!OperationStatus::Denied.affects_state());
        assert!(!OperationStatus::TimeRestricted.affects_state());
    }
}
