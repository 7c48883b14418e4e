//! ============================================================================
//! Access Types - Badge permissions, verdicts and inbound events
//! ============================================================================

use chrono::NaiveTime;
use serde::{Deserialize, Serialize};

use crate::types::{GateError, OperationRecord, OperationStatus};

/// Format of the time-of-day window bounds
pub const WINDOW_FORMAT: &str = "%H:%M";

/// Registry value for one badge
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionEntry {
    /// Display name (free text)
    #[serde(default)]
    pub name: String,
    /// Window start `HH:MM`, empty = unrestricted
    #[serde(default, rename = "from")]
    pub window_from: String,
    /// Window end `HH:MM`, empty = unrestricted
    #[serde(default, rename = "to")]
    pub window_to: String,
}

impl PermissionEntry {
    pub fn new(name: impl Into<String>, window_from: impl Into<String>, window_to: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            window_from: window_from.into(),
            window_to: window_to.into(),
        }
    }

    pub fn unrestricted(name: impl Into<String>) -> Self {
        Self::new(name, "", "")
    }

    /// Parsed window, if both bounds are set and well-formed.
    ///
    /// A malformed bound yields `None`, i.e. no restriction.
    pub fn window(&self) -> Option<(NaiveTime, NaiveTime)> {
        if self.window_from.is_empty() || self.window_to.is_empty() {
            return None;
        }
        let from = NaiveTime::parse_from_str(&self.window_from, WINDOW_FORMAT).ok()?;
        let to = NaiveTime::parse_from_str(&self.window_to, WINDOW_FORMAT).ok()?;
        Some((from, to))
    }

    /// Whether `time` lies in the window (inclusive). Always true without a window.
    pub fn allows(&self, time: NaiveTime) -> bool {
        match self.window() {
            Some((from, to)) => from <= time && time <= to,
            None => true,
        }
    }
}

/// Outcome of checking a badge against the registry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Granted,
    Denied,
    TimeRestricted,
}

impl Verdict {
    pub fn is_granted(&self) -> bool {
        matches!(self, Verdict::Granted)
    }

    /// Label written to the log for this verdict
    pub fn status(&self) -> OperationStatus {
        match self {
            Verdict::Granted => OperationStatus::Opened,
            Verdict::Denied => OperationStatus::Denied,
            Verdict::TimeRestricted => OperationStatus::TimeRestricted,
        }
    }
}

/// Result of a badge presentation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum AccessDecision {
    /// Granted, but the gate is already open: nothing was logged
    AlreadyOpen,
    /// A record was appended to the log
    Logged { verdict: Verdict, record: OperationRecord },
}

impl AccessDecision {
    pub fn granted(&self) -> bool {
        matches!(self, AccessDecision::Logged { verdict: Verdict::Granted, .. })
    }

    pub fn record(&self) -> Option<&OperationRecord> {
        match self {
            AccessDecision::Logged { record, .. } => Some(record),
            AccessDecision::AlreadyOpen => None,
        }
    }

    pub fn status(&self) -> Option<OperationStatus> {
        self.record().map(|r| r.status)
    }
}

/// Inbound badge event payload: `{"uid": "..."}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BadgeEvent {
    pub uid: String,
}

impl BadgeEvent {
    /// Parse a raw JSON payload. Malformed JSON and a missing or empty
    /// `uid` are client errors, distinct from an access denial.
    pub fn parse(payload: &str) -> Result<Self, GateError> {
        #[derive(Deserialize)]
        struct Raw {
            uid: Option<serde_json::Value>,
        }

        let raw: Raw = serde_json::from_str(payload)
            .map_err(|e| GateError::MalformedPayload(format!("request must be JSON: {}", e)))?;

        match raw.uid {
            Some(serde_json::Value::String(uid)) if !uid.is_empty() => Ok(Self { uid }),
            Some(serde_json::Value::String(_)) | Some(serde_json::Value::Null) | None => {
                Err(GateError::MalformedPayload("parameter 'uid' is missing".into()))
            }
            Some(other) => Err(GateError::MalformedPayload(format!(
                "parameter 'uid' must be a string, got {}",
                other
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn test_window_inclusive_bounds() {
        let entry = PermissionEntry::new("Alice", "10:00", "11:00");
        assert!(entry.allows(t(10, 0)));
        assert!(entry.allows(t(10, 30)));
        assert!(entry.allows(t(11, 0)));
        assert!(!entry.allows(t(12, 0)));
        assert!(!entry.allows(t(9, 59)));
    }

    #[test]
    fn test_half_open_window_is_unrestricted() {
        let entry = PermissionEntry::new("Bob", "10:00", "");
        assert!(entry.window().is_none());
        assert!(entry.allows(t(3, 0)));
    }

    #[test]
    fn test_malformed_window_is_unrestricted() {
        let entry = PermissionEntry::new("Carol", "ten", "11:00");
        assert!(entry.window().is_none());
        assert!(entry.allows(t(23, 0)));
    }

    #[test]
    fn test_entry_wire_shape() {
        let json = serde_json::to_value(PermissionEntry::new("Dan", "08:00", "17:30")).unwrap();
        assert_eq!(json["name"], "Dan");
        assert_eq!(json["from"], "08:00");
        assert_eq!(json["to"], "17:30");
    }

    #[test]
    fn test_badge_event_parse() {
        assert_eq!(BadgeEvent::parse(r#"{"uid":"ABC123"}"#).unwrap().uid, "ABC123");

        for bad in [r#"{}"#, r#"{"uid":""}"#, r#"{"uid":null}"#, r#"{"uid":42}"#, "not json"] {
            let err = BadgeEvent::parse(bad).unwrap_err();
            assert!(err.is_client_error(), "{} should be a client error", bad);
        }
    }

    #[test]
    fn test_verdict_labels() {
        assert_eq!(Verdict::Granted.status(), OperationStatus::Opened);
        assert_eq!(Verdict::Denied.status(), OperationStatus::Denied);
        assert_eq!(Verdict::TimeRestricted.status(), OperationStatus::TimeRestricted);
    }
}
