//! ============================================================================
//! Access Checker - Badge decisions against the registry and gate state
//! ============================================================================
//! Pure decision logic. Arming the auto-close timer for a grant is left to
//! the caller, which owns the timer table.
//! ============================================================================

use chrono::NaiveDateTime;
use tracing::{debug, info};

use super::registry::PermissionRegistry;
use super::types::{AccessDecision, Verdict};
use crate::oplog::{current_status, OperationLog};
use crate::types::{GateError, OperationReason, OperationStatus};

/// Check a badge against the registry at `now`, without touching the log
pub fn evaluate(uid: &str, registry: &PermissionRegistry, now: NaiveDateTime) -> Verdict {
    match registry.get(uid) {
        None => Verdict::Denied,
        Some(entry) if !entry.allows(now.time()) => {
            debug!(
                "Badge {} outside window {}-{}",
                uid, entry.window_from, entry.window_to
            );
            Verdict::TimeRestricted
        }
        Some(_) => Verdict::Granted,
    }
}

/// Decide on a badge presentation and record it.
///
/// Appends exactly one record unless the badge is granted while the gate is
/// already open, in which case nothing is logged. Fails only when no id is
/// left to allocate.
pub fn decide(
    uid: &str,
    log: &mut OperationLog,
    registry: &PermissionRegistry,
    now: NaiveDateTime,
) -> Result<AccessDecision, GateError> {
    let verdict = evaluate(uid, registry, now);

    if verdict.is_granted() && current_status(log.records(), now) == Some(OperationStatus::Opened) {
        info!("Badge {} granted but gate already open", uid);
        return Ok(AccessDecision::AlreadyOpen);
    }

    let record = log.append(now, verdict.status(), OperationReason::Nfc, Some(uid.to_string()))?;
    info!("Badge {} -> {} (id {})", uid, record.status, record.id);

    Ok(AccessDecision::Logged { verdict, record })
}
