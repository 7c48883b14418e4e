//! ============================================================================
//! Access Module - NFC badge authorization
//! ============================================================================
//! Decides whether a presented badge opens the gate.
//!
//! ## Verdicts
//! - **Granted**: badge registered, inside its time window (if any)
//! - **Denied**: badge not registered
//! - **TimeRestricted**: badge registered, presented outside its window
//!
//! ## Usage
//! ```rust,ignore
//! use gatekeeper_core::access::{decide, PermissionEntry, PermissionRegistry};
//!
//! let mut registry = PermissionRegistry::new();
//! registry.create("ABC123", PermissionEntry::new("Alice", "08:00", "18:00"))?;
//! let decision = decide("ABC123", &mut log, &registry, now)?;
//! ```
//! ============================================================================

mod checker;
mod registry;
mod types;

// Re-export public types
pub use checker::{decide, evaluate};
pub use registry::{AllowedUids, PermissionRegistry, RegistryDocument};
pub use types::{AccessDecision, BadgeEvent, PermissionEntry, Verdict, WINDOW_FORMAT};
