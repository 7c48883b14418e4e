//! ============================================================================
//! Permission Registry - Badge id → permission entry
//! ============================================================================
//! Management operations validate the badge id; time windows are stored as
//! given and only interpreted at decision time.
//! ============================================================================

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::info;

use super::types::PermissionEntry;
use crate::types::GateError;

/// Registered badges
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PermissionRegistry {
    entries: BTreeMap<String, PermissionEntry>,
}

/// Persisted registry document: `{"allowed_uids": ...}`.
///
/// Older files hold a bare list of ids; those are upgraded to entries with
/// empty metadata on load.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryDocument {
    pub allowed_uids: AllowedUids,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AllowedUids {
    Entries(BTreeMap<String, PermissionEntry>),
    Legacy(Vec<String>),
}

impl RegistryDocument {
    /// Shape written on first run
    pub fn empty_legacy() -> Self {
        Self {
            allowed_uids: AllowedUids::Legacy(Vec::new()),
        }
    }

    pub fn into_registry(self) -> PermissionRegistry {
        match self.allowed_uids {
            AllowedUids::Entries(entries) => PermissionRegistry { entries },
            AllowedUids::Legacy(uids) => {
                info!("Migrating {} legacy badge ids to permission entries", uids.len());
                PermissionRegistry {
                    entries: uids
                        .into_iter()
                        .map(|uid| (uid, PermissionEntry::default()))
                        .collect(),
                }
            }
        }
    }
}

impl From<&PermissionRegistry> for RegistryDocument {
    fn from(registry: &PermissionRegistry) -> Self {
        Self {
            allowed_uids: AllowedUids::Entries(registry.entries.clone()),
        }
    }
}

impl PermissionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, uid: &str) -> Option<&PermissionEntry> {
        self.entries.get(uid)
    }

    pub fn contains(&self, uid: &str) -> bool {
        self.entries.contains_key(uid)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn list(&self) -> &BTreeMap<String, PermissionEntry> {
        &self.entries
    }

    /// Register a new badge. Rejects empty, non-alphanumeric and duplicate ids.
    pub fn create(&mut self, uid: &str, entry: PermissionEntry) -> Result<(), GateError> {
        if uid.is_empty() {
            return Err(GateError::MissingUid);
        }
        if !uid.chars().all(char::is_alphanumeric) {
            return Err(GateError::InvalidUid(uid.to_string()));
        }
        if self.entries.contains_key(uid) {
            return Err(GateError::DuplicateUid(uid.to_string()));
        }

        self.entries.insert(uid.to_string(), entry);
        info!("Registered badge {}", uid);
        Ok(())
    }

    /// Replace an existing badge's entry wholesale
    pub fn update(&mut self, uid: &str, entry: PermissionEntry) -> Result<(), GateError> {
        if uid.is_empty() {
            return Err(GateError::MissingUid);
        }
        match self.entries.get_mut(uid) {
            Some(existing) => {
                *existing = entry;
                info!("Updated badge {}", uid);
                Ok(())
            }
            None => Err(GateError::UnknownUid(uid.to_string())),
        }
    }

    pub fn delete(&mut self, uid: &str) -> Result<PermissionEntry, GateError> {
        if uid.is_empty() {
            return Err(GateError::MissingUid);
        }
        let removed = self
            .entries
            .remove(uid)
            .ok_or_else(|| GateError::UnknownUid(uid.to_string()))?;
        info!("Removed badge {}", uid);
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_rejects_bad_ids() {
        let mut registry = PermissionRegistry::new();
        assert_eq!(
            registry.create("", PermissionEntry::default()),
            Err(GateError::MissingUid)
        );
        assert!(matches!(
            registry.create("AB 12", PermissionEntry::default()),
            Err(GateError::InvalidUid(_))
        ));
        assert!(matches!(
            registry.create("<script>", PermissionEntry::default()),
            Err(GateError::InvalidUid(_))
        ));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_create_rejects_duplicate() {
        let mut registry = PermissionRegistry::new();
        registry.create("ABC123", PermissionEntry::unrestricted("Alice")).unwrap();
        let err = registry
            .create("ABC123", PermissionEntry::unrestricted("Mallory"))
            .unwrap_err();
        assert_eq!(err, GateError::DuplicateUid("ABC123".into()));
        assert_eq!(registry.get("ABC123").unwrap().name, "Alice");
    }

    #[test]
    fn test_update_and_delete_unknown() {
        let mut registry = PermissionRegistry::new();
        assert!(registry.update("NOPE", PermissionEntry::default()).unwrap_err().is_not_found());
        assert!(registry.delete("NOPE").unwrap_err().is_not_found());
    }

    #[test]
    fn test_update_replaces_entry() {
        let mut registry = PermissionRegistry::new();
        registry.create("XYZ", PermissionEntry::new("Old", "08:00", "09:00")).unwrap();
        registry.update("XYZ", PermissionEntry::unrestricted("New")).unwrap();
        let entry = registry.get("XYZ").unwrap();
        assert_eq!(entry.name, "New");
        assert!(entry.window_from.is_empty());
    }

    #[test]
    fn test_malformed_window_accepted_on_write() {
        let mut registry = PermissionRegistry::new();
        registry.create("W1", PermissionEntry::new("", "25:99", "bogus")).unwrap();
        assert_eq!(registry.get("W1").unwrap().window_from, "25:99");
    }

    #[test]
    fn test_legacy_document_migrates() {
        let doc: RegistryDocument =
            serde_json::from_str(r#"{"allowed_uids": ["AAA111", "BBB222"]}"#).unwrap();
        let registry = doc.into_registry();
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.get("AAA111"), Some(&PermissionEntry::default()));
    }

    #[test]
    fn test_document_round_trip() {
        let mut registry = PermissionRegistry::new();
        registry.create("ABC123", PermissionEntry::new("Alice", "10:00", "11:00")).unwrap();
        let json = serde_json::to_string(&RegistryDocument::from(&registry)).unwrap();
        let back: RegistryDocument = serde_json::from_str(&json).unwrap();
        assert_eq!(back.into_registry(), registry);
    }
}
