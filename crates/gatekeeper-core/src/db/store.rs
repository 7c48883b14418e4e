//! ============================================================================
//! Gate Store - Persistence backends for the log and the registry
//! ============================================================================
//! Backends report failures; the controller decides how to degrade (load
//! failures become empty state, save failures are logged).
//! ============================================================================

use anyhow::{anyhow, Result};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, info};

use crate::access::{PermissionRegistry, RegistryDocument};
use crate::types::OperationRecord;

/// Persistence for the operation log and the badge registry
pub trait GateStore: Send + Sync {
    fn load_operations(&self) -> Result<Vec<OperationRecord>>;
    fn save_operations(&self, records: &[OperationRecord]) -> Result<()>;
    fn load_permissions(&self) -> Result<PermissionRegistry>;
    fn save_permissions(&self, registry: &PermissionRegistry) -> Result<()>;
}

/// Two pretty-printed JSON files, the dashboard's native format
pub struct JsonFileStore {
    operations_path: PathBuf,
    permissions_path: PathBuf,
}

impl JsonFileStore {
    pub fn new(operations_path: impl Into<PathBuf>, permissions_path: impl Into<PathBuf>) -> Self {
        Self {
            operations_path: operations_path.into(),
            permissions_path: permissions_path.into(),
        }
    }

    pub fn operations_path(&self) -> &Path {
        &self.operations_path
    }

    pub fn permissions_path(&self) -> &Path {
        &self.permissions_path
    }

    /// Create an empty permissions file on first run. Returns whether one was written.
    pub fn ensure_permissions_file(&self) -> Result<bool> {
        if self.permissions_path.exists() {
            return Ok(false);
        }
        write_json(&self.permissions_path, &RegistryDocument::empty_legacy())?;
        info!("Created permissions file at {}", self.permissions_path.display());
        Ok(true)
    }
}

fn write_json<T: serde::Serialize>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)
        .map_err(|e| anyhow!("Failed to serialize {}: {}", path.display(), e))?;
    fs::write(path, json).map_err(|e| anyhow!("Failed to write {}: {}", path.display(), e))
}

impl GateStore for JsonFileStore {
    fn load_operations(&self) -> Result<Vec<OperationRecord>> {
        if !self.operations_path.exists() {
            debug!("No operations file at {}", self.operations_path.display());
            return Ok(Vec::new());
        }
        let raw = fs::read_to_string(&self.operations_path)
            .map_err(|e| anyhow!("Failed to read {}: {}", self.operations_path.display(), e))?;
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("Failed to parse {}: {}", self.operations_path.display(), e))
    }

    fn save_operations(&self, records: &[OperationRecord]) -> Result<()> {
        write_json(&self.operations_path, &records)?;
        debug!("Saved {} operations", records.len());
        Ok(())
    }

    fn load_permissions(&self) -> Result<PermissionRegistry> {
        if !self.permissions_path.exists() {
            debug!("No permissions file at {}", self.permissions_path.display());
            return Ok(PermissionRegistry::new());
        }
        let raw = fs::read_to_string(&self.permissions_path)
            .map_err(|e| anyhow!("Failed to read {}: {}", self.permissions_path.display(), e))?;
        let doc: RegistryDocument = serde_json::from_str(&raw)
            .map_err(|e| anyhow!("Failed to parse {}: {}", self.permissions_path.display(), e))?;
        Ok(doc.into_registry())
    }

    fn save_permissions(&self, registry: &PermissionRegistry) -> Result<()> {
        write_json(&self.permissions_path, &RegistryDocument::from(registry))?;
        debug!("Saved {} permissions", registry.len());
        Ok(())
    }
}

/// Process-local store, for tests and dry runs
#[derive(Default)]
pub struct MemoryStore {
    operations: Mutex<Vec<OperationRecord>>,
    permissions: Mutex<PermissionRegistry>,
    fail_saves: bool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_state(operations: Vec<OperationRecord>, permissions: PermissionRegistry) -> Self {
        Self {
            operations: Mutex::new(operations),
            permissions: Mutex::new(permissions),
            fail_saves: false,
        }
    }

    /// A store whose saves always fail
    pub fn failing() -> Self {
        Self {
            fail_saves: true,
            ..Self::default()
        }
    }

    /// Last saved operations
    pub fn saved_operations(&self) -> Vec<OperationRecord> {
        self.operations
            .lock()
            .map(|ops| ops.clone())
            .unwrap_or_default()
    }
}

impl GateStore for MemoryStore {
    fn load_operations(&self) -> Result<Vec<OperationRecord>> {
        let ops = self
            .operations
            .lock()
            .map_err(|e| anyhow!("Operations lock poisoned: {}", e))?;
        Ok(ops.clone())
    }

    fn save_operations(&self, records: &[OperationRecord]) -> Result<()> {
        if self.fail_saves {
            return Err(anyhow!("Save disabled for this store"));
        }
        let mut ops = self
            .operations
            .lock()
            .map_err(|e| anyhow!("Operations lock poisoned: {}", e))?;
        *ops = records.to_vec();
        Ok(())
    }

    fn load_permissions(&self) -> Result<PermissionRegistry> {
        let perms = self
            .permissions
            .lock()
            .map_err(|e| anyhow!("Permissions lock poisoned: {}", e))?;
        Ok(perms.clone())
    }

    fn save_permissions(&self, registry: &PermissionRegistry) -> Result<()> {
        if self.fail_saves {
            return Err(anyhow!("Save disabled for this store"));
        }
        let mut perms = self
            .permissions
            .lock()
            .map_err(|e| anyhow!("Permissions lock poisoned: {}", e))?;
        *perms = registry.clone();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::PermissionEntry;
    use crate::types::{OperationReason, OperationStatus};
    use chrono::NaiveDate;

    fn store_in(dir: &Path) -> JsonFileStore {
        JsonFileStore::new(dir.join("operations.json"), dir.join("nfc_uids.json"))
    }

    fn sample_log() -> Vec<OperationRecord> {
        let day = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();
        vec![
            OperationRecord::new(
                3,
                day.and_hms_opt(10, 5, 0).unwrap(),
                OperationStatus::Denied,
                OperationReason::Nfc,
                Some("ZZZ".into()),
            ),
            OperationRecord::new(
                2,
                day.and_hms_opt(10, 0, 10).unwrap(),
                OperationStatus::Closed,
                OperationReason::Manual,
                None,
            ),
            OperationRecord::new(
                1,
                day.and_hms_opt(10, 0, 0).unwrap(),
                OperationStatus::Opened,
                OperationReason::Nfc,
                Some("ABC123".into()),
            ),
        ]
    }

    #[test]
    fn test_missing_files_load_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());
        assert!(store.load_operations().unwrap().is_empty());
        assert!(store.load_permissions().unwrap().is_empty());
    }

    #[test]
    fn test_corrupt_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());
        fs::write(store.operations_path(), "{ not json").unwrap();
        assert!(store.load_operations().is_err());
    }

    #[test]
    fn test_save_load_save_is_stable() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());
        let log = sample_log();

        store.save_operations(&log).unwrap();
        let first = fs::read_to_string(store.operations_path()).unwrap();
        let loaded = store.load_operations().unwrap();
        assert_eq!(loaded, log);

        store.save_operations(&loaded).unwrap();
        let second = fs::read_to_string(store.operations_path()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_reads_dashboard_format() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());
        fs::write(
            store.operations_path(),
            r#"[
  {"id": "2", "timestamp": "01.06.2024 10:00:10", "status": "Closed", "reason": "Manual"},
  {"id": "1", "uid": "ABC123", "timestamp": "01.06.2024 10:00:00", "status": "Opened", "reason": "NFC"}
]"#,
        )
        .unwrap();
        let ops = store.load_operations().unwrap();
        assert_eq!(ops.len(), 2);
        assert_eq!(ops[1].uid.as_deref(), Some("ABC123"));
        assert!(ops[0].uid.is_none());
    }

    #[test]
    fn test_bootstrap_and_legacy_migration() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());
        assert!(store.ensure_permissions_file().unwrap());
        assert!(!store.ensure_permissions_file().unwrap());
        assert!(store.load_permissions().unwrap().is_empty());

        fs::write(store.permissions_path(), r#"{"allowed_uids": ["OLD1"]}"#).unwrap();
        let registry = store.load_permissions().unwrap();
        assert_eq!(registry.get("OLD1"), Some(&PermissionEntry::default()));

        store.save_permissions(&registry).unwrap();
        let raw = fs::read_to_string(store.permissions_path()).unwrap();
        let json: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(json["allowed_uids"]["OLD1"]["name"], "");
    }

    #[test]
    fn test_failing_memory_store() {
        let store = MemoryStore::failing();
        assert!(store.save_operations(&sample_log()).is_err());
        assert!(store.saved_operations().is_empty());
    }
}
