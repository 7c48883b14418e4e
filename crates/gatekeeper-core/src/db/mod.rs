// ============================================================================
// GateDb: Embedded Database (redb)
// ============================================================================
// Alternative to the JSON files: operation log and badge registry in one
// redb file. Default path: ~/.gatekeeper/gate.redb (override via GATE_DB_PATH)
// ============================================================================

pub mod store;

pub use store::{GateStore, JsonFileStore, MemoryStore};

use anyhow::{anyhow, Result};
use redb::{Database, ReadableTable, TableDefinition};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::access::{PermissionEntry, PermissionRegistry};
use crate::types::OperationRecord;

// Table definitions
// Operations are keyed by log position so the stored order round-trips.
const OPERATIONS: TableDefinition<u64, &[u8]> = TableDefinition::new("operations");
const PERMISSIONS: TableDefinition<&str, &[u8]> = TableDefinition::new("permissions");

/// Embedded database for the gate controller
pub struct GateDb {
    db: Database,
    path: PathBuf,
}

impl GateDb {
    /// Open (or create) the database at the given path.
    /// If `path` is None, uses ~/.gatekeeper/gate.redb
    pub fn open(path: Option<&Path>) -> Result<Self> {
        let db_path = match path {
            Some(p) => p.to_path_buf(),
            None => {
                let home =
                    dirs::home_dir().ok_or_else(|| anyhow!("Cannot determine home directory"))?;
                let gate_dir = home.join(".gatekeeper");
                std::fs::create_dir_all(&gate_dir)
                    .map_err(|e| anyhow!("Failed to create .gatekeeper directory: {}", e))?;
                gate_dir.join("gate.redb")
            }
        };

        info!("Opening database at: {}", db_path.display());

        let db = Database::create(&db_path).map_err(|e| anyhow!("Failed to open database: {}", e))?;

        // Ensure tables exist by doing a write transaction
        let write_txn = db
            .begin_write()
            .map_err(|e| anyhow!("Failed to begin write: {}", e))?;
        {
            let _ = write_txn
                .open_table(OPERATIONS)
                .map_err(|e| anyhow!("Failed to create operations table: {}", e))?;
            let _ = write_txn
                .open_table(PERMISSIONS)
                .map_err(|e| anyhow!("Failed to create permissions table: {}", e))?;
        }
        write_txn.commit().map_err(|e| anyhow!("Failed to commit init: {}", e))?;

        info!("Database ready");

        Ok(Self { db, path: db_path })
    }

    /// Get the database file path
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl GateStore for GateDb {
    fn load_operations(&self) -> Result<Vec<OperationRecord>> {
        let read_txn = self
            .db
            .begin_read()
            .map_err(|e| anyhow!("Failed to begin read: {}", e))?;
        let table = read_txn
            .open_table(OPERATIONS)
            .map_err(|e| anyhow!("Failed to open operations table: {}", e))?;

        let mut records = Vec::new();
        let iter = table
            .range::<u64>(..)
            .map_err(|e| anyhow!("Failed to iterate operations: {}", e))?;
        for entry in iter {
            let (_pos, value) = entry.map_err(|e| anyhow!("Failed to read entry: {}", e))?;
            let record: OperationRecord = serde_json::from_slice(value.value())
                .map_err(|e| anyhow!("Failed to deserialize operation: {}", e))?;
            records.push(record);
        }

        debug!("Loaded {} operations", records.len());
        Ok(records)
    }

    fn save_operations(&self, records: &[OperationRecord]) -> Result<()> {
        let write_txn = self
            .db
            .begin_write()
            .map_err(|e| anyhow!("Failed to begin write: {}", e))?;
        {
            write_txn
                .delete_table(OPERATIONS)
                .map_err(|e| anyhow!("Failed to reset operations table: {}", e))?;
            let mut table = write_txn
                .open_table(OPERATIONS)
                .map_err(|e| anyhow!("Failed to open operations table: {}", e))?;
            for (pos, record) in records.iter().enumerate() {
                let value = serde_json::to_vec(record)
                    .map_err(|e| anyhow!("Failed to serialize operation {}: {}", record.id, e))?;
                table
                    .insert(pos as u64, value.as_slice())
                    .map_err(|e| anyhow!("Failed to insert operation: {}", e))?;
            }
        }
        write_txn.commit().map_err(|e| anyhow!("Failed to commit: {}", e))?;

        debug!("Stored {} operations", records.len());
        Ok(())
    }

    fn load_permissions(&self) -> Result<PermissionRegistry> {
        let read_txn = self
            .db
            .begin_read()
            .map_err(|e| anyhow!("Failed to begin read: {}", e))?;
        let table = read_txn
            .open_table(PERMISSIONS)
            .map_err(|e| anyhow!("Failed to open permissions table: {}", e))?;

        let mut registry = PermissionRegistry::new();
        let iter = table
            .range::<&str>(..)
            .map_err(|e| anyhow!("Failed to iterate permissions: {}", e))?;
        for entry in iter {
            let (key, value) = entry.map_err(|e| anyhow!("Failed to read entry: {}", e))?;
            let permission: PermissionEntry = serde_json::from_slice(value.value())
                .map_err(|e| anyhow!("Failed to deserialize permission: {}", e))?;
            registry
                .create(key.value(), permission)
                .map_err(|e| anyhow!("Invalid stored permission: {}", e))?;
        }
        Ok(registry)
    }

    fn save_permissions(&self, registry: &PermissionRegistry) -> Result<()> {
        let write_txn = self
            .db
            .begin_write()
            .map_err(|e| anyhow!("Failed to begin write: {}", e))?;
        {
            write_txn
                .delete_table(PERMISSIONS)
                .map_err(|e| anyhow!("Failed to reset permissions table: {}", e))?;
            let mut table = write_txn
                .open_table(PERMISSIONS)
                .map_err(|e| anyhow!("Failed to open permissions table: {}", e))?;
            for (uid, entry) in registry.list() {
                let value = serde_json::to_vec(entry)
                    .map_err(|e| anyhow!("Failed to serialize permission: {}", e))?;
                table
                    .insert(uid.as_str(), value.as_slice())
                    .map_err(|e| anyhow!("Failed to insert permission: {}", e))?;
            }
        }
        write_txn.commit().map_err(|e| anyhow!("Failed to commit: {}", e))?;

        debug!("Stored {} permissions", registry.len());
        Ok(())
    }
}
