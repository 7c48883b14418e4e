//! ============================================================================
//! Gate Configuration
//! ============================================================================
//! Defaults plus environment overrides. Callers load `.env` beforehand.
//! ============================================================================

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

use crate::actuator::DEFAULT_ACTUATOR_TIMEOUT_SECS;
use crate::scheduler::AUTO_CLOSE_DELAY_SECS;

/// Where state is persisted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StorageBackend {
    /// `operations.json` + `nfc_uids.json`
    #[default]
    Json,
    /// Embedded redb database
    Redb,
}

impl FromStr for StorageBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "json" => Ok(StorageBackend::Json),
            "redb" | "db" => Ok(StorageBackend::Redb),
            other => Err(format!("Unknown backend '{}'. Valid values: json, redb", other)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct GateConfig {
    pub backend: StorageBackend,
    pub operations_path: PathBuf,
    pub permissions_path: PathBuf,
    /// `None` resolves to `~/.gatekeeper/gate.redb` when the db is opened
    pub db_path: Option<PathBuf>,
    pub actuator_url: String,
    pub open_path: String,
    pub close_path: String,
    pub actuator_timeout: Duration,
    pub auto_close_delay: Duration,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Json,
            operations_path: PathBuf::from("operations.json"),
            permissions_path: PathBuf::from("nfc_uids.json"),
            db_path: None,
            actuator_url: "http://192.168.43.196".to_string(),
            open_path: "/gate/open".to_string(),
            close_path: "/gate/close".to_string(),
            actuator_timeout: Duration::from_secs(DEFAULT_ACTUATOR_TIMEOUT_SECS),
            auto_close_delay: Duration::from_secs(AUTO_CLOSE_DELAY_SECS),
        }
    }
}

impl GateConfig {
    /// Defaults overridden by `GATE_*` environment variables
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an arbitrary variable source
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(v) = lookup("GATE_BACKEND") {
            match v.parse() {
                Ok(backend) => config.backend = backend,
                Err(e) => warn!("Ignoring GATE_BACKEND: {}", e),
            }
        }
        if let Some(v) = lookup("GATE_OPERATIONS_FILE") {
            config.operations_path = PathBuf::from(v);
        }
        if let Some(v) = lookup("GATE_PERMISSIONS_FILE") {
            config.permissions_path = PathBuf::from(v);
        }
        if let Some(v) = lookup("GATE_DB_PATH") {
            config.db_path = Some(PathBuf::from(v));
        }
        if let Some(v) = lookup("GATE_ACTUATOR_URL") {
            config.actuator_url = v;
        }
        if let Some(v) = lookup("GATE_OPEN_PATH") {
            config.open_path = v;
        }
        if let Some(v) = lookup("GATE_CLOSE_PATH") {
            config.close_path = v;
        }
        if let Some(secs) = parse_secs(&lookup, "GATE_ACTUATOR_TIMEOUT_SECS") {
            config.actuator_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = parse_secs(&lookup, "GATE_AUTO_CLOSE_SECS") {
            config.auto_close_delay = Duration::from_secs(secs);
        }

        config
    }
}

fn parse_secs<F>(lookup: &F, key: &str) -> Option<u64>
where
    F: Fn(&str) -> Option<String>,
{
    let raw = lookup(key)?;
    match raw.trim().parse::<u64>() {
        Ok(secs) => Some(secs),
        Err(e) => {
            warn!("Ignoring {}='{}': {} - using default", key, raw, e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = GateConfig::default();
        assert_eq!(config.backend, StorageBackend::Json);
        assert_eq!(config.auto_close_delay, Duration::from_secs(10));
        assert_eq!(config.actuator_timeout, Duration::from_secs(3));
        assert_eq!(config.operations_path, PathBuf::from("operations.json"));
    }

    #[test]
    fn test_overrides() {
        let config = GateConfig::from_lookup(lookup_from(&[
            ("GATE_BACKEND", "redb"),
            ("GATE_ACTUATOR_URL", "http://gate.local"),
            ("GATE_AUTO_CLOSE_SECS", "30"),
            ("GATE_DB_PATH", "/tmp/gate.redb"),
        ]));
        assert_eq!(config.backend, StorageBackend::Redb);
        assert_eq!(config.actuator_url, "http://gate.local");
        assert_eq!(config.auto_close_delay, Duration::from_secs(30));
        assert_eq!(config.db_path, Some(PathBuf::from("/tmp/gate.redb")));
    }

    #[test]
    fn test_bad_numbers_fall_back() {
        let config = GateConfig::from_lookup(lookup_from(&[
            ("GATE_ACTUATOR_TIMEOUT_SECS", "soon"),
            ("GATE_BACKEND", "postgres"),
        ]));
        assert_eq!(config.actuator_timeout, Duration::from_secs(3));
        assert_eq!(config.backend, StorageBackend::Json);
    }
}
