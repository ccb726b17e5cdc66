//! Engine configuration, stored as JSON next to the project database.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Config parse error: {0}")]
    Json(#[from] serde_json::Error),
}

/// What happens to a clip that a new interval lands strictly inside of.
///
/// Applied the same way by every operation that clears space on a track.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PunchThroughPolicy {
    /// Trim the clip to whichever side of the interval is longer; the shorter
    /// fragment is dropped. Ties keep the head.
    #[default]
    KeepLarger,
    /// Trim the clip to its head and insert a new clip for the tail fragment,
    /// carrying the original media and provenance.
    SplitPreserveTail,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// `None` keeps everything in memory.
    pub database_path: Option<PathBuf>,
    pub max_undo_depth: usize,
    pub punch_through: PunchThroughPolicy,
    /// WAL journal mode for file-backed databases.
    pub wal: bool,
    pub persist_command_log: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            database_path: None,
            max_undo_depth: 200,
            punch_through: PunchThroughPolicy::default(),
            wal: true,
            persist_command_log: true,
        }
    }
}

impl EngineConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        let config = serde_json::from_str(&content)?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_keys_fall_back_to_defaults() {
        let config: EngineConfig =
            serde_json::from_str(r#"{"punch_through":"split_preserve_tail"}"#).unwrap();
        assert_eq!(config.punch_through, PunchThroughPolicy::SplitPreserveTail);
        assert_eq!(config.max_undo_depth, 200);
        assert!(config.database_path.is_none());
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("engine.json");
        let config = EngineConfig {
            max_undo_depth: 5,
            wal: false,
            ..EngineConfig::default()
        };
        config.save(&path).unwrap();

        let loaded = EngineConfig::load(&path).unwrap();
        assert_eq!(loaded.max_undo_depth, 5);
        assert!(!loaded.wal);
        assert_eq!(loaded.punch_through, PunchThroughPolicy::KeepLarger);
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(EngineConfig::load(&path), Err(ConfigError::Json(_))));
    }
}
